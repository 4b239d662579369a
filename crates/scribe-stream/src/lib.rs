pub mod error;
pub mod decoder;
pub mod extractor;
pub mod playback;
pub mod backend;

pub use error::{StreamError, Result};
pub use decoder::{decode_lines, FrameDecoder};
pub use extractor::{EventExtractor, ExtractorStats, FrameFormat};
pub use playback::{PlaybackScheduler, PlaybackState, RevealTarget};
pub use backend::{BackendConfig, ChatBackend, EventStream, HttpChatBackend, DEFAULT_ENDPOINT};
