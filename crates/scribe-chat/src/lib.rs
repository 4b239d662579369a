//! Streaming chat session for scribe.
//!
//! [`SessionController`] runs one exchange at a time: it sends the
//! conversation through a [`ChatBackend`], plays the reply back with a
//! typing effect into a [`PresentationSink`], and commits the result to the
//! persisted session.
//!
//! [`ChatBackend`]: scribe_stream::ChatBackend

pub mod clipboard;
pub mod controller;
pub mod error;
pub mod exchange;
pub mod presentation;
pub mod render;

pub use clipboard::{ClipboardWriter, MemoryClipboard};
#[cfg(feature = "clipboard")]
pub use clipboard::SystemClipboard;
pub use controller::{ControllerSettings, ControllerState, SessionController};
pub use error::{ChatError, Result};
pub use exchange::{Exchange, ExchangeOutcome, ExchangeStatus};
pub use presentation::{Entry, EntryId, MemorySink, PresentationSink, SinkEvent};
pub use render::{EscapedText, MarkdownHtml, MessageRenderer, RenderMode, TerminalText};
