pub mod request;
pub mod response;
pub mod chunk;

pub use request::ChatRequest;
pub use response::{ChatResponse, ErrorBody};
pub use chunk::StreamEvent;
