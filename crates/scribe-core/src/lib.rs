pub mod types;
pub mod chat;

pub use types::{ConversationHistory, HistoryError, Message, Role};

pub use chat::{ChatRequest, ChatResponse, ErrorBody, StreamEvent};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
