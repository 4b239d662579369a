pub mod message;
pub mod history;

pub use message::{Message, Role};
pub use history::{ConversationHistory, HistoryError};
