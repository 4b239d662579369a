use serde::{Deserialize, Serialize};

use crate::types::{ConversationHistory, Message};

/// Body of the outbound chat call: `{ "messages": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Snapshot the history at send time
    pub fn from_history(history: &ConversationHistory) -> Self {
        Self::new(history.snapshot())
    }

    /// Add a message to the request
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }
}
