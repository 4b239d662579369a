use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::message::{Message, Role};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history already holds a system directive")]
    DuplicateSystem,
}

/// Ordered, append-only conversation.
///
/// Insertion order is chronological order. At most one system directive
/// exists and, when present, it is the first entry. The only way to shrink
/// a history is to replace it wholesale with [`ConversationHistory::replace`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Message>", into = "Vec<Message>")]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The conversation a fresh session starts from: an optional system
    /// directive followed by an optional assistant greeting.
    pub fn initial(system_prompt: Option<&str>, greeting: Option<&str>) -> Self {
        let mut history = Self::new();
        if let Some(prompt) = system_prompt {
            history.ensure_system(prompt);
        }
        if let Some(greeting) = greeting {
            history.messages.push(Message::assistant(greeting));
        }
        history
    }

    /// Build a history from an arbitrary message list, keeping only the
    /// first system directive and moving it to the front.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut system = None;
        let mut rest = Vec::with_capacity(messages.len());
        for message in messages {
            if message.is_system() {
                if system.is_none() {
                    system = Some(message);
                }
            } else {
                rest.push(message);
            }
        }

        let mut ordered = Vec::with_capacity(rest.len() + 1);
        ordered.extend(system);
        ordered.extend(rest);
        Self { messages: ordered }
    }

    /// Prepend `prompt` as the system directive unless one already exists.
    /// Returns whether it was inserted.
    pub fn ensure_system(&mut self, prompt: &str) -> bool {
        if self.system_prompt().is_some() {
            return false;
        }
        self.messages.insert(0, Message::system(prompt));
        true
    }

    /// Append a message. System directives can only enter through
    /// [`ConversationHistory::ensure_system`] or on an empty history.
    pub fn push(&mut self, message: Message) -> Result<(), HistoryError> {
        if message.is_system() && !self.messages.is_empty() {
            return Err(HistoryError::DuplicateSystem);
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Replace the whole conversation (reset/delete).
    pub fn replace(&mut self, other: ConversationHistory) {
        self.messages = other.messages;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Copy of the conversation as sent to the backend.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
    }

    /// Messages shown to the user (everything but the system directive).
    pub fn visible(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_system())
    }

    /// Assistant replies in chronological order.
    pub fn assistant_responses(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::Assistant)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl From<Vec<Message>> for ConversationHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}

impl From<ConversationHistory> for Vec<Message> {
    fn from(history: ConversationHistory) -> Self {
        history.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_conversation() {
        let history = ConversationHistory::initial(Some("be brief"), Some("Hello!"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.system_prompt(), Some("be brief"));
        assert_eq!(history.visible().count(), 1);
    }

    #[test]
    fn test_ensure_system_is_idempotent() {
        let mut history = ConversationHistory::initial(None, Some("Hello!"));
        assert!(history.ensure_system("one"));
        assert!(!history.ensure_system("two"));
        assert!(!history.ensure_system("one"));

        let systems = history.messages().iter().filter(|m| m.is_system()).count();
        assert_eq!(systems, 1);
        assert_eq!(history.messages()[0], Message::system("one"));
    }

    #[test]
    fn test_push_rejects_second_system() {
        let mut history = ConversationHistory::initial(Some("sys"), None);
        assert_eq!(
            history.push(Message::system("again")),
            Err(HistoryError::DuplicateSystem)
        );
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_from_messages_keeps_first_system_in_front() {
        let history = ConversationHistory::from_messages(vec![
            Message::user("q"),
            Message::system("first"),
            Message::assistant("a"),
            Message::system("second"),
        ]);

        assert_eq!(
            history.messages(),
            &[
                Message::system("first"),
                Message::user("q"),
                Message::assistant("a"),
            ]
        );
    }

    #[test]
    fn test_serde_as_plain_array() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history.push_assistant("hello");

        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(
            json,
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#
        );

        let back: ConversationHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }

    #[test]
    fn test_replace_resets_wholesale() {
        let mut history = ConversationHistory::initial(None, Some("greet"));
        history.push_user("q");
        history.push_assistant("a");

        history.replace(ConversationHistory::initial(None, Some("greet")));
        assert_eq!(history.len(), 1);
    }
}
