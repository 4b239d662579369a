use scribe_core::Message;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStatus {
    Sending,
    Streaming,
    Complete,
    Failed,
}

impl ExchangeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeStatus::Complete | ExchangeStatus::Failed)
    }
}

/// One user turn, from submit until commit or failure.
///
/// The raw and displayed buffers live in the playback scheduler; this only
/// tracks what was sent and where the exchange is.
#[derive(Debug, Clone)]
pub struct Exchange {
    id: Uuid,
    sent_messages: Vec<Message>,
    status: ExchangeStatus,
}

impl Exchange {
    pub fn new(id: Uuid, sent_messages: Vec<Message>) -> Self {
        Self {
            id,
            sent_messages,
            status: ExchangeStatus::Sending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// History snapshot taken at send time
    pub fn sent_messages(&self) -> &[Message] {
        &self.sent_messages
    }

    pub fn status(&self) -> ExchangeStatus {
        self.status
    }

    /// Move to `next`. Terminal states are final.
    pub fn advance(&mut self, next: ExchangeStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        debug!(exchange_id = %self.id, from = ?self.status, to = ?next, "exchange status");
        self.status = next;
        true
    }
}

/// How an accepted submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Reply appended to history and persisted
    Committed { response: String },
    /// Nothing but the user message reached history
    Failed { message: String },
}

impl ExchangeOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ExchangeOutcome::Committed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status_is_final() {
        let mut exchange = Exchange::new(Uuid::new_v4(), vec![Message::user("hi")]);
        assert_eq!(exchange.status(), ExchangeStatus::Sending);

        assert!(exchange.advance(ExchangeStatus::Streaming));
        assert!(exchange.advance(ExchangeStatus::Failed));
        assert!(!exchange.advance(ExchangeStatus::Complete));
        assert_eq!(exchange.status(), ExchangeStatus::Failed);
        assert_eq!(exchange.sent_messages(), &[Message::user("hi")]);
    }
}
