/// Semantic event extracted from one stream frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental assistant text
    TextDelta { text: String },
    /// Upstream signalled the end of the stream
    StreamEnd,
    /// Nothing to act on (blank line, foreign line, malformed frame)
    Ignore,
}

impl StreamEvent {
    /// Create a text delta
    pub fn delta(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::StreamEnd)
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Self::Ignore)
    }

    /// Text carried by a delta
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text } => Some(text),
            _ => None,
        }
    }
}
