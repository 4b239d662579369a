use thiserror::Error;

/// Unified error type for the streaming pipeline
#[derive(Error, Debug)]
pub enum StreamError {
    /// Request could not be sent or the body broke off mid-stream
    #[error("network error: {0}")]
    Network(String),

    /// Upstream answered with a non-2xx status
    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("stream error: {0}")]
    Stream(String),

    /// A non-streaming body that could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    #[error("config error: {0}")]
    Config(String),
}

impl StreamError {
    /// Text shown to the user for this failure.
    ///
    /// API failures carry the server's own `details`/`error` text verbatim.
    pub fn user_message(&self) -> String {
        match self {
            StreamError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            StreamError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(e: reqwest::Error) -> Self {
        StreamError::Network(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_uses_server_text() {
        let err = StreamError::Api {
            status: 500,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.user_message(), "overloaded");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_network_message() {
        let err = StreamError::Network("connection reset".to_string());
        assert_eq!(err.user_message(), "network error: connection reset");
        assert_eq!(err.status(), None);
    }
}
