use scribe_session::StorageError;
use scribe_stream::StreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyInput,

    /// Another exchange is in flight
    #[error("an exchange is already in progress")]
    Busy,

    #[error(transparent)]
    Transport(#[from] StreamError),

    /// The stream closed without any text
    #[error("no response")]
    EmptyResponse,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("no assistant response #{0}")]
    NoSuchResponse(usize),

    #[error("clipboard error: {0}")]
    Clipboard(String),
}

impl ChatError {
    /// Text of the notice shown in place of a failed reply.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Transport(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
