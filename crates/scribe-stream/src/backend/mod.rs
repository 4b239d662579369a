pub mod config;
pub mod http;

pub use config::{BackendConfig, DEFAULT_ENDPOINT};
pub use http::HttpChatBackend;

use async_trait::async_trait;
use futures::Stream;
use scribe_core::{Message, StreamEvent};
use std::pin::Pin;

use crate::error::Result;

/// Semantic events of one exchange, already decoded and extracted.
///
/// `Ignore` never reaches consumers. The stream yields exactly one
/// `StreamEnd` (on the sentinel or on transport close) unless it fails first.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Remote chat endpoint
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Send the whole conversation and open the reply stream.
    ///
    /// Resolves once response headers are in: `Ok` means a 2xx status, the
    /// body is consumed lazily through the returned stream.
    async fn open_stream(&self, messages: &[Message]) -> Result<EventStream>;
}
