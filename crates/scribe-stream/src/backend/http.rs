use async_trait::async_trait;
use encoding_rs::Encoding;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{header, Client, Response};
use scribe_core::{ChatRequest, ChatResponse, ErrorBody, Message, StreamEvent};
use tracing::{debug, warn};

use super::{BackendConfig, ChatBackend, EventStream};
use crate::decoder::decode_lines;
use crate::error::{Result, StreamError};
use crate::extractor::{EventExtractor, FrameFormat};

/// HTTP implementation of [`ChatBackend`].
///
/// No request timeout and no retry: a stalled call is ended by the transport,
/// a failed one is reported once.
pub struct HttpChatBackend {
    config: BackendConfig,
    http_client: Client,
    headers: header::HeaderMap,
    default_encoding: &'static Encoding,
}

impl HttpChatBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        reqwest::Url::parse(&config.endpoint).map_err(|e| {
            StreamError::Config(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;

        let default_encoding = Encoding::for_label(config.default_encoding.as_bytes())
            .ok_or_else(|| {
                StreamError::Config(format!("unknown encoding '{}'", config.default_encoding))
            })?;

        let headers = build_headers(&config)?;
        let http_client = Client::builder()
            .build()
            .map_err(|e| StreamError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            headers,
            default_encoding,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

fn build_headers(config: &BackendConfig) -> Result<header::HeaderMap> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    for (key, value) in &config.headers {
        let name = header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| StreamError::Config(format!("Invalid header name: {}", e)))?;
        let value = header::HeaderValue::from_str(value)
            .map_err(|e| StreamError::Config(format!("Invalid header value: {}", e)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn open_stream(&self, messages: &[Message]) -> Result<EventStream> {
        let request = ChatRequest::new(messages.to_vec());
        debug!(endpoint = %self.config.endpoint, messages = messages.len(), "sending chat request");

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = ErrorBody::describe(&body, status.as_u16());
            warn!(status = status.as_u16(), message = %message, "chat endpoint returned an error");
            return Err(StreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let encoding = charset(&content_type).unwrap_or(self.default_encoding);
        debug!(content_type = %content_type, encoding = encoding.name(), "response headers received");

        if is_json(&content_type) {
            Ok(Box::pin(single_reply(response, encoding)))
        } else {
            Ok(Box::pin(streamed_reply(
                response,
                encoding,
                self.config.format.clone(),
            )))
        }
    }
}

/// `application/json`: the whole reply in one object.
fn single_reply(
    response: Response,
    encoding: &'static Encoding,
) -> impl Stream<Item = Result<StreamEvent>> + Send {
    async_stream::try_stream! {
        let bytes = response.bytes().await?;
        let (text, _, _) = encoding.decode(&bytes);
        let reply: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| StreamError::Decode(e.to_string()))?;

        if !reply.text().is_empty() {
            yield StreamEvent::delta(reply.response);
        }
        yield StreamEvent::StreamEnd;
    }
}

/// Marker-framed lines, ended by the sentinel or by transport close.
fn streamed_reply(
    response: Response,
    encoding: &'static Encoding,
    format: FrameFormat,
) -> impl Stream<Item = Result<StreamEvent>> + Send {
    async_stream::try_stream! {
        let mut extractor = EventExtractor::new(format);
        let lines = decode_lines(response.bytes_stream().map_err(StreamError::from), encoding);
        futures::pin_mut!(lines);

        let mut sentinel_seen = false;
        while let Some(line) = lines.next().await {
            let line = line?;
            match extractor.extract(&line) {
                StreamEvent::Ignore => continue,
                StreamEvent::StreamEnd => {
                    sentinel_seen = true;
                    break;
                }
                delta => {
                    yield delta;
                }
            }
        }

        extractor.finish();
        let stats = extractor.stats();
        debug!(
            lines = stats.lines,
            deltas = stats.deltas,
            ignored = stats.ignored,
            recovered = stats.recovered,
            dropped = stats.dropped,
            sentinel_seen,
            "stream finished"
        );
        yield StreamEvent::StreamEnd;
    }
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

fn is_json(content_type: &str) -> bool {
    media_type(content_type).eq_ignore_ascii_case("application/json")
}

/// Encoding declared by a `Content-Type` charset parameter
fn charset(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches('"').as_bytes())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_parsing() {
        assert_eq!(charset("text/event-stream; charset=utf-8"), Some(encoding_rs::UTF_8));
        assert_eq!(
            charset("text/plain;Charset=\"windows-1252\""),
            Some(encoding_rs::WINDOWS_1252)
        );
        assert_eq!(charset("text/event-stream"), None);
        assert_eq!(charset("text/plain; charset=no-such-thing"), None);
    }

    #[test]
    fn test_json_detection() {
        assert!(is_json("application/json"));
        assert!(is_json("Application/JSON; charset=utf-8"));
        assert!(!is_json("text/event-stream"));
        assert!(!is_json(""));
    }

    #[test]
    fn test_rejects_bad_config() {
        let err = HttpChatBackend::new(BackendConfig::new("not a url")).err().unwrap();
        assert!(matches!(err, StreamError::Config(_)));

        let err = HttpChatBackend::new(BackendConfig::default().with_default_encoding("klingon"))
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Config(_)));

        let err = HttpChatBackend::new(BackendConfig::default().with_header("bad header", "v"))
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Config(_)));
    }

    #[test]
    fn test_endpoint() {
        let backend = HttpChatBackend::new(BackendConfig::default()).unwrap();
        assert_eq!(backend.endpoint(), crate::backend::DEFAULT_ENDPOINT);
    }
}
