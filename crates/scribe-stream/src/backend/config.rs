use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::extractor::FrameFormat;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8787/api/chat";

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Chat endpoint the conversation is POSTed to
    pub endpoint: String,
    /// Additional headers to include
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Framing of streamed replies
    #[serde(default)]
    pub format: FrameFormat,
    /// Encoding label used when the response declares no charset
    #[serde(default = "default_encoding")]
    pub default_encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl BackendConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_format(mut self, format: FrameFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_encoding(mut self, label: impl Into<String>) -> Self {
        self.default_encoding = label.into();
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            headers: HashMap::new(),
            format: FrameFormat::default(),
            default_encoding: default_encoding(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let config: BackendConfig =
            serde_json::from_str(r#"{"endpoint":"http://chat.internal/api"}"#).unwrap();
        assert_eq!(config.endpoint, "http://chat.internal/api");
        assert_eq!(config.format, FrameFormat::default());
        assert_eq!(config.default_encoding, "utf-8");
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = BackendConfig::default()
            .with_header("X-Client", "scribe")
            .with_format(FrameFormat::json_lines());
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.headers.get("X-Client").map(String::as_str), Some("scribe"));
        assert_eq!(config.format.marker, None);
    }
}
