use serde::{Deserialize, Serialize};

/// Non-streaming reply: a single JSON object carrying the whole text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: String,
}

impl ChatResponse {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.response
    }
}

/// Optional JSON body of a non-2xx reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Parse an error body, `None` when it is not JSON of the expected shape
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// The text shown to the user, `details` taking precedence over `error`
    pub fn message(&self) -> Option<&str> {
        self.details
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.error.as_deref().filter(|s| !s.is_empty()))
    }

    /// User-visible message for a failed call with status `status`
    pub fn describe(body: &str, status: u16) -> String {
        Self::parse(body)
            .as_ref()
            .and_then(|b| b.message().map(str::to_string))
            .unwrap_or_else(|| format!("server error {}", status))
    }
}
