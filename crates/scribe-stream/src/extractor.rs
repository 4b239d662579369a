//! One decoded line → one [`StreamEvent`].
//!
//! Nothing in here can fail an exchange. A frame that does not parse is kept
//! and retried once together with the next line (upstreams occasionally
//! break a JSON payload across two lines); if that still does not parse the
//! frame is dropped and logged.

use scribe_core::StreamEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Framing conventions of the upstream stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    /// Data-field prefix (`data:` for event streams). `None` treats every
    /// non-blank line as a payload (bare JSON lines).
    #[serde(default = "default_marker")]
    pub marker: Option<String>,
    /// Payload that terminates the stream
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    /// JSON field holding the text delta
    #[serde(default = "default_text_field")]
    pub text_field: String,
}

fn default_marker() -> Option<String> {
    Some("data:".to_string())
}

fn default_sentinel() -> String {
    "[DONE]".to_string()
}

fn default_text_field() -> String {
    "response".to_string()
}

impl FrameFormat {
    /// Bare JSON lines, no data marker
    pub fn json_lines() -> Self {
        Self {
            marker: None,
            ..Self::default()
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            sentinel: default_sentinel(),
            text_field: default_text_field(),
        }
    }
}

/// Per-exchange extraction counters, logged when the stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractorStats {
    pub lines: u64,
    pub deltas: u64,
    pub ignored: u64,
    pub recovered: u64,
    pub dropped: u64,
}

#[derive(Debug)]
pub struct EventExtractor {
    format: FrameFormat,
    /// Payload of the last frame that failed to parse, awaiting its one retry
    pending: Option<String>,
    stats: ExtractorStats,
}

impl EventExtractor {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            pending: None,
            stats: ExtractorStats::default(),
        }
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Classify one line.
    pub fn extract(&mut self, line: &str) -> StreamEvent {
        self.stats.lines += 1;

        if let Some(pending) = self.pending.take() {
            let combined = format!("{}{}", pending, line);
            match self.parse_payload(combined.trim()) {
                Ok(event) => {
                    debug!("recovered frame split across two lines");
                    self.stats.recovered += 1;
                    return self.record(event);
                }
                Err(e) => {
                    warn!(error = %e, frame = %pending, "dropping unparseable frame after retry");
                    self.stats.dropped += 1;
                }
            }
        }

        if line.trim().is_empty() {
            return self.record(StreamEvent::Ignore);
        }

        let payload = match self.strip_marker(line) {
            Some(payload) => payload,
            None => {
                debug!(line = %line, "ignoring line without data marker");
                return self.record(StreamEvent::Ignore);
            }
        };

        let trimmed = payload.trim();
        if trimmed.is_empty() {
            return self.record(StreamEvent::Ignore);
        }

        match self.parse_payload(trimmed) {
            Ok(event) => self.record(event),
            Err(e) => {
                debug!(error = %e, payload = %trimmed, "frame did not parse, holding for one retry");
                self.pending = Some(payload.trim_start().to_string());
                self.record(StreamEvent::Ignore)
            }
        }
    }

    /// End of stream. Returns the payload of a frame that never completed.
    pub fn finish(&mut self) -> Option<String> {
        let dropped = self.pending.take();
        if let Some(ref frame) = dropped {
            warn!(frame = %frame, "stream ended with an incomplete frame");
            self.stats.dropped += 1;
        }
        dropped
    }

    fn strip_marker<'a>(&self, line: &'a str) -> Option<&'a str> {
        match self.format.marker.as_deref() {
            Some(marker) => line.strip_prefix(marker),
            None => Some(line),
        }
    }

    fn parse_payload(&self, payload: &str) -> Result<StreamEvent, serde_json::Error> {
        if payload == self.format.sentinel {
            return Ok(StreamEvent::StreamEnd);
        }

        let value: Value = serde_json::from_str(payload)?;
        let event = match value.get(&self.format.text_field).and_then(Value::as_str) {
            Some(text) if !text.is_empty() => StreamEvent::delta(text),
            _ => StreamEvent::Ignore,
        };
        Ok(event)
    }

    fn record(&mut self, event: StreamEvent) -> StreamEvent {
        match event {
            StreamEvent::TextDelta { .. } => self.stats.deltas += 1,
            StreamEvent::Ignore => self.stats.ignored += 1,
            StreamEvent::StreamEnd => {}
        }
        event
    }
}

impl Default for EventExtractor {
    fn default() -> Self {
        Self::new(FrameFormat::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta() {
        let mut extractor = EventExtractor::default();
        assert_eq!(
            extractor.extract(r#"data: {"response":"Hello"}"#),
            StreamEvent::delta("Hello")
        );
        // marker without the space
        assert_eq!(
            extractor.extract(r#"data:{"response":" world"}"#),
            StreamEvent::delta(" world")
        );
    }

    #[test]
    fn test_frame_split_across_chunks_yields_one_delta() {
        let mut decoder = crate::FrameDecoder::utf8();
        let mut extractor = EventExtractor::default();

        let mut events = Vec::new();
        for chunk in ["data: {\"respo", "nse\":\"hi\"}\n"] {
            for line in decoder.push(chunk.as_bytes()) {
                events.push(extractor.extract(&line));
            }
        }
        for line in decoder.finish() {
            events.push(extractor.extract(&line));
        }

        assert_eq!(events, vec![StreamEvent::delta("hi")]);
    }

    #[test]
    fn test_sentinel() {
        let mut extractor = EventExtractor::default();
        assert_eq!(extractor.extract("data: [DONE]"), StreamEvent::StreamEnd);
        assert_eq!(extractor.extract("data:   [DONE]  "), StreamEvent::StreamEnd);
    }

    #[test]
    fn test_ignored_lines() {
        let mut extractor = EventExtractor::default();
        assert_eq!(extractor.extract(""), StreamEvent::Ignore);
        assert_eq!(extractor.extract("   "), StreamEvent::Ignore);
        assert_eq!(extractor.extract(": keep-alive"), StreamEvent::Ignore);
        assert_eq!(extractor.extract("event: message"), StreamEvent::Ignore);
        assert_eq!(extractor.extract(r#"{"response":"bare"}"#), StreamEvent::Ignore);
        assert_eq!(extractor.extract("data:"), StreamEvent::Ignore);
        // parsed but carries no text
        assert_eq!(
            extractor.extract(r#"data: {"usage":{"total_tokens":3}}"#),
            StreamEvent::Ignore
        );
        assert_eq!(extractor.extract(r#"data: {"response":""}"#), StreamEvent::Ignore);
        assert!(!extractor.has_pending());
    }

    #[test]
    fn test_split_frame_recovered_with_next_line() {
        let mut extractor = EventExtractor::default();
        assert_eq!(extractor.extract(r#"data: {"response":"hel"#), StreamEvent::Ignore);
        assert!(extractor.has_pending());

        assert_eq!(extractor.extract(r#"lo there"}"#), StreamEvent::delta("hello there"));
        assert!(!extractor.has_pending());
        assert_eq!(extractor.stats().recovered, 1);
    }

    #[test]
    fn test_split_frame_keeps_inner_whitespace() {
        let mut extractor = EventExtractor::default();
        extractor.extract(r#"data: {"response":"a "#);
        assert_eq!(extractor.extract(r#"b"}"#), StreamEvent::delta("a b"));
    }

    #[test]
    fn test_retry_is_bounded_to_one_line() {
        let mut extractor = EventExtractor::default();
        extractor.extract(r#"data: {"response":"x"#);
        // the retry fails, the held frame is dropped and this line is judged on its own
        assert_eq!(extractor.extract(r#"data: {"response":"next"}"#), StreamEvent::delta("next"));
        assert!(!extractor.has_pending());
        assert_eq!(extractor.stats().dropped, 1);
    }

    #[test]
    fn test_retry_failure_does_not_swallow_sentinel() {
        let mut extractor = EventExtractor::default();
        extractor.extract(r#"data: {"response":"x"#);
        assert_eq!(extractor.extract("data: [DONE]"), StreamEvent::StreamEnd);
    }

    #[test]
    fn test_garbage_never_accumulates() {
        let mut extractor = EventExtractor::default();
        for _ in 0..10 {
            assert_eq!(extractor.extract("data: {{{"), StreamEvent::Ignore);
        }
        // each garbage line replaced the previous one after its single retry
        assert_eq!(extractor.finish(), Some("{{{".to_string()));
        assert_eq!(extractor.stats().dropped, 10);
    }

    #[test]
    fn test_finish_without_pending() {
        let mut extractor = EventExtractor::default();
        extractor.extract(r#"data: {"response":"ok"}"#);
        assert_eq!(extractor.finish(), None);
    }

    #[test]
    fn test_json_lines_format() {
        let mut extractor = EventExtractor::new(FrameFormat::json_lines());
        assert_eq!(extractor.extract(r#"{"response":"bare"}"#), StreamEvent::delta("bare"));
        assert_eq!(extractor.extract("[DONE]"), StreamEvent::StreamEnd);
    }

    #[test]
    fn test_custom_field_and_sentinel() {
        let format = FrameFormat::default()
            .with_text_field("text")
            .with_sentinel("[END]");
        let mut extractor = EventExtractor::new(format);
        assert_eq!(extractor.extract(r#"data: {"text":"t"}"#), StreamEvent::delta("t"));
        assert_eq!(extractor.extract("data: [END]"), StreamEvent::StreamEnd);
        assert_eq!(extractor.extract(r#"data: {"response":"r"}"#), StreamEvent::Ignore);
    }

    #[test]
    fn test_stats() {
        let mut extractor = EventExtractor::default();
        extractor.extract(r#"data: {"response":"a"}"#);
        extractor.extract("");
        extractor.extract("data: [DONE]");

        let stats = extractor.stats();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.deltas, 1);
        assert_eq!(stats.ignored, 1);
    }
}
