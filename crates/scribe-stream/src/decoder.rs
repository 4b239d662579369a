//! Byte chunks → complete text lines.
//!
//! A streamed response body arrives in reads whose boundaries have nothing to
//! do with the protocol: a line, or a single multi-byte character, can be
//! split across any number of reads. [`FrameDecoder`] decodes in streaming
//! mode and only hands out a line once its terminator has been seen.

use encoding_rs::{CoderResult, Decoder, Encoding};
use futures::{Stream, StreamExt};

/// Incremental line decoder for one exchange.
pub struct FrameDecoder {
    encoding: &'static Encoding,
    decoder: Decoder,
    pending: String,
}

impl FrameDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            decoder: encoding.new_decoder_with_bom_removal(),
            pending: String::new(),
        }
    }

    pub fn utf8() -> Self {
        Self::new(encoding_rs::UTF_8)
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Text received after the last terminator
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Feed one chunk, returning every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk, false);
        self.drain_lines()
    }

    /// End of stream: flush the decoder and hand out whatever is left as a
    /// final line. The decoder is ready for a new exchange afterwards.
    pub fn finish(&mut self) -> Vec<String> {
        self.decode(&[], true);
        let mut lines = self.drain_lines();
        let mut rest = std::mem::take(&mut self.pending);
        if rest.ends_with('\r') {
            rest.pop();
        }
        if !rest.is_empty() {
            lines.push(rest);
        }
        self.reset();
        lines
    }

    pub fn reset(&mut self) {
        self.decoder = self.encoding.new_decoder_with_bom_removal();
        self.pending.clear();
    }

    fn decode(&mut self, mut src: &[u8], last: bool) {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len().saturating_mul(3) + 16);
            self.pending.reserve(needed);

            let (result, read, _had_replacements) =
                self.decoder.decode_to_string(src, &mut self.pending, last);
            src = &src[read..];

            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("encoding", &self.encoding.name())
            .field("pending", &self.pending)
            .finish()
    }
}

/// Lazily turn a byte stream into a line stream.
///
/// Transport errors are passed through unchanged and end nothing by
/// themselves; the consumer decides what an error means.
pub fn decode_lines<S, B, E>(
    stream: S,
    encoding: &'static Encoding,
) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::try_stream! {
        let mut decoder = FrameDecoder::new(encoding);
        futures::pin_mut!(stream);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in decoder.push(chunk.as_ref()) {
                yield line;
            }
        }

        for line in decoder.finish() {
            yield line;
        }
    }
}
