//! Event-Stream Framing and Frame Decoding

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::GenerationError;

/// Prefix carried by every payload line
pub const DATA_PREFIX: &str = "data:";

/// Payload that ends a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits raw transport chunks into complete lines
///
/// Bytes after the last newline are held until the next chunk, so neither a
/// line nor a multi-byte UTF-8 sequence is ever split across calls.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline
    scanned: usize,
}

impl LineFramer {
    /// Create an empty framer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            let mut line = &self.pending[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Flush an unterminated trailing line at end of input
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&line).trim_end_matches('\r').to_string())
    }
}

/// Payload of a `data:` line, with one optional space after the prefix removed
#[must_use]
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(DATA_PREFIX)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Turns one frame payload into text
pub trait FrameDecoder: Send + 'static {
    /// Decode a payload
    ///
    /// `Ok(None)` means the frame carries no text. A recoverable error
    /// ([`GenerationError::Parse`]) skips the frame; any other error ends the
    /// stream.
    fn decode(&self, payload: &str) -> Result<Option<String>, GenerationError>;
}

// =============================================================================
// Chat Completion Frames
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: Option<ChatDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decoder for chat-completion frames: `{"choices":[{"delta":{"content":…}}]}`
#[derive(Clone, Copy, Debug, Default)]
pub struct ChatDeltaDecoder;

impl FrameDecoder for ChatDeltaDecoder {
    fn decode(&self, payload: &str) -> Result<Option<String>, GenerationError> {
        let chunk: ChatChunk =
            serde_json::from_str(payload).map_err(|e| GenerationError::Parse(e.to_string()))?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|text| !text.is_empty()))
    }
}

// =============================================================================
// Presentation Frames
// =============================================================================

/// Status value marking an error frame
const PRESENTATION_ERROR_STATUS: i64 = -1;

/// Status value of the frame that closes a one-call deck generation
const PRESENTATION_COMPLETE_STATUS: i64 = 4;

/// Receives the `result` object carried by a completing presentation frame
pub type ResultSlot = Arc<Mutex<Option<serde_json::Value>>>;

#[derive(Debug, Deserialize)]
struct PresentationFrame {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Decoder for presentation frames: `{"status":…,"text":…,"error":…}`
///
/// Progress text is the delta. With a [`ResultSlot`] attached, the `result`
/// object of a `status: 4` frame is stored there as well.
#[derive(Clone, Debug)]
pub struct PresentationDecoder {
    operation: &'static str,
    result: Option<ResultSlot>,
}

impl PresentationDecoder {
    /// Decoder for the named provider operation (used in error messages)
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            result: None,
        }
    }

    /// Capture the completing frame's `result` into `slot`
    #[must_use]
    pub fn with_result_slot(mut self, slot: ResultSlot) -> Self {
        self.result = Some(slot);
        self
    }
}

impl FrameDecoder for PresentationDecoder {
    fn decode(&self, payload: &str) -> Result<Option<String>, GenerationError> {
        let frame: PresentationFrame =
            serde_json::from_str(payload).map_err(|e| GenerationError::Parse(e.to_string()))?;
        if frame.status == PRESENTATION_ERROR_STATUS {
            let message = frame
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "generation failed".to_string());
            return Err(GenerationError::provider(self.operation, message));
        }
        if frame.status == PRESENTATION_COMPLETE_STATUS {
            if let (Some(slot), Some(result)) = (&self.result, frame.result) {
                *slot.lock() = Some(result);
            }
        }
        Ok(frame.text.filter(|text| !text.is_empty()))
    }
}
