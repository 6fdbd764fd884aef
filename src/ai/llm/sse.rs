//! Server-sent event frame decoding for OpenAI-compatible streams
//!
//! Turns raw body chunks into `DeltaEvent`s, one per `data:` line. The
//! `data: [DONE]` sentinel ends the sequence. Lines that are not valid UTF-8
//! or not valid JSON are logged and skipped.

use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;

use super::{ByteStream, DeltaEvent, LlmError};

const DONE_SENTINEL: &str = "[DONE]";

/// A single decoded line of the event stream
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(DeltaEvent),
    /// The provider reported an error inside the stream
    ApiError(String),
    Done,
}

/// Incremental line decoder
///
/// Bytes are buffered until a full line is available, so a multi-byte UTF-8
/// sequence split across two reads is only decoded once both halves arrived.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning every frame completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(frame) = decode_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }

}

fn decode_line(raw: &[u8]) -> Option<Frame> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => {
            log::warn!("[FrameDecoder] Skipping line with invalid UTF-8: {}", e);
            return None;
        }
    };

    // Blank separators, comments and non-data fields carry nothing for us
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data.trim() == DONE_SENTINEL {
        return Some(Frame::Done);
    }

    match serde_json::from_str::<OpenAIStreamChunk>(data) {
        Ok(chunk) => Some(chunk.into_frame()),
        Err(e) => {
            log::warn!("[FrameDecoder] Skipping malformed frame: {} - data: {}", e, data);
            None
        }
    }
}

/// Decode a response body into a finite sequence of events
///
/// The sequence ends at `[DONE]`, at the end of the body, or after the first
/// error (transport failure or an in-stream provider error). Nothing is
/// retried here.
pub fn decode_events(
    bytes: ByteStream,
) -> impl Stream<Item = Result<DeltaEvent, LlmError>> + Send {
    let state = DecodeState {
        bytes,
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                match frame {
                    Frame::Event(event) => return Some((Ok(event), state)),
                    Frame::ApiError(message) => {
                        state.finished = true;
                        state.pending.clear();
                        return Some((Err(LlmError::StreamError(message)), state));
                    }
                    Frame::Done => {
                        log::debug!("[FrameDecoder] Received [DONE]");
                        return None;
                    }
                }
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(&chunk);
                    state.pending.extend(frames);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    if let Some(frame) = state.decoder.finish() {
                        state.pending.push_back(frame);
                    }
                }
            }
        }
    })
}

struct DecodeState {
    bytes: ByteStream,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    finished: bool,
}

// ============================================================================
// OpenAI Stream Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: Option<OpenAIStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

impl OpenAIStreamChunk {
    fn into_frame(self) -> Frame {
        if let Some(error) = self.error {
            return Frame::ApiError(error_message(&error));
        }

        // Only the first choice is consumed
        let Some(choice) = self.choices.into_iter().next() else {
            return Frame::Event(DeltaEvent::default());
        };
        let (content, reasoning_content) = match choice.delta {
            Some(delta) => (delta.content, delta.reasoning_content),
            None => (None, None),
        };

        Frame::Event(DeltaEvent {
            content,
            reasoning_content,
            finish_reason: choice.finish_reason,
        })
    }
}

fn error_message(error: &Value) -> String {
    if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
        return message.to_string();
    }
    if let Some(message) = error.as_str() {
        return message.to_string();
    }
    "An error occurred during streaming".to_string()
}
