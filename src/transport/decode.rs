//! Incremental stream frame decoding (bytes -> JSON values).
//!
//! Works on raw byte chunks so the same decoder drives both the blocking and
//! the async transports.

use bytes::BytesMut;
use serde_json::Value;
use std::collections::VecDeque;

/// Wire framing of a streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Server-sent events: frames separated by a blank line, payload on `data:` lines.
    Sse,
    /// One JSON object per line.
    Ndjson,
}

const DONE_SIGNAL: &str = "[DONE]";

#[derive(Debug)]
pub struct FrameDecoder {
    format: StreamFormat,
    buf: BytesMut,
    ready: VecDeque<Value>,
    done: bool,
}

impl FrameDecoder {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            buf: BytesMut::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// `true` once the `[DONE]` sentinel was seen; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.done {
            return;
        }
        self.buf
            .extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        let delimiter: &[u8] = match self.format {
            StreamFormat::Sse => b"\n\n",
            StreamFormat::Ndjson => b"\n",
        };
        while let Some(idx) = find(&self.buf, delimiter) {
            let frame = self.buf.split_to(idx + delimiter.len());
            self.decode_frame(&frame[..idx]);
            if self.done {
                self.buf.clear();
                break;
            }
        }
    }

    /// Decode whatever is left in the buffer at end of input.
    pub fn finish(&mut self) {
        if !self.done && !self.buf.is_empty() {
            let rest = self.buf.split();
            self.decode_frame(&rest);
        }
    }

    pub fn next_value(&mut self) -> Option<Value> {
        self.ready.pop_front()
    }

    fn decode_frame(&mut self, frame: &[u8]) {
        let text = String::from_utf8_lossy(frame);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let payload = match self.format {
            StreamFormat::Ndjson => text.to_string(),
            StreamFormat::Sse => {
                let mut data_lines = Vec::new();
                let mut saw_field = false;
                for line in text.lines() {
                    if line.starts_with(':') {
                        saw_field = true;
                        continue;
                    }
                    if let Some(data) = line.strip_prefix("data:") {
                        data_lines.push(data.strip_prefix(' ').unwrap_or(data));
                    } else if line.starts_with("event:")
                        || line.starts_with("id:")
                        || line.starts_with("retry:")
                    {
                        saw_field = true;
                    } else if !saw_field && data_lines.is_empty() {
                        // Bare JSON frame without an SSE field name.
                        data_lines.push(line);
                    }
                }
                data_lines.join("\n")
            }
        };

        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SIGNAL {
            self.done = true;
            return;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(v) => self.ready.push_back(v),
            Err(e) => tracing::debug!(error = %e, frame = payload, "skipping undecodable stream frame"),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
