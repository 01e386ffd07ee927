//! SSE (Server-Sent Events) frame parser
//!
//! Parses the event-stream wire format into [`Frame`]s:
//!
//! ```text
//! event: put
//! data: {"path":"/","data":{"x":{"v":1}}}
//!
//! event: keep-alive
//! data: null
//!
//! ```
//!
//! A parser lives for exactly one physical connection.

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, trace};

use super::types::{Frame, Payload, StreamError, StreamResult};

/// SSE parser state
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Buffer for incomplete lines
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline
    scanned: usize,
    /// Current event data being accumulated
    data_buffer: String,
    /// Whether any `data:` line was seen for the current event
    has_data: bool,
    /// Current event type (if any)
    event_type: Option<String>,
}

impl FrameParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and extract any complete frames
    pub fn feed(&mut self, bytes: Bytes) -> Vec<StreamResult<Frame>> {
        let mut frames = Vec::new();

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(&bytes);

        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = buffer[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + offset;
            let line = &buffer[start..end];

            // Handle \r\n line endings
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
            start = end + 1;
            cursor = start;
        }

        buffer.drain(..start);
        self.scanned = buffer.len();
        self.buffer = buffer;

        frames
    }

    /// Process a single line of SSE data
    fn process_line(&mut self, line: &[u8]) -> Option<StreamResult<Frame>> {
        // Empty line signals end of event
        if line.is_empty() {
            return self.dispatch_event();
        }

        // Comment line
        if line.starts_with(b":") {
            trace!("SSE comment");
            return None;
        }

        let line_str = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                self.reset_event();
                return Some(Err(StreamError::Parse("Invalid UTF-8 in SSE line".into())));
            }
        };

        // Split on first colon
        let (field, value) = match line_str.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line_str, ""),
        };

        match field {
            "data" => {
                // Multiple data lines are joined with newlines
                if self.has_data {
                    self.data_buffer.push('\n');
                }
                self.data_buffer.push_str(value);
                self.has_data = true;
            }
            "event" => {
                self.event_type = Some(value.to_string());
            }
            "id" | "retry" => {
                trace!("SSE {}: {}", field, value);
            }
            _ => {
                trace!("SSE unknown field: {}", field);
            }
        }

        None
    }

    fn reset_event(&mut self) {
        self.data_buffer.clear();
        self.has_data = false;
        self.event_type = None;
    }

    /// Dispatch the accumulated event
    fn dispatch_event(&mut self) -> Option<StreamResult<Frame>> {
        let event_type = self.event_type.take();
        let has_data = std::mem::take(&mut self.has_data);
        let data = std::mem::take(&mut self.data_buffer);

        let event_type = match event_type {
            Some(event) if !event.is_empty() => event,
            _ if !has_data => return None, // stray blank line
            _ => {
                return Some(Err(StreamError::Parse(format!(
                    "Frame without event name (data: {})",
                    preview(&data)
                ))))
            }
        };

        let value = if has_data {
            match serde_json::from_str::<Value>(&data) {
                Ok(value) => value,
                Err(e) => {
                    return Some(Err(StreamError::Parse(format!(
                        "Failed to parse {} data: {} (data: {})",
                        event_type,
                        e,
                        preview(&data)
                    ))))
                }
            }
        } else {
            Value::Null
        };

        let frame = match event_type.as_str() {
            "put" => parse_payload(&event_type, value).map(Frame::Put),
            "patch" => parse_payload(&event_type, value).map(Frame::Patch),
            "keep-alive" => Ok(Frame::KeepAlive),
            "cancel" => Ok(Frame::Cancel(reason(value))),
            "auth_revoked" => Ok(Frame::AuthRevoked(reason(value))),
            other => {
                debug!("Skipping unknown stream event: {}", other);
                return None;
            }
        };

        Some(frame)
    }
}

fn parse_payload(event_type: &str, value: Value) -> StreamResult<Payload> {
    serde_json::from_value(value).map_err(|e| {
        StreamError::Parse(format!(
            "{} frame is not a {{path, data}} object: {}",
            event_type, e
        ))
    })
}

fn reason(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn preview(data: &str) -> String {
    if data.len() > 100 {
        let mut end = 100;
        while !data.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &data[..end])
    } else {
        data.to_string()
    }
}
