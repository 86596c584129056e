// Server-Sent Events decoding over a chunked HTTP body
use crate::application::telemetry_source::{EventStream, StreamEvent};
use crate::error::TelemetryError;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};

/// Incremental `text/event-stream` decoder.
///
/// Chunks may split lines and events anywhere; complete events are returned as
/// soon as their terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    pending: PendingEvent,
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry_ms: Option<u64>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r')?;

        // A trailing CR may be the first half of CRLF.
        if self.buffer[pos] == b'\r' && pos + 1 == self.buffer.len() {
            return None;
        }

        let line = self.buffer.split_to(pos);
        let terminator = if self.buffer[0] == b'\r' && self.buffer.get(1) == Some(&b'\n') {
            2
        } else {
            1
        };
        self.buffer.advance(terminator);

        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data.push(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            "retry" => self.pending.retry_ms = value.trim().parse().ok(),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let pending = std::mem::take(&mut self.pending);
        if pending.data.is_empty() && pending.retry_ms.is_none() {
            return None;
        }
        Some(StreamEvent {
            event: pending.event,
            data: pending.data.join("\n"),
            id: pending.id,
            retry_ms: pending.retry_ms,
        })
    }
}

/// Turn a response body into a stream of decoded events.
/// A body error is yielded once and ends the stream.
pub fn decode_event_stream<S>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let events = async_stream::stream! {
        let mut decoder = SseDecoder::default();
        let mut body = Box::pin(body);
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.push(&chunk) {
                        yield Ok::<StreamEvent, TelemetryError>(event);
                    }
                }
                Err(e) => {
                    yield Err(TelemetryError::from(e));
                    break;
                }
            }
        }
    };
    events.boxed()
}
