// =====================================================================================
// STREAM TRANSPORT - SSE OVER HTTP
// =====================================================================================

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::ACCEPT;
use tracing::{debug, instrument};

use crate::models::{SseFrame, StreamError};

pub type FrameStream = BoxStream<'static, Result<SseFrame, StreamError>>;

/// Opens one stream connection. A returned stream ending or yielding an error
/// both mean the connection is gone.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<FrameStream, StreamError>;
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every frame completed by them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// `reqwest` client reading the SSE endpoint as a byte stream.
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
}

impl SseTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl StreamTransport for SseTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> Result<FrameStream, StreamError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }
        debug!("Stream response received");

        let bytes = response.bytes_stream().boxed();
        let state = (bytes, SseParser::new(), VecDeque::<SseFrame>::new(), false);

        let frames = stream::unfold(state, |(mut bytes, mut parser, mut pending, done)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (bytes, parser, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(parser.feed(&chunk)),
                    Some(Err(e)) => {
                        return Some((Err(StreamError::from(e)), (bytes, parser, pending, true)));
                    }
                    None => return None,
                }
            }
        });

        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_handles_split_chunks_and_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: met").is_empty());
        assert!(parser.feed(b"ric\r\ndata: {\"a\":").is_empty());
        let frames = parser.feed(b"1}\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("metric", "{\"a\":1}")]);
    }

    #[test]
    fn test_parser_joins_data_lines_and_skips_comments() {
        let mut parser = SseParser::new();
        let frames = parser.feed(b": keep-alive\n\ndata: one\ndata: two\n\nevent: ping\ndata: {\"t\":5}\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::new("message", "one\ntwo"),
                SseFrame::new("ping", "{\"t\":5}"),
            ]
        );
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: alert\n\n").is_empty());
        let frames = parser.feed(b"data: x\n\n");
        assert_eq!(frames, vec![SseFrame::new("message", "x")]);
    }
}
