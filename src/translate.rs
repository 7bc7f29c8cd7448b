//! Re-framing of agent backend replies into the chat stream protocol.
//!
//! A streaming reply is forwarded line by line as it arrives. An atomic JSON
//! reply is expanded into one frame per part and replayed with a pacing delay
//! so the UI sees it arrive incrementally.

use crate::backend::ChatPayload;
use crate::error::TranslateError;
use crate::protocol::{Finish, Frame, ToolCall};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay inserted after each synthesized frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub after_card: Duration,
    pub after_text: Duration,
}

impl Pacing {
    pub const fn none() -> Self {
        Self {
            after_card: Duration::ZERO,
            after_text: Duration::ZERO,
        }
    }

    fn delay_after(&self, frame: &Frame) -> Duration {
        match frame {
            Frame::ToolCall(_) => self.after_card,
            Frame::Text(_) => self.after_text,
            _ => Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_card: Duration::from_millis(200),
            after_text: Duration::from_millis(100),
        }
    }
}

/// An encoded frame and the pause that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct PacedLine {
    pub line: Bytes,
    pub delay: Duration,
}

/// Expands an atomic backend answer into frames, terminated by one finish frame.
pub fn payload_frames(payload: ChatPayload) -> Result<Vec<Frame>, TranslateError> {
    if !payload.ok {
        return Err(TranslateError::Rejected(payload.error_message()));
    }

    let mut frames = Vec::new();
    let mut cards = 0;

    match payload.parts {
        Some(parts) if !parts.is_empty() => {
            for part in parts {
                if part.get("type").and_then(Value::as_str) == Some("text") {
                    let text = part
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    frames.push(Frame::Text(text));
                } else {
                    let call = ToolCall::thought_card(cards, &part).map_err(TranslateError::Encode)?;
                    frames.push(Frame::ToolCall(call));
                    cards += 1;
                }
            }
        }
        _ => {
            let content = payload
                .message
                .and_then(|message| message.content)
                .unwrap_or_default();
            frames.push(Frame::Text(content));
        }
    }

    frames.push(Frame::Finish(Finish::stop(payload.usage)));
    Ok(frames)
}

/// Encodes every frame up front so encoding failures surface before the
/// response starts.
pub fn pace(frames: &[Frame], pacing: Pacing) -> Result<Vec<PacedLine>, TranslateError> {
    frames
        .iter()
        .map(|frame| {
            let line = frame.encode().map_err(TranslateError::Encode)?;
            let delay = if frame.is_finish() {
                Duration::ZERO
            } else {
                pacing.delay_after(frame)
            };
            Ok(PacedLine {
                line: Bytes::from(line),
                delay,
            })
        })
        .collect()
}

/// Splits an arbitrary byte stream into newline-terminated lines, carrying any
/// trailing partial line over to the next chunk.
#[derive(Debug, Default)]
pub struct LineReframer {
    buffer: Vec<u8>,
}

impl LineReframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every line completed by `chunk`, each ending in `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset + 1;
            lines.push(Bytes::copy_from_slice(&self.buffer[start..end]));
            start = end;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Flushes the remainder as a final line, if there is one.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.buffer);
        line.push(b'\n');
        Some(Bytes::from(line))
    }
}

type BodyChunk = Result<Bytes, io::Error>;

/// Write side of a streaming response body. Writes after the reader went away
/// are dropped.
pub struct FrameSink {
    tx: mpsc::Sender<BodyChunk>,
    closed: bool,
}

impl FrameSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BodyChunk>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, closed: false }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.tx.is_closed()
    }

    /// Resolves once the reader is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Returns false once the reader is gone.
    pub async fn send(&mut self, line: Bytes) -> bool {
        if self.closed {
            return false;
        }
        if self.tx.send(Ok(line)).await.is_err() {
            self.closed = true;
        }
        !self.closed
    }

    /// Errors the body so the caller sees an aborted response.
    pub async fn fail(&mut self, message: String) {
        if self.is_closed() {
            tracing::debug!(%message, "stream already closed; dropping error");
            return;
        }
        let _ = self
            .tx
            .send(Err(io::Error::other(message)))
            .await;
        self.closed = true;
    }
}

/// Replays pre-encoded frames with their pacing delays.
pub async fn pump_lines(lines: Vec<PacedLine>, mut sink: FrameSink) {
    for PacedLine { line, delay } in lines {
        if !sink.send(line).await {
            tracing::debug!("client closed the stream; stopping replay");
            return;
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = sink.closed() => {
                    tracing::debug!("client closed the stream; stopping replay");
                    return;
                }
            }
        }
    }
}

/// Forwards a raw backend stream line by line. Appends a finish frame if the
/// backend never sent one.
pub async fn pump_raw<S, E>(stream: S, mut sink: FrameSink)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut reframer = LineReframer::new();
    let mut saw_finish = false;
    let mut forwarded = 0usize;

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = sink.closed() => {
                tracing::debug!(forwarded, "client closed the stream; dropping backend stream");
                return;
            }
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!(error = %err, "backend stream failed");
                sink.fail(format!("backend stream failed: {}", err)).await;
                return;
            }
        };

        for line in reframer.push(&chunk) {
            saw_finish |= line.starts_with(b"d:");
            if !sink.send(line).await {
                tracing::debug!(forwarded, "client closed the stream; dropping backend stream");
                return;
            }
            forwarded += 1;
        }
    }

    if let Some(line) = reframer.finish() {
        saw_finish |= line.starts_with(b"d:");
        if !sink.send(line).await {
            return;
        }
        forwarded += 1;
    }

    if !saw_finish {
        match Frame::Finish(Finish::default()).encode() {
            Ok(line) => {
                sink.send(Bytes::from(line)).await;
            }
            Err(err) => sink.fail(format!("failed to encode finish frame: {}", err)).await,
        }
    }

    tracing::debug!(forwarded, "backend stream forwarded");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> ChatPayload {
        serde_json::from_value(value).unwrap()
    }

    async fn collect(mut rx: mpsc::Receiver<BodyChunk>) -> (Vec<u8>, Option<String>) {
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(err) => return (out, Some(err.to_string())),
            }
        }
        (out, None)
    }

    #[test]
    fn one_frame_per_part_in_order_then_finish() {
        let frames = payload_frames(payload(json!({
            "ok": true,
            "parts": [
                {"type": "thought_card", "card_type": "thinking", "step": 1, "content": "Looking"},
                {"type": "text", "text": "Found it"},
                {"type": "thought_card", "card_type": "final_answer", "step": 2, "content": "Done"}
            ],
            "usage": {"tokens_in": 3, "tokens_out": 4}
        })))
        .unwrap();

        assert_eq!(frames.len(), 4);
        match &frames[0] {
            Frame::ToolCall(call) => {
                assert_eq!(call.tool_call_id, "thought_0");
                assert!(call.args_text().contains("\"card_type\":\"thinking\""));
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(frames[1], Frame::Text("Found it".to_string()));
        match &frames[2] {
            Frame::ToolCall(call) => assert_eq!(call.tool_call_id, "thought_1"),
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(
            frames[3],
            Frame::Finish(Finish::stop(Some(json!({"tokens_in": 3, "tokens_out": 4}))))
        );
        assert_eq!(frames.iter().filter(|f| f.is_finish()).count(), 1);
    }

    #[test]
    fn falls_back_to_message_content() {
        let frames = payload_frames(payload(json!({
            "ok": true,
            "parts": [],
            "message": {"role": "assistant", "content": "plain answer"}
        })))
        .unwrap();

        assert_eq!(
            frames,
            vec![
                Frame::Text("plain answer".to_string()),
                Frame::Finish(Finish::default())
            ]
        );
    }

    #[test]
    fn null_message_content_becomes_empty_text() {
        let frames = payload_frames(payload(json!({
            "ok": true,
            "message": {"role": "assistant", "content": null},
            "usage": {"tokens": 1}
        })))
        .unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::Text(String::new()));
        assert!(frames[1].is_finish());
    }

    #[test]
    fn rejected_payload_produces_no_frames() {
        let err = payload_frames(payload(json!({
            "ok": false,
            "error": {"message": "rate limited"}
        })))
        .unwrap_err();
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn pacing_follows_frame_kind() {
        let frames = vec![
            Frame::Text("a".to_string()),
            Frame::ToolCall(ToolCall::thought_card(0, &json!({"card_type": "thinking"})).unwrap()),
            Frame::Finish(Finish::default()),
        ];
        let lines = pace(&frames, Pacing::default()).unwrap();
        let delays: Vec<u64> = lines.iter().map(|l| l.delay.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 0]);

        let lines = pace(&frames, Pacing::none()).unwrap();
        assert!(lines.iter().all(|l| l.delay.is_zero()));
    }

    #[test]
    fn reframer_is_boundary_independent() {
        let input = "0:\"caf\u{e9}\"\n9:{\"toolCallId\":\"x\"}\r\n\nd:{\"finishReason\":\"stop\"}";
        let bytes = input.as_bytes();
        let expected = format!("{}\n", input);

        for split in 0..=bytes.len() {
            for second in split..=bytes.len() {
                let mut reframer = LineReframer::new();
                let mut out = Vec::new();
                for piece in [&bytes[..split], &bytes[split..second], &bytes[second..]] {
                    for line in reframer.push(piece) {
                        assert_eq!(line.last(), Some(&b'\n'));
                        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
                        out.extend_from_slice(&line);
                    }
                }
                if let Some(line) = reframer.finish() {
                    out.extend_from_slice(&line);
                }
                assert_eq!(out, expected.as_bytes(), "split at {} / {}", split, second);
            }
        }
    }

    #[test]
    fn reframer_holds_partial_lines() {
        let mut reframer = LineReframer::new();
        assert!(reframer.push(b"0:\"he").is_empty());
        let lines = reframer.push(b"llo\"\n0:");
        assert_eq!(lines, vec![Bytes::from_static(b"0:\"hello\"\n")]);
        assert_eq!(reframer.finish(), Some(Bytes::from_static(b"0:\n")));
        assert_eq!(reframer.finish(), None);
    }

    #[tokio::test]
    async fn raw_stream_is_forwarded_verbatim() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"0:\"Hel")),
            Ok(Bytes::from_static(b"lo\"\n9:{\"toolCallId\":\"thought_0\",")),
            Ok(Bytes::from_static(b"\"toolName\":\"thought_card\",\"args\":\"{}\"}\nd:\n")),
        ];
        let (sink, rx) = FrameSink::channel(8);
        pump_raw(futures::stream::iter(chunks), sink).await;

        let (out, error) = collect(rx).await;
        assert!(error.is_none());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0:\"Hello\"\n9:{\"toolCallId\":\"thought_0\",\"toolName\":\"thought_card\",\"args\":\"{}\"}\nd:\n"
        );
    }

    #[tokio::test]
    async fn raw_stream_without_finish_gets_one() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![Ok(Bytes::from_static(b"0:\"tail\""))];
        let (sink, rx) = FrameSink::channel(8);
        pump_raw(futures::stream::iter(chunks), sink).await;

        let (out, _) = collect(rx).await;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0:\"tail\"\nd:{\"finishReason\":\"stop\",\"usage\":{}}\n"
        );
    }

    #[tokio::test]
    async fn raw_stream_error_errors_the_body() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"0:\"a\"\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let (sink, rx) = FrameSink::channel(8);
        pump_raw(futures::stream::iter(chunks), sink).await;

        let (out, error) = collect(rx).await;
        assert_eq!(out, b"0:\"a\"\n");
        assert!(error.unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn writes_after_close_are_ignored() {
        let (mut sink, rx) = FrameSink::channel(1);
        drop(rx);

        assert!(!sink.send(Bytes::from_static(b"0:\"x\"\n")).await);
        assert!(sink.is_closed());
        assert!(!sink.send(Bytes::from_static(b"0:\"y\"\n")).await);
        sink.fail("late".to_string()).await;

        let chunks: Vec<Result<Bytes, io::Error>> =
            vec![Ok(Bytes::from_static(b"0:\"a\"\n0:\"b\"\n"))];
        let (sink, rx) = FrameSink::channel(1);
        drop(rx);
        pump_raw(futures::stream::iter(chunks), sink).await;
    }

    #[tokio::test]
    async fn stalled_backend_is_dropped_once_the_client_leaves() {
        let head: Vec<Result<Bytes, io::Error>> = vec![Ok(Bytes::from_static(b"0:\"a\"\n"))];
        let stream = futures::stream::iter(head).chain(futures::stream::pending());
        let (sink, mut rx) = FrameSink::channel(8);
        let pump = tokio::spawn(pump_raw(stream, sink));

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"0:\"a\"\n"));
        drop(rx);

        tokio::time::timeout(Duration::from_millis(500), pump)
            .await
            .expect("pump should stop after the client closed")
            .unwrap();
    }

    #[tokio::test]
    async fn replay_stops_during_a_pause_when_the_client_leaves() {
        let lines = vec![PacedLine {
            line: Bytes::from_static(b"0:\"a\"\n"),
            delay: Duration::from_secs(60),
        }];
        let (sink, mut rx) = FrameSink::channel(8);
        let pump = tokio::spawn(pump_lines(lines, sink));

        rx.recv().await.unwrap().unwrap();
        drop(rx);

        tokio::time::timeout(Duration::from_millis(500), pump)
            .await
            .expect("replay should stop after the client closed")
            .unwrap();
    }

    #[tokio::test]
    async fn replay_waits_between_frames() {
        let frames = payload_frames(payload(json!({
            "ok": true,
            "parts": [
                {"type": "thought_card", "card_type": "thinking", "step": 1, "content": "a"},
                {"type": "text", "text": "b"}
            ]
        })))
        .unwrap();
        let pacing = Pacing {
            after_card: Duration::from_millis(20),
            after_text: Duration::from_millis(10),
        };
        let lines = pace(&frames, pacing).unwrap();
        let (sink, rx) = FrameSink::channel(8);

        let started = std::time::Instant::now();
        pump_lines(lines, sink).await;
        assert!(started.elapsed() >= Duration::from_millis(30));

        let (out, _) = collect(rx).await;
        let text = String::from_utf8(out).unwrap();
        let tags: Vec<&str> = text.lines().map(|l| &l[..2]).collect();
        assert_eq!(tags, vec!["9:", "0:", "d:"]);
    }
}
