//! Per-request stream lifecycle.
//!
//! [`StreamOrchestrator`] is the synchronous state machine that turns
//! upstream body bytes into outbound SSE frames. [`spawn_chunk_stream`] runs
//! it on its own task, reading upstream and pushing frames into a bounded
//! channel whose receiver becomes the response body.

use std::future::Future;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::decoder::decode_line;
use super::framer::LineFramer;
use super::sse::{done_frame, json_sse_frame};
use super::translator::{translate, ChunkContext, ERROR_FINISH_REASON};
use crate::error::GatewayError;
use crate::protocol::openai::ChatCompletionChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Nothing emitted yet.
    Start,
    /// Role chunk sent; translating upstream lines as they arrive.
    Streaming,
    /// Upstream ended; flushing the framer's trailing fragment.
    Draining,
    /// `[DONE]` emitted. Nothing more is produced.
    Done,
}

pub struct StreamOrchestrator {
    request_id: String,
    model: String,
    phase: StreamPhase,
    framer: LineFramer,
    lines: Vec<String>,
    emitted: usize,
}

impl StreamOrchestrator {
    #[must_use]
    pub fn new(request_id: String, model: String) -> Self {
        Self {
            request_id,
            model,
            phase: StreamPhase::Start,
            framer: LineFramer::new(),
            lines: Vec::with_capacity(8),
            emitted: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Chunks emitted so far, excluding the role chunk and `[DONE]`.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// `Start -> Streaming`: the role announcement frame.
    pub fn start(&mut self, out: &mut Vec<Bytes>) {
        if self.phase != StreamPhase::Start {
            return;
        }
        let role = ChatCompletionChunk::role_announcement(&self.request_id, &self.model);
        out.extend(json_sse_frame(&role));
        self.phase = StreamPhase::Streaming;
    }

    /// Frame, decode and translate one upstream body chunk.
    ///
    /// An upstream line that outgrows the framer's limit ends the stream
    /// through [`Self::fail`] after the lines completed before it.
    pub fn on_upstream_bytes(&mut self, chunk: &[u8], out: &mut Vec<Bytes>) {
        if self.phase != StreamPhase::Streaming {
            return;
        }
        let framed = self.framer.feed_into(chunk, &mut self.lines);
        let ctx = ChunkContext {
            request_id: &self.request_id,
            model: &self.model,
        };
        for line in self.lines.drain(..) {
            if emit_line(&line, ctx, out) {
                self.emitted += 1;
            }
        }
        if let Err(err) = framed {
            tracing::error!(request_id = %self.request_id, error = %err, "upstream line too long");
            self.fail(out);
        }
    }

    /// `Streaming -> Draining -> Done`: flush the trailing fragment once,
    /// then terminate.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) {
        if self.phase != StreamPhase::Streaming {
            return;
        }
        self.phase = StreamPhase::Draining;
        if let Some(rest) = self.framer.finish() {
            let ctx = ChunkContext {
                request_id: &self.request_id,
                model: &self.model,
            };
            if emit_line(&rest, ctx, out) {
                self.emitted += 1;
            }
        }
        out.push(done_frame());
        self.phase = StreamPhase::Done;
    }

    /// Any phase -> `Done` through an error chunk. From `Start` no role
    /// chunk is sent.
    pub fn fail(&mut self, out: &mut Vec<Bytes>) {
        if self.phase == StreamPhase::Done {
            return;
        }
        let chunk =
            ChatCompletionChunk::finish(&self.request_id, &self.model, ERROR_FINISH_REASON);
        out.extend(json_sse_frame(&chunk));
        out.push(done_frame());
        self.phase = StreamPhase::Done;
    }
}

fn emit_line(line: &str, ctx: ChunkContext<'_>, out: &mut Vec<Bytes>) -> bool {
    let Some(event) = decode_line(line) else {
        return false;
    };
    let Some(chunk) = translate(&event, ctx) else {
        return false;
    };
    match json_sse_frame(&chunk) {
        Some(frame) => {
            out.push(frame);
            true
        }
        None => false,
    }
}

/// Run `orchestrator` on a new task and return the outbound frame stream.
///
/// `open` performs the upstream call. It is awaited inside the task so a
/// failure to open still yields a well-formed stream. The task stops and
/// drops the upstream body as soon as the receiver is gone.
pub fn spawn_chunk_stream<F, S, E>(
    open: F,
    orchestrator: StreamOrchestrator,
    capacity: usize,
) -> ReceiverStream<Bytes>
where
    F: Future<Output = Result<S, GatewayError>> + Send + 'static,
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(drive(open, orchestrator, tx));
    ReceiverStream::new(rx)
}

async fn drive<F, S, E>(open: F, mut orch: StreamOrchestrator, tx: mpsc::Sender<Bytes>)
where
    F: Future<Output = Result<S, GatewayError>> + Send,
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display,
{
    let mut frames = Vec::with_capacity(8);

    let opened = tokio::select! {
        biased;
        () = tx.closed() => {
            tracing::info!(request_id = orch.request_id(), "client disconnected before upstream responded");
            return;
        }
        opened = open => opened,
    };
    let mut upstream = match opened {
        Ok(body) => Box::pin(body),
        Err(err) => {
            tracing::warn!(request_id = orch.request_id(), error = %err, "upstream stream could not be opened");
            orch.fail(&mut frames);
            let _ = send_all(&tx, &mut frames).await;
            return;
        }
    };

    orch.start(&mut frames);
    if !send_all(&tx, &mut frames).await {
        tracing::info!(request_id = orch.request_id(), "client disconnected");
        return;
    }

    loop {
        let next = tokio::select! {
            biased;
            () = tx.closed() => {
                tracing::info!(request_id = orch.request_id(), "client disconnected, releasing upstream");
                return;
            }
            next = upstream.next() => next,
        };
        match next {
            Some(Ok(bytes)) => {
                orch.on_upstream_bytes(&bytes, &mut frames);
                if orch.phase() == StreamPhase::Done {
                    drop(upstream);
                    let _ = send_all(&tx, &mut frames).await;
                    return;
                }
            }
            Some(Err(err)) => {
                tracing::error!(request_id = orch.request_id(), error = %err, "upstream stream read failed");
                drop(upstream);
                orch.fail(&mut frames);
                let _ = send_all(&tx, &mut frames).await;
                return;
            }
            None => break,
        }
        if !send_all(&tx, &mut frames).await {
            tracing::info!(request_id = orch.request_id(), "client disconnected, releasing upstream");
            return;
        }
    }
    drop(upstream);

    orch.finish(&mut frames);
    if send_all(&tx, &mut frames).await {
        tracing::info!(
            request_id = orch.request_id(),
            chunks = orch.emitted(),
            "stream completed"
        );
    }
}

/// Send queued frames in order. Returns `false` once the receiver is gone.
async fn send_all(tx: &mpsc::Sender<Bytes>, frames: &mut Vec<Bytes>) -> bool {
    for frame in frames.drain(..) {
        if tx.send(frame).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn orchestrator() -> StreamOrchestrator {
        StreamOrchestrator::new("chatcmpl-abc".into(), "gpt-4o".into())
    }

    fn frame_json(frame: &Bytes) -> serde_json::Value {
        let text = std::str::from_utf8(frame).unwrap();
        let body = text
            .strip_prefix("data: ")
            .and_then(|t| t.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_phase_transitions() {
        let mut orch = orchestrator();
        let mut out = Vec::new();
        assert_eq!(orch.phase(), StreamPhase::Start);

        orch.on_upstream_bytes(b"data: [DONE]\n", &mut out);
        assert!(out.is_empty(), "no output before start");

        orch.start(&mut out);
        assert_eq!(orch.phase(), StreamPhase::Streaming);
        assert_eq!(out.len(), 1);
        assert_eq!(frame_json(&out[0])["choices"][0]["delta"]["role"], "assistant");

        orch.finish(&mut out);
        assert_eq!(orch.phase(), StreamPhase::Done);
        assert_eq!(out.last().unwrap().as_ref(), b"data: [DONE]\n\n");

        let len = out.len();
        orch.finish(&mut out);
        orch.fail(&mut out);
        orch.start(&mut out);
        assert_eq!(out.len(), len, "done is terminal");
    }

    #[test]
    fn test_trailing_fragment_is_drained_once() {
        let mut orch = orchestrator();
        let mut out = Vec::new();
        orch.start(&mut out);
        orch.on_upstream_bytes(
            br#"data: {"choices":[{"delta":{"contents":[{"type":"text","content":"tail"}]}}]}"#,
            &mut out,
        );
        assert_eq!(out.len(), 1);
        orch.finish(&mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(frame_json(&out[1])["choices"][0]["delta"]["content"], "tail");
        assert_eq!(orch.emitted(), 1);
    }

    #[test]
    fn test_fail_before_start_skips_role_chunk() {
        let mut orch = orchestrator();
        let mut out = Vec::new();
        orch.fail(&mut out);
        assert_eq!(out.len(), 2);
        let error = frame_json(&out[0]);
        assert_eq!(error["choices"][0]["finish_reason"], "error");
        assert_eq!(error["id"], "chatcmpl-abc");
        assert_eq!(out[1].as_ref(), b"data: [DONE]\n\n");
    }

    #[test]
    fn test_oversized_line_fails_stream() {
        let mut orch = orchestrator();
        orch.framer = LineFramer::with_limit(32);
        let mut out = Vec::new();
        orch.start(&mut out);
        orch.on_upstream_bytes(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\ndata: {\"choices\":[{\"delta\":",
            &mut out,
        );
        assert_eq!(orch.phase(), StreamPhase::Streaming);
        orch.on_upstream_bytes(b"{\"content\":\"still no newline\"", &mut out);

        assert_eq!(orch.phase(), StreamPhase::Done);
        assert_eq!(out.len(), 4);
        assert_eq!(frame_json(&out[1])["choices"][0]["delta"]["content"], "ok");
        assert_eq!(frame_json(&out[2])["choices"][0]["finish_reason"], "error");
        assert_eq!(out[3].as_ref(), b"data: [DONE]\n\n");

        orch.on_upstream_bytes(b"\n", &mut out);
        orch.finish(&mut out);
        assert_eq!(out.len(), 4, "done is terminal");
    }

    async fn collect(rx: ReceiverStream<Bytes>) -> Vec<Bytes> {
        rx.collect().await
    }

    #[tokio::test]
    async fn test_spawned_stream_orders_frames() {
        let body = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"contents\":[{\"type\":\"text\",\"content\":\"Hel",
            )),
            Ok(Bytes::from_static(b"lo\"}]}}]}\n\n: ping\n")),
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"finish_reason\":\"stop\"}]}\n",
            )),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ]);
        let rx = spawn_chunk_stream(async move { Ok(body) }, orchestrator(), 4);
        let frames = collect(rx).await;

        assert_eq!(frames.len(), 5);
        assert_eq!(frame_json(&frames[0])["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(frame_json(&frames[1])["choices"][0]["delta"]["content"], "Hello");
        assert_eq!(frame_json(&frames[2])["choices"][0]["delta"]["content"], " there");
        assert_eq!(frame_json(&frames[2])["choices"][0]["finish_reason"], "stop");
        assert_eq!(frame_json(&frames[3])["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[4].as_ref(), b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_open_failure_yields_error_then_done() {
        let open = async {
            Err::<stream::Empty<Result<Bytes, std::io::Error>>, _>(GatewayError::Transport(
                "connection refused".into(),
            ))
        };
        let frames = collect(spawn_chunk_stream(open, orchestrator(), 4)).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frame_json(&frames[0])["choices"][0]["finish_reason"], "error");
        assert!(frame_json(&frames[0])["choices"][0]["delta"]
            .as_object()
            .unwrap()
            .is_empty());
        assert_eq!(frames[1].as_ref(), b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_read_fault_yields_error_then_done() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n",
            )),
            Err(std::io::Error::other("reset by peer")),
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n")),
        ]);
        let frames = collect(spawn_chunk_stream(async move { Ok(body) }, orchestrator(), 4)).await;
        assert_eq!(frames.len(), 4);
        assert_eq!(frame_json(&frames[1])["choices"][0]["delta"]["content"], "partial");
        assert_eq!(frame_json(&frames[2])["choices"][0]["finish_reason"], "error");
        assert_eq!(frames[3].as_ref(), b"data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_empty_upstream_still_terminates() {
        let body = stream::empty::<Result<Bytes, std::io::Error>>();
        let frames = collect(spawn_chunk_stream(async move { Ok(body) }, orchestrator(), 1)).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frame_json(&frames[0])["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(frames[1].as_ref(), b"data: [DONE]\n\n");
    }
}
