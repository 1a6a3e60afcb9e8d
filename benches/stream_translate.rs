use bytes::Bytes;
use codegpt_bridge::protocol::openai::ChatRequest;
use codegpt_bridge::protocol::upstream::{extract_message_content, UpstreamRequest};
use codegpt_bridge::stream::{decode_line, translate, ChunkContext, LineFramer, StreamOrchestrator};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const CONTENTS_LINE: &str =
    "data: {\"choices\":[{\"delta\":{\"contents\":[{\"type\":\"text\",\"content\":\"The quick brown fox \"}]}}]}";

fn upstream_body(events: usize) -> Vec<u8> {
    let mut body = Vec::with_capacity(events * (CONTENTS_LINE.len() + 2) + 16);
    for _ in 0..events {
        body.extend_from_slice(CONTENTS_LINE.as_bytes());
        body.extend_from_slice(b"\n\n");
    }
    body.extend_from_slice(b"data: [DONE]\n\n");
    body
}

fn bench_line_path(c: &mut Criterion) {
    let ctx = ChunkContext {
        request_id: "chatcmpl-bench",
        model: "gpt-4o",
    };
    c.bench_function("decode_translate_contents_line", |b| {
        b.iter(|| {
            let event = decode_line(black_box(CONTENTS_LINE));
            let chunk = event.as_ref().and_then(|event| translate(event, ctx));
            black_box(chunk.map(|chunk| chunk.content().map(str::len)));
        });
    });

    let body = upstream_body(256);
    c.bench_function("framer_256_events_64b_reads", |b| {
        b.iter(|| {
            let mut framer = LineFramer::new();
            let mut lines = Vec::with_capacity(8);
            let mut count = 0usize;
            for piece in body.chunks(64) {
                if framer.feed_into(black_box(piece), &mut lines).is_err() {
                    break;
                }
                count += lines.len();
                lines.clear();
            }
            black_box(count);
        });
    });
}

fn bench_orchestrator(c: &mut Criterion) {
    for (events, read_size) in [(16usize, 4096usize), (256, 4096), (256, 37)] {
        let body = upstream_body(events);
        let name = format!("orchestrator_{events}_events_{read_size}b_reads");
        c.bench_function(&name, |b| {
            b.iter(|| {
                let mut orch =
                    StreamOrchestrator::new("chatcmpl-bench".to_string(), "gpt-4o".to_string());
                let mut frames: Vec<Bytes> = Vec::with_capacity(events + 3);
                orch.start(&mut frames);
                for piece in body.chunks(read_size) {
                    orch.on_upstream_bytes(black_box(piece), &mut frames);
                }
                orch.finish(&mut frames);
                black_box(frames.len());
            });
        });
    }
}

fn bench_non_stream(c: &mut Criterion) {
    let request: ChatRequest = serde_json::from_str(
        r#"{"model":"gpt-4o","messages":[{"role":"system","content":"Be brief"},{"role":"user","content":"Summarize the release notes"}],"temperature":0.2}"#,
    )
    .expect("valid request");
    c.bench_function("build_upstream_request", |b| {
        b.iter(|| {
            let upstream = UpstreamRequest::from_chat("agent-123", black_box(&request));
            black_box(serde_json::to_vec(&upstream).map(|body| body.len()));
        });
    });

    let response = br#"{"choices":[{"message":{"role":"assistant","content":"Here is a short summary of the release."}}]}"#;
    c.bench_function("extract_message_content", |b| {
        b.iter(|| black_box(extract_message_content(black_box(response)).map(|text| text.len())));
    });
}

criterion_group!(benches, bench_line_path, bench_orchestrator, bench_non_stream);
criterion_main!(benches);
