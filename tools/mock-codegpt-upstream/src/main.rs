use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_001;
const AGENT_PATH: &str = "/api/v1/chat/completions";
const ORG_ID_HEADER: &str = "codegpt-org-id";

#[derive(Copy, Clone)]
enum MockScenario {
    /// `delta.contents` text items.
    Contents,
    /// Plain `delta.content` strings.
    Content,
    /// Malformed and unrecognized lines mixed into the stream.
    Noisy,
    Error,
}

struct RequestStats {
    stream: AtomicU64,
    nonstream: AtomicU64,
    rejected: AtomicU64,
}

impl RequestStats {
    const fn new() -> Self {
        Self {
            stream: AtomicU64::new(0),
            nonstream: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.stream.load(Ordering::Relaxed),
            self.nonstream.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.stream.store(0, Ordering::Relaxed);
        self.nonstream.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
    }
}

struct MockState {
    scenario: MockScenario,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        stats: RequestStats::new(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    eprintln!("mock CodeGPT agent listening on http://127.0.0.1:{port}{AGENT_PATH}");

    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("content") => MockScenario::Content,
        Ok("noisy") => MockScenario::Noisy,
        Ok("error") => MockScenario::Error,
        Ok("contents") | Err(_) => MockScenario::Contents,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to contents");
            MockScenario::Contents
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let body = read_request_body(body).await;

    let method = parts.method;
    let path = parts.uri.path();

    if method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if method == Method::POST && path == "/_mock/reset" {
        state.stats.reset();
        return simple_response_static(StatusCode::OK, "application/json", br#"{"ok":true}"#);
    }
    if path != AGENT_PATH {
        return simple_response_static(
            StatusCode::NOT_FOUND,
            "application/json",
            br#"{"error":"not_found"}"#,
        );
    }
    if method != Method::POST {
        return simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        );
    }
    if !parts.headers.contains_key(ORG_ID_HEADER)
        || !parts.headers.contains_key(header::AUTHORIZATION)
    {
        state.stats.rejected.fetch_add(1, Ordering::Relaxed);
        return simple_response_static(
            StatusCode::UNAUTHORIZED,
            "application/json",
            br#"{"error":"missing_credentials"}"#,
        );
    }

    if matches!(state.scenario, MockScenario::Error) {
        return simple_response_static(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            br#"{"error":"mock_injected_error"}"#,
        );
    }

    if requests_stream(&body) {
        state.stats.stream.fetch_add(1, Ordering::Relaxed);
        streaming_response(state.scenario)
    } else {
        state.stats.nonstream.fetch_add(1, Ordering::Relaxed);
        simple_response_static(StatusCode::OK, "application/json", NONSTREAM_BODY)
    }
}

async fn read_request_body(body: Incoming) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    }
}

fn requests_stream(body: &[u8]) -> bool {
    const NEEDLE: &[u8] = br#""stream":true"#;
    body.windows(NEEDLE.len()).any(|window| window == NEEDLE)
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let (stream, nonstream, rejected) = state.stats.snapshot();
    let scenario = match state.scenario {
        MockScenario::Contents => "contents",
        MockScenario::Content => "content",
        MockScenario::Noisy => "noisy",
        MockScenario::Error => "error",
    };
    let body = format!(
        "{{\"scenario\":\"{scenario}\",\"stream\":{stream},\"nonstream\":{nonstream},\"rejected\":{rejected}}}"
    );
    simple_response(
        StatusCode::OK,
        "application/json",
        Bytes::from(body.into_bytes()),
    )
}

fn streaming_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    let body = match scenario {
        MockScenario::Contents => STREAM_CONTENTS,
        MockScenario::Content => STREAM_CONTENT,
        MockScenario::Noisy => STREAM_NOISY,
        MockScenario::Error => b"data: {\"error\":\"mock_injected_error\"}\n\n",
    };
    let mut response = simple_response_static(StatusCode::OK, "text/event-stream", body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    simple_response(status, content_type, Bytes::from_static(body))
}

const NONSTREAM_BODY: &[u8] = br#"{"id":"mock","choices":[{"index":0,"message":{"role":"assistant","content":"ok from the agent"},"finish_reason":"stop"}]}"#;
const STREAM_CONTENTS: &[u8] = b"data: {\"choices\":[{\"delta\":{\"contents\":[{\"type\":\"text\",\"content\":\"ok \"}]}}]}\n\ndata: {\"choices\":[{\"delta\":{\"contents\":[{\"type\":\"text\",\"content\":\"from the agent\"}]}}]}\n\ndata: {\"choices\":[{\"delta\":{\"contents\":[]},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";
const STREAM_CONTENT: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"ok \"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"from the agent\"}}]}\n\ndata: {\"done\":true}\n\n";
const STREAM_NOISY: &[u8] = b": keep-alive\n\nevent: message\ndata: {\"choices\":[{\"delta\":{\"contents\":[{\"type\":\"text\",\"content\":\"ok\"}]}}]}\n\ndata: {not json\n\ndata: {\"status\":\"thinking\"}\n\ndata: {\"choices\":[{\"delta\":{\"contents\":[{\"type\":\"image\",\"content\":\"ignored\"}]}}]}\n\ndata: [DONE]\n\n";
