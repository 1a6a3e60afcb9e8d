mod http_transport;

pub use http_transport::{build_upstream_headers, ensure_success, HttpTransport};
