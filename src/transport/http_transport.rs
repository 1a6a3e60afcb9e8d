use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::GatewayError;

const ORG_ID_HEADER: &str = "codegpt-org-id";
const APPLICATION_JSON: &str = "application/json";

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Option<Duration>,
    use_env_proxy: bool,
) -> Result<reqwest::Client, GatewayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none());

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| GatewayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Build the fixed header set sent with every agent call.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] when the org id or key is not a valid
/// header value.
pub fn build_upstream_headers(upstream: &UpstreamConfig) -> Result<HeaderMap, GatewayError> {
    let org_id = HeaderValue::from_str(&upstream.org_id)
        .map_err(|err| GatewayError::Internal(format!("invalid upstream org id header: {err}")))?;
    let mut authorization = HeaderValue::from_str(&format!("Bearer {}", upstream.api_key))
        .map_err(|err| GatewayError::Internal(format!("invalid upstream api key header: {err}")))?;
    authorization.set_sensitive(true);

    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(HeaderName::from_static(ORG_ID_HEADER), org_id);
    headers.insert(AUTHORIZATION, authorization);
    Ok(headers)
}

/// HTTP client bound to the single configured agent endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: url::Url,
    headers: HeaderMap,
}

impl HttpTransport {
    /// Create the transport with pooling and the optional timeout from `server`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the endpoint URL or a header
    /// value is invalid.
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, GatewayError> {
        let endpoint = url::Url::parse(&upstream.api_url)
            .map_err(|err| GatewayError::Internal(format!("invalid upstream URL: {err}")))?;
        let headers = build_upstream_headers(upstream)?;

        let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
        };
        let timeout = (server.timeout > 0).then(|| Duration::from_secs(server.timeout));

        let client = match build_reqwest_client(
            server.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout,
            upstream.http_use_env_proxy,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };

        Ok(Self {
            client,
            endpoint,
            headers,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// POST `body` to the agent endpoint. Exactly one attempt is made.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the request cannot be sent.
    pub async fn send(&self, body: Bytes) -> Result<reqwest::Response, GatewayError> {
        let mut request = reqwest::Request::new(http::Method::POST, self.endpoint.clone());
        *request.headers_mut() = self.headers.clone();
        *request.body_mut() = Some(reqwest::Body::from(body));

        self.client
            .execute(request)
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))
    }

    /// POST `body` and return the response only if it is 2xx.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the request fails, or
    /// [`GatewayError::Upstream`] carrying the upstream status and body text.
    pub async fn send_checked(&self, body: Bytes) -> Result<reqwest::Response, GatewayError> {
        let response = self.send(body).await?;
        ensure_success(response).await
    }
}

/// Pass a 2xx response through; turn anything else into
/// [`GatewayError::Upstream`] with the body text.
///
/// # Errors
///
/// Returns [`GatewayError::Upstream`] for a non-2xx status.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %message, "upstream returned error status");
    Err(GatewayError::Upstream {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            agent_id: "agent".into(),
            org_id: "org-123".into(),
            api_key: "sk-upstream".into(),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_upstream_headers() {
        let headers = build_upstream_headers(&upstream()).unwrap();
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers["CodeGPT-Org-Id"], "org-123");
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-upstream");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_rejects_header_unsafe_values() {
        let mut config = upstream();
        config.org_id = "bad\norg".into();
        assert!(matches!(
            build_upstream_headers(&config),
            Err(GatewayError::Internal(_))
        ));
    }

    #[test]
    fn test_transport_keeps_endpoint() {
        let transport = HttpTransport::new(&ServerConfig::default(), &upstream()).unwrap();
        assert_eq!(
            transport.endpoint().as_str(),
            "https://api.codegpt.co/api/v1/chat/completions"
        );
        assert_eq!(transport.headers.len(), 4);
    }

    #[test]
    fn test_transport_rejects_bad_url() {
        let mut config = upstream();
        config.api_url = "://nope".into();
        assert!(HttpTransport::new(&ServerConfig::default(), &config).is_err());
    }
}
