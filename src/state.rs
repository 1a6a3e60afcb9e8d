mod request_id;

use crate::auth::{authenticate, ClientKey};
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Built once at startup and shared read-only as `Arc<AppState>`.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    client_key: ClientKey,
    request_ids: RequestIdGenerator,
}

impl AppState {
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the upstream transport cannot
    /// be built from `config`.
    pub fn new(config: AppConfig) -> Result<Self, GatewayError> {
        let transport = HttpTransport::new(&config.server, &config.upstream)?;
        Ok(Self::with_transport(config, transport))
    }

    #[must_use]
    pub fn with_transport(config: AppConfig, transport: HttpTransport) -> Self {
        let client_key = ClientKey::from_config(&config);
        Self {
            config,
            transport,
            client_key,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Check the request's bearer key against the configured client key.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Auth` when the key is missing, malformed or wrong.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), GatewayError> {
        authenticate(headers, &self.client_key)
    }

    /// Resolve the requested model against the catalog. A missing or empty
    /// model defaults to the first entry.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ModelNotFound` for a model outside the catalog.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, GatewayError> {
        let model = requested
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.default_model());
        if self.config.has_model(model) {
            Ok(model.to_string())
        } else {
            Err(GatewayError::ModelNotFound(model.to_string()))
        }
    }

    #[must_use]
    pub fn next_request_id(&self) -> String {
        self.request_ids.next_request_id()
    }
}
