use crate::config::AppConfig;
use crate::error::GatewayError;
use http::header::AUTHORIZATION;

const BEARER_PREFIX: &[u8] = b"Bearer ";

/// The protecting key with its `Bearer ` header form precomputed.
pub struct ClientKey {
    bearer: Box<str>,
}

impl ClientKey {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self {
            bearer: format!("Bearer {raw}").into_boxed_str(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.client_authentication.api_key)
    }
}

/// Extract the bearer key from request headers.
///
/// # Errors
///
/// Returns `GatewayError::Auth` when the header is missing or not a bearer
/// credential.
pub fn extract_api_key(headers: &http::HeaderMap) -> Result<&[u8], GatewayError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| GatewayError::Auth("Missing authorization header".to_string()))?;
    value.as_bytes().strip_prefix(BEARER_PREFIX).ok_or_else(|| {
        GatewayError::Auth("Invalid authorization format, expected 'Bearer <key>'".to_string())
    })
}

/// Authenticate an incoming request against the configured key.
///
/// # Errors
///
/// Returns `GatewayError::Auth` when the key is missing, malformed or wrong.
pub fn authenticate(headers: &http::HeaderMap, key: &ClientKey) -> Result<(), GatewayError> {
    extract_api_key(headers)?;
    match headers.get(AUTHORIZATION) {
        Some(value) if value.as_bytes() == key.bearer.as_bytes() => Ok(()),
        _ => Err(GatewayError::Auth("Invalid API key".to_string())),
    }
}
