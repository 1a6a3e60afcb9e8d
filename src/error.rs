use crate::protocol::error_shapes::{model_not_found_payload, openai_error_payload};

/// Error type shared by every request path.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("The model `{0}` does not exist")]
    ModelNotFound(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        404 => ErrorCategory::NotFound,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            GatewayError::Auth(_) => ErrorCategory::Authentication,
            GatewayError::ModelNotFound(_) => ErrorCategory::NotFound,
            GatewayError::Transport(_) | GatewayError::Internal(_) => ErrorCategory::ServerError,
            GatewayError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// HTTP status for this error. Upstream failures keep the upstream's
    /// own status code.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        if let GatewayError::Upstream { status, .. } = self {
            if let Ok(code) = http::StatusCode::from_u16(*status) {
                return code;
            }
        }
        http_status_for_category(self.category())
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::NotFound => http::StatusCode::NOT_FOUND,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Format an error as an OpenAI-style error body, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &GatewayError) -> (http::StatusCode, serde_json::Value) {
    let status = err.status();
    let message = err.to_string();

    let body = match err {
        GatewayError::ModelNotFound(_) => model_not_found_payload(&message),
        _ => openai_error_payload(err.category(), &message),
    };

    (status, body)
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `GatewayError` into an axum response.
#[must_use]
pub fn into_axum_response(err: &GatewayError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_shape() {
        let (status, body) = format_error(&GatewayError::ModelNotFound("nope".into()));
        assert_eq!(status, http::StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["param"], "model");
        assert_eq!(body["error"]["code"], "model_not_found");
        assert_eq!(body["error"]["message"], "The model `nope` does not exist");
    }

    #[test]
    fn test_auth_error_is_401() {
        let (status, body) = format_error(&GatewayError::Auth("Invalid API key".into()));
        assert_eq!(status, http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
        assert_eq!(body["error"]["message"], "Invalid API key");
    }

    #[test]
    fn test_upstream_status_propagates_verbatim() {
        let err = GatewayError::Upstream {
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(err.status(), http::StatusCode::SERVICE_UNAVAILABLE);

        let err = GatewayError::Upstream {
            status: 418,
            message: "teapot".into(),
        };
        assert_eq!(err.status().as_u16(), 418);
        assert_eq!(err.category(), ErrorCategory::Unknown);
    }

    #[test]
    fn test_internal_is_500() {
        let (status, body) = format_error(&GatewayError::Internal("boom".into()));
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "Internal error: boom");
    }
}
