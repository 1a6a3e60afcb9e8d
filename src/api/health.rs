use axum::response::Json;
use serde_json::{json, Value};

pub const MODELS_PATH: &str = "/v1/models";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const HEALTH_PATH: &str = "/health";

/// Service banner for `GET /`, listing endpoints under `base_path`.
#[must_use]
pub fn root_handler(base_path: &str) -> Json<Value> {
    Json(json!({
        "message": "OpenAI-compatible API service powered by CodeGPT",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "models": format!("{base_path}{MODELS_PATH}"),
            "chat_completions": format!("{base_path}{CHAT_COMPLETIONS_PATH}"),
            "health": format!("{base_path}{HEALTH_PATH}"),
        }
    }))
}

/// Health check handler.
#[must_use]
pub fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_lists_endpoints_under_base_path() {
        let Json(body) = root_handler("/bridge");
        assert_eq!(body["endpoints"]["models"], "/bridge/v1/models");
        assert_eq!(
            body["endpoints"]["chat_completions"],
            "/bridge/v1/chat/completions"
        );
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_health_timestamp_is_rfc3339() {
        let Json(body) = health_handler();
        assert_eq!(body["status"], "healthy");
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(timestamp.ends_with('Z'));
    }
}
