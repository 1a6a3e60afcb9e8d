use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};

use crate::error::into_axum_response;
use crate::protocol::openai::ModelList;
use crate::state::AppState;
use crate::util::unix_now_secs;

/// List the model catalog in `OpenAI` format.
#[must_use]
pub fn handler(State(state): State<Arc<AppState>>, headers: &HeaderMap) -> Response {
    if let Err(err) = state.authenticate(headers) {
        return into_axum_response(&err);
    }
    Json(ModelList::from_catalog(&state.config.models, unix_now_secs())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn state() -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.upstream.agent_id = "agent".into();
        config.upstream.org_id = "org".into();
        config.upstream.api_key = "upstream".into();
        config.client_authentication.api_key = "test-key".into();
        config.models = vec!["m-one".into(), "m-two".into()];
        Arc::new(AppState::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_handler_lists_catalog_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer test-key".parse().unwrap());
        let response = handler(State(state()), &headers);
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["m-one", "m-two"]);
        assert_eq!(body["data"][0]["owned_by"], "system");
        assert!(body["data"][0]["created"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_handler_requires_key() {
        let response = handler(State(state()), &HeaderMap::new());
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
