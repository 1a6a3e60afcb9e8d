use std::collections::HashSet;

use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_client_key(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.stream_channel_capacity == 0 {
        return Err(validation_err(
            "server.stream_channel_capacity must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if !upstream.api_url.starts_with("http://") && !upstream.api_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.api_url must start with http:// or https://",
        ));
    }
    if let Err(err) = url::Url::parse(&upstream.api_url) {
        return Err(validation_err(format!(
            "upstream.api_url is not a valid URL: {err}"
        )));
    }
    if upstream.agent_id.trim().is_empty() {
        return Err(validation_err(
            "upstream.agent_id cannot be empty (set CODEGPT_AGENT_ID)",
        ));
    }
    if upstream.org_id.trim().is_empty() {
        return Err(validation_err(
            "upstream.org_id cannot be empty (set CODEGPT_ORG_ID)",
        ));
    }
    if upstream.api_key.trim().is_empty() {
        return Err(validation_err(
            "upstream.api_key cannot be empty (set CODEGPT_API_KEY)",
        ));
    }
    for (field, value) in [
        ("upstream.org_id", upstream.org_id.as_str()),
        ("upstream.api_key", upstream.api_key.as_str()),
    ] {
        if http::HeaderValue::from_str(value).is_err() {
            return Err(validation_err(format!(
                "{field} contains characters not allowed in an HTTP header"
            )));
        }
    }
    Ok(())
}

fn validate_client_key(config: &AppConfig) -> Result<(), ConfigError> {
    if config.client_authentication.api_key.trim().is_empty() {
        return Err(validation_err(
            "client_authentication.api_key cannot be empty (set VALID_API_KEY)",
        ));
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    if config.models.is_empty() {
        return Err(validation_err("models cannot be empty"));
    }
    let mut seen = HashSet::with_capacity(config.models.len());
    for model in &config.models {
        if model.trim().is_empty() {
            return Err(validation_err("models contains an empty entry"));
        }
        if !seen.insert(model.as_str()) {
            return Err(validation_err(format!("duplicate model entry '{model}'")));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
