pub mod token_counter;

use crate::protocol::openai::Usage;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(filter) = tracing_filter(log_level) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn tracing_level(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

fn tracing_filter(log_level: &str) -> Option<EnvFilter> {
    let level = tracing_level(log_level)?;
    Some(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("INFO")))
}

/// Mask an API key for logs, keeping only the first five characters.
#[must_use]
pub fn masked_key_prefix(key: &str) -> String {
    let prefix: String = key.chars().take(5).collect();
    format!("{prefix}...")
}

/// Log token usage for a completed request, computing duration from start time.
pub fn log_request_complete(
    request_id: &str,
    model: &str,
    usage: &Usage,
    start_time: std::time::Instant,
) {
    token_counter::log_request_usage(request_id, model, usage, start_time.elapsed());
}
