use crate::protocol::openai::Usage;
use std::time::Duration;
use tracing::info;

/// Approximate the token count of `text` as its whitespace-separated word count.
///
/// This is not a tokenizer. Empty or all-whitespace text counts as zero.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Sum of [`estimate_tokens`] over every prompt message.
#[must_use]
pub fn estimate_prompt_tokens<'a, I>(messages: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    messages.into_iter().map(estimate_tokens).sum()
}

/// Build usage from a prompt estimate and the completion text.
///
/// `None` means no completion could be decoded; it counts as zero.
#[must_use]
pub fn approximate_usage(prompt_tokens: u64, completion: Option<&str>) -> Usage {
    let completion_tokens = completion.map_or(0, estimate_tokens);
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

/// Log token usage for a completed request at INFO level.
pub fn log_request_usage(request_id: &str, model: &str, usage: &Usage, duration: Duration) {
    info!(
        request_id,
        model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = duration.as_secs_f64(),
        "request completed"
    );
}
