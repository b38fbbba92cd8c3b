//! Small helpers shared by config, models and the remote client

/// Longest server message kept in an error
const EXCERPT_CHARS: usize = 180;

/// Trimmed value, or `None` when missing or blank
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(ToString::to_string)
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Single-line excerpt of a response body for error messages
pub fn compact_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(EXCERPT_CHARS)
        .collect()
}

/// Unix milliseconds, the unit of `updatedAt`
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
