//! Shared error types including RFC7807 Problem Details.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// RFC7807 Problem Details (application/problem+json) as returned by the
/// admin REST API on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type", default)]
    pub type_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`, then to a bare `message` field.
pub fn try_problem_detail(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ProblemDetails>(body) {
        if let Some(detail) = parsed.detail.filter(|d| !d.trim().is_empty()) {
            return Some(detail);
        }
        if !parsed.title.trim().is_empty() {
            return Some(parsed.title);
        }
    }

    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

/// Failure of a table fetch.
///
/// `Display` is what ends up in the table's empty-state message, so every
/// variant renders as something a user can read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("{}", http_message(*status, body))]
    Http { status: u16, body: String },
    #[error("Unexpected response: {0}")]
    Deserialize(String),
    #[error("Request timed out after {}", format_millis(.0.as_millis()))]
    Timeout(Duration),
    /// Error raised by the fetch function itself.
    #[error("{0}")]
    Message(String),
}

impl FetchError {
    pub fn message(msg: impl Into<String>) -> Self {
        FetchError::Message(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Whole seconds as `5s`, anything else as `1500ms`.
fn format_millis(millis: u128) -> String {
    if millis >= 1000 && millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

fn http_message(status: u16, body: &str) -> String {
    match try_problem_detail(body) {
        Some(detail) => detail,
        None if body.trim().is_empty() => format!("HTTP {status}"),
        None => format!("HTTP {status}: {body}"),
    }
}
