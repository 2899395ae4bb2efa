//! Retry policy: maps one failed attempt onto the next action.

use std::time::Duration;

use modelrelay_core::error::{FailureKind, ProviderError};

/// What the executor does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Sleep, then try again.
    Wait(Duration),
    /// Shrink the conversation, then try again without waiting.
    CompressAndRetry,
    /// Stop and surface the failure.
    Abort,
}

/// Classify a failure.
///
/// `attempts_left` counts the attempts still available after the one that
/// just failed. `compressed` is true once the call's one compression has
/// been spent.
pub fn classify(
    error: &ProviderError,
    attempts_left: u32,
    compressed: bool,
    retry_interval: Duration,
) -> RetryAction {
    classify_kind(error.kind(), attempts_left, compressed, retry_interval)
}

pub fn classify_kind(
    kind: FailureKind,
    attempts_left: u32,
    compressed: bool,
    retry_interval: Duration,
) -> RetryAction {
    let can_retry = attempts_left > 0;
    match kind {
        FailureKind::Connectivity
        | FailureKind::RateLimited
        | FailureKind::ServerError(_)
        | FailureKind::EmptyResponse
            if can_retry =>
        {
            RetryAction::Wait(retry_interval)
        }
        FailureKind::PayloadTooLarge if can_retry && !compressed => RetryAction::CompressAndRetry,
        _ => RetryAction::Abort,
    }
}

/// Human-readable meaning of common provider status codes, for logs.
pub fn describe_status(status: u16) -> &'static str {
    match status {
        400 => "invalid request parameters",
        401 => "authentication failed, check the API key",
        402 => "insufficient account balance",
        403 => "access forbidden, possibly a real-name or permission check",
        404 => "model or endpoint not found",
        413 => "request payload too large",
        429 => "rate limited, too many requests",
        500 => "provider internal error",
        503 => "provider overloaded or unavailable",
        _ => "unexpected status",
    }
}
