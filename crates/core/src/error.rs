//! Error types for the ModelRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! `ProviderError` is what a single provider call can fail with;
//! `DispatchError` is what a whole `generate`/`embed` call surfaces.

use thiserror::Error;

/// The top-level error type returned by the request executor.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A failure the retry policy classified as terminal.
    #[error("task '{task}' failed on model '{model}': {source}")]
    Failed {
        task: String,
        model: String,
        #[source]
        source: ProviderError,
    },

    /// The retry budget ran out while failures were still retryable.
    #[error("task '{task}' exhausted its retry budget after {attempts} attempt(s){}", describe_last(.last))]
    RequestExhausted {
        task: String,
        attempts: u32,
        last: Option<ProviderError>,
    },

    /// The provider's client type has no registered constructor.
    #[error("provider '{provider}' uses unregistered client type '{client_type}'")]
    UnknownProvider {
        provider: String,
        client_type: String,
    },

    /// A candidate model or its provider is missing from the catalog.
    #[error("model not found in catalog: {0}")]
    UnknownModel(String),

    /// A task profile with no candidate models.
    #[error("task '{0}' has no candidate models")]
    EmptyProfile(String),

    /// A registered constructor could not build a client.
    #[error("failed to initialise client for provider '{provider}': {reason}")]
    ClientInit { provider: String, reason: String },
}

fn describe_last(last: &Option<ProviderError>) -> String {
    match last {
        Some(e) => format!(" (last failure: {e})"),
        None => String::new(),
    }
}

impl DispatchError {
    /// The concrete failure kind behind this error, if it came from a provider call.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { source, .. } => Some(source.kind()),
            Self::RequestExhausted { last, .. } => last.as_ref().map(ProviderError::kind),
            _ => None,
        }
    }
}

/// Result type alias using our DispatchError.
pub type Result<T> = std::result::Result<T, DispatchError>;

// --- Provider call errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request aborted: {0}")]
    Aborted(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Map this error onto the retry taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Connectivity,
            Self::Aborted(_) => FailureKind::Aborted,
            Self::MalformedResponse(_) => FailureKind::MalformedResponse,
            Self::EmptyResponse(_) => FailureKind::EmptyResponse,
            Self::Unsupported(_) => FailureKind::Unrecognized,
            Self::ApiError { status_code, .. } => match *status_code {
                400..=404 => FailureKind::ClientRejected(*status_code),
                413 => FailureKind::PayloadTooLarge,
                429 => FailureKind::RateLimited,
                s if s >= 500 => FailureKind::ServerError(s),
                _ => FailureKind::Unrecognized,
            },
        }
    }
}

/// Failure classes the retry policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connectivity,
    Aborted,
    MalformedResponse,
    ClientRejected(u16),
    PayloadTooLarge,
    RateLimited,
    ServerError(u16),
    EmptyResponse,
    Unrecognized,
}

impl FailureKind {
    /// Kinds that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connectivity
                | Self::PayloadTooLarge
                | Self::RateLimited
                | Self::ServerError(_)
                | Self::EmptyResponse
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connectivity => write!(f, "connectivity"),
            Self::Aborted => write!(f, "aborted"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::ClientRejected(s) => write!(f, "client_rejected({s})"),
            Self::PayloadTooLarge => write!(f, "payload_too_large"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError(s) => write!(f, "server_error({s})"),
            Self::EmptyResponse => write!(f, "empty_response"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}
