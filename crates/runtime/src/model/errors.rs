use thiserror::Error;

/// Errors from planner (LLM provider) calls.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The call did not complete before its deadline.
    #[error("model call timed out")]
    Timeout,

    /// The provider asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider failed on its side.
    #[error("provider server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The provider rejected the request.
    #[error("provider api {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether the same round may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::RateLimited(_) | Self::Server { .. }
        )
    }
}
