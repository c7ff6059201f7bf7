use thiserror::Error;

use crate::model::ModelError;

/// Terminal errors of an orchestration run.
///
/// Tool failures never appear here: they are fed back to the planner as
/// failed tool results.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("request text must not be empty")]
    EmptyRequest,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("round limit of {max_rounds} exceeded")]
    RoundLimitExceeded {
        max_rounds: u32,
        /// Last text the planner produced, if any.
        partial: Option<String>,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the caller abandoned the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
