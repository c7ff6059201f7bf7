//! Toolbox error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid toolbox URL: {0}")]
    InvalidUrl(String),

    #[error("no toolbox route for tool: {0}")]
    UnknownRoute(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("toolbox returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
