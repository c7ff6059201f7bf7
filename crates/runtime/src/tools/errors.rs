use thiserror::Error;

/// Errors that can occur while handling one tool call.
///
/// None of these abort a round: the dispatcher turns each into a failed
/// [`ToolResult`](crate::ToolResult) so the planner can react to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidInput(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<toolbox::Error> for ToolError {
    fn from(err: toolbox::Error) -> Self {
        match err {
            toolbox::Error::UnknownRoute(tool) => Self::NotFound(tool),
            toolbox::Error::Timeout(ms) => Self::Timeout(ms),
            other => Self::Backend(other.to_string()),
        }
    }
}
