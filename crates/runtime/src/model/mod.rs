//! Planner protocol types and the model client trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Message, ModelClient, ModelRequest, PlannerOutcome, Role, ToolCall, ToolResult,
};
