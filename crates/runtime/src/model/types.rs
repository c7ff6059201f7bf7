//! Conversation and planner types (provider-agnostic).

use super::errors::ModelError;
use crate::tools::ToolSpec;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::Instant;

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user who made the request.
    User,
    /// The planner model.
    Assistant,
    /// A tool result fed back to the planner.
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the model, unique within its round.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Unparsed argument payload, as sent by the model.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Result of one tool call, paired with the call id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    /// Backend response body, or a description of what went wrong.
    pub payload: String,
    pub succeeded: bool,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            payload: payload.into(),
            succeeded: true,
        }
    }

    pub fn failure(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            payload: message.into(),
            succeeded: false,
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Calls requested by the planner (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message, optionally carrying tool calls.
    pub fn planner(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool-result message.
    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: result.payload.clone(),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.call_id.clone()),
        }
    }
}

/// What the planner decided for this round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerOutcome {
    /// A final answer.
    Content(String),
    /// Tools to run before answering. `content` is any text the model
    /// produced alongside the calls.
    ToolCalls {
        content: String,
        calls: Vec<ToolCall>,
    },
}

impl PlannerOutcome {
    /// Normalize a raw response: an empty call list is a final answer.
    pub fn from_parts(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let content = content.into();
        if calls.is_empty() {
            Self::Content(content)
        } else {
            Self::ToolCalls { content, calls }
        }
    }

    /// Text produced by the planner, whatever the outcome.
    pub fn text(&self) -> &str {
        match self {
            Self::Content(text) => text,
            Self::ToolCalls { content, .. } => content,
        }
    }
}

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

/// Trait for planner backends.
///
/// Implementations must give up by `deadline`, reporting
/// [`ModelError::Timeout`].
pub trait ModelClient: Send + Sync {
    fn complete(
        &self,
        request: ModelRequest<'_>,
        deadline: Instant,
    ) -> impl Future<Output = Result<PlannerOutcome, ModelError>> + Send;
}
