//! Per-request conversation state.

use std::collections::HashMap;

use crate::model::{Message, Role, ToolCall, ToolResult};
use crate::{Error, Result};

/// Append-only message log for one request.
///
/// Messages are never edited or removed. Tool results are only accepted as
/// answers to the immediately preceding planner message.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation from the user's request.
    pub fn new(request_text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(request_text)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: a conversation starts with the request.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a planner message, with the tool calls it requested (if any).
    pub fn push_planner(&mut self, content: impl Into<String>, calls: Vec<ToolCall>) {
        self.messages.push(Message::planner(content, calls));
    }

    /// Append one tool-result message per call of the last planner message,
    /// in the order the planner issued the calls.
    ///
    /// Fails without appending anything if a result is orphaned, duplicated,
    /// or missing.
    pub fn push_tool_results(&mut self, results: Vec<ToolResult>) -> Result<()> {
        let ordered = {
            let pending = match self.messages.last() {
                Some(last) if last.role == Role::Assistant && !last.tool_calls.is_empty() => {
                    &last.tool_calls
                }
                _ => {
                    return Err(Error::InvalidState(
                        "tool results without pending tool calls".into(),
                    ));
                }
            };

            let mut by_id: HashMap<String, ToolResult> = HashMap::with_capacity(results.len());
            for result in results {
                if !pending.iter().any(|call| call.id == result.call_id) {
                    return Err(Error::InvalidState(format!(
                        "result for unknown call id {}",
                        result.call_id
                    )));
                }
                let id = result.call_id.clone();
                if by_id.insert(id.clone(), result).is_some() {
                    return Err(Error::InvalidState(format!("duplicate result for call id {id}")));
                }
            }

            let mut ordered = Vec::with_capacity(pending.len());
            for call in pending {
                let result = by_id.remove(&call.id).ok_or_else(|| {
                    Error::InvalidState(format!("missing result for call id {}", call.id))
                })?;
                ordered.push(Message::tool_result(&result));
            }
            ordered
        };

        self.messages.extend(ordered);
        Ok(())
    }
}
