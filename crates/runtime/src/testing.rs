//! Test doubles for the model and the tool backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::model::{Message, ModelClient, ModelError, ModelRequest, PlannerOutcome, ToolCall};
use crate::tools::{ToolArguments, ToolBackend, ToolError};

/// A planner that replays a fixed script of outcomes and records every
/// conversation it was shown.
pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<Result<PlannerOutcome, ModelError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    hang: bool,
}

impl ScriptedModel {
    pub(crate) fn new(
        script: impl IntoIterator<Item = Result<PlannerOutcome, ModelError>>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    /// A planner that never answers.
    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new([])
        }
    }

    /// Conversations passed to each `complete` call, in order.
    pub(crate) fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        request: ModelRequest<'_>,
        _deadline: Instant,
    ) -> Result<PlannerOutcome, ModelError> {
        self.seen.lock().unwrap().push(request.messages.to_vec());

        if self.hang {
            std::future::pending::<()>().await;
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".into())))
    }
}

pub(crate) fn content(text: &str) -> Result<PlannerOutcome, ModelError> {
    Ok(PlannerOutcome::Content(text.to_string()))
}

pub(crate) fn calls(calls: &[(&str, &str, &str)]) -> Result<PlannerOutcome, ModelError> {
    Ok(PlannerOutcome::ToolCalls {
        content: String::new(),
        calls: calls
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, *args))
            .collect(),
    })
}

type Invocation = (String, Vec<(String, String)>);

/// A backend with canned responses and per-tool delays.
#[derive(Default)]
pub(crate) struct MockBackend {
    responses: HashMap<String, Result<String, ToolError>>,
    delays: HashMap<String, Duration>,
    invocations: Mutex<Vec<Invocation>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(mut self, tool: &str, response: Result<String, ToolError>) -> Self {
        self.responses.insert(tool.to_string(), response);
        self
    }

    pub(crate) fn delay(mut self, tool: &str, delay: Duration) -> Self {
        self.delays.insert(tool.to_string(), delay);
        self
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ToolBackend for MockBackend {
    async fn invoke(
        &self,
        tool: &str,
        args: &ToolArguments,
        _timeout: Duration,
    ) -> Result<String, ToolError> {
        self.invocations
            .lock()
            .unwrap()
            .push((tool.to_string(), args.to_query()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(tool) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.responses
            .get(tool)
            .cloned()
            .unwrap_or_else(|| Ok(format!(r#"{{"message":"{tool} ok"}}"#)))
    }
}
