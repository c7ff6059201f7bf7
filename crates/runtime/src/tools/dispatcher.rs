//! Concurrent execution of one round of tool calls.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use policy::{CallerContext, ContextPolicy};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ToolArguments, ToolBackend, ToolError, ToolRegistry};
use crate::model::{ToolCall, ToolResult};

/// Limits applied to a round of tool calls.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum calls running at once within a round.
    pub max_in_flight: usize,
    /// Timeout for a single backend call.
    pub call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Validates tool calls, injects caller context and runs them against the
/// backend.
pub struct Dispatcher<B> {
    registry: Arc<ToolRegistry>,
    policy: Arc<ContextPolicy>,
    backend: B,
    config: DispatchConfig,
}

impl<B: ToolBackend> Dispatcher<B> {
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: Arc<ContextPolicy>,
        backend: B,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            policy,
            backend,
            config,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Run every call of a round and return one result per call.
    ///
    /// Calls run concurrently, at most `max_in_flight` at a time. A failing
    /// call yields a failed result; it never cancels its siblings. Results
    /// come back in input order.
    pub async fn dispatch(
        &self,
        calls: &[ToolCall],
        ctx: &CallerContext,
        deadline: Instant,
    ) -> Vec<ToolResult> {
        let limit = Semaphore::new(self.config.max_in_flight.max(1));
        join_all(calls.iter().map(|call| self.run(call, ctx, deadline, &limit))).await
    }

    async fn run(
        &self,
        call: &ToolCall,
        ctx: &CallerContext,
        deadline: Instant,
        limit: &Semaphore,
    ) -> ToolResult {
        let Ok(_permit) = limit.acquire().await else {
            return ToolResult::failure(&call.id, "dispatcher is shutting down");
        };

        let start = Instant::now();
        match self.execute(call, ctx, deadline).await {
            Ok(payload) => {
                info!(
                    call_id = %call.id,
                    tool = %call.name,
                    elapsed = ?start.elapsed(),
                    "tool call succeeded"
                );
                ToolResult::success(&call.id, payload)
            }
            Err(e) => {
                warn!(call_id = %call.id, tool = %call.name, error = %e, "tool call failed");
                ToolResult::failure(&call.id, e.to_string())
            }
        }
    }

    async fn execute(
        &self,
        call: &ToolCall,
        ctx: &CallerContext,
        deadline: Instant,
    ) -> Result<String, ToolError> {
        let args = self.prepare(call, ctx)?;

        let timeout = self
            .config
            .call_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let timeout_ms = timeout.as_millis() as u64;
        if timeout.is_zero() {
            return Err(ToolError::Timeout(timeout_ms));
        }

        debug!(call_id = %call.id, tool = %call.name, args = args.len(), "invoking backend");
        tokio::time::timeout(timeout, self.backend.invoke(&call.name, &args, timeout))
            .await
            .map_err(|_| ToolError::Timeout(timeout_ms))?
    }

    /// Resolve, validate and enrich a call's arguments.
    ///
    /// Keys granted to the tool by the context policy always come from
    /// `ctx`; a same-named argument from the model is discarded.
    pub fn prepare(
        &self,
        call: &ToolCall,
        ctx: &CallerContext,
    ) -> Result<ToolArguments, ToolError> {
        let spec = self
            .registry
            .lookup(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let reserved = self.policy.reserved_keys(&spec.name);
        let mut args = spec.schema.validate(&call.arguments, &reserved)?;

        for (key, value) in self.policy.inject(&spec.name, ctx) {
            args.inject(key, value);
        }

        Ok(args)
    }
}
