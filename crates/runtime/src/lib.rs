//! Gateway runtime: the planner/tool orchestration loop.
//!
//! A request enters as free text and is answered by an LLM acting as a
//! planner. The planner may ask for tools; the [`Dispatcher`] validates
//! those calls, injects trusted caller context, runs them against a
//! [`ToolBackend`] and feeds the results back. The [`Orchestrator`] bounds
//! the whole exchange in rounds, time and cancellation.
//!
//! # Overview
//!
//! - **ModelClient**: a planner provider ([`OpenAiClient`] ships here).
//! - **ToolRegistry**: the catalog of tools and their argument schemas.
//! - **Dispatcher**: concurrent, policy-aware execution of one round.
//! - **Orchestrator**: the bounded loop tying it all together.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use policy::{CallerContext, ContextPolicy};
//! use runtime::{
//!     DispatchConfig, Dispatcher, OpenAiClient, Orchestrator, OrchestratorConfig, ToolRegistry,
//!     ToolboxBackend,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let toolbox = toolbox::Client::new(toolbox::ClientConfig::new("http://localhost:8081"))?;
//! let dispatcher = Dispatcher::new(
//!     Arc::new(ToolRegistry::toolbox()?),
//!     Arc::new(ContextPolicy::toolbox_defaults()),
//!     ToolboxBackend::new(toolbox),
//!     DispatchConfig::default(),
//! );
//! let model = OpenAiClient::builder("sk-...", runtime::DEFAULT_MODEL).build();
//! let orchestrator = Orchestrator::new(model, dispatcher, OrchestratorConfig::default());
//!
//! let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
//! let completion = orchestrator
//!     .run("what is my balance?", &CallerContext::user("1"), deadline, &CancellationToken::new())
//!     .await?;
//! println!("{}", completion.text);
//! # Ok(())
//! # }
//! ```

mod conversation;
mod error;
pub mod gateway;
pub mod model;
mod orchestrator;
pub mod providers;
mod retry;
pub mod tools;

#[cfg(test)]
mod testing;

pub use conversation::Conversation;
pub use error::{Error, Result};
pub use gateway::{GatewayRequest, GatewayResponse};
pub use model::{
    Message, ModelClient, ModelError, ModelRequest, PlannerOutcome, Role, ToolCall, ToolResult,
};
pub use orchestrator::{Completion, Orchestrator, OrchestratorConfig};
pub use providers::{DEFAULT_MODEL, OpenAiClient};
pub use retry::RetryPolicy;
pub use tools::{
    ArgumentSchema, DispatchConfig, Dispatcher, FieldKind, FieldSpec, ToolArguments, ToolBackend,
    ToolError, ToolRegistry, ToolSpec, ToolboxBackend,
};
