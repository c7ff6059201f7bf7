//! Backend trait and the toolbox-backed implementation.

use std::future::Future;
use std::time::Duration;

use super::{ToolArguments, ToolError};

/// Trait for tool backends.
///
/// This is the boundary between the orchestration loop and the services that
/// actually answer tool calls. The response body is opaque: it goes back to
/// the model as-is.
pub trait ToolBackend: Send + Sync {
    /// Invoke `tool` with validated arguments, giving up after `timeout`.
    fn invoke(
        &self,
        tool: &str,
        args: &ToolArguments,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Tool backend served by the toolbox HTTP service.
pub struct ToolboxBackend {
    client: toolbox::Client,
}

impl ToolboxBackend {
    pub fn new(client: toolbox::Client) -> Self {
        Self { client }
    }
}

impl ToolBackend for ToolboxBackend {
    async fn invoke(
        &self,
        tool: &str,
        args: &ToolArguments,
        timeout: Duration,
    ) -> Result<String, ToolError> {
        let params = args.to_query();
        Ok(self.client.call(tool, &params, timeout).await?)
    }
}
