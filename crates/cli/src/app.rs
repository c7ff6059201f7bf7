//! Wiring of the planner, the toolbox and the loop from configuration.

use std::sync::Arc;
use std::time::Duration;

use runtime::{Dispatcher, OpenAiClient, Orchestrator, ToolRegistry, ToolboxBackend};
use tracing::info;

use crate::config::{Config, ConfigError};
use crate::error::Result;

/// The orchestrator as deployed: OpenAI planner, HTTP toolbox.
pub type Gateway = Orchestrator<OpenAiClient, ToolboxBackend>;

pub fn build(config: &Config) -> Result<Gateway> {
    let registry = ToolRegistry::toolbox()?;

    let mut toolbox_config = toolbox::ClientConfig::new(&config.toolbox.base_url)
        .with_timeout(Duration::from_secs(config.toolbox.timeout_secs));
    for (tool, route) in &config.toolbox.routes {
        if registry.lookup(tool).is_none() {
            let msg = format!("route configured for unknown tool {tool}");
            return Err(ConfigError::Invalid(msg).into());
        }
        toolbox_config = toolbox_config.with_route(tool, route);
    }
    let toolbox = toolbox::Client::new(toolbox_config)?;

    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(config.policy()?),
        ToolboxBackend::new(toolbox),
        config.dispatch_config(),
    );

    let mut model = OpenAiClient::builder(config.api_key()?, &config.model.model)
        .base_url(&config.model.base_url);
    if let Some(system) = &config.model.system_prompt {
        model = model.system(system);
    }
    if let Some(max_tokens) = config.model.max_tokens {
        model = model.max_tokens(max_tokens);
    }
    let model = model.build();

    info!(%model, toolbox = %config.toolbox.base_url, "gateway configured");
    Ok(Orchestrator::new(model, dispatcher, config.orchestrator_config()))
}
