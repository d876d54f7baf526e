use sitelens_agent::{AgentRuntime, RuntimeSetupError};
use sitelens_core::config::{AppConfig, ConfigError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime setup failed: {0}")]
    Runtime(#[from] RuntimeSetupError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_base_url = %config.llm.base_url,
        llm_model = %config.llm.model,
        demo_mode = config.analytics.demo_mode,
        "starting application bootstrap"
    );

    let agent_runtime = AgentRuntime::from_config(&config)?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        dataset_source = %agent_runtime.dataset().describe(),
        "agent runtime initialized"
    );

    Ok(Application { config, agent_runtime })
}
