//! Taskloop - HTTP server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use taskloop::{tools, Agent, AppConfig, OpenAiClient, TaskServer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match std::env::var("TASKLOOP_CONFIG") {
        Ok(path) => AppConfig::from_env_or_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        Err(_) => AppConfig::from_env().context("loading configuration from environment")?,
    };
    taskloop::init_tracing(&config.logging)?;
    info!(model = %config.model.model, base_url = %config.model.base_url, "loaded configuration");

    let model = Arc::new(OpenAiClient::from_config(&config.model)?);
    let agent = Agent::new(model)
        .with_tools(tools::default_toolkit(&config.tools)?)
        .with_model_name(&config.model.model)
        .with_max_turns(config.agent.max_turns);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid listen address")?;
    TaskServer::new(agent).serve(addr).await?;
    Ok(())
}
