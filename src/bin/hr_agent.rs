use anyhow::{Context, Result};
use hr_agent::config::AgentConfig;
use hr_agent::runtime::AgentRuntime;
use hr_agent::server::serve;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hr_agent=debug")),
        )
        .init();

    let config = AgentConfig::load();

    tracing::info!(
        "Starting HR agent service \
         (configure via hr_agent_config.toml or LLM_* / EMBEDDING_* / HR_AGENT_* env vars)"
    );

    let server_rt = tokio::runtime::Runtime::new().context("failed to start server runtime")?;
    server_rt.block_on(async move {
        let runtime = AgentRuntime::bootstrap(config)
            .await
            .context("failed to bootstrap agent runtime")?;
        serve(runtime).await
    })
}
