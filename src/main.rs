mod analysis;
mod analyzer;
mod config;
mod error;
mod llm;
mod profile;
mod prompt;
mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Args, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("eatwise=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    // Local env file first, so clap sees its values as environment
    let env_file = config::load_env_file()?;
    let args = Args::parse();

    // Fails before anything is bound
    let config = Arc::new(Config::try_from(args)?);

    if let Some(path) = env_file {
        info!("Loaded environment from {}", path.display());
    }
    info!("Starting eatwise on {}", config.bind_addr());
    info!("Azure endpoint: {}", config.endpoint);
    info!("Deployment: {} (api-version {})", config.deployment, config.api_version);
    info!("API key fingerprint: {}", config.api_key.fingerprint());

    server::run(config).await?;

    Ok(())
}
