use std::process;

use anyhow::Context;
use phonebook_api::{config::Config, handler, server::Server, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        tracing::error!("{err:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let state = AppState::from_config(&config)
        .await
        .context("failed to connect to the database")?;
    let repository = state.repository.clone();

    let server = Server::new(state, handler::route_request);
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    let served = server
        .bind(config.server_address(), shutdown)
        .await
        .context("server failed");

    repository.close().await;
    served
}
