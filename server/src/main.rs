use std::sync::Arc;

use thiserror::Error;

use crate::api::server::AppState;
use crate::db::Bindings;
use crate::util::env::{Env, EnvErr};
use crate::util::github::{GithubVerifier, IdentityErr};
use crate::util::telemetry::{Telemetry, TelemetryErr};

mod api;
mod db;
mod util;

#[cfg(test)]
mod test_utils;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Env(#[from] EnvErr),

    #[error("telemetry setup error: {0}")]
    Telemetry(#[from] TelemetryErr),

    #[error("identity verifier setup error: {0}")]
    Identity(#[from] IdentityErr),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let env = Env::new()?;

    let telemetry = Telemetry::new(&env)?;
    telemetry.register()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        collector = ?telemetry.collector_url,
        "starting counter service"
    );

    let origins = env.allowed_origins();
    if origins.is_empty() {
        tracing::warn!("CORS allow-list is empty, health will report env as unhealthy");
    }

    let bindings = Bindings::connect(env.visit_counts_url.as_deref(), env.likes_url.as_deref()).await;
    let identity = GithubVerifier::new(&env.github_api_url, env.identity_timeout())?;

    let state = AppState::new(bindings, Arc::new(identity), telemetry.metrics(), origins);
    let served = api::server::start_server(env.server_api_port, Arc::new(state)).await;

    tracing::info!("server stopped, flushing telemetry");
    telemetry.shutdown();

    Ok(served?)
}
