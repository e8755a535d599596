//! hapsync daemon entry point.
//!
//! Keeps an HAProxy container in step with the containers on this host
//! that opt in through their environment.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use log::{error, info};

mod config;
mod error;
mod proxy;
mod render;
mod runtime;
mod signals;
mod supervisor;
mod synth;
mod types;

use config::Config;
use proxy::ProxyManager;
use runtime::DockerRuntime;
use supervisor::Supervisor;
use synth::Synthesizer;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    info!("Starting hapsync with config: {:?}", cfg);

    let runtime = DockerRuntime::connect(cfg.docker_host.as_deref())
        .await
        .context("connecting to Docker")?;

    let mut supervisor = Supervisor::new(
        Arc::new(runtime),
        Synthesizer::new(&cfg),
        ProxyManager::new(&cfg),
    );
    supervisor
        .bootstrap()
        .await
        .context("bringing up the proxy")?;

    let shutdown = async {
        signals::wait_for_shutdown_signal()
            .await
            .map(|name| name.to_string())
    };

    let cause = supervisor.run(shutdown).await;
    if cause.is_shutdown() {
        info!("Shutting down: {}", cause);
        return Ok(());
    }
    Err(anyhow::Error::new(cause).context("supervisor stopped"))
}
