// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use redis_fanout::{
    cfg::{cli::resolve_default, config::Config, logger},
    engine::{Engine, EngineOutcome},
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = match resolve_default("config/redis-fanout.logger.yaml") {
        Ok(path) => logger::init_logger(path.to_string_lossy().as_ref())
            .unwrap_or_else(|_| logger::init_default_logger()),
        Err(_) => logger::init_default_logger(),
    };

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            std::process::exit(2);
        },
    };

    let engine = match Engine::new(cfg) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "failed to build engine from configuration");
            std::process::exit(2);
        },
    };

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            shutdown.cancel();
        }
    });

    let outcome = engine.run().await.context("engine run failed")?;
    match outcome {
        EngineOutcome::CleanShutdown => info!("clean shutdown"),
        EngineOutcome::SourceUnreachableAtStart => {
            error!("source unreachable after maximum attempts at start")
        },
        EngineOutcome::IrrecoverableReplicationError => {
            error!("irrecoverable replication error")
        },
    }
    std::process::exit(outcome.exit_code());
}

/// Resolves and loads the replication config: `REDIS_FANOUT_CONFIG` env
/// var if set, else `config/redis-fanout.yaml` relative to the working
/// directory.
fn load_config() -> Result<Config> {
    let path = resolve_default("config/redis-fanout.yaml").context("resolving config path")?;
    Config::load_from_file(&path)
        .with_context(|| format!("loading config from {}", path.display()))
}
