// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Top-level orchestration (SPEC_FULL §10.1 `engine`): wires the
//! Connection Supervisor, Key Filter, Dedup Cache, Full-Sync Engine,
//! Incremental Engine and Fan-out Dispatcher together, including the
//! hybrid-mode full-sync-complete gate of §4.5/§5.
//!
//! `Engine` is constructed from an already-validated [`Config`] and never
//! touches the filesystem itself — loading a config file is `main.rs`'s
//! job, preserving the "the engine does not parse files" boundary from
//! §1.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cfg::{
        config::Config,
        enums::SyncMode,
    },
    client::{Backoff, Supervisor},
    dedup::{self, DedupCache},
    dispatcher::{Dispatcher, TargetPipeline},
    event::{EventBus, ReplicationEvent},
    filter::KeyFilter,
    fullsync,
    health::HealthMonitor,
    incremental::{self, DriverContext},
    model::{Endpoint, SessionHealth},
    status::StatusSurface,
};

/// Process exit codes from §6, owned here so `main.rs` only has to match
/// on [`EngineOutcome`] rather than re-derive the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    CleanShutdown,
    SourceUnreachableAtStart,
    IrrecoverableReplicationError,
}

impl EngineOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            EngineOutcome::CleanShutdown => 0,
            EngineOutcome::SourceUnreachableAtStart => 3,
            EngineOutcome::IrrecoverableReplicationError => 4,
        }
    }
}

/// Owns every long-lived component and the shutdown token that cancels
/// them together.
pub struct Engine {
    cfg: Config,
    source: Arc<Supervisor>,
    dispatcher: Arc<Dispatcher>,
    health: Arc<HealthMonitor>,
    status: Arc<StatusSurface>,
    dedup: Arc<DedupCache>,
    filter: KeyFilter,
    events: EventBus,
    shutdown: CancellationToken,
}

impl Engine {
    /// Builds every component from a validated configuration. Opens no
    /// sockets; connections happen lazily on first `acquire()` inside
    /// [`Engine::run`].
    pub fn new(cfg: Config) -> Result<Self> {
        let events = EventBus::new(1024);

        let source_endpoint = Endpoint::source(&cfg.source.endpoint);
        let source = Supervisor::new(source_endpoint, Backoff::default_target(), None);

        let target_names: Vec<String> =
            cfg.enabled_targets().map(|t| t.name.clone()).collect();
        anyhow::ensure!(!target_names.is_empty(), "no enabled targets configured");

        let health = Arc::new(HealthMonitor::new(
            target_names.clone(),
            cfg.service.failover.max_failures,
            cfg.service.failover.recovery_delay,
            events.clone(),
        ));
        let status = Arc::new(StatusSurface::new(target_names, health.clone()));
        let filter = KeyFilter::from_config(&cfg.filters);
        let dedup = Arc::new(DedupCache::new(dedup::DEFAULT_WINDOW, dedup::DEFAULT_CAPACITY));

        let mut pipelines = Vec::with_capacity(cfg.targets.len());
        for target in cfg.enabled_targets() {
            let endpoint = Endpoint::target(target.name.clone(), &target.endpoint);
            let backoff = Backoff::new(
                cfg.service.retry.initial_delay,
                cfg.service.retry.backoff_factor,
                cfg.service.retry.max_delay,
            );
            let supervisor =
                Supervisor::new(endpoint, backoff, Some(cfg.service.retry.max_attempts));
            pipelines.push(TargetPipeline {
                name: target.name.clone(),
                supervisor,
                filter_override: None,
                preserve_ttl: cfg.sync.full_sync.preserve_ttl,
            });
        }

        let dispatcher = Arc::new(Dispatcher::new(
            pipelines,
            filter.clone(),
            health.clone(),
            status.clone(),
            events.clone(),
            cfg.service.performance.max_workers as usize,
        ));

        Ok(Self {
            cfg,
            source,
            dispatcher,
            health,
            status,
            dedup,
            filter,
            events,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn status(&self) -> Arc<StatusSurface> {
        self.status.clone()
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// A clone of this engine's shutdown token, so `main.rs` can trigger
    /// cancellation from a `tokio::signal::ctrl_c()` listener.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs full-sync (if configured) then the incremental engine (if
    /// configured) until the shutdown token is cancelled, and maps the
    /// outcome to one of the §6 exit codes.
    pub async fn run(self) -> Result<EngineOutcome> {
        if !self.wait_for_source_at_startup().await {
            return Ok(EngineOutcome::SourceUnreachableAtStart);
        }

        let mut background = JoinSet::new();
        background.spawn(health_tick_loop(
            self.source.clone(),
            self.dispatcher_supervisors(),
            self.health.clone(),
            self.status.clone(),
            self.shutdown.clone(),
        ));

        if self.cfg.sync.mode != SyncMode::Incremental {
            if let Err(e) = self.run_full_sync().await {
                warn!(error = %e, "full-sync pass failed irrecoverably");
                self.shutdown.cancel();
                background.shutdown().await;
                return Ok(EngineOutcome::IrrecoverableReplicationError);
            }
        }

        let incremental_handle = if self.cfg.sync.mode != SyncMode::Full
            && self.cfg.sync.incremental_sync.enabled
        {
            Some(self.spawn_incremental())
        } else {
            None
        };

        self.shutdown.cancelled().await;
        info!("engine: shutdown signaled, draining background tasks");

        if let Some(handle) = incremental_handle {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), background.shutdown()).await;

        Ok(EngineOutcome::CleanShutdown)
    }

    /// Retries acquiring the source session up to
    /// `service.retry.max_attempts` times with the configured backoff
    /// before giving up — the bounded "at start" check the unbounded
    /// steady-state reconnect loop (§4.1) deliberately doesn't perform on
    /// its own.
    async fn wait_for_source_at_startup(&self) -> bool {
        let mut backoff = Backoff::new(
            self.cfg.service.retry.initial_delay,
            self.cfg.service.retry.backoff_factor,
            self.cfg.service.retry.max_delay,
        );
        for attempt in 0..self.cfg.service.retry.max_attempts {
            if self.source.acquire().await.is_ok() {
                self.status.set_source_state("healthy");
                self.events.emit(ReplicationEvent::SourceReconnected);
                return true;
            }
            warn!(attempt, "engine: source unreachable at startup, retrying");
            tokio::time::sleep(backoff.next()).await;
        }
        self.source.acquire().await.is_ok()
    }

    async fn run_full_sync(&self) -> Result<()> {
        let conn = self.source.acquire().await.context("acquiring source session for full-sync")?;
        let report = fullsync::run(
            self.cfg.sync.full_sync.strategy,
            &conn,
            &self.filter,
            &self.dispatcher,
            self.cfg.sync.full_sync.batch_size,
        )
        .await
        .context("full-sync pass")?;

        info!(
            migrated = report.keys_migrated,
            filtered = report.keys_filtered,
            failed = report.keys_failed,
            "full-sync complete"
        );
        self.events
            .emit(ReplicationEvent::FullSyncComplete { keys_migrated: report.keys_migrated });
        Ok(())
    }

    fn spawn_incremental(&self) -> tokio::task::JoinHandle<()> {
        let ctx = DriverContext {
            source: self.source.clone(),
            filter: self.filter.clone(),
            dispatcher: self.dispatcher.clone(),
            dedup: self.dedup.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
            interval: self.cfg.sync.incremental_sync.interval,
            max_changes_per_sync: self.cfg.sync.incremental_sync.max_changes_per_sync,
        };
        let driver = self.cfg.sync.incremental_sync.driver;
        tokio::spawn(incremental::run(driver, ctx))
    }

    fn dispatcher_supervisors(&self) -> Vec<Arc<Supervisor>> {
        self.dispatcher.target_supervisors()
    }
}

/// Periodic health tick (§4.1, default 30s): PINGs every currently-healthy
/// session, promotes any target whose cooldown has elapsed, and refreshes
/// the dashboard-facing `source_state` (§4.8) from the source's actual
/// session state rather than leaving it frozen at whatever
/// `wait_for_source_at_startup` last set.
async fn health_tick_loop(
    source: Arc<Supervisor>,
    targets: Vec<Arc<Supervisor>>,
    health: Arc<HealthMonitor>,
    status: Arc<StatusSurface>,
    shutdown: CancellationToken,
) {
    const HEALTH_TICK_INTERVAL: Duration = Duration::from_secs(30);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(HEALTH_TICK_INTERVAL) => {},
        }
        source.health_tick().await;
        status.set_source_state(source_state_label(source.health().await));
        for target in &targets {
            target.health_tick().await;
        }
        health.tick_recovery();
    }
}

fn source_state_label(health: SessionHealth) -> &'static str {
    match health {
        SessionHealth::Healthy => "healthy",
        SessionHealth::Reconnecting => "reconnecting",
        SessionHealth::Broken => "broken",
    }
}
