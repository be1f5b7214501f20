// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    client::{backoff::Backoff, connection::RedisConnection},
    error::EngineError,
    model::{Endpoint, SessionHealth},
};

enum State {
    /// No connection attempt has been made yet.
    Uninitialized,
    Healthy(Arc<RedisConnection>),
    Reconnecting,
    Broken,
}

/// Holds one managed session to a single endpoint (source or target) and
/// performs reconnection with bounded exponential backoff (§4.1).
///
/// `acquire` either yields a live session or fails fast with
/// [`EngineError::Unavailable`] — it never blocks waiting for a
/// reconnect in progress; callers retry on their own schedule (the next
/// incremental tick, the next dispatch attempt).
pub struct Supervisor {
    endpoint: Endpoint,
    state: RwLock<State>,
    backoff: tokio::sync::Mutex<Backoff>,
    /// `None` means unbounded attempts (the source, per §4.1 defaults).
    max_attempts: Option<u32>,
    reconnecting: AtomicBool,
}

impl Supervisor {
    pub fn new(endpoint: Endpoint, backoff: Backoff, max_attempts: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            state: RwLock::new(State::Uninitialized),
            backoff: tokio::sync::Mutex::new(backoff),
            max_attempts,
            reconnecting: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Yields a live session, or fails fast. On the very first call this
    /// attempts a synchronous connect (per §4.1 "on first acquire");
    /// afterwards, a broken or reconnecting session fails immediately
    /// without blocking on the background reconnect task.
    pub async fn acquire(self: &Arc<Self>) -> Result<Arc<RedisConnection>, EngineError> {
        {
            let guard = self.state.read().await;
            match &*guard {
                State::Healthy(conn) => return Ok(conn.clone()),
                State::Reconnecting | State::Broken => {
                    return Err(EngineError::Unavailable(self.endpoint.label().to_string()));
                },
                State::Uninitialized => {},
            }
        }

        match RedisConnection::connect(self.endpoint.clone()).await {
            Ok(conn) => {
                *self.state.write().await = State::Healthy(conn.clone());
                self.backoff.lock().await.reset();
                Ok(conn)
            },
            Err(e) => {
                warn!(endpoint = self.endpoint.label(), error = %e, "initial connect failed");
                *self.state.write().await = State::Reconnecting;
                self.spawn_reconnect();
                Err(EngineError::Unavailable(self.endpoint.label().to_string()))
            },
        }
    }

    /// Symmetry with the §4.1 `release` primitive. Sessions here are not
    /// pooled (Redis request/response is strictly sequential per
    /// connection), so this is a no-op kept for callers that borrow/return
    /// uniformly regardless of endpoint kind.
    pub fn release(&self, _conn: Arc<RedisConnection>) {}

    /// Demotes a session to `Reconnecting` after a caller observed a
    /// transport or "connection lost" protocol error, and ensures a
    /// background reconnect task is running.
    pub async fn mark_broken(self: &Arc<Self>) {
        let mut guard = self.state.write().await;
        if !matches!(*guard, State::Broken) {
            *guard = State::Reconnecting;
        }
        drop(guard);
        self.spawn_reconnect();
    }

    pub async fn health(&self) -> SessionHealth {
        match &*self.state.read().await {
            State::Healthy(_) => SessionHealth::Healthy,
            State::Reconnecting | State::Uninitialized => SessionHealth::Reconnecting,
            State::Broken => SessionHealth::Broken,
        }
    }

    /// Issues a `PING` against a currently-`Healthy` session; on failure,
    /// demotes it. A `Broken` session instead gets a fresh reconnect
    /// attempt with its backoff budget reset — per §4.1, "acquire fails
    /// fast until the next health tick" means the health tick is what
    /// gives a Broken endpoint another chance, not a permanent dead end.
    /// Intended to be driven by the engine's health-tick timer (default
    /// every 30s, §4.1).
    pub async fn health_tick(self: &Arc<Self>) {
        let healthy = {
            match &*self.state.read().await {
                State::Healthy(c) => Some(c.clone()),
                _ => None,
            }
        };
        if let Some(conn) = healthy {
            if let Err(e) = conn.ping().await {
                debug!(endpoint = self.endpoint.label(), error = %e, "health tick failed");
                self.mark_broken().await;
            }
            return;
        }

        let is_broken = matches!(*self.state.read().await, State::Broken);
        if is_broken {
            debug!(endpoint = self.endpoint.label(), "health tick: retrying broken endpoint");
            *self.state.write().await = State::Reconnecting;
            self.backoff.lock().await.reset();
            self.spawn_reconnect();
        }
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return; // already in flight
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.reconnect_loop().await;
            this.reconnecting.store(false, Ordering::Release);
        });
    }

    async fn reconnect_loop(self: &Arc<Self>) {
        loop {
            let delay = self.backoff.lock().await.next();
            tokio::time::sleep(delay).await;

            match RedisConnection::connect(self.endpoint.clone()).await {
                Ok(conn) => {
                    info!(endpoint = self.endpoint.label(), "reconnected");
                    *self.state.write().await = State::Healthy(conn);
                    self.backoff.lock().await.reset();
                    return;
                },
                Err(e) => {
                    let attempts = self.backoff.lock().await.attempts();
                    warn!(
                        endpoint = self.endpoint.label(),
                        attempt = attempts,
                        error = %e,
                        "reconnect attempt failed"
                    );
                    if matches!(self.max_attempts, Some(max) if attempts >= max) {
                        warn!(endpoint = self.endpoint.label(), "giving up, marking broken");
                        *self.state.write().await = State::Broken;
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn dead_endpoint() -> Endpoint {
        Endpoint {
            name: Some("t1".into()),
            host: "127.0.0.1".into(),
            port: 1, // nothing listens here
            db: 0,
            password: None,
            connect_timeout: Duration::from_millis(50),
            read_timeout: Duration::from_millis(50),
            keepalive: true,
        }
    }

    #[tokio::test]
    async fn acquire_fails_fast_after_failed_first_connect() {
        let backoff = Backoff::new(Duration::from_millis(20), 2.0, Duration::from_millis(100));
        let sup = Supervisor::new(dead_endpoint(), backoff, Some(1));
        assert!(sup.acquire().await.is_err());
        // second call must not block on the background reconnect
        let start = std::time::Instant::now();
        assert!(sup.acquire().await.is_err());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn exhausting_max_attempts_marks_broken() {
        let backoff = Backoff::new(Duration::from_millis(5), 2.0, Duration::from_millis(10));
        let sup = Supervisor::new(dead_endpoint(), backoff, Some(2));
        let _ = sup.acquire().await;
        // give the background reconnect loop time to exhaust its attempts
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sup.health().await, SessionHealth::Broken);
    }
}
