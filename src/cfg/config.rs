// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{FullSyncStrategy, IncrementalDriver, SyncMode};

/// Top-level validated configuration record handed to [`crate::engine::Engine`].
///
/// This is the on-disk contract: the engine consumes this
/// record, it never reaches into the filesystem on its own. `Config::load_from_file`
/// exists purely as an ambient convenience for `main.rs` and for tests.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// The single source endpoint that is mirrored into every target.
    pub source: SourceConfig,
    /// Ordered list of targets. Order only affects iteration for logging;
    /// dispatch itself is unordered and concurrent (§4.7).
    pub targets: Vec<TargetConfig>,
    /// Full-sync / incremental / hybrid mode selection and per-mode knobs.
    pub sync: SyncConfig,
    /// Key Filter configuration (§4.2).
    pub filters: FilterConfig,
    /// Connection supervisor, failover and worker-pool knobs (§4.1/§4.7/§5).
    pub service: ServiceConfig,
}

/// Host/port/auth/TLS-adjacent identity of one Redis endpoint, shared shape
/// between the source and every target (§3 "Endpoint descriptor").
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, with = "serde_secs_opt")]
    pub socket_timeout: Option<Duration>,
    #[serde(default, with = "serde_secs_opt")]
    pub socket_connect_timeout: Option<Duration>,
    #[serde(default = "default_true")]
    pub socket_keepalive: bool,
}

fn default_true() -> bool {
    true
}

impl EndpointConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.socket_connect_timeout.unwrap_or(Duration::from_secs(10))
    }

    pub fn read_timeout(&self) -> Duration {
        self.socket_timeout.unwrap_or(Duration::from_secs(30))
    }
}

/// The source has no stable name, only connection parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub endpoint: EndpointConfig,
}

/// One configured replication target.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TargetConfig {
    /// Stable name identifying this target across restarts (§3).
    pub name: String,
    #[serde(flatten)]
    pub endpoint: EndpointConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub full_sync: FullSyncConfig,
    pub incremental_sync: IncrementalSyncConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FullSyncConfig {
    pub strategy: FullSyncStrategy,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_true")]
    pub preserve_ttl: bool,
}

fn default_batch_size() -> u32 {
    500
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct IncrementalSyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub driver: IncrementalDriver,
    #[serde(with = "serde_secs")]
    pub interval: Duration,
    #[serde(default)]
    pub max_changes_per_sync: Option<u32>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub min_ttl: u64,
    #[serde(default)]
    pub max_key_size: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServiceConfig {
    pub retry: RetryConfig,
    pub failover: FailoverConfig,
    pub performance: PerformanceConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_initial_delay", with = "serde_millis")]
    pub initial_delay: Duration,
    #[serde(default = "default_max_delay", with = "serde_secs")]
    pub max_delay: Duration,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_factor: default_backoff_factor(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FailoverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_recovery_delay", with = "serde_secs")]
    pub recovery_delay: Duration,
}

fn default_max_failures() -> u32 {
    10
}
fn default_recovery_delay() -> Duration {
    Duration::from_secs(120)
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failures: default_max_failures(),
            recovery_delay: default_recovery_delay(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    #[serde(default)]
    pub memory_limit: Option<u64>,
}

fn default_max_workers() -> u32 {
    8
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            memory_limit: None,
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value. Ambient convenience for `main.rs`; the engine
    /// itself never calls this.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates cross-field invariants the wire format can't express on its
    /// own (duplicate target names, zero-length windows, and so on).
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.source.endpoint.host.is_empty(), "source host must not be empty");

        ensure!(!self.targets.is_empty(), "at least one target must be configured");

        let mut seen = HashSet::with_capacity(self.targets.len());
        for t in &self.targets {
            ensure!(!t.name.is_empty(), "target name must not be empty");
            ensure!(seen.insert(t.name.clone()), "duplicate target name: {}", t.name);
        }

        ensure!(
            self.sync.incremental_sync.interval >= Duration::from_secs(1),
            "sync.incremental_sync.interval must be >= 1s"
        );

        ensure!(
            self.service.performance.max_workers >= 1,
            "service.performance.max_workers must be >= 1"
        );
        ensure!(
            self.service.failover.max_failures >= 1,
            "service.failover.max_failures must be >= 1"
        );
        ensure!(
            self.service.retry.max_attempts >= 1,
            "service.retry.max_attempts must be >= 1"
        );
        ensure!(
            self.service.retry.backoff_factor > 1.0,
            "service.retry.backoff_factor must be > 1.0"
        );

        Ok(())
    }

    /// Targets with `enabled = true`, in configured order.
    pub fn enabled_targets(&self) -> impl Iterator<Item = &TargetConfig> {
        self.targets.iter().filter(|t| t.enabled)
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helpers for an `Option<Duration>` represented as a number of seconds.
mod serde_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

/// Serde helpers for representing `Duration` as a number of milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
source:
  host: src.internal
  port: 6379
targets:
  - name: eu-west
    host: eu.example.com
    port: 6379
  - name: ap-south
    host: ap.example.com
    port: 6379
    enabled: false
sync:
  mode: hybrid
  full_sync:
    strategy: scan
  incremental_sync:
    driver: psync
    interval: 30
filters: {}
service:
  retry: {}
  failover: {}
  performance: {}
"#
    }

    #[test]
    fn parses_and_validates_minimal_config() {
        let mut cfg: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        cfg.validate_and_normalize().unwrap();
        assert_eq!(cfg.targets.len(), 2);
        assert_eq!(cfg.enabled_targets().count(), 1);
        assert_eq!(cfg.service.failover.max_failures, 10);
        assert_eq!(cfg.service.retry.backoff_factor, 2.0);
    }

    #[test]
    fn rejects_duplicate_target_names() {
        let mut cfg: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        cfg.targets[1].name = "eu-west".to_string();
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn rejects_empty_target_list() {
        let mut cfg: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        cfg.targets.clear();
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn rejects_sub_second_incremental_interval() {
        let mut cfg: Config = serde_yaml::from_str(sample_yaml()).unwrap();
        cfg.sync.incremental_sync.interval = Duration::from_millis(500);
        assert!(cfg.validate_and_normalize().is_err());
    }
}
