// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use redis_fanout::cfg::config::Config;
use std::time::Duration;

fn base_yaml() -> &'static str {
    r#"
source:
  host: src.internal
  port: 6379
targets:
  - name: eu-west
    host: eu.example.com
    port: 6379
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

fn parse() -> Config {
    serde_yaml::from_str(base_yaml()).expect("base yaml must parse")
}

#[test]
fn rejects_empty_source_host() {
    let mut cfg = parse();
    cfg.source.endpoint.host.clear();
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn rejects_backoff_factor_at_or_below_one() {
    let mut cfg = parse();
    cfg.service.retry.backoff_factor = 1.0;
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn rejects_zero_max_workers() {
    let mut cfg = parse();
    cfg.service.performance.max_workers = 0;
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn rejects_zero_max_failures() {
    let mut cfg = parse();
    cfg.service.failover.max_failures = 0;
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn rejects_zero_max_attempts() {
    let mut cfg = parse();
    cfg.service.retry.max_attempts = 0;
    assert!(cfg.validate_and_normalize().is_err());
}

#[test]
fn accepts_a_fully_populated_config() {
    let mut cfg = parse();
    cfg.service.retry.initial_delay = Duration::from_millis(250);
    assert!(cfg.validate_and_normalize().is_ok());
}
