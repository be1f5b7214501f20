// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use redis_fanout::{cfg::config::Config, engine::Engine};

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
fn new_wires_every_component_without_opening_a_socket() {
    let mut cfg: Config = serde_yaml::from_str(sample_yaml()).expect("sample yaml must parse");
    cfg.validate_and_normalize().expect("sample config must validate");

    let engine = Engine::new(cfg).expect("engine construction must succeed");

    // The disabled target is dropped entirely: only eu-west gets a
    // counter slot on the status surface.
    let snap = engine.status().snapshot();
    assert_eq!(snap.targets.len(), 1);
    assert_eq!(snap.targets[0].name, "eu-west");

    // No component has cancelled the shutdown token yet.
    assert!(!engine.shutdown_handle().is_cancelled());
}

#[test]
fn rejects_a_config_with_no_enabled_targets() {
    let mut cfg: Config = serde_yaml::from_str(sample_yaml()).expect("sample yaml must parse");
    cfg.targets.iter_mut().for_each(|t| t.enabled = false);
    cfg.validate_and_normalize().expect("sample config must still validate");

    assert!(Engine::new(cfg).is_err());
}
