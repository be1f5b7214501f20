// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use redis_fanout::{
    cfg::{config::FilterConfig, enums::DataKind},
    client::{Backoff, Supervisor},
    dispatcher::{Dispatcher, TargetPipeline},
    event::EventBus,
    filter::KeyFilter,
    health::HealthMonitor,
    model::{
        ChangeEvent, Endpoint, KeyRecord, Payload,
        key_record::TTL_NONE,
    },
    status::StatusSurface,
};
use tokio::net::TcpListener;

use crate::integration_tests::common::spawn_mock_server;

/// One target answers normally; the other has nothing listening on its
/// port at all. The dispatcher must still apply the event to the healthy
/// target and must not let the broken one slow anything down or panic.
#[tokio::test]
async fn one_broken_target_does_not_block_the_healthy_one() {
    let (alive_addr, alive_handle) = spawn_mock_server(vec![b"+OK\r\n"]).await;

    // Reserve a port and immediately free it so nothing answers there.
    let dead_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind throwaway port");
    let dead_addr = dead_listener.local_addr().expect("throwaway local addr");
    drop(dead_listener);

    let events = EventBus::new(16);
    let health = Arc::new(HealthMonitor::new(
        ["alive".to_string(), "dead".to_string()],
        1,
        Duration::from_secs(120),
        events.clone(),
    ));
    let status = Arc::new(StatusSurface::new(
        ["alive".to_string(), "dead".to_string()],
        health.clone(),
    ));

    let alive_endpoint = Endpoint {
        name: Some("alive".to_string()),
        host: alive_addr.ip().to_string(),
        port: alive_addr.port(),
        db: 0,
        password: None,
        connect_timeout: Duration::from_millis(300),
        read_timeout: Duration::from_millis(300),
        keepalive: true,
    };
    let dead_endpoint = Endpoint {
        name: Some("dead".to_string()),
        host: dead_addr.ip().to_string(),
        port: dead_addr.port(),
        db: 0,
        password: None,
        connect_timeout: Duration::from_millis(100),
        read_timeout: Duration::from_millis(100),
        keepalive: true,
    };

    let alive_supervisor = Supervisor::new(alive_endpoint, Backoff::default_target(), Some(1));
    let dead_supervisor = Supervisor::new(
        dead_endpoint,
        Backoff::new(Duration::from_millis(20), 2.0, Duration::from_millis(50)),
        Some(1),
    );

    let pipelines = vec![
        TargetPipeline {
            name: "alive".to_string(),
            supervisor: alive_supervisor,
            filter_override: None,
            preserve_ttl: false,
        },
        TargetPipeline {
            name: "dead".to_string(),
            supervisor: dead_supervisor,
            filter_override: None,
            preserve_ttl: false,
        },
    ];

    let filter = KeyFilter::from_config(&FilterConfig::default());
    let dispatcher =
        Dispatcher::new(pipelines, filter, health.clone(), status.clone(), events, 4);

    let record = KeyRecord {
        key: Bytes::from_static(b"k"),
        kind: DataKind::String,
        payload: Payload::String(Bytes::from_static(b"v")),
        ttl_ms: TTL_NONE,
    };
    let event = ChangeEvent::new(record);

    // Dispatch must return promptly: the dead target's connect timeout
    // (100ms) bounds the slowest branch, not some unbounded retry.
    let start = std::time::Instant::now();
    dispatcher.dispatch(&event).await;
    assert!(start.elapsed() < Duration::from_secs(1));

    assert!(health.is_attemptable("alive"));
    assert!(!health.is_attemptable("dead"));

    let snapshot = status.snapshot();
    let alive_snapshot = snapshot.targets.iter().find(|t| t.name == "alive").expect("alive slot");
    assert_eq!(alive_snapshot.applied, 1);
    assert_eq!(alive_snapshot.failed, 0);

    let dead_snapshot = snapshot.targets.iter().find(|t| t.name == "dead").expect("dead slot");
    assert_eq!(dead_snapshot.failed, 1);

    let received = alive_handle.await.expect("mock server task must not panic");
    assert_eq!(received, vec!["SET k v"]);
}
