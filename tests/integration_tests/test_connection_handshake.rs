// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use redis_fanout::{client::RedisConnection, model::Endpoint};

use crate::integration_tests::common::spawn_mock_server;

#[tokio::test]
async fn connect_performs_the_auth_select_ping_handshake_in_order() {
    let (addr, handle) =
        spawn_mock_server(vec![b"+OK\r\n", b"+OK\r\n", b"+PONG\r\n"]).await;

    let endpoint = Endpoint {
        name: None,
        host: addr.ip().to_string(),
        port: addr.port(),
        db: 2,
        password: Some("s3cr3t".to_string()),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        keepalive: true,
    };

    let conn = RedisConnection::connect(endpoint).await.expect("handshake must succeed");
    assert_eq!(conn.endpoint().db, 2);

    let received = handle.await.expect("mock server task must not panic");
    assert_eq!(received, vec!["AUTH s3cr3t", "SELECT 2", "PING"]);
}

#[tokio::test]
async fn connect_skips_select_when_db_is_zero() {
    let (addr, handle) = spawn_mock_server(vec![b"+PONG\r\n"]).await;

    let endpoint = Endpoint {
        name: None,
        host: addr.ip().to_string(),
        port: addr.port(),
        db: 0,
        password: None,
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        keepalive: true,
    };

    RedisConnection::connect(endpoint).await.expect("handshake must succeed");

    let received = handle.await.expect("mock server task must not panic");
    assert_eq!(received, vec!["PING"]);
}
