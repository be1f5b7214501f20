// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;

use redis_fanout::resp::{RespFrame, RespReader};
use tokio::{io::AsyncWriteExt, net::TcpListener, task::JoinHandle};

/// Binds a loopback listener, accepts exactly one connection, and replies
/// with `replies` in order as each command arrives. Returns the bound
/// address plus a handle that resolves to the space-joined argument list
/// of every command it actually saw, so tests can assert on wire order
/// without hand-rolling a RESP parser per test.
pub async fn spawn_mock_server(replies: Vec<&'static [u8]>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock redis server");
    let addr = listener.local_addr().expect("mock redis server local addr");

    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        let Ok((stream, _)) = listener.accept().await else { return received };
        let (r, mut w) = stream.into_split();
        let mut reader = RespReader::new(r);

        for reply in replies {
            let Ok(frame) = reader.read_frame().await else { break };
            received.push(render_command(&frame));
            if w.write_all(reply).await.is_err() {
                break;
            }
        }
        received
    });

    (addr, handle)
}

fn render_command(frame: &RespFrame) -> String {
    let Some(items) = frame.as_array() else { return String::new() };
    items
        .iter()
        .map(|f| f.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ")
}
