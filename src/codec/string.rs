// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::{client::RedisConnection, error::EngineError, model::key_record::Payload, resp::command};

pub async fn read(source: &RedisConnection, key: &[u8]) -> Result<Payload> {
    let reply = source.command(command::get(key)).await.context("GET")?;
    let Some(v) = reply.as_bytes() else { bail!("GET returned nil for a key TYPE said exists") };
    Ok(Payload::String(Bytes::copy_from_slice(v)))
}

/// TTL is applied by the caller uniformly across kinds (`apply_ttl`); this
/// only writes the value.
pub async fn write(target: &RedisConnection, key: &[u8], value: &Bytes) -> Result<(), EngineError> {
    target.command(command::set(key, value)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // Exercised end-to-end against a real connection in the dispatcher's
    // integration tests; nothing pure to unit-test here beyond what
    // `resp::command` already covers.
}
