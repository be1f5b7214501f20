// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::{
    client::RedisConnection, codec::bytes_of, error::EngineError, model::key_record::Payload, resp::command,
};

pub async fn read(source: &RedisConnection, key: &[u8]) -> Result<Payload> {
    let reply = source.command(command::lrange_all(key)).await.context("LRANGE")?;
    let Some(items) = reply.as_array() else { bail!("LRANGE did not return an array") };
    let values = items.iter().map(bytes_of).collect::<Result<Vec<_>>>()?;
    Ok(Payload::List(values))
}

pub async fn write(target: &RedisConnection, key: &[u8], values: &[Bytes]) -> Result<(), EngineError> {
    target.command(command::del(key)).await?;
    if !values.is_empty() {
        target.command(command::rpush(key, values)).await?;
    }
    Ok(())
}
