// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::{
    client::RedisConnection, codec::bytes_of, error::EngineError, model::key_record::Payload, resp::command,
};

pub async fn read(source: &RedisConnection, key: &[u8]) -> Result<Payload> {
    let reply = source.command(command::smembers(key)).await.context("SMEMBERS")?;
    let Some(items) = reply.as_array() else { bail!("SMEMBERS did not return an array") };
    let members = items.iter().map(bytes_of).collect::<Result<Vec<_>>>()?;
    Ok(Payload::Set(members))
}

pub async fn write(target: &RedisConnection, key: &[u8], members: &[Bytes]) -> Result<(), EngineError> {
    target.command(command::del(key)).await?;
    if !members.is_empty() {
        target.command(command::sadd(key, members)).await?;
    }
    Ok(())
}
