// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::{
    client::RedisConnection, codec::bytes_of, error::EngineError, model::key_record::Payload, resp::command,
};

pub async fn read(source: &RedisConnection, key: &[u8]) -> Result<Payload> {
    let reply = source.command(command::hgetall(key)).await.context("HGETALL")?;
    let Some(items) = reply.as_array() else { bail!("HGETALL did not return an array") };
    let mut pairs = Vec::with_capacity(items.len() / 2);
    for chunk in items.chunks(2) {
        let [field, value] = chunk else { bail!("HGETALL returned an odd number of elements") };
        pairs.push((bytes_of(field)?, bytes_of(value)?));
    }
    Ok(Payload::Hash(pairs))
}

pub async fn write(target: &RedisConnection, key: &[u8], fields: &[(Bytes, Bytes)]) -> Result<(), EngineError> {
    target.command(command::del(key)).await?;
    if !fields.is_empty() {
        target.command(command::hset(key, fields)).await?;
    }
    Ok(())
}
