// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::{
    client::RedisConnection, codec::bytes_of, error::EngineError, model::key_record::Payload, resp::command,
};

pub async fn read(source: &RedisConnection, key: &[u8]) -> Result<Payload> {
    let reply = source.command(command::zrange_all_withscores(key)).await.context("ZRANGE")?;
    let Some(items) = reply.as_array() else { bail!("ZRANGE did not return an array") };
    let mut members = Vec::with_capacity(items.len() / 2);
    for chunk in items.chunks(2) {
        let [member, score] = chunk else { bail!("ZRANGE WITHSCORES returned an odd count") };
        let member = bytes_of(member)?;
        let score_bytes = bytes_of(score)?;
        let score: f64 = std::str::from_utf8(&score_bytes)
            .context("zset score not utf8")?
            .parse()
            .context("zset score not a float")?;
        members.push((member, score));
    }
    Ok(Payload::SortedSet(members))
}

pub async fn write(target: &RedisConnection, key: &[u8], members: &[(Bytes, f64)]) -> Result<(), EngineError> {
    target.command(command::del(key)).await?;
    if !members.is_empty() {
        target.command(command::zadd(key, members)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn score_parses_as_float() {
        let s: f64 = "3.14".parse().unwrap();
        assert!((s - 3.14).abs() < f64::EPSILON);
    }
}
