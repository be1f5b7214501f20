// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};

use crate::{
    client::RedisConnection,
    codec::bytes_of,
    error::EngineError,
    model::key_record::{Payload, StreamEntry},
    resp::command,
};

pub async fn read(source: &RedisConnection, key: &[u8]) -> Result<Payload> {
    let reply = source.command(command::xrange_all(key)).await.context("XRANGE")?;
    let Some(entries) = reply.as_array() else { bail!("XRANGE did not return an array") };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(pair) = entry.as_array() else { bail!("XRANGE entry was not [id, fields]") };
        let [id, fields] = pair else { bail!("XRANGE entry did not have exactly 2 elements") };
        let id_bytes = bytes_of(id)?;
        let id = String::from_utf8(id_bytes.to_vec()).context("stream id not utf8")?;

        let Some(field_items) = fields.as_array() else { bail!("XRANGE fields not an array") };
        let mut kv = Vec::with_capacity(field_items.len() / 2);
        for chunk in field_items.chunks(2) {
            let [f, v] = chunk else { bail!("stream fields had an odd count") };
            kv.push((bytes_of(f)?, bytes_of(v)?));
        }
        out.push(StreamEntry { id, fields: kv });
    }
    Ok(Payload::Stream(out))
}

/// Writes entries preserving their original IDs (§4.3's "XADD entries
/// preserving IDs"). A target that already has a later ID for the stream
/// will reject an out-of-order XADD; that per-key failure surfaces to the
/// dispatcher like any other codec error and the key is retried on its
/// next incremental touch.
pub async fn write(target: &RedisConnection, key: &[u8], entries: &[StreamEntry]) -> Result<(), EngineError> {
    target.command(command::del(key)).await?;
    for entry in entries {
        target.command(command::xadd(key, entry.id.as_bytes(), &entry.fields)).await?;
    }
    Ok(())
}
