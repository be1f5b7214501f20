// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The PSYNC command-translation table (§4.6): classifies one inline
//! replication command into what it did to which key(s), so the driver
//! knows whether to re-read a key from the source, emit a tombstone
//! directly, or (for a keyspace-wide command) just log and move on.
//!
//! This table does not attempt to replay each command's exact semantics —
//! it only identifies the affected key. The actual new value is always
//! obtained by re-reading the key from the source after the command has
//! already applied there, the same policy the original spec calls out
//! explicitly for `HSET` ("a Hash event synthesized by reading the
//! current hash on the source"), generalized to every kind.

use bytes::Bytes;

use crate::resp::RespFrame;

/// What to do with one parsed replication command.
pub enum Translated {
    /// The key may still exist; re-read it and emit whatever is found (or
    /// a tombstone if it is already gone).
    Touched(Bytes),
    /// The key is known to be gone; emit a tombstone without a read.
    Removed(Bytes),
    /// A keyspace-wide command with no single affected key. Convergence
    /// for the keys it touched is deferred to the next full sync.
    Global,
    /// Not in the translation table.
    Unsupported,
}

/// Classifies one command frame (a RESP array of bulk strings: `[NAME,
/// arg, arg, ...]`). Returns [`Translated::Unsupported`] for anything
/// that isn't an array, isn't a recognized name, or is missing the
/// key argument the table expects.
pub fn classify(frame: &RespFrame) -> Translated {
    let Some(items) = frame.as_array() else { return Translated::Unsupported };
    let Some((name, rest)) = items.split_first() else { return Translated::Unsupported };
    let Some(name) = name.as_bytes() else { return Translated::Unsupported };
    let name = String::from_utf8_lossy(name).to_ascii_uppercase();

    match name.as_str() {
        "FLUSHDB" | "FLUSHALL" => Translated::Global,

        "DEL" | "UNLINK" => match first_key(rest) {
            Some(key) => Translated::Removed(key),
            None => Translated::Unsupported,
        },

        // Every other table entry re-reads the key: the command's exact
        // effect (what field changed, by how much) doesn't matter once
        // we're going to fetch the post-command value anyway.
        "SET" | "EXPIRE" | "PEXPIRE" | "EXPIREAT" | "PEXPIREAT" | "PERSIST" | "HSET" | "HDEL"
        | "HINCRBY" | "HINCRBYFLOAT" | "RPUSH" | "LPUSH" | "LPOP" | "RPOP" | "LSET" | "LREM"
        | "LTRIM" | "SADD" | "SREM" | "SPOP" | "ZADD" | "ZREM" | "ZINCRBY" | "XADD" | "XDEL"
        | "XTRIM" => match first_key(rest) {
            Some(key) => Translated::Touched(key),
            None => Translated::Unsupported,
        },

        _ => Translated::Unsupported,
    }
}

fn first_key(args: &[RespFrame]) -> Option<Bytes> {
    args.first().and_then(|f| f.as_bytes()).map(Bytes::copy_from_slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(parts: &[&str]) -> RespFrame {
        RespFrame::Array(Some(parts.iter().map(|p| RespFrame::bulk(p.as_bytes().to_vec())).collect()))
    }

    #[test]
    fn set_is_touched() {
        let f = command(&["SET", "k", "v"]);
        assert!(matches!(classify(&f), Translated::Touched(k) if k == Bytes::from_static(b"k")));
    }

    #[test]
    fn del_is_removed() {
        let f = command(&["DEL", "k"]);
        assert!(matches!(classify(&f), Translated::Removed(k) if k == Bytes::from_static(b"k")));
    }

    #[test]
    fn lowercase_command_names_are_recognized() {
        let f = command(&["set", "k", "v"]);
        assert!(matches!(classify(&f), Translated::Touched(_)));
    }

    #[test]
    fn flushall_is_global() {
        let f = command(&["FLUSHALL"]);
        assert!(matches!(classify(&f), Translated::Global));
    }

    #[test]
    fn unknown_command_is_unsupported() {
        let f = command(&["BITCOUNT", "k"]);
        assert!(matches!(classify(&f), Translated::Unsupported));
    }

    #[test]
    fn non_array_frame_is_unsupported() {
        assert!(matches!(classify(&RespFrame::Simple(Bytes::from_static(b"PING"))), Translated::Unsupported));
    }
}
