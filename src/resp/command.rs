// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Builders that render a command and its arguments as the RESP array of
//! bulk strings every Redis server expects on input, regardless of what
//! the reply looks like.

use bytes::{BufMut, Bytes, BytesMut};

/// Encodes `args` as a RESP array of bulk strings, e.g. `encode(&["SET",
/// "k", "v"])` becomes `*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n`.
pub fn encode<I, A>(args: I) -> Bytes
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let items: Vec<Box<[u8]>> = args.into_iter().map(|a| a.as_ref().into()).collect();
    let mut buf = BytesMut::with_capacity(32 * items.len());
    buf.put_u8(b'*');
    buf.put_slice(items.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for item in &items {
        buf.put_u8(b'$');
        buf.put_slice(item.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(item);
        buf.put_slice(b"\r\n");
    }
    buf.freeze()
}

pub fn ping() -> Bytes {
    encode(["PING"])
}

pub fn auth(password: &str) -> Bytes {
    encode(["AUTH", password])
}

pub fn select(db: u32) -> Bytes {
    encode(["SELECT", &db.to_string()])
}

pub fn get(key: &[u8]) -> Bytes {
    encode_bytes(&[b"GET", key])
}

pub fn set(key: &[u8], value: &[u8]) -> Bytes {
    encode_bytes(&[b"SET", key, value])
}

pub fn del(key: &[u8]) -> Bytes {
    encode_bytes(&[b"DEL", key])
}

pub fn pexpire(key: &[u8], ttl_ms: u64) -> Bytes {
    encode_bytes(&[b"PEXPIRE", key, ttl_ms.to_string().as_bytes()])
}

pub fn persist(key: &[u8]) -> Bytes {
    encode_bytes(&[b"PERSIST", key])
}

pub fn pttl(key: &[u8]) -> Bytes {
    encode_bytes(&[b"PTTL", key])
}

pub fn ttype(key: &[u8]) -> Bytes {
    encode_bytes(&[b"TYPE", key])
}

pub fn hgetall(key: &[u8]) -> Bytes {
    encode_bytes(&[b"HGETALL", key])
}

pub fn hset(key: &[u8], fields: &[(Bytes, Bytes)]) -> Bytes {
    let mut args: Vec<&[u8]> = vec![b"HSET", key];
    for (f, v) in fields {
        args.push(f);
        args.push(v);
    }
    encode_bytes(&args)
}

pub fn lrange_all(key: &[u8]) -> Bytes {
    encode_bytes(&[b"LRANGE", key, b"0", b"-1"])
}

pub fn rpush(key: &[u8], values: &[Bytes]) -> Bytes {
    let mut args: Vec<&[u8]> = vec![b"RPUSH", key];
    args.extend(values.iter().map(|v| v.as_ref()));
    encode_bytes(&args)
}

pub fn smembers(key: &[u8]) -> Bytes {
    encode_bytes(&[b"SMEMBERS", key])
}

pub fn sadd(key: &[u8], members: &[Bytes]) -> Bytes {
    let mut args: Vec<&[u8]> = vec![b"SADD", key];
    args.extend(members.iter().map(|m| m.as_ref()));
    encode_bytes(&args)
}

pub fn zrange_all_withscores(key: &[u8]) -> Bytes {
    encode_bytes(&[b"ZRANGE", key, b"0", b"-1", b"WITHSCORES"])
}

pub fn zadd(key: &[u8], members: &[(Bytes, f64)]) -> Bytes {
    let mut args: Vec<Vec<u8>> = vec![b"ZADD".to_vec(), key.to_vec()];
    for (member, score) in members {
        args.push(score.to_string().into_bytes());
        args.push(member.to_vec());
    }
    let refs: Vec<&[u8]> = args.iter().map(|a| a.as_slice()).collect();
    encode_bytes(&refs)
}

pub fn xrange_all(key: &[u8]) -> Bytes {
    encode_bytes(&[b"XRANGE", key, b"-", b"+"])
}

pub fn xadd(key: &[u8], id: &[u8], fields: &[(Bytes, Bytes)]) -> Bytes {
    let mut args: Vec<&[u8]> = vec![b"XADD", key, id];
    for (f, v) in fields {
        args.push(f);
        args.push(v);
    }
    encode_bytes(&args)
}

pub fn dump(key: &[u8]) -> Bytes {
    encode_bytes(&[b"DUMP", key])
}

pub fn restore_replace(key: &[u8], ttl_ms: u64, payload: &[u8]) -> Bytes {
    encode_bytes(&[b"RESTORE", key, ttl_ms.to_string().as_bytes(), payload, b"REPLACE"])
}

/// As [`restore_replace`], but also passes `IDLETIME <seconds>` so the
/// dump-restore fast path can preserve the source's `OBJECT IDLETIME`
/// rather than resetting it to zero on the target.
pub fn restore_replace_idletime(key: &[u8], ttl_ms: u64, payload: &[u8], idle_seconds: u64) -> Bytes {
    encode_bytes(&[
        b"RESTORE",
        key,
        ttl_ms.to_string().as_bytes(),
        payload,
        b"REPLACE",
        b"IDLETIME",
        idle_seconds.to_string().as_bytes(),
    ])
}

pub fn scan(cursor: u64, pattern: Option<&str>, count: usize) -> Bytes {
    let mut args: Vec<Vec<u8>> = vec![b"SCAN".to_vec(), cursor.to_string().into_bytes()];
    if let Some(p) = pattern {
        args.push(b"MATCH".to_vec());
        args.push(p.as_bytes().to_vec());
    }
    args.push(b"COUNT".to_vec());
    args.push(count.to_string().into_bytes());
    let refs: Vec<&[u8]> = args.iter().map(|a| a.as_slice()).collect();
    encode_bytes(&refs)
}

pub fn object_idletime(key: &[u8]) -> Bytes {
    encode_bytes(&[b"OBJECT", b"IDLETIME", key])
}

pub fn replconf_listening_port(port: u16) -> Bytes {
    encode(["REPLCONF", "listening-port", &port.to_string()])
}

pub fn replconf_capa_eof() -> Bytes {
    encode(["REPLCONF", "capa", "eof", "capa", "psync2"])
}

pub fn replconf_ack(offset: u64) -> Bytes {
    encode(["REPLCONF", "ACK", &offset.to_string()])
}

pub fn psync(replid: &str, offset: i64) -> Bytes {
    encode(["PSYNC", replid, &offset.to_string()])
}

pub fn sync() -> Bytes {
    encode(["SYNC"])
}

fn encode_bytes(args: &[&[u8]]) -> Bytes {
    encode(args.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_ping() {
        assert_eq!(&ping()[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn encodes_psync() {
        let out = psync("?", -1);
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("PSYNC"));
        assert!(text.contains("?"));
        assert!(text.contains("-1"));
    }

    #[test]
    fn encodes_restore_with_replace() {
        let out = restore_replace(b"key", 0, b"\x00\x05hello");
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("RESTORE"));
        assert!(text.contains("REPLACE"));
    }
}
