// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::AsyncReadExt;

use crate::resp::frame::RespFrame;

/// Chunk size used for each individual socket read. Keeping this small (and
/// yielding back to the caller after every chunk) is what keeps one
/// oversized reply from delaying a `REPLCONF ACK` heartbeat.
const READ_CHUNK: usize = 16 * 1024;

/// Upper bound on how much unparsed data we will buffer before giving up —
/// protects against a misbehaving peer sending a header that claims an
/// absurd length.
const MAX_BUFFERED: usize = 512 * 1024 * 1024;

/// An incremental RESP2 reader over a bounded buffer.
///
/// Unlike a whole-command readahead, [`RespReader::read_frame`] attempts a
/// parse after every chunk arrives rather than waiting for the full frame
/// to already be in memory, so callers that also need to do other work
/// (send a heartbeat, check a cancellation token) between chunks can
/// interleave that work via `tokio::select!` around each `.fill_more()`
/// call instead of being blocked inside one opaque read.
pub struct RespReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: tokio::io::AsyncRead + Unpin> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buf: BytesMut::with_capacity(READ_CHUNK) }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads one more chunk from the socket into the internal buffer.
    /// Returns `false` on clean EOF.
    pub async fn fill_more(&mut self) -> Result<bool> {
        if self.buf.len() >= MAX_BUFFERED {
            bail!("RESP buffer exceeded {MAX_BUFFERED} bytes without a complete frame");
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.inner.read(&mut chunk).await.context("read from peer")?;
        if n == 0 {
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    /// Reads exactly one RESP frame, pulling more data as needed.
    pub async fn read_frame(&mut self) -> Result<RespFrame> {
        loop {
            if let Some((frame, consumed)) = try_parse(&self.buf)? {
                self.buf.advance(consumed);
                return Ok(frame);
            }
            if !self.fill_more().await? {
                bail!("connection closed mid-frame");
            }
        }
    }

    /// As [`Self::read_frame`], but also returns the number of bytes the
    /// frame occupied on the wire. Used by the PSYNC driver to advance its
    /// replication offset by exactly the bytes it consumed (§4.6 "offset
    /// discipline").
    pub async fn read_frame_counted(&mut self) -> Result<(RespFrame, usize)> {
        loop {
            if let Some((frame, consumed)) = try_parse(&self.buf)? {
                self.buf.advance(consumed);
                return Ok((frame, consumed));
            }
            if !self.fill_more().await? {
                bail!("connection closed mid-frame");
            }
        }
    }

    /// Reads one RESP frame or returns `Ok(None)` if `deadline` elapses
    /// first. Used to bound every outbound command's matching reply.
    pub async fn read_frame_deadline(
        &mut self,
        deadline: Duration,
    ) -> Result<RespFrame> {
        tokio::time::timeout(deadline, self.read_frame())
            .await
            .map_err(|_| anyhow!("timed out waiting for reply"))?
    }

    /// Reads a single CRLF-terminated inline line, used for the PSYNC
    /// handshake replies (`+FULLRESYNC <id> <off>`, `+CONTINUE`) which are
    /// RESP simple strings but are easier to reason about as raw lines
    /// while the driver is still deciding whether an RDB bulk follows.
    pub async fn read_line(&mut self) -> Result<Bytes> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.split_to(pos).freeze();
                self.buf.advance(2); // skip CRLF
                return Ok(line);
            }
            if !self.fill_more().await? {
                bail!("connection closed mid-line");
            }
        }
    }

    /// Reads exactly `n` bytes, streaming them out of the socket without
    /// requiring the whole payload to be buffered first. Used for the RDB
    /// bulk that follows a `FULLRESYNC` reply.
    pub async fn read_exact_streamed(&mut self, n: usize) -> Result<Bytes> {
        while self.buf.len() < n {
            if !self.fill_more().await? {
                bail!("connection closed mid-payload (wanted {n} bytes)");
            }
        }
        Ok(self.buf.split_to(n).freeze())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Attempts to parse one complete RESP2 frame out of `buf` without
/// consuming it. Returns `Ok(None)` when more bytes are needed.
pub fn try_parse(buf: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    match buf[0] {
        b'+' => parse_line(buf, 1).map(|o| o.map(|(b, n)| (RespFrame::Simple(b), n))),
        b'-' => parse_line(buf, 1).map(|o| o.map(|(b, n)| (RespFrame::Error(b), n))),
        b':' => parse_line(buf, 1).map(|o| {
            o.and_then(|(b, n)| {
                std::str::from_utf8(&b).ok()?.trim().parse::<i64>().ok().map(|v| (RespFrame::Integer(v), n))
            })
        }),
        b'$' => parse_bulk(buf),
        b'*' => parse_array(buf),
        other => bail!("unexpected RESP type byte: {other:#x}"),
    }
}

fn parse_line(buf: &[u8], skip: usize) -> Result<Option<(Bytes, usize)>> {
    let Some(rel) = find_crlf(&buf[skip..]) else { return Ok(None) };
    let end = skip + rel;
    let body = Bytes::copy_from_slice(&buf[skip..end]);
    Ok(Some((body, end + 2)))
}

fn parse_bulk(buf: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    let Some((len_line, header_len)) = parse_line(buf, 1)? else { return Ok(None) };
    let len: i64 = std::str::from_utf8(&len_line)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| anyhow!("invalid bulk length"))?;
    if len < 0 {
        return Ok(Some((RespFrame::Bulk(None), header_len)));
    }
    let len = len as usize;
    let total = header_len + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    let data = Bytes::copy_from_slice(&buf[header_len..header_len + len]);
    Ok(Some((RespFrame::Bulk(Some(data)), total)))
}

fn parse_array(buf: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    let Some((len_line, mut offset)) = parse_line(buf, 1)? else { return Ok(None) };
    let count: i64 = std::str::from_utf8(&len_line)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| anyhow!("invalid array length"))?;
    if count < 0 {
        return Ok(Some((RespFrame::Array(None), offset)));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let Some((item, consumed)) = try_parse(&buf[offset..])? else { return Ok(None) };
        offset += consumed;
        items.push(item);
    }
    Ok(Some((RespFrame::Array(Some(items)), offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_string() {
        let (f, n) = try_parse(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(f, RespFrame::Simple(Bytes::from_static(b"OK")));
        assert_eq!(n, 5);
    }

    #[test]
    fn parses_error() {
        let (f, _) = try_parse(b"-ERR boom\r\n").unwrap().unwrap();
        assert_eq!(f.error_message(), Some("ERR boom"));
    }

    #[test]
    fn parses_bulk_string() {
        let (f, n) = try_parse(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(f.as_bytes(), Some(&b"hello"[..]));
        assert_eq!(n, 11);
    }

    #[test]
    fn parses_null_bulk() {
        let (f, _) = try_parse(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(f, RespFrame::Bulk(None));
    }

    #[test]
    fn parses_nested_array() {
        let raw = b"*2\r\n$3\r\nfoo\r\n*1\r\n:42\r\n";
        let (f, n) = try_parse(raw).unwrap().unwrap();
        let arr = f.as_array().unwrap();
        assert_eq!(arr[0].as_bytes(), Some(&b"foo"[..]));
        assert_eq!(arr[1].as_array().unwrap()[0].as_integer(), Some(42));
        assert_eq!(n, raw.len());
    }

    #[test]
    fn incomplete_frame_returns_none() {
        assert!(try_parse(b"$5\r\nhel").unwrap().is_none());
        assert!(try_parse(b"*2\r\n$1\r\na\r\n").unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_assembles_frame_across_multiple_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut reader = RespReader::new(client);

        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            server.write_all(b"$5\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            server.write_all(b"hello\r\n").await.unwrap();
        });

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.as_bytes(), Some(&b"hello"[..]));
    }
}
