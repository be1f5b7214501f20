// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

/// One RESP2 value, as received from or sent to a Redis endpoint.
///
/// RESP3 push types and `CONTINUE`/`FULLRESYNC` inline lines are not part of
/// this enum: the PSYNC handshake is handled by
/// [`crate::incremental::psync_driver`] directly on the raw line reader,
/// since those replies precede the point where the stream becomes ordinary
/// RESP.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    Simple(Bytes),
    Error(Bytes),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<RespFrame>>),
}

impl RespFrame {
    pub fn simple(s: impl Into<Bytes>) -> Self {
        RespFrame::Simple(s.into())
    }

    pub fn bulk(b: impl Into<Bytes>) -> Self {
        RespFrame::Bulk(Some(b.into()))
    }

    pub fn null_bulk() -> Self {
        RespFrame::Bulk(None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespFrame::Error(_))
    }

    /// Views this frame as a bulk/simple string, if it is one. `nil` yields
    /// `None`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespFrame::Simple(b) => Some(b),
            RespFrame::Bulk(Some(b)) => Some(b),
            RespFrame::Bulk(None) => None,
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespFrame]> {
        match self {
            RespFrame::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespFrame::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RespFrame::Error(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}
