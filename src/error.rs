// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error taxonomy for the replication engine.
//!
//! Leaf failures that a caller might want to match on get a `thiserror`
//! variant here. Everything built on top of them propagates through
//! `anyhow::Result`, the same mix the rest of the crate uses throughout.

use thiserror::Error;

/// One entry per error taxonomy bucket.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Surfaces to the supervisor; triggers backoff + reconnect, never fatal
    /// on its own.
    #[error("transport error on {endpoint}: {detail}")]
    Transport { endpoint: String, detail: String },

    /// Fatal for the affected endpoint only.
    #[error("authentication failed on {endpoint}: {detail}")]
    Auth { endpoint: String, detail: String },

    /// A reply the connection itself is healthy enough to have produced, but
    /// that the command didn't expect (a RESP `-ERR`, an unrecognized PSYNC
    /// handshake line, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Per-key codec failure; recorded against the target/key, never aborts
    /// dispatch.
    #[error("codec error on key {key:?} ({kind}): {detail}")]
    Codec { key: String, kind: &'static str, detail: String },

    /// The session this operation needed is currently `Broken` (§4.1).
    #[error("endpoint {0} unavailable")]
    Unavailable(String),
}

impl EngineError {
    /// Whether this error class is ever appropriate to retry without
    /// operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transport { .. } | EngineError::Unavailable(_))
    }

    /// Whether this is the DUMP/RESTORE serialization-version-or-checksum
    /// mismatch that should fall back to the kind-specific codec path
    /// (§4.3) rather than being treated as an ordinary codec failure.
    pub fn is_dump_version_mismatch(&self) -> bool {
        matches!(self, EngineError::Codec { kind: "dump_version_mismatch", .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transience() {
        assert!(EngineError::Transport { endpoint: "x".into(), detail: "y".into() }
            .is_transient());
        assert!(!EngineError::Protocol("bad".into()).is_transient());
        assert!(!EngineError::Auth { endpoint: "x".into(), detail: "y".into() }
            .is_transient());
    }

    #[test]
    fn recognizes_dump_version_mismatch() {
        let e = EngineError::Codec {
            key: "k".into(),
            kind: "dump_version_mismatch",
            detail: "bad data format".into(),
        };
        assert!(e.is_dump_version_mismatch());
        assert!(!EngineError::Codec { key: "k".into(), kind: "write", detail: "x".into() }
            .is_dump_version_mismatch());
    }
}
