// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Overall replication mode: full-sync only, incremental only (source
/// already converged), or hybrid (full-sync first, then incremental).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
    Hybrid,
}

/// Strategy used by the Full-Sync Engine (§4.5).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FullSyncStrategy {
    Scan,
    Sync,
    DumpRestore,
}

impl fmt::Display for FullSyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FullSyncStrategy::Scan => "scan",
            FullSyncStrategy::Sync => "sync",
            FullSyncStrategy::DumpRestore => "dump_restore",
        })
    }
}

/// Driver used by the Incremental Engine (§4.6).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncrementalDriver {
    Scan,
    Sync,
    Psync,
}

impl fmt::Display for IncrementalDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IncrementalDriver::Scan => "scan",
            IncrementalDriver::Sync => "sync",
            IncrementalDriver::Psync => "psync",
        })
    }
}

/// The six Redis data kinds the codec knows how to migrate, per §3/§4.3.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    String,
    Hash,
    List,
    Set,
    SortedSet,
    Stream,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataKind::String => "string",
            DataKind::Hash => "hash",
            DataKind::List => "list",
            DataKind::Set => "set",
            DataKind::SortedSet => "zset",
            DataKind::Stream => "stream",
        })
    }
}

impl DataKind {
    /// Parses the `TYPE` reply from a Redis server.
    pub fn from_type_reply(s: &str) -> Option<Self> {
        Some(match s {
            "string" => DataKind::String,
            "hash" => DataKind::Hash,
            "list" => DataKind::List,
            "set" => DataKind::Set,
            "zset" => DataKind::SortedSet,
            "stream" => DataKind::Stream,
            _ => return None,
        })
    }
}
