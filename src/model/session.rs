// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Health state of one connection supervisor session.
///
/// Invariant: a session in `Broken` is never handed out by
/// [`crate::client::supervisor::Supervisor::acquire`]; callers receive a
/// typed [`crate::error::EngineError::Unavailable`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionHealth {
    Healthy,
    Reconnecting,
    Broken,
}

impl SessionHealth {
    pub fn is_usable(self) -> bool {
        matches!(self, SessionHealth::Healthy)
    }
}
