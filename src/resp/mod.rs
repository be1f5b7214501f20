// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The RESP2 wire codec spoken to both the source and every target
//! An incremental frame reader over a
//! bounded buffer (never a whole-command readahead, per the "PSYNC parser"
//! design note), a frame encoder, and command-builder helpers.

pub mod codec;
pub mod command;
pub mod frame;

pub use codec::RespReader;
pub use frame::RespFrame;
