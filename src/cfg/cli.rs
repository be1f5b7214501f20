// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolves a (possibly relative) config path against the current working
/// directory and canonicalizes it, so the rest of the process never has to
/// think about relative paths again.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

/// Resolves the config path the binary should load: `REDIS_FANOUT_CONFIG`
/// if set, otherwise the given default.
pub fn resolve_default(default_rel: &str) -> Result<PathBuf> {
    match std::env::var("REDIS_FANOUT_CONFIG") {
        Ok(p) => resolve_config_path(&p),
        Err(_) => resolve_config_path(default_rel),
    }
}
