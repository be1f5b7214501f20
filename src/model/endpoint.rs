// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use crate::cfg::config::EndpointConfig;

/// Identity + connection parameters for one Redis instance.
///
/// The source has no stable name; targets do. `name` is `None` for the
/// source and `Some(target_name)` for every target, which is what the
/// supervisor and the status surface key their state on.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub keepalive: bool,
}

impl Endpoint {
    pub fn source(cfg: &EndpointConfig) -> Self {
        Self::from_config(None, cfg)
    }

    pub fn target(name: impl Into<String>, cfg: &EndpointConfig) -> Self {
        Self::from_config(Some(name.into()), cfg)
    }

    fn from_config(name: Option<String>, cfg: &EndpointConfig) -> Self {
        Self {
            name,
            host: cfg.host.clone(),
            port: cfg.port,
            db: cfg.db,
            password: cfg.password.clone(),
            connect_timeout: cfg.connect_timeout(),
            read_timeout: cfg.read_timeout(),
            keepalive: cfg.socket_keepalive,
        }
    }

    /// Stable label used in logs and the status surface: the target name, or
    /// `"source"` when this endpoint has none.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("source")
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EndpointConfig {
        EndpointConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
            socket_timeout: None,
            socket_connect_timeout: None,
            socket_keepalive: true,
        }
    }

    #[test]
    fn source_has_no_name() {
        let ep = Endpoint::source(&cfg());
        assert_eq!(ep.label(), "source");
        assert_eq!(ep.address(), "127.0.0.1:6379");
    }

    #[test]
    fn target_carries_its_name() {
        let ep = Endpoint::target("eu-west", &cfg());
        assert_eq!(ep.label(), "eu-west");
    }
}
