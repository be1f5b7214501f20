// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Key Filter (§4.2): a pure predicate over key name, TTL, and
//! serialized size, derived from configuration. Exclude always wins over
//! include; an empty include set means "accept all not excluded".

use wildmatch::WildMatch;

use crate::cfg::config::FilterConfig;

/// Cheap probe used to decide whether a key should be replicated, without
/// requiring the full payload to already be in hand.
#[derive(Debug, Clone, Copy)]
pub struct KeyProbe<'a> {
    pub key: &'a [u8],
    /// Remaining TTL in milliseconds; `0` means no expiry.
    pub remaining_ttl_ms: i64,
    pub estimated_size: usize,
}

/// A compiled, pure predicate. Construction compiles the glob patterns
/// once; `accepts` never allocates.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    include: Vec<WildMatch>,
    exclude: Vec<WildMatch>,
    min_ttl_ms: i64,
    max_value_bytes: usize,
}

impl KeyFilter {
    pub fn from_config(cfg: &FilterConfig) -> Self {
        Self {
            include: cfg.include_patterns.iter().map(|p| WildMatch::new(p)).collect(),
            exclude: cfg.exclude_patterns.iter().map(|p| WildMatch::new(p)).collect(),
            min_ttl_ms: (cfg.min_ttl as i64) * 1000,
            max_value_bytes: cfg.max_key_size as usize,
        }
    }

    pub fn accepts(&self, probe: &KeyProbe<'_>) -> bool {
        let Ok(key_str) = std::str::from_utf8(probe.key) else {
            // Non-UTF8 keys can't be glob-matched; only accept them when
            // no include patterns are configured (include="" means "all").
            return self.include.is_empty() && self.within_limits(probe);
        };

        if self.exclude.iter().any(|p| p.matches(key_str)) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(key_str)) {
            return false;
        }
        self.within_limits(probe)
    }

    fn within_limits(&self, probe: &KeyProbe<'_>) -> bool {
        if self.min_ttl_ms > 0 && probe.remaining_ttl_ms >= 0 && probe.remaining_ttl_ms < self.min_ttl_ms {
            return false;
        }
        if self.max_value_bytes > 0 && probe.estimated_size > self.max_value_bytes {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(include: &[&str], exclude: &[&str], min_ttl: u64, max_key_size: u64) -> FilterConfig {
        FilterConfig {
            include_patterns: include.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: exclude.iter().map(|s| s.to_string()).collect(),
            min_ttl,
            max_key_size,
        }
    }

    fn probe(key: &str) -> KeyProbe<'_> {
        KeyProbe { key: key.as_bytes(), remaining_ttl_ms: 0, estimated_size: 10 }
    }

    #[test]
    fn empty_include_accepts_everything_not_excluded() {
        let f = KeyFilter::from_config(&cfg(&[], &["user:temp:*"], 0, 0));
        assert!(f.accepts(&probe("user:1")));
        assert!(f.accepts(&probe("other:1")));
        assert!(!f.accepts(&probe("user:temp:1")));
    }

    #[test]
    fn exclude_wins_over_include() {
        let f = KeyFilter::from_config(&cfg(&["user:*"], &["user:temp:*"], 0, 0));
        assert!(f.accepts(&probe("user:1")));
        assert!(!f.accepts(&probe("user:temp:1")));
        assert!(!f.accepts(&probe("other:1")));
    }

    #[test]
    fn min_ttl_floor_rejects_short_lived_keys() {
        let f = KeyFilter::from_config(&cfg(&[], &[], 60, 0));
        let mut p = probe("k");
        p.remaining_ttl_ms = 1_000;
        assert!(!f.accepts(&p));
        p.remaining_ttl_ms = 120_000;
        assert!(f.accepts(&p));
    }

    #[test]
    fn negative_ttl_is_not_subject_to_the_floor() {
        // -1 (persistent) and -2 (missing) are not "short lived"; only a
        // non-negative remaining TTL below the floor is rejected.
        let f = KeyFilter::from_config(&cfg(&[], &[], 60, 0));
        let mut p = probe("k");
        p.remaining_ttl_ms = -1;
        assert!(f.accepts(&p));
    }

    #[test]
    fn max_value_bytes_ceiling_rejects_oversized_values() {
        let f = KeyFilter::from_config(&cfg(&[], &[], 0, 100));
        let mut p = probe("k");
        p.estimated_size = 50;
        assert!(f.accepts(&p));
        p.estimated_size = 500;
        assert!(!f.accepts(&p));
    }
}
