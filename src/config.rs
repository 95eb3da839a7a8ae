//! Probe configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::page::HEADER_SIZE;

/// Default probe budget.  Beginning-of-stream pages are small enough to fit.
pub const DEFAULT_PROBE_BUDGET: usize = 4096;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Bytes read from the source to find the first page.
    pub probe_budget: usize,

    /// Reuse a sniffed header prefix instead of seeking back to the start.
    pub reuse_sniffed_prefix: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe_budget:         DEFAULT_PROBE_BUDGET,
            reuse_sniffed_prefix: true,
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the probe budget.  Values below one page header are raised to it.
    #[must_use]
    pub fn probe_budget(mut self, bytes: usize) -> Self {
        self.probe_budget = bytes.max(HEADER_SIZE);
        self
    }

    #[must_use]
    pub const fn reuse_sniffed_prefix(mut self, value: bool) -> Self {
        self.reuse_sniffed_prefix = value;
        self
    }

    /// Budget actually used, after clamping.
    pub fn effective_budget(&self) -> usize {
        self.probe_budget.max(HEADER_SIZE)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ProbeConfig::default();
        assert_eq!(c.probe_budget, 4096);
        assert!(c.reuse_sniffed_prefix);
    }

    #[test]
    fn budget_is_clamped() {
        assert_eq!(ProbeConfig::new().probe_budget(3).probe_budget, HEADER_SIZE);
        let raw = ProbeConfig { probe_budget: 0, ..ProbeConfig::default() };
        assert_eq!(raw.effective_budget(), HEADER_SIZE);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let c = ProbeConfig::from_json(br#"{ "probe_budget": 8192 }"#).unwrap();
        assert_eq!(c.probe_budget, 8192);
        assert!(c.reuse_sniffed_prefix);
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(ProbeConfig::from_json(b"{ nope"), Err(ConfigError::Parse(_))));
    }
}
