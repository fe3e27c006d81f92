//! Device configuration.

use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

/// Lanes available per context.
pub const MAX_BLOCK_SIZE: u8 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpuConfig {
    pub core_count: usize,
    /// threads per block, i.e. lanes per context
    pub threads_per_block: u8,
    pub data_channels: usize,
    pub program_channels: usize,
    /// data memory serves requests every `data_interval` cycles
    pub data_interval: u64,
    pub program_interval: u64,
    pub max_cycles: u64,
    /// record the stages of every core on every cycle
    pub trace_stages: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            core_count: 2,
            threads_per_block: 4,
            data_channels: 4,
            program_channels: 1,
            data_interval: 1,
            program_interval: 1,
            max_cycles: 100_000,
            trace_stages: false,
        }
    }
}

impl GpuConfig {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(s).context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config `{}`", path.display()))?;
        Self::from_json(&content).with_context(|| format!("in `{}`", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.core_count > 0, "core_count must be positive");
        ensure!(
            (1..=MAX_BLOCK_SIZE).contains(&self.threads_per_block),
            "threads_per_block must be within 1..={}",
            MAX_BLOCK_SIZE
        );
        ensure!(
            self.data_channels > 0 && self.program_channels > 0,
            "memories need at least one channel"
        );
        ensure!(
            self.data_interval > 0 && self.program_interval > 0,
            "memory service intervals must be positive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json() -> anyhow::Result<()> {
        let config = GpuConfig::from_json(r#"{ "core_count": 3, "data_interval": 8 }"#)?;
        assert_eq!(config.core_count, 3);
        assert_eq!(config.data_interval, 8);
        assert_eq!(config.threads_per_block, 4);
        Ok(())
    }

    #[test]
    fn test_rejects() {
        assert!(GpuConfig::from_json(r#"{ "cores": 3 }"#).is_err());
        assert!(GpuConfig::from_json(r#"{ "core_count": 0 }"#).is_err());
        assert!(GpuConfig::from_json(r#"{ "threads_per_block": 17 }"#).is_err());
    }
}
