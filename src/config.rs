//! Run configuration.

use crate::error::{ReduceError, Result};
use crate::partition::DEFAULT_BLOCK_WIDTH;

/// Number of elements summed by a default run.
pub const DEFAULT_LEN: usize = 1 << 24;

/// Seed for the input generator.
pub const DEFAULT_SEED: u64 = 0x5eed;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Input array length.
    pub len: usize,
    /// Units per block, shared by both variants.
    pub block_width: u32,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            len: DEFAULT_LEN,
            block_width: DEFAULT_BLOCK_WIDTH,
            seed: DEFAULT_SEED,
        }
    }
}

impl RunConfig {
    pub fn with_block_width(mut self, block_width: u32) -> Self {
        self.block_width = block_width;
        self
    }

    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.len == 0 {
            return Err(ReduceError::InvalidConfig("array length must be at least 1".into()));
        }
        if self.block_width == 0 {
            return Err(ReduceError::InvalidConfig("block width must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_benchmark() {
        let config = RunConfig::default();
        assert_eq!(config.len, 1 << 24);
        assert_eq!(config.block_width, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_width_is_rejected() {
        let config = RunConfig::default().with_block_width(0);
        assert!(matches!(config.validate(), Err(ReduceError::InvalidConfig(_))));
    }

    #[test]
    fn empty_array_is_rejected() {
        let config = RunConfig::default().with_len(0);
        assert!(config.validate().is_err());
    }
}
