//! Executor configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("block_timeout must be greater than zero")]
    ZeroTimeout,
}

/// Tunables for [`ParallelExecutor`](crate::ParallelExecutor).
///
/// ```
/// use std::time::Duration;
/// use stencil_schedule::ExecutorConfig;
///
/// let config = ExecutorConfig::default()
///     .with_max_concurrency(4)
///     .with_block_timeout(Duration::from_secs(5))
///     .with_fail_fast(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Blocks of one parallel phase running at the same time.
    pub max_concurrency: usize,
    /// Per-block limit. `None` waits indefinitely.
    pub block_timeout: Option<Duration>,
    /// Skip every later phase once a block fails or times out.
    pub fail_fast: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            block_timeout: None,
            fail_fast: false,
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = Some(timeout);
        self
    }

    pub fn with_fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.block_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
