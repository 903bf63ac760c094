//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables for [`ScriptEngine`](crate::ScriptEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Iterations after which a `for`, `for-of` or `while` loop silently stops.
    pub max_loop_iterations: usize,
    /// Nested script function calls allowed before a `RangeError`.
    pub max_call_depth: usize,
    /// Native stack a block may consume through nested script calls before a
    /// `RangeError`. Must stay well below the smallest stack blocks run on
    /// (2 MiB for tokio's blocking pool and test threads).
    pub max_stack_bytes: usize,
    /// Distinct expressions kept in the bytecode compile cache.
    pub expr_cache_capacity: usize,
    /// Evaluate interpolation expressions on the bytecode VM when they compile.
    pub use_bytecode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 100_000,
            max_call_depth: 200,
            max_stack_bytes: 1024 * 1024,
            expr_cache_capacity: stencil_vm::cache::DEFAULT_CAPACITY,
            use_bytecode: true,
        }
    }
}

impl EngineConfig {
    pub fn with_max_loop_iterations(mut self, max: usize) -> Self {
        self.max_loop_iterations = max;
        self
    }

    pub fn with_bytecode(mut self, enabled: bool) -> Self {
        self.use_bytecode = enabled;
        self
    }
}
