// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Stencil Script
//!
//! Executes the code inside template blocks. Statements run on a
//! tree-walking [`Interpreter`]; interpolation expressions take the bytecode
//! VM fast path through [`ScriptEngine::evaluate_expression`] and fall back
//! to the interpreter when they use syntax the compiler does not cover.
//!
//! All blocks of one template share an [`Environment`], including the `tR`
//! accumulator that collects rendered output.
//!
//! # Example
//!
//! ```
//! use stencil_foundation::CancellationToken;
//! use stencil_script::ScriptEngine;
//!
//! let engine = ScriptEngine::default();
//! let cancel = CancellationToken::new();
//! let out = engine
//!     .execute_block("for (let i = 1; i <= 3; i++) { tR += i; }", &cancel)
//!     .unwrap();
//! assert_eq!(out, "123");
//! ```

mod builtins;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod interpreter;
pub mod template;

pub use config::EngineConfig;
pub use engine::ScriptEngine;
pub use env::Environment;
pub use error::{Result, RuntimeError, ScriptError};
pub use interpreter::{Flow, Interpreter};

#[cfg(test)]
mod tests;
