// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Stencil Bytecode VM
//!
//! Compiles single expressions to flat bytecode and runs them on a small
//! stack machine. Used for interpolation blocks, where the same expression is
//! evaluated over and over; anything outside the compiled subset is rejected
//! with [`CompileError`] and left to the interpreter.
//!
//! # Example
//!
//! ```
//! use stencil_vm::{ExprCache, OpCode};
//!
//! let cache = ExprCache::default();
//! let expr = cache.get_or_compile("2 * 21").unwrap();
//! assert_eq!(expr.opcodes.last(), Some(&OpCode::MulInt));
//! ```

pub mod bytecode;
pub mod cache;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod token;

pub use bytecode::{CompiledExpr, OpCode};
pub use cache::{CacheStats, ExprCache};
pub use compiler::Compiler;
pub use error::{CompileError, VmError};
pub use executor::{STACK_SIZE, Vm, VmContext};
