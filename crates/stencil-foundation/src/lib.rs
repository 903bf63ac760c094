//! Stencil Foundation
//!
//! Core types shared by every Stencil crate: the runtime [`Value`], the
//! JavaScript-like coercion and operator rules used identically by the AST
//! interpreter and the bytecode VM, source locations, the host-call boundary,
//! the host function metadata registry, and the [`CancellationToken`].

pub mod cancel;
pub mod coercion;
pub mod host;
pub mod location;
pub mod operators;
pub mod registry;
pub mod value;

pub use cancel::CancellationToken;
pub use host::{HostBindings, HostOutcome, NoHost};
pub use location::{LineIndex, SourceLocation};
pub use operators::{AssignOp, BinaryOp, LogicalOp, UnaryOp, UpdateOp};
pub use registry::{FunctionFlags, FunctionRegistry, StaticRegistry};
pub use value::{Callable, ListRef, MapRef, Value};

/// Name of the implicit result accumulator variable.
///
/// Execution blocks append to (or replace) this variable to build their
/// rendered output.
pub const RESULT_ACCUMULATOR: &str = "tR";

/// Root identifier of the host function namespace (`tp.<module>.<function>`).
pub const HOST_NAMESPACE: &str = "tp";
