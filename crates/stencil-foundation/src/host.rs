//! Host call boundary.
//!
//! Scripts reach the outside world only through [`HostBindings`]. The engine
//! resolves builtins for lists, maps and strings first and asks the host for
//! everything else. Returning `None` from a hook means "not mine", which the
//! engine turns into `undefined` (for properties) or a runtime error (for
//! calls).

use crate::cancel::CancellationToken;
use crate::value::Value;

/// Result of a host function or method call.
#[derive(Debug, Clone)]
pub enum HostOutcome {
    /// The call produced a value.
    Value(Value),
    /// The call succeeded without a value (`undefined` to the script).
    Empty,
    /// The call observed cancellation (e.g. a dismissed prompt).
    Cancelled,
    /// The call failed. Host errors are not catchable by script `try/catch`.
    Error(String),
}

impl From<Value> for HostOutcome {
    fn from(value: Value) -> Self {
        HostOutcome::Value(value)
    }
}

/// Callback hooks into the host function library.
///
/// Implementations must be shareable across the blocks of a concurrent
/// phase. Blocking work (interactive prompts, I/O) is allowed; long calls
/// should poll `cancel`.
pub trait HostBindings: Send + Sync {
    /// Call a function by dotted name, e.g. `tp.date.now` or `greet`.
    fn call_function(
        &self,
        name: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> Option<HostOutcome> {
        let _ = (name, args, cancel);
        None
    }

    /// Call `method` on a receiver the engine has no builtin for.
    fn call_method(
        &self,
        receiver: &Value,
        method: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> Option<HostOutcome> {
        let _ = (receiver, method, args, cancel);
        None
    }

    /// Read `property` from a receiver the engine has no builtin for.
    ///
    /// For host references the receiver is a [`Value::HostRef`] carrying the
    /// dotted path so far; returning `None` extends the path instead.
    fn get_property(&self, receiver: &Value, property: &str) -> Option<Value> {
        let _ = (receiver, property);
        None
    }
}

/// Host with no functions at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHost;

impl HostBindings for NoHost {}
