//! Runtime values.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::coercion;

/// Shared, mutable list storage. Lists have reference semantics.
pub type ListRef = Arc<RwLock<Vec<Value>>>;

/// Shared, mutable insertion-ordered map storage. Maps have reference semantics.
pub type MapRef = Arc<RwLock<IndexMap<String, Value>>>;

/// A function value that the interpreter knows how to invoke.
///
/// The foundation crate does not know about the AST, so script functions are
/// stored behind this trait and recovered with [`Callable::as_any`].
pub trait Callable: Send + Sync + fmt::Debug {
    /// Declared name, if any (arrow functions are anonymous).
    fn name(&self) -> Option<&str>;

    /// Number of declared parameters.
    fn arity(&self) -> usize;

    /// Downcast hook for the executing engine.
    fn as_any(&self) -> &dyn Any;
}

/// Runtime value for script evaluation.
///
/// Numbers carry two representations: `Int` for integral values and `Number`
/// for everything else. Arithmetic collapses integral results back to `Int`
/// (see [`Value::number`]) so `1 + 2` renders as `3`, not `3.0`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The `undefined` primitive.
    #[default]
    Undefined,
    /// The `null` primitive.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integral number.
    Int(i64),
    /// A non-integral (or out of integer range) number.
    Number(f64),
    /// An immutable string.
    Str(Arc<str>),
    /// A list (array).
    List(ListRef),
    /// A string-keyed map (object literal).
    Map(MapRef),
    /// A first-class function.
    Function(Arc<dyn Callable>),
    /// An unresolved reference into the host namespace, e.g. `tp.file`.
    ///
    /// Produced when the root of a member chain is not bound in the script
    /// environment; calls through it are routed to the host function resolver
    /// by dotted path.
    HostRef(Arc<str>),
}

/// Largest integer magnitude that an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Value {
    /// Build a numeric value, collapsing integral results to [`Value::Int`].
    pub fn number(n: f64) -> Self {
        if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
            Value::Int(n as i64)
        } else {
            Value::Number(n)
        }
    }

    /// Build a string value.
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Build a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    /// Build a map value.
    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Arc::new(RwLock::new(entries)))
    }

    /// Build a host reference for a dotted path.
    pub fn host_ref(path: impl Into<Arc<str>>) -> Self {
        Value::HostRef(path.into())
    }

    /// `true` for `undefined` and `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// `true` for either numeric representation.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Number(_))
    }

    /// Borrow the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer payload, if this is an integral number.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value of the `typeof` operator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined | Value::HostRef(_) => "undefined",
            Value::Null | Value::List(_) | Value::Map(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// Identity comparison: primitives by value, containers and functions by
    /// reference. `NaN` is identical to itself here.
    ///
    /// This is the "same observed value" test used by the VM variable cache,
    /// not script-level equality.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Value::HostRef(a), Value::HostRef(b)) => a == b,
            _ => false,
        }
    }

    /// Snapshot of a list's items. Empty for non-lists.
    pub fn list_items(&self) -> Vec<Value> {
        match self {
            Value::List(items) => items.read().clone(),
            _ => Vec::new(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&coercion::to_display_string(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_collapse_to_int() {
        assert!(matches!(Value::number(3.0), Value::Int(3)));
        assert!(matches!(Value::number(-0.0), Value::Int(0)));
        assert!(matches!(Value::number(2.5), Value::Number(_)));
        assert!(matches!(Value::number(f64::NAN), Value::Number(_)));
        assert!(matches!(Value::number(1e300), Value::Number(_)));
    }

    #[test]
    fn identity_uses_reference_for_lists() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert!(a.is_identical(&a.clone()));
        assert!(!a.is_identical(&b));
        assert!(Value::Number(f64::NAN).is_identical(&Value::Number(f64::NAN)));
        assert!(!Value::Int(1).is_identical(&Value::Number(1.5)));
    }

    #[test]
    fn typeof_names() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::Null.type_name(), "object");
        assert_eq!(Value::Int(1).type_name(), "number");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::list(vec![]).type_name(), "object");
    }
}
