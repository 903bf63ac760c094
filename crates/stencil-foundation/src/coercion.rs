//! Type Coercion Rules
//!
//! JavaScript-like conversions shared by the AST interpreter and the bytecode
//! VM. Both engines route every conversion through this module so a pure
//! expression evaluates identically on either path.
//!
//! # Equality
//!
//! - Strict (`===`): values must belong to the same [`Category`]. `Int` and
//!   `Number` are one category, so `1 === 1.0` holds.
//! - Loose (`==`): `null == undefined`; numeric strings and booleans are
//!   converted to numbers before comparing; containers compare by reference
//!   against each other and by their string form against primitives.

use std::sync::Arc;

use crate::value::Value;

/// Representation category used by strict equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// `undefined` (including unresolved host references).
    Undefined,
    /// `null`.
    Null,
    /// Booleans.
    Bool,
    /// Both numeric representations.
    Number,
    /// Strings.
    String,
    /// Lists, maps.
    Object,
    /// Functions.
    Function,
}

/// Representation category of a value.
pub fn category(value: &Value) -> Category {
    match value {
        Value::Undefined | Value::HostRef(_) => Category::Undefined,
        Value::Null => Category::Null,
        Value::Bool(_) => Category::Bool,
        Value::Int(_) | Value::Number(_) => Category::Number,
        Value::Str(_) => Category::String,
        Value::List(_) | Value::Map(_) => Category::Object,
        Value::Function(_) => Category::Function,
    }
}

/// Truthiness.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null | Value::HostRef(_) => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Number(n) => !n.is_nan() && *n != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::List(_) | Value::Map(_) | Value::Function(_) => true,
    }
}

/// Numeric conversion. Non-numeric strings and objects yield `NaN`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined | Value::HostRef(_) | Value::Function(_) | Value::Map(_) => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Int(i) => *i as f64,
        Value::Number(n) => *n,
        Value::Str(s) => string_to_number(s),
        Value::List(items) => {
            let items = items.read();
            match items.as_slice() {
                [] => 0.0,
                [single] => to_number(single),
                _ => f64::NAN,
            }
        }
    }
}

/// Parse a string as a number: surrounding whitespace is ignored and the
/// empty string is zero.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.starts_with("0x") || trimmed.starts_with("0X") => {
            i64::from_str_radix(&trimmed[2..], 16)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN)
        }
        // Rust accepts "inf"/"nan" spellings that scripts must not.
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// 32-bit integer conversion used by bitwise operators.
pub fn to_int32(value: &Value) -> i32 {
    let n = to_number(value);
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 & 0xFFFF_FFFF) as u32 as i32
}

/// Format a number the way scripts print it.
///
/// `NaN`, `Infinity`, `-Infinity`; both zeros print as `0`; integral values
/// print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

/// String conversion used for concatenation and rendering.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Undefined | Value::HostRef(_) => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Number(n) => format_number(*n),
        Value::Str(s) => s.to_string(),
        Value::List(items) => items
            .read()
            .iter()
            .map(|item| match item {
                Value::Undefined | Value::Null => String::new(),
                other => to_display_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Map(_) => "[object Object]".to_string(),
        Value::Function(func) => match func.name() {
            Some(name) => format!("function {name}() {{ [script] }}"),
            None => "function () { [script] }".to_string(),
        },
    }
}

/// Key used for map/list index access (`obj[key]`).
pub fn to_property_key(value: &Value) -> String {
    to_display_string(value)
}

/// Strict equality (`===`).
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        _ if a.is_number() && b.is_number() => to_number(a) == to_number(b),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Arc::ptr_eq(x, y),
        (Value::Function(_), Value::Function(_)) => a.is_identical(b),
        _ => {
            let (ca, cb) = (category(a), category(b));
            ca == cb && matches!(ca, Category::Undefined | Category::Null)
        }
    }
}

/// Loose equality (`==`).
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    let (ca, cb) = (category(a), category(b));
    if ca == cb {
        return strict_equals(a, b);
    }
    match (ca, cb) {
        (Category::Undefined, Category::Null) | (Category::Null, Category::Undefined) => true,
        (Category::Undefined | Category::Null, _) | (_, Category::Undefined | Category::Null) => {
            false
        }
        (Category::Number, Category::String) | (Category::String, Category::Number) => {
            to_number(a) == to_number(b)
        }
        (Category::Bool, _) => loose_equals(&Value::number(to_number(a)), b),
        (_, Category::Bool) => loose_equals(a, &Value::number(to_number(b))),
        (Category::Object | Category::Function, _) => {
            loose_equals(&Value::from(to_display_string(a)), b)
        }
        (_, Category::Object | Category::Function) => {
            loose_equals(a, &Value::from(to_display_string(b)))
        }
        _ => false,
    }
}

/// Relational comparison result: `None` when either side is `NaN`.
pub fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}
