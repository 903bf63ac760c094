//! Script operators and their evaluation.
//!
//! The operator enums are shared by the AST, the bytecode compiler and both
//! engines. Evaluation lives here too, so the interpreter and the VM cannot
//! drift apart on coercion.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::coercion::{
    compare, loose_equals, strict_equals, to_boolean, to_display_string, to_int32, to_number,
};
use crate::value::Value;

/// Binary operators with both operands evaluated eagerly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `a + b` (numeric addition or string concatenation).
    Add,
    /// `a - b`.
    Sub,
    /// `a * b`.
    Mul,
    /// `a / b`.
    Div,
    /// `a % b`.
    Mod,
    /// `a == b`.
    Eq,
    /// `a != b`.
    Ne,
    /// `a === b`.
    StrictEq,
    /// `a !== b`.
    StrictNe,
    /// `a < b`.
    Lt,
    /// `a <= b`.
    Le,
    /// `a > b`.
    Gt,
    /// `a >= b`.
    Ge,
    /// `a & b`.
    BitAnd,
    /// `a | b`.
    BitOr,
    /// `a ^ b`.
    BitXor,
    /// `a << b`.
    Shl,
    /// `a >> b`.
    Shr,
    /// `a >>> b`.
    UShr,
}

impl BinaryOp {
    /// Source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    /// `a && b`.
    And,
    /// `a || b`.
    Or,
}

/// Prefix unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-x`.
    Neg,
    /// `+x`.
    Plus,
    /// `!x`.
    Not,
    /// `~x`.
    BitNot,
    /// `typeof x`.
    Typeof,
}

/// `++` and `--`, prefix or postfix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

impl UpdateOp {
    /// The updated value of `current`.
    pub fn apply(self, current: &Value) -> Value {
        let delta = match self {
            UpdateOp::Increment => 1,
            UpdateOp::Decrement => -1,
        };
        apply_binary(
            BinaryOp::Add,
            &apply_unary(UnaryOp::Plus, current),
            &Value::Int(delta),
        )
    }
}

/// Assignment operators (`=`, `+=`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    /// The binary operator a compound assignment applies, `None` for `=`.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
        }
    }

    /// Source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
        }
    }
}

/// Apply an eager binary operator.
///
/// Never fails: incompatible operands coerce (usually to `NaN` or a string)
/// the way scripts expect.
pub fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if let (Value::Int(a), Value::Int(b)) = (left, right)
        && let Some(result) = apply_int(op, *a, *b)
    {
        return result;
    }

    match op {
        BinaryOp::Add => {
            if is_concatenating(left) || is_concatenating(right) {
                let mut s = to_display_string(left);
                s.push_str(&to_display_string(right));
                Value::from(s)
            } else {
                Value::number(to_number(left) + to_number(right))
            }
        }
        BinaryOp::Sub => Value::number(to_number(left) - to_number(right)),
        BinaryOp::Mul => Value::number(to_number(left) * to_number(right)),
        BinaryOp::Div => Value::number(to_number(left) / to_number(right)),
        BinaryOp::Mod => Value::number(to_number(left) % to_number(right)),
        BinaryOp::Eq => Value::Bool(loose_equals(left, right)),
        BinaryOp::Ne => Value::Bool(!loose_equals(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinaryOp::StrictNe => Value::Bool(!strict_equals(left, right)),
        BinaryOp::Lt => Value::Bool(matches!(compare(left, right), Some(Ordering::Less))),
        BinaryOp::Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(matches!(compare(left, right), Some(Ordering::Greater))),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::BitAnd => Value::Int((to_int32(left) & to_int32(right)) as i64),
        BinaryOp::BitOr => Value::Int((to_int32(left) | to_int32(right)) as i64),
        BinaryOp::BitXor => Value::Int((to_int32(left) ^ to_int32(right)) as i64),
        BinaryOp::Shl => {
            let shift = (to_int32(right) as u32) & 31;
            Value::Int(to_int32(left).wrapping_shl(shift) as i64)
        }
        BinaryOp::Shr => {
            let shift = (to_int32(right) as u32) & 31;
            Value::Int((to_int32(left) >> shift) as i64)
        }
        BinaryOp::UShr => {
            let shift = (to_int32(right) as u32) & 31;
            Value::Int(((to_int32(left) as u32) >> shift) as i64)
        }
    }
}

/// Integer fast path for arithmetic and comparison.
///
/// Returns `None` for operators that have no dedicated integer form; the VM's
/// `*Int` opcodes go through here, and so does [`apply_binary`] whenever both
/// operands are integral, so the two paths agree.
pub fn apply_int(op: BinaryOp, a: i64, b: i64) -> Option<Value> {
    let value = match op {
        BinaryOp::Add => a
            .checked_add(b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::number(a as f64 + b as f64)),
        BinaryOp::Sub => a
            .checked_sub(b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::number(a as f64 - b as f64)),
        BinaryOp::Mul => a
            .checked_mul(b)
            .map(Value::Int)
            .unwrap_or_else(|| Value::number(a as f64 * b as f64)),
        BinaryOp::Div => Value::number(a as f64 / b as f64),
        BinaryOp::Mod => {
            if b == 0 {
                Value::Number(f64::NAN)
            } else {
                Value::Int(a.wrapping_rem(b))
            }
        }
        BinaryOp::Eq | BinaryOp::StrictEq => Value::Bool(a == b),
        BinaryOp::Ne | BinaryOp::StrictNe => Value::Bool(a != b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        _ => return None,
    };
    Some(value)
}

/// Apply a prefix unary operator.
pub fn apply_unary(op: UnaryOp, operand: &Value) -> Value {
    match op {
        UnaryOp::Neg => match operand {
            Value::Int(i) if *i != 0 => i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or_else(|| Value::number(-(*i as f64))),
            other => Value::number(-to_number(other)),
        },
        UnaryOp::Plus => match operand {
            Value::Int(i) => Value::Int(*i),
            other => Value::number(to_number(other)),
        },
        UnaryOp::Not => Value::Bool(!to_boolean(operand)),
        UnaryOp::BitNot => Value::Int(!to_int32(operand) as i64),
        UnaryOp::Typeof => Value::from(operand.type_name()),
    }
}

fn is_concatenating(value: &Value) -> bool {
    matches!(
        value,
        Value::Str(_) | Value::List(_) | Value::Map(_) | Value::Function(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_concatenates_when_either_side_is_a_string() {
        let v = apply_binary(BinaryOp::Add, &Value::from("a"), &Value::Int(1));
        assert_eq!(v.as_str(), Some("a1"));
        let v = apply_binary(BinaryOp::Add, &Value::Int(1), &Value::from("2"));
        assert_eq!(v.as_str(), Some("12"));
    }

    #[test]
    fn integral_results_collapse() {
        let v = apply_binary(BinaryOp::Add, &Value::Number(1.5), &Value::Number(1.5));
        assert!(matches!(v, Value::Int(3)));
        let v = apply_binary(BinaryOp::Div, &Value::Int(7), &Value::Int(2));
        assert!(matches!(v, Value::Number(n) if n == 3.5));
        let v = apply_binary(BinaryOp::Div, &Value::Int(6), &Value::Int(3));
        assert!(matches!(v, Value::Int(2)));
    }

    #[test]
    fn int_overflow_falls_back_to_float() {
        let v = apply_binary(BinaryOp::Mul, &Value::Int(i64::MAX), &Value::Int(2));
        assert!(matches!(v, Value::Number(_)));
    }

    #[test]
    fn modulo_by_zero_is_nan() {
        let v = apply_binary(BinaryOp::Mod, &Value::Int(5), &Value::Int(0));
        assert!(matches!(v, Value::Number(n) if n.is_nan()));
        let v = apply_binary(BinaryOp::Mod, &Value::Int(-7), &Value::Int(3));
        assert!(matches!(v, Value::Int(-1)));
    }

    #[test]
    fn int_fast_path_matches_generic_path() {
        for op in [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Lt, BinaryOp::Ge, BinaryOp::Eq] {
            let fast = apply_int(op, 4, 9).unwrap();
            let generic = apply_binary(op, &Value::Number(4.0), &Value::Number(9.0));
            assert!(fast.is_identical(&generic), "{op}");
        }
        assert!(apply_int(BinaryOp::BitAnd, 1, 1).is_none());
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        let v = apply_binary(BinaryOp::Lt, &Value::from("apple"), &Value::from("banana"));
        assert!(matches!(v, Value::Bool(true)));
        let v = apply_binary(BinaryOp::Lt, &Value::from("10"), &Value::Int(9));
        assert!(matches!(v, Value::Bool(false)));
    }

    #[test]
    fn bitwise_and_shifts() {
        let v = apply_binary(BinaryOp::UShr, &Value::Int(-1), &Value::Int(28));
        assert!(matches!(v, Value::Int(15)));
        let v = apply_binary(BinaryOp::Shl, &Value::Int(1), &Value::Int(4));
        assert!(matches!(v, Value::Int(16)));
        assert!(matches!(apply_unary(UnaryOp::BitNot, &Value::Int(0)), Value::Int(-1)));
    }

    #[test]
    fn update_ops() {
        assert!(matches!(UpdateOp::Increment.apply(&Value::Int(1)), Value::Int(2)));
        assert!(matches!(UpdateOp::Decrement.apply(&Value::from("3")), Value::Int(2)));
        assert!(matches!(UpdateOp::Increment.apply(&Value::Undefined), Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn typeof_and_not() {
        assert_eq!(apply_unary(UnaryOp::Typeof, &Value::Int(1)).as_str(), Some("number"));
        assert!(matches!(apply_unary(UnaryOp::Not, &Value::from("")), Value::Bool(true)));
    }
}
