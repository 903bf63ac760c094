//! Bytecode executor
//!
//! Stack-based VM that executes a [`CompiledExpr`]. Everything that touches
//! script state goes through [`VmContext`], so the VM shares variable lookup,
//! builtins and host hooks with the interpreter that implements it.

use std::collections::HashMap;
use std::sync::Arc;

use stencil_foundation::coercion::to_boolean;
use stencil_foundation::operators::{apply_binary, apply_int, apply_unary};
use stencil_foundation::{BinaryOp, UnaryOp, Value};

use crate::bytecode::{CompiledExpr, OpCode};
use crate::VmError;

/// Fixed operand stack depth.
pub const STACK_SIZE: usize = 256;

/// Execution context providing script state and dispatch.
pub trait VmContext {
    type Error: From<VmError>;

    /// Value of a bound variable. Unbound names are an error.
    fn load(&mut self, name: &str) -> Result<Value, Self::Error>;

    /// Value of a variable, or a host reference when it is unbound.
    fn load_ref(&mut self, name: &str) -> Result<Value, Self::Error>;

    fn store(&mut self, name: &str, value: Value) -> Result<(), Self::Error>;

    fn get_property(&mut self, object: &Value, name: &str) -> Result<Value, Self::Error>;

    fn get_index(&mut self, object: &Value, index: &Value) -> Result<Value, Self::Error>;

    fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, Self::Error>;

    fn call_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, Self::Error>;
}

#[derive(Debug)]
struct CachedVariable {
    value: Value,
    stable: bool,
}

/// Stack VM with a per-instance variable cache.
///
/// A variable is served from the cache once two consecutive loads observed
/// the identical value; a store through this VM drops its entry. Writes made
/// behind the VM's back (by a called script function, say) are not seen
/// until [`Vm::clear_cache`].
#[derive(Debug)]
pub struct Vm {
    stack: Vec<Value>,
    cache: HashMap<Arc<str>, CachedVariable>,
    cache_hits: u64,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(STACK_SIZE),
            cache: HashMap::new(),
            cache_hits: 0,
        }
    }

    /// Loads answered from the variable cache so far.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Execute an expression and return its value.
    pub fn execute<C: VmContext>(
        &mut self,
        expr: &CompiledExpr,
        ctx: &mut C,
    ) -> Result<Value, C::Error> {
        self.stack.clear();
        let mut ip = 0;

        while ip < expr.opcodes.len() {
            let op = expr.opcodes[ip];
            let operand = expr.operands[ip];
            let at = ip;
            ip += 1;

            match op {
                OpCode::PushInt => self.push(Value::Int(operand as i64))?,
                OpCode::PushConst => {
                    let n = *expr
                        .constants
                        .get(operand as usize)
                        .ok_or(VmError::InvalidOperand { offset: at, operand })?;
                    self.push(Value::number(n))?;
                }
                OpCode::PushStr => {
                    let s = string(expr, at, operand)?;
                    self.push(Value::Str(s.clone()))?;
                }
                OpCode::PushTrue => self.push(Value::Bool(true))?,
                OpCode::PushFalse => self.push(Value::Bool(false))?,
                OpCode::PushNull => self.push(Value::Null)?,
                OpCode::PushUndefined => self.push(Value::Undefined)?,
                OpCode::MakeArray => {
                    let items = self.pop_n(operand as usize, at)?;
                    self.push(Value::list(items))?;
                }

                OpCode::Load | OpCode::LoadRef => {
                    let name = string(expr, at, operand)?;
                    let value = self.load(name, op == OpCode::LoadRef, ctx)?;
                    self.push(value)?;
                }
                OpCode::Store => {
                    let name = string(expr, at, operand)?;
                    let value = self.peek(at)?.clone();
                    ctx.store(name, value)?;
                    self.cache.remove(name);
                }

                OpCode::GetProp => {
                    let name = string(expr, at, operand)?;
                    let object = self.pop(at)?;
                    let value = ctx.get_property(&object, name)?;
                    self.push(value)?;
                }
                OpCode::GetIndex => {
                    let index = self.pop(at)?;
                    let object = self.pop(at)?;
                    let value = ctx.get_index(&object, &index)?;
                    self.push(value)?;
                }
                OpCode::Call => {
                    let args = self.pop_n(operand as usize, at)?;
                    let callee = self.pop(at)?;
                    let value = ctx.call(&callee, args)?;
                    self.push(value)?;
                }
                OpCode::CallMethod => {
                    let name = string(expr, at, operand >> 8)?;
                    let args = self.pop_n((operand & 0xff) as usize, at)?;
                    let receiver = self.pop(at)?;
                    let value = ctx.call_method(&receiver, name, args)?;
                    self.push(value)?;
                }

                OpCode::AddInt
                | OpCode::SubInt
                | OpCode::MulInt
                | OpCode::DivInt
                | OpCode::ModInt
                | OpCode::EqInt
                | OpCode::NeInt
                | OpCode::LtInt
                | OpCode::LeInt
                | OpCode::GtInt
                | OpCode::GeInt => {
                    let b = self.pop(at)?;
                    let a = self.pop(at)?;
                    let bin = binary_op(op).ok_or(VmError::InvalidOperand { offset: at, operand })?;
                    let value = match (&a, &b) {
                        (Value::Int(x), Value::Int(y)) => apply_int(bin, *x, *y),
                        _ => None,
                    };
                    self.push(value.unwrap_or_else(|| apply_binary(bin, &a, &b)))?;
                }

                OpCode::Neg | OpCode::Plus | OpCode::Not | OpCode::BitNot | OpCode::Typeof => {
                    let value = self.pop(at)?;
                    let unary = match op {
                        OpCode::Neg => UnaryOp::Neg,
                        OpCode::Plus => UnaryOp::Plus,
                        OpCode::Not => UnaryOp::Not,
                        OpCode::BitNot => UnaryOp::BitNot,
                        _ => UnaryOp::Typeof,
                    };
                    self.push(apply_unary(unary, &value))?;
                }

                OpCode::Jump => ip = operand as usize,
                OpCode::JumpIfFalse => {
                    if !to_boolean(&self.pop(at)?) {
                        ip = operand as usize;
                    }
                }
                OpCode::JumpIfFalseKeep | OpCode::JumpIfTrueKeep => {
                    let truthy = to_boolean(self.peek(at)?);
                    if truthy == (op == OpCode::JumpIfTrueKeep) {
                        ip = operand as usize;
                    } else {
                        self.stack.pop();
                    }
                }

                _ => {
                    let b = self.pop(at)?;
                    let a = self.pop(at)?;
                    let bin = binary_op(op).ok_or(VmError::InvalidOperand { offset: at, operand })?;
                    self.push(apply_binary(bin, &a, &b))?;
                }
            }
        }

        self.pop(expr.opcodes.len()).map_err(Into::into)
    }

    fn load<C: VmContext>(
        &mut self,
        name: &Arc<str>,
        by_ref: bool,
        ctx: &mut C,
    ) -> Result<Value, C::Error> {
        if let Some(entry) = self.cache.get(name)
            && entry.stable
        {
            self.cache_hits += 1;
            return Ok(entry.value.clone());
        }

        let value = if by_ref {
            ctx.load_ref(name)?
        } else {
            ctx.load(name)?
        };

        // Host references stand in for unbound names and are never cached.
        if !matches!(value, Value::HostRef(_)) {
            match self.cache.get_mut(name) {
                Some(entry) if entry.value.is_identical(&value) => entry.stable = true,
                Some(entry) => entry.value = value.clone(),
                None => {
                    self.cache.insert(
                        name.clone(),
                        CachedVariable {
                            value: value.clone(),
                            stable: false,
                        },
                    );
                }
            }
        }
        Ok(value)
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= STACK_SIZE {
            return Err(VmError::StackOverflow(STACK_SIZE));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, at: usize) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow(at))
    }

    fn peek(&self, at: usize) -> Result<&Value, VmError> {
        self.stack.last().ok_or(VmError::StackUnderflow(at))
    }

    fn pop_n(&mut self, n: usize, at: usize) -> Result<Vec<Value>, VmError> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(VmError::StackUnderflow(at))?;
        Ok(self.stack.split_off(start))
    }
}

fn string(expr: &CompiledExpr, at: usize, operand: i32) -> Result<&Arc<str>, VmError> {
    usize::try_from(operand)
        .ok()
        .and_then(|idx| expr.strings.get(idx))
        .ok_or(VmError::InvalidOperand { offset: at, operand })
}

fn binary_op(op: OpCode) -> Option<BinaryOp> {
    Some(match op {
        OpCode::Add | OpCode::AddInt => BinaryOp::Add,
        OpCode::Sub | OpCode::SubInt => BinaryOp::Sub,
        OpCode::Mul | OpCode::MulInt => BinaryOp::Mul,
        OpCode::Div | OpCode::DivInt => BinaryOp::Div,
        OpCode::Mod | OpCode::ModInt => BinaryOp::Mod,
        OpCode::Eq | OpCode::EqInt => BinaryOp::Eq,
        OpCode::Ne | OpCode::NeInt => BinaryOp::Ne,
        OpCode::StrictEq => BinaryOp::StrictEq,
        OpCode::StrictNe => BinaryOp::StrictNe,
        OpCode::Lt | OpCode::LtInt => BinaryOp::Lt,
        OpCode::Le | OpCode::LeInt => BinaryOp::Le,
        OpCode::Gt | OpCode::GtInt => BinaryOp::Gt,
        OpCode::Ge | OpCode::GeInt => BinaryOp::Ge,
        OpCode::BitAnd => BinaryOp::BitAnd,
        OpCode::BitOr => BinaryOp::BitOr,
        OpCode::BitXor => BinaryOp::BitXor,
        OpCode::Shl => BinaryOp::Shl,
        OpCode::Shr => BinaryOp::Shr,
        OpCode::UShr => BinaryOp::UShr,
        _ => return None,
    })
}

#[cfg(test)]
mod tests;
