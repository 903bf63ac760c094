//! Bytecode instruction set
//!
//! Flat encoding in parallel arrays: one opcode and one `i32` operand per
//! instruction, plus constant and string pools referenced by index.

use std::fmt;
use std::sync::Arc;

/// Bytecode instruction
///
/// Stack-based: operands are popped from the stack, results pushed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // === Literals ===
    /// Push the operand as an integer
    PushInt,
    /// Push a number from the constant pool
    PushConst,
    /// Push a string from the string pool
    PushStr,
    PushTrue,
    PushFalse,
    PushNull,
    PushUndefined,
    /// Pop n values and push them as a list (operand = n)
    MakeArray,

    // === Variables ===
    /// Push a variable's value; unbound names are a reference error
    Load,
    /// Push a variable's value; unbound names resolve to a host reference.
    /// Used for member objects, callees and `typeof` operands.
    LoadRef,
    /// Store top of stack to a variable (does not pop)
    Store,

    // === Access and calls ===
    /// Pop object, push `object.name` (operand = string index)
    GetProp,
    /// Pop index, pop object, push `object[index]`
    GetIndex,
    /// Pop n arguments, pop callee, push the result (operand = n)
    Call,
    /// Pop n arguments, pop receiver, push `receiver.name(args)`
    /// (operand = string index << 8 | n)
    CallMethod,

    // === Arithmetic and comparison ===
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,

    // === Integer specializations (both operands are integer literals) ===
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    ModInt,
    EqInt,
    NeInt,
    LtInt,
    LeInt,
    GtInt,
    GeInt,

    // === Unary ===
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,

    // === Control flow ===
    /// Jump to the operand offset
    Jump,
    /// Pop the condition; jump if falsy
    JumpIfFalse,
    /// If top of stack is falsy jump and keep it, otherwise pop it (`&&`)
    JumpIfFalseKeep,
    /// If top of stack is truthy jump and keep it, otherwise pop it (`||`)
    JumpIfTrueKeep,
}

impl OpCode {
    /// The `*Int` specialization of a generic arithmetic or comparison op.
    pub fn int_specialization(self) -> Option<OpCode> {
        Some(match self {
            OpCode::Add => OpCode::AddInt,
            OpCode::Sub => OpCode::SubInt,
            OpCode::Mul => OpCode::MulInt,
            OpCode::Div => OpCode::DivInt,
            OpCode::Mod => OpCode::ModInt,
            OpCode::Eq | OpCode::StrictEq => OpCode::EqInt,
            OpCode::Ne | OpCode::StrictNe => OpCode::NeInt,
            OpCode::Lt => OpCode::LtInt,
            OpCode::Le => OpCode::LeInt,
            OpCode::Gt => OpCode::GtInt,
            OpCode::Ge => OpCode::GeInt,
            _ => return None,
        })
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfFalseKeep | OpCode::JumpIfTrueKeep
        )
    }
}

/// A compiled expression.
#[derive(Debug, Clone, Default)]
pub struct CompiledExpr {
    pub opcodes: Vec<OpCode>,
    pub operands: Vec<i32>,
    pub constants: Vec<f64>,
    pub strings: Vec<Arc<str>>,
    /// Expression text this was compiled from.
    pub source: Arc<str>,
}

impl CompiledExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an instruction and return its offset
    pub fn emit(&mut self, op: OpCode, operand: i32) -> usize {
        let offset = self.opcodes.len();
        self.opcodes.push(op);
        self.operands.push(operand);
        offset
    }

    /// Current offset (for jump targets)
    pub fn offset(&self) -> usize {
        self.opcodes.len()
    }

    /// Point the jump at `offset` to `target`
    pub fn patch_jump(&mut self, offset: usize, target: usize) {
        self.operands[offset] = target as i32;
    }

    /// Add a number constant and return its index
    pub fn add_constant(&mut self, value: f64) -> i32 {
        if let Some(idx) = self
            .constants
            .iter()
            .position(|c| c.to_bits() == value.to_bits())
        {
            return idx as i32;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as i32
    }

    /// Intern a string and return its index
    pub fn add_string(&mut self, value: &str) -> i32 {
        if let Some(idx) = self.strings.iter().position(|s| s.as_ref() == value) {
            return idx as i32;
        }
        self.strings.push(Arc::from(value));
        (self.strings.len() - 1) as i32
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (offset, (op, operand)) in self.opcodes.iter().zip(&self.operands).enumerate() {
            write!(f, "{offset:04} {op:?}")?;
            match op {
                OpCode::PushInt | OpCode::MakeArray | OpCode::Call => write!(f, " {operand}")?,
                OpCode::PushConst => write!(f, " {}", self.constants[*operand as usize])?,
                OpCode::PushStr => write!(f, " {:?}", self.strings[*operand as usize])?,
                OpCode::Load | OpCode::LoadRef | OpCode::Store | OpCode::GetProp => {
                    write!(f, " {}", self.strings[*operand as usize])?
                }
                OpCode::CallMethod => write!(
                    f,
                    " {} {}",
                    self.strings[(*operand >> 8) as usize],
                    operand & 0xff
                )?,
                op if op.is_jump() => write!(f, " -> {operand:04}")?,
                _ => {}
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
