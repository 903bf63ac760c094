use thiserror::Error;

/// Why an expression could not be compiled to bytecode.
///
/// Either way the caller falls back to the tree-walking interpreter, which
/// produces the user-facing diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Valid script outside the compiled subset (statements, functions,
    /// object and template literals, compound assignment).
    #[error("unsupported in bytecode: {0}")]
    Unsupported(String),

    #[error("syntax error at byte {offset}: {message}")]
    Syntax { message: String, offset: u32 },
}

/// Errors raised by the VM itself. Errors from variable or host access are
/// carried by the context's own error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("stack overflow: expression needs more than {0} slots")]
    StackOverflow(usize),

    #[error("stack underflow at offset {0}")]
    StackUnderflow(usize),

    #[error("invalid operand {operand} at offset {offset}")]
    InvalidOperand { offset: usize, operand: i32 },
}
