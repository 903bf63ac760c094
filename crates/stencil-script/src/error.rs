//! Script execution errors.
//!
//! Only [`RuntimeError`] is visible to a script's own `try/catch`. Host
//! failures and cancellation travel as separate [`ScriptError`] variants so
//! they always reach the runtime.

use stencil_foundation::Value;
use stencil_parser::ParseError;
use stencil_vm::VmError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors a script can catch.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// A value raised with `throw`.
    #[error("{0}")]
    Thrown(Value),

    #[error("{0} is not defined")]
    Reference(String),

    /// An operation applied to a value of the wrong type.
    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    /// A malformed `${...}` part of a template literal.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("internal: {0}")]
    Vm(#[from] VmError),
}

impl RuntimeError {
    /// The value bound to a `catch (e)` parameter.
    pub fn into_value(self) -> Value {
        match self {
            RuntimeError::Thrown(value) => value,
            other => Value::from(other.to_string()),
        }
    }
}

/// Everything that can end a block's execution early.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("Lexer Error: {0}")]
    Lex(ParseError),

    #[error("Parse Error: {0}")]
    Parse(ParseError),

    #[error("Runtime Error: {0}")]
    Runtime(#[from] RuntimeError),

    /// A host function reported failure.
    #[error("Runtime Error: {0}")]
    Host(String),

    #[error("Cancelled{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Cancelled(Option<String>),
}

impl ScriptError {
    pub fn from_parse(error: ParseError) -> Self {
        if error.is_lex_error() {
            ScriptError::Lex(error)
        } else {
            ScriptError::Parse(error)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScriptError::Cancelled(_))
    }

    /// Inline text spliced into the rendered document, e.g.
    /// `[Runtime Error: x is not defined]`.
    pub fn render(&self) -> String {
        format!("[{self}]")
    }
}

impl From<VmError> for ScriptError {
    fn from(error: VmError) -> Self {
        ScriptError::Runtime(RuntimeError::Vm(error))
    }
}

pub(crate) fn type_error(message: impl Into<String>) -> ScriptError {
    ScriptError::Runtime(RuntimeError::Type(message.into()))
}
