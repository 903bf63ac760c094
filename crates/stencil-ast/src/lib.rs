//! Syntax tree for Stencil template scripts.
//!
//! A [`Program`] owns a sequence of [`Statement`]s. Statements and
//! expressions pair a closed `*Kind` enum with the [`SourceLocation`] of
//! their first token. Trees are immutable once parsed; function literals are
//! shared behind `Arc` so a function value can outlive the block that
//! declared it.

use std::any::Any;
use std::sync::Arc;

use stencil_foundation::{
    AssignOp, BinaryOp, Callable, LogicalOp, SourceLocation, UnaryOp, UpdateOp,
};

/// Root of a parsed script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Vec<Statement>,
}

/// A statement with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StmtKind,
    pub location: SourceLocation,
}

impl Statement {
    pub fn new(kind: StmtKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

/// Declaration keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

/// One `name = init` entry of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expression>,
}

/// `catch (param) { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let a = 1, b;`
    Declaration {
        kind: DeclKind,
        declarations: Vec<Declarator>,
    },

    /// `function name(params) { ... }`
    Function(Arc<FunctionDef>),

    /// Expression evaluated for its side effects.
    Expression(Expression),

    /// `{ ... }`
    Block(Vec<Statement>),

    If {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },

    /// `for (init; test; update) body`
    For {
        init: Option<Box<Statement>>,
        test: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
    },

    /// `for (let binding of iterable) body`
    ForOf {
        kind: DeclKind,
        binding: String,
        iterable: Expression,
        body: Box<Statement>,
    },

    While {
        test: Expression,
        body: Box<Statement>,
    },

    Return(Option<Expression>),
    Break,
    Continue,
    Throw(Expression),

    Try {
        block: Vec<Statement>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Statement>>,
    },

    /// Assignment to the result accumulator: `tR = expr` or `tR += expr`.
    ResultAssign { append: bool, value: Expression },

    /// A stray `;`.
    Empty,
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub location: SourceLocation,
}

impl Expression {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }

    /// Whether this expression can appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // === Literals ===
    Number(f64),
    Str(String),
    /// Raw template body; `${...}` is resolved when evaluated.
    Template(String),
    Bool(bool),
    Null,
    Undefined,
    Array(Vec<Expression>),
    /// Object literal entries in source order.
    Object(Vec<(String, Expression)>),

    // === References ===
    Identifier(String),
    /// `object.property`
    Member {
        object: Box<Expression>,
        property: String,
    },
    /// `object[index]`
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },

    // === Operations ===
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    /// `++x`, `x--`, ...
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expression>,
        value: Box<Expression>,
    },

    /// Arrow function or function expression.
    Function(Arc<FunctionDef>),

    /// `await expr`; evaluation is synchronous so this is the operand's value.
    Await(Box<Expression>),
}

/// A function literal or declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Statement>),
    /// Concise arrow body: `x => x + 1`.
    Expression(Box<Expression>),
}

impl Callable for FunctionDef {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn arity(&self) -> usize {
        self.params.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
