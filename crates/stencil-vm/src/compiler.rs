//! Expression compiler
//!
//! Pratt-style precedence climbing over the byte tokenizer's output, emitting
//! straight into a [`CompiledExpr`]. Short-circuit operators and the ternary
//! are compiled with forward jumps patched once the target is known.

use std::sync::Arc;

use stencil_lexer::unescape;

use crate::bytecode::{CompiledExpr, OpCode};
use crate::token::{Token, TokenKind, Tokenizer};
use crate::CompileError;

/// Largest argument count encodable in a `CallMethod` operand.
const MAX_ARGS: usize = 0xff;

enum Infix {
    Binary(OpCode),
    And,
    Or,
}

fn infix_info(kind: TokenKind) -> Option<(u8, Infix)> {
    use TokenKind as T;
    let info = match kind {
        T::OrOr => (10, Infix::Or),
        T::AndAnd => (20, Infix::And),
        T::Pipe => (30, Infix::Binary(OpCode::BitOr)),
        T::Caret => (40, Infix::Binary(OpCode::BitXor)),
        T::Amp => (50, Infix::Binary(OpCode::BitAnd)),
        T::EqEq => (60, Infix::Binary(OpCode::Eq)),
        T::BangEq => (60, Infix::Binary(OpCode::Ne)),
        T::EqEqEq => (60, Infix::Binary(OpCode::StrictEq)),
        T::BangEqEq => (60, Infix::Binary(OpCode::StrictNe)),
        T::Lt => (70, Infix::Binary(OpCode::Lt)),
        T::LtEq => (70, Infix::Binary(OpCode::Le)),
        T::Gt => (70, Infix::Binary(OpCode::Gt)),
        T::GtEq => (70, Infix::Binary(OpCode::Ge)),
        T::Shl => (80, Infix::Binary(OpCode::Shl)),
        T::Shr => (80, Infix::Binary(OpCode::Shr)),
        T::UShr => (80, Infix::Binary(OpCode::UShr)),
        T::Plus => (90, Infix::Binary(OpCode::Add)),
        T::Minus => (90, Infix::Binary(OpCode::Sub)),
        T::Star => (100, Infix::Binary(OpCode::Mul)),
        T::Slash => (100, Infix::Binary(OpCode::Div)),
        T::Percent => (100, Infix::Binary(OpCode::Mod)),
        _ => return None,
    };
    Some(info)
}

/// Reusable expression compiler. Keeps its token buffer between calls.
#[derive(Debug, Default)]
pub struct Compiler {
    tokenizer: Tokenizer,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a single expression.
    pub fn compile(&mut self, source: &str) -> Result<CompiledExpr, CompileError> {
        let tokens = self.tokenizer.tokenize(source)?;
        let mut state = CompileState {
            source,
            tokens,
            pos: 0,
            out: CompiledExpr::new(),
        };
        state.expression()?;
        if state.peek().kind != TokenKind::Eof {
            return Err(state.syntax_error("unexpected token after expression"));
        }

        let mut out = state.out;
        out.source = Arc::from(source);
        let specialized = peephole(&mut out);
        tracing::trace!(
            source,
            ops = out.len(),
            specialized,
            "compiled expression"
        );
        Ok(out)
    }
}

struct CompileState<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    out: CompiledExpr,
}

impl<'a> CompileState<'a> {
    fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), CompileError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.syntax_error(&format!("expected {what}")))
        }
    }

    fn syntax_error(&self, message: &str) -> CompileError {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.text(self.source))
        };
        CompileError::Syntax {
            message: format!("{message}, found {found}"),
            offset: token.start,
        }
    }

    /// `name = expr` or a conditional expression.
    fn expression(&mut self) -> Result<(), CompileError> {
        if self.peek().kind == TokenKind::Ident && self.peek_kind_at(1) == TokenKind::Assign {
            let name = self.advance().text(self.source);
            self.advance();
            self.expression()?;
            let idx = self.out.add_string(name);
            self.out.emit(OpCode::Store, idx);
            return Ok(());
        }
        self.conditional()
    }

    fn conditional(&mut self) -> Result<(), CompileError> {
        self.binary(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(());
        }
        let to_else = self.out.emit(OpCode::JumpIfFalse, -1);
        self.expression()?;
        self.expect(TokenKind::Colon, "':' in conditional")?;
        let to_end = self.out.emit(OpCode::Jump, -1);
        let else_start = self.out.offset();
        self.out.patch_jump(to_else, else_start);
        self.expression()?;
        let end = self.out.offset();
        self.out.patch_jump(to_end, end);
        Ok(())
    }

    fn binary(&mut self, min_prec: u8) -> Result<(), CompileError> {
        self.unary()?;
        while let Some((prec, infix)) = infix_info(self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.advance();
            match infix {
                Infix::Binary(op) => {
                    self.binary(prec + 1)?;
                    self.out.emit(op, 0);
                }
                Infix::And | Infix::Or => {
                    let op = if matches!(infix, Infix::And) {
                        OpCode::JumpIfFalseKeep
                    } else {
                        OpCode::JumpIfTrueKeep
                    };
                    let jump = self.out.emit(op, -1);
                    self.binary(prec + 1)?;
                    let end = self.out.offset();
                    self.out.patch_jump(jump, end);
                }
            }
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), CompileError> {
        let op = match self.peek().kind {
            TokenKind::Bang => OpCode::Not,
            TokenKind::Minus => OpCode::Neg,
            TokenKind::Plus => OpCode::Plus,
            TokenKind::Tilde => OpCode::BitNot,
            TokenKind::Typeof => OpCode::Typeof,
            _ => return self.postfix(),
        };
        self.advance();
        let start = self.out.offset();
        self.unary()?;
        // `typeof missing` is "undefined", not a reference error.
        if op == OpCode::Typeof
            && self.out.offset() == start + 1
            && self.out.opcodes[start] == OpCode::Load
        {
            self.out.opcodes[start] = OpCode::LoadRef;
        }
        self.out.emit(op, 0);
        Ok(())
    }

    fn postfix(&mut self) -> Result<(), CompileError> {
        let mut bare_load = self.primary()?;
        loop {
            let kind = self.peek().kind;
            if !matches!(kind, TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen) {
                return Ok(());
            }
            // An unbound root of a member chain or call resolves to the host.
            if let Some(offset) = bare_load.take() {
                self.out.opcodes[offset] = OpCode::LoadRef;
            }
            self.advance();
            match kind {
                TokenKind::Dot => {
                    let name = self.property_name()?;
                    let idx = self.out.add_string(name);
                    if self.eat(TokenKind::LParen) {
                        let argc = self.arguments()?;
                        self.out.emit(OpCode::CallMethod, (idx << 8) | argc as i32);
                    } else {
                        self.out.emit(OpCode::GetProp, idx);
                    }
                }
                TokenKind::LBracket => {
                    self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    self.out.emit(OpCode::GetIndex, 0);
                }
                _ => {
                    let argc = self.arguments()?;
                    self.out.emit(OpCode::Call, argc as i32);
                }
            }
        }
    }

    fn property_name(&mut self) -> Result<&'a str, CompileError> {
        match self.peek().kind {
            TokenKind::Ident
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Undefined
            | TokenKind::Typeof => Ok(self.advance().text(self.source)),
            _ => Err(self.syntax_error("expected property name")),
        }
    }

    /// Arguments after an already consumed `(`; returns the count.
    fn arguments(&mut self) -> Result<usize, CompileError> {
        let mut argc = 0;
        while !self.eat(TokenKind::RParen) {
            if argc > 0 {
                self.expect(TokenKind::Comma, "',' or ')'")?;
                if self.eat(TokenKind::RParen) {
                    break;
                }
            }
            self.expression()?;
            argc += 1;
        }
        if argc > MAX_ARGS {
            return Err(CompileError::Unsupported(format!("{argc} arguments")));
        }
        Ok(argc)
    }

    /// Compile a primary expression. Returns the offset of its `Load` when
    /// the primary is a bare identifier.
    fn primary(&mut self) -> Result<Option<usize>, CompileError> {
        let token = self.peek();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                let n = token.number;
                if n.fract() == 0.0
                    && n >= i32::MIN as f64
                    && n <= i32::MAX as f64
                    && !(n == 0.0 && n.is_sign_negative())
                {
                    self.out.emit(OpCode::PushInt, n as i32);
                } else {
                    let idx = self.out.add_constant(n);
                    self.out.emit(OpCode::PushConst, idx);
                }
            }
            TokenKind::Str => {
                self.advance();
                let raw = token.text(self.source);
                let idx = self.out.add_string(&unescape(&raw[1..raw.len() - 1]));
                self.out.emit(OpCode::PushStr, idx);
            }
            TokenKind::True => {
                self.advance();
                self.out.emit(OpCode::PushTrue, 0);
            }
            TokenKind::False => {
                self.advance();
                self.out.emit(OpCode::PushFalse, 0);
            }
            TokenKind::Null => {
                self.advance();
                self.out.emit(OpCode::PushNull, 0);
            }
            TokenKind::Undefined => {
                self.advance();
                self.out.emit(OpCode::PushUndefined, 0);
            }
            TokenKind::Ident => {
                self.advance();
                let idx = self.out.add_string(token.text(self.source));
                return Ok(Some(self.out.emit(OpCode::Load, idx)));
            }
            TokenKind::LParen => {
                self.advance();
                let start = self.out.offset();
                self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                let lone_load =
                    self.out.offset() == start + 1 && self.out.opcodes[start] == OpCode::Load;
                return Ok(lone_load.then_some(start));
            }
            TokenKind::LBracket => {
                self.advance();
                let mut count = 0;
                while !self.eat(TokenKind::RBracket) {
                    if count > 0 {
                        self.expect(TokenKind::Comma, "',' or ']'")?;
                        if self.eat(TokenKind::RBracket) {
                            break;
                        }
                    }
                    self.expression()?;
                    count += 1;
                }
                self.out.emit(OpCode::MakeArray, count);
            }
            TokenKind::Eof => return Err(self.syntax_error("expected expression")),
            _ => return Err(self.syntax_error("unexpected token")),
        }
        Ok(None)
    }
}

/// Rewrite `PushInt, PushInt, <op>` into the op's `*Int` specialization.
/// Skipped when a jump lands between the pushes and the op, since the stack
/// contents there are not known to be the two literals. Returns the number of
/// rewritten instructions.
fn peephole(expr: &mut CompiledExpr) -> usize {
    let targets: Vec<usize> = expr
        .opcodes
        .iter()
        .zip(&expr.operands)
        .filter(|(op, _)| op.is_jump())
        .map(|(_, &target)| target as usize)
        .collect();

    let mut rewritten = 0;
    for i in 2..expr.opcodes.len() {
        let Some(specialized) = expr.opcodes[i].int_specialization() else {
            continue;
        };
        if expr.opcodes[i - 1] == OpCode::PushInt
            && expr.opcodes[i - 2] == OpCode::PushInt
            && !targets.iter().any(|&t| t == i - 1 || t == i)
        {
            expr.opcodes[i] = specialized;
            rewritten += 1;
        }
    }
    rewritten
}
