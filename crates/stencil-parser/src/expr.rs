//! Expression parsing.
//!
//! Assignment and the conditional operator are handled by recursive descent;
//! the binary tiers from `||` down to `*` go through a Pratt loop driven by
//! [`binary_op_info`].

use std::sync::Arc;

use stencil_ast::{ExprKind, Expression, FunctionBody, FunctionDef};
use stencil_foundation::{AssignOp, BinaryOp, LogicalOp, UnaryOp, UpdateOp};
use stencil_lexer::Token;

use crate::stmt;
use crate::{ParseError, TokenStream};

/// What a binary-tier token produces.
#[derive(Debug, Clone, Copy)]
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Get binary operator metadata (precedence and operator).
///
/// Higher precedence binds tighter. Every binary tier is left-associative.
fn binary_op_info(token: &Token) -> Option<(u8, InfixOp)> {
    use InfixOp::{Binary, Logical};
    let info = match token {
        Token::OrOr => (10, Logical(LogicalOp::Or)),
        Token::AndAnd => (20, Logical(LogicalOp::And)),
        Token::Pipe => (30, Binary(BinaryOp::BitOr)),
        Token::Caret => (40, Binary(BinaryOp::BitXor)),
        Token::Amp => (50, Binary(BinaryOp::BitAnd)),
        Token::EqEq => (60, Binary(BinaryOp::Eq)),
        Token::BangEq => (60, Binary(BinaryOp::Ne)),
        Token::EqEqEq => (60, Binary(BinaryOp::StrictEq)),
        Token::BangEqEq => (60, Binary(BinaryOp::StrictNe)),
        Token::Lt => (70, Binary(BinaryOp::Lt)),
        Token::LtEq => (70, Binary(BinaryOp::Le)),
        Token::Gt => (70, Binary(BinaryOp::Gt)),
        Token::GtEq => (70, Binary(BinaryOp::Ge)),
        Token::Shl => (80, Binary(BinaryOp::Shl)),
        Token::Shr => (80, Binary(BinaryOp::Shr)),
        Token::UShr => (80, Binary(BinaryOp::UShr)),
        Token::Plus => (90, Binary(BinaryOp::Add)),
        Token::Minus => (90, Binary(BinaryOp::Sub)),
        Token::Star => (100, Binary(BinaryOp::Mul)),
        Token::Slash => (100, Binary(BinaryOp::Div)),
        Token::Percent => (100, Binary(BinaryOp::Mod)),
        _ => return None,
    };
    Some(info)
}

fn assign_op(token: &Token) -> Option<AssignOp> {
    match token {
        Token::Eq => Some(AssignOp::Assign),
        Token::PlusEq => Some(AssignOp::Add),
        Token::MinusEq => Some(AssignOp::Sub),
        Token::StarEq => Some(AssignOp::Mul),
        Token::SlashEq => Some(AssignOp::Div),
        Token::PercentEq => Some(AssignOp::Mod),
        _ => None,
    }
}

/// Parse a full expression, including assignment and arrow functions.
pub(crate) fn parse_expr(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    if stream.check(&Token::Async)
        && (matches!(stream.peek_nth(1), Some(Token::Function | Token::LParen))
            || matches!(stream.peek_nth(2), Some(Token::Arrow)))
    {
        stream.advance();
    }
    if stream.arrow_ahead() {
        return parse_arrow(stream);
    }

    let target = parse_conditional(stream)?;

    let Some(op) = stream.peek().and_then(assign_op) else {
        return Ok(target);
    };
    if !target.is_assignable() {
        return Err(ParseError::invalid_syntax(
            "invalid assignment target",
            stream.current_location(),
        ));
    }
    stream.advance();
    let value = parse_expr(stream)?;
    let location = target.location;
    Ok(Expression::new(
        ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        location,
    ))
}

/// `test ? consequent : alternate`
fn parse_conditional(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let test = parse_binary(stream, 0)?;
    if !stream.eat(&Token::Question) {
        return Ok(test);
    }

    let consequent = parse_expr(stream)?;
    stream.expect(Token::Colon)?;
    let alternate = parse_expr(stream)?;
    let location = test.location;
    Ok(Expression::new(
        ExprKind::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        },
        location,
    ))
}

/// Pratt loop over the binary tiers.
fn parse_binary(stream: &mut TokenStream, min_prec: u8) -> Result<Expression, ParseError> {
    let mut left = parse_unary(stream)?;

    while let Some((prec, op)) = stream.peek().and_then(binary_op_info) {
        if prec < min_prec {
            break;
        }
        stream.advance();

        let right = parse_binary(stream, prec + 1)?;

        let location = left.location;
        let kind = match op {
            InfixOp::Binary(op) => ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            InfixOp::Logical(op) => ExprKind::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        };
        left = Expression::new(kind, location);
    }

    Ok(left)
}

/// Prefix operators.
fn parse_unary(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let location = stream.current_location();
    let op = match stream.peek() {
        Some(Token::Bang) => UnaryOp::Not,
        Some(Token::Minus) => UnaryOp::Neg,
        Some(Token::Plus) => UnaryOp::Plus,
        Some(Token::Tilde) => UnaryOp::BitNot,
        Some(Token::Typeof) => UnaryOp::Typeof,
        Some(Token::PlusPlus | Token::MinusMinus) => {
            let op = if stream.check(&Token::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            stream.advance();
            let target = parse_unary(stream)?;
            if !target.is_assignable() {
                return Err(ParseError::invalid_syntax(
                    "invalid update target",
                    target.location,
                ));
            }
            return Ok(Expression::new(
                ExprKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                },
                location,
            ));
        }
        Some(Token::Await) => {
            stream.advance();
            let operand = parse_unary(stream)?;
            return Ok(Expression::new(ExprKind::Await(Box::new(operand)), location));
        }
        _ => return parse_postfix(stream),
    };

    stream.advance();
    let operand = parse_unary(stream)?;
    Ok(Expression::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        location,
    ))
}

/// Postfix `++` / `--` after a call/member chain.
fn parse_postfix(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let expr = parse_call_member(stream)?;

    let op = match stream.peek() {
        Some(Token::PlusPlus) => UpdateOp::Increment,
        Some(Token::MinusMinus) => UpdateOp::Decrement,
        _ => return Ok(expr),
    };
    if !expr.is_assignable() {
        return Err(ParseError::invalid_syntax(
            "invalid update target",
            stream.current_location(),
        ));
    }
    stream.advance();
    let location = expr.location;
    Ok(Expression::new(
        ExprKind::Update {
            op,
            prefix: false,
            target: Box::new(expr),
        },
        location,
    ))
}

/// Calls, `.property` and `[index]` chains.
fn parse_call_member(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let mut expr = if stream.check(&Token::New) {
        parse_new(stream)?
    } else {
        parse_primary(stream)?
    };

    loop {
        let location = expr.location;
        match stream.peek() {
            Some(Token::Dot) => {
                stream.advance();
                let property = parse_property_name(stream)?;
                expr = Expression::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        property,
                    },
                    location,
                );
            }
            Some(Token::LBracket) => {
                stream.advance();
                let index = parse_expr(stream)?;
                stream.expect(Token::RBracket)?;
                expr = Expression::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    location,
                );
            }
            Some(Token::LParen) => {
                let args = parse_call_args(stream)?;
                expr = Expression::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    location,
                );
            }
            _ => break,
        }
    }

    Ok(expr)
}

/// `new Callee(args)` is evaluated as a plain call of `Callee`.
fn parse_new(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let location = stream.expect(Token::New)?;
    let mut callee = parse_primary(stream)?;
    while stream.eat(&Token::Dot) {
        let property = parse_property_name(stream)?;
        callee = Expression::new(
            ExprKind::Member {
                object: Box::new(callee),
                property,
            },
            location,
        );
    }
    let args = if stream.check(&Token::LParen) {
        parse_call_args(stream)?
    } else {
        Vec::new()
    };
    Ok(Expression::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
        location,
    ))
}

/// Property name after `.`; keywords are allowed (`x.default`, `p.new`).
fn parse_property_name(stream: &mut TokenStream) -> Result<String, ParseError> {
    let location = stream.current_location();
    match stream.peek() {
        Some(Token::Ident(name)) => {
            stream.advance();
            Ok(name.to_string())
        }
        Some(token) if token.as_str().is_some_and(is_word) => {
            stream.advance();
            Ok(token.to_string())
        }
        other => Err(ParseError::unexpected_token(other, "after '.'", location)),
    }
}

fn is_word(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphabetic())
}

/// `( args )`
fn parse_call_args(stream: &mut TokenStream) -> Result<Vec<Expression>, ParseError> {
    stream.expect(Token::LParen)?;
    let mut args = Vec::new();
    while !stream.check(&Token::RParen) {
        args.push(parse_expr(stream)?);
        if !stream.eat(&Token::Comma) {
            break;
        }
    }
    stream.expect(Token::RParen)?;
    Ok(args)
}

/// Literals, identifiers, grouping, array/object literals, function
/// expressions.
fn parse_primary(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let location = stream.current_location();
    let kind = match stream.peek() {
        Some(Token::Number(n)) => ExprKind::Number(*n),
        Some(Token::Str(s)) => ExprKind::Str(s.to_string()),
        Some(Token::Template(s)) => ExprKind::Template(s.to_string()),
        Some(Token::True) => ExprKind::Bool(true),
        Some(Token::False) => ExprKind::Bool(false),
        Some(Token::Null) => ExprKind::Null,
        Some(Token::Undefined) => ExprKind::Undefined,
        Some(Token::Ident(name)) => ExprKind::Identifier(name.to_string()),
        Some(Token::LParen) => {
            stream.advance();
            let inner = parse_expr(stream)?;
            stream.expect(Token::RParen)?;
            return Ok(inner);
        }
        Some(Token::LBracket) => return parse_array(stream),
        Some(Token::LBrace) => return parse_object(stream),
        Some(Token::Function) => {
            let def = parse_function(stream, false)?;
            return Ok(Expression::new(ExprKind::Function(Arc::new(def)), location));
        }
        other => {
            return Err(ParseError::unexpected_token(
                other,
                "in expression",
                location,
            ));
        }
    };
    stream.advance();
    Ok(Expression::new(kind, location))
}

fn parse_array(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let location = stream.expect(Token::LBracket)?;
    let mut items = Vec::new();
    while !stream.check(&Token::RBracket) {
        items.push(parse_expr(stream)?);
        if !stream.eat(&Token::Comma) {
            break;
        }
    }
    stream.expect(Token::RBracket)?;
    Ok(Expression::new(ExprKind::Array(items), location))
}

fn parse_object(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let location = stream.expect(Token::LBrace)?;
    let mut entries = Vec::new();
    while !stream.check(&Token::RBrace) {
        let key_location = stream.current_location();
        let key = match stream.peek() {
            Some(Token::Ident(name)) => name.to_string(),
            Some(Token::Str(s)) => s.to_string(),
            Some(Token::Number(n)) => stencil_foundation::coercion::format_number(*n),
            Some(token) if token.as_str().is_some_and(is_word) => token.to_string(),
            other => {
                return Err(ParseError::unexpected_token(
                    other,
                    "as object key",
                    key_location,
                ));
            }
        };
        stream.advance();

        let value = if stream.eat(&Token::Colon) {
            parse_expr(stream)?
        } else {
            // Shorthand `{ name }`.
            Expression::new(ExprKind::Identifier(key.clone()), key_location)
        };
        entries.push((key, value));

        if !stream.eat(&Token::Comma) {
            break;
        }
    }
    stream.expect(Token::RBrace)?;
    Ok(Expression::new(ExprKind::Object(entries), location))
}

/// `x => body`, `(a, b) => body`.
fn parse_arrow(stream: &mut TokenStream) -> Result<Expression, ParseError> {
    let location = stream.current_location();
    let params = if stream.check(&Token::LParen) {
        parse_params(stream)?
    } else {
        vec![stream.expect_ident("as arrow parameter")?]
    };
    stream.expect(Token::Arrow)?;

    let body = if stream.check(&Token::LBrace) {
        FunctionBody::Block(stmt::parse_block(stream)?)
    } else {
        FunctionBody::Expression(Box::new(parse_expr(stream)?))
    };

    let def = FunctionDef {
        name: None,
        params,
        body,
        location,
    };
    Ok(Expression::new(ExprKind::Function(Arc::new(def)), location))
}

/// `function name?(params) { body }`; `name_required` for declarations.
pub(crate) fn parse_function(
    stream: &mut TokenStream,
    name_required: bool,
) -> Result<FunctionDef, ParseError> {
    let location = stream.expect(Token::Function)?;
    let name = if name_required || matches!(stream.peek(), Some(Token::Ident(_))) {
        Some(stream.expect_ident("as function name")?)
    } else {
        None
    };
    let params = parse_params(stream)?;
    let body = FunctionBody::Block(stmt::parse_block(stream)?);
    Ok(FunctionDef {
        name,
        params,
        body,
        location,
    })
}

/// `( a, b, c )`
fn parse_params(stream: &mut TokenStream) -> Result<Vec<String>, ParseError> {
    stream.expect(Token::LParen)?;
    let mut params = Vec::new();
    while !stream.check(&Token::RParen) {
        params.push(stream.expect_ident("as parameter")?);
        if !stream.eat(&Token::Comma) {
            break;
        }
    }
    stream.expect(Token::RParen)?;
    Ok(params)
}
