//! Statement parsing.

use std::sync::Arc;

use stencil_ast::{CatchClause, DeclKind, Declarator, StmtKind, Statement};
use stencil_foundation::RESULT_ACCUMULATOR;
use stencil_lexer::Token;

use crate::expr::{parse_expr, parse_function};
use crate::{ParseError, TokenStream};

/// Parse one statement, consuming a trailing `;` if present.
pub(crate) fn parse_statement(stream: &mut TokenStream) -> Result<Statement, ParseError> {
    let location = stream.current_location();
    let kind = match stream.peek() {
        Some(Token::Let | Token::Const | Token::Var) => {
            let kind = parse_declaration(stream)?;
            stream.eat(&Token::Semicolon);
            kind
        }
        Some(Token::Async) if matches!(stream.peek_nth(1), Some(Token::Function)) => {
            stream.advance();
            return parse_statement(stream);
        }
        Some(Token::Function) => StmtKind::Function(Arc::new(parse_function(stream, true)?)),
        Some(Token::If) => parse_if(stream)?,
        Some(Token::For) => parse_for(stream)?,
        Some(Token::While) => {
            stream.advance();
            stream.expect(Token::LParen)?;
            let test = parse_expr(stream)?;
            stream.expect(Token::RParen)?;
            let body = Box::new(parse_statement(stream)?);
            StmtKind::While { test, body }
        }
        Some(Token::Return) => {
            stream.advance();
            let value = if matches!(stream.peek(), None | Some(Token::Semicolon | Token::RBrace)) {
                None
            } else {
                Some(parse_expr(stream)?)
            };
            stream.eat(&Token::Semicolon);
            StmtKind::Return(value)
        }
        Some(Token::Break) => {
            stream.advance();
            stream.eat(&Token::Semicolon);
            StmtKind::Break
        }
        Some(Token::Continue) => {
            stream.advance();
            stream.eat(&Token::Semicolon);
            StmtKind::Continue
        }
        Some(Token::Throw) => {
            stream.advance();
            let value = parse_expr(stream)?;
            stream.eat(&Token::Semicolon);
            StmtKind::Throw(value)
        }
        Some(Token::Try) => parse_try(stream)?,
        Some(Token::LBrace) => StmtKind::Block(parse_block(stream)?),
        Some(Token::Semicolon) => {
            stream.advance();
            StmtKind::Empty
        }
        Some(Token::Ident(name))
            if name.as_ref() == RESULT_ACCUMULATOR
                && matches!(stream.peek_nth(1), Some(Token::Eq | Token::PlusEq)) =>
        {
            let append = matches!(stream.peek_nth(1), Some(Token::PlusEq));
            stream.advance();
            stream.advance();
            let value = parse_expr(stream)?;
            stream.eat(&Token::Semicolon);
            StmtKind::ResultAssign { append, value }
        }
        Some(Token::RBrace) => {
            return Err(ParseError::unexpected_token(
                stream.peek(),
                "at statement start",
                location,
            ));
        }
        _ => {
            let expr = parse_expr(stream)?;
            stream.eat(&Token::Semicolon);
            StmtKind::Expression(expr)
        }
    };
    Ok(Statement::new(kind, location))
}

/// `{ statements }`
pub(crate) fn parse_block(stream: &mut TokenStream) -> Result<Vec<Statement>, ParseError> {
    stream.expect(Token::LBrace)?;
    let mut body = Vec::new();
    while !stream.check(&Token::RBrace) {
        if stream.at_end() {
            return Err(ParseError::expected_token(
                &Token::RBrace,
                None,
                stream.current_location(),
            ));
        }
        body.push(parse_statement(stream)?);
    }
    stream.expect(Token::RBrace)?;
    Ok(body)
}

/// `let a = 1, b` without the trailing `;`.
fn parse_declaration(stream: &mut TokenStream) -> Result<StmtKind, ParseError> {
    let kind = parse_decl_kind(stream)?;
    let mut declarations = Vec::new();
    loop {
        let name = stream.expect_ident("as variable name")?;
        let init = if stream.eat(&Token::Eq) {
            Some(parse_expr(stream)?)
        } else {
            None
        };
        declarations.push(Declarator { name, init });
        if !stream.eat(&Token::Comma) {
            break;
        }
    }
    Ok(StmtKind::Declaration { kind, declarations })
}

fn parse_decl_kind(stream: &mut TokenStream) -> Result<DeclKind, ParseError> {
    let location = stream.current_location();
    let kind = match stream.peek() {
        Some(Token::Let) => DeclKind::Let,
        Some(Token::Const) => DeclKind::Const,
        Some(Token::Var) => DeclKind::Var,
        other => {
            return Err(ParseError::unexpected_token(
                other,
                "in declaration",
                location,
            ));
        }
    };
    stream.advance();
    Ok(kind)
}

fn parse_if(stream: &mut TokenStream) -> Result<StmtKind, ParseError> {
    stream.expect(Token::If)?;
    stream.expect(Token::LParen)?;
    let test = parse_expr(stream)?;
    stream.expect(Token::RParen)?;
    let consequent = Box::new(parse_statement(stream)?);
    let alternate = if stream.eat(&Token::Else) {
        Some(Box::new(parse_statement(stream)?))
    } else {
        None
    };
    Ok(StmtKind::If {
        test,
        consequent,
        alternate,
    })
}

fn is_of(token: Option<&Token>) -> bool {
    matches!(token, Some(Token::Ident(word)) if word.as_ref() == "of")
}

/// `for (init; test; update) body` or `for (let x of xs) body`.
fn parse_for(stream: &mut TokenStream) -> Result<StmtKind, ParseError> {
    stream.expect(Token::For)?;
    stream.expect(Token::LParen)?;

    let declared = matches!(stream.peek(), Some(Token::Let | Token::Const | Token::Var));
    let of_offset = if declared { 2 } else { 1 };
    if matches!(stream.peek_nth(of_offset - 1), Some(Token::Ident(_)))
        && is_of(stream.peek_nth(of_offset))
    {
        let kind = if declared {
            parse_decl_kind(stream)?
        } else {
            DeclKind::Var
        };
        let binding = stream.expect_ident("as loop variable")?;
        stream.advance();
        let iterable = parse_expr(stream)?;
        stream.expect(Token::RParen)?;
        let body = Box::new(parse_statement(stream)?);
        return Ok(StmtKind::ForOf {
            kind,
            binding,
            iterable,
            body,
        });
    }

    let init = if stream.check(&Token::Semicolon) {
        None
    } else {
        let location = stream.current_location();
        let kind = if declared {
            parse_declaration(stream)?
        } else {
            StmtKind::Expression(parse_expr(stream)?)
        };
        Some(Box::new(Statement::new(kind, location)))
    };
    stream.expect(Token::Semicolon)?;

    let test = if stream.check(&Token::Semicolon) {
        None
    } else {
        Some(parse_expr(stream)?)
    };
    stream.expect(Token::Semicolon)?;

    let update = if stream.check(&Token::RParen) {
        None
    } else {
        Some(parse_expr(stream)?)
    };
    stream.expect(Token::RParen)?;

    let body = Box::new(parse_statement(stream)?);
    Ok(StmtKind::For {
        init,
        test,
        update,
        body,
    })
}

/// `try { } catch (e) { } finally { }`
fn parse_try(stream: &mut TokenStream) -> Result<StmtKind, ParseError> {
    let location = stream.expect(Token::Try)?;
    let block = parse_block(stream)?;

    let handler = if stream.eat(&Token::Catch) {
        let param = if stream.eat(&Token::LParen) {
            let name = stream.expect_ident("as catch parameter")?;
            stream.expect(Token::RParen)?;
            Some(name)
        } else {
            None
        };
        Some(CatchClause {
            param,
            body: parse_block(stream)?,
        })
    } else {
        None
    };

    let finalizer = if stream.eat(&Token::Finally) {
        Some(parse_block(stream)?)
    } else {
        None
    };

    if handler.is_none() && finalizer.is_none() {
        return Err(ParseError::invalid_syntax(
            "try without catch or finally",
            location,
        ));
    }

    Ok(StmtKind::Try {
        block,
        handler,
        finalizer,
    })
}
