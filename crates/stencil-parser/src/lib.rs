// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Hand-written recursive descent parser for Stencil template scripts.
//!
//! ## Architecture
//!
//! - `stream`: [`TokenStream`] wrapper with lookahead and recovery
//! - `error`: [`ParseError`] and its kinds
//! - `expr`: expressions (assignment, conditional, Pratt binary tiers,
//!   unary/postfix, call/member chains, literals, functions)
//! - `stmt`: statements
//!
//! ## Recovery
//!
//! A malformed statement records a located error, then the stream skips to
//! the next `;` or statement keyword and parsing resumes. One bad line does
//! not hide the rest of the script.

mod error;
mod expr;
mod stmt;
mod stream;


pub use error::{ParseError, ParseErrorKind};
pub use stream::TokenStream;

use stencil_ast::{Expression, Program};
use stencil_foundation::LineIndex;
use stencil_lexer::{SpannedToken, Token, tokenize};

/// Result of parsing a whole script: every statement that parsed, plus every
/// error encountered along the way.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub program: Program,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The program if parsing was clean, otherwise the first error.
    pub fn into_result(self) -> Result<Program, ParseError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.program),
        }
    }
}

fn eof_location(source: &str) -> stencil_foundation::SourceLocation {
    LineIndex::new(source).location(source.len())
}

/// Parse a script into a [`Program`], recovering at statement boundaries.
pub fn parse_program(source: &str) -> ParseOutcome {
    let tokens = tokenize(source);
    parse_tokens(&tokens, eof_location(source))
}

/// Parse pre-lexed tokens into a [`Program`].
pub fn parse_tokens(
    tokens: &[SpannedToken],
    eof: stencil_foundation::SourceLocation,
) -> ParseOutcome {
    let mut stream = TokenStream::new(tokens, eof);
    let mut outcome = ParseOutcome::default();

    while !stream.at_end() {
        let start = stream.current_pos();
        match stmt::parse_statement(&mut stream) {
            Ok(statement) => outcome.program.body.push(statement),
            Err(error) => {
                tracing::trace!(%error, "parse error, synchronizing");
                outcome.errors.push(error);
                stream.synchronize();
                if stream.current_pos() == start {
                    stream.advance();
                }
            }
        }
    }

    outcome
}

/// Parse a single expression, e.g. the body of an interpolation block or a
/// `${...}` template part. A trailing `;` is tolerated.
pub fn parse_expression(source: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(source);
    let eof = eof_location(source);
    let mut stream = TokenStream::new(&tokens, eof);

    let expr = expr::parse_expr(&mut stream)?;
    stream.eat(&Token::Semicolon);
    if !stream.at_end() {
        return Err(ParseError::unexpected_token(
            stream.peek(),
            "after expression",
            stream.current_location(),
        ));
    }
    Ok(expr)
}
