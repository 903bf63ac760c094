//! Parse error types.

use stencil_foundation::SourceLocation;
use stencil_lexer::{LexErrorKind, Token};

/// Parse error with source location and context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at {location}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub location: SourceLocation,
    pub message: String,
}

/// Category of parse error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// A token other than the one the grammar requires.
    UnexpectedToken,

    /// Input ended inside an unfinished construct.
    UnexpectedEof,

    /// Tokens are present but form an invalid construct, e.g. `1 = x`.
    InvalidSyntax,

    /// The lexer produced an error token here.
    Lex(LexErrorKind),
}

impl ParseError {
    /// Create an "expected token" error.
    pub fn expected_token(expected: &Token, found: Option<&Token>, location: SourceLocation) -> Self {
        match found {
            Some(Token::Error(kind)) => Self::lex(kind.clone(), location),
            Some(token) => Self {
                kind: ParseErrorKind::UnexpectedToken,
                location,
                message: format!("expected '{expected}', found '{token}'"),
            },
            None => Self {
                kind: ParseErrorKind::UnexpectedEof,
                location,
                message: format!("expected '{expected}', found end of input"),
            },
        }
    }

    /// Create an "unexpected token" error.
    pub fn unexpected_token(found: Option<&Token>, context: &str, location: SourceLocation) -> Self {
        match found {
            Some(Token::Error(kind)) => Self::lex(kind.clone(), location),
            Some(token) => Self {
                kind: ParseErrorKind::UnexpectedToken,
                location,
                message: format!("unexpected '{token}' {context}"),
            },
            None => Self {
                kind: ParseErrorKind::UnexpectedEof,
                location,
                message: format!("unexpected end of input {context}"),
            },
        }
    }

    /// Create an "invalid syntax" error.
    pub fn invalid_syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            location,
            message: message.into(),
        }
    }

    /// Wrap a lexer error token.
    pub fn lex(kind: LexErrorKind, location: SourceLocation) -> Self {
        Self {
            message: kind.to_string(),
            kind: ParseErrorKind::Lex(kind),
            location,
        }
    }

    /// Whether this error originated in the lexer.
    pub fn is_lex_error(&self) -> bool {
        matches!(self.kind, ParseErrorKind::Lex(_))
    }
}
