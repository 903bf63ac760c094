//! Token stream wrapper for the recursive descent parser.

use stencil_foundation::SourceLocation;
use stencil_lexer::{SpannedToken, Token};

use crate::ParseError;

/// Token stream with lookahead and location tracking.
pub struct TokenStream<'src> {
    tokens: &'src [SpannedToken],
    pos: usize,
    /// Location reported for errors at end of input.
    eof: SourceLocation,
}

impl<'src> TokenStream<'src> {
    pub fn new(tokens: &'src [SpannedToken], eof: SourceLocation) -> Self {
        Self {
            tokens,
            pos: 0,
            eof,
        }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&'src Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Peek at the nth token ahead without consuming.
    pub fn peek_nth(&self, n: usize) -> Option<&'src Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    /// Advance to the next token and return the current one.
    pub fn advance(&mut self) -> Option<&'src Token> {
        let token = self.tokens.get(self.pos).map(|t| &t.token);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token has the same kind as `expected`.
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consume the current token if it matches.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Expect a specific token and advance if it matches.
    pub fn expect(&mut self, expected: Token) -> Result<SourceLocation, ParseError> {
        let location = self.current_location();
        if self.eat(&expected) {
            Ok(location)
        } else {
            Err(ParseError::expected_token(
                &expected,
                self.peek(),
                location,
            ))
        }
    }

    /// Consume an identifier and return its name.
    pub fn expect_ident(&mut self, context: &str) -> Result<String, ParseError> {
        let location = self.current_location();
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.to_string())
            }
            other => Err(ParseError::unexpected_token(other, context, location)),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn current_pos(&self) -> usize {
        self.pos
    }

    /// Location of the current token, or end of input.
    pub fn current_location(&self) -> SourceLocation {
        self.tokens
            .get(self.pos)
            .map(|t| t.location)
            .unwrap_or(self.eof)
    }

    /// Whether the tokens at the cursor start an arrow function:
    /// `x =>`, `() =>` or `(a, b) =>`.
    pub fn arrow_ahead(&self) -> bool {
        match self.peek() {
            Some(Token::Ident(_)) => matches!(self.peek_nth(1), Some(Token::Arrow)),
            Some(Token::LParen) => {
                let mut depth = 0usize;
                for (offset, t) in self.tokens[self.pos..].iter().enumerate() {
                    match t.token {
                        Token::LParen => depth += 1,
                        Token::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(self.peek_nth(offset + 1), Some(Token::Arrow));
                            }
                        }
                        _ => {}
                    }
                }
                false
            }
            _ => false,
        }
    }

    /// Skip to the next statement boundary for error recovery.
    ///
    /// Consumes through the next `;`, or stops before a statement keyword or
    /// a closing `}`.
    pub fn synchronize(&mut self) {
        while let Some(token) = self.peek() {
            if matches!(token, Token::Semicolon) {
                self.pos += 1;
                return;
            }
            if token.starts_statement() || matches!(token, Token::RBrace) {
                return;
            }
            self.pos += 1;
        }
    }
}
