//! Byte-level tokenizer for the expression compiler.
//!
//! Token kinds are `u8`-coded and tokens are `Copy`; payloads are byte ranges
//! into the source, so tokenizing allocates nothing once the buffer has grown.

use crate::CompileError;

/// Token kind, one byte per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenKind {
    Number = 0,
    Str,
    Ident,
    True,
    False,
    Null,
    Undefined,
    Typeof,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    BangEq,
    EqEqEq,
    BangEqEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    UShr,
    Question,
    Colon,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: u32,
    pub end: u32,
    /// Parsed value for `Number` tokens.
    pub number: f64,
}

impl Token {
    fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            start: start as u32,
            end: end as u32,
            number: 0.0,
        }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start as usize..self.end as usize]
    }
}

/// Words the compiler refuses outright; the interpreter handles them.
const REJECTED_WORDS: &[&str] = &[
    "let", "const", "var", "function", "return", "if", "else", "for", "while", "break",
    "continue", "try", "catch", "finally", "throw", "await", "async", "new",
];

/// Tokenizer owning a reusable token buffer.
#[derive(Debug, Default)]
pub struct Tokenizer {
    tokens: Vec<Token>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize `source` into the internal buffer. The returned slice always
    /// ends with an `Eof` token.
    pub fn tokenize(&mut self, source: &str) -> Result<&[Token], CompileError> {
        self.tokens.clear();
        let bytes = source.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            let b = bytes[pos];
            if b.is_ascii_whitespace() {
                pos += 1;
                continue;
            }
            let start = pos;

            if b.is_ascii_digit() || (b == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit))
            {
                let (end, value) = scan_number(source, pos)?;
                let mut token = Token::new(TokenKind::Number, start, end);
                token.number = value;
                self.tokens.push(token);
                pos = end;
                continue;
            }

            if b.is_ascii_alphabetic() || b == b'_' || b == b'$' {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
                {
                    pos += 1;
                }
                let word = &source[start..pos];
                let kind = match word {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    "undefined" => TokenKind::Undefined,
                    "typeof" => TokenKind::Typeof,
                    w if REJECTED_WORDS.contains(&w) => {
                        return Err(CompileError::Unsupported(word.to_string()));
                    }
                    _ => TokenKind::Ident,
                };
                self.tokens.push(Token::new(kind, start, pos));
                continue;
            }

            if b == b'"' || b == b'\'' {
                pos += 1;
                loop {
                    match bytes.get(pos) {
                        None | Some(b'\n') => {
                            return Err(CompileError::Unsupported("unterminated string".into()));
                        }
                        Some(b'\\') => pos += 2,
                        Some(&c) if c == b => break,
                        Some(_) => pos += 1,
                    }
                }
                pos += 1;
                self.tokens.push(Token::new(TokenKind::Str, start, pos));
                continue;
            }

            let rest = &bytes[pos..];
            let (kind, len) = match rest {
                [b'>', b'>', b'>', ..] => (TokenKind::UShr, 3),
                [b'=', b'=', b'=', ..] => (TokenKind::EqEqEq, 3),
                [b'!', b'=', b'=', ..] => (TokenKind::BangEqEq, 3),
                [b'=', b'=', ..] => (TokenKind::EqEq, 2),
                [b'!', b'=', ..] => (TokenKind::BangEq, 2),
                [b'<', b'=', ..] => (TokenKind::LtEq, 2),
                [b'>', b'=', ..] => (TokenKind::GtEq, 2),
                [b'<', b'<', ..] => (TokenKind::Shl, 2),
                [b'>', b'>', ..] => (TokenKind::Shr, 2),
                [b'&', b'&', ..] => (TokenKind::AndAnd, 2),
                [b'|', b'|', ..] => (TokenKind::OrOr, 2),
                // Compound assignment, update, arrows and comments stay with the interpreter.
                [b'+' | b'-' | b'*' | b'/' | b'%', b'=', ..]
                | [b'+', b'+', ..]
                | [b'-', b'-', ..]
                | [b'=', b'>', ..]
                | [b'/', b'/' | b'*', ..] => {
                    return Err(CompileError::Unsupported(source[pos..pos + 2].to_string()));
                }
                [b'+', ..] => (TokenKind::Plus, 1),
                [b'-', ..] => (TokenKind::Minus, 1),
                [b'*', ..] => (TokenKind::Star, 1),
                [b'/', ..] => (TokenKind::Slash, 1),
                [b'%', ..] => (TokenKind::Percent, 1),
                [b'=', ..] => (TokenKind::Assign, 1),
                [b'<', ..] => (TokenKind::Lt, 1),
                [b'>', ..] => (TokenKind::Gt, 1),
                [b'!', ..] => (TokenKind::Bang, 1),
                [b'&', ..] => (TokenKind::Amp, 1),
                [b'|', ..] => (TokenKind::Pipe, 1),
                [b'^', ..] => (TokenKind::Caret, 1),
                [b'~', ..] => (TokenKind::Tilde, 1),
                [b'?', ..] => (TokenKind::Question, 1),
                [b':', ..] => (TokenKind::Colon, 1),
                [b'.', ..] => (TokenKind::Dot, 1),
                [b',', ..] => (TokenKind::Comma, 1),
                [b'(', ..] => (TokenKind::LParen, 1),
                [b')', ..] => (TokenKind::RParen, 1),
                [b'[', ..] => (TokenKind::LBracket, 1),
                [b']', ..] => (TokenKind::RBracket, 1),
                _ => {
                    let ch = source[pos..].chars().next().unwrap_or('?');
                    return Err(CompileError::Unsupported(ch.to_string()));
                }
            };
            self.tokens.push(Token::new(kind, start, start + len));
            pos += len;
        }

        self.tokens
            .push(Token::new(TokenKind::Eof, source.len(), source.len()));
        Ok(&self.tokens)
    }
}

fn scan_number(source: &str, start: usize) -> Result<(usize, f64), CompileError> {
    let bytes = source.as_bytes();
    let mut pos = start;

    if bytes[pos] == b'0' && matches!(bytes.get(pos + 1), Some(b'x' | b'X')) {
        pos += 2;
        while pos < bytes.len() && bytes[pos].is_ascii_hexdigit() {
            pos += 1;
        }
        let value = i64::from_str_radix(&source[start + 2..pos], 16)
            .map_err(|_| CompileError::Unsupported(source[start..pos].to_string()))?;
        return Ok((pos, value as f64));
    }

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && matches!(bytes[pos], b'e' | b'E') {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text = &source[start..pos];
    text.parse::<f64>()
        .map(|value| (pos, value))
        .map_err(|_| CompileError::Unsupported(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut tokenizer = Tokenizer::new();
        tokenizer
            .tokenize(source)
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a === b >>> 1"),
            vec![
                TokenKind::Ident,
                TokenKind::EqEqEq,
                TokenKind::Ident,
                TokenKind::UShr,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("x <= y"),
            vec![TokenKind::Ident, TokenKind::LtEq, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_numbers() {
        let mut tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("42 3.5 .25 0x1F 1e3").unwrap();
        let values: Vec<f64> = tokens[..5].iter().map(|t| t.number).collect();
        assert_eq!(values, vec![42.0, 3.5, 0.25, 31.0, 1000.0]);
    }

    #[test]
    fn test_string_spans_include_quotes() {
        let source = r#"'it\'s' + "x""#;
        let mut tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize(source).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text(source), r"'it\'s'");
        assert_eq!(tokens[2].text(source), "\"x\"");
    }

    #[test]
    fn test_statement_syntax_is_rejected() {
        let mut tokenizer = Tokenizer::new();
        for source in ["let x = 1", "x += 1", "i++", "x => x", "a // c", "`t`", "{a: 1}"] {
            assert!(
                matches!(tokenizer.tokenize(source), Err(CompileError::Unsupported(_))),
                "{source}"
            );
        }
    }

    #[test]
    fn test_buffer_is_reused() {
        let mut tokenizer = Tokenizer::new();
        tokenizer.tokenize("a + b + c + d").unwrap();
        let capacity = tokenizer.tokens.capacity();
        let tokens = tokenizer.tokenize("a").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokenizer.tokens.capacity(), capacity);
    }
}
