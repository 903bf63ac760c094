// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lexical analysis for Stencil template scripts.
//!
//! Tokenization is a single forward pass over the source using logos.
//!
//! # Design
//!
//! - [`Token`] covers keywords, operators, punctuation and value-carrying
//!   literals (numbers, strings, raw template bodies, identifiers).
//! - Comments and whitespace are skipped, never emitted.
//! - Malformed input never aborts lexing. Unterminated strings, templates and
//!   block comments, and stray characters, become [`Token::Error`] so the
//!   parser can report a located diagnostic and keep going.
//! - Template literal bodies are kept raw; `${...}` is resolved at evaluation
//!   time.
//!
//! # Examples
//!
//! ```
//! use stencil_lexer::{tokenize, Token};
//!
//! let tokens = tokenize("tR += name;");
//! assert_eq!(tokens[1].token, Token::PlusEq);
//! assert_eq!(tokens[2].location.column, 7);
//! ```

use logos::Logos;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use stencil_foundation::{LineIndex, SourceLocation};

/// Reasons a piece of source could not form a valid token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated template literal")]
    UnterminatedTemplate,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
}

/// Script token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // === Keywords ===
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("var")]
    Var,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("throw")]
    Throw,
    #[token("typeof")]
    Typeof,
    #[token("await")]
    Await,
    #[token("async")]
    Async,
    #[token("new")]
    New,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,

    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    BangEqEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,

    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // === Literals ===
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok().map(|v| v as f64))]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unquote(lex.slice()))]
    Str(Rc<str>),

    /// Raw body of a backtick literal, `${...}` left unresolved.
    #[regex(r"`([^`\\]|\\(.|\n))*`", |lex| {
        let s = lex.slice();
        Rc::from(&s[1..s.len() - 1])
    })]
    Template(Rc<str>),

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| Rc::from(lex.slice()))]
    Ident(Rc<str>),

    #[regex(r#""([^"\\\n]|\\.)*"#, |_| LexErrorKind::UnterminatedString)]
    #[regex(r#"'([^'\\\n]|\\.)*"#, |_| LexErrorKind::UnterminatedString)]
    #[regex(r"`([^`\\]|\\(.|\n))*", |_| LexErrorKind::UnterminatedTemplate)]
    #[regex(r"/\*([^*]|\*+[^*/])*\**", |_| LexErrorKind::UnterminatedComment)]
    Error(LexErrorKind),
}

fn unquote(slice: &str) -> Rc<str> {
    Rc::from(unescape(&slice[1..slice.len() - 1]).as_str())
}

/// Resolve backslash escapes.
///
/// `\n \t \r \\ \" \' \`` and `\0` map to their characters; any other escaped
/// character stands for itself, and a trailing lone backslash is kept.
pub fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('0') => result.push('\0'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

impl Token {
    /// Fixed spelling of keyword, operator and delimiter tokens.
    pub fn as_str(&self) -> Option<&'static str> {
        let s = match self {
            Token::Let => "let",
            Token::Const => "const",
            Token::Var => "var",
            Token::Function => "function",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::While => "while",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Finally => "finally",
            Token::Throw => "throw",
            Token::Typeof => "typeof",
            Token::Await => "await",
            Token::Async => "async",
            Token::New => "new",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Undefined => "undefined",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Eq => "=",
            Token::PlusEq => "+=",
            Token::MinusEq => "-=",
            Token::StarEq => "*=",
            Token::SlashEq => "/=",
            Token::PercentEq => "%=",
            Token::EqEq => "==",
            Token::BangEq => "!=",
            Token::EqEqEq => "===",
            Token::BangEqEq => "!==",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Tilde => "~",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::UShr => ">>>",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Arrow => "=>",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Number(_)
            | Token::Str(_)
            | Token::Template(_)
            | Token::Ident(_)
            | Token::Error(_) => return None,
        };
        Some(s)
    }

    /// Whether this token can begin a statement (panic-mode recovery point).
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            Token::Let
                | Token::Const
                | Token::Var
                | Token::Function
                | Token::Return
                | Token::If
                | Token::For
                | Token::While
                | Token::Break
                | Token::Continue
                | Token::Try
                | Token::Throw
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Template(s) => write!(f, "`{s}`"),
            Token::Ident(id) => write!(f, "{id}"),
            Token::Error(kind) => write!(f, "<{kind}>"),
            other => f.write_str(other.as_str().unwrap_or("?")),
        }
    }
}

/// A token with its byte range and resolved position.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Range<usize>,
    pub location: SourceLocation,
}

/// Tokenize a whole script.
///
/// Never fails; lexical problems are embedded as [`Token::Error`].
pub fn tokenize(source: &str) -> Vec<SpannedToken> {
    let index = LineIndex::new(source);
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let token = result.unwrap_or_else(|()| {
            let ch = lexer.slice().chars().next().unwrap_or('\0');
            Token::Error(LexErrorKind::UnexpectedChar(ch))
        });
        tokens.push(SpannedToken {
            token,
            location: index.location(span.start),
            span,
        });
    }

    tokens
}

/// First lexical error in a token list, if any.
pub fn first_error(tokens: &[SpannedToken]) -> Option<(&LexErrorKind, SourceLocation)> {
    tokens.iter().find_map(|t| match &t.token {
        Token::Error(kind) => Some((kind, t.location)),
        _ => None,
    })
}
