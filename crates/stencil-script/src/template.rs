//! Template literal interpolation.
//!
//! The lexer keeps backtick bodies raw; this splits them into literal text
//! (unescaped) and `${...}` expression sources at evaluation time.

use stencil_lexer::unescape;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart<'a> {
    Text(String),
    Expr(&'a str),
}

/// Split a raw template body. Errors name the first malformed `${`.
pub fn split_template(raw: &str) -> Result<Vec<TemplatePart<'_>>, String> {
    let bytes = raw.as_bytes();
    let mut parts = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'$' if bytes.get(pos + 1) == Some(&b'{') => {
                if text_start < pos {
                    parts.push(TemplatePart::Text(unescape(&raw[text_start..pos])));
                }
                let expr_start = pos + 2;
                let expr_end = matching_brace(bytes, expr_start)
                    .ok_or_else(|| format!("unterminated '${{' at offset {pos}"))?;
                let source = raw[expr_start..expr_end].trim();
                if source.is_empty() {
                    return Err(format!("empty '${{}}' at offset {pos}"));
                }
                parts.push(TemplatePart::Expr(source));
                pos = expr_end + 1;
                text_start = pos;
            }
            _ => pos += 1,
        }
    }

    if text_start < raw.len() {
        parts.push(TemplatePart::Text(unescape(&raw[text_start..])));
    }
    Ok(parts)
}

/// Offset of the `}` closing an interpolation opened just before `start`.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<u8> = None;
    let mut pos = start;

    while pos < bytes.len() {
        let b = bytes[pos];
        match quote {
            Some(_) if b == b'\\' => pos += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(pos);
                    }
                }
                _ => {}
            },
        }
        pos += 1;
    }
    None
}
