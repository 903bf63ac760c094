//! Builtin globals and methods on strings, lists, maps and numbers.
//!
//! Builtins are consulted before the host hooks, so a host cannot shadow
//! `"abc".length` or `Math.max`.

use indexmap::IndexMap;
use serde_json::ser::PrettyFormatter;
use stencil_foundation::coercion::{format_number, strict_equals, to_boolean, to_display_string, to_number};
use stencil_foundation::{ListRef, Value};

use crate::error::{Result, RuntimeError, type_error};
use crate::interpreter::{Interpreter, describe};

/// Global names that resolve without being declared.
const GLOBAL_OBJECTS: &[&str] = &[
    "Math", "JSON", "console", "Object", "Array", "String", "Number", "parseInt", "parseFloat",
    "isNaN",
];

/// Value of an undeclared global identifier, if it names one.
pub(crate) fn global(name: &str) -> Option<Value> {
    match name {
        "NaN" => Some(Value::Number(f64::NAN)),
        "Infinity" => Some(Value::Number(f64::INFINITY)),
        _ if GLOBAL_OBJECTS.contains(&name) => Some(Value::host_ref(name)),
        _ => None,
    }
}

impl Interpreter<'_> {
    pub(crate) fn builtin_property(&self, object: &Value, name: &str) -> Option<Value> {
        match (object, name) {
            (Value::Str(s), "length") => Some(Value::Int(s.chars().count() as i64)),
            (Value::List(items), "length") => Some(Value::Int(items.read().len() as i64)),
            (Value::Function(function), "name") => {
                Some(Value::from(function.name().unwrap_or_default()))
            }
            (Value::HostRef(path), _) if path.as_ref() == "Math" => match name {
                "PI" => Some(Value::Number(std::f64::consts::PI)),
                "E" => Some(Value::Number(std::f64::consts::E)),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn call_builtin_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        match receiver {
            Value::Str(s) => string_method(s, method, args),
            Value::List(items) => self.list_method(items, method, args),
            Value::Int(_) | Value::Number(_) => Ok(number_method(to_number(receiver), method, args)),
            _ => Ok(None),
        }
    }

    fn list_method(&mut self, list: &ListRef, method: &str, args: &[Value]) -> Result<Option<Value>> {
        let value = match method {
            "push" => {
                let mut items = list.write();
                items.extend(args.iter().cloned());
                Value::Int(items.len() as i64)
            }
            "pop" => list.write().pop().unwrap_or_default(),
            "join" => {
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(sep) => to_display_string(sep),
                };
                let items = list.read();
                let rendered: Vec<String> = items
                    .iter()
                    .map(|item| {
                        if item.is_nullish() {
                            String::new()
                        } else {
                            to_display_string(item)
                        }
                    })
                    .collect();
                Value::from(rendered.join(&separator))
            }
            "includes" => {
                let needle = arg(args, 0);
                Value::Bool(list.read().iter().any(|item| strict_equals(item, &needle)))
            }
            "indexOf" => {
                let needle = arg(args, 0);
                let position = list.read().iter().position(|item| strict_equals(item, &needle));
                Value::Int(position.map_or(-1, |p| p as i64))
            }
            "slice" => {
                let items = list.read();
                let start = relative_index(args.first(), items.len(), 0);
                let end = relative_index(args.get(1), items.len(), items.len());
                Value::list(items.get(start..end.max(start)).unwrap_or_default().to_vec())
            }
            "reverse" => {
                list.write().reverse();
                Value::List(list.clone())
            }
            "concat" => {
                let mut items = list.read().clone();
                for value in args {
                    match value {
                        Value::List(other) => items.extend(other.read().iter().cloned()),
                        other => items.push(other.clone()),
                    }
                }
                Value::list(items)
            }
            "map" | "filter" | "forEach" | "find" | "some" | "every" => {
                return self.list_callback(list, method, args).map(Some);
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Higher-order list methods. Iterates a snapshot, so the callback may
    /// mutate the list.
    fn list_callback(&mut self, list: &ListRef, method: &str, args: &[Value]) -> Result<Value> {
        let callback = arg(args, 0);
        if !matches!(callback, Value::Function(_)) {
            return Err(type_error(format!("{} is not a function", describe(&callback))));
        }
        let items = list.read().clone();
        let mut mapped = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            let result = self.invoke(&callback, vec![item.clone(), Value::Int(index as i64)])?;
            match method {
                "map" => mapped.push(result),
                "filter" if to_boolean(&result) => mapped.push(item),
                "find" if to_boolean(&result) => return Ok(item),
                "some" if to_boolean(&result) => return Ok(Value::Bool(true)),
                "every" if !to_boolean(&result) => return Ok(Value::Bool(false)),
                _ => {}
            }
        }

        Ok(match method {
            "map" | "filter" => Value::list(mapped),
            "some" => Value::Bool(false),
            "every" => Value::Bool(true),
            _ => Value::Undefined,
        })
    }

    /// Builtin global functions, addressed by dotted path (`Math.max`).
    pub(crate) fn call_global(&mut self, path: &str, args: &[Value]) -> Result<Option<Value>> {
        let first = arg(args, 0);
        let value = match path {
            "String" => Value::from(args.first().map(to_display_string).unwrap_or_default()),
            "Number" => args.first().map_or(Value::Int(0), |v| Value::number(to_number(v))),
            "parseInt" => Value::number(parse_int(&to_display_string(&first), args.get(1))),
            "parseFloat" => Value::number(parse_float(&to_display_string(&first))),
            "isNaN" => Value::Bool(to_number(&first).is_nan()),
            "Array.isArray" => Value::Bool(matches!(first, Value::List(_))),
            "Object.keys" | "Object.values" | "Object.entries" => object_listing(path, &first),
            "JSON.stringify" => return stringify(&first, args.get(2)).map(Some),
            "JSON.parse" => {
                let json: serde_json::Value = serde_json::from_str(&to_display_string(&first))
                    .map_err(|err| RuntimeError::Syntax(format!("JSON.parse: {err}")))?;
                from_json(json)
            }
            "console.log" | "console.info" | "console.warn" | "console.error" => {
                let line: Vec<String> = args.iter().map(to_display_string).collect();
                tracing::info!(target: "stencil_script::console", "{}", line.join(" "));
                Value::Undefined
            }
            _ => match path.strip_prefix("Math.") {
                Some(function) => match math(function, args) {
                    Some(value) => value,
                    None => return Ok(None),
                },
                None => return Ok(None),
            },
        };
        Ok(Some(value))
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Resolve a possibly negative `slice` index against `len`.
fn relative_index(index: Option<&Value>, len: usize, default: usize) -> usize {
    let Some(value) = index.filter(|v| !matches!(v, Value::Undefined)) else {
        return default;
    };
    let n = to_number(value);
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn clamp_index(index: Option<&Value>, len: usize, default: usize) -> usize {
    match index {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = to_number(value);
            if n.is_nan() { 0 } else { n.trunc().clamp(0.0, len as f64) as usize }
        }
    }
}

fn char_slice(chars: &[char], start: usize, end: usize) -> Value {
    Value::from(chars.get(start..end.max(start)).unwrap_or_default().iter().collect::<String>())
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Option<Value>> {
    let text_arg = |index: usize| args.get(index).map(to_display_string).unwrap_or_default();
    let value = match method {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "toString" => Value::from(s),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::from(s)],
                Some(sep) => {
                    let sep = to_display_string(sep);
                    if sep.is_empty() {
                        s.chars().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::list(parts)
        }
        "replace" => Value::from(s.replacen(&text_arg(0), &text_arg(1), 1)),
        "replaceAll" => Value::from(s.replace(&text_arg(0), &text_arg(1))),
        "includes" => Value::Bool(s.contains(&text_arg(0))),
        "startsWith" => Value::Bool(s.starts_with(&text_arg(0))),
        "endsWith" => Value::Bool(s.ends_with(&text_arg(0))),
        "indexOf" => {
            let position = s
                .find(&text_arg(0))
                .map_or(-1, |byte| s[..byte].chars().count() as i64);
            Value::Int(position)
        }
        "charAt" => {
            let index = to_number(&arg(args, 0));
            let c = (index >= 0.0).then(|| s.chars().nth(index as usize)).flatten();
            Value::from(c.map(String::from).unwrap_or_default())
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(args.first(), chars.len(), 0);
            let end = relative_index(args.get(1), chars.len(), chars.len());
            char_slice(&chars, start, end)
        }
        "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let a = clamp_index(args.first(), chars.len(), 0);
            let b = clamp_index(args.get(1), chars.len(), chars.len());
            char_slice(&chars, a.min(b), a.max(b))
        }
        "padStart" | "padEnd" => {
            let target = to_number(&arg(args, 0));
            let fill = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(v) => to_display_string(v),
            };
            let len = s.chars().count();
            if target.is_nan() || target as usize <= len || fill.is_empty() {
                Value::from(s)
            } else {
                let padding: String = fill.chars().cycle().take(target as usize - len).collect();
                if method == "padStart" {
                    Value::from(padding + s)
                } else {
                    Value::from(format!("{s}{padding}"))
                }
            }
        }
        "repeat" => {
            let count = to_number(&arg(args, 0));
            if count < 0.0 || count.is_infinite() {
                return Err(RuntimeError::Range(format!("invalid count value: {count}")).into());
            }
            Value::from(s.repeat(if count.is_nan() { 0 } else { count as usize }))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn number_method(n: f64, method: &str, args: &[Value]) -> Option<Value> {
    match method {
        "toFixed" => {
            let digits = to_number(&arg(args, 0));
            let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
            Some(Value::from(format!("{n:.digits$}")))
        }
        "toString" => Some(Value::from(format_number(n))),
        _ => None,
    }
}

fn math(function: &str, args: &[Value]) -> Option<Value> {
    let x = to_number(&arg(args, 0));
    let n = match function {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => (x + 0.5).floor(),
        "trunc" => x.trunc(),
        "abs" => x.abs(),
        "sqrt" => x.sqrt(),
        "pow" => x.powf(to_number(&arg(args, 1))),
        "min" => args
            .iter()
            .map(to_number)
            .fold(f64::INFINITY, |acc, v| if acc.is_nan() || v.is_nan() { f64::NAN } else { acc.min(v) }),
        "max" => args
            .iter()
            .map(to_number)
            .fold(f64::NEG_INFINITY, |acc, v| if acc.is_nan() || v.is_nan() { f64::NAN } else { acc.max(v) }),
        _ => return None,
    };
    Some(Value::number(n))
}

fn parse_int(text: &str, radix: Option<&Value>) -> f64 {
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }

    let mut radix = radix.map(to_number).filter(|r| !r.is_nan() && *r != 0.0).map_or(0, |r| r as u32);
    if (radix == 0 || radix == 16) && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let mut value = 0.0;
    let mut any = false;
    for digit in s.chars().map_while(|c| c.to_digit(radix)) {
        value = value * radix as f64 + digit as f64;
        any = true;
    }
    match (any, negative) {
        (false, _) => f64::NAN,
        (true, true) => -value,
        (true, false) => value,
    }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return f64::NAN;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            end = exp;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

fn object_listing(path: &str, object: &Value) -> Value {
    let Value::Map(map) = object else {
        return Value::list(Vec::new());
    };
    let map = map.read();
    let items = map
        .iter()
        .map(|(key, value)| match path {
            "Object.keys" => Value::from(key.as_str()),
            "Object.values" => value.clone(),
            _ => Value::list(vec![Value::from(key.as_str()), value.clone()]),
        })
        .collect();
    Value::list(items)
}

/// JSON form of a value. `None` for values JSON cannot hold (`undefined`,
/// functions), which objects omit and lists render as `null`.
fn to_json(value: &Value) -> Option<serde_json::Value> {
    Some(match value {
        Value::Undefined | Value::HostRef(_) | Value::Function(_) => return None,
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::List(items) => serde_json::Value::Array(
            items
                .read()
                .iter()
                .map(|item| to_json(item).unwrap_or(serde_json::Value::Null))
                .collect(),
        ),
        Value::Map(map) => serde_json::Value::Object(
            map.read()
                .iter()
                .filter_map(|(key, value)| to_json(value).map(|v| (key.clone(), v)))
                .collect(),
        ),
    })
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::number(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(items) => Value::list(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(entries) => Value::map(
            entries
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect::<IndexMap<_, _>>(),
        ),
    }
}

fn stringify(value: &Value, indent: Option<&Value>) -> Result<Value> {
    let Some(json) = to_json(value) else {
        return Ok(Value::Undefined);
    };
    let indent = match indent {
        Some(Value::Str(s)) => s.to_string(),
        Some(v) if v.is_number() => " ".repeat(to_number(v).clamp(0.0, 10.0) as usize),
        _ => String::new(),
    };
    if indent.is_empty() {
        return serde_json::to_string(&json)
            .map(Value::from)
            .map_err(|err| type_error(format!("JSON.stringify: {err}")));
    }

    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(&json, &mut serializer)
        .map_err(|err| type_error(format!("JSON.stringify: {err}")))?;
    Ok(Value::from(String::from_utf8_lossy(&out).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("  42px", None), 42.0);
        assert_eq!(parse_int("-0x1f", None), -31.0);
        assert_eq!(parse_int("101", Some(&Value::Int(2))), 5.0);
        assert!(parse_int("px", None).is_nan());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("3.25em"), 3.25);
        assert_eq!(parse_float("-1e3x"), -1000.0);
        assert_eq!(parse_float(".5"), 0.5);
        assert!(parse_float("abc").is_nan());
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_string_methods() {
        let call = |s: &str, m: &str, args: &[Value]| {
            string_method(s, m, args).unwrap().unwrap().to_string()
        };
        assert_eq!(call("abc", "toUpperCase", &[]), "ABC");
        assert_eq!(call("hello", "slice", &[Value::Int(-3)]), "llo");
        assert_eq!(call("hello", "substring", &[Value::Int(3), Value::Int(1)]), "el");
        assert_eq!(call("5", "padStart", &[Value::Int(3), Value::from("0")]), "005");
        assert_eq!(call("a-b-c", "split", &[Value::from("-")]), "a,b,c");
        assert_eq!(call("aaa", "replace", &[Value::from("a"), Value::from("b")]), "baa");
        assert_eq!(call("héllo", "indexOf", &[Value::from("l")]), "2");
        assert!(string_method("x", "nope", &[]).unwrap().is_none());
    }

    #[test]
    fn test_math() {
        assert_eq!(math("max", &[Value::Int(1), Value::Int(5), Value::Int(3)]).unwrap().to_string(), "5");
        assert_eq!(math("round", &[Value::Number(2.5)]).unwrap().to_string(), "3");
        assert_eq!(math("round", &[Value::Number(-2.5)]).unwrap().to_string(), "-2");
        assert_eq!(math("min", &[]).unwrap().to_string(), "Infinity");
    }

    #[test]
    fn test_json_keeps_key_order() {
        let mut entries = IndexMap::new();
        entries.insert("b".to_string(), Value::Int(1));
        entries.insert("a".to_string(), Value::list(vec![Value::Undefined, Value::from("x")]));
        entries.insert("skip".to_string(), Value::Undefined);
        let text = stringify(&Value::map(entries), None).unwrap();
        assert_eq!(text.to_string(), r#"{"b":1,"a":[null,"x"]}"#);
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(number_method(3.14159, "toFixed", &[Value::Int(2)]).unwrap().to_string(), "3.14");
    }
}
