//! Streaming JSON reader and writer for [`Value`].
//!
//! The reader walks the raw bytes once and builds tree values directly, so a
//! buffer holding many concatenated documents can be evaluated one document
//! at a time without an intermediate `serde_json::Value`.

use crate::errors::{JsltError, Location, Result};
use crate::value::{ArrayBuilder, Kind, ObjectBuilder, Value};
use std::sync::Arc;

const MAX_DEPTH: usize = 512;

/// Parse exactly one JSON document.
pub fn parse(text: &str) -> Result<Value> {
    let mut reader = Reader::new(text);
    let value = reader.parse_value(0)?;
    reader.skip_ws();
    if !reader.eof() {
        return Err(reader.error("trailing characters after JSON document"));
    }
    Ok(value)
}

/// Iterator over whitespace-separated JSON documents in one buffer.
pub struct Reader<'a> {
    text: &'a str,
    s: &'a [u8],
    i: usize,
    source: Arc<str>,
    failed: bool,
}

impl<'a> Reader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, s: text.as_bytes(), i: 0, source: Arc::from("<json>"), failed: false }
    }

    pub fn with_source_name(mut self, name: &str) -> Self {
        self.source = Arc::from(name);
        self
    }

    fn error(&self, message: impl Into<String>) -> JsltError {
        let consumed = self.text.get(..self.i).unwrap_or(self.text);
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        JsltError::syntax(message, Location::new(self.source.clone(), line as u32, column as u32))
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.i).copied()
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.peek() == Some(b) {
            self.i += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", b as char)))
        }
    }

    fn literal(&mut self, word: &str, v: Value) -> Result<Value> {
        if self.s[self.i..].starts_with(word.as_bytes()) {
            self.i += word.len();
            Ok(v)
        } else {
            Err(self.error("invalid literal"))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(self.error("document nested too deeply"));
        }
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_object(depth),
            Some(b'[') => self.parse_array(depth),
            Some(b'"') => Ok(Value::from(self.parse_string()?)),
            Some(b't') => self.literal("true", Value::from(true)),
            Some(b'f') => self.literal("false", Value::from(false)),
            Some(b'n') => self.literal("null", Value::null()),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_number(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<Value> {
        self.expect(b'{')?;
        let mut obj = ObjectBuilder::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.i += 1;
            return Ok(obj.build());
        }
        loop {
            self.skip_ws();
            if self.peek() != Some(b'"') {
                return Err(self.error("expected object key"));
            }
            let key = self.parse_string()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.parse_value(depth + 1)?;
            obj.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.i += 1,
                Some(b'}') => {
                    self.i += 1;
                    return Ok(obj.build());
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<Value> {
        self.expect(b'[')?;
        let mut arr = ArrayBuilder::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.i += 1;
            return Ok(arr.build());
        }
        loop {
            arr.push(self.parse_value(depth + 1)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.i += 1,
                Some(b']') => {
                    self.i += 1;
                    return Ok(arr.build());
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let start = self.i;
        // Fast path: no escapes.
        while let Some(b) = self.peek() {
            match b {
                b'"' => {
                    let s = self.text[start..self.i].to_string();
                    self.i += 1;
                    return Ok(s);
                }
                b'\\' => break,
                b if b < 0x20 => return Err(self.error("control character in string")),
                _ => self.i += 1,
            }
        }
        let mut out = String::from(&self.text[start..self.i]);
        loop {
            let run = self.i;
            while let Some(b) = self.peek() {
                if b == b'"' || b == b'\\' || b < 0x20 {
                    break;
                }
                self.i += 1;
            }
            out.push_str(&self.text[run..self.i]);
            match self.peek() {
                Some(b'"') => {
                    self.i += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.i += 1;
                    self.parse_escape(&mut out)?;
                }
                Some(_) => return Err(self.error("control character in string")),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<()> {
        let b = self.peek().ok_or_else(|| self.error("unterminated escape"))?;
        self.i += 1;
        match b {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'u' => {
                let hi = self.parse_hex4()?;
                let code = if (0xD800..0xDC00).contains(&hi) {
                    if !self.s[self.i..].starts_with(b"\\u") {
                        return Err(self.error("unpaired surrogate"));
                    }
                    self.i += 2;
                    let lo = self.parse_hex4()?;
                    if !(0xDC00..0xE000).contains(&lo) {
                        return Err(self.error("unpaired surrogate"));
                    }
                    0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
                } else {
                    hi
                };
                let c = char::from_u32(code).ok_or_else(|| self.error("invalid unicode escape"))?;
                out.push(c);
            }
            _ => return Err(self.error("invalid escape")),
        }
        Ok(())
    }

    fn parse_hex4(&mut self) -> Result<u32> {
        let digits = self
            .text
            .get(self.i..self.i + 4)
            .ok_or_else(|| self.error("truncated unicode escape"))?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(self.error("invalid unicode escape"));
        }
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid unicode escape"))?;
        self.i += 4;
        Ok(code)
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.i;
        let mut integral = true;
        if self.peek() == Some(b'-') {
            self.i += 1;
        }
        match self.peek() {
            Some(b'0') => self.i += 1,
            Some(b) if b.is_ascii_digit() => self.skip_digits(),
            _ => return Err(self.error("invalid number")),
        }
        if self.peek() == Some(b'.') {
            integral = false;
            self.i += 1;
            if !self.peek().is_some_and(|b| b.is_ascii_digit()) {
                return Err(self.error("expected digit after '.'"));
            }
            self.skip_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            integral = false;
            self.i += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.i += 1;
            }
            if !self.peek().is_some_and(|b| b.is_ascii_digit()) {
                return Err(self.error("expected digit in exponent"));
            }
            self.skip_digits();
        }
        let lexeme = &self.text[start..self.i];
        if integral {
            if let Ok(i) = lexeme.parse::<i64>() {
                return Ok(Value::from(i));
            }
        }
        lexeme.parse::<f64>().map(Value::from).map_err(|_| self.error("invalid number"))
    }

    fn skip_digits(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.i += 1;
        }
    }
}

impl Iterator for Reader<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Result<Value>> {
        if self.failed {
            return None;
        }
        self.skip_ws();
        if self.eof() {
            return None;
        }
        let r = self.parse_value(0);
        self.failed = r.is_err();
        Some(r)
    }
}

/// Compact serialization.
pub fn to_string(v: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, v, None, 0);
    out
}

/// Two-space indented serialization.
pub fn to_string_pretty(v: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, v, Some("  "), 0);
    out
}

fn newline(out: &mut String, indent: Option<&str>, level: usize) {
    if let Some(unit) = indent {
        out.push('\n');
        for _ in 0..level {
            out.push_str(unit);
        }
    }
}

fn write_value(out: &mut String, v: &Value, indent: Option<&str>, level: usize) {
    match v.kind() {
        Kind::Null => out.push_str("null"),
        Kind::Boolean => out.push_str(if v.as_bool() == Some(true) { "true" } else { "false" }),
        Kind::Integer => out.push_str(&v.as_i64().unwrap_or_default().to_string()),
        Kind::Decimal => out.push_str(&format_decimal(v.as_f64().unwrap_or(f64::NAN))),
        Kind::String => write_string(out, v.as_str().unwrap_or_default()),
        Kind::Array => {
            if v.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (n, item) in v.elements().enumerate() {
                if n > 0 {
                    out.push(',');
                }
                newline(out, indent, level + 1);
                write_value(out, &item, indent, level + 1);
            }
            newline(out, indent, level);
            out.push(']');
        }
        Kind::Object => {
            if v.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push('{');
            for (n, (key, item)) in v.entries().enumerate() {
                if n > 0 {
                    out.push(',');
                }
                newline(out, indent, level + 1);
                write_string(out, key);
                out.push(':');
                if indent.is_some() {
                    out.push(' ');
                }
                write_value(out, &item, indent, level + 1);
            }
            newline(out, indent, level);
            out.push('}');
        }
    }
}

/// Shortest round-tripping form; whole numbers keep a trailing `.0`.
pub(crate) fn format_decimal(d: f64) -> String {
    if d.is_finite() {
        format!("{d:?}")
    } else {
        "null".to_string()
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_nested_document() {
        let v = parse(r#" {"a": [1, -2.5e1, "x\ny", true, null], "b": {}} "#).unwrap();
        assert_eq!(v, Value::wrap(json!({"a": [1, -25.0, "x\ny", true, null], "b": {}})));
        assert_eq!(v.get("a").and_then(|a| a.at(0)).map(|x| x.kind()), Some(Kind::Integer));
        assert_eq!(v.get("a").and_then(|a| a.at(1)).map(|x| x.kind()), Some(Kind::Decimal));
    }

    #[test]
    fn decodes_surrogate_pairs() {
        let v = parse(r#""\ud83d\ude00 \u00e9""#).unwrap();
        assert_eq!(v.as_str(), Some("\u{1F600} é"));
    }

    #[test]
    fn rejects_malformed_unicode_escapes() {
        assert!(parse(r#""\u+041""#).is_err());
        assert!(parse(r#""\u-041""#).is_err());
        assert!(parse(r#""\ud800\u0041""#).is_err());
    }

    #[test]
    fn reports_position_of_errors() {
        let err = parse("{\n  \"a\": tru\n}").unwrap_err();
        let loc = err.location().cloned().unwrap();
        assert_eq!((loc.line, loc.column), (2, 8));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("1 2").is_err());
        assert!(parse("[1,]").is_err());
        assert!(parse("01").is_err());
    }

    #[test]
    fn streams_many_documents() {
        let docs: Vec<Value> = Reader::new("{\"n\":1}\n{\"n\":2}\n  3").collect::<Result<_>>().unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2], Value::from(3));
    }

    #[test]
    fn writes_compact_and_pretty() {
        let v = parse(r#"{"a":[1,2.0],"b":"q\"","c":{}}"#).unwrap();
        assert_eq!(to_string(&v), r#"{"a":[1,2.0],"b":"q\"","c":{}}"#);
        assert_eq!(to_string_pretty(&v), "{\n  \"a\": [\n    1,\n    2.0\n  ],\n  \"b\": \"q\\\"\",\n  \"c\": {}\n}");
    }

    #[test]
    fn huge_integers_fall_back_to_decimal() {
        let v = parse("123456789012345678901234567890").unwrap();
        assert_eq!(v.kind(), Kind::Decimal);
    }
}
