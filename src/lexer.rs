// src/lexer.rs
use crate::errors::{JsltError, Location, Result};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Int(i64),
    Decimal(f64),
    Str(String),
    /// Bare name; keywords are recognized by the parser.
    Ident(String),
    /// `prefix:name`
    Qualified(String, String),
    /// `$name`
    Var(String),
    /// `.` not followed by a key
    Dot,
    /// `.name` or `."quoted name"`
    DotKey(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Assign,
    Pipe,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl Tok {
    pub(crate) fn describe(&self) -> String {
        let fixed = match self {
            Tok::Int(i) => return i.to_string(),
            Tok::Decimal(d) => return d.to_string(),
            Tok::Str(s) => return format!("\"{s}\""),
            Tok::Ident(s) => return s.clone(),
            Tok::Qualified(p, n) => return format!("{p}:{n}"),
            Tok::Var(v) => return format!("${v}"),
            Tok::DotKey(k) => return format!(".{k}"),
            Tok::Dot => ".",
            Tok::LParen => "(",
            Tok::RParen => ")",
            Tok::LBracket => "[",
            Tok::RBracket => "]",
            Tok::LBrace => "{",
            Tok::RBrace => "}",
            Tok::Comma => ",",
            Tok::Colon => ":",
            Tok::Assign => "=",
            Tok::Pipe => "|",
            Tok::Plus => "+",
            Tok::Minus => "-",
            Tok::Star => "*",
            Tok::Slash => "/",
            Tok::Percent => "%",
            Tok::Eq => "==",
            Tok::Ne => "!=",
            Tok::Lt => "<",
            Tok::Le => "<=",
            Tok::Gt => ">",
            Tok::Ge => ">=",
            Tok::Eof => "end of input",
        };
        fixed.to_string()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: u32,
    pub column: u32,
}

pub(crate) fn tokenize(src: &str, source: &Arc<str>) -> Result<Vec<Token>> {
    let mut lx = Lexer { s: src, i: 0, line: 1, column: 1, source };
    let mut out = Vec::new();
    loop {
        lx.skip_ws_and_comments();
        let (line, column) = (lx.line, lx.column);
        let tok = lx.next_tok()?;
        let done = tok == Tok::Eof;
        out.push(Token { tok, line, column });
        if done {
            return Ok(out);
        }
    }
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c == '-' || c.is_ascii_alphanumeric()
}

struct Lexer<'a> {
    s: &'a str,
    i: usize,
    line: u32,
    column: u32,
    source: &'a Arc<str>,
}

impl<'a> Lexer<'a> {
    fn error(&self, message: impl Into<String>) -> JsltError {
        JsltError::syntax(message, Location::new(self.source.clone(), self.line, self.column))
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.s[self.i..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.i += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        let start = self.i;
        match self.peek_char() {
            Some(c) if is_name_start(c) => {
                self.bump();
            }
            _ => return Err(self.error("identifier expected")),
        }
        while self.peek_char().is_some_and(is_name_char) {
            self.bump();
        }
        Ok(self.s[start..self.i].to_string())
    }

    fn next_tok(&mut self) -> Result<Tok> {
        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Tok::Eof),
        };
        if c == '"' {
            return Ok(Tok::Str(self.parse_quoted_string()?));
        }
        if c.is_ascii_digit() {
            return self.parse_number_literal();
        }
        if is_name_start(c) {
            let name = self.parse_identifier()?;
            if self.peek_char() == Some(':') && self.peek_second().is_some_and(is_name_start) {
                self.bump();
                let member = self.parse_identifier()?;
                return Ok(Tok::Qualified(name, member));
            }
            return Ok(Tok::Ident(name));
        }
        let (line, column) = (self.line, self.column);
        self.bump();
        let tok = match c {
            '$' => Tok::Var(self.parse_identifier()?),
            '.' => match self.peek_char() {
                Some(n) if is_name_start(n) => Tok::DotKey(self.parse_identifier()?),
                Some('"') => Tok::DotKey(self.parse_quoted_string()?),
                _ => Tok::Dot,
            },
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            ':' => Tok::Colon,
            '|' => Tok::Pipe,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '=' if self.consume_char('=') => Tok::Eq,
            '=' => Tok::Assign,
            '!' if self.consume_char('=') => Tok::Ne,
            '<' if self.consume_char('=') => Tok::Le,
            '<' => Tok::Lt,
            '>' if self.consume_char('=') => Tok::Ge,
            '>' => Tok::Gt,
            other => {
                let at = Location::new(self.source.clone(), line, column);
                return Err(JsltError::syntax(format!("unexpected character '{other}'"), at));
            }
        };
        Ok(tok)
    }

    fn skip_digits(&mut self) -> usize {
        let start = self.i;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.i - start
    }

    fn parse_number_literal(&mut self) -> Result<Tok> {
        let start = self.i;
        self.skip_digits();
        let mut integral = true;
        if self.peek_char() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            integral = false;
            self.bump();
            self.skip_digits();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            integral = false;
            self.bump();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.bump();
            }
            if self.skip_digits() == 0 {
                return Err(self.error("bad exponent"));
            }
        }
        let s = &self.s[start..self.i];
        if integral {
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Tok::Int(i));
            }
        }
        s.parse::<f64>().map(Tok::Decimal).map_err(|_| self.error("bad number"))
    }

    fn parse_quoted_string(&mut self) -> Result<String> {
        self.bump();
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let nc = self.bump().ok_or_else(|| self.error("unterminated string"))?;
                    match nc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '/' => out.push('/'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        'u' => out.push(self.parse_unicode_escape()?),
                        other => return Err(self.error(format!("invalid escape '\\{other}'"))),
                    }
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    fn hex4(&mut self) -> Result<u32> {
        let digits = self.s.get(self.i..self.i + 4).ok_or_else(|| self.error("bad unicode escape"))?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(self.error("bad unicode escape"));
        }
        let code = u32::from_str_radix(digits, 16).map_err(|_| self.error("bad unicode escape"))?;
        for _ in 0..4 {
            self.bump();
        }
        Ok(code)
    }

    fn parse_unicode_escape(&mut self) -> Result<char> {
        let hi = self.hex4()?;
        let code = if (0xD800..0xDC00).contains(&hi) {
            if !(self.consume_char('\\') && self.consume_char('u')) {
                return Err(self.error("unpaired surrogate"));
            }
            let lo = self.hex4()?;
            if !(0xDC00..0xE000).contains(&lo) {
                return Err(self.error("unpaired surrogate"));
            }
            0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
        } else {
            hi
        };
        char::from_u32(code).ok_or_else(|| self.error("bad unicode escape"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src, &Arc::from("test")).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn chains_and_names() {
        assert_eq!(
            toks(r#".foo."a b"[0] $x is-number(.) m:f()"#),
            vec![
                Tok::DotKey("foo".into()),
                Tok::DotKey("a b".into()),
                Tok::LBracket,
                Tok::Int(0),
                Tok::RBracket,
                Tok::Var("x".into()),
                Tok::Ident("is-number".into()),
                Tok::LParen,
                Tok::Dot,
                Tok::RParen,
                Tok::Qualified("m".into(), "f".into()),
                Tok::LParen,
                Tok::RParen,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_discarded() {
        assert_eq!(toks("1 // one\n+ 2.5"), vec![Tok::Int(1), Tok::Plus, Tok::Decimal(2.5), Tok::Eof]);
    }

    #[test]
    fn operators() {
        assert_eq!(
            toks("== != <= >= < > = |"),
            vec![Tok::Eq, Tok::Ne, Tok::Le, Tok::Ge, Tok::Lt, Tok::Gt, Tok::Assign, Tok::Pipe, Tok::Eof]
        );
    }

    #[test]
    fn positions_are_tracked() {
        let t = tokenize("let\n  x", &Arc::from("p")).unwrap();
        assert_eq!((t[1].line, t[1].column), (2, 3));
    }

    #[test]
    fn unicode_escapes() {
        assert_eq!(toks(r#""\u0041\ud83d\ude00""#), vec![Tok::Str("A\u{1F600}".into()), Tok::Eof]);
        for bad in [r#""\u+041""#, r#""\ud800\u0041""#, r#""\ud800x""#] {
            assert!(tokenize(bad, &Arc::from("p")).is_err(), "{bad}");
        }
    }

    #[test]
    fn bad_character_is_a_syntax_error() {
        let err = tokenize("1 # 2", &Arc::from("p")).unwrap_err();
        assert!(matches!(err, JsltError::Syntax { .. }));
        assert_eq!(err.location().map(|l| l.column), Some(3));
    }
}
