// src/parser.rs
use crate::engine::with_stack;
use crate::errors::{JsltError, Location, Result};
use crate::lexer::{tokenize, Tok, Token};
use crate::syntax::*;
use std::sync::Arc;

/// Parse a main program; a body expression is mandatory.
pub(crate) fn parse_program(src: &str, source: &Arc<str>) -> Result<SourceUnit> {
    Parser::new(src, source)?.parse_unit(true)
}

/// Parse a module; modules may consist of declarations only.
pub(crate) fn parse_module(src: &str, source: &Arc<str>) -> Result<SourceUnit> {
    Parser::new(src, source)?.parse_unit(false)
}

/// Deepest expression nesting a program may use.
pub(crate) const MAX_NESTING: usize = 512;

struct Parser {
    toks: Vec<Token>,
    i: usize,
    source: Arc<str>,
    depth: usize,
}

impl Parser {
    fn new(src: &str, source: &Arc<str>) -> Result<Self> {
        Ok(Self { toks: tokenize(src, source)?, i: 0, source: source.clone(), depth: 0 })
    }

    fn peek(&self) -> &Tok {
        // tokenize always terminates the stream with Eof
        &self.toks[self.i.min(self.toks.len() - 1)].tok
    }

    fn peek_at(&self, n: usize) -> &Tok {
        &self.toks[(self.i + n).min(self.toks.len() - 1)].tok
    }

    fn loc(&self) -> Location {
        let t = &self.toks[self.i.min(self.toks.len() - 1)];
        Location::new(self.source.clone(), t.line, t.column)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.i < self.toks.len() - 1 {
            self.i += 1;
        }
        tok
    }

    fn error_here(&self, expected: &str) -> JsltError {
        JsltError::syntax(format!("expected {expected}, found {}", self.peek().describe()), self.loc())
    }

    fn expect(&mut self, tok: Tok, expected: &str) -> Result<()> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(expected))
        }
    }

    fn consume(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s == word)
    }

    fn expect_keyword(&mut self, word: &str) -> Result<()> {
        if self.at_keyword(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(&format!("'{word}'")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek().clone() {
            Tok::Ident(name) if !is_reserved(&name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(what)),
        }
    }

    fn parse_unit(&mut self, require_body: bool) -> Result<SourceUnit> {
        let mut imports = Vec::new();
        while self.at_keyword("import") {
            let at = self.loc();
            self.advance();
            let path = match self.advance() {
                Tok::Str(s) => s,
                _ => return Err(JsltError::syntax("expected module name string after 'import'", at)),
            };
            self.expect_keyword("as")?;
            let prefix = self.expect_ident("import prefix")?;
            imports.push(Import { path, prefix, at });
        }

        let mut lets = Vec::new();
        let mut defs = Vec::new();
        loop {
            if self.at_keyword("let") {
                lets.push(self.parse_let()?);
            } else if self.at_keyword("def") {
                defs.push(self.parse_def()?);
            } else {
                break;
            }
        }

        let body = if *self.peek() == Tok::Eof && !require_body {
            None
        } else {
            Some(self.parse_expr()?)
        };
        if *self.peek() != Tok::Eof {
            return Err(self.error_here("end of input"));
        }
        Ok(SourceUnit { imports, lets, defs, body })
    }

    fn parse_let(&mut self) -> Result<LetDecl> {
        let at = self.loc();
        self.expect_keyword("let")?;
        let name = self.expect_ident("variable name")?;
        self.expect(Tok::Assign, "'='")?;
        let value = self.parse_expr()?;
        Ok(LetDecl { name, value, at })
    }

    fn parse_lets(&mut self) -> Result<Vec<LetDecl>> {
        let mut lets = Vec::new();
        while self.at_keyword("let") {
            lets.push(self.parse_let()?);
        }
        Ok(lets)
    }

    fn parse_def(&mut self) -> Result<FunctionDef> {
        let at = self.loc();
        self.expect_keyword("def")?;
        let name = self.expect_ident("function name")?;
        self.expect(Tok::LParen, "'('")?;
        let mut params = Vec::new();
        if *self.peek() != Tok::RParen {
            loop {
                params.push(self.expect_ident("parameter name")?);
                if !self.consume(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')'")?;
        let lets = self.parse_lets()?;
        let body = self.parse_expr()?;
        Ok(FunctionDef { name, params, lets, body, at })
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(JsltError::syntax("expression nested too deeply", self.loc()));
        }
        self.depth += 1;
        let expr = with_stack(|| self.parse_pipe());
        self.depth -= 1;
        expr
    }

    fn parse_pipe(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_or()?;
        while *self.peek() == Tok::Pipe {
            let at = self.loc();
            self.advance();
            let rhs = self.parse_or()?;
            lhs = Expr { kind: ExprKind::Pipe { lhs: Box::new(lhs), rhs: Box::new(rhs) }, at };
        }
        Ok(lhs)
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, at: Location) -> Expr {
        Expr { kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, at }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at_keyword("or") {
            let at = self.loc();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs, at);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.at_keyword("and") {
            let at = self.loc();
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs, at);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Tok::Eq => BinaryOp::Eq,
            Tok::Ne => BinaryOp::Ne,
            Tok::Lt => BinaryOp::Lt,
            Tok::Le => BinaryOp::Le,
            Tok::Gt => BinaryOp::Gt,
            Tok::Ge => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        let at = self.loc();
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Self::binary(op, lhs, rhs, at))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinaryOp::Add,
                Tok::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let at = self.loc();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Self::binary(op, lhs, rhs, at);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_base()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinaryOp::Mul,
                Tok::Slash => BinaryOp::Div,
                Tok::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            let at = self.loc();
            self.advance();
            let rhs = self.parse_base()?;
            lhs = Self::binary(op, lhs, rhs, at);
        }
    }

    fn parse_base(&mut self) -> Result<Expr> {
        let at = self.loc();
        let kind = match self.peek().clone() {
            Tok::Int(i) => {
                self.advance();
                ExprKind::Int(i)
            }
            Tok::Decimal(d) => {
                self.advance();
                ExprKind::Decimal(d)
            }
            Tok::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Tok::Minus => {
                self.advance();
                match self.advance() {
                    Tok::Int(i) => ExprKind::Int(-i),
                    Tok::Decimal(d) => ExprKind::Decimal(-d),
                    _ => return Err(JsltError::syntax("expected number after '-'", at)),
                }
            }
            Tok::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen, "')'")?;
                return Ok(inner);
            }
            Tok::LBrace => return self.parse_object(),
            Tok::LBracket => return self.parse_array(),
            Tok::Ident(word) => match word.as_str() {
                "null" => {
                    self.advance();
                    ExprKind::Null
                }
                "true" | "false" => {
                    self.advance();
                    ExprKind::Bool(word == "true")
                }
                "if" => return self.parse_if(),
                _ if *self.peek_at(1) == Tok::LParen && !is_reserved(&word) => return self.parse_chain(),
                _ => return Err(self.error_here("expression")),
            },
            Tok::Dot | Tok::DotKey(_) | Tok::Var(_) | Tok::Qualified(..) => return self.parse_chain(),
            _ => return Err(self.error_here("expression")),
        };
        Ok(Expr { kind, at })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(Tok::LParen, "'('")?;
        let mut args = Vec::new();
        if self.consume(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.consume(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, "')' or ','")?;
        Ok(args)
    }

    fn parse_chain(&mut self) -> Result<Expr> {
        let at = self.loc();
        let mut links = Vec::new();
        let head = match self.advance() {
            Tok::Dot => ChainHead::Dot,
            Tok::DotKey(key) => {
                links.push(ChainLink::Key { key, at: at.clone() });
                ChainHead::Dot
            }
            Tok::Var(name) => ChainHead::Variable(name),
            Tok::Ident(name) => ChainHead::Call { prefix: None, name, args: self.parse_args()? },
            Tok::Qualified(prefix, name) => {
                let args = self.parse_args()?;
                ChainHead::Call { prefix: Some(prefix), name, args }
            }
            _ => return Err(JsltError::syntax("expected chainable expression", at)),
        };
        loop {
            let link_at = self.loc();
            match self.peek().clone() {
                Tok::DotKey(key) => {
                    self.advance();
                    links.push(ChainLink::Key { key, at: link_at });
                }
                Tok::LBracket => {
                    self.advance();
                    links.push(self.parse_bracket(link_at)?);
                }
                _ => break,
            }
        }
        Ok(Expr { kind: ExprKind::Chain { head, links }, at })
    }

    // After '[': `[i]`, `[a:b]`, `[:b]`, `[a:]`, `[:]`.
    fn parse_bracket(&mut self, at: Location) -> Result<ChainLink> {
        let start = if *self.peek() == Tok::Colon { None } else { Some(Box::new(self.parse_expr()?)) };
        if self.consume(&Tok::Colon) {
            let end = if *self.peek() == Tok::RBracket { None } else { Some(Box::new(self.parse_expr()?)) };
            self.expect(Tok::RBracket, "']'")?;
            return Ok(ChainLink::Slice { start, end, at });
        }
        self.expect(Tok::RBracket, "']' or ':'")?;
        match start {
            Some(index) => Ok(ChainLink::Index { index, at }),
            None => Err(JsltError::syntax("empty index", at)),
        }
    }

    fn parse_if(&mut self) -> Result<Expr> {
        let at = self.loc();
        self.expect_keyword("if")?;
        self.expect(Tok::LParen, "'(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(Tok::RParen, "')'")?;
        let then_lets = self.parse_lets()?;
        let then = self.parse_expr()?;
        let (else_lets, otherwise) = if self.at_keyword("else") {
            self.advance();
            let lets = self.parse_lets()?;
            (lets, Some(Box::new(self.parse_expr()?)))
        } else {
            (Vec::new(), None)
        };
        Ok(Expr {
            kind: ExprKind::If { cond: Box::new(cond), then_lets, then: Box::new(then), else_lets, otherwise },
            at,
        })
    }

    // `for (src)` prefix shared by both comprehensions.
    fn parse_for_source(&mut self) -> Result<Box<Expr>> {
        self.expect_keyword("for")?;
        self.expect(Tok::LParen, "'(' after 'for'")?;
        let source = self.parse_expr()?;
        self.expect(Tok::RParen, "')'")?;
        Ok(Box::new(source))
    }

    fn parse_optional_cond(&mut self) -> Result<Option<Box<Expr>>> {
        if !self.at_keyword("if") {
            return Ok(None);
        }
        self.advance();
        self.expect(Tok::LParen, "'(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(Tok::RParen, "')'")?;
        Ok(Some(Box::new(cond)))
    }

    fn parse_array(&mut self) -> Result<Expr> {
        let at = self.loc();
        self.expect(Tok::LBracket, "'['")?;
        if self.at_keyword("for") {
            let source = self.parse_for_source()?;
            let lets = self.parse_lets()?;
            let body = Box::new(self.parse_expr()?);
            let cond = self.parse_optional_cond()?;
            self.expect(Tok::RBracket, "']'")?;
            return Ok(Expr { kind: ExprKind::ArrayFor { source, lets, body, cond }, at });
        }
        let mut items = Vec::new();
        while *self.peek() != Tok::RBracket {
            items.push(self.parse_expr()?);
            if !self.consume(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBracket, "']' or ','")?;
        Ok(Expr { kind: ExprKind::Array(items), at })
    }

    fn parse_object(&mut self) -> Result<Expr> {
        let at = self.loc();
        self.expect(Tok::LBrace, "'{'")?;
        if self.at_keyword("for") {
            let source = self.parse_for_source()?;
            let lets = self.parse_lets()?;
            let key = Box::new(self.parse_expr()?);
            self.expect(Tok::Colon, "':'")?;
            let value = Box::new(self.parse_expr()?);
            let cond = self.parse_optional_cond()?;
            self.expect(Tok::RBrace, "'}'")?;
            return Ok(Expr { kind: ExprKind::ObjectFor { source, lets, key, value, cond }, at });
        }

        let lets = self.parse_lets()?;
        let mut pairs = Vec::new();
        let mut matcher = None;
        while *self.peek() != Tok::RBrace {
            if *self.peek() == Tok::Star {
                matcher = Some(self.parse_matcher()?);
                break;
            }
            let key = self.parse_expr()?;
            self.expect(Tok::Colon, "':'")?;
            let value = self.parse_expr()?;
            pairs.push(Pair { key, value });
            if !self.consume(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBrace, "'}'")?;
        Ok(Expr { kind: ExprKind::Object { lets, pairs, matcher }, at })
    }

    // `* [- key, key ...] : expr`, always the last entry of an object.
    fn parse_matcher(&mut self) -> Result<Matcher> {
        let at = self.loc();
        self.expect(Tok::Star, "'*'")?;
        let mut minus = Vec::new();
        if self.consume(&Tok::Minus) {
            loop {
                match self.advance() {
                    Tok::Ident(name) | Tok::Str(name) => minus.push(name),
                    _ => return Err(JsltError::syntax("expected key name in matcher exclusion", self.loc())),
                }
                if !self.consume(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::Colon, "':' after matcher")?;
        let value = Box::new(self.parse_expr()?);
        Ok(Matcher { minus, value, at })
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "let" | "def" | "import" | "as" | "if" | "else" | "for" | "and" | "or" | "true" | "false" | "null"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<SourceUnit> {
        parse_program(src, &Arc::from("test"))
    }

    fn body(src: &str) -> ExprKind {
        parse(src).unwrap().body.unwrap().kind
    }

    #[test]
    fn dot_alone_is_an_empty_chain() {
        match body(".") {
            ExprKind::Chain { head: ChainHead::Dot, links } => assert!(links.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chain_links_in_order() {
        match body(r#".a."b c"[1][2:]"#) {
            ExprKind::Chain { links, .. } => {
                assert_eq!(links.len(), 4);
                assert!(matches!(&links[0], ChainLink::Key { key, .. } if key == "a"));
                assert!(matches!(&links[1], ChainLink::Key { key, .. } if key == "b c"));
                assert!(matches!(&links[2], ChainLink::Index { .. }));
                assert!(matches!(&links[3], ChainLink::Slice { start: Some(_), end: None, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn precedence_multiplication_binds_tighter() {
        match body("1 + 2 * 3 == 7") {
            ExprKind::Binary { op: BinaryOp::Eq, lhs, .. } => match lhs.kind {
                ExprKind::Binary { op: BinaryOp::Add, rhs, .. } => {
                    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }))
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn declarations_prefix_the_body() {
        let unit = parse("import \"m\" as m let x = 1 def f(a, b) $a let y = 2 $x").unwrap();
        assert_eq!(unit.imports.len(), 1);
        assert_eq!(unit.lets.len(), 2);
        assert_eq!(unit.defs[0].params, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn object_with_matcher() {
        match body(r#"{ let a = 1 "x": $a, * - y, "z" : . }"#) {
            ExprKind::Object { lets, pairs, matcher } => {
                assert_eq!(lets.len(), 1);
                assert_eq!(pairs.len(), 1);
                assert_eq!(matcher.map(|m| m.minus), Some(vec!["y".to_string(), "z".to_string()]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn comprehensions() {
        assert!(matches!(body("[for (.xs) . * 2 if (. > 1)]"), ExprKind::ArrayFor { cond: Some(_), .. }));
        assert!(matches!(body("{for (.xs) .k : .v}"), ExprKind::ObjectFor { cond: None, .. }));
    }

    #[test]
    fn missing_body_is_a_syntax_error() {
        let err = parse("let x = 1").unwrap_err();
        assert!(matches!(err, JsltError::Syntax { .. }), "{err}");
        assert!(parse_module("def f() 1", &Arc::from("m")).unwrap().body.is_none());
    }

    #[test]
    fn errors_carry_line_and_column() {
        let err = parse("{\n  \"a\": 1,\n  \"b\" 2\n}").unwrap_err();
        let loc = err.location().cloned().unwrap();
        assert_eq!((loc.line, loc.column), (3, 7));
        assert_eq!(&*loc.source, "test");
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(parse("1 2").is_err());
        assert!(parse("foo").is_err());
    }
}
