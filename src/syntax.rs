//! Concrete syntax tree: one node per grammar production, discarded once
//! the compiler has lowered it.

use crate::errors::Location;

#[derive(Debug, Clone)]
pub(crate) struct SourceUnit {
    pub imports: Vec<Import>,
    pub lets: Vec<LetDecl>,
    pub defs: Vec<FunctionDef>,
    pub body: Option<Expr>,
}

#[derive(Debug, Clone)]
pub(crate) struct Import {
    pub path: String,
    pub prefix: String,
    pub at: Location,
}

#[derive(Debug, Clone)]
pub(crate) struct LetDecl {
    pub name: String,
    pub value: Expr,
    pub at: Location,
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub lets: Vec<LetDecl>,
    pub body: Expr,
    pub at: Location,
}

#[derive(Debug, Clone)]
pub(crate) struct Expr {
    pub kind: ExprKind,
    pub at: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone)]
pub(crate) enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Str(String),
    Chain { head: ChainHead, links: Vec<ChainLink> },
    Array(Vec<Expr>),
    ArrayFor { source: Box<Expr>, lets: Vec<LetDecl>, body: Box<Expr>, cond: Option<Box<Expr>> },
    Object { lets: Vec<LetDecl>, pairs: Vec<Pair>, matcher: Option<Matcher> },
    ObjectFor {
        source: Box<Expr>,
        lets: Vec<LetDecl>,
        key: Box<Expr>,
        value: Box<Expr>,
        cond: Option<Box<Expr>>,
    },
    If {
        cond: Box<Expr>,
        then_lets: Vec<LetDecl>,
        then: Box<Expr>,
        else_lets: Vec<LetDecl>,
        otherwise: Option<Box<Expr>>,
    },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Pipe { lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone)]
pub(crate) enum ChainHead {
    /// `.`, the current value
    Dot,
    Variable(String),
    Call { prefix: Option<String>, name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone)]
pub(crate) enum ChainLink {
    Key { key: String, at: Location },
    Index { index: Box<Expr>, at: Location },
    Slice { start: Option<Box<Expr>>, end: Option<Box<Expr>>, at: Location },
}

#[derive(Debug, Clone)]
pub(crate) struct Pair {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub(crate) struct Matcher {
    pub minus: Vec<String>,
    pub value: Box<Expr>,
    pub at: Location,
}
