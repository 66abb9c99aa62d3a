//! Compiled expression tree and the public handles around it.

use crate::engine;
use crate::errors::{Location, Result};
use crate::filter::ObjectFilter;
use crate::functions::{Function, Macro};
use crate::syntax::BinaryOp;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub(crate) struct Binding {
    pub name: Arc<str>,
    pub value: Node,
}

pub(crate) struct ObjectPair {
    pub key: Node,
    pub value: Node,
}

pub(crate) struct MatcherNode {
    pub minus: HashSet<String>,
    pub value: Box<Node>,
    pub at: Location,
}

/// What a call site invokes. Resolved once, at compile time.
#[derive(Clone)]
pub(crate) enum Callee {
    /// Index into the enclosing program's declared functions.
    Local(usize),
    Function(Arc<dyn Function>),
    Macro(Arc<dyn Macro>),
    Imported { module: Arc<Program>, index: usize },
    /// `prefix(arg)`: the module's body with `.` bound to the argument.
    ModuleBody(Arc<Program>),
    Unknown,
}

pub(crate) enum Node {
    Literal(Value),
    Current,
    Variable { name: Arc<str>, at: Location },
    Key { base: Box<Node>, key: Arc<str>, at: Location },
    Index { base: Box<Node>, index: Box<Node>, at: Location },
    Slice { base: Box<Node>, start: Option<Box<Node>>, end: Option<Box<Node>>, at: Location },
    If { cond: Box<Node>, then_lets: Vec<Binding>, then: Box<Node>, else_lets: Vec<Binding>, otherwise: Option<Box<Node>> },
    ArrayFor { source: Box<Node>, lets: Vec<Binding>, body: Box<Node>, cond: Option<Box<Node>>, at: Location },
    ObjectFor {
        source: Box<Node>,
        lets: Vec<Binding>,
        key: Box<Node>,
        value: Box<Node>,
        cond: Option<Box<Node>>,
        at: Location,
    },
    Object { lets: Vec<Binding>, pairs: Vec<ObjectPair>, matcher: Option<MatcherNode>, at: Location },
    Array(Vec<Node>),
    Binary { op: BinaryOp, lhs: Box<Node>, rhs: Box<Node>, at: Location },
    Pipe { lhs: Box<Node>, rhs: Box<Node> },
    Call { name: Arc<str>, callee: Callee, args: Vec<Node>, at: Location },
}

pub(crate) struct UserFunction {
    pub name: Arc<str>,
    pub params: Vec<Arc<str>>,
    pub lets: Vec<Binding>,
    pub body: Node,
}

/// A compiled source unit: a main program or an imported module.
pub(crate) struct Program {
    pub source: Arc<str>,
    pub lets: Vec<Binding>,
    pub functions: Vec<UserFunction>,
    pub body: Option<Node>,
}

impl Program {
    pub(crate) fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| &*f.name == name)
    }
}

/// A compiled JSLT program. Immutable; clone it freely and apply it from any
/// number of threads.
#[derive(Clone)]
pub struct Expression {
    pub(crate) program: Arc<Program>,
    pub(crate) filter: Arc<dyn ObjectFilter>,
    pub(crate) max_call_depth: usize,
}

impl Expression {
    pub fn apply(&self, input: &Value) -> Result<Value> {
        self.apply_with(&HashMap::new(), input)
    }

    /// Apply with caller-supplied variables, visible as `$name`.
    pub fn apply_with(&self, variables: &HashMap<String, Value>, input: &Value) -> Result<Value> {
        trace!(source = %self.program.source, variables = variables.len(), "apply");
        engine::run(&self.program, variables, input, &*self.filter, self.max_call_depth)
    }

    /// Convenience for `serde_json` callers. The input is cloned once and
    /// wrapped as a document, without building a value tree from it.
    pub fn apply_json(&self, input: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(self.apply(&Value::wrap(input.clone()))?.to_json())
    }

    pub fn source_name(&self) -> &str {
        &self.program.source
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.program.source)
            .field("functions", &self.program.functions.len())
            .finish()
    }
}

/// A compiled module, for binding under an import name without resolving.
#[derive(Clone)]
pub struct Module {
    pub(crate) program: Arc<Program>,
}

impl Module {
    /// Names of the functions the module declares.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.program.functions.iter().map(|f| &*f.name)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("source", &self.program.source).finish()
    }
}
