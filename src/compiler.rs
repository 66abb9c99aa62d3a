// src/compiler.rs
use crate::engine::with_stack;
use crate::errors::{JsltError, Location, Result};
use crate::expression::{Binding, Callee, Expression, MatcherNode, Module, Node, ObjectPair, Program, UserFunction};
use crate::filter::{DefaultFilter, ExpressionFilter, ObjectFilter};
use crate::functions::reflect::{self, FunctionScope};
use crate::functions::{Function, Registry};
use crate::module::{DirectoryResolver, ModuleResolver};
use crate::parser::{parse_module, parse_program};
use crate::syntax::{ChainHead, ChainLink, Expr, ExprKind, LetDecl, SourceUnit};
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Nested user-function calls allowed before evaluation fails.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

const INLINE_SOURCE: &str = "<inline>";

/// Compile-time configuration. Every setting is optional and independent.
///
/// ```
/// let expr = jslt::Compiler::new()
///     .source_name("greeting.jslt")
///     .register_fn("shout", 1..=1, |_, args| {
///         Ok(args[0].as_str().unwrap_or_default().to_uppercase().into())
///     })
///     .compile(r#"shout(.name)"#)
///     .unwrap();
/// let out = expr.apply(&jslt::codec::parse(r#"{"name": "ada"}"#).unwrap()).unwrap();
/// assert_eq!(out, jslt::Value::from("ADA"));
/// ```
#[derive(Clone)]
pub struct Compiler {
    source_name: Option<String>,
    extensions: Registry,
    resolver: Arc<dyn ModuleResolver>,
    modules: HashMap<String, Module>,
    filter: Arc<dyn ObjectFilter>,
    max_call_depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            source_name: None,
            extensions: Registry::new(),
            resolver: Arc::new(DirectoryResolver::default()),
            modules: HashMap::new(),
            filter: Arc::new(DefaultFilter),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name reported in error locations.
    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn register<F: Function + 'static>(mut self, f: F) -> Self {
        self.extensions.register(f);
        self
    }

    pub fn register_fn<F>(mut self, name: &str, arity: RangeInclusive<usize>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.extensions.register_fn(name, arity, f);
        self
    }

    /// Add every entry of `registry` as an extension.
    pub fn functions(mut self, registry: &Registry) -> Self {
        self.extensions.extend(registry);
        self
    }

    /// Bind `member` from the first of `scopes` defining it under the name
    /// `exposed`. Fails on ambiguous or absent members.
    pub fn wrap(mut self, exposed: &str, scopes: &[&FunctionScope], member: &str, params: Option<usize>) -> Result<Self> {
        let f = reflect::wrap(exposed, scopes, member, params)?;
        self.extensions.register_arc(f);
        Ok(self)
    }

    pub fn resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Bind an already compiled module to an import name; the resolver is
    /// not consulted for that name.
    pub fn module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn object_filter(mut self, filter: Arc<dyn ObjectFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Use a JSLT expression as the object filter; pairs whose value makes it
    /// truthy are kept.
    pub fn object_filter_expr(self, source: &str) -> Result<Self> {
        let expr = Compiler::new().source_name("<filter>").compile(source)?;
        Ok(self.object_filter(Arc::new(ExpressionFilter::new(expr))))
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn compile(&self, source: &str) -> Result<Expression> {
        let name: Arc<str> = Arc::from(self.source_name.as_deref().unwrap_or(INLINE_SOURCE));
        self.compile_named(source, name)
    }

    /// Compile a program file. The path becomes the source name unless one
    /// was set explicitly.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Expression> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| JsltError::resource(format!("can't read {}", path.display()), e))?;
        let name: Arc<str> = match &self.source_name {
            Some(n) => Arc::from(n.as_str()),
            None => Arc::from(path.display().to_string()),
        };
        self.compile_named(&text, name)
    }

    /// Compile module source for use with [`Compiler::module`].
    pub fn compile_module(&self, name: &str, source: &str) -> Result<Module> {
        let source_name: Arc<str> = Arc::from(name);
        let unit = parse_module(source, &source_name)?;
        let mut session = Session::new(self);
        session.in_progress.push(name.to_string());
        let program = session.lower_unit(&unit, source_name)?;
        Ok(Module { program: Arc::new(program) })
    }

    fn compile_named(&self, source: &str, name: Arc<str>) -> Result<Expression> {
        debug!(source = %name, "compiling");
        let unit = parse_program(source, &name)?;
        let mut session = Session::new(self);
        let program = session.lower_unit(&unit, name)?;
        debug!(
            source = %program.source,
            functions = program.functions.len(),
            modules = session.cache.len(),
            "compiled"
        );
        Ok(Expression { program: Arc::new(program), filter: self.filter.clone(), max_call_depth: self.max_call_depth })
    }
}

// One compile invocation: module cache and cycle detection live here only.
struct Session<'c> {
    compiler: &'c Compiler,
    registry: Registry,
    cache: HashMap<String, Arc<Program>>,
    in_progress: Vec<String>,
}

impl<'c> Session<'c> {
    fn new(compiler: &'c Compiler) -> Self {
        let mut registry = Registry::with_builtins();
        registry.extend(&compiler.extensions);
        Self { compiler, registry, cache: HashMap::new(), in_progress: Vec::new() }
    }

    fn load(&mut self, path: &str, at: &Location) -> Result<Arc<Program>> {
        if let Some(m) = self.compiler.modules.get(path) {
            return Ok(m.program.clone());
        }
        if let Some(p) = self.cache.get(path) {
            return Ok(p.clone());
        }
        if self.in_progress.iter().any(|p| p == path) {
            let chain = self.in_progress.join(" -> ");
            return Err(JsltError::compile(format!("import cycle: {chain} -> {path}"), Some(at.clone())));
        }
        let text = self.compiler.resolver.resolve(path).map_err(|e| e.or_at(at))?;
        let source: Arc<str> = Arc::from(path);
        let unit = parse_module(&text, &source)?;
        self.in_progress.push(path.to_string());
        let lowered = self.lower_unit(&unit, source);
        self.in_progress.pop();
        let program = Arc::new(lowered?);
        debug!(module = path, functions = program.functions.len(), "resolved module");
        self.cache.insert(path.to_string(), program.clone());
        Ok(program)
    }

    fn lower_unit(&mut self, unit: &SourceUnit, source: Arc<str>) -> Result<Program> {
        let mut imports = HashMap::new();
        for import in &unit.imports {
            if imports.contains_key(&import.prefix) {
                return Err(JsltError::compile(
                    format!("duplicate import prefix '{}'", import.prefix),
                    Some(import.at.clone()),
                ));
            }
            let module = self.load(&import.path, &import.at)?;
            imports.insert(import.prefix.clone(), module);
        }

        // collected up front so declarations can refer to each other in any order
        let mut locals = HashMap::new();
        for (i, def) in unit.defs.iter().enumerate() {
            if locals.insert(def.name.clone(), i).is_some() {
                return Err(JsltError::compile(
                    format!("function '{}' declared twice", def.name),
                    Some(def.at.clone()),
                ));
            }
        }

        let lower = Lowering { locals: &locals, imports: &imports, registry: &self.registry };
        let lets = lower.lets(&unit.lets)?;
        let functions = unit
            .defs
            .iter()
            .map(|def| {
                Ok(UserFunction {
                    name: Arc::from(def.name.as_str()),
                    params: def.params.iter().map(|p| Arc::from(p.as_str())).collect(),
                    lets: lower.lets(&def.lets)?,
                    body: lower.expr(&def.body)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let body = unit.body.as_ref().map(|b| lower.expr(b)).transpose()?;
        Ok(Program { source, lets, functions, body })
    }
}

struct Lowering<'s> {
    locals: &'s HashMap<String, usize>,
    imports: &'s HashMap<String, Arc<Program>>,
    registry: &'s Registry,
}

impl Lowering<'_> {
    fn lets(&self, lets: &[LetDecl]) -> Result<Vec<Binding>> {
        lets.iter()
            .map(|l| Ok(Binding { name: Arc::from(l.name.as_str()), value: self.expr(&l.value)? }))
            .collect()
    }

    fn boxed(&self, e: &Expr) -> Result<Box<Node>> {
        Ok(Box::new(self.expr(e)?))
    }

    fn optional(&self, e: &Option<Box<Expr>>) -> Result<Option<Box<Node>>> {
        e.as_deref().map(|e| self.boxed(e)).transpose()
    }

    fn expr(&self, e: &Expr) -> Result<Node> {
        with_stack(|| self.lower(e))
    }

    fn lower(&self, e: &Expr) -> Result<Node> {
        let node = match &e.kind {
            ExprKind::Null => Node::Literal(Value::null()),
            ExprKind::Bool(b) => Node::Literal(Value::from(*b)),
            ExprKind::Int(i) => Node::Literal(Value::from(*i)),
            ExprKind::Decimal(d) => Node::Literal(Value::from(*d)),
            ExprKind::Str(s) => Node::Literal(Value::from(s.as_str())),
            ExprKind::Chain { head, links } => self.chain(head, links, &e.at)?,
            ExprKind::Array(items) => Node::Array(items.iter().map(|i| self.expr(i)).collect::<Result<_>>()?),
            ExprKind::ArrayFor { source, lets, body, cond } => Node::ArrayFor {
                source: self.boxed(source)?,
                lets: self.lets(lets)?,
                body: self.boxed(body)?,
                cond: self.optional(cond)?,
                at: e.at.clone(),
            },
            ExprKind::ObjectFor { source, lets, key, value, cond } => Node::ObjectFor {
                source: self.boxed(source)?,
                lets: self.lets(lets)?,
                key: self.boxed(key)?,
                value: self.boxed(value)?,
                cond: self.optional(cond)?,
                at: e.at.clone(),
            },
            ExprKind::Object { lets, pairs, matcher } => {
                let mut seen = HashSet::new();
                let mut lowered = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    if let ExprKind::Str(key) = &pair.key.kind {
                        if !seen.insert(key.as_str()) {
                            return Err(JsltError::compile(
                                format!("duplicate key '{key}' in object"),
                                Some(pair.key.at.clone()),
                            ));
                        }
                    }
                    lowered.push(ObjectPair { key: self.expr(&pair.key)?, value: self.expr(&pair.value)? });
                }
                let matcher = match matcher {
                    Some(m) => Some(MatcherNode {
                        minus: m.minus.iter().cloned().collect(),
                        value: self.boxed(&m.value)?,
                        at: m.at.clone(),
                    }),
                    None => None,
                };
                Node::Object { lets: self.lets(lets)?, pairs: lowered, matcher, at: e.at.clone() }
            }
            ExprKind::If { cond, then_lets, then, else_lets, otherwise } => Node::If {
                cond: self.boxed(cond)?,
                then_lets: self.lets(then_lets)?,
                then: self.boxed(then)?,
                else_lets: self.lets(else_lets)?,
                otherwise: self.optional(otherwise)?,
            },
            ExprKind::Binary { op, lhs, rhs } => {
                Node::Binary { op: *op, lhs: self.boxed(lhs)?, rhs: self.boxed(rhs)?, at: e.at.clone() }
            }
            ExprKind::Pipe { lhs, rhs } => Node::Pipe { lhs: self.boxed(lhs)?, rhs: self.boxed(rhs)? },
        };
        Ok(node)
    }

    // Each link wraps its predecessor, so evaluation runs left to right.
    fn chain(&self, head: &ChainHead, links: &[ChainLink], at: &Location) -> Result<Node> {
        let mut node = match head {
            ChainHead::Dot => Node::Current,
            ChainHead::Variable(name) => Node::Variable { name: Arc::from(name.as_str()), at: at.clone() },
            ChainHead::Call { prefix, name, args } => Node::Call {
                name: Arc::from(match prefix {
                    Some(p) => format!("{p}:{name}"),
                    None => name.clone(),
                }),
                callee: self.callee(prefix.as_deref(), name, at)?,
                args: args.iter().map(|a| self.expr(a)).collect::<Result<_>>()?,
                at: at.clone(),
            },
        };
        for link in links {
            node = match link {
                ChainLink::Key { key, at } => {
                    Node::Key { base: Box::new(node), key: Arc::from(key.as_str()), at: at.clone() }
                }
                ChainLink::Index { index, at } => {
                    Node::Index { base: Box::new(node), index: self.boxed(index)?, at: at.clone() }
                }
                ChainLink::Slice { start, end, at } => Node::Slice {
                    base: Box::new(node),
                    start: self.optional(start)?,
                    end: self.optional(end)?,
                    at: at.clone(),
                },
            };
        }
        Ok(node)
    }

    // Local declarations shadow import prefixes, which shadow the registry.
    fn callee(&self, prefix: Option<&str>, name: &str, at: &Location) -> Result<Callee> {
        if let Some(prefix) = prefix {
            let module = self.imports.get(prefix).ok_or_else(|| {
                JsltError::compile(format!("no module imported as '{prefix}'"), Some(at.clone()))
            })?;
            return Ok(match module.function_index(name) {
                Some(index) => Callee::Imported { module: module.clone(), index },
                None => Callee::Unknown,
            });
        }
        if let Some(&index) = self.locals.get(name) {
            return Ok(Callee::Local(index));
        }
        if let Some(module) = self.imports.get(name) {
            return Ok(Callee::ModuleBody(module.clone()));
        }
        if let Some(m) = self.registry.get_macro(name) {
            return Ok(Callee::Macro(m));
        }
        Ok(self.registry.get(name).map_or(Callee::Unknown, Callee::Function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::MapResolver;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_literal_keys_are_rejected() {
        let err = Compiler::new().compile(r#"{"a": 1, "b": 2, "a": 3}"#).unwrap_err();
        assert!(matches!(err, JsltError::Compile { .. }), "{err}");
        assert_eq!(err.location().map(|l| (l.line, l.column)), Some((1, 18)));
    }

    #[test]
    fn duplicate_import_prefix_is_rejected() {
        let resolver = MapResolver::new().with("a", "def f() 1").with("b", "def g() 2");
        let err = Compiler::new()
            .resolver(Arc::new(resolver))
            .compile("import \"a\" as m\nimport \"b\" as m\nm:f()")
            .unwrap_err();
        assert!(err.to_string().contains("duplicate import prefix 'm'"), "{err}");
    }

    #[test]
    fn import_cycles_are_detected() {
        let resolver = MapResolver::new()
            .with("a", "import \"b\" as b\ndef f() b:g()")
            .with("b", "import \"a\" as a\ndef g() a:f()");
        let err = Compiler::new().resolver(Arc::new(resolver)).compile("import \"a\" as a\na:f()").unwrap_err();
        assert!(err.to_string().contains("import cycle: a -> b -> a"), "{err}");
    }

    #[test]
    fn unknown_prefix_is_a_compile_error() {
        let err = Compiler::new().compile("nope:f()").unwrap_err();
        assert!(matches!(err, JsltError::Compile { .. }), "{err}");
    }

    #[test]
    fn unknown_function_compiles() {
        assert!(Compiler::new().compile("no-such-function(1)").is_ok());
    }

    #[test]
    fn source_name_flows_into_errors() {
        let err = Compiler::new().source_name("prog.jslt").compile("{").unwrap_err();
        assert_eq!(err.location().map(|l| l.source.to_string()), Some("prog.jslt".to_string()));
    }
}
