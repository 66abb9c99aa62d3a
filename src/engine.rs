use crate::comparison::{cmp_values, is_truthy};
use crate::context::{Bindings, Env};
use crate::errors::{JsltError, Location, Result};
use crate::expression::{Binding, Callee, MatcherNode, Node, ObjectPair, Program, UserFunction};
use crate::filter::ObjectFilter;
use crate::functions::builtins::key_value_pairs;
use crate::functions::{LazyArgs, VARIADIC};
use crate::syntax::BinaryOp;
use crate::value::{ArrayBuilder, Kind, ObjectBuilder, Value};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Run `f` on a stack with at least the red zone left, growing it on the heap if needed.
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, f)
}

/// Evaluate a compiled program against one input.
pub(crate) fn run(
    program: &Program,
    variables: &HashMap<String, Value>,
    input: &Value,
    filter: &dyn ObjectFilter,
    max_depth: usize,
) -> Result<Value> {
    let root = Env::vars(variables);
    let boot = Evaluator { program, globals: &root, filter, depth: 0, max_depth };
    let lets = boot.bind(&program.lets, &root, input)?;
    let globals = root.child(&lets);
    let ev = Evaluator { program, globals: &globals, filter, depth: 0, max_depth };
    match &program.body {
        Some(body) => ev.eval(body, &globals, input),
        None => Ok(Value::null()),
    }
}

#[derive(Clone, Copy)]
struct Evaluator<'p> {
    program: &'p Program,
    /// Caller variables plus top-level lets; what function bodies see.
    globals: &'p Env<'p>,
    filter: &'p dyn ObjectFilter,
    depth: usize,
    max_depth: usize,
}

impl Evaluator<'_> {
    fn eval(&self, node: &Node, env: &Env<'_>, input: &Value) -> Result<Value> {
        with_stack(|| self.eval_node(node, env, input))
    }

    fn eval_node(&self, node: &Node, env: &Env<'_>, input: &Value) -> Result<Value> {
        match node {
            Node::Literal(v) => Ok(v.clone()),
            Node::Current => Ok(input.clone()),
            Node::Variable { name, at } => match env.lookup(name) {
                Some(v) => Ok(v.clone()),
                None => Err(JsltError::runtime(format!("no such variable '${name}'")).or_at(at)),
            },
            Node::Key { base, key, at } => {
                let base = self.eval(base, env, input)?;
                match base.kind() {
                    Kind::Object => Ok(base.get(key).unwrap_or_default()),
                    Kind::Null => Ok(Value::null()),
                    k => Err(JsltError::runtime(format!("can't get key '{key}' from {k}")).or_at(at)),
                }
            }
            Node::Index { base, index, at } => {
                let base = self.eval(base, env, input)?;
                if base.is_null() {
                    return Ok(Value::null());
                }
                let i = self.integer(index, env, input, "index", at)?;
                index_value(&base, i).map_err(|e| e.or_at(at))
            }
            Node::Slice { base, start, end, at } => {
                let base = self.eval(base, env, input)?;
                if base.is_null() {
                    return Ok(Value::null());
                }
                let start = match start {
                    Some(s) => Some(self.integer(s, env, input, "slice start", at)?),
                    None => None,
                };
                let end = match end {
                    Some(e) => Some(self.integer(e, env, input, "slice end", at)?),
                    None => None,
                };
                slice_value(&base, start, end).map_err(|e| e.or_at(at))
            }
            Node::If { cond, then_lets, then, else_lets, otherwise } => {
                if is_truthy(&self.eval(cond, env, input)?) {
                    self.scoped(then_lets, then, env, input)
                } else if let Some(otherwise) = otherwise {
                    self.scoped(else_lets, otherwise, env, input)
                } else {
                    Ok(Value::null())
                }
            }
            Node::ArrayFor { source, lets, body, cond, at } => {
                let items = iterate(&self.eval(source, env, input)?).map_err(|e| e.or_at(at))?;
                let mut out = ArrayBuilder::with_capacity(items.len());
                for item in items {
                    let bound = self.bind(lets, env, &item)?;
                    let scope = env.child(&bound);
                    if let Some(cond) = cond {
                        if !is_truthy(&self.eval(cond, &scope, &item)?) {
                            continue;
                        }
                    }
                    out.push(self.eval(body, &scope, &item)?);
                }
                Ok(out.build())
            }
            Node::ObjectFor { source, lets, key, value, cond, at } => {
                let items = iterate(&self.eval(source, env, input)?).map_err(|e| e.or_at(at))?;
                let mut out = ObjectBuilder::new();
                for item in items {
                    let bound = self.bind(lets, env, &item)?;
                    let scope = env.child(&bound);
                    if let Some(cond) = cond {
                        if !is_truthy(&self.eval(cond, &scope, &item)?) {
                            continue;
                        }
                    }
                    let k = self.eval(key, &scope, &item)?;
                    let k = k.as_str().ok_or_else(|| key_error(&k, at))?;
                    let v = self.eval(value, &scope, &item)?;
                    if self.filter.keep(k, &v)? {
                        out.insert(k, v);
                    }
                }
                Ok(out.build())
            }
            Node::Object { lets, pairs, matcher, at } => {
                let bound = self.bind(lets, env, input)?;
                let scope = env.child(&bound);
                self.object(pairs, matcher.as_ref(), &scope, input, at)
            }
            Node::Array(items) => {
                let mut out = ArrayBuilder::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, env, input)?);
                }
                Ok(out.build())
            }
            Node::Binary { op: BinaryOp::And, lhs, rhs, .. } => {
                let ok = is_truthy(&self.eval(lhs, env, input)?) && is_truthy(&self.eval(rhs, env, input)?);
                Ok(Value::from(ok))
            }
            Node::Binary { op: BinaryOp::Or, lhs, rhs, .. } => {
                let ok = is_truthy(&self.eval(lhs, env, input)?) || is_truthy(&self.eval(rhs, env, input)?);
                Ok(Value::from(ok))
            }
            Node::Binary { op, lhs, rhs, at } => {
                let l = self.eval(lhs, env, input)?;
                let r = self.eval(rhs, env, input)?;
                binary(*op, &l, &r).map_err(|e| e.or_at(at))
            }
            Node::Pipe { lhs, rhs } => {
                let piped = self.eval(lhs, env, input)?;
                self.eval(rhs, env, &piped)
            }
            Node::Call { name, callee, args, at } => self.call(name, callee, args, env, input).map_err(|e| e.or_at(at)),
        }
    }

    /// Evaluate `lets` in order, each seeing the ones before it.
    fn bind(&self, lets: &[Binding], env: &Env<'_>, input: &Value) -> Result<Bindings> {
        let mut bound: Bindings = Vec::with_capacity(lets.len());
        for b in lets {
            let value = self.eval(&b.value, &env.child(&bound), input)?;
            bound.push((b.name.clone(), value));
        }
        Ok(bound)
    }

    fn scoped(&self, lets: &[Binding], body: &Node, env: &Env<'_>, input: &Value) -> Result<Value> {
        let bound = self.bind(lets, env, input)?;
        self.eval(body, &env.child(&bound), input)
    }

    fn integer(&self, node: &Node, env: &Env<'_>, input: &Value, what: &str, at: &Location) -> Result<i64> {
        let v = self.eval(node, env, input)?;
        match v.kind() {
            Kind::Integer => v.as_i64().ok_or_else(|| JsltError::runtime(format!("{what} out of range"))),
            k => Err(JsltError::runtime(format!("{what} must be an integer, got {k}")).or_at(at)),
        }
    }

    fn object(
        &self,
        pairs: &[ObjectPair],
        matcher: Option<&MatcherNode>,
        env: &Env<'_>,
        input: &Value,
        at: &Location,
    ) -> Result<Value> {
        let mut out = ObjectBuilder::new();
        let mut explicit = HashSet::new();
        for pair in pairs {
            let k = self.eval(&pair.key, env, input)?;
            let k = k.as_str().ok_or_else(|| key_error(&k, at))?.to_string();
            let v = self.eval(&pair.value, env, input)?;
            if self.filter.keep(&k, &v)? {
                out.insert(k.clone(), v);
            }
            explicit.insert(k);
        }
        if let Some(m) = matcher {
            let source = self.eval(&m.value, env, input)?;
            match source.kind() {
                Kind::Null => {}
                Kind::Object => {
                    for (k, v) in source.entries() {
                        if explicit.contains(k) || m.minus.contains(k) {
                            continue;
                        }
                        if self.filter.keep(k, &v)? {
                            out.insert(k, v);
                        }
                    }
                }
                k => {
                    return Err(JsltError::runtime(format!("matcher must produce an object, got {k}")).or_at(&m.at));
                }
            }
        }
        Ok(out.build())
    }

    fn args(&self, args: &[Node], env: &Env<'_>, input: &Value) -> Result<Vec<Value>> {
        args.iter().map(|a| self.eval(a, env, input)).collect()
    }

    fn call(&self, name: &str, callee: &Callee, args: &[Node], env: &Env<'_>, input: &Value) -> Result<Value> {
        match callee {
            Callee::Function(f) => {
                check_arity(name, f.arity(), args.len())?;
                let values = self.args(args, env, input)?;
                f.call(input, &values)
            }
            Callee::Macro(m) => {
                check_arity(name, m.arity(), args.len())?;
                let mut eval = |i: usize| match args.get(i) {
                    Some(a) => self.eval(a, env, input),
                    None => Ok(Value::null()),
                };
                m.call(&mut LazyArgs::new(args.len(), &mut eval))
            }
            Callee::Local(index) => {
                let f = declared(self.program, *index, name)?;
                check_arity(name, f.params.len()..=f.params.len(), args.len())?;
                let values = self.args(args, env, input)?;
                self.invoke(f, input, values)
            }
            Callee::Imported { module, index } => {
                let f = declared(module, *index, name)?;
                check_arity(name, f.params.len()..=f.params.len(), args.len())?;
                let values = self.args(args, env, input)?;
                self.in_module(module, |ev| ev.invoke(f, input, values))
            }
            Callee::ModuleBody(module) => {
                check_arity(name, 1..=1, args.len())?;
                let body = module
                    .body
                    .as_ref()
                    .ok_or_else(|| JsltError::runtime(format!("module '{name}' has no body expression")))?;
                let arg = self.eval(&args[0], env, input)?;
                self.in_module(module, |ev| ev.eval(body, ev.globals, &arg))
            }
            Callee::Unknown => Err(JsltError::runtime(format!("no such function: '{name}'"))),
        }
    }

    fn invoke(&self, f: &UserFunction, input: &Value, args: Vec<Value>) -> Result<Value> {
        if self.depth >= self.max_depth {
            return Err(JsltError::runtime(format!(
                "maximum function call depth ({}) exceeded in '{}'",
                self.max_depth, f.name
            )));
        }
        let inner = Evaluator { depth: self.depth + 1, ..*self };
        let params: Bindings = f.params.iter().cloned().zip(args).collect();
        let scope = self.globals.child(&params);
        let bound = inner.bind(&f.lets, &scope, input)?;
        inner.eval(&f.body, &scope.child(&bound), input)
    }

    // Module code sees only its own top-level lets, evaluated against null.
    fn in_module<T>(&self, module: &Program, f: impl FnOnce(&Evaluator<'_>) -> Result<T>) -> Result<T> {
        let root = Env::empty();
        let boot =
            Evaluator { program: module, globals: &root, filter: self.filter, depth: self.depth, max_depth: self.max_depth };
        let lets = boot.bind(&module.lets, &root, &Value::null())?;
        let globals = root.child(&lets);
        f(&Evaluator { program: module, globals: &globals, filter: self.filter, depth: self.depth, max_depth: self.max_depth })
    }
}

fn declared<'p>(program: &'p Program, index: usize, name: &str) -> Result<&'p UserFunction> {
    program
        .functions
        .get(index)
        .ok_or_else(|| JsltError::runtime(format!("no such function: '{name}'")))
}

fn describe_arity(arity: &RangeInclusive<usize>) -> String {
    match (*arity.start(), *arity.end()) {
        (min, max) if min == max => format!("{min}"),
        (min, VARIADIC) => format!("at least {min}"),
        (min, max) => format!("{min} to {max}"),
    }
}

fn check_arity(name: &str, arity: RangeInclusive<usize>, count: usize) -> Result<()> {
    if arity.contains(&count) {
        return Ok(());
    }
    Err(JsltError::runtime(format!(
        "function '{name}' takes {} arguments, got {count}",
        describe_arity(&arity)
    )))
}

fn key_error(key: &Value, at: &Location) -> JsltError {
    JsltError::runtime(format!("object key must be a string, got {}", key.kind())).or_at(at)
}

/// Elements a `for` iterates: array items, or key/value objects.
fn iterate(source: &Value) -> Result<Vec<Value>> {
    match source.kind() {
        Kind::Null => Ok(Vec::new()),
        Kind::Array => Ok(source.elements().collect()),
        Kind::Object => Ok(key_value_pairs(source).elements().collect()),
        k => Err(JsltError::runtime(format!("can't iterate over {k}"))),
    }
}

fn index_value(base: &Value, i: i64) -> Result<Value> {
    let resolve = |len: usize| -> Option<usize> {
        let n = len as i64;
        let idx = if i < 0 { n + i } else { i };
        (0..n).contains(&idx).then_some(idx as usize)
    };
    match base.kind() {
        Kind::Array => Ok(resolve(base.len().unwrap_or(0)).and_then(|idx| base.at(idx)).unwrap_or_default()),
        Kind::String => {
            let s = base.as_str().unwrap_or_default();
            let c = resolve(s.chars().count()).and_then(|idx| s.chars().nth(idx));
            Ok(c.map_or(Value::null(), |c| Value::from(c.to_string())))
        }
        k => Err(JsltError::runtime(format!("can't index into {k}"))),
    }
}

/// Clamp slice bounds to `0..=len`; negative bounds count from the end.
pub(crate) fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let n = len as i64;
    let norm = |i: i64| if i < 0 { (n + i).clamp(0, n) } else { i.clamp(0, n) };
    let lo = norm(start.unwrap_or(0));
    let hi = norm(end.unwrap_or(n)).max(lo);
    (lo as usize, hi as usize)
}

fn slice_value(base: &Value, start: Option<i64>, end: Option<i64>) -> Result<Value> {
    match base.kind() {
        Kind::Array => {
            let (lo, hi) = slice_bounds(base.len().unwrap_or(0), start, end);
            Ok(base.elements().skip(lo).take(hi - lo).collect())
        }
        Kind::String => {
            let s = base.as_str().unwrap_or_default();
            let (lo, hi) = slice_bounds(s.chars().count(), start, end);
            Ok(Value::from(s.chars().skip(lo).take(hi - lo).collect::<String>()))
        }
        k => Err(JsltError::runtime(format!("can't slice {k}"))),
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "or",
        BinaryOp::And => "and",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
    }
}

pub(crate) fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::from(l == r)),
        BinaryOp::Ne => Ok(Value::from(l != r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, l, r),
        BinaryOp::Or => Ok(Value::from(is_truthy(l) || is_truthy(r))),
        BinaryOp::And => Ok(Value::from(is_truthy(l) && is_truthy(r))),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, l, r),
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::from(false));
    }
    let ord = cmp_values(l, r).ok_or_else(|| {
        JsltError::runtime(format!("can't compare {} and {} with '{}'", l.kind(), r.kind(), symbol(op)))
    })?;
    Ok(Value::from(match op {
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        _ => ord.is_ge(),
    }))
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::null());
    }
    if op == BinaryOp::Add {
        match (l.kind(), r.kind()) {
            (Kind::String, Kind::String) => {
                let mut s = l.as_str().unwrap_or_default().to_string();
                s.push_str(r.as_str().unwrap_or_default());
                return Ok(Value::from(s));
            }
            (Kind::Array, Kind::Array) => return Ok(l.elements().chain(r.elements()).collect()),
            (Kind::Object, Kind::Object) => {
                let mut out = ObjectBuilder::new();
                for (k, v) in l.entries().chain(r.entries()) {
                    out.insert(k, v);
                }
                return Ok(out.build());
            }
            _ => {}
        }
    }
    if !(l.is_number() && r.is_number()) {
        return Err(JsltError::runtime(format!(
            "can't apply '{}' to {} and {}",
            symbol(op),
            l.kind(),
            r.kind()
        )));
    }
    let ints = match (l.kind(), r.kind()) {
        (Kind::Integer, Kind::Integer) => l.as_i64().zip(r.as_i64()),
        _ => None,
    };
    match ints {
        Some((a, b)) => integer_op(op, a, b),
        None => decimal_op(op, l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default()),
    }
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let overflow = || JsltError::runtime(format!("integer overflow in {a} {} {b}", symbol(op)));
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(JsltError::runtime("division by zero"));
            }
            match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                Some(_) => return Ok(Value::from(a as f64 / b as f64)),
                None => None,
            }
        }
        _ => {
            if b == 0 {
                return Err(JsltError::runtime("modulo by zero"));
            }
            a.checked_rem(b)
        }
    };
    result.map(Value::from).ok_or_else(overflow)
}

fn decimal_op(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err(JsltError::runtime("division by zero")),
        BinaryOp::Div => a / b,
        _ if b == 0.0 => return Err(JsltError::runtime("modulo by zero")),
        _ => a % b,
    };
    Ok(Value::from(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slice_bounds_clamp() {
        assert_eq!(slice_bounds(5, Some(1), Some(3)), (1, 3));
        assert_eq!(slice_bounds(5, Some(-2), None), (3, 5));
        assert_eq!(slice_bounds(5, Some(10), Some(20)), (5, 5));
        assert_eq!(slice_bounds(5, Some(4), Some(1)), (4, 4));
        assert_eq!(slice_bounds(0, Some(i64::MIN), Some(i64::MAX)), (0, 0));
    }

    #[test]
    fn integer_division() {
        assert_eq!(binary(BinaryOp::Div, &Value::from(6), &Value::from(3)).unwrap(), Value::from(2));
        assert_eq!(binary(BinaryOp::Div, &Value::from(7), &Value::from(2)).unwrap(), Value::from(3.5));
        assert!(binary(BinaryOp::Div, &Value::from(1), &Value::from(0)).is_err());
        assert!(binary(BinaryOp::Mul, &Value::from(i64::MAX), &Value::from(2)).is_err());
    }

    #[test]
    fn addition_by_kind() {
        let add = |a: &str, b: &str| {
            binary(BinaryOp::Add, &crate::codec::parse(a).unwrap(), &crate::codec::parse(b).unwrap())
        };
        assert_eq!(add("1", "2.5").unwrap(), Value::from(3.5));
        assert_eq!(add(r#""a""#, r#""b""#).unwrap(), Value::from("ab"));
        assert_eq!(add("[1]", "[2]").unwrap(), crate::codec::parse("[1, 2]").unwrap());
        assert_eq!(add(r#"{"a": 1}"#, r#"{"a": 2, "b": 3}"#).unwrap(), crate::codec::parse(r#"{"a": 2, "b": 3}"#).unwrap());
        assert!(add("null", "1").unwrap().is_null());
        assert!(add(r#""a""#, "1").is_err());
    }

    #[test]
    fn ordering_with_null_is_false() {
        assert_eq!(binary(BinaryOp::Lt, &Value::null(), &Value::from(1)).unwrap(), Value::from(false));
        assert!(binary(BinaryOp::Lt, &Value::from("a"), &Value::from(1)).is_err());
    }
}
