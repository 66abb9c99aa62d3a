use super::{Function, LazyArgs, Macro, Registry, VARIADIC};
use crate::codec;
use crate::comparison::{is_truthy, total_cmp};
use crate::errors::{JsltError, Result};
use crate::value::{ArrayBuilder, Kind, ObjectBuilder, Value};
use itertools::Itertools;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

pub(crate) fn install(r: &mut Registry) {
    let regexes = Arc::new(RegexCache::default());

    r.register(Number);
    r.register(Round);
    r.register(Floor);
    r.register(Ceiling);
    r.register(Random);
    r.register(Sum);
    r.register(Mod);
    r.register(MinMax { name: "min", want: std::cmp::Ordering::Less });
    r.register(MinMax { name: "max", want: std::cmp::Ordering::Greater });

    r.register(StringFn);
    r.register(BooleanFn);
    r.register(Not);
    for kind in [
        ("is-number", KindTest::Number),
        ("is-integer", KindTest::Exactly(Kind::Integer)),
        ("is-decimal", KindTest::Exactly(Kind::Decimal)),
        ("is-string", KindTest::Exactly(Kind::String)),
        ("is-boolean", KindTest::Exactly(Kind::Boolean)),
        ("is-array", KindTest::Exactly(Kind::Array)),
        ("is-object", KindTest::Exactly(Kind::Object)),
    ] {
        r.register(IsKind { name: kind.0, test: kind.1 });
    }
    r.register(Size);
    r.register(Contains);

    r.register(CaseFn { name: "lowercase", upper: false });
    r.register(CaseFn { name: "uppercase", upper: true });
    r.register(Trim);
    r.register(Affix { name: "starts-with", suffix: false });
    r.register(Affix { name: "ends-with", suffix: true });
    r.register(Join);
    r.register(Split { regexes: regexes.clone() });
    r.register(Test { regexes: regexes.clone() });
    r.register(Capture { regexes: regexes.clone() });
    r.register(Replace { regexes });
    r.register(FromJson);
    r.register(ToJson);

    r.register(ArrayFn);
    r.register(Flatten);
    r.register(Quantifier { name: "all", every: true });
    r.register(Quantifier { name: "any", every: false });
    r.register(Zip);
    r.register(IndexOf);
    r.register(GetKey);

    r.register(UuidFn);
    r.register(Now);
    r.register(FormatTime);
    r.register(ErrorFn);

    r.register_macro(Fallback);
}

// ---------- argument helpers ----------

fn arg_error(func: &str, pos: usize, expected: &str, got: &Value) -> JsltError {
    JsltError::runtime(format!("{func}: argument {} must be {expected}, got {}", pos + 1, got.kind()))
}

fn arg(args: &[Value], pos: usize) -> &Value {
    static NULL: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
    args.get(pos).unwrap_or_else(|| NULL.get_or_init(Value::null))
}

/// String argument; `None` when null.
fn opt_str<'v>(func: &str, args: &'v [Value], pos: usize) -> Result<Option<&'v str>> {
    let v = arg(args, pos);
    match v.kind() {
        Kind::Null => Ok(None),
        Kind::String => Ok(v.as_str()),
        _ => Err(arg_error(func, pos, "a string", v)),
    }
}

fn req_str<'v>(func: &str, args: &'v [Value], pos: usize) -> Result<&'v str> {
    let v = arg(args, pos);
    v.as_str().ok_or_else(|| arg_error(func, pos, "a string", v))
}

fn opt_array<'v>(func: &str, args: &'v [Value], pos: usize) -> Result<Option<&'v Value>> {
    let v = arg(args, pos);
    match v.kind() {
        Kind::Null => Ok(None),
        Kind::Array => Ok(Some(v)),
        _ => Err(arg_error(func, pos, "an array", v)),
    }
}

fn opt_number(func: &str, args: &[Value], pos: usize) -> Result<Option<Value>> {
    let v = arg(args, pos);
    match v.kind() {
        Kind::Null => Ok(None),
        k if k.is_number() => Ok(Some(v.clone())),
        _ => Err(arg_error(func, pos, "a number", v)),
    }
}

fn opt_int(func: &str, args: &[Value], pos: usize) -> Result<Option<i64>> {
    let v = arg(args, pos);
    match v.kind() {
        Kind::Null => Ok(None),
        Kind::Integer => Ok(v.as_i64()),
        _ => Err(arg_error(func, pos, "an integer", v)),
    }
}

/// Render a value the way `string()` and `join()` do.
fn display(v: &Value) -> String {
    match v.as_str() {
        Some(s) => s.to_string(),
        None => codec::to_string(v),
    }
}

// ---------- numbers ----------

fn parse_number(text: &str) -> Option<Value> {
    let t = text.trim();
    let lexical = !t.is_empty()
        && t.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && t.chars().any(|c| c.is_ascii_digit());
    if !lexical {
        return None;
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::from(i));
    }
    t.parse::<f64>().ok().filter(|d| d.is_finite()).map(Value::from)
}

pub struct Number;
impl Function for Number {
    fn name(&self) -> &str { "number" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let v = arg(args, 0);
        let converted = match v.kind() {
            Kind::Null => return Ok(Value::null()),
            Kind::Integer | Kind::Decimal => Some(v.clone()),
            Kind::String => v.as_str().and_then(parse_number),
            _ => None,
        };
        match (converted, args.get(1)) {
            (Some(n), _) => Ok(n),
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(JsltError::runtime(format!("number: can't convert {v} to a number"))),
        }
    }
}

fn round_with(func: &str, args: &[Value], op: fn(f64) -> f64) -> Result<Value> {
    let v = match opt_number(func, args, 0)? {
        Some(v) => v,
        None => return Ok(Value::null()),
    };
    if v.kind() == Kind::Integer {
        return Ok(v);
    }
    let d = op(v.as_f64().unwrap_or_default());
    if d.abs() < 9.2e18 {
        Ok(Value::from(d as i64))
    } else {
        Ok(Value::from(d))
    }
}

pub struct Round;
impl Function for Round {
    fn name(&self) -> &str { "round" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        round_with("round", args, f64::round)
    }
}

pub struct Floor;
impl Function for Floor {
    fn name(&self) -> &str { "floor" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        round_with("floor", args, f64::floor)
    }
}

pub struct Ceiling;
impl Function for Ceiling {
    fn name(&self) -> &str { "ceiling" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        round_with("ceiling", args, f64::ceil)
    }
}

/// Thread-local generator, so concurrent callers never share state.
pub struct Random;
impl Function for Random {
    fn name(&self) -> &str { "random" }
    fn arity(&self) -> RangeInclusive<usize> { 0..=0 }
    fn call(&self, _input: &Value, _args: &[Value]) -> Result<Value> {
        use rand::Rng;
        Ok(Value::from(rand::thread_rng().gen::<f64>()))
    }
}

pub struct Sum;
impl Function for Sum {
    fn name(&self) -> &str { "sum" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let arr = match opt_array("sum", args, 0)? {
            Some(a) => a,
            None => return Ok(Value::null()),
        };
        let mut int_total: Option<i64> = Some(0);
        let mut total = 0.0;
        for item in arr.elements() {
            if !item.is_number() {
                return Err(JsltError::runtime(format!("sum: array element {item} is not a number")));
            }
            int_total = match (int_total, item.as_i64()) {
                (Some(acc), Some(i)) => acc.checked_add(i),
                _ => None,
            };
            total += item.as_f64().unwrap_or_default();
        }
        Ok(int_total.map_or(Value::from(total), Value::from))
    }
}

pub struct Mod;
impl Function for Mod {
    fn name(&self) -> &str { "mod" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let (a, b) = match (opt_int("mod", args, 0)?, opt_int("mod", args, 1)?) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(Value::null()),
        };
        if b == 0 {
            return Err(JsltError::runtime("mod: division by zero"));
        }
        a.checked_rem_euclid(b)
            .map(Value::from)
            .ok_or_else(|| JsltError::runtime("mod: integer overflow"))
    }
}

pub struct MinMax {
    name: &'static str,
    want: std::cmp::Ordering,
}
impl Function for MinMax {
    fn name(&self) -> &str { self.name }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let (a, b) = (arg(args, 0), arg(args, 1));
        if a.is_null() || b.is_null() {
            return Ok(Value::null());
        }
        let ord = total_cmp(a, b);
        Ok(if ord == self.want || ord == std::cmp::Ordering::Equal { a.clone() } else { b.clone() })
    }
}

// ---------- types and predicates ----------

pub struct StringFn;
impl Function for StringFn {
    fn name(&self) -> &str { "string" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let v = arg(args, 0);
        if v.kind() == Kind::String {
            return Ok(v.clone());
        }
        Ok(Value::from(codec::to_string(v)))
    }
}

pub struct BooleanFn;
impl Function for BooleanFn {
    fn name(&self) -> &str { "boolean" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        Ok(Value::from(is_truthy(arg(args, 0))))
    }
}

pub struct Not;
impl Function for Not {
    fn name(&self) -> &str { "not" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        Ok(Value::from(!is_truthy(arg(args, 0))))
    }
}

#[derive(Clone, Copy)]
enum KindTest {
    Number,
    Exactly(Kind),
}

pub struct IsKind {
    name: &'static str,
    test: KindTest,
}
impl Function for IsKind {
    fn name(&self) -> &str { self.name }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let kind = arg(args, 0).kind();
        Ok(Value::from(match self.test {
            KindTest::Number => kind.is_number(),
            KindTest::Exactly(k) => kind == k,
        }))
    }
}

pub struct Size;
impl Function for Size {
    fn name(&self) -> &str { "size" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let v = arg(args, 0);
        match v.kind() {
            Kind::Null => Ok(Value::null()),
            Kind::String | Kind::Array | Kind::Object => Ok(Value::from(v.len().unwrap_or(0))),
            _ => Err(arg_error("size", 0, "a string, array or object", v)),
        }
    }
}

pub struct Contains;
impl Function for Contains {
    fn name(&self) -> &str { "contains" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let (needle, haystack) = (arg(args, 0), arg(args, 1));
        let found = match haystack.kind() {
            Kind::Null => false,
            Kind::Array => haystack.elements().any(|item| item == *needle),
            Kind::Object => needle.as_str().is_some_and(|k| haystack.contains_key(k)),
            Kind::String => haystack.as_str().unwrap_or_default().contains(&display(needle)),
            _ => return Err(arg_error("contains", 1, "an array, object or string", haystack)),
        };
        Ok(Value::from(found))
    }
}

// ---------- strings ----------

pub struct CaseFn {
    name: &'static str,
    upper: bool,
}
impl Function for CaseFn {
    fn name(&self) -> &str { self.name }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        Ok(match opt_str(self.name, args, 0)? {
            Some(s) if self.upper => Value::from(s.to_uppercase()),
            Some(s) => Value::from(s.to_lowercase()),
            None => Value::null(),
        })
    }
}

pub struct Trim;
impl Function for Trim {
    fn name(&self) -> &str { "trim" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        Ok(opt_str("trim", args, 0)?.map_or(Value::null(), |s| Value::from(s.trim())))
    }
}

pub struct Affix {
    name: &'static str,
    suffix: bool,
}
impl Function for Affix {
    fn name(&self) -> &str { self.name }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let s = match opt_str(self.name, args, 0)? {
            Some(s) => s,
            None => return Ok(Value::from(false)),
        };
        let affix = req_str(self.name, args, 1)?;
        Ok(Value::from(if self.suffix { s.ends_with(affix) } else { s.starts_with(affix) }))
    }
}

pub struct Join;
impl Function for Join {
    fn name(&self) -> &str { "join" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let arr = match opt_array("join", args, 0)? {
            Some(a) => a,
            None => return Ok(Value::null()),
        };
        let sep = req_str("join", args, 1)?;
        Ok(Value::from(arr.elements().map(|v| display(&v)).join(sep)))
    }
}

const REGEX_CACHE_LIMIT: usize = 1000;

/// Compiled patterns shared by the regex built-ins of one registry.
#[derive(Default)]
pub struct RegexCache {
    compiled: Mutex<HashMap<String, Regex>>,
}

impl RegexCache {
    fn get(&self, func: &str, pattern: &str) -> Result<Regex> {
        let mut compiled = self
            .compiled
            .lock()
            .map_err(|_| JsltError::runtime(format!("{func}: regex cache poisoned")))?;
        if let Some(re) = compiled.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern)
            .map_err(|e| JsltError::runtime(format!("{func}: invalid regular expression '{pattern}': {e}")))?;
        if compiled.len() >= REGEX_CACHE_LIMIT {
            compiled.clear();
        }
        compiled.insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

pub struct Test {
    regexes: Arc<RegexCache>,
}
impl Function for Test {
    fn name(&self) -> &str { "test" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let s = match opt_str("test", args, 0)? {
            Some(s) => s,
            None => return Ok(Value::from(false)),
        };
        let re = self.regexes.get("test", req_str("test", args, 1)?)?;
        Ok(Value::from(re.is_match(s)))
    }
}

pub struct Capture {
    regexes: Arc<RegexCache>,
}
impl Function for Capture {
    fn name(&self) -> &str { "capture" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let s = match opt_str("capture", args, 0)? {
            Some(s) => s,
            None => return Ok(Value::null()),
        };
        let re = self.regexes.get("capture", req_str("capture", args, 1)?)?;
        let mut out = ObjectBuilder::new();
        if let Some(caps) = re.captures(s) {
            for name in re.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    out.insert(name, Value::from(m.as_str()));
                }
            }
        }
        Ok(out.build())
    }
}

pub struct Split {
    regexes: Arc<RegexCache>,
}
impl Function for Split {
    fn name(&self) -> &str { "split" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let s = match opt_str("split", args, 0)? {
            Some(s) => s,
            None => return Ok(Value::null()),
        };
        let re = self.regexes.get("split", req_str("split", args, 1)?)?;
        Ok(re.split(s).map(Value::from).collect())
    }
}

pub struct Replace {
    regexes: Arc<RegexCache>,
}
impl Function for Replace {
    fn name(&self) -> &str { "replace" }
    fn arity(&self) -> RangeInclusive<usize> { 3..=3 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let s = match opt_str("replace", args, 0)? {
            Some(s) => s,
            None => return Ok(Value::null()),
        };
        let re = self.regexes.get("replace", req_str("replace", args, 1)?)?;
        if re.is_match("") {
            return Err(JsltError::runtime("replace: regular expression matches the empty string"));
        }
        let with = req_str("replace", args, 2)?;
        Ok(Value::from(re.replace_all(s, regex::NoExpand(with)).into_owned()))
    }
}

pub struct FromJson;
impl Function for FromJson {
    fn name(&self) -> &str { "from-json" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let s = match opt_str("from-json", args, 0)? {
            Some(s) => s,
            None => return Ok(Value::null()),
        };
        match (codec::parse(s), args.get(1)) {
            (Ok(v), _) => Ok(v),
            (Err(_), Some(fallback)) => Ok(fallback.clone()),
            (Err(e), None) => Err(JsltError::runtime(format!("from-json: {e}"))),
        }
    }
}

pub struct ToJson;
impl Function for ToJson {
    fn name(&self) -> &str { "to-json" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        Ok(Value::from(codec::to_string(arg(args, 0))))
    }
}

// ---------- arrays and objects ----------

/// Object entries as `{"key": k, "value": v}` objects.
pub(crate) fn key_value_pairs(obj: &Value) -> Value {
    obj.entries()
        .map(|(k, v)| {
            let mut pair = ObjectBuilder::new();
            pair.insert("key", Value::from(k));
            pair.insert("value", v);
            pair.build()
        })
        .collect()
}

pub struct ArrayFn;
impl Function for ArrayFn {
    fn name(&self) -> &str { "array" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let v = arg(args, 0);
        match v.kind() {
            Kind::Null | Kind::Array => Ok(v.clone()),
            Kind::Object => Ok(key_value_pairs(v)),
            _ => Err(arg_error("array", 0, "an array or object", v)),
        }
    }
}

fn flatten_into(v: Value, out: &mut ArrayBuilder) {
    if v.kind() == Kind::Array {
        for item in v.elements() {
            flatten_into(item, out);
        }
    } else {
        out.push(v);
    }
}

pub struct Flatten;
impl Function for Flatten {
    fn name(&self) -> &str { "flatten" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let arr = match opt_array("flatten", args, 0)? {
            Some(a) => a.clone(),
            None => return Ok(Value::null()),
        };
        let mut out = ArrayBuilder::new();
        flatten_into(arr, &mut out);
        Ok(out.build())
    }
}

pub struct Quantifier {
    name: &'static str,
    every: bool,
}
impl Function for Quantifier {
    fn name(&self) -> &str { self.name }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let arr = match opt_array(self.name, args, 0)? {
            Some(a) => a,
            None => return Ok(Value::null()),
        };
        let mut items = arr.elements();
        Ok(Value::from(if self.every {
            items.all(|v| is_truthy(&v))
        } else {
            items.any(|v| is_truthy(&v))
        }))
    }
}

pub struct Zip;
impl Function for Zip {
    fn name(&self) -> &str { "zip" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let (a, b) = match (opt_array("zip", args, 0)?, opt_array("zip", args, 1)?) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(Value::null()),
        };
        if a.len() != b.len() {
            return Err(JsltError::runtime("zip: arrays must have the same length"));
        }
        Ok(a.elements().zip(b.elements()).map(|(x, y)| Value::from(vec![x, y])).collect())
    }
}

pub struct IndexOf;
impl Function for IndexOf {
    fn name(&self) -> &str { "index-of" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let arr = match opt_array("index-of", args, 0)? {
            Some(a) => a,
            None => return Ok(Value::null()),
        };
        let needle = arg(args, 1);
        Ok(match arr.elements().position(|v| v == *needle) {
            Some(i) => Value::from(i),
            None => Value::from(-1),
        })
    }
}

pub struct GetKey;
impl Function for GetKey {
    fn name(&self) -> &str { "get-key" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=3 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let fallback = args.get(2).cloned().unwrap_or_default();
        let obj = arg(args, 0);
        match obj.kind() {
            Kind::Null => return Ok(fallback),
            Kind::Object => {}
            _ => return Err(arg_error("get-key", 0, "an object", obj)),
        }
        let key = req_str("get-key", args, 1)?;
        Ok(obj.get(key).filter(|v| !v.is_null()).unwrap_or(fallback))
    }
}

// ---------- impure ----------

pub struct UuidFn;
impl Function for UuidFn {
    fn name(&self) -> &str { "uuid" }
    fn arity(&self) -> RangeInclusive<usize> { 0..=2 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let id = match args.len() {
            0 => uuid::Uuid::new_v4(),
            2 => match (opt_int("uuid", args, 0)?, opt_int("uuid", args, 1)?) {
                (None, None) => uuid::Uuid::nil(),
                (msb, lsb) => uuid::Uuid::from_u64_pair(msb.unwrap_or(0) as u64, lsb.unwrap_or(0) as u64),
            },
            n => return Err(JsltError::runtime(format!("uuid: takes 0 or 2 arguments, got {n}"))),
        };
        Ok(Value::from(id.to_string()))
    }
}

pub struct Now;
impl Function for Now {
    fn name(&self) -> &str { "now" }
    fn arity(&self) -> RangeInclusive<usize> { 0..=0 }
    fn call(&self, _input: &Value, _args: &[Value]) -> Result<Value> {
        Ok(Value::from(chrono::Utc::now().timestamp_millis() as f64 / 1000.0))
    }
}

/// `format-time(seconds, strftime-format [, "UTC"])`
pub struct FormatTime;
impl Function for FormatTime {
    fn name(&self) -> &str { "format-time" }
    fn arity(&self) -> RangeInclusive<usize> { 2..=3 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        let secs = match opt_number("format-time", args, 0)? {
            Some(n) => n.as_f64().unwrap_or_default(),
            None => return Ok(Value::null()),
        };
        let format = req_str("format-time", args, 1)?;
        if let Some(zone) = opt_str("format-time", args, 2)? {
            if zone != "UTC" {
                return Err(JsltError::runtime(format!("format-time: unsupported timezone '{zone}'")));
            }
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9) as u32;
        let at = chrono::DateTime::from_timestamp(whole as i64, nanos)
            .ok_or_else(|| JsltError::runtime(format!("format-time: timestamp {secs} out of range")))?;
        let mut out = String::new();
        write!(out, "{}", at.format(format))
            .map_err(|_| JsltError::runtime(format!("format-time: invalid format '{format}'")))?;
        Ok(Value::from(out))
    }
}

pub struct ErrorFn;
impl Function for ErrorFn {
    fn name(&self) -> &str { "error" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=1 }
    fn call(&self, _input: &Value, args: &[Value]) -> Result<Value> {
        Err(JsltError::runtime(format!("error: {}", display(arg(args, 0)))))
    }
}

/// First argument that evaluates without error to a non-null value.
pub struct Fallback;
impl Macro for Fallback {
    fn name(&self) -> &str { "fallback" }
    fn arity(&self) -> RangeInclusive<usize> { 1..=VARIADIC }
    fn call(&self, args: &mut LazyArgs<'_>) -> Result<Value> {
        for i in 0..args.len() {
            match args.eval(i) {
                Ok(v) if !v.is_null() => return Ok(v),
                Ok(_) | Err(_) => continue,
            }
        }
        Ok(Value::null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<Value>) -> Result<Value> {
        let r = Registry::with_builtins();
        let f = r.get(name).unwrap_or_else(|| panic!("no builtin {name}"));
        f.call(&Value::null(), &args)
    }

    fn s(x: &str) -> Value {
        Value::from(x)
    }

    #[test]
    fn number_coercion() {
        assert_eq!(call("number", vec![s("42")]).unwrap(), Value::from(42));
        assert_eq!(call("number", vec![s(" 2.5 ")]).unwrap(), Value::from(2.5));
        assert_eq!(call("number", vec![s("x"), Value::from(0)]).unwrap(), Value::from(0));
        assert!(call("number", vec![s("inf")]).is_err());
        assert!(call("number", vec![Value::null()]).unwrap().is_null());
    }

    #[test]
    fn rounding() {
        assert_eq!(call("round", vec![Value::from(2.5)]).unwrap(), Value::from(3));
        assert_eq!(call("floor", vec![Value::from(-1.5)]).unwrap(), Value::from(-2));
        assert_eq!(call("ceiling", vec![Value::from(1.1)]).unwrap(), Value::from(2));
    }

    #[test]
    fn regex_family() {
        assert_eq!(call("test", vec![s("abc123"), s(r"\d+")]).unwrap(), Value::from(true));
        assert_eq!(call("test", vec![Value::null(), s("x")]).unwrap(), Value::from(false));
        assert_eq!(
            call("split", vec![s("a, b,c"), s(r",\s*")]).unwrap(),
            Value::from(vec![s("a"), s("b"), s("c")])
        );
        let cap = call("capture", vec![s("id-77"), s(r"(?P<kind>\w+)-(?P<num>\d+)")]).unwrap();
        assert_eq!(cap.get("kind"), Some(s("id")));
        assert_eq!(cap.get("num"), Some(s("77")));
        assert_eq!(call("replace", vec![s("a.b.c"), s(r"\."), s("$1")]).unwrap(), s("a$1b$1c"));
    }

    #[test]
    fn type_errors_name_the_function_and_position() {
        let err = call("lowercase", vec![Value::from(1)]).unwrap_err();
        assert_eq!(err.to_string(), "runtime error: lowercase: argument 1 must be a string, got integer");
        let err = call("test", vec![s("x"), Value::from(1)]).unwrap_err();
        assert!(err.to_string().contains("test: argument 2"), "{err}");
    }

    #[test]
    fn invalid_regex_is_a_runtime_error() {
        assert!(call("test", vec![s("x"), s("(")]).unwrap_err().is_runtime());
    }

    #[test]
    fn uuid_format() {
        let id = call("uuid", vec![]).unwrap();
        let text = id.as_str().unwrap();
        assert_eq!(text.len(), 36);
        assert_eq!(text.matches('-').count(), 4);
        let nil = call("uuid", vec![Value::null(), Value::null()]).unwrap();
        assert_eq!(nil, s("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn collections() {
        let arr = Value::from(vec![Value::from(1), Value::from(vec![Value::from(2), Value::from(3)])]);
        assert_eq!(call("flatten", vec![arr.clone()]).unwrap(), Value::from(vec![1.into(), 2.into(), 3.into()]));
        assert_eq!(call("size", vec![arr]).unwrap(), Value::from(2));
        assert_eq!(call("sum", vec![Value::from(vec![1.into(), 2.5.into()])]).unwrap(), Value::from(3.5));
        assert_eq!(call("join", vec![Value::from(vec![s("a"), 1.into()]), s("-")]).unwrap(), s("a-1"));
        assert_eq!(call("index-of", vec![Value::from(vec![s("a"), s("b")]), s("b")]).unwrap(), Value::from(1));
        assert!(call("zip", vec![Value::from(vec![1.into()]), Value::from(Vec::new())]).is_err());
    }

    #[test]
    fn format_time_in_utc() {
        let out = call("format-time", vec![Value::from(0), s("%Y-%m-%dT%H:%M:%S")]).unwrap();
        assert_eq!(out, s("1970-01-01T00:00:00"));
        assert!(call("format-time", vec![Value::from(0), s("%Y"), s("CET")]).is_err());
    }
}
