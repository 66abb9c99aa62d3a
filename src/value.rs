//! JSON values as seen by the evaluator.
//!
//! A [`Value`] is backed either by a tree materialized during evaluation
//! or by a view into an externally parsed `serde_json` document. The backing
//! is never observable: kind inspection, equality and iteration behave the
//! same for both.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// The seven JSON kinds, with integers and decimals kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Boolean,
    Integer,
    Decimal,
    String,
    Array,
    Object,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Boolean => "boolean",
            Kind::Integer => "integer",
            Kind::Decimal => "decimal",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
        }
    }

    pub fn is_number(self) -> bool {
        matches!(self, Kind::Integer | Kind::Decimal)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable JSON value. Cloning is cheap (reference counted).
#[derive(Clone)]
pub struct Value(Repr);

#[derive(Clone)]
enum Repr {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Str(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<IndexMap<String, Value>>),
    Doc(DocRef),
}

/// A node inside a wrapped document: the shared root plus the path to it.
#[derive(Clone)]
struct DocRef {
    root: Arc<Json>,
    path: Arc<[Step]>,
}

#[derive(Clone)]
enum Step {
    Key(Arc<str>),
    Index(usize),
}

static JSON_NULL: Json = Json::Null;

impl DocRef {
    fn node(&self) -> &Json {
        let mut cur: &Json = &self.root;
        for step in self.path.iter() {
            cur = match (step, cur) {
                (Step::Key(k), Json::Object(map)) => map.get(&**k).unwrap_or(&JSON_NULL),
                (Step::Index(i), Json::Array(items)) => items.get(*i).unwrap_or(&JSON_NULL),
                _ => &JSON_NULL,
            };
        }
        cur
    }

    fn child(&self, step: Step) -> DocRef {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend(self.path.iter().cloned());
        path.push(step);
        DocRef { root: self.root.clone(), path: path.into() }
    }

    // Scalars are copied out; strings and containers stay as views.
    fn into_value(self) -> Value {
        let scalar = match self.node() {
            Json::Null => Some(Value::null()),
            Json::Bool(b) => Some(Value(Repr::Bool(*b))),
            Json::Number(n) => Some(number_from_json(n)),
            Json::String(_) | Json::Array(_) | Json::Object(_) => None,
        };
        match scalar {
            Some(v) => v,
            None => Value(Repr::Doc(self)),
        }
    }
}

fn number_from_json(n: &serde_json::Number) -> Value {
    match n.as_i64() {
        Some(i) => Value(Repr::Int(i)),
        None => Value(Repr::Decimal(n.as_f64().unwrap_or(f64::NAN))),
    }
}

impl Value {
    pub fn null() -> Self {
        Value(Repr::Null)
    }

    /// Wrap an externally parsed document without copying it.
    pub fn wrap(doc: Json) -> Self {
        DocRef { root: Arc::new(doc), path: Arc::from(Vec::new()) }.into_value()
    }

    pub fn kind(&self) -> Kind {
        match &self.0 {
            Repr::Null => Kind::Null,
            Repr::Bool(_) => Kind::Boolean,
            Repr::Int(_) => Kind::Integer,
            Repr::Decimal(_) => Kind::Decimal,
            Repr::Str(_) => Kind::String,
            Repr::Array(_) => Kind::Array,
            Repr::Object(_) => Kind::Object,
            Repr::Doc(doc) => match doc.node() {
                Json::Null => Kind::Null,
                Json::Bool(_) => Kind::Boolean,
                Json::Number(n) if n.is_i64() => Kind::Integer,
                Json::Number(_) => Kind::Decimal,
                Json::String(_) => Kind::String,
                Json::Array(_) => Kind::Array,
                Json::Object(_) => Kind::Object,
            },
        }
    }

    pub fn is_null(&self) -> bool {
        self.kind() == Kind::Null
    }

    pub fn is_number(&self) -> bool {
        self.kind().is_number()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.0 {
            Repr::Bool(b) => Some(*b),
            Repr::Doc(doc) => doc.node().as_bool(),
            _ => None,
        }
    }

    /// Integer value; decimals are not truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match &self.0 {
            Repr::Int(i) => Some(*i),
            Repr::Doc(doc) => doc.node().as_i64(),
            _ => None,
        }
    }

    /// Any number as a double.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.0 {
            Repr::Int(i) => Some(*i as f64),
            Repr::Decimal(d) => Some(*d),
            Repr::Doc(doc) => doc.node().as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            Repr::Str(s) => Some(s),
            Repr::Doc(doc) => doc.node().as_str(),
            _ => None,
        }
    }

    /// Number of elements, entries or characters; `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match &self.0 {
            Repr::Str(s) => Some(s.chars().count()),
            Repr::Array(items) => Some(items.len()),
            Repr::Object(map) => Some(map.len()),
            Repr::Doc(doc) => match doc.node() {
                Json::String(s) => Some(s.chars().count()),
                Json::Array(items) => Some(items.len()),
                Json::Object(map) => Some(map.len()),
                _ => None,
            },
            _ => None,
        }
    }

    /// True for empty strings, arrays and objects.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Object member lookup. `None` when absent or when not an object.
    pub fn get(&self, key: &str) -> Option<Value> {
        match &self.0 {
            Repr::Object(map) => map.get(key).cloned(),
            Repr::Doc(doc) => match doc.node() {
                Json::Object(map) if map.contains_key(key) => {
                    Some(doc.child(Step::Key(key.into())).into_value())
                }
                _ => None,
            },
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match &self.0 {
            Repr::Object(map) => map.contains_key(key),
            Repr::Doc(doc) => matches!(doc.node(), Json::Object(map) if map.contains_key(key)),
            _ => false,
        }
    }

    /// Array element lookup.
    pub fn at(&self, index: usize) -> Option<Value> {
        match &self.0 {
            Repr::Array(items) => items.get(index).cloned(),
            Repr::Doc(doc) => match doc.node() {
                Json::Array(items) if index < items.len() => {
                    Some(doc.child(Step::Index(index)).into_value())
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Array elements in order; empty for every other kind.
    pub fn elements(&self) -> Elements<'_> {
        let inner = match &self.0 {
            Repr::Array(items) => ElementsInner::Tree(items.iter()),
            Repr::Doc(doc) => match doc.node() {
                Json::Array(items) => ElementsInner::Doc { doc, len: items.len(), next: 0 },
                _ => ElementsInner::Empty,
            },
            _ => ElementsInner::Empty,
        };
        Elements { inner }
    }

    /// Object entries in insertion order; empty for every other kind.
    pub fn entries(&self) -> Entries<'_> {
        let inner = match &self.0 {
            Repr::Object(map) => EntriesInner::Tree(map.iter()),
            Repr::Doc(doc) => match doc.node() {
                Json::Object(map) => EntriesInner::Doc { doc, iter: map.iter() },
                _ => EntriesInner::Empty,
            },
            _ => EntriesInner::Empty,
        };
        Entries { inner }
    }

    /// Deep copy into a `serde_json` value.
    pub fn to_json(&self) -> Json {
        match &self.0 {
            Repr::Null => Json::Null,
            Repr::Bool(b) => Json::Bool(*b),
            Repr::Int(i) => Json::from(*i),
            Repr::Decimal(d) => serde_json::Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
            Repr::Str(s) => Json::String(s.to_string()),
            Repr::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Repr::Object(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            Repr::Doc(doc) => doc.node().clone(),
        }
    }
}

pub struct Elements<'v> {
    inner: ElementsInner<'v>,
}

enum ElementsInner<'v> {
    Tree(std::slice::Iter<'v, Value>),
    Doc { doc: &'v DocRef, len: usize, next: usize },
    Empty,
}

impl Iterator for Elements<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &mut self.inner {
            ElementsInner::Tree(iter) => iter.next().cloned(),
            ElementsInner::Doc { doc, len, next } => {
                if *next >= *len {
                    return None;
                }
                let v = doc.child(Step::Index(*next)).into_value();
                *next += 1;
                Some(v)
            }
            ElementsInner::Empty => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match &self.inner {
            ElementsInner::Tree(iter) => iter.len(),
            ElementsInner::Doc { len, next, .. } => len - next,
            ElementsInner::Empty => 0,
        };
        (n, Some(n))
    }
}

pub struct Entries<'v> {
    inner: EntriesInner<'v>,
}

enum EntriesInner<'v> {
    Tree(indexmap::map::Iter<'v, String, Value>),
    Doc { doc: &'v DocRef, iter: serde_json::map::Iter<'v> },
    Empty,
}

impl<'v> Iterator for Entries<'v> {
    type Item = (&'v str, Value);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EntriesInner::Tree(iter) => iter.next().map(|(k, v)| (k.as_str(), v.clone())),
            EntriesInner::Doc { doc, iter } => iter
                .next()
                .map(|(k, _)| (k.as_str(), doc.child(Step::Key(k.as_str().into())).into_value())),
            EntriesInner::Empty => None,
        }
    }
}

/// Structural equality, independent of backing representation.
/// Integers and decimals are equal when numerically equal; object key
/// order is irrelevant.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        let (a, b) = (self.kind(), other.kind());
        match (a, b) {
            (Kind::Null, Kind::Null) => true,
            (Kind::Boolean, Kind::Boolean) => self.as_bool() == other.as_bool(),
            (Kind::Integer, Kind::Integer) => self.as_i64() == other.as_i64(),
            _ if a.is_number() && b.is_number() => self.as_f64() == other.as_f64(),
            (Kind::String, Kind::String) => self.as_str() == other.as_str(),
            (Kind::Array, Kind::Array) => {
                self.len() == other.len() && self.elements().zip(other.elements()).all(|(x, y)| x == y)
            }
            (Kind::Object, Kind::Object) => {
                self.len() == other.len()
                    && self.entries().all(|(k, v)| other.get(k).map_or(false, |w| v == w))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::codec::to_string(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({self})")
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value(Repr::Bool(b))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value(Repr::Int(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value(Repr::Int(i64::from(i)))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        match i64::try_from(n) {
            Ok(i) => Value(Repr::Int(i)),
            Err(_) => Value(Repr::Decimal(n as f64)),
        }
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value(Repr::Decimal(d))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(Repr::Str(s.into()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(Repr::Str(s.into()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value(Repr::Array(Arc::new(items)))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value(Repr::Object(Arc::new(map)))
    }
}

impl From<Json> for Value {
    fn from(doc: Json) -> Self {
        Value::wrap(doc)
    }
}

impl<'a> From<&'a Value> for Json {
    fn from(v: &'a Value) -> Self {
        v.to_json()
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Repr::Null => serializer.serialize_unit(),
            Repr::Bool(b) => serializer.serialize_bool(*b),
            Repr::Int(i) => serializer.serialize_i64(*i),
            Repr::Decimal(d) if d.is_finite() => serializer.serialize_f64(*d),
            Repr::Decimal(_) => serializer.serialize_unit(),
            Repr::Str(s) => serializer.serialize_str(s),
            Repr::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Repr::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Repr::Doc(doc) => doc.node().serialize(serializer),
        }
    }
}

/// Accumulates elements, then freezes them into an array value.
#[derive(Default)]
pub struct ArrayBuilder {
    items: Vec<Value>,
}

impl ArrayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { items: Vec::with_capacity(n) }
    }

    pub fn push(&mut self, v: Value) {
        self.items.push(v);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn build(self) -> Value {
        Value::from(self.items)
    }
}

/// Accumulates key/value pairs in insertion order, then freezes them.
/// Re-inserting a key replaces its value but keeps its position.
#[derive(Default)]
pub struct ObjectBuilder {
    map: IndexMap<String, Value>,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, v: Value) {
        self.map.insert(key.into(), v);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn build(self) -> Value {
        Value::from(self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn built_object() -> Value {
        let mut tags = ArrayBuilder::new();
        tags.push(Value::from("a"));
        tags.push(Value::from(2.5));
        let mut obj = ObjectBuilder::new();
        obj.insert("id", Value::from(42));
        obj.insert("tags", tags.build());
        obj.insert("none", Value::null());
        obj.build()
    }

    #[test]
    fn equality_is_representation_independent() {
        let wrapped = Value::wrap(json!({"tags": ["a", 2.5], "none": null, "id": 42}));
        assert_eq!(built_object(), wrapped);
        assert_eq!(wrapped, built_object());
        assert_eq!(Value::wrap(json!(42)), Value::from(42));
    }

    #[test]
    fn integers_equal_decimals_numerically() {
        assert_eq!(Value::from(2), Value::from(2.0));
        assert!(Value::from(2) != Value::from(2.5));
        assert!(Value::from("2") != Value::from(2));
    }

    #[test]
    fn doc_navigation_yields_children() {
        let doc = Value::wrap(json!({"a": {"b": [1, "x", null]}}));
        let b = doc.get("a").and_then(|a| a.get("b")).unwrap_or_default();
        assert_eq!(b.kind(), Kind::Array);
        assert_eq!(b.len(), Some(3));
        assert_eq!(b.at(1).and_then(|v| v.as_str().map(str::to_string)), Some("x".to_string()));
        assert_eq!(b.at(2).map(|v| v.kind()), Some(Kind::Null));
        assert!(b.at(3).is_none());
        assert!(doc.get("missing").is_none());
    }

    #[test]
    fn object_entries_keep_insertion_order() {
        let doc = Value::wrap(json!({"z": 1, "a": 2, "m": 3}));
        let keys: Vec<&str> = doc.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn to_json_round_trips_built_values() {
        assert_eq!(built_object().to_json(), json!({"id": 42, "tags": ["a", 2.5], "none": null}));
    }

    #[test]
    fn serializes_both_representations() {
        let expected = json!({"id": 42, "tags": ["a", 2.5], "none": null});
        assert_eq!(serde_json::to_value(built_object()).unwrap(), expected);
        assert_eq!(serde_json::to_value(Value::wrap(expected.clone())).unwrap(), expected);
    }

    #[test]
    fn big_unsigned_numbers_become_decimals() {
        let v = Value::wrap(json!(u64::MAX));
        assert_eq!(v.kind(), Kind::Decimal);
    }
}
