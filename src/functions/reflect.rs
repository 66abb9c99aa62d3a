//! Late binding of externally defined callables by name.
//!
//! A [`FunctionScope`] plays the part of a class or namespace: it lists
//! callables under member names, possibly several per name (overloads).
//! [`wrap`] looks a member up across scopes tried in order and refuses to
//! guess when a name is ambiguous.

use super::Function;
use crate::errors::{JsltError, Result};
use crate::value::Value;
use std::ops::RangeInclusive;
use std::sync::Arc;

type Callable = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
struct Member {
    name: String,
    arity: RangeInclusive<usize>,
    f: Callable,
}

/// Named lookup scope holding candidate callables.
#[derive(Clone)]
pub struct FunctionScope {
    name: String,
    members: Vec<Member>,
}

impl FunctionScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), members: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a candidate. The same member name may be defined repeatedly.
    pub fn define<F>(mut self, member: &str, arity: RangeInclusive<usize>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.members.push(Member { name: member.to_string(), arity, f: Arc::new(f) });
        self
    }

    fn candidates<'s>(&'s self, member: &'s str, params: Option<usize>) -> impl Iterator<Item = &'s Member> + 's {
        self.members
            .iter()
            .filter(move |m| m.name == member && params.map_or(true, |n| m.arity.contains(&n)))
    }
}

struct Wrapped {
    name: String,
    arity: RangeInclusive<usize>,
    f: Callable,
}

impl Function for Wrapped {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> RangeInclusive<usize> {
        self.arity.clone()
    }

    fn call(&self, input: &Value, args: &[Value]) -> Result<Value> {
        (self.f)(input, args)
    }
}

/// Bind `member` from the first scope that defines it, exposed as `exposed`.
///
/// `params` disambiguates overloads by argument count and fixes the
/// exposed arity. Fails when no scope defines the member, or when the first
/// scope that does has more than one matching candidate.
pub fn wrap(
    exposed: &str,
    scopes: &[&FunctionScope],
    member: &str,
    params: Option<usize>,
) -> Result<Arc<dyn Function>> {
    for scope in scopes {
        let found: Vec<&Member> = scope.candidates(member, params).collect();
        match found.as_slice() {
            [] => continue,
            [only] => {
                let arity = params.map_or_else(|| only.arity.clone(), |n| n..=n);
                return Ok(Arc::new(Wrapped { name: exposed.to_string(), arity, f: only.f.clone() }));
            }
            many => {
                return Err(JsltError::compile(
                    format!(
                        "ambiguous function binding: {} candidates named '{member}' in '{}'",
                        many.len(),
                        scope.name
                    ),
                    None,
                ));
            }
        }
    }
    let searched: Vec<&str> = scopes.iter().map(|s| s.name()).collect();
    Err(JsltError::compile(
        format!("no function named '{member}' in [{}]", searched.join(", ")),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn math() -> FunctionScope {
        FunctionScope::new("math")
            .define("pow", 2..=2, |_, args| {
                let base = args[0].as_f64().unwrap_or(0.0);
                let exp = args[1].as_f64().unwrap_or(0.0);
                Ok(Value::from(base.powf(exp)))
            })
            .define("abs", 1..=1, |_, args| Ok(Value::from(args[0].as_f64().unwrap_or(0.0).abs())))
            .define("abs", 2..=2, |_, _| Ok(Value::null()))
    }

    #[test]
    fn binds_unique_member() {
        let scope = math();
        let f = wrap("power", &[&scope], "pow", None).unwrap();
        assert_eq!(f.name(), "power");
        assert_eq!(f.call(&Value::null(), &[Value::from(2), Value::from(10)]).unwrap(), Value::from(1024.0));
    }

    #[test]
    fn ambiguous_member_fails_fast() {
        let scope = math();
        let err = wrap("abs", &[&scope], "abs", None).err().unwrap();
        assert!(err.to_string().contains("ambiguous"), "{err}");
    }

    #[test]
    fn parameter_count_disambiguates() {
        let scope = math();
        let f = wrap("abs", &[&scope], "abs", Some(1)).unwrap();
        assert_eq!(f.arity(), 1..=1);
        assert_eq!(f.call(&Value::null(), &[Value::from(-3.0)]).unwrap(), Value::from(3.0));
    }

    #[test]
    fn scopes_are_tried_in_order() {
        let first = FunctionScope::new("first");
        let second = FunctionScope::new("second").define("hello", 0..=0, |_, _| Ok(Value::from("hi")));
        let f = wrap("hello", &[&first, &second], "hello", None).unwrap();
        assert_eq!(f.call(&Value::null(), &[]).unwrap(), Value::from("hi"));
        let err = wrap("nope", &[&first, &second], "nope", None).err().unwrap();
        assert!(err.to_string().contains("[first, second]"), "{err}");
    }
}
