use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) type Bindings = Vec<(Arc<str>, Value)>;

#[derive(Clone, Copy)]
enum Frame<'a> {
    Empty,
    Vars(&'a HashMap<String, Value>),
    Slice(&'a [(Arc<str>, Value)]),
}

/// Variable environment: a chain of read-only frames, searched innermost
/// first. Frames borrow from the evaluation that created them.
#[derive(Clone, Copy)]
pub(crate) struct Env<'a> {
    frame: Frame<'a>,
    parent: Option<&'a Env<'a>>,
}

impl<'a> Env<'a> {
    pub(crate) fn empty() -> Self {
        Env { frame: Frame::Empty, parent: None }
    }

    /// Root frame seeded from caller-supplied variables.
    pub(crate) fn vars(vars: &'a HashMap<String, Value>) -> Self {
        Env { frame: Frame::Vars(vars), parent: None }
    }

    pub(crate) fn child<'b>(&'b self, bindings: &'b [(Arc<str>, Value)]) -> Env<'b> {
        Env { frame: Frame::Slice(bindings), parent: Some(self) }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&'a Value> {
        let mut env = Some(self);
        while let Some(e) = env {
            let hit = match e.frame {
                Frame::Empty => None,
                Frame::Vars(vars) => vars.get(name),
                // later bindings shadow earlier ones in the same frame
                Frame::Slice(slice) => slice.iter().rev().find(|(k, _)| &**k == name).map(|(_, v)| v),
            };
            if hit.is_some() {
                return hit;
            }
            env = e.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inner_frames_shadow_outer() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), Value::from(1));
        vars.insert("y".to_string(), Value::from(2));
        let root = Env::vars(&vars);
        let inner: Bindings = vec![(Arc::from("x"), Value::from(10))];
        let env = root.child(&inner);
        assert_eq!(env.lookup("x"), Some(&Value::from(10)));
        assert_eq!(env.lookup("y"), Some(&Value::from(2)));
        assert_eq!(env.lookup("z"), None);
        assert_eq!(root.lookup("x"), Some(&Value::from(1)));
    }
}
