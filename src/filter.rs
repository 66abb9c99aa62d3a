use crate::comparison::is_truthy;
use crate::errors::Result;
use crate::expression::Expression;
use crate::value::Value;

/// Decides which key/value pairs survive into constructed objects.
///
/// Consulted once per explicit pair and once per merged matcher entry.
pub trait ObjectFilter: Send + Sync {
    fn keep(&self, key: &str, value: &Value) -> Result<bool>;
}

/// Drops `null` values, keeps everything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFilter;

impl ObjectFilter for DefaultFilter {
    fn keep(&self, _key: &str, value: &Value) -> Result<bool> {
        Ok(!value.is_null())
    }
}

/// Filter written as a JSLT expression, applied with the candidate value as
/// input. A truthy result keeps the pair.
#[derive(Clone)]
pub struct ExpressionFilter {
    expr: Expression,
}

impl ExpressionFilter {
    pub fn new(expr: Expression) -> Self {
        Self { expr }
    }
}

impl ObjectFilter for ExpressionFilter {
    fn keep(&self, _key: &str, value: &Value) -> Result<bool> {
        Ok(is_truthy(&self.expr.apply(value)?))
    }
}

/// Adapter so plain closures can act as filters.
pub struct FnFilter<F>(pub F);

impl<F> ObjectFilter for FnFilter<F>
where
    F: Fn(&str, &Value) -> bool + Send + Sync,
{
    fn keep(&self, key: &str, value: &Value) -> Result<bool> {
        Ok((self.0)(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn default_drops_only_null() {
        let f = DefaultFilter;
        assert!(!f.keep("a", &Value::null()).unwrap());
        assert!(f.keep("a", &Value::from(false)).unwrap());
        assert!(f.keep("a", &codec::parse("[]").unwrap()).unwrap());
    }

    #[test]
    fn expression_filter_uses_truthiness() {
        let expr = crate::compile(". != null and . != {} and . != []").unwrap();
        let f = ExpressionFilter::new(expr);
        assert!(!f.keep("a", &codec::parse("{}").unwrap()).unwrap());
        assert!(!f.keep("a", &Value::null()).unwrap());
        assert!(f.keep("a", &Value::from(0)).unwrap());
    }

    #[test]
    fn closures_are_filters() {
        let f = FnFilter(|key: &str, _: &Value| !key.starts_with('_'));
        assert!(!f.keep("_hidden", &Value::from(1)).unwrap());
        assert!(f.keep("shown", &Value::from(1)).unwrap());
    }
}
