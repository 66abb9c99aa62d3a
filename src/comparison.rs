use crate::value::{Kind, Value};
use std::cmp::Ordering;

/// `null` and `false` are false; everything else is true.
pub fn is_truthy(v: &Value) -> bool {
    match v.kind() {
        Kind::Null => false,
        Kind::Boolean => v.as_bool().unwrap_or(false),
        _ => true,
    }
}

/// Ordering for the relational operators. Only two numbers or two strings
/// are comparable; `None` for every other pairing.
pub fn cmp_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.kind(), b.kind()) {
        (Kind::Integer, Kind::Integer) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        (ka, kb) if ka.is_number() && kb.is_number() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Kind::String, Kind::String) => Some(a.as_str()?.cmp(b.as_str()?)),
        _ => None,
    }
}

/// Total order used by `min`/`max`: null < booleans < numbers < strings,
/// containers compare by their serialized form.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    fn rank(k: Kind) -> u8 {
        match k {
            Kind::Null => 0,
            Kind::Boolean => 1,
            Kind::Integer | Kind::Decimal => 2,
            Kind::String => 3,
            Kind::Array => 4,
            Kind::Object => 5,
        }
    }
    if let Some(ord) = cmp_values(a, b) {
        return ord;
    }
    match (a.kind(), b.kind()) {
        (Kind::Boolean, Kind::Boolean) => a.as_bool().cmp(&b.as_bool()),
        (ka, kb) if rank(ka) != rank(kb) => rank(ka).cmp(&rank(kb)),
        (Kind::Array, Kind::Array) | (Kind::Object, Kind::Object) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => Ordering::Equal,
    }
}
