use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};

fn eval(program: &str) -> Json {
    jslt::compile(program).unwrap().apply_json(&json!(null)).unwrap()
}

fn eval_on(program: &str, input: Json) -> Json {
    jslt::compile(program).unwrap().apply_json(&input).unwrap()
}

#[test]
fn test_number_conversion() {
    assert_eq!(eval(r#"number("12")"#), json!(12));
    assert_eq!(eval(r#"number("-1.5e1")"#), json!(-15.0));
    assert_eq!(eval(r#"number("twelve", 0)"#), json!(0));
    assert_eq!(eval("number(null)"), json!(null));
    assert!(jslt::compile(r#"number("twelve")"#).unwrap().apply_json(&json!(null)).is_err());
}

#[test]
fn test_numeric_helpers() {
    assert_eq!(eval("[round(1.5), floor(1.9), ceiling(1.1), round(3)]"), json!([2, 1, 2, 3]));
    assert_eq!(eval("sum([1, 2, 3])"), json!(6));
    assert_eq!(eval("mod(-7, 3)"), json!(2));
    assert_eq!(eval("[min(1, 2), max(1, 2), min(null, 1)]"), json!([1, 2, null]));
    let r = eval("random()").as_f64().unwrap();
    assert!((0.0..1.0).contains(&r), "{r}");
}

#[test]
fn test_type_predicates() {
    assert_eq!(
        eval(r#"[is-number(1), is-integer(1.5), is-decimal(1.5), is-string("s"), is-boolean(null), is-array([]), is-object({})]"#),
        json!([true, false, true, true, false, true, true])
    );
}

#[test]
fn test_string_and_boolean() {
    assert_eq!(eval(r#"[string(12), string("x"), string([1, true])]"#), json!(["12", "x", "[1,true]"]));
    assert_eq!(eval(r#"[boolean(0), boolean(""), boolean(null), not(false)]"#), json!([true, true, false, true]));
}

#[test]
fn test_size_and_contains() {
    assert_eq!(eval(r#"[size("héllo"), size([1, 2]), size({"a": 1}), size(null)]"#), json!([5, 2, 1, null]));
    assert_eq!(
        eval(r#"[contains(2, [1, 2]), contains("a", {"a": 1}), contains("ell", "hello"), contains(1, null)]"#),
        json!([true, true, true, false])
    );
}

#[test]
fn test_string_functions() {
    assert_eq!(eval(r#"[lowercase("AbC"), uppercase("abc"), trim("  x ")]"#), json!(["abc", "ABC", "x"]));
    assert_eq!(eval(r#"[starts-with("prefix", "pre"), ends-with("prefix", "fix"), starts-with(null, "x")]"#), json!([true, true, false]));
    assert_eq!(eval(r#"join(["a", 1, null], "-")"#), json!("a-1-null"));
}

#[test]
fn test_regex_functions() {
    assert_eq!(eval(r#"test("abc123", "[0-9]+")"#), json!(true));
    assert_eq!(eval(r#"split("a1b22c", "[0-9]+")"#), json!(["a", "b", "c"]));
    assert_eq!(
        eval(r#"capture("2024-05-17", "(?P<year>[0-9]{4})-(?P<month>[0-9]{2})")"#),
        json!({"year": "2024", "month": "05"})
    );
    assert_eq!(eval(r#"replace("a-b-c", "-", "+")"#), json!("a+b+c"));
}

#[test]
fn test_json_text() {
    assert_eq!(eval(r#"from-json("{\"a\": [1, 2]}")"#), json!({"a": [1, 2]}));
    assert_eq!(eval(r#"from-json("{oops", "bad")"#), json!("bad"));
    assert_eq!(eval_on("to-json(.)", json!({"a": [1, "x"]})), json!(r#"{"a":[1,"x"]}"#));
}

#[test]
fn test_array_helpers() {
    assert_eq!(eval_on("array(.)", json!({"a": 1})), json!([{"key": "a", "value": 1}]));
    assert_eq!(eval("flatten([1, [2, [3]], []])"), json!([1, 2, 3]));
    assert_eq!(eval("[all([true, 1]), all([true, null]), any([false, 0]), any([])]"), json!([true, false, true, false]));
    assert_eq!(eval(r#"zip(["a", "b"], [1, 2])"#), json!([["a", 1], ["b", 2]]));
    assert_eq!(eval(r#"[index-of([1, 2, 3], 3), index-of([1], 9)]"#), json!([2, -1]));
}

#[test]
fn test_get_key() {
    let input = json!({"obj": {"my key": 1}, "k": "my key"});
    assert_eq!(eval_on("get-key(.obj, .k)", input.clone()), json!(1));
    assert_eq!(eval_on(r#"get-key(.obj, "absent", "dflt")"#, input.clone()), json!("dflt"));
    assert_eq!(eval_on(r#"get-key(.none, "x")"#, input), json!(null));
}

#[test]
fn test_time_functions() {
    assert!(eval("now()").as_f64().unwrap() > 1.5e9);
    assert_eq!(eval(r#"format-time(86400, "%Y-%m-%d", "UTC")"#), json!("1970-01-02"));
    assert_eq!(eval(r#"format-time(null, "%Y")"#), json!(null));
}

#[test]
fn test_uuid_from_parts() {
    assert_eq!(eval("uuid(0, 1)"), json!("00000000-0000-0000-0000-000000000001"));
}

#[test]
fn test_type_error_names_function_and_position() {
    let err = jslt::compile(r#"join("not an array", ",")"#).unwrap().apply_json(&json!(null)).unwrap_err();
    assert_eq!(err.message(), "join: argument 1 must be an array, got string");
}
