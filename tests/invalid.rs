use jslt::{Compiler, JsltError, DEFAULT_MAX_CALL_DEPTH};
use pretty_assertions::assert_eq;
use serde_json::json;

fn runtime_error(program: &str, input: serde_json::Value) -> JsltError {
    let expr = jslt::compile(program).unwrap();
    match expr.apply_json(&input) {
        Ok(out) => panic!("expected a runtime error from {program}, got {out}"),
        Err(e) => e,
    }
}

fn compile_error(program: &str) -> JsltError {
    match jslt::compile(program) {
        Ok(_) => panic!("expected {program} to be rejected"),
        Err(e) => e,
    }
}

#[test]
fn test_syntax_error_carries_location() {
    let err = Compiler::new().source_name("bad.jslt").compile("{\"a\": 1,\n  \"b\" 2}").unwrap_err();
    assert!(matches!(err, JsltError::Syntax { .. }), "{err}");
    let loc = err.location().unwrap();
    assert_eq!((&*loc.source, loc.line, loc.column), ("bad.jslt", 2, 7));
}

#[test]
fn test_unbalanced_and_trailing_input() {
    assert!(matches!(compile_error("[1, 2"), JsltError::Syntax { .. }));
    assert!(matches!(compile_error(".a 1"), JsltError::Syntax { .. }));
    assert!(matches!(compile_error("let x = 1"), JsltError::Syntax { .. }));
}

#[test]
fn test_comparison_is_not_associative() {
    assert!(matches!(compile_error("1 < 2 < 3"), JsltError::Syntax { .. }));
}

#[test]
fn test_duplicate_object_keys() {
    assert!(matches!(compile_error(r#"{"a": 1, "a": 2}"#), JsltError::Compile { .. }));
}

#[test]
fn test_duplicate_function_declaration() {
    assert!(matches!(compile_error("def f() 1 def f() 2 f()"), JsltError::Compile { .. }));
}

#[test]
fn test_unknown_variable() {
    let err = runtime_error("$nope", json!({}));
    assert!(err.to_string().contains("no such variable '$nope'"), "{err}");
}

#[test]
fn test_then_lets_invisible_in_else() {
    let err = runtime_error("if (.flag) let a = 1 $a else $a", json!({"flag": false}));
    assert!(err.is_runtime(), "{err}");
}

#[test]
fn test_unknown_function_fails_at_call_with_location() {
    let expr = jslt::compile("if (.call)\n  no-such-function(1)\nelse 0").unwrap();
    assert_eq!(expr.apply_json(&json!({"call": false})).unwrap(), json!(0));
    let err = expr.apply_json(&json!({"call": true})).unwrap_err();
    assert!(err.to_string().contains("no-such-function"), "{err}");
    let loc = err.location().unwrap();
    assert_eq!((loc.line, loc.column), (2, 3));
}

#[test]
fn test_arity_errors_name_the_function() {
    for program in ["size(1, 2)", "size()", "def f(a) $a f(1, 2)", "fallback()"] {
        let err = runtime_error(program, json!(null));
        let name = program.split(&['(', ' '][..]).find(|p| ["size", "f", "fallback"].contains(p)).unwrap();
        assert!(err.to_string().contains(&format!("function '{name}' takes")), "{program}: {err}");
    }
}

#[test]
fn test_type_errors() {
    assert!(runtime_error(r#"1 + "a""#, json!(null)).to_string().contains("can't apply '+' to integer and string"));
    assert!(runtime_error(".a.b", json!({"a": 1})).to_string().contains("can't get key 'b' from integer"));
    assert!(runtime_error(".a[0]", json!({"a": true})).is_runtime());
    assert!(runtime_error(".a[\"x\"]", json!({"a": [1]})).to_string().contains("index must be an integer"));
    assert!(runtime_error("[for (5) .]", json!(null)).is_runtime());
    assert!(runtime_error("{1: 2}", json!(null)).to_string().contains("object key must be a string"));
    assert!(runtime_error("{* : 5}", json!(null)).to_string().contains("matcher must produce an object"));
    assert!(runtime_error(r#""a" < 1"#, json!(null)).is_runtime());
}

#[test]
fn test_arithmetic_faults() {
    assert!(runtime_error("1 / 0", json!(null)).to_string().contains("division by zero"));
    assert!(runtime_error("1 % 0", json!(null)).to_string().contains("modulo by zero"));
    assert!(runtime_error("9223372036854775807 + 1", json!(null)).to_string().contains("integer overflow"));
}

#[test]
fn test_error_builtin() {
    let err = runtime_error(r#"error("custom " + .why)"#, json!({"why": "failure"}));
    assert_eq!(err.message(), "error: custom failure");
}

#[test]
fn test_runtime_error_does_not_poison_expression() {
    let expr = jslt::compile(".a + 1").unwrap();
    assert!(expr.apply_json(&json!({"a": "x"})).is_err());
    assert_eq!(expr.apply_json(&json!({"a": 1})).unwrap(), json!(2));
}

#[test]
fn test_recursion_depth_is_bounded() {
    let expr = Compiler::new().max_call_depth(64).compile("def loop(x) loop($x) loop(1)").unwrap();
    let err = expr.apply_json(&json!(null)).unwrap_err();
    assert!(err.to_string().contains("maximum function call depth (64)"), "{err}");
}

#[test]
fn test_default_call_depth_fits_the_stack() {
    let countdown = |n: usize| format!("def down(n) if ($n == 0) 0 else down($n - 1) down({n})");
    let expr = jslt::compile(&countdown(DEFAULT_MAX_CALL_DEPTH - 1)).unwrap();
    assert_eq!(expr.apply_json(&json!(null)).unwrap(), json!(0));
    let err = runtime_error(&countdown(DEFAULT_MAX_CALL_DEPTH), json!(null));
    assert!(err.to_string().contains("maximum function call depth (1000)"), "{err}");
}

#[test]
fn test_deep_nesting_is_a_syntax_error() {
    let deep = format!("{}1{}", "[".repeat(2000), "]".repeat(2000));
    let err = compile_error(&deep);
    assert!(matches!(err, JsltError::Syntax { .. }), "{err}");
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let nested = format!("{}1{}", "[".repeat(400), "]".repeat(400));
    let out = jslt::compile(&nested).unwrap().apply(&jslt::Value::null()).unwrap();
    assert_eq!(out.kind(), jslt::Kind::Array);
}

#[test]
fn test_missing_program_file() {
    let err = jslt::compile_file("/definitely/not/here.jslt").unwrap_err();
    assert!(matches!(err, JsltError::Resource { .. }), "{err}");
}

#[test]
fn test_ambiguous_reflective_binding() {
    let scope = jslt::FunctionScope::new("overloads")
        .define("pick", 1..=1, |_, _| Ok(jslt::Value::null()))
        .define("pick", 2..=2, |_, _| Ok(jslt::Value::null()));
    let err = Compiler::new().wrap("pick", &[&scope], "pick", None).err().unwrap();
    assert!(matches!(err, JsltError::Compile { .. }), "{err}");
    assert!(Compiler::new().wrap("pick", &[&scope], "pick", Some(2)).is_ok());
}
