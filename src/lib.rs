//! JSLT: compile a JSON transformation once, apply it to many documents.
//!
//! ```
//! let expr = jslt::compile(r#"{"name": .user.name, * : .}"#).unwrap();
//! let input = jslt::codec::parse(r#"{"user": {"name": "ada"}, "id": 7}"#).unwrap();
//! let out = expr.apply(&input).unwrap();
//! assert_eq!(jslt::codec::to_string(&out), r#"{"name":"ada","user":{"name":"ada"},"id":7}"#);
//! ```

pub mod errors;
pub mod value;
pub mod codec;
pub mod functions; // plugin model
pub mod filter;
pub mod module;
mod comparison;
mod lexer;
mod syntax;
mod parser;
mod expression;
mod compiler;
mod context;
mod engine;

use std::path::Path;

pub use compiler::{Compiler, DEFAULT_MAX_CALL_DEPTH};
pub use errors::{JsltError, Location, Result};
pub use expression::{Expression, Module};
pub use filter::{DefaultFilter, ExpressionFilter, FnFilter, ObjectFilter};
pub use functions::reflect::FunctionScope;
pub use functions::{Function, LazyArgs, Macro, Registry, VARIADIC};
pub use module::{DirectoryResolver, MapResolver, ModuleResolver};
pub use value::{ArrayBuilder, Kind, ObjectBuilder, Value};

/// Compile with the default configuration.
pub fn compile(source: &str) -> Result<Expression> {
    Compiler::new().compile(source)
}

/// Compile a program file with the default configuration.
pub fn compile_file(path: impl AsRef<Path>) -> Result<Expression> {
    Compiler::new().compile_file(path)
}
