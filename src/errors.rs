use std::fmt;
use std::sync::Arc;
use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate

/// Position in a named source: 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub source: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(source: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self { source: source.into(), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

// Renders " at <loc>" for the optional-location variants.
fn at(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {loc}"),
        None => String::new(),
    }
}

// Define an enum to represent every failure the compiler or evaluator can report
#[derive(Debug, Error)] // Automatically implement `Debug` and `Error` traits for the enum
pub enum JsltError {
    // Grammar violation; always carries the position of the offending token
    #[error("syntax error at {location}: {message}")]
    Syntax { message: String, location: Location },

    // Static problem found while lowering: duplicate keys, imports, bindings
    #[error("compile error{}: {message}", at(.location))]
    Compile { message: String, location: Option<Location> },

    // Failure while applying a compiled expression to an input
    #[error("runtime error{}: {message}", at(.location))]
    Runtime { message: String, location: Option<Location> },

    // Underlying read failure (missing file, I/O fault)
    #[error("resource error: {message}")]
    Resource {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl JsltError {
    pub fn syntax(message: impl Into<String>, location: Location) -> Self {
        JsltError::Syntax { message: message.into(), location }
    }

    pub fn compile(message: impl Into<String>, location: Option<Location>) -> Self {
        JsltError::Compile { message: message.into(), location }
    }

    /// Runtime error without a location; the engine fills in the call site.
    pub fn runtime(message: impl Into<String>) -> Self {
        JsltError::Runtime { message: message.into(), location: None }
    }

    pub fn resource(message: impl Into<String>, source: std::io::Error) -> Self {
        JsltError::Resource { message: message.into(), source }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            JsltError::Syntax { location, .. } => Some(location),
            JsltError::Compile { location, .. } | JsltError::Runtime { location, .. } => {
                location.as_ref()
            }
            JsltError::Resource { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            JsltError::Syntax { message, .. }
            | JsltError::Compile { message, .. }
            | JsltError::Runtime { message, .. }
            | JsltError::Resource { message, .. } => message,
        }
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, JsltError::Runtime { .. })
    }

    /// Attach `loc` to a runtime or compile error that has none yet.
    pub(crate) fn or_at(self, loc: &Location) -> Self {
        match self {
            JsltError::Runtime { message, location: None } => {
                JsltError::Runtime { message, location: Some(loc.clone()) }
            }
            JsltError::Compile { message, location: None } => {
                JsltError::Compile { message, location: Some(loc.clone()) }
            }
            other => other,
        }
    }
}

// Type alias for results that use `JsltError` as the error type
pub type Result<T> = std::result::Result<T, JsltError>;
