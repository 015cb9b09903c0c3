//! Runtime-side error types: evaluation failures and unit
//! compilation/definition failures.

use thiserror::Error;

/// Failure while running a compiled evaluator.
#[derive(Debug, Clone, Error)]
pub enum EvaluationError {
    /// Integer division or remainder by zero.
    #[error("/ by zero")]
    DivisionByZero,

    /// A value failed a checked cast.
    #[error("cannot cast {value} to {target}")]
    ClassCast { value: String, target: String },

    /// Null where a value was required.
    #[error("null reference {context}")]
    NullReference { context: String },

    /// No method of that name/arity on the receiver's runtime type.
    #[error("no method '{method}/{arity}' on {class}")]
    NoSuchMethod {
        class: String,
        method: String,
        arity: usize,
    },

    /// No such property on the receiver.
    #[error("no property '{field}' on {class}")]
    NoSuchProperty { class: String, field: String },

    /// Out-of-range list index.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    /// The evaluator was invoked with an eval flavor it does not serve
    /// (e.g. `eval_with` on an evaluator without a with-target).
    #[error("evaluator does not serve this input: {0}")]
    WrongFlavor(String),

    /// Operand types that the operation does not accept.
    #[error("type error: {0}")]
    Type(String),

    /// Arithmetic failure other than division by zero (overflow,
    /// non-terminating decimal expansion).
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// A broken VM invariant. Always a compiler bug, never user error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure to produce or define a code unit.
///
/// Raised by the direct emitter when it cannot build a unit it promised, by
/// the fallback compiler on diagnostics, and by the registry when a unit
/// fails structural verification or linking.
#[derive(Debug, Error)]
pub struct CompileError {
    pub message: String,
    /// Pretty-printed host source, when the failing path produced one.
    pub generated_source: Option<String>,
    /// Compiler diagnostics from the fallback path.
    pub diagnostics: Option<String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            generated_source: None,
            diagnostics: None,
            cause: None,
        }
    }

    pub fn with_generated_source(mut self, source: impl Into<String>) -> Self {
        self.generated_source = Some(source.into());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = Some(diagnostics.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(diag) = &self.diagnostics {
            write!(f, "\ndiagnostics:\n{diag}")?;
        }
        Ok(())
    }
}
