//! Compiler-side error taxonomy.
//!
//! Every error carries the original source string; the parse variant adds
//! line/column, the transpile variant the semantic detail. Emitter/registry
//! failures arrive as [`ruse_runtime::CompileError`].

use ruse_parser::ParseError;
use ruse_runtime::CompileError;
use thiserror::Error;

/// Semantic failure during lowering/resolution.
#[derive(Debug, Clone, Error)]
pub enum TranspileError {
    /// A type name could not be resolved against the import set plus the
    /// well-known prefixes.
    #[error("cannot resolve type '{name}'")]
    TypeResolution { name: String },

    /// No method of that name/arity on the receiver class.
    #[error("no method '{method}/{arity}' on class {class}")]
    MethodResolution {
        class: String,
        method: String,
        arity: usize,
    },

    /// A name that is neither a declared variable nor a local.
    #[error("unknown variable '{name}'")]
    UnknownName { name: String },
}

/// Any failure of the compile pipeline.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("parse error at {line}:{column} in '{source_text}': {error}")]
    Parse {
        source_text: String,
        line: u32,
        column: u32,
        #[source]
        error: ParseError,
    },

    #[error("transpile error in '{source_text}': {error}")]
    Transpile {
        source_text: String,
        #[source]
        error: TranspileError,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl CompilerError {
    pub fn parse(source_text: &str, error: ParseError) -> Self {
        let (line, column) = error.line_col(source_text);
        Self::Parse {
            source_text: source_text.to_string(),
            line,
            column,
            error,
        }
    }

    pub fn transpile(source_text: &str, error: TranspileError) -> Self {
        Self::Transpile {
            source_text: source_text.to_string(),
            error,
        }
    }
}
