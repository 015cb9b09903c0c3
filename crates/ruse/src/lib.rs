// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Ruse — compiles rule-language expressions into shared, deduplicated
//! evaluators.
//!
//! One expression compiles to one loadable code unit; semantically
//! identical expressions share a single loaded unit through the registry's
//! content hash. The fluent [`Ruse`] builder is the front door:
//!
//! ```
//! use ruse::{Declaration, Ruse, TypeDescriptor, PrimitiveTag, Value, Evaluator};
//!
//! let evaluator = Ruse::map(vec![
//!         Declaration::new("influence", TypeDescriptor::primitive(PrimitiveTag::Int)),
//!         Declaration::new("atWar", TypeDescriptor::primitive(PrimitiveTag::Boolean)),
//!     ])
//!     .out(TypeDescriptor::reference("java.lang.Boolean"))
//!     .expression("influence > 50 && !atWar")
//!     .compile()
//!     .unwrap();
//!
//! let ctx = Value::map([
//!     ("influence".to_string(), Value::Int(75)),
//!     ("atWar".to_string(), Value::Bool(false)),
//! ]);
//! assert_eq!(evaluator.eval(ctx).unwrap(), Value::Bool(true));
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

pub use ruse_ast::{PrimitiveTag, TypeDescriptor};
pub use ruse_compiler::{
    compile, can_emit, diagnose_rejection, BytesSink, CompilerConfig, CompilerError,
    CompilerRequest, ContentKind, ContextKind, Declaration, DynCompiler, HostCompiler, HostSource,
    TranspileError,
};
pub use ruse_parser::{ParseError, ParseErrorKind};
pub use ruse_runtime::{
    declared, method, static_method, varargs_static, BigDec, BigInt, ClassInfo, CompileError,
    CompiledEvaluator, EvaluationError, Evaluator, LoadedUnit, MethodInfo, Pojo, TypeRegistry,
    UnitRegistry, Value,
};

/// Root error type: callers catch this to handle any core-originated
/// failure.
#[derive(Debug, Error)]
pub enum Error {
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

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl From<CompilerError> for Error {
    fn from(err: CompilerError) -> Self {
        match err {
            CompilerError::Parse {
                source_text,
                line,
                column,
                error,
            } => Error::Parse {
                source_text,
                line,
                column,
                error,
            },
            CompilerError::Transpile { source_text, error } => {
                Error::Transpile { source_text, error }
            }
            CompilerError::Compile(e) => Error::Compile(e),
        }
    }
}

/// Entry points, one per context shape.
pub struct Ruse;

impl Ruse {
    /// MAP context: variables resolve by name through `context.get`.
    pub fn map(declarations: Vec<Declaration>) -> Builder {
        Builder::new(
            ContextKind::Map,
            Declaration::new("__context", TypeDescriptor::reference("java.util.Map")),
            declarations,
        )
    }

    /// LIST context: variables resolve by declaration position.
    pub fn list(declarations: Vec<Declaration>) -> Builder {
        Builder::new(
            ContextKind::List,
            Declaration::new("__context", TypeDescriptor::reference("java.util.List")),
            declarations,
        )
    }

    /// POJO context: variables resolve through bean getters on the
    /// receiver.
    pub fn pojo(context: Declaration, declarations: Vec<Declaration>) -> Builder {
        Builder::new(ContextKind::Pojo, context, declarations)
    }
}

/// Fluent compilation builder.
pub struct Builder {
    request: CompilerRequest,
    registry: Option<Arc<UnitRegistry>>,
}

impl Builder {
    fn new(kind: ContextKind, context: Declaration, declarations: Vec<Declaration>) -> Self {
        let mut request = CompilerRequest::map_expression(
            "",
            TypeDescriptor::object(),
            declarations,
        );
        request.context_kind = kind;
        request.context_declaration = context;
        Self {
            request,
            registry: None,
        }
    }

    /// Expected output type.
    pub fn out(mut self, ty: TypeDescriptor) -> Self {
        self.request.out = ty;
        self
    }

    /// Compile a single expression.
    pub fn expression(mut self, source: impl Into<String>) -> Self {
        self.request.source = source.into();
        self.request.content = ContentKind::Expression;
        self
    }

    /// Compile a statement block.
    pub fn block(mut self, source: impl Into<String>) -> Self {
        self.request.source = source.into();
        self.request.content = ContentKind::Block;
        self
    }

    pub fn import(mut self, fqcn: impl Into<String>) -> Self {
        self.request.imports.insert(fqcn.into());
        self
    }

    pub fn imports(mut self, imports: impl IntoIterator<Item = String>) -> Self {
        self.request.imports.extend(imports);
        self
    }

    pub fn static_imports(mut self, imports: impl IntoIterator<Item = String>) -> Self {
        self.request.static_imports = imports.into_iter().collect::<BTreeSet<_>>();
        self
    }

    /// Declare a `with` target, enabling the `eval_with` flavor.
    pub fn with(mut self, declaration: Declaration) -> Self {
        self.request.with_declaration = Some(declaration);
        self
    }

    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.request.class_name = name.into();
        self
    }

    pub fn config(mut self, config: CompilerConfig) -> Self {
        self.request.config = config;
        self
    }

    pub fn host_compiler(mut self, compiler: Arc<dyn HostCompiler>) -> Self {
        self.request.host_compiler = Some(compiler);
        self
    }

    /// Share a unit registry across compilations (the dedup scope).
    pub fn registry(mut self, registry: Arc<UnitRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn compile(self) -> Result<CompiledEvaluator, Error> {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(UnitRegistry::new(TypeRegistry::with_builtins())));
        ruse_compiler::compile(&self.request, &registry).map_err(Error::from)
    }
}

/// Shortcut mirroring the classic map-expression entry point.
pub fn compile_map_expression(
    source: &str,
    out: TypeDescriptor,
    declarations: Vec<Declaration>,
    registry: &Arc<UnitRegistry>,
) -> Result<CompiledEvaluator, Error> {
    Ruse::map(declarations)
        .out(out)
        .expression(source)
        .registry(registry.clone())
        .compile()
}

/// Shortcut mirroring the classic map-block entry point.
pub fn compile_map_block(
    source: &str,
    out: TypeDescriptor,
    declarations: Vec<Declaration>,
    registry: &Arc<UnitRegistry>,
) -> Result<CompiledEvaluator, Error> {
    Ruse::map(declarations)
        .out(out)
        .block(source)
        .registry(registry.clone())
        .compile()
}
