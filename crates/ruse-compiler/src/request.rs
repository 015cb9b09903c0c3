//! Compilation request and configuration.

use crate::fallback::HostCompiler;
use ruse_ast::TypeDescriptor;
use std::collections::BTreeSet;
use std::sync::Arc;

/// How variable names resolve against the runtime context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// `name` → `context.get("name")` plus a checked cast.
    Map,
    /// `name` → `context.get(index)` by declaration position.
    List,
    /// `name` → `context.getName()` via registered getter signatures.
    Pojo,
}

/// A (name, type) binding supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub ty: TypeDescriptor,
}

impl Declaration {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Whether the source is a single expression or a statement block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Expression,
    Block,
}

/// Destination for generated unit bytes when persistence is enabled.
pub trait BytesSink: Send + Sync {
    fn write(&self, name: &str, bytes: &[u8]);
}

/// Compiler knobs.
#[derive(Clone, Default)]
pub struct CompilerConfig {
    /// When false, every compilation takes the fallback path.
    pub direct_emitter_enabled: bool,
    /// Trace which path each request took and why.
    pub debug_can_emit: bool,
    /// Also hand generated bytes to this sink. Not core; off by default.
    pub persist_generated_classes: Option<Arc<dyn BytesSink>>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self {
            direct_emitter_enabled: true,
            debug_can_emit: false,
            persist_generated_classes: None,
        }
    }
}

/// Package every generated unit lives in.
pub const GENERATED_PACKAGE: &str = "ruse.generated";

/// Default simple name for generated evaluator units.
pub const DEFAULT_CLASS_NAME: &str = "RuseEvaluator__";

/// One compilation: source, declarations, context shape, output type.
#[derive(Clone)]
pub struct CompilerRequest {
    pub context_kind: ContextKind,
    /// The receiver: its name becomes the eval parameter.
    pub context_declaration: Declaration,
    /// Ordered. Order is the resolution index for LIST contexts.
    pub declarations: Vec<Declaration>,
    /// Present when the caller wants the `eval_with` flavor.
    pub with_declaration: Option<Declaration>,
    pub content: ContentKind,
    pub source: String,
    pub out: TypeDescriptor,
    /// Reference type names reachable by simple name.
    pub imports: BTreeSet<String>,
    /// `fqcn.method` names for scope-less free-function calls (fallback
    /// path only).
    pub static_imports: BTreeSet<String>,
    /// Simple name of the generated unit.
    pub class_name: String,
    /// Replaces the built-in fallback compiler when set.
    pub host_compiler: Option<Arc<dyn HostCompiler>>,
    pub config: CompilerConfig,
}

impl CompilerRequest {
    /// A MAP-context expression request with defaults for everything else.
    pub fn map_expression(
        source: impl Into<String>,
        out: TypeDescriptor,
        declarations: Vec<Declaration>,
    ) -> Self {
        Self {
            context_kind: ContextKind::Map,
            context_declaration: Declaration::new(
                "__context",
                TypeDescriptor::reference("java.util.Map"),
            ),
            declarations,
            with_declaration: None,
            content: ContentKind::Expression,
            source: source.into(),
            out,
            imports: BTreeSet::new(),
            static_imports: BTreeSet::new(),
            class_name: DEFAULT_CLASS_NAME.to_string(),
            host_compiler: None,
            config: CompilerConfig::new(),
        }
    }

    /// Fully qualified name of the generated unit.
    pub fn fqcn(&self) -> String {
        format!("{GENERATED_PACKAGE}.{}", self.class_name)
    }

    /// Declaration-table position of a name (LIST resolution index).
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.declarations.iter().position(|d| d.name == name)
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name)
    }
}
