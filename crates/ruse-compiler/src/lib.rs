// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Compilation pipeline for Ruse expressions.
//!
//! `source → parse → lower → resolve → (direct emit | fallback) → bytes →
//! registry.define → Evaluator`. Everything here runs synchronously on the
//! caller's thread; concurrent compiles share only the registries, which
//! tolerate that by construction.

pub mod emit;
pub mod error;
pub mod fallback;
pub mod infer;
pub mod lower;
pub mod print;
pub mod request;
pub mod resolve;
pub mod slots;

pub use emit::{can_emit, diagnose_rejection};
pub use error::{CompilerError, TranspileError};
pub use fallback::{DynCompiler, HostCompiler, HostSource};
pub use request::{
    BytesSink, CompilerConfig, CompilerRequest, ContentKind, ContextKind, Declaration,
    DEFAULT_CLASS_NAME, GENERATED_PACKAGE,
};

use ruse_ast::Stmt;
use ruse_runtime::{CompiledEvaluator, UnitRegistry};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Compile one request against a unit registry.
///
/// Blocking; returns an instantiated evaluator backed by the (possibly
/// shared) loaded unit.
pub fn compile(
    req: &CompilerRequest,
    registry: &UnitRegistry,
) -> Result<CompiledEvaluator, CompilerError> {
    let types = registry.types().clone();
    let body = front_end(req, &types)?;

    let direct = req.config.direct_emitter_enabled && {
        match emit::diagnose_rejection(&body, req, &types) {
            None => true,
            Some(reason) => {
                if req.config.debug_can_emit {
                    debug!(source = %req.source, %reason, "direct emitter declined");
                }
                false
            }
        }
    };

    let byte_code: BTreeMap<String, Vec<u8>> = if direct {
        if req.config.debug_can_emit {
            debug!(source = %req.source, "taking the direct emission path");
        }
        emit::emit(&body, req, &types)?
    } else {
        let host = fallback::host_source(req, &body);
        trace!(generated = %host.text, "fallback host source");
        match &req.host_compiler {
            Some(compiler) => compiler.compile(&host, &types)?,
            None => DynCompiler.compile(&host, &types)?,
        }
    };

    if let Some(sink) = &req.config.persist_generated_classes {
        for (name, bytes) in &byte_code {
            sink.write(name, bytes);
        }
    }

    let installed = registry.define(&byte_code)?;
    let unit = installed
        .into_iter()
        .next()
        .ok_or_else(|| CompilerError::Compile(ruse_runtime::CompileError::new(
            "compilation produced no unit",
        )))?;

    CompiledEvaluator::new(unit, types, req.with_declaration.is_some())
        .map_err(|e| CompilerError::Compile(ruse_runtime::CompileError::new(e.to_string())))
}

/// Parse, lower and resolve: the shared front half of both paths.
fn front_end(
    req: &CompilerRequest,
    types: &ruse_runtime::TypeRegistry,
) -> Result<Vec<Stmt>, CompilerError> {
    let (expr, stmts) = match req.content {
        ContentKind::Expression => {
            let expr = ruse_parser::parse_expression(&req.source)
                .map_err(|e| CompilerError::parse(&req.source, e))?;
            (Some(expr), Vec::new())
        }
        ContentKind::Block => {
            let stmts = ruse_parser::parse_block(&req.source)
                .map_err(|e| CompilerError::parse(&req.source, e))?;
            (None, stmts)
        }
    };

    let mut body = lower::build_body(req, expr, stmts);
    resolve::resolve(&mut body, req, types)
        .map_err(|e| CompilerError::transpile(&req.source, e))?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruse_ast::{PrimitiveTag, TypeDescriptor};
    use ruse_runtime::{Evaluator, TypeRegistry, Value};
    use std::sync::Arc;

    fn registry() -> UnitRegistry {
        UnitRegistry::new(TypeRegistry::with_builtins())
    }

    fn int_decl(name: &str) -> Declaration {
        Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Int))
    }

    #[test]
    fn compiles_and_evaluates_direct_path() {
        let registry = registry();
        let req = CompilerRequest::map_expression(
            "a + b",
            TypeDescriptor::reference("java.lang.Integer"),
            vec![int_decl("a"), int_decl("b")],
        );
        let evaluator = compile(&req, &registry).unwrap();
        let ctx = Value::map([
            ("a".to_string(), Value::Int(10)),
            ("b".to_string(), Value::Int(32)),
        ]);
        assert_eq!(evaluator.eval(ctx).unwrap(), Value::Int(42));
    }

    #[test]
    fn disabled_direct_emitter_forces_fallback() {
        let registry = registry();
        let mut req = CompilerRequest::map_expression(
            "a + b",
            TypeDescriptor::reference("java.lang.Integer"),
            vec![int_decl("a"), int_decl("b")],
        );
        req.config.direct_emitter_enabled = false;
        let evaluator = compile(&req, &registry).unwrap();
        let ctx = Value::map([
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(2)),
        ]);
        assert_eq!(evaluator.eval(ctx).unwrap(), Value::Int(3));
    }

    #[test]
    fn parse_errors_carry_position() {
        let registry = registry();
        let req = CompilerRequest::map_expression(
            "a +",
            TypeDescriptor::object(),
            vec![int_decl("a")],
        );
        let err = compile(&req, &registry).unwrap_err();
        match err {
            CompilerError::Parse {
                source_text, line, ..
            } => {
                assert_eq!(source_text, "a +");
                assert_eq!(line, 1);
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn persistence_sink_receives_bytes() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Capture(Mutex<Vec<(String, usize)>>);
        impl BytesSink for Capture {
            fn write(&self, name: &str, bytes: &[u8]) {
                self.0.lock().unwrap().push((name.to_string(), bytes.len()));
            }
        }

        let registry = registry();
        let sink = Arc::new(Capture::default());
        let mut req = CompilerRequest::map_expression(
            "a",
            TypeDescriptor::reference("java.lang.Integer"),
            vec![int_decl("a")],
        );
        req.config.persist_generated_classes = Some(sink.clone());
        compile(&req, &registry).unwrap();

        let written = sink.0.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].0.starts_with("ruse.generated."));
        assert!(written[0].1 > 0);
    }
}
