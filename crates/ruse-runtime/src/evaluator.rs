//! The evaluator contract and the unit-backed implementation.

use crate::error::EvaluationError;
use crate::exec::execute_method;
use crate::types::TypeRegistry;
use crate::unit::{LoadedUnit, EVAL_METHOD};
use crate::value::Value;
use std::sync::Arc;

/// A compiled expression, ready to run.
pub trait Evaluator: Send + Sync {
    /// Evaluate against a context value.
    fn eval(&self, context: Value) -> Result<Value, EvaluationError>;

    /// Evaluate against a `with` target. Only served when the compilation
    /// declared one.
    fn eval_with(&self, _with: Value) -> Result<Value, EvaluationError> {
        Err(EvaluationError::WrongFlavor(
            "no 'with' target was declared for this evaluator".to_string(),
        ))
    }
}

/// Evaluator backed by a loaded code unit.
///
/// Instances are cheap: they share the unit through an `Arc`, so a thousand
/// evaluators compiled from semantically identical rules still hold one
/// loaded unit between them.
#[derive(Debug)]
pub struct CompiledEvaluator {
    unit: Arc<LoadedUnit>,
    types: Arc<TypeRegistry>,
    entry: usize,
    has_with_target: bool,
}

impl CompiledEvaluator {
    pub fn new(
        unit: Arc<LoadedUnit>,
        types: Arc<TypeRegistry>,
        has_with_target: bool,
    ) -> Result<Self, EvaluationError> {
        let (entry, _) = unit.unit.method_named(EVAL_METHOD).ok_or_else(|| {
            EvaluationError::Internal(format!("unit '{}' has no {EVAL_METHOD} method", unit.name()))
        })?;
        Ok(Self {
            unit,
            types,
            entry,
            has_with_target,
        })
    }

    /// The backing unit (shared across evaluators with equal content).
    pub fn unit(&self) -> &Arc<LoadedUnit> {
        &self.unit
    }
}

impl Evaluator for CompiledEvaluator {
    fn eval(&self, context: Value) -> Result<Value, EvaluationError> {
        execute_method(&self.unit, self.entry, &[context], &self.types)
    }

    fn eval_with(&self, with: Value) -> Result<Value, EvaluationError> {
        if !self.has_with_target {
            return Err(EvaluationError::WrongFlavor(
                "no 'with' target was declared for this evaluator".to_string(),
            ));
        }
        execute_method(&self.unit, self.entry, &[with], &self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CodeBuilder, Op, UnitBuilder};
    use crate::unit::load;
    use ruse_ast::ValueKind;

    fn identity_evaluator(has_with: bool) -> CompiledEvaluator {
        let types = TypeRegistry::with_builtins();
        let mut builder = UnitBuilder::new("ruse.generated.Id");
        let mut code = CodeBuilder::new();
        code.emit(Op::Load(ValueKind::Reference, 1));
        code.emit(Op::Return(ValueKind::Reference));
        builder.add_method(
            "eval",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            2,
            code.finish().unwrap(),
        );
        let loaded = load(&builder.build(), &types).unwrap();
        CompiledEvaluator::new(loaded, types, has_with).unwrap()
    }

    #[test]
    fn eval_runs_entry_method() {
        let evaluator = identity_evaluator(false);
        assert_eq!(evaluator.eval(Value::Int(3)).unwrap(), Value::Int(3));
    }

    #[test]
    fn eval_with_requires_declared_target() {
        let without = identity_evaluator(false);
        assert!(matches!(
            without.eval_with(Value::Int(1)),
            Err(EvaluationError::WrongFlavor(_))
        ));

        let with = identity_evaluator(true);
        assert_eq!(with.eval_with(Value::Int(1)).unwrap(), Value::Int(1));
    }
}
