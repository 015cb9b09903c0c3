// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Runtime for compiled Ruse evaluators.
//!
//! # Design
//!
//! - `chunk` — the code-unit instruction set, builders, and byte format
//! - `unit` — decoding, structural verification and method-ref linking
//! - `exec` — the stack VM with target-faithful numeric semantics
//! - `digest` — normalized instruction rendering + Murmur3-F content hash
//! - `registry` — content-deduplicating unit definition
//! - `types` — the emit-time introspection boundary (classes, methods,
//!   natives) with its concurrent lookup cache
//! - `value` / `bignum` — the boxed value model and big-number arithmetic
//! - `evaluator` — the `Evaluator` trait and the unit-backed implementation

pub mod bignum;
pub mod chunk;
pub mod digest;
pub mod error;
pub mod exec;
pub mod evaluator;
pub mod registry;
pub mod stdlib;
pub mod types;
pub mod unit;
pub mod value;

pub use bignum::{BigDec, BigInt};
pub use chunk::{
    decode_unit, encode_unit, Cmp, CodeBuilder, CodeUnit, IntWidth, Label, MethodDef, NumKind, Op,
    PoolConst, UnitBuilder,
};
pub use error::{CompileError, EvaluationError};
pub use evaluator::{CompiledEvaluator, Evaluator};
pub use exec::execute_method;
pub use registry::UnitRegistry;
pub use types::{
    declared, method, static_method, varargs_static, ClassInfo, MethodInfo, NativeFn, TypeRegistry,
};
pub use unit::{load, LoadedUnit, MethodBinding, EVAL_METHOD};
pub use value::{ListRef, MapRef, Pojo, Value};
