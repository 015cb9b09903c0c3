// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Expression IR and type descriptors for the Ruse expression compiler.
//!
//! # Design
//!
//! - `Span` — compact byte-range source location
//! - `TypeDescriptor` / `PrimitiveTag` / `ValueKind` — static types and
//!   their computational stack kinds
//! - `Expr` / `Stmt` — the EIR sum types; one tree serves the parser,
//!   lowering and emitter, with surface-only variants removed by lowering
//!   and `ty` annotations added by resolution

pub mod eir;
pub mod ops;
pub mod span;
pub mod types;

pub use eir::{Expr, ExprKind, Stmt, StmtKind, TimeUnit, TypeName};
pub use ops::{AssignOp, BinaryOp, UnaryOp};
pub use span::{line_col, Span};
pub use types::{method_descriptor, PrimitiveTag, TypeDescriptor, ValueKind};
