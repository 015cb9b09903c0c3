//! Stack-kind inference — the source of truth for widening decisions.
//!
//! Given a resolved expression, [`stack_kind`] answers what computational
//! kind its emission leaves on the operand stack. The emitter's instruction
//! selection must agree with this function on every node, or the loader's
//! verifier rejects the unit.

use ruse_ast::{BinaryOp, Expr, ExprKind, UnaryOp, ValueKind};

/// The kind an expression's value occupies on the stack.
///
/// Comparisons and logical operators are boolean (int-kind); arithmetic is
/// the widened numeric kind of its operands; resolved calls carry their
/// reflective return kind; everything else is a reference.
pub fn stack_kind(expr: &Expr) -> ValueKind {
    match &expr.kind {
        ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Char(_) => ValueKind::Int,
        ExprKind::Long(_) => ValueKind::Long,
        ExprKind::Float(_) => ValueKind::Float,
        ExprKind::Double(_) => ValueKind::Double,
        ExprKind::Str(_) | ExprKind::Null => ValueKind::Reference,

        ExprKind::Enclosed(inner) => stack_kind(inner),

        ExprKind::Unary { op, inner } => match op {
            UnaryOp::Not => ValueKind::Int,
            UnaryOp::Neg | UnaryOp::BitNot => stack_kind(inner),
        },

        ExprKind::Binary { op, left, right } => {
            if op.is_comparison() || op.is_logical() {
                return ValueKind::Int;
            }
            if matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr) {
                return stack_kind(left);
            }
            let (l, r) = (stack_kind(left), stack_kind(right));
            match ValueKind::widen(l, r) {
                Some(widened) => widened,
                // string concatenation and big-number operands
                None => ValueKind::Reference,
            }
        }

        ExprKind::Assign { target, .. } => stack_kind(target),

        // Name, Call, Cast, FieldGet, Index, Cond, New and the literal
        // factories all carry their resolved descriptor.
        _ => expr
            .ty
            .as_ref()
            .map(|ty| ty.value_kind())
            .unwrap_or(ValueKind::Reference),
    }
}
