//! Capability gate: decides whether the direct emitter handles a lowered
//! body, and names the first unsupported construct when it does not.
//!
//! The supported subset is exactly the one the emitter implements; every
//! rejection routes the request to the fallback path. The permanent
//! rejection categories (scope-less free functions, erased collection
//! chains, big-number compound operators, reference-only concatenation,
//! deep chains, indexing, conditional expressions) all surface here.

use crate::request::CompilerRequest;
use ruse_ast::{AssignOp, BinaryOp, Expr, ExprKind, Stmt, StmtKind, UnaryOp, ValueKind};
use ruse_runtime::TypeRegistry;
use std::collections::BTreeSet;

/// True when every node of the lowered, resolved body is in the emitter's
/// supported subset.
pub fn can_emit(body: &[Stmt], req: &CompilerRequest, types: &TypeRegistry) -> bool {
    diagnose_rejection(body, req, types).is_none()
}

/// The first unsupported node, as a human-readable reason. `None` means the
/// body is emittable.
pub fn diagnose_rejection(
    body: &[Stmt],
    req: &CompilerRequest,
    types: &TypeRegistry,
) -> Option<String> {
    let mut env: BTreeSet<String> = BTreeSet::new();
    env.insert(req.context_declaration.name.clone());
    if let Some(with) = &req.with_declaration {
        env.insert(with.name.clone());
    }

    let mut has_return = false;
    for stmt in body {
        if let Some(reason) = unsupported_stmt(stmt, &mut env, types) {
            return Some(reason);
        }
        if stmt.kind.ends_with_return() {
            has_return = true;
        }
    }
    if !has_return {
        return Some("method body has no return statement".to_string());
    }
    None
}

fn unsupported_stmt(
    stmt: &Stmt,
    env: &mut BTreeSet<String>,
    types: &TypeRegistry,
) -> Option<String> {
    match &stmt.kind {
        StmtKind::Expr(e) => unsupported_expr(e, env, types),
        StmtKind::VarDecl { name, init, .. } => {
            let result = init.as_ref().and_then(|e| unsupported_expr(e, env, types));
            env.insert(name.clone());
            result
        }
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => unsupported_expr(cond, env, types)
            .or_else(|| unsupported_stmt(then, env, types))
            .or_else(|| {
                otherwise
                    .as_ref()
                    .and_then(|s| unsupported_stmt(s, env, types))
            }),
        StmtKind::Block(stmts) => stmts.iter().find_map(|s| unsupported_stmt(s, env, types)),
        StmtKind::Return(expr) => expr.as_ref().and_then(|e| unsupported_expr(e, env, types)),
        StmtKind::Empty => None,
        StmtKind::Modify { .. } | StmtKind::With { .. } => {
            Some("modify/with block survived lowering".to_string())
        }
    }
}

fn unsupported_expr(
    expr: &Expr,
    env: &BTreeSet<String>,
    types: &TypeRegistry,
) -> Option<String> {
    match &expr.kind {
        // Literals
        ExprKind::Int(_)
        | ExprKind::Long(_)
        | ExprKind::Float(_)
        | ExprKind::Double(_)
        | ExprKind::Bool(_)
        | ExprKind::Char(_)
        | ExprKind::Str(_)
        | ExprKind::Null => None,

        ExprKind::Name(_) => None,

        ExprKind::Enclosed(inner) => unsupported_expr(inner, env, types),

        ExprKind::Cast { inner, .. } => unsupported_expr(inner, env, types),

        ExprKind::Unary { op, inner } => {
            if let Some(reason) = unsupported_expr(inner, env, types) {
                return Some(reason);
            }
            let kind = crate::infer::stack_kind(inner);
            match op {
                UnaryOp::Not => None,
                UnaryOp::Neg => (!kind.is_numeric()).then(|| "negation of a reference".to_string()),
                UnaryOp::BitNot => (!matches!(kind, ValueKind::Int | ValueKind::Long))
                    .then(|| "bitwise complement of a non-integral value".to_string()),
            }
        }

        ExprKind::Binary { op, left, right } => {
            if let Some(reason) =
                unsupported_expr(left, env, types).or_else(|| unsupported_expr(right, env, types))
            {
                return Some(reason);
            }
            unsupported_binary(*op, left, right)
        }

        ExprKind::Call { scope, name, args } => {
            if let Some(reason) = args.iter().find_map(|a| unsupported_expr(a, env, types)) {
                return Some(reason);
            }
            unsupported_call(scope.as_deref(), name, args.len(), env, types)
        }

        ExprKind::New { class, args } => {
            if let Some(reason) = args.iter().find_map(|a| unsupported_expr(a, env, types)) {
                return Some(reason);
            }
            let Some(fqcn) = class.descriptor().and_then(|d| d.class_name().map(String::from))
            else {
                return Some(format!("unresolved constructor class '{}'", class.source_name()));
            };
            if types.is_registered(&fqcn)
                && types.find_method(&fqcn, "<init>", args.len()).is_some()
            {
                None
            } else {
                Some(format!("constructor of unregistered class {fqcn}"))
            }
        }

        ExprKind::Assign { op, target, value } => {
            if !matches!(target.kind, ExprKind::Name(_)) {
                return Some("assignment to a non-variable target".to_string());
            }
            if let Some(reason) = unsupported_expr(value, env, types) {
                return Some(reason);
            }
            if *op == AssignOp::Assign {
                return None;
            }
            // Compound assignment needs a primitive slot (or String +=)
            let target_ty = target.ty.as_ref();
            let is_string =
                target_ty.and_then(|t| t.class_name()) == Some("java.lang.String");
            if is_string && *op == AssignOp::Add {
                return None;
            }
            match target_ty.map(|t| t.value_kind()) {
                Some(kind) if kind.is_numeric() => None,
                _ => Some(format!(
                    "compound operator '{}' on non-primitive target",
                    op.symbol()
                )),
            }
        }

        // Permanent fallback categories
        ExprKind::Cond { .. } => Some("conditional expression".to_string()),
        ExprKind::Index { .. } => Some("array/list indexing".to_string()),
        ExprKind::FieldGet { .. } => Some("field access".to_string()),

        // These never survive lowering
        ExprKind::MapLit(_)
        | ExprKind::ListLit(_)
        | ExprKind::Temporal(_)
        | ExprKind::BigDecimal(_)
        | ExprKind::BigInteger(_)
        | ExprKind::NullSafeField { .. }
        | ExprKind::NullSafeCall { .. }
        | ExprKind::InlineCast { .. } => Some("surface form survived lowering".to_string()),
    }
}

fn unsupported_binary(op: BinaryOp, left: &Expr, right: &Expr) -> Option<String> {
    let lk = crate::infer::stack_kind(left);
    let rk = crate::infer::stack_kind(right);
    let is_string = |e: &Expr| e.ty.as_ref().and_then(|t| t.class_name()) == Some("java.lang.String");

    if op.is_logical() {
        return None;
    }

    if op.is_comparison() {
        if lk.is_numeric() && rk.is_numeric() {
            return None;
        }
        let reference_equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne)
            && lk == ValueKind::Reference
            && rk == ValueKind::Reference;
        if reference_equality {
            return None;
        }
        return Some(format!(
            "ordered comparison '{}' on reference operands",
            op.symbol()
        ));
    }

    if op == BinaryOp::Add && (is_string(left) || is_string(right)) {
        // string concatenation with at least one String operand
        return None;
    }

    if op.is_arithmetic() {
        if lk.is_numeric() && rk.is_numeric() {
            return None;
        }
        if op == BinaryOp::Add {
            return Some("concatenation of two non-string references".to_string());
        }
        return Some(format!(
            "arithmetic '{}' on reference operands",
            op.symbol()
        ));
    }

    // bitwise & shifts
    let integral = |k: ValueKind| matches!(k, ValueKind::Int | ValueKind::Long);
    if integral(lk) && integral(rk) {
        None
    } else {
        Some(format!(
            "bitwise operator '{}' on non-integral operands",
            op.symbol()
        ))
    }
}

fn unsupported_call(
    scope: Option<&Expr>,
    name: &str,
    argc: usize,
    env: &BTreeSet<String>,
    types: &TypeRegistry,
) -> Option<String> {
    let Some(scope) = scope else {
        return Some(format!("scope-less free function call '{name}'"));
    };

    // Collection access pattern: ref-typed variable, get(key)
    if is_collection_get(scope, name, argc) {
        return None;
    }

    // Static call on a known class constant
    if static_class(scope, env, types).is_some() {
        return None;
    }

    // Reflective chain resolution is bounded
    if crate::resolve::call_chain_depth(scope) >= crate::resolve::MAX_CHAIN_DEPTH {
        return Some(format!(
            "method chain deeper than {} at '{name}'",
            crate::resolve::MAX_CHAIN_DEPTH
        ));
    }

    // Instance call: receiver type must introspect
    if let Some(reason) = unsupported_expr(scope, env, types) {
        return Some(reason);
    }

    let class = scope.ty.as_ref().and_then(|t| t.class_name());
    match class {
        Some(class) if types.is_registered(class) => {
            if types.find_method(class, name, argc).is_some() {
                None
            } else {
                Some(format!("no introspectable method '{name}/{argc}' on {class}"))
            }
        }
        Some(class) => Some(format!(
            "receiver class {class} is not introspectable"
        )),
        None => Some(format!("cannot type the receiver of '{name}'")),
    }
}

/// `mapVar.get(k)` / `listVar.get(i)` against a declared collection.
fn is_collection_get(scope: &Expr, name: &str, argc: usize) -> bool {
    if name != "get" || argc != 1 {
        return false;
    }
    if !matches!(scope.kind, ExprKind::Name(_)) {
        return false;
    }
    matches!(
        scope.ty.as_ref().and_then(|t| t.class_name()),
        Some("java.util.Map") | Some("java.util.List")
    )
}

/// The registered class named by a dotted scope path whose head is not a
/// local variable.
pub(super) fn static_class(
    scope: &Expr,
    env: &BTreeSet<String>,
    types: &TypeRegistry,
) -> Option<String> {
    let path = scope.as_dotted_path()?;
    let head = path.split('.').next()?;
    if env.contains(head) {
        return None;
    }
    // The resolver already rewrote the scope's type to the class it names.
    let fqcn = scope.ty.as_ref().and_then(|t| t.class_name())?;
    if types.is_registered(fqcn) {
        Some(fqcn.to_string())
    } else {
        None
    }
}
