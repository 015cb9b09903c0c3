//! Lowering — desugars rule-language surface forms into host-primitive EIR
//! and assembles the evaluator method body.
//!
//! The rewrite table:
//!
//! | surface form | lowered form |
//! |---|---|
//! | `a!.b` | `a == null ? null : a.b` |
//! | `a!.m(x)` | `a == null ? null : a.m(x)` |
//! | `[k: v]` | `java.util.Map.of(k, v)` |
//! | `[v1, v2]` | `java.util.List.of(v1, v2)` |
//! | `12h30m` | `java.time.Duration.ofHours(12).plusMinutes(30)` |
//! | `0B` / `0I` | `BigDecimal.valueOf(0)` / `BigInteger.valueOf(0)` |
//! | `10.25B` | `new java.math.BigDecimal("10.25")` |
//! | `x#T` | `(T) x` |
//! | `modify (t) { … }` | member statements on `t` + context write-back |
//! | `with (t) { … }` | member statements on `t` |
//!
//! Body assembly wraps the lowered user code in the context prelude
//! (one declaration statement per used context variable) and appends
//! write-back calls for every assigned variable before each return.
//! Lowering itself is pure and idempotent: running it over an already
//! lowered tree changes nothing.

use crate::request::{CompilerRequest, ContentKind, ContextKind, Declaration};
use ruse_ast::{
    BinaryOp, Expr, ExprKind, PrimitiveTag, Span, Stmt, StmtKind, TypeDescriptor, TypeName,
};
use std::collections::BTreeSet;

/// Assemble the full evaluator method body for a request.
pub fn build_body(req: &CompilerRequest, expr: Option<Expr>, stmts: Vec<Stmt>) -> Vec<Stmt> {
    let user: Vec<Stmt> = match req.content {
        ContentKind::Expression => {
            let expr = expr.expect("expression content requires an expression");
            vec![Stmt::new(StmtKind::Return(Some(expr)), Span::zero())]
        }
        ContentKind::Block => stmts,
    };

    let mut user: Vec<Stmt> = user
        .into_iter()
        .map(|s| lower_stmt(s, req))
        .collect();

    // Prelude: load every context variable the source actually uses.
    let mut used = BTreeSet::new();
    collect_names(&user, &mut used);
    let mut body = Vec::new();
    for (position, decl) in req.declarations.iter().enumerate() {
        if used.contains(&decl.name) {
            body.push(prelude_stmt(req, decl, position));
        }
    }

    // Write-backs: every assigned context variable flows back out.
    let mut assigned = BTreeSet::new();
    collect_assigned(&user, &mut assigned);
    let writebacks: Vec<Stmt> = req
        .declarations
        .iter()
        .enumerate()
        .filter(|(_, d)| assigned.contains(&d.name))
        .map(|(position, d)| writeback_stmt(req, d, position))
        .collect();

    user = inject_writebacks(user, &writebacks);
    body.extend(user);

    if !body.last().is_some_and(|s| s.kind.ends_with_return()) {
        body.extend(writebacks.iter().cloned());
        body.push(Stmt::new(StmtKind::Return(None), Span::zero()));
    }

    body
}

// ─── Desugaring ──────────────────────────────────────────────────────────

/// Lower one statement. Pure; idempotent on already-lowered trees.
pub fn lower_stmt(stmt: Stmt, req: &CompilerRequest) -> Stmt {
    let span = stmt.span;
    match stmt.kind {
        StmtKind::Expr(e) => Stmt::new(StmtKind::Expr(lower_expr(e, req)), span),
        StmtKind::VarDecl { ty, name, init } => Stmt::new(
            StmtKind::VarDecl {
                ty,
                name,
                init: init.map(|e| lower_expr(e, req)),
            },
            span,
        ),
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => Stmt::new(
            StmtKind::If {
                cond: lower_expr(cond, req),
                then: Box::new(lower_stmt(*then, req)),
                otherwise: otherwise.map(|s| Box::new(lower_stmt(*s, req))),
            },
            span,
        ),
        StmtKind::Block(stmts) => Stmt::new(
            StmtKind::Block(stmts.into_iter().map(|s| lower_stmt(s, req)).collect()),
            span,
        ),
        StmtKind::Return(e) => Stmt::new(StmtKind::Return(e.map(|e| lower_expr(e, req))), span),
        StmtKind::Empty => Stmt::new(StmtKind::Empty, span),

        StmtKind::Modify { target, body } => {
            flatten_receiver_block(target, body, span, req, true)
        }
        StmtKind::With { target, body } => {
            flatten_receiver_block(target, body, span, req, false)
        }
    }
}

/// Lower one expression. Pure; idempotent on already-lowered trees.
pub fn lower_expr(expr: Expr, req: &CompilerRequest) -> Expr {
    let span = expr.span;
    let lower = |e: Box<Expr>| Box::new(lower_expr(*e, req));

    match expr.kind {
        // === Surface forms ===
        ExprKind::NullSafeField { scope, field } => {
            let scope = lower(scope);
            null_guard(
                (*scope).clone(),
                Expr::new(ExprKind::FieldGet { scope, field }, span),
                span,
            )
        }
        ExprKind::NullSafeCall { scope, name, args } => {
            let scope = lower(scope);
            let args = args.into_iter().map(|a| lower_expr(a, req)).collect();
            null_guard(
                (*scope).clone(),
                Expr::new(
                    ExprKind::Call {
                        scope: Some(scope),
                        name,
                        args,
                    },
                    span,
                ),
                span,
            )
        }
        ExprKind::InlineCast { target, inner } => Expr::new(
            ExprKind::Cast {
                target,
                inner: lower(inner),
            },
            span,
        ),
        ExprKind::MapLit(entries) => {
            let mut args = Vec::with_capacity(entries.len() * 2);
            for (k, v) in entries {
                args.push(lower_expr(k, req));
                args.push(lower_expr(v, req));
            }
            static_call("java.util.Map", "of", args, span)
        }
        ExprKind::ListLit(elements) => {
            let args = elements.into_iter().map(|e| lower_expr(e, req)).collect();
            static_call("java.util.List", "of", args, span)
        }
        ExprKind::BigDecimal(digits) => big_number(&digits, "java.math.BigDecimal", span),
        ExprKind::BigInteger(digits) => big_number(&digits, "java.math.BigInteger", span),
        ExprKind::Temporal(chunks) => {
            let mut iter = chunks.into_iter();
            let (amount, unit) = iter.next().expect("temporal literal has a chunk");
            let mut result = static_call(
                "java.time.Duration",
                unit.factory(),
                vec![Expr::new(ExprKind::Long(amount as i64), span)],
                span,
            );
            for (amount, unit) in iter {
                result = Expr::new(
                    ExprKind::Call {
                        scope: Some(Box::new(result)),
                        name: unit.combinator().to_string(),
                        args: vec![Expr::new(ExprKind::Long(amount as i64), span)],
                    },
                    span,
                );
            }
            result
        }

        // === Recursive cases ===
        ExprKind::FieldGet { scope, field } => Expr::new(
            ExprKind::FieldGet {
                scope: lower(scope),
                field,
            },
            span,
        ),
        ExprKind::Call { scope, name, args } => Expr::new(
            ExprKind::Call {
                scope: scope.map(lower),
                name,
                args: args.into_iter().map(|a| lower_expr(a, req)).collect(),
            },
            span,
        ),
        ExprKind::New { class, args } => Expr::new(
            ExprKind::New {
                class,
                args: args.into_iter().map(|a| lower_expr(a, req)).collect(),
            },
            span,
        ),
        ExprKind::Index { scope, index } => Expr::new(
            ExprKind::Index {
                scope: lower(scope),
                index: lower(index),
            },
            span,
        ),
        ExprKind::Unary { op, inner } => Expr::new(
            ExprKind::Unary {
                op,
                inner: lower(inner),
            },
            span,
        ),
        ExprKind::Binary { op, left, right } => Expr::new(
            ExprKind::Binary {
                op,
                left: lower(left),
                right: lower(right),
            },
            span,
        ),
        ExprKind::Assign { op, target, value } => Expr::new(
            ExprKind::Assign {
                op,
                target: lower(target),
                value: lower(value),
            },
            span,
        ),
        ExprKind::Cast { target, inner } => Expr::new(
            ExprKind::Cast {
                target,
                inner: lower(inner),
            },
            span,
        ),
        ExprKind::Cond {
            cond,
            then,
            otherwise,
        } => Expr::new(
            ExprKind::Cond {
                cond: lower(cond),
                then: lower(then),
                otherwise: lower(otherwise),
            },
            span,
        ),
        ExprKind::Enclosed(inner) => Expr::new(ExprKind::Enclosed(lower(inner)), span),

        // === Leaf cases ===
        kind => Expr::new(kind, span),
    }
}

/// `scope == null ? null : access`
fn null_guard(scope: Expr, access: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Cond {
            cond: Box::new(Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Eq,
                    left: Box::new(scope),
                    right: Box::new(Expr::new(ExprKind::Null, span)),
                },
                span,
            )),
            then: Box::new(Expr::new(ExprKind::Null, span)),
            otherwise: Box::new(access),
        },
        span,
    )
}

/// A static factory call `fqcn.name(args)` with the class spelled as a
/// dotted name chain, the way it would appear in source.
fn static_call(fqcn: &str, name: &str, args: Vec<Expr>, span: Span) -> Expr {
    Expr::new(
        ExprKind::Call {
            scope: Some(Box::new(class_path(fqcn, span))),
            name: name.to_string(),
            args,
        },
        span,
    )
}

/// Build the `Name`/`FieldGet` chain for a dotted class name.
fn class_path(fqcn: &str, span: Span) -> Expr {
    let mut parts = fqcn.split('.');
    let first = parts.next().expect("non-empty class name");
    let mut expr = Expr::new(ExprKind::Name(first.to_string()), span);
    for part in parts {
        expr = Expr::new(
            ExprKind::FieldGet {
                scope: Box::new(expr),
                field: part.to_string(),
            },
            span,
        );
    }
    expr
}

/// `0B` → `valueOf(0)`; fractional or oversized digits go through the
/// string constructor.
fn big_number(digits: &str, class: &str, span: Span) -> Expr {
    if !digits.contains('.') {
        if let Ok(small) = digits.parse::<i32>() {
            return static_call(
                class,
                "valueOf",
                vec![Expr::new(ExprKind::Int(small), span)],
                span,
            );
        }
        if let Ok(wide) = digits.parse::<i64>() {
            return static_call(
                class,
                "valueOf",
                vec![Expr::new(ExprKind::Long(wide), span)],
                span,
            );
        }
    }
    Expr::new(
        ExprKind::New {
            class: TypeName::named(class),
            args: vec![Expr::new(ExprKind::Str(digits.to_string()), span)],
        },
        span,
    )
}

// ─── modify / with ───────────────────────────────────────────────────────

/// Flatten a `modify`/`with` block: member names become accesses on the
/// target, and `modify` appends the context write-back for the target.
fn flatten_receiver_block(
    target: Expr,
    body: Vec<Stmt>,
    span: Span,
    req: &CompilerRequest,
    write_back: bool,
) -> Stmt {
    let target = lower_expr(target, req);

    // Names that stay themselves inside the block: context variables, the
    // receiver, and locals declared in the block. Capitalized names are
    // left alone as class references.
    let mut env: BTreeSet<String> = req.declarations.iter().map(|d| d.name.clone()).collect();
    env.insert(req.context_declaration.name.clone());
    if let Some(with) = &req.with_declaration {
        env.insert(with.name.clone());
    }

    let mut stmts: Vec<Stmt> = body
        .into_iter()
        .map(|s| {
            let s = lower_stmt(s, req);
            rewrite_member_stmt(s, &target, &mut env)
        })
        .collect();

    if write_back {
        if let ExprKind::Name(name) = &target.kind {
            if let (Some(position), Some(decl)) = (req.position_of(name), req.declaration(name)) {
                stmts.push(writeback_stmt(req, decl, position));
            }
        }
    }

    Stmt::new(StmtKind::Block(stmts), span)
}

fn rewrite_member_stmt(stmt: Stmt, target: &Expr, env: &mut BTreeSet<String>) -> Stmt {
    let span = stmt.span;
    match stmt.kind {
        StmtKind::Expr(e) => Stmt::new(StmtKind::Expr(rewrite_member_expr(e, target, env)), span),
        StmtKind::VarDecl { ty, name, init } => {
            let init = init.map(|e| rewrite_member_expr(e, target, env));
            env.insert(name.clone());
            Stmt::new(StmtKind::VarDecl { ty, name, init }, span)
        }
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => Stmt::new(
            StmtKind::If {
                cond: rewrite_member_expr(cond, target, env),
                then: Box::new(rewrite_member_stmt(*then, target, env)),
                otherwise: otherwise.map(|s| Box::new(rewrite_member_stmt(*s, target, env))),
            },
            span,
        ),
        StmtKind::Block(stmts) => Stmt::new(
            StmtKind::Block(
                stmts
                    .into_iter()
                    .map(|s| rewrite_member_stmt(s, target, env))
                    .collect(),
            ),
            span,
        ),
        StmtKind::Return(e) => Stmt::new(
            StmtKind::Return(e.map(|e| rewrite_member_expr(e, target, env))),
            span,
        ),
        other => Stmt::new(other, span),
    }
}

fn rewrite_member_expr(expr: Expr, target: &Expr, env: &BTreeSet<String>) -> Expr {
    let span = expr.span;
    let walk = |e: Box<Expr>| Box::new(rewrite_member_expr(*e, target, env));

    match expr.kind {
        ExprKind::Name(name) => {
            let is_class_ref = name.chars().next().is_some_and(|c| c.is_uppercase());
            if env.contains(&name) || is_class_ref {
                Expr::new(ExprKind::Name(name), span)
            } else {
                Expr::new(
                    ExprKind::FieldGet {
                        scope: Box::new(target.clone()),
                        field: name,
                    },
                    span,
                )
            }
        }
        ExprKind::FieldGet { scope, field } => Expr::new(
            ExprKind::FieldGet {
                scope: walk(scope),
                field,
            },
            span,
        ),
        ExprKind::Call { scope, name, args } => Expr::new(
            ExprKind::Call {
                scope: scope.map(walk),
                name,
                args: args
                    .into_iter()
                    .map(|a| rewrite_member_expr(a, target, env))
                    .collect(),
            },
            span,
        ),
        ExprKind::Index { scope, index } => Expr::new(
            ExprKind::Index {
                scope: walk(scope),
                index: walk(index),
            },
            span,
        ),
        ExprKind::Unary { op, inner } => Expr::new(
            ExprKind::Unary {
                op,
                inner: walk(inner),
            },
            span,
        ),
        ExprKind::Binary { op, left, right } => Expr::new(
            ExprKind::Binary {
                op,
                left: walk(left),
                right: walk(right),
            },
            span,
        ),
        ExprKind::Assign { op, target: t, value } => Expr::new(
            ExprKind::Assign {
                op,
                target: walk(t),
                value: walk(value),
            },
            span,
        ),
        ExprKind::Cast { target: ty, inner } => Expr::new(
            ExprKind::Cast {
                target: ty,
                inner: walk(inner),
            },
            span,
        ),
        ExprKind::Cond {
            cond,
            then,
            otherwise,
        } => Expr::new(
            ExprKind::Cond {
                cond: walk(cond),
                then: walk(then),
                otherwise: walk(otherwise),
            },
            span,
        ),
        ExprKind::Enclosed(inner) => Expr::new(ExprKind::Enclosed(walk(inner)), span),
        ExprKind::New { class, args } => Expr::new(
            ExprKind::New {
                class,
                args: args
                    .into_iter()
                    .map(|a| rewrite_member_expr(a, target, env))
                    .collect(),
            },
            span,
        ),
        kind => Expr::new(kind, span),
    }
}

// ─── Prelude & write-back ────────────────────────────────────────────────

fn type_name_of(ty: &TypeDescriptor) -> TypeName {
    match ty {
        TypeDescriptor::Primitive(tag) => TypeName::Primitive(*tag),
        TypeDescriptor::Reference(fqcn) => TypeName::named(fqcn.clone()),
        TypeDescriptor::Parameterized { raw, generics } => TypeName::Named {
            name: raw.clone(),
            generics: Some(generics.clone()),
        },
        TypeDescriptor::Void => TypeName::named("java.lang.Void"),
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Bean getter for a declaration (`isX` for primitive booleans).
pub fn getter_name(decl: &Declaration) -> String {
    let prefix = if decl.ty == TypeDescriptor::Primitive(PrimitiveTag::Boolean) {
        "is"
    } else {
        "get"
    };
    format!("{prefix}{}", capitalize(&decl.name))
}

/// Bean setter for a declaration.
pub fn setter_name(decl: &Declaration) -> String {
    format!("set{}", capitalize(&decl.name))
}

/// `int x = (int) (java.lang.Integer) __context.get("x");` and friends.
fn prelude_stmt(req: &CompilerRequest, decl: &Declaration, position: usize) -> Stmt {
    let span = Span::zero();
    let ctx = Expr::new(ExprKind::Name(req.context_declaration.name.clone()), span);

    let init = match req.context_kind {
        ContextKind::Map | ContextKind::List => {
            let key = match req.context_kind {
                ContextKind::Map => Expr::new(ExprKind::Str(decl.name.clone()), span),
                _ => Expr::new(ExprKind::Int(position as i32), span),
            };
            let get = Expr::new(
                ExprKind::Call {
                    scope: Some(Box::new(ctx)),
                    name: "get".to_string(),
                    args: vec![key],
                },
                span,
            );
            match &decl.ty {
                TypeDescriptor::Primitive(tag) => Expr::new(
                    ExprKind::Cast {
                        target: TypeName::Primitive(*tag),
                        inner: Box::new(Expr::new(
                            ExprKind::Cast {
                                target: TypeName::named(tag.boxed_name()),
                                inner: Box::new(get),
                            },
                            span,
                        )),
                    },
                    span,
                ),
                ty => Expr::new(
                    ExprKind::Cast {
                        target: type_name_of(ty),
                        inner: Box::new(get),
                    },
                    span,
                ),
            }
        }
        ContextKind::Pojo => Expr::new(
            ExprKind::Call {
                scope: Some(Box::new(ctx)),
                name: getter_name(decl),
                args: vec![],
            },
            span,
        ),
    };

    Stmt::new(
        StmtKind::VarDecl {
            ty: type_name_of(&decl.ty),
            name: decl.name.clone(),
            init: Some(init),
        },
        span,
    )
}

/// `Rt.putMap(__context, "x", x);` / `Rt.setList(__context, 0, x);` /
/// `__context.setX(x);`
fn writeback_stmt(req: &CompilerRequest, decl: &Declaration, position: usize) -> Stmt {
    let span = Span::zero();
    let ctx = Expr::new(ExprKind::Name(req.context_declaration.name.clone()), span);
    let var = Expr::new(ExprKind::Name(decl.name.clone()), span);

    let call = match req.context_kind {
        ContextKind::Map => static_call(
            "ruse.Rt",
            "putMap",
            vec![ctx, Expr::new(ExprKind::Str(decl.name.clone()), span), var],
            span,
        ),
        ContextKind::List => static_call(
            "ruse.Rt",
            "setList",
            vec![ctx, Expr::new(ExprKind::Int(position as i32), span), var],
            span,
        ),
        ContextKind::Pojo => Expr::new(
            ExprKind::Call {
                scope: Some(Box::new(ctx)),
                name: setter_name(decl),
                args: vec![var],
            },
            span,
        ),
    };

    Stmt::new(StmtKind::Expr(call), span)
}

// ─── Analysis & return rewriting ─────────────────────────────────────────

fn collect_names(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        walk_stmt(stmt, &mut |e| {
            if let ExprKind::Name(n) = &e.kind {
                out.insert(n.clone());
            }
        });
    }
}

fn collect_assigned(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        walk_stmt(stmt, &mut |e| {
            if let ExprKind::Assign { target, .. } = &e.kind {
                if let ExprKind::Name(n) = &target.kind {
                    out.insert(n.clone());
                }
            }
        });
    }
}

fn walk_stmt(stmt: &Stmt, f: &mut impl FnMut(&Expr)) {
    match &stmt.kind {
        StmtKind::Expr(e) => walk_expr(e, f),
        StmtKind::VarDecl { init, .. } => {
            if let Some(e) = init {
                walk_expr(e, f);
            }
        }
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, f);
            walk_stmt(then, f);
            if let Some(s) = otherwise {
                walk_stmt(s, f);
            }
        }
        StmtKind::Block(stmts) => {
            for s in stmts {
                walk_stmt(s, f);
            }
        }
        StmtKind::Return(Some(e)) => walk_expr(e, f),
        StmtKind::Return(None) | StmtKind::Empty => {}
        StmtKind::Modify { target, body } | StmtKind::With { target, body } => {
            walk_expr(target, f);
            for s in body {
                walk_stmt(s, f);
            }
        }
    }
}

fn walk_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::FieldGet { scope, .. } | ExprKind::NullSafeField { scope, .. } => {
            walk_expr(scope, f)
        }
        ExprKind::Call { scope, args, .. } => {
            if let Some(s) = scope {
                walk_expr(s, f);
            }
            for a in args {
                walk_expr(a, f);
            }
        }
        ExprKind::NullSafeCall { scope, args, .. } => {
            walk_expr(scope, f);
            for a in args {
                walk_expr(a, f);
            }
        }
        ExprKind::New { args, .. } => {
            for a in args {
                walk_expr(a, f);
            }
        }
        ExprKind::Index { scope, index } => {
            walk_expr(scope, f);
            walk_expr(index, f);
        }
        ExprKind::Unary { inner, .. }
        | ExprKind::Cast { inner, .. }
        | ExprKind::InlineCast { inner, .. }
        | ExprKind::Enclosed(inner) => walk_expr(inner, f),
        ExprKind::Binary { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        ExprKind::Assign { target, value, .. } => {
            walk_expr(target, f);
            walk_expr(value, f);
        }
        ExprKind::Cond {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, f);
            walk_expr(then, f);
            walk_expr(otherwise, f);
        }
        ExprKind::MapLit(entries) => {
            for (k, v) in entries {
                walk_expr(k, f);
                walk_expr(v, f);
            }
        }
        ExprKind::ListLit(elements) => {
            for e in elements {
                walk_expr(e, f);
            }
        }
        _ => {}
    }
}

fn contains_assign(expr: &Expr) -> bool {
    let mut found = false;
    walk_expr(expr, &mut |e| {
        if matches!(e.kind, ExprKind::Assign { .. }) {
            found = true;
        }
    });
    found
}

/// Prefix every return with the write-back statements. A return whose
/// expression itself assigns gets hoisted into a temp first so the
/// write-backs observe the final variable values.
fn inject_writebacks(stmts: Vec<Stmt>, writebacks: &[Stmt]) -> Vec<Stmt> {
    if writebacks.is_empty() {
        return stmts;
    }
    stmts
        .into_iter()
        .map(|s| inject_into_stmt(s, writebacks))
        .collect()
}

fn inject_into_stmt(stmt: Stmt, writebacks: &[Stmt]) -> Stmt {
    let span = stmt.span;
    match stmt.kind {
        StmtKind::Return(Some(e)) if contains_assign(&e) => {
            let mut block = vec![Stmt::new(
                StmtKind::VarDecl {
                    ty: TypeName::Var,
                    name: "$ret".to_string(),
                    init: Some(e),
                },
                span,
            )];
            block.extend(writebacks.iter().cloned());
            block.push(Stmt::new(
                StmtKind::Return(Some(Expr::new(
                    ExprKind::Name("$ret".to_string()),
                    span,
                ))),
                span,
            ));
            Stmt::new(StmtKind::Block(block), span)
        }
        StmtKind::Return(e) => {
            let mut block: Vec<Stmt> = writebacks.to_vec();
            block.push(Stmt::new(StmtKind::Return(e), span));
            Stmt::new(StmtKind::Block(block), span)
        }
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => Stmt::new(
            StmtKind::If {
                cond,
                then: Box::new(inject_into_stmt(*then, writebacks)),
                otherwise: otherwise.map(|s| Box::new(inject_into_stmt(*s, writebacks))),
            },
            span,
        ),
        StmtKind::Block(stmts) => Stmt::new(
            StmtKind::Block(inject_writebacks(stmts, writebacks)),
            span,
        ),
        other => Stmt::new(other, span),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruse_ast::TypeDescriptor;
    use ruse_parser::{parse_block, parse_expression};

    fn map_request(source: &str, decls: Vec<Declaration>) -> CompilerRequest {
        CompilerRequest::map_expression(
            source,
            TypeDescriptor::reference("java.lang.Object"),
            decls,
        )
    }

    fn int_decl(name: &str) -> Declaration {
        Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Int))
    }

    #[test]
    fn null_safe_field_lowers_to_conditional() {
        let req = map_request("a!.b", vec![]);
        let lowered = lower_expr(parse_expression("a!.b").unwrap(), &req);
        match lowered.kind {
            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => {
                assert!(matches!(
                    cond.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Eq,
                        ..
                    }
                ));
                assert!(matches!(then.kind, ExprKind::Null));
                assert!(matches!(otherwise.kind, ExprKind::FieldGet { .. }));
            }
            other => panic!("expected Cond, got {other:?}"),
        }
    }

    #[test]
    fn map_literal_lowers_to_factory_call() {
        let req = map_request("x", vec![]);
        let lowered = lower_expr(parse_expression("[a: 1, b: 2]").unwrap(), &req);
        match lowered.kind {
            ExprKind::Call { scope, name, args } => {
                assert_eq!(name, "of");
                assert_eq!(args.len(), 4);
                assert_eq!(
                    scope.unwrap().as_dotted_path().as_deref(),
                    Some("java.util.Map")
                );
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn temporal_literal_lowers_to_duration_chain() {
        let req = map_request("x", vec![]);
        let lowered = lower_expr(parse_expression("12h30m").unwrap(), &req);
        match lowered.kind {
            ExprKind::Call { scope, name, args } => {
                assert_eq!(name, "plusMinutes");
                assert!(matches!(args[0].kind, ExprKind::Long(30)));
                match &scope.unwrap().kind {
                    ExprKind::Call { name, args, .. } => {
                        assert_eq!(name, "ofHours");
                        assert!(matches!(args[0].kind, ExprKind::Long(12)));
                    }
                    other => panic!("expected inner Call, got {other:?}"),
                }
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn big_decimal_literal_forms() {
        let req = map_request("x", vec![]);
        let int_form = lower_expr(parse_expression("0B").unwrap(), &req);
        assert!(matches!(int_form.kind, ExprKind::Call { ref name, .. } if name == "valueOf"));

        let frac_form = lower_expr(parse_expression("10.25B").unwrap(), &req);
        assert!(matches!(frac_form.kind, ExprKind::New { .. }));
    }

    #[test]
    fn lowering_is_idempotent() {
        let req = map_request("x", vec![]);
        for source in ["a!.b", "[1, 2]", "[k: 1]", "12h30m", "0B", "x#int", "a + b * c"] {
            let once = lower_expr(parse_expression(source).unwrap(), &req);
            let twice = lower_expr(once.clone(), &req);
            assert_eq!(once, twice, "lowering not idempotent for '{source}'");
        }
    }

    #[test]
    fn body_has_prelude_and_return() {
        let req = map_request("a + b", vec![int_decl("a"), int_decl("b")]);
        let expr = parse_expression("a + b").unwrap();
        let body = build_body(&req, Some(expr), vec![]);

        // two prelude declarations, then the return
        assert_eq!(body.len(), 3);
        assert!(matches!(body[0].kind, StmtKind::VarDecl { ref name, .. } if name == "a"));
        assert!(matches!(body[1].kind, StmtKind::VarDecl { ref name, .. } if name == "b"));
        assert!(matches!(body[2].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn prelude_skips_unused_declarations() {
        let req = map_request("a", vec![int_decl("a"), int_decl("unused")]);
        let expr = parse_expression("a").unwrap();
        let body = build_body(&req, Some(expr), vec![]);
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn assigned_variables_write_back_before_return() {
        let req = CompilerRequest {
            content: ContentKind::Block,
            ..map_request("", vec![int_decl("a"), int_decl("b")])
        };
        let stmts = parse_block("a = a + 1; b = b * 2; return a + b;").unwrap();
        let body = build_body(&req, None, stmts);

        // prelude a, prelude b, assign, assign, block{putMap a, putMap b, return}
        let StmtKind::Block(last) = &body.last().unwrap().kind else {
            panic!("expected trailing block, got {:?}", body.last().unwrap().kind);
        };
        assert_eq!(last.len(), 3);
        assert!(matches!(
            &last[0].kind,
            StmtKind::Expr(e) if matches!(&e.kind, ExprKind::Call { name, .. } if name == "putMap")
        ));
        assert!(matches!(last[2].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn return_with_assignment_hoists_a_temp() {
        let req = CompilerRequest {
            content: ContentKind::Block,
            ..map_request("", vec![int_decl("a")])
        };
        let stmts = parse_block("return a += 1;").unwrap();
        let body = build_body(&req, None, stmts);

        let StmtKind::Block(last) = &body.last().unwrap().kind else {
            panic!("expected trailing block");
        };
        assert!(matches!(
            &last[0].kind,
            StmtKind::VarDecl { name, .. } if name == "$ret"
        ));
        assert!(matches!(
            &last[2].kind,
            StmtKind::Return(Some(e)) if matches!(&e.kind, ExprKind::Name(n) if n == "$ret")
        ));
    }

    #[test]
    fn modify_rewrites_members_and_appends_write_back() {
        let req = CompilerRequest {
            content: ContentKind::Block,
            context_kind: ContextKind::Map,
            ..map_request(
                "",
                vec![Declaration::new(
                    "p",
                    TypeDescriptor::reference("demo.Person"),
                )],
            )
        };
        let stmts = parse_block("modify (p) { age = age + 1; }").unwrap();
        let lowered = lower_stmt(stmts.into_iter().next().unwrap(), &req);

        let StmtKind::Block(stmts) = lowered.kind else {
            panic!("expected Block");
        };
        assert_eq!(stmts.len(), 2);
        // age = age + 1 became p.age = p.age + 1
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Expr(e) if matches!(
                &e.kind,
                ExprKind::Assign { target, .. } if matches!(&target.kind, ExprKind::FieldGet { .. })
            )
        ));
        // then Rt.putMap(__context, "p", p)
        assert!(matches!(
            &stmts[1].kind,
            StmtKind::Expr(e) if matches!(&e.kind, ExprKind::Call { name, .. } if name == "putMap")
        ));
    }

    #[test]
    fn with_has_no_write_back() {
        let req = CompilerRequest {
            content: ContentKind::Block,
            ..map_request(
                "",
                vec![Declaration::new(
                    "p",
                    TypeDescriptor::reference("demo.Person"),
                )],
            )
        };
        let stmts = parse_block("with (p) { age = 2; }").unwrap();
        let lowered = lower_stmt(stmts.into_iter().next().unwrap(), &req);
        let StmtKind::Block(stmts) = lowered.kind else {
            panic!("expected Block");
        };
        assert_eq!(stmts.len(), 1);
    }
}
