//! Type resolution — annotates every value-producing node of the lowered
//! body with a static type descriptor.
//!
//! Resolution consults the runtime type registry the way the original
//! system used reflection: method return types come from `(class, name,
//! arity)` lookups behind the registry's concurrent cache. A lookup miss on
//! a *registered* receiver is a hard [`TranspileError::MethodResolution`];
//! receivers the registry does not know (erased generics, unregistered
//! classes, chains past the depth bound) resolve to Object and are left for
//! the capability gate to route to the fallback path.

use crate::error::TranspileError;
use crate::request::CompilerRequest;
use ruse_ast::{
    BinaryOp, Expr, ExprKind, PrimitiveTag, Stmt, StmtKind, TypeDescriptor, TypeName, UnaryOp,
    ValueKind,
};
use ruse_runtime::TypeRegistry;
use rustc_hash::FxHashMap;

/// Reflective chain resolution is bounded: deeper chains take the fallback
/// path. The per-registry lookup cache makes lifting this limit cheap if a
/// deployment ever needs it.
pub const MAX_CHAIN_DEPTH: usize = 2;

/// Annotate the lowered body in place.
pub fn resolve(
    body: &mut [Stmt],
    req: &CompilerRequest,
    types: &TypeRegistry,
) -> Result<(), TranspileError> {
    let mut resolver = Resolver {
        req,
        types,
        scopes: vec![FxHashMap::default()],
    };
    resolver.define(
        req.context_declaration.name.clone(),
        req.context_declaration.ty.clone(),
    );
    if let Some(with) = &req.with_declaration {
        resolver.define(with.name.clone(), with.ty.clone());
    }

    for stmt in body {
        resolver.resolve_stmt(stmt)?;
    }
    Ok(())
}

struct Resolver<'a> {
    req: &'a CompilerRequest,
    types: &'a TypeRegistry,
    scopes: Vec<FxHashMap<String, TypeDescriptor>>,
}

impl Resolver<'_> {
    fn define(&mut self, name: String, ty: TypeDescriptor) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name, ty);
    }

    fn lookup(&self, name: &str) -> Option<&TypeDescriptor> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) -> Result<(), TranspileError> {
        match &mut stmt.kind {
            StmtKind::Expr(e) => self.resolve_expr(e),
            StmtKind::VarDecl { ty, name, init } => {
                if let Some(init) = init.as_mut() {
                    self.resolve_expr(init)?;
                }

                let declared = match ty {
                    TypeName::Primitive(tag) => TypeDescriptor::Primitive(*tag),
                    TypeName::Named { name, generics } => {
                        let resolved = self.resolve_type_name(name)?;
                        *name = resolved.clone();
                        match generics {
                            Some(g) => TypeDescriptor::Parameterized {
                                raw: resolved,
                                generics: g.clone(),
                            },
                            None => TypeDescriptor::Reference(resolved),
                        }
                    }
                    TypeName::Var => {
                        // var: the initializer's type is the declared type
                        let inferred = init
                            .as_ref()
                            .and_then(|e| e.ty.clone())
                            .unwrap_or_else(TypeDescriptor::object);
                        *ty = descriptor_to_type_name(&inferred);
                        inferred
                    }
                };

                self.define(name.clone(), declared);
                Ok(())
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.resolve_expr(cond)?;
                self.resolve_stmt(then)?;
                if let Some(otherwise) = otherwise {
                    self.resolve_stmt(otherwise)?;
                }
                Ok(())
            }
            StmtKind::Block(stmts) => {
                self.scopes.push(FxHashMap::default());
                for stmt in stmts {
                    self.resolve_stmt(stmt)?;
                }
                self.scopes.pop();
                Ok(())
            }
            StmtKind::Return(expr) => {
                if let Some(expr) = expr {
                    self.resolve_expr(expr)?;
                }
                Ok(())
            }
            StmtKind::Empty => Ok(()),
            // Eliminated by lowering; resolve the pieces defensively.
            StmtKind::Modify { target, body } | StmtKind::With { target, body } => {
                self.resolve_expr(target)?;
                for stmt in body {
                    self.resolve_stmt(stmt)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) -> Result<(), TranspileError> {
        use PrimitiveTag as P;

        let ty: TypeDescriptor = match &mut expr.kind {
            ExprKind::Int(_) => TypeDescriptor::Primitive(P::Int),
            ExprKind::Long(_) => TypeDescriptor::Primitive(P::Long),
            ExprKind::Float(_) => TypeDescriptor::Primitive(P::Float),
            ExprKind::Double(_) => TypeDescriptor::Primitive(P::Double),
            ExprKind::Bool(_) => TypeDescriptor::Primitive(P::Boolean),
            ExprKind::Char(_) => TypeDescriptor::Primitive(P::Char),
            ExprKind::Str(_) => TypeDescriptor::string(),
            ExprKind::Null => TypeDescriptor::object(),
            ExprKind::BigDecimal(_) => TypeDescriptor::reference("java.math.BigDecimal"),
            ExprKind::BigInteger(_) => TypeDescriptor::reference("java.math.BigInteger"),
            ExprKind::Temporal(_) => TypeDescriptor::reference("java.time.Duration"),
            ExprKind::MapLit(entries) => {
                for (k, v) in entries {
                    self.resolve_expr(k)?;
                    self.resolve_expr(v)?;
                }
                TypeDescriptor::reference("java.util.Map")
            }
            ExprKind::ListLit(elements) => {
                for e in elements {
                    self.resolve_expr(e)?;
                }
                TypeDescriptor::reference("java.util.List")
            }

            ExprKind::Name(name) => match self.lookup(name) {
                Some(ty) => ty.clone(),
                None => {
                    return Err(TranspileError::UnknownName { name: name.clone() });
                }
            },

            ExprKind::Enclosed(inner) => {
                self.resolve_expr(inner)?;
                inner.ty.clone().unwrap_or_else(TypeDescriptor::object)
            }

            ExprKind::FieldGet { scope, field } => {
                self.resolve_expr(scope)?;
                let field = field.clone();
                self.property_type(scope.ty.as_ref(), &field)
            }

            ExprKind::Call { scope, name, args } => {
                for arg in args.iter_mut() {
                    self.resolve_expr(arg)?;
                }
                let argc = args.len();
                let name = name.clone();

                match scope {
                    None => TypeDescriptor::object(),
                    Some(scope_expr) => {
                        // Static scope: a dotted class path whose head is
                        // not a variable in scope.
                        if let Some(class) = self.static_scope_class(scope_expr) {
                            scope_expr.ty = Some(TypeDescriptor::Reference(class.clone()));
                            match self.types.find_method(&class, &name, argc) {
                                Some(info) => info.ret.clone(),
                                None => {
                                    return Err(TranspileError::MethodResolution {
                                        class,
                                        method: name,
                                        arity: argc,
                                    });
                                }
                            }
                        } else {
                            self.resolve_expr(scope_expr)?;
                            if call_chain_depth(scope_expr) >= MAX_CHAIN_DEPTH {
                                // past the chain bound: fallback territory
                                TypeDescriptor::object()
                            } else {
                                self.instance_return_type(scope_expr.ty.as_ref(), &name, argc)?
                            }
                        }
                    }
                }
            }

            ExprKind::New { class, args } => {
                for arg in args.iter_mut() {
                    self.resolve_expr(arg)?;
                }
                let argc = args.len();
                let resolved = match class {
                    TypeName::Named { name, .. } => {
                        let resolved = self.resolve_type_name(name)?;
                        *name = resolved.clone();
                        resolved
                    }
                    other => {
                        return Err(TranspileError::TypeResolution {
                            name: other.source_name(),
                        });
                    }
                };
                if self.types.is_registered(&resolved)
                    && self.types.find_method(&resolved, "<init>", argc).is_none()
                {
                    return Err(TranspileError::MethodResolution {
                        class: resolved,
                        method: "<init>".to_string(),
                        arity: argc,
                    });
                }
                TypeDescriptor::Reference(resolved)
            }

            ExprKind::Index { scope, index } => {
                self.resolve_expr(scope)?;
                self.resolve_expr(index)?;
                TypeDescriptor::object()
            }

            ExprKind::Unary { op, inner } => {
                self.resolve_expr(inner)?;
                match op {
                    UnaryOp::Not => TypeDescriptor::Primitive(P::Boolean),
                    UnaryOp::Neg | UnaryOp::BitNot => {
                        inner.ty.clone().unwrap_or_else(TypeDescriptor::object)
                    }
                }
            }

            ExprKind::Binary { op, left, right } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)?;
                binary_result_type(*op, left.ty.as_ref(), right.ty.as_ref())
            }

            ExprKind::Assign { target, value, .. } => {
                self.resolve_expr(target)?;
                self.resolve_expr(value)?;
                target.ty.clone().unwrap_or_else(TypeDescriptor::object)
            }

            ExprKind::Cast { target, inner } => {
                self.resolve_expr(inner)?;
                match target {
                    TypeName::Primitive(tag) => TypeDescriptor::Primitive(*tag),
                    TypeName::Named { name, generics } => {
                        let resolved = self.resolve_type_name(name)?;
                        *name = resolved.clone();
                        match generics {
                            Some(g) => TypeDescriptor::Parameterized {
                                raw: resolved,
                                generics: g.clone(),
                            },
                            None => TypeDescriptor::Reference(resolved),
                        }
                    }
                    TypeName::Var => {
                        return Err(TranspileError::TypeResolution {
                            name: "var".to_string(),
                        });
                    }
                }
            }

            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => {
                self.resolve_expr(cond)?;
                self.resolve_expr(then)?;
                self.resolve_expr(otherwise)?;
                match (&then.ty, &otherwise.ty) {
                    (Some(a), Some(b)) if a == b => a.clone(),
                    _ => TypeDescriptor::object(),
                }
            }

            // Surface forms are gone after lowering
            ExprKind::NullSafeField { .. }
            | ExprKind::NullSafeCall { .. }
            | ExprKind::InlineCast { .. } => {
                debug_assert!(false, "surface form survived lowering");
                TypeDescriptor::object()
            }
        };

        expr.ty = Some(ty);
        Ok(())
    }

    /// Resolve a source type name to a fully qualified one.
    fn resolve_type_name(&self, name: &str) -> Result<String, TranspileError> {
        self.types
            .resolve_name(name, &self.req.imports)
            .ok_or_else(|| TranspileError::TypeResolution {
                name: name.to_string(),
            })
    }

    /// The registered class a call scope names, when the scope is a dotted
    /// path whose head is not a variable.
    fn static_scope_class(&self, scope: &Expr) -> Option<String> {
        let path = scope.as_dotted_path()?;
        let head = path.split('.').next()?;
        if self.lookup(head).is_some() {
            return None;
        }
        let fqcn = self.types.resolve_name(&path, &self.req.imports)?;
        if self.types.is_registered(&fqcn) {
            Some(fqcn)
        } else {
            None
        }
    }

    /// Return type of an instance call, or Object when the receiver is
    /// outside the registry's knowledge.
    fn instance_return_type(
        &self,
        scope_ty: Option<&TypeDescriptor>,
        name: &str,
        argc: usize,
    ) -> Result<TypeDescriptor, TranspileError> {
        let Some(class) = scope_ty.and_then(|ty| ty.class_name()) else {
            return Ok(TypeDescriptor::object());
        };
        if !self.types.is_registered(class) {
            return Ok(TypeDescriptor::object());
        }
        match self.types.find_method(class, name, argc) {
            Some(info) => Ok(info.ret.clone()),
            None => Err(TranspileError::MethodResolution {
                class: class.to_string(),
                method: name.to_string(),
                arity: argc,
            }),
        }
    }

    /// Property type through the bean getter, Object when unknown.
    fn property_type(&self, scope_ty: Option<&TypeDescriptor>, field: &str) -> TypeDescriptor {
        let Some(class) = scope_ty.and_then(|ty| ty.class_name()) else {
            return TypeDescriptor::object();
        };
        let capitalized = {
            let mut chars = field.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => return TypeDescriptor::object(),
            }
        };
        for prefix in ["get", "is"] {
            if let Some(info) = self
                .types
                .find_method(class, &format!("{prefix}{capitalized}"), 0)
            {
                return info.ret.clone();
            }
        }
        TypeDescriptor::object()
    }
}

/// Nesting depth of a call chain: `a.m1()` is 1, `a.m1().m2()` is 2.
pub(crate) fn call_chain_depth(expr: &Expr) -> usize {
    match &expr.kind {
        ExprKind::Call { scope, .. } => {
            1 + scope.as_deref().map(call_chain_depth).unwrap_or(0)
        }
        ExprKind::Enclosed(inner) => call_chain_depth(inner),
        _ => 0,
    }
}

fn descriptor_to_type_name(ty: &TypeDescriptor) -> TypeName {
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

/// Result type of a binary operation, mirroring the widening lattice.
fn binary_result_type(
    op: BinaryOp,
    left: Option<&TypeDescriptor>,
    right: Option<&TypeDescriptor>,
) -> TypeDescriptor {
    use PrimitiveTag as P;

    if op.is_comparison() || op.is_logical() {
        return TypeDescriptor::Primitive(P::Boolean);
    }

    let is_string =
        |ty: Option<&TypeDescriptor>| ty.and_then(|t| t.class_name()) == Some("java.lang.String");
    if op == BinaryOp::Add && (is_string(left) || is_string(right)) {
        return TypeDescriptor::string();
    }

    let big = |ty: Option<&TypeDescriptor>| {
        matches!(
            ty.and_then(|t| t.class_name()),
            Some("java.math.BigDecimal") | Some("java.math.BigInteger")
        )
    };
    if big(left) {
        return left.cloned().unwrap_or_else(TypeDescriptor::object);
    }
    if big(right) {
        return right.cloned().unwrap_or_else(TypeDescriptor::object);
    }

    let kind = |ty: Option<&TypeDescriptor>| ty.map(|t| t.value_kind());
    match (kind(left), kind(right)) {
        (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
            if matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr) {
                // shift result keeps the left operand's promoted kind
                return kind_to_primitive(a);
            }
            match ValueKind::widen(a, b) {
                Some(widened) => kind_to_primitive(widened),
                None => TypeDescriptor::object(),
            }
        }
        _ => TypeDescriptor::object(),
    }
}

fn kind_to_primitive(kind: ValueKind) -> TypeDescriptor {
    use PrimitiveTag as P;
    TypeDescriptor::Primitive(match kind {
        ValueKind::Int => P::Int,
        ValueKind::Long => P::Long,
        ValueKind::Float => P::Float,
        ValueKind::Double => P::Double,
        ValueKind::Reference => return TypeDescriptor::object(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::build_body;
    use crate::request::{CompilerRequest, Declaration};
    use ruse_parser::parse_expression;

    fn resolved_body(source: &str, decls: Vec<Declaration>) -> Vec<Stmt> {
        let req = CompilerRequest::map_expression(
            source,
            TypeDescriptor::reference("java.lang.Object"),
            decls,
        );
        let expr = parse_expression(source).unwrap();
        let mut body = build_body(&req, Some(expr), vec![]);
        let types = TypeRegistry::with_builtins();
        resolve(&mut body, &req, &types).unwrap();
        body
    }

    fn return_expr(body: &[Stmt]) -> &Expr {
        match &body.last().unwrap().kind {
            StmtKind::Return(Some(e)) => e,
            other => panic!("expected Return, got {other:?}"),
        }
    }

    fn int_decl(name: &str) -> Declaration {
        Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Int))
    }

    #[test]
    fn comparison_is_boolean() {
        let body = resolved_body("influence > 50", vec![int_decl("influence")]);
        assert_eq!(
            return_expr(&body).ty,
            Some(TypeDescriptor::primitive(PrimitiveTag::Boolean))
        );
    }

    #[test]
    fn arithmetic_widens() {
        let decls = vec![
            int_decl("a"),
            Declaration::new("d", TypeDescriptor::primitive(PrimitiveTag::Double)),
        ];
        let body = resolved_body("a + d", decls);
        assert_eq!(
            return_expr(&body).ty,
            Some(TypeDescriptor::primitive(PrimitiveTag::Double))
        );
    }

    #[test]
    fn string_concat_is_string() {
        let decls = vec![Declaration::new("s", TypeDescriptor::string())];
        let body = resolved_body("s + 1", decls);
        assert_eq!(return_expr(&body).ty, Some(TypeDescriptor::string()));
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let req = CompilerRequest::map_expression(
            "ghost + 1",
            TypeDescriptor::reference("java.lang.Object"),
            vec![],
        );
        let expr = parse_expression("ghost + 1").unwrap();
        let mut body = build_body(&req, Some(expr), vec![]);
        let types = TypeRegistry::with_builtins();
        let err = resolve(&mut body, &req, &types).unwrap_err();
        assert!(matches!(err, TranspileError::UnknownName { name } if name == "ghost"));
    }

    #[test]
    fn static_math_call_resolves_to_double() {
        let body = resolved_body("Math.abs(a)", vec![int_decl("a")]);
        assert_eq!(
            return_expr(&body).ty,
            Some(TypeDescriptor::primitive(PrimitiveTag::Double))
        );
    }

    #[test]
    fn missing_method_on_registered_class_is_hard_error() {
        let req = CompilerRequest::map_expression(
            "Math.nope(1)",
            TypeDescriptor::reference("java.lang.Object"),
            vec![],
        );
        let expr = parse_expression("Math.nope(1)").unwrap();
        let mut body = build_body(&req, Some(expr), vec![]);
        let types = TypeRegistry::with_builtins();
        let err = resolve(&mut body, &req, &types).unwrap_err();
        assert!(matches!(
            err,
            TranspileError::MethodResolution { class, method, arity: 1 }
                if class == "java.lang.Math" && method == "nope"
        ));
    }

    #[test]
    fn unknown_type_in_cast_is_rejected() {
        let req = CompilerRequest::map_expression(
            "(Mystery) a",
            TypeDescriptor::reference("java.lang.Object"),
            vec![int_decl("a")],
        );
        let expr = parse_expression("(Mystery) a").unwrap();
        let mut body = build_body(&req, Some(expr), vec![]);
        let types = TypeRegistry::with_builtins();
        let err = resolve(&mut body, &req, &types).unwrap_err();
        assert!(matches!(err, TranspileError::TypeResolution { name } if name == "Mystery"));
    }

    #[test]
    fn chain_past_depth_bound_degrades_to_object() {
        let decls = vec![Declaration::new("s", TypeDescriptor::string())];
        // depth 3: trim().trim().trim()
        let body = resolved_body("s.trim().trim().trim()", decls);
        assert_eq!(return_expr(&body).ty, Some(TypeDescriptor::object()));
    }

    #[test]
    fn chain_within_bound_resolves() {
        let decls = vec![Declaration::new("s", TypeDescriptor::string())];
        let body = resolved_body("s.trim().length()", decls);
        assert_eq!(
            return_expr(&body).ty,
            Some(TypeDescriptor::primitive(PrimitiveTag::Int))
        );
    }

    #[test]
    fn var_declaration_infers_from_initializer() {
        let req = CompilerRequest {
            content: crate::request::ContentKind::Block,
            ..CompilerRequest::map_expression(
                "",
                TypeDescriptor::reference("java.lang.Object"),
                vec![],
            )
        };
        let stmts = ruse_parser::parse_block("var s = 0B; return s;").unwrap();
        let mut body = build_body(&req, None, stmts);
        let types = TypeRegistry::with_builtins();
        resolve(&mut body, &req, &types).unwrap();

        // find the var decl: its type name must now be BigDecimal
        let decl = body
            .iter()
            .find_map(|s| match &s.kind {
                StmtKind::VarDecl { ty, name, .. } if name == "s" => Some(ty.clone()),
                _ => None,
            })
            .expect("s declaration");
        assert_eq!(
            decl,
            TypeName::named("java.math.BigDecimal")
        );
    }
}
