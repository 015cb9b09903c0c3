//! Fallback compiler adapter.
//!
//! For bodies the direct emitter declines, the adapter pretty-prints the
//! lowered EIR as host source wrapped in a class declaration and hands it
//! to an injected [`HostCompiler`]. The adapter itself performs no further
//! rewrites, and it never re-enters the direct emitter.
//!
//! The built-in [`DynCompiler`] is the general-path twin of the direct
//! emitter: it re-parses the printed body and compiles every construct to
//! the boxed-value subset of the instruction set. Anything the language can
//! express compiles here; what it gives up is the typed fast path.

use crate::print::{print_body, print_expr};
use crate::request::CompilerRequest;
use ruse_ast::{
    AssignOp, BinaryOp, Expr, ExprKind, Stmt, StmtKind, TypeName, UnaryOp,
};
use ruse_runtime::{Cmp, CodeBuilder, CompileError, Op, TypeRegistry, UnitBuilder};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Pretty-printed host source plus the request context a compiler needs.
///
/// `text` is the authoritative rendering (it appears in diagnostics); the
/// structured fields identify the pieces without re-parsing the wrapper.
#[derive(Debug, Clone)]
pub struct HostSource {
    /// Fully qualified generated class name.
    pub class_name: String,
    /// Entry method name (always `eval`).
    pub method_name: String,
    /// The eval parameter name.
    pub context_param: String,
    /// A declared `with` target; shares the argument slot.
    pub with_param: Option<String>,
    /// Method body statements, printed.
    pub body: String,
    /// Full class text.
    pub text: String,
    pub imports: BTreeSet<String>,
    pub static_imports: BTreeSet<String>,
}

/// An external compiler turning host source into unit bytes.
pub trait HostCompiler: Send + Sync {
    fn compile(
        &self,
        source: &HostSource,
        types: &TypeRegistry,
    ) -> Result<BTreeMap<String, Vec<u8>>, CompileError>;
}

/// Render the lowered body as host source for the fallback path.
pub fn host_source(req: &CompilerRequest, body: &[Stmt]) -> HostSource {
    let body_text = print_body(body, 2);
    let class_name = req.fqcn();
    let out = req.out.boxed().source_name();
    let context_ty = req.context_declaration.ty.source_name();
    let context_param = req.context_declaration.name.clone();

    let mut text = String::new();
    let _ = writeln!(text, "package {};", crate::request::GENERATED_PACKAGE);
    text.push('\n');
    for import in &req.imports {
        let _ = writeln!(text, "import {import};");
    }
    for import in &req.static_imports {
        let _ = writeln!(text, "import static {import};");
    }
    if !req.imports.is_empty() || !req.static_imports.is_empty() {
        text.push('\n');
    }
    let simple = class_name.rsplit('.').next().unwrap_or(&class_name);
    let _ = writeln!(text, "public class {simple} implements Evaluator {{");
    let _ = writeln!(text, "    public {out} eval({context_ty} {context_param}) {{");
    text.push_str(&body_text);
    let _ = writeln!(text, "    }}");
    let _ = writeln!(text, "}}");

    HostSource {
        class_name,
        method_name: "eval".to_string(),
        context_param,
        with_param: req.with_declaration.as_ref().map(|d| d.name.clone()),
        body: body_text,
        text,
        imports: req.imports.clone(),
        static_imports: req.static_imports.clone(),
    }
}

/// The built-in host compiler: boxed-value compilation of the full
/// language.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynCompiler;

impl HostCompiler for DynCompiler {
    fn compile(
        &self,
        source: &HostSource,
        types: &TypeRegistry,
    ) -> Result<BTreeMap<String, Vec<u8>>, CompileError> {
        let stmts = ruse_parser::parse_block(&source.body).map_err(|e| {
            CompileError::new("fallback compiler rejected generated source")
                .with_generated_source(source.text.clone())
                .with_diagnostics(e.to_string())
        })?;

        let mut unit = UnitBuilder::new(&source.class_name);
        let mut emitter = DynEmitter {
            unit: &mut unit,
            code: CodeBuilder::new(),
            slots: FxHashMap::default(),
            next_slot: 2,
            source,
            types,
        };
        emitter.slots.insert(source.context_param.clone(), 1);
        if let Some(with) = &source.with_param {
            emitter.slots.insert(with.clone(), 1);
        }

        for stmt in &stmts {
            emitter.stmt(stmt)?;
        }
        if !stmts.last().is_some_and(|s| s.kind.ends_with_return()) {
            let null = emitter.unit.const_null();
            emitter.code.emit(Op::Const(null));
            emitter.code.emit(Op::Return(ruse_ast::ValueKind::Reference));
        }

        let max_slots = emitter.next_slot;
        let code = emitter.code.finish().map_err(|e| {
            CompileError::new(e.message).with_generated_source(source.text.clone())
        })?;
        unit.add_method(
            &source.method_name,
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            max_slots,
            code,
        );

        Ok(BTreeMap::from([(source.class_name.clone(), unit.build())]))
    }
}

struct DynEmitter<'a> {
    unit: &'a mut UnitBuilder,
    code: CodeBuilder,
    slots: FxHashMap<String, u16>,
    next_slot: u16,
    source: &'a HostSource,
    types: &'a TypeRegistry,
}

impl DynEmitter<'_> {
    fn fail(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message)
            .with_generated_source(self.source.text.clone())
    }

    fn allocate(&mut self, name: &str) -> u16 {
        if let Some(slot) = self.slots.get(name) {
            return *slot;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(name.to_string(), slot);
        slot
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.expr(e)?;
                self.code.emit(Op::Pop);
                Ok(())
            }
            StmtKind::VarDecl { name, init, .. } => {
                match init {
                    Some(init) => self.expr(init)?,
                    None => {
                        let null = self.unit.const_null();
                        self.code.emit(Op::Const(null));
                    }
                }
                let slot = self.allocate(name);
                self.code.emit(Op::Store(ruse_ast::ValueKind::Reference, slot));
                Ok(())
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond)?;
                match otherwise {
                    None => {
                        let end = self.code.new_label();
                        self.code.jump_if(Cmp::Eq, end);
                        self.stmt(then)?;
                        self.code.bind(end);
                    }
                    Some(otherwise) => {
                        let else_label = self.code.new_label();
                        let end = self.code.new_label();
                        self.code.jump_if(Cmp::Eq, else_label);
                        self.stmt(then)?;
                        if !then.kind.ends_with_return() {
                            self.code.goto(end);
                        }
                        self.code.bind(else_label);
                        self.stmt(otherwise)?;
                        self.code.bind(end);
                    }
                }
                Ok(())
            }
            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
                Ok(())
            }
            StmtKind::Return(expr) => {
                match expr {
                    Some(expr) => self.expr(expr)?,
                    None => {
                        let null = self.unit.const_null();
                        self.code.emit(Op::Const(null));
                    }
                }
                self.code.emit(Op::Return(ruse_ast::ValueKind::Reference));
                Ok(())
            }
            StmtKind::Empty => Ok(()),
            StmtKind::Modify { .. } | StmtKind::With { .. } => {
                Err(self.fail("modify/with in generated source"))
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Int(v) => {
                let idx = self.unit.const_int(*v);
                self.code.emit(Op::Const(idx));
            }
            ExprKind::Long(v) => {
                let idx = self.unit.const_long(*v);
                self.code.emit(Op::Const(idx));
            }
            ExprKind::Float(v) => {
                let idx = self.unit.const_float(*v);
                self.code.emit(Op::Const(idx));
            }
            ExprKind::Double(v) => {
                let idx = self.unit.const_double(*v);
                self.code.emit(Op::Const(idx));
            }
            ExprKind::Bool(v) => {
                let idx = self.unit.const_int(*v as i32);
                self.code.emit(Op::Const(idx));
                self.dyn_cast_to("boolean");
            }
            ExprKind::Char(c) => {
                let idx = self.unit.const_int(*c as i32);
                self.code.emit(Op::Const(idx));
                self.dyn_cast_to("char");
            }
            ExprKind::Str(s) => {
                let idx = self.unit.const_str(s);
                self.code.emit(Op::Const(idx));
            }
            ExprKind::Null => {
                let idx = self.unit.const_null();
                self.code.emit(Op::Const(idx));
            }

            ExprKind::Name(name) => match self.slots.get(name.as_str()) {
                Some(slot) => {
                    self.code.emit(Op::Load(ruse_ast::ValueKind::Reference, *slot));
                }
                None => {
                    return Err(self.fail(format!("cannot resolve symbol '{name}'")));
                }
            },

            ExprKind::Enclosed(inner) => self.expr(inner)?,

            ExprKind::FieldGet { scope, field } => {
                self.expr(scope)?;
                let idx = self.unit.intern(field);
                self.code.emit(Op::DynGetField(idx));
            }

            ExprKind::Index { scope, index } => {
                self.expr(scope)?;
                self.expr(index)?;
                self.code.emit(Op::DynIndex);
            }

            ExprKind::Call { scope, name, args } => self.call(scope.as_deref(), name, args)?,

            ExprKind::New { class, args } => {
                for arg in args {
                    self.expr(arg)?;
                }
                let fqcn = self.resolve_class(class)?;
                let idx = self.unit.intern(&fqcn);
                self.code.emit(Op::DynNew(idx, args.len() as u8));
            }

            ExprKind::Unary { op, inner } => {
                self.expr(inner)?;
                self.code.emit(match op {
                    UnaryOp::Not => Op::DynNot,
                    UnaryOp::Neg => Op::DynNeg,
                    UnaryOp::BitNot => Op::DynBitNot,
                });
            }

            ExprKind::Binary { op, left, right } => self.binary(*op, left, right)?,

            ExprKind::Assign { op, target, value } => self.assign(*op, target, value)?,

            ExprKind::Cast { target, inner } => {
                self.expr(inner)?;
                let name = match target {
                    TypeName::Primitive(tag) => tag.keyword().to_string(),
                    other => self.resolve_class_lenient(other),
                };
                self.dyn_cast_to(&name);
            }

            ExprKind::Cond {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.code.new_label();
                let end = self.code.new_label();
                self.expr(cond)?;
                self.code.jump_if(Cmp::Eq, else_label);
                self.expr(then)?;
                self.code.goto(end);
                self.code.bind(else_label);
                self.expr(otherwise)?;
                self.code.bind(end);
            }

            other => {
                return Err(self.fail(format!(
                    "unexpected construct in generated source: {}",
                    print_expr(&Expr::new(other.clone(), expr.span))
                )));
            }
        }
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<(), CompileError> {
        // Short-circuit forms keep their evaluation discipline even on the
        // dynamic path.
        if op == BinaryOp::And {
            let false_label = self.code.new_label();
            let end = self.code.new_label();
            self.expr(left)?;
            self.code.jump_if(Cmp::Eq, false_label);
            self.expr(right)?;
            self.code.goto(end);
            self.code.bind(false_label);
            let zero = self.unit.const_int(0);
            self.code.emit(Op::Const(zero));
            self.code.bind(end);
            self.dyn_cast_to("boolean");
            return Ok(());
        }
        if op == BinaryOp::Or {
            let true_label = self.code.new_label();
            let end = self.code.new_label();
            self.expr(left)?;
            self.code.jump_if(Cmp::Ne, true_label);
            self.expr(right)?;
            self.code.goto(end);
            self.code.bind(true_label);
            let one = self.unit.const_int(1);
            self.code.emit(Op::Const(one));
            self.code.bind(end);
            self.dyn_cast_to("boolean");
            return Ok(());
        }

        self.expr(left)?;
        self.expr(right)?;
        self.code.emit(match op {
            BinaryOp::Add => Op::DynAdd,
            BinaryOp::Sub => Op::DynSub,
            BinaryOp::Mul => Op::DynMul,
            BinaryOp::Div => Op::DynDiv,
            BinaryOp::Rem => Op::DynRem,
            BinaryOp::Eq => Op::DynCmp(Cmp::Eq),
            BinaryOp::Ne => Op::DynCmp(Cmp::Ne),
            BinaryOp::Lt => Op::DynCmp(Cmp::Lt),
            BinaryOp::Le => Op::DynCmp(Cmp::Le),
            BinaryOp::Gt => Op::DynCmp(Cmp::Gt),
            BinaryOp::Ge => Op::DynCmp(Cmp::Ge),
            BinaryOp::BitAnd => Op::DynBitAnd,
            BinaryOp::BitOr => Op::DynBitOr,
            BinaryOp::BitXor => Op::DynBitXor,
            BinaryOp::Shl => Op::DynShl,
            BinaryOp::Shr => Op::DynShr,
            BinaryOp::Ushr => Op::DynUshr,
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit handled above"),
        });
        Ok(())
    }

    fn assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
    ) -> Result<(), CompileError> {
        match &target.kind {
            ExprKind::Name(name) => {
                let slot = match self.slots.get(name.as_str()) {
                    Some(slot) => *slot,
                    None => return Err(self.fail(format!("assignment to unknown '{name}'"))),
                };
                match op.binary_op() {
                    None => self.expr(value)?,
                    Some(bop) => {
                        self.code.emit(Op::Load(ruse_ast::ValueKind::Reference, slot));
                        self.expr(value)?;
                        self.compound(bop);
                    }
                }
                self.code.emit(Op::Store(ruse_ast::ValueKind::Reference, slot));
                self.code.emit(Op::Load(ruse_ast::ValueKind::Reference, slot));
                Ok(())
            }
            ExprKind::FieldGet { scope, field } => {
                self.expr(scope)?;
                let idx = self.unit.intern(field);
                match op.binary_op() {
                    None => self.expr(value)?,
                    Some(bop) => {
                        // re-evaluate the scope for the read half
                        self.expr(scope)?;
                        self.code.emit(Op::DynGetField(idx));
                        self.expr(value)?;
                        self.compound(bop);
                    }
                }
                self.code.emit(Op::DynSetField(idx));
                Ok(())
            }
            ExprKind::Index { scope, index } => {
                self.expr(scope)?;
                self.expr(index)?;
                match op.binary_op() {
                    None => self.expr(value)?,
                    Some(bop) => {
                        self.expr(scope)?;
                        self.expr(index)?;
                        self.code.emit(Op::DynIndex);
                        self.expr(value)?;
                        self.compound(bop);
                    }
                }
                self.code.emit(Op::DynIndexSet);
                Ok(())
            }
            other => Err(self.fail(format!("invalid assignment target: {other:?}"))),
        }
    }

    fn compound(&mut self, op: BinaryOp) {
        self.code.emit(match op {
            BinaryOp::Add => Op::DynAdd,
            BinaryOp::Sub => Op::DynSub,
            BinaryOp::Mul => Op::DynMul,
            BinaryOp::Div => Op::DynDiv,
            BinaryOp::Rem => Op::DynRem,
            BinaryOp::BitAnd => Op::DynBitAnd,
            BinaryOp::BitOr => Op::DynBitOr,
            BinaryOp::BitXor => Op::DynBitXor,
            BinaryOp::Shl => Op::DynShl,
            BinaryOp::Shr => Op::DynShr,
            BinaryOp::Ushr => Op::DynUshr,
            other => unreachable!("not a compound operator: {other}"),
        });
    }

    fn call(
        &mut self,
        scope: Option<&Expr>,
        name: &str,
        args: &[Expr],
    ) -> Result<(), CompileError> {
        match scope {
            None => {
                // Free function: resolve through static imports
                let suffix = format!(".{name}");
                let import = self
                    .source
                    .static_imports
                    .iter()
                    .find(|i| i.ends_with(&suffix))
                    .ok_or_else(|| {
                        self.fail(format!("cannot resolve free function '{name}'"))
                            .with_diagnostics(format!(
                                "no static import ends with '{suffix}'"
                            ))
                    })?;
                let class = import[..import.len() - suffix.len()].to_string();
                for arg in args {
                    self.expr(arg)?;
                }
                let mref =
                    self.unit
                        .method_ref(&class, name, &format!("*{}", args.len()));
                self.code.emit(Op::DynInvokeStatic(mref, args.len() as u8));
                Ok(())
            }
            Some(scope) => {
                // Class-named scope → static dispatch
                if let Some(class) = self.static_scope(scope) {
                    for arg in args {
                        self.expr(arg)?;
                    }
                    let mref =
                        self.unit
                            .method_ref(&class, name, &format!("*{}", args.len()));
                    self.code.emit(Op::DynInvokeStatic(mref, args.len() as u8));
                    return Ok(());
                }

                self.expr(scope)?;
                for arg in args {
                    self.expr(arg)?;
                }
                let idx = self.unit.intern(name);
                self.code.emit(Op::DynInvoke(idx, args.len() as u8));
                Ok(())
            }
        }
    }

    /// The registered class a scope path names, unless its head is a local.
    fn static_scope(&self, scope: &Expr) -> Option<String> {
        let path = scope.as_dotted_path()?;
        let head = path.split('.').next()?;
        if self.slots.contains_key(head) {
            return None;
        }
        let fqcn = self.types.resolve_name(&path, &self.source.imports)?;
        if self.types.is_registered(&fqcn) {
            Some(fqcn)
        } else {
            None
        }
    }

    fn resolve_class(&self, class: &TypeName) -> Result<String, CompileError> {
        match class {
            TypeName::Named { name, .. } => self
                .types
                .resolve_name(name, &self.source.imports)
                .ok_or_else(|| self.fail(format!("cannot resolve class '{name}'"))),
            other => Err(self.fail(format!("cannot construct '{}'", other.source_name()))),
        }
    }

    fn resolve_class_lenient(&self, class: &TypeName) -> String {
        match class {
            TypeName::Named { name, .. } => self
                .types
                .resolve_name(name, &self.source.imports)
                .unwrap_or_else(|| name.clone()),
            other => other.source_name(),
        }
    }

    fn dyn_cast_to(&mut self, type_name: &str) {
        let idx = self.unit.intern(type_name);
        self.code.emit(Op::DynCast(idx));
    }
}
