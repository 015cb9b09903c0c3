//! Direct emitter — lowers the resolved EIR body straight to a code unit.
//!
//! One post-order walk over the body, driven by two pieces of state: the
//! local slot table and the code builder. Instruction selection follows
//! [`crate::infer::stack_kind`] exactly; disagreement between the two is a
//! verifier rejection at load time, which is treated as an emitter bug and
//! surfaced, never silently retried.

mod expr;
mod gate;

pub use gate::{can_emit, diagnose_rejection};

use crate::error::CompilerError;
use crate::infer::stack_kind;
use crate::request::CompilerRequest;
use crate::slots::LocalSlotTable;
use ruse_ast::{
    method_descriptor, Expr, ExprKind, PrimitiveTag, Stmt, StmtKind, TypeDescriptor, TypeName,
    ValueKind,
};
use ruse_runtime::{Cmp, CodeBuilder, CompileError, NumKind, Op, TypeRegistry, UnitBuilder};
use std::collections::BTreeMap;

/// Emit the evaluator unit for a lowered, resolved body.
///
/// Returns `{fqcn: bytes}` ready for the registry. The unit carries the
/// concrete `eval(Context) -> Out` method and, unless the context is
/// already the top reference type, the erasure bridge
/// `eval(Object) -> Object`.
pub fn emit(
    body: &[Stmt],
    req: &CompilerRequest,
    types: &TypeRegistry,
) -> Result<BTreeMap<String, Vec<u8>>, CompilerError> {
    let fqcn = req.fqcn();
    let mut unit = UnitBuilder::new(&fqcn);

    let context_ty = erased(&req.context_declaration.ty);
    let out_ty = req.out.boxed();
    let eval_descriptor = method_descriptor(&[context_ty.clone()], &out_ty);

    // Concrete eval method
    let mut slots = LocalSlotTable::new(&req.context_declaration.name, context_ty.clone());
    if let Some(with) = &req.with_declaration {
        // the with target is the eval_with argument: same slot, its own type
        slots.alias_argument(&with.name, erased(&with.ty));
    }
    let mut method = MethodEmitter {
        unit: &mut unit,
        code: CodeBuilder::new(),
        slots,
        req,
        types,
    };
    for stmt in body {
        method.emit_stmt(stmt)?;
    }
    let max_slots = method.slots.max_slots();
    let code = method.code.finish()?;
    unit.add_method("eval", &eval_descriptor, max_slots, code);

    // Erasure bridge, unless the context already is the top reference type
    if !context_ty.is_object() {
        let context_class = context_ty
            .class_name()
            .unwrap_or("java.lang.Object")
            .to_string();
        let own = unit.method_ref(&fqcn, "eval", &eval_descriptor);
        let class_ref = unit.intern(&context_class);

        let mut bridge = CodeBuilder::new();
        bridge.emit(Op::Load(ValueKind::Reference, 0));
        bridge.emit(Op::Load(ValueKind::Reference, 1));
        bridge.emit(Op::CheckCast(class_ref));
        bridge.emit(Op::InvokeVirtual(own));
        bridge.emit(Op::Return(ValueKind::Reference));
        unit.add_method(
            "eval",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            2,
            bridge.finish()?,
        );
    }

    Ok(BTreeMap::from([(fqcn, unit.build())]))
}

/// Erase a declaration type to its emission form (generics dropped).
fn erased(ty: &TypeDescriptor) -> TypeDescriptor {
    match ty {
        TypeDescriptor::Parameterized { raw, .. } => TypeDescriptor::Reference(raw.clone()),
        other => other.clone(),
    }
}

pub(super) struct MethodEmitter<'a> {
    pub(super) unit: &'a mut UnitBuilder,
    pub(super) code: CodeBuilder,
    pub(super) slots: LocalSlotTable,
    pub(super) req: &'a CompilerRequest,
    pub(super) types: &'a TypeRegistry,
}

impl MethodEmitter<'_> {
    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CompilerError> {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                if let ExprKind::Assign { .. } = &e.kind {
                    self.emit_assign(e, false)?;
                    return Ok(());
                }
                self.emit_expr(e)?;
                // Discard the statement's value; void-returning calls left
                // nothing on the stack.
                if e.ty.as_ref().is_none_or(|ty| !ty.is_void()) {
                    self.code.emit(Op::Pop);
                }
                Ok(())
            }

            StmtKind::VarDecl { ty, name, init } => self.emit_var_decl(ty, name, init.as_ref()),

            StmtKind::If {
                cond,
                then,
                otherwise,
            } => self.emit_if(cond, then, otherwise.as_deref()),

            StmtKind::Block(stmts) => {
                for stmt in stmts {
                    self.emit_stmt(stmt)?;
                }
                Ok(())
            }

            StmtKind::Return(expr) => self.emit_return(expr.as_ref()),

            StmtKind::Empty => Ok(()),

            StmtKind::Modify { .. } | StmtKind::With { .. } => Err(internal(
                "modify/with reached the emitter (lowering bug)",
            )),
        }
    }

    fn emit_var_decl(
        &mut self,
        ty: &TypeName,
        name: &str,
        init: Option<&Expr>,
    ) -> Result<(), CompilerError> {
        let declared = ty
            .descriptor()
            .ok_or_else(|| internal("unresolved declaration type reached the emitter"))?;
        let declared = erased(&declared);

        // Boxed-wrapper declarations live in primitive slots: emit the
        // initializer, checkcast to the wrapper, extract the primitive.
        let (slot_ty, unbox_from) = match declared.boxed_tag() {
            Some(tag) => (TypeDescriptor::Primitive(tag), Some(tag)),
            None => (declared.clone(), None),
        };

        match init {
            Some(init) => {
                let kind = self.emit_expr(init)?;
                match (&slot_ty, kind) {
                    (TypeDescriptor::Primitive(tag), ValueKind::Reference) => {
                        let tag = unbox_from.unwrap_or(*tag);
                        self.emit_unbox(tag);
                    }
                    (TypeDescriptor::Primitive(tag), kind) => {
                        self.convert(kind, tag.value_kind());
                    }
                    (_, kind) if kind.is_numeric() => {
                        // reference declaration with a primitive initializer
                        self.box_natural(init.ty.as_ref(), kind);
                    }
                    _ => {}
                }
            }
            None => {
                let default = match slot_ty.value_kind() {
                    ValueKind::Int => Op::Const(self.unit.const_int(0)),
                    ValueKind::Long => Op::Const(self.unit.const_long(0)),
                    ValueKind::Float => Op::Const(self.unit.const_float(0.0)),
                    ValueKind::Double => Op::Const(self.unit.const_double(0.0)),
                    ValueKind::Reference => Op::Const(self.unit.const_null()),
                };
                self.code.emit(default);
            }
        }

        self.slots.allocate(name, slot_ty);
        self.slots
            .store(&mut self.code, name)
            .ok_or_else(|| internal("freshly allocated slot missing"))?;
        Ok(())
    }

    fn emit_if(
        &mut self,
        cond: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
    ) -> Result<(), CompilerError> {
        self.emit_expr(cond)?;

        match otherwise {
            None => {
                let end = self.code.new_label();
                self.code.jump_if(Cmp::Eq, end);
                self.emit_stmt(then)?;
                self.code.bind(end);
            }
            Some(otherwise) => {
                let else_label = self.code.new_label();
                let end = self.code.new_label();
                self.code.jump_if(Cmp::Eq, else_label);
                self.emit_stmt(then)?;
                // No goto when the then-branch already returned: the jump
                // would be dead code and the verifier rejects it.
                if !then.kind.ends_with_return() {
                    self.code.goto(end);
                }
                self.code.bind(else_label);
                self.emit_stmt(otherwise)?;
                self.code.bind(end);
            }
        }
        Ok(())
    }

    fn emit_return(&mut self, expr: Option<&Expr>) -> Result<(), CompilerError> {
        let kind = match expr {
            Some(expr) => {
                let kind = self.emit_expr(expr)?;
                if kind.is_numeric() {
                    self.box_for_return(expr.ty.as_ref(), kind);
                }
                ValueKind::Reference
            }
            None => {
                let null = self.unit.const_null();
                self.code.emit(Op::Const(null));
                ValueKind::Reference
            }
        };
        self.code.emit(Op::Return(kind));
        Ok(())
    }

    /// Box a primitive return value to the *declared* output type: a
    /// boolean-valued comparison boxes through `Boolean.valueOf` even
    /// though the stack shape is int.
    fn box_for_return(&mut self, expr_ty: Option<&TypeDescriptor>, kind: ValueKind) {
        let declared = self
            .req
            .out
            .primitive_tag()
            .or_else(|| self.req.out.boxed_tag());
        match declared {
            Some(tag) if tag.value_kind() == kind => self.emit_box(tag),
            _ => self.box_natural(expr_ty, kind),
        }
    }

    /// Box using the expression's own primitive type when known, else the
    /// natural box of the stack kind.
    pub(super) fn box_natural(&mut self, expr_ty: Option<&TypeDescriptor>, kind: ValueKind) {
        let tag = expr_ty
            .and_then(|ty| ty.primitive_tag())
            .unwrap_or(match kind {
                ValueKind::Int => PrimitiveTag::Int,
                ValueKind::Long => PrimitiveTag::Long,
                ValueKind::Float => PrimitiveTag::Float,
                ValueKind::Double => PrimitiveTag::Double,
                ValueKind::Reference => return,
            });
        self.emit_box(tag);
    }

    /// `Integer.valueOf(int)` and friends.
    pub(super) fn emit_box(&mut self, tag: PrimitiveTag) {
        let owner = tag.boxed_name();
        let descriptor = format!(
            "({})L{};",
            tag.descriptor(),
            owner.replace('.', "/")
        );
        let mref = self.unit.method_ref(owner, "valueOf", &descriptor);
        self.code.emit(Op::InvokeStatic(mref));
    }

    /// `checkcast Integer; invokevirtual intValue()` — the stack holds a
    /// reference that must become a primitive.
    pub(super) fn emit_unbox(&mut self, tag: PrimitiveTag) {
        let owner = tag.boxed_name();
        let class_ref = self.unit.intern(owner);
        self.code.emit(Op::CheckCast(class_ref));
        let descriptor = format!("(){}", tag.descriptor());
        let mref = self.unit.method_ref(owner, tag.unbox_method(), &descriptor);
        self.code.emit(Op::InvokeVirtual(mref));
    }

    /// Numeric conversion between stack kinds (no-op when equal).
    pub(super) fn convert(&mut self, from: ValueKind, to: ValueKind) {
        if from == to {
            return;
        }
        let (Some(from), Some(to)) = (NumKind::from_value_kind(from), NumKind::from_value_kind(to))
        else {
            return;
        };
        self.code.emit(Op::Conv(from, to));
    }

    /// The widened kind of a binary operation's operands.
    pub(super) fn widened(&self, left: &Expr, right: &Expr) -> Result<ValueKind, CompilerError> {
        ValueKind::widen(stack_kind(left), stack_kind(right))
            .ok_or_else(|| internal("widening requested for reference operands"))
    }
}

pub(super) fn internal(message: &str) -> CompilerError {
    CompilerError::Compile(CompileError::new(message))
}
