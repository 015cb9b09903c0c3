//! Expression emission for the direct emitter.

use super::{gate, internal, MethodEmitter};
use crate::error::{CompilerError, TranspileError};
use crate::infer::stack_kind;
use ruse_ast::{
    AssignOp, BinaryOp, Expr, ExprKind, PrimitiveTag, TypeDescriptor, TypeName, UnaryOp, ValueKind,
};
use ruse_runtime::{Cmp, IntWidth, MethodInfo, NumKind, Op};
use std::sync::Arc;

impl MethodEmitter<'_> {
    /// Emit one expression; returns the kind left on the stack.
    pub(super) fn emit_expr(&mut self, expr: &Expr) -> Result<ValueKind, CompilerError> {
        match &expr.kind {
            ExprKind::Int(v) => {
                let idx = self.unit.const_int(*v);
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Int)
            }
            ExprKind::Long(v) => {
                let idx = self.unit.const_long(*v);
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Long)
            }
            ExprKind::Float(v) => {
                let idx = self.unit.const_float(*v);
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Float)
            }
            ExprKind::Double(v) => {
                let idx = self.unit.const_double(*v);
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Double)
            }
            ExprKind::Bool(v) => {
                let idx = self.unit.const_int(*v as i32);
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Int)
            }
            ExprKind::Char(c) => {
                let idx = self.unit.const_int(*c as i32);
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Int)
            }
            ExprKind::Str(s) => {
                let idx = self.unit.const_str(s);
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Reference)
            }
            ExprKind::Null => {
                let idx = self.unit.const_null();
                self.code.emit(Op::Const(idx));
                Ok(ValueKind::Reference)
            }

            ExprKind::Name(name) => self
                .slots
                .load(&mut self.code, name)
                .ok_or_else(|| internal(&format!("unknown variable '{name}' in emitter"))),

            ExprKind::Enclosed(inner) => self.emit_expr(inner),

            ExprKind::Unary { op, inner } => self.emit_unary(*op, inner),

            ExprKind::Binary { op, left, right } => self.emit_binary(expr, *op, left, right),

            ExprKind::Cast { target, inner } => self.emit_cast(target, inner),

            ExprKind::Call { scope, name, args } => {
                self.emit_call(scope.as_deref(), name, args)
            }

            ExprKind::New { class, args } => self.emit_new(class, args),

            ExprKind::Assign { .. } => self.emit_assign(expr, true),

            other => Err(internal(&format!(
                "unsupported node reached the emitter: {other:?}"
            ))),
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, inner: &Expr) -> Result<ValueKind, CompilerError> {
        match op {
            UnaryOp::Not => {
                // !b → b ^ 1
                self.emit_expr(inner)?;
                let one = self.unit.const_int(1);
                self.code.emit(Op::Const(one));
                self.code.emit(Op::BitXor(IntWidth::Int));
                Ok(ValueKind::Int)
            }
            UnaryOp::Neg => {
                let kind = self.emit_expr(inner)?;
                let num = NumKind::from_value_kind(kind)
                    .ok_or_else(|| internal("negation of a reference"))?;
                self.code.emit(Op::Neg(num));
                Ok(kind)
            }
            UnaryOp::BitNot => {
                let kind = self.emit_expr(inner)?;
                match kind {
                    ValueKind::Int => {
                        let m1 = self.unit.const_int(-1);
                        self.code.emit(Op::Const(m1));
                        self.code.emit(Op::BitXor(IntWidth::Int));
                    }
                    ValueKind::Long => {
                        let m1 = self.unit.const_long(-1);
                        self.code.emit(Op::Const(m1));
                        self.code.emit(Op::BitXor(IntWidth::Long));
                    }
                    other => {
                        return Err(internal(&format!("bitwise complement of {other:?}")));
                    }
                }
                Ok(kind)
            }
        }
    }

    fn emit_binary(
        &mut self,
        whole: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<ValueKind, CompilerError> {
        if op == BinaryOp::And {
            return self.emit_short_circuit_and(left, right);
        }
        if op == BinaryOp::Or {
            return self.emit_short_circuit_or(left, right);
        }
        if op.is_comparison() {
            return self.emit_comparison(op, left, right);
        }

        // String concatenation: at least one String operand
        let result_is_string =
            whole.ty.as_ref().and_then(|t| t.class_name()) == Some("java.lang.String");
        if op == BinaryOp::Add && result_is_string {
            return self.emit_concat(left, right);
        }

        if op.is_arithmetic() {
            let wide = self.widened(left, right)?;
            let num = NumKind::from_value_kind(wide)
                .ok_or_else(|| internal("arithmetic on references"))?;
            let lk = self.emit_expr(left)?;
            self.convert(lk, wide);
            let rk = self.emit_expr(right)?;
            self.convert(rk, wide);
            let instr = match op {
                BinaryOp::Add => Op::Add(num),
                BinaryOp::Sub => Op::Sub(num),
                BinaryOp::Mul => Op::Mul(num),
                BinaryOp::Div => Op::Div(num),
                BinaryOp::Rem => Op::Rem(num),
                _ => unreachable!("is_arithmetic covered"),
            };
            self.code.emit(instr);
            return Ok(wide);
        }

        // Bitwise and shift operators
        let shift = matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr);
        let wide = if shift {
            stack_kind(left)
        } else {
            self.widened(left, right)?
        };
        let width = match wide {
            ValueKind::Int => IntWidth::Int,
            ValueKind::Long => IntWidth::Long,
            other => return Err(internal(&format!("bitwise operator on {other:?}"))),
        };

        let lk = self.emit_expr(left)?;
        self.convert(lk, wide);
        let rk = self.emit_expr(right)?;
        if shift {
            // shift distance is always int
            self.convert(rk, ValueKind::Int);
        } else {
            self.convert(rk, wide);
        }

        let instr = match op {
            BinaryOp::BitAnd => Op::BitAnd(width),
            BinaryOp::BitOr => Op::BitOr(width),
            BinaryOp::BitXor => Op::BitXor(width),
            BinaryOp::Shl => Op::Shl(width),
            BinaryOp::Shr => Op::Shr(width),
            BinaryOp::Ushr => Op::Ushr(width),
            _ => unreachable!("bitwise covered"),
        };
        self.code.emit(instr);
        Ok(wide)
    }

    /// `a && b`: evaluate a; false short-circuits without touching b.
    fn emit_short_circuit_and(
        &mut self,
        left: &Expr,
        right: &Expr,
    ) -> Result<ValueKind, CompilerError> {
        let false_label = self.code.new_label();
        let end = self.code.new_label();

        self.emit_expr(left)?;
        self.code.jump_if(Cmp::Eq, false_label);
        self.emit_expr(right)?;
        self.code.goto(end);
        self.code.bind(false_label);
        let zero = self.unit.const_int(0);
        self.code.emit(Op::Const(zero));
        self.code.bind(end);
        Ok(ValueKind::Int)
    }

    /// `a || b`: evaluate a; true short-circuits without touching b.
    fn emit_short_circuit_or(
        &mut self,
        left: &Expr,
        right: &Expr,
    ) -> Result<ValueKind, CompilerError> {
        let true_label = self.code.new_label();
        let end = self.code.new_label();

        self.emit_expr(left)?;
        self.code.jump_if(Cmp::Ne, true_label);
        self.emit_expr(right)?;
        self.code.goto(end);
        self.code.bind(true_label);
        let one = self.unit.const_int(1);
        self.code.emit(Op::Const(one));
        self.code.bind(end);
        Ok(ValueKind::Int)
    }

    fn emit_comparison(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<ValueKind, CompilerError> {
        let cmp = match op {
            BinaryOp::Eq => Cmp::Eq,
            BinaryOp::Ne => Cmp::Ne,
            BinaryOp::Lt => Cmp::Lt,
            BinaryOp::Le => Cmp::Le,
            BinaryOp::Gt => Cmp::Gt,
            BinaryOp::Ge => Cmp::Ge,
            other => return Err(internal(&format!("not a comparison: {other}"))),
        };

        // Null comparisons branch on the reference directly
        let left_null = matches!(left.kind, ExprKind::Null);
        let right_null = matches!(right.kind, ExprKind::Null);
        if left_null || right_null {
            let operand = if left_null { right } else { left };
            self.emit_expr(operand)?;
            return self.push_bool(|code, true_label| {
                if cmp == Cmp::Eq {
                    code.jump_null(true_label);
                } else {
                    code.jump_non_null(true_label);
                }
            });
        }

        let lk = stack_kind(left);
        let rk = stack_kind(right);

        if lk == ValueKind::Reference && rk == ValueKind::Reference {
            // reference equality
            self.emit_expr(left)?;
            self.emit_expr(right)?;
            return self.push_bool(|code, true_label| {
                if cmp == Cmp::Eq {
                    code.jump_acmp_eq(true_label);
                } else {
                    code.jump_acmp_ne(true_label);
                }
            });
        }

        let wide = self.widened(left, right)?;
        let lk = self.emit_expr(left)?;
        self.convert(lk, wide);
        let rk = self.emit_expr(right)?;
        self.convert(rk, wide);

        match wide {
            ValueKind::Int => self.push_bool(|code, true_label| code.jump_icmp(cmp, true_label)),
            ValueKind::Long => {
                self.code.emit(Op::Lcmp);
                self.push_bool(|code, true_label| code.jump_if(cmp, true_label))
            }
            ValueKind::Float | ValueKind::Double => {
                // NaN-safe variant: NaN must land on the "false" side of
                // every ordered comparison.
                let nan_positive = matches!(cmp, Cmp::Lt | Cmp::Le | Cmp::Eq | Cmp::Ne);
                let instr = match (wide, nan_positive) {
                    (ValueKind::Float, true) => Op::Fcmpg,
                    (ValueKind::Float, false) => Op::Fcmpl,
                    (ValueKind::Double, true) => Op::Dcmpg,
                    (ValueKind::Double, false) => Op::Dcmpl,
                    _ => unreachable!(),
                };
                self.code.emit(instr);
                self.push_bool(|code, true_label| code.jump_if(cmp, true_label))
            }
            ValueKind::Reference => Err(internal("comparison widening produced a reference")),
        }
    }

    /// Branch-to-boolean: jump to `true` on the condition, else fall
    /// through to 0.
    fn push_bool(
        &mut self,
        jump: impl FnOnce(&mut ruse_runtime::CodeBuilder, ruse_runtime::Label),
    ) -> Result<ValueKind, CompilerError> {
        let true_label = self.code.new_label();
        let end = self.code.new_label();
        jump(&mut self.code, true_label);
        let zero = self.unit.const_int(0);
        self.code.emit(Op::Const(zero));
        self.code.goto(end);
        self.code.bind(true_label);
        let one = self.unit.const_int(1);
        self.code.emit(Op::Const(one));
        self.code.bind(end);
        Ok(ValueKind::Int)
    }

    /// String concatenation through the runtime utility.
    fn emit_concat(&mut self, left: &Expr, right: &Expr) -> Result<ValueKind, CompilerError> {
        let lk = self.emit_expr(left)?;
        if lk.is_numeric() {
            self.box_natural(left.ty.as_ref(), lk);
        }
        let rk = self.emit_expr(right)?;
        if rk.is_numeric() {
            self.box_natural(right.ty.as_ref(), rk);
        }
        let mref = self.unit.method_ref(
            "ruse.Rt",
            "concat",
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/String;",
        );
        self.code.emit(Op::InvokeStatic(mref));
        Ok(ValueKind::Reference)
    }

    fn emit_cast(&mut self, target: &TypeName, inner: &Expr) -> Result<ValueKind, CompilerError> {
        match target {
            TypeName::Primitive(tag) => {
                let kind = self.emit_expr(inner)?;
                if kind == ValueKind::Reference {
                    // checkcast the wrapper, then extract the primitive
                    self.emit_unbox(*tag);
                } else {
                    self.convert(kind, tag.value_kind());
                    self.narrow_sub_int(*tag, kind);
                }
                Ok(tag.value_kind())
            }
            TypeName::Named { name, .. } => {
                let kind = self.emit_expr(inner)?;
                if kind.is_numeric() {
                    self.box_natural(inner.ty.as_ref(), kind);
                }
                if name != "java.lang.Object" {
                    let class_ref = self.unit.intern(name);
                    self.code.emit(Op::CheckCast(class_ref));
                }
                Ok(ValueKind::Reference)
            }
            TypeName::Var => Err(internal("cast to 'var' reached the emitter")),
        }
    }

    /// Truncation for sub-int cast targets: `(short)` is `<<16 >>16`,
    /// `(byte)` is `<<24 >>24`, `(char)` masks.
    fn narrow_sub_int(&mut self, tag: PrimitiveTag, source: ValueKind) {
        if source == ValueKind::Reference {
            return;
        }
        match tag {
            PrimitiveTag::Short | PrimitiveTag::Byte => {
                let bits = if tag == PrimitiveTag::Short { 16 } else { 24 };
                let shift = self.unit.const_int(bits);
                self.code.emit(Op::Const(shift));
                self.code.emit(Op::Shl(IntWidth::Int));
                let shift = self.unit.const_int(bits);
                self.code.emit(Op::Const(shift));
                self.code.emit(Op::Shr(IntWidth::Int));
            }
            PrimitiveTag::Char => {
                let mask = self.unit.const_int(0xFFFF);
                self.code.emit(Op::Const(mask));
                self.code.emit(Op::BitAnd(IntWidth::Int));
            }
            _ => {}
        }
    }

    // ─── Calls ───────────────────────────────────────────────────────────

    fn emit_call(
        &mut self,
        scope: Option<&Expr>,
        name: &str,
        args: &[Expr],
    ) -> Result<ValueKind, CompilerError> {
        let scope = scope.ok_or_else(|| internal("scope-less call reached the emitter"))?;

        // 1. Collection access pattern on a declared Map/List variable
        if name == "get" && args.len() == 1 {
            if let ExprKind::Name(var) = &scope.kind {
                match self.slots.ty(var).and_then(|t| t.class_name()) {
                    Some("java.util.Map") => {
                        self.emit_expr(scope)?;
                        let kind = self.emit_expr(&args[0])?;
                        if kind.is_numeric() {
                            self.box_natural(args[0].ty.as_ref(), kind);
                        }
                        let mref = self.unit.method_ref(
                            "java.util.Map",
                            "get",
                            "(Ljava/lang/Object;)Ljava/lang/Object;",
                        );
                        self.code.emit(Op::InvokeInterface(mref));
                        return Ok(ValueKind::Reference);
                    }
                    Some("java.util.List") => {
                        self.emit_expr(scope)?;
                        let kind = self.emit_expr(&args[0])?;
                        self.convert(kind, ValueKind::Int);
                        let mref = self.unit.method_ref(
                            "java.util.List",
                            "get",
                            "(I)Ljava/lang/Object;",
                        );
                        self.code.emit(Op::InvokeInterface(mref));
                        return Ok(ValueKind::Reference);
                    }
                    _ => {}
                }
            }
        }

        // 2. Static call on a well-known class constant
        let env = self.local_names();
        if let Some(class) = gate::static_class(scope, &env, self.types) {
            let info = self.resolve_method(&class, name, args.len())?;
            self.emit_args(args, &info)?;
            let descriptor = info.descriptor(args.len());
            let mref = self.unit.method_ref(&class, name, &descriptor);
            self.code.emit(Op::InvokeStatic(mref));
            return Ok(info.ret.value_kind());
        }

        // 3./4. Instance call (chained calls recurse through the scope)
        let scope_kind = self.emit_expr(scope)?;
        if scope_kind != ValueKind::Reference {
            return Err(internal("instance call on a primitive receiver"));
        }
        let class = scope
            .ty
            .as_ref()
            .and_then(|t| t.class_name())
            .ok_or_else(|| internal("untyped receiver reached the emitter"))?
            .to_string();
        let info = self.resolve_method(&class, name, args.len())?;
        self.emit_args(args, &info)?;
        let descriptor = info.descriptor(args.len());
        let mref = self.unit.method_ref(&class, name, &descriptor);
        let is_interface = self
            .types
            .class(&class)
            .map(|c| c.is_interface)
            .unwrap_or(false);
        self.code.emit(if is_interface {
            Op::InvokeInterface(mref)
        } else {
            Op::InvokeVirtual(mref)
        });
        Ok(info.ret.value_kind())
    }

    fn emit_new(&mut self, class: &TypeName, args: &[Expr]) -> Result<ValueKind, CompilerError> {
        let TypeName::Named { name, .. } = class else {
            return Err(internal("unresolved constructor class"));
        };
        let info = self.resolve_method(name, "<init>", args.len())?;
        self.emit_args(args, &info)?;
        let descriptor = info.descriptor(args.len());
        let mref = self.unit.method_ref(name, "<init>", &descriptor);
        self.code.emit(Op::InvokeCtor(mref));
        Ok(ValueKind::Reference)
    }

    /// Reflection miss on a committed call site is a hard error, surfaced
    /// before any bytes leave the emitter.
    fn resolve_method(
        &self,
        class: &str,
        name: &str,
        arity: usize,
    ) -> Result<Arc<MethodInfo>, CompilerError> {
        self.types.find_method(class, name, arity).ok_or_else(|| {
            CompilerError::transpile(
                &self.req.source,
                TranspileError::MethodResolution {
                    class: class.to_string(),
                    method: name.to_string(),
                    arity,
                },
            )
        })
    }

    /// Emit arguments, adapting each to the parameter it feeds.
    fn emit_args(&mut self, args: &[Expr], info: &MethodInfo) -> Result<(), CompilerError> {
        for (i, arg) in args.iter().enumerate() {
            let kind = self.emit_expr(arg)?;
            let param = if info.is_varargs {
                TypeDescriptor::object()
            } else {
                info.params
                    .get(i)
                    .cloned()
                    .unwrap_or_else(TypeDescriptor::object)
            };
            self.adapt_arg(arg, kind, &param);
        }
        Ok(())
    }

    /// Boxing, unboxing, widening and narrowing at an argument site.
    fn adapt_arg(&mut self, arg: &Expr, kind: ValueKind, param: &TypeDescriptor) {
        match param {
            TypeDescriptor::Primitive(tag) => {
                if kind == ValueKind::Reference {
                    self.emit_unbox(*tag);
                } else {
                    self.convert(kind, tag.value_kind());
                }
            }
            _ => {
                if kind.is_numeric() {
                    self.box_natural(arg.ty.as_ref(), kind);
                }
            }
        }
    }

    // ─── Assignment ──────────────────────────────────────────────────────

    /// Emit an assignment; pushes the assigned value back only when the
    /// assignment is used as an expression.
    pub(super) fn emit_assign(
        &mut self,
        expr: &Expr,
        want_value: bool,
    ) -> Result<ValueKind, CompilerError> {
        let ExprKind::Assign { op, target, value } = &expr.kind else {
            return Err(internal("emit_assign on a non-assignment"));
        };
        let ExprKind::Name(name) = &target.kind else {
            return Err(internal("assignment target is not a variable"));
        };
        let name = name.clone();

        let slot_ty = self
            .slots
            .ty(&name)
            .cloned()
            .ok_or_else(|| internal(&format!("assignment to unknown variable '{name}'")))?;
        let slot_kind = slot_ty.value_kind();

        // i += const on an int slot folds to a single increment
        if !want_value && slot_kind == ValueKind::Int && slot_ty.is_primitive() {
            if let (AssignOp::Add | AssignOp::Sub, ExprKind::Int(v)) = (op, &value.kind) {
                let delta = if *op == AssignOp::Add { *v } else { -*v };
                if let (Ok(delta), Some(slot)) = (i16::try_from(delta), self.slots.slot(&name)) {
                    self.code.emit(Op::Iinc(slot, delta));
                    return Ok(ValueKind::Int);
                }
            }
        }

        match op.binary_op() {
            None => {
                // simple assignment
                let kind = self.emit_expr(value)?;
                self.adapt_to_slot(value, kind, &slot_ty);
            }
            Some(bop) => {
                let is_string = slot_ty.class_name() == Some("java.lang.String");
                if is_string && bop == BinaryOp::Add {
                    self.slots
                        .load(&mut self.code, &name)
                        .ok_or_else(|| internal("missing slot"))?;
                    let kind = self.emit_expr(value)?;
                    if kind.is_numeric() {
                        self.box_natural(value.ty.as_ref(), kind);
                    }
                    let mref = self.unit.method_ref(
                        "ruse.Rt",
                        "concat",
                        "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/String;",
                    );
                    self.code.emit(Op::InvokeStatic(mref));
                } else {
                    // compound: widen, operate, narrow back to the slot
                    let shift = matches!(bop, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr);
                    let wide = if shift {
                        // the shifted operand keeps the slot's own kind
                        slot_kind
                    } else {
                        ValueKind::widen(slot_kind, stack_kind(value))
                            .ok_or_else(|| internal("compound assignment on references"))?
                    };
                    self.slots
                        .load(&mut self.code, &name)
                        .ok_or_else(|| internal("missing slot"))?;
                    self.convert(slot_kind, wide);
                    let actual = self.emit_expr(value)?;
                    if shift {
                        self.convert(actual, ValueKind::Int);
                    } else {
                        self.convert(actual, wide);
                    }
                    self.emit_compound_op(bop, wide)?;
                    self.convert(wide, slot_kind);
                }
            }
        }

        self.slots
            .store(&mut self.code, &name)
            .ok_or_else(|| internal("missing slot"))?;
        if want_value {
            self.slots
                .load(&mut self.code, &name)
                .ok_or_else(|| internal("missing slot"))?;
        }
        Ok(slot_kind)
    }

    fn emit_compound_op(&mut self, op: BinaryOp, kind: ValueKind) -> Result<(), CompilerError> {
        if op.is_arithmetic() {
            let num = NumKind::from_value_kind(kind)
                .ok_or_else(|| internal("compound arithmetic on a reference"))?;
            let instr = match op {
                BinaryOp::Add => Op::Add(num),
                BinaryOp::Sub => Op::Sub(num),
                BinaryOp::Mul => Op::Mul(num),
                BinaryOp::Div => Op::Div(num),
                BinaryOp::Rem => Op::Rem(num),
                _ => unreachable!(),
            };
            self.code.emit(instr);
            return Ok(());
        }
        let width = match kind {
            ValueKind::Int => IntWidth::Int,
            ValueKind::Long => IntWidth::Long,
            other => return Err(internal(&format!("compound bitwise on {other:?}"))),
        };
        let instr = match op {
            BinaryOp::BitAnd => Op::BitAnd(width),
            BinaryOp::BitOr => Op::BitOr(width),
            BinaryOp::BitXor => Op::BitXor(width),
            BinaryOp::Shl => Op::Shl(width),
            BinaryOp::Shr => Op::Shr(width),
            BinaryOp::Ushr => Op::Ushr(width),
            other => return Err(internal(&format!("unexpected compound operator {other}"))),
        };
        self.code.emit(instr);
        Ok(())
    }

    /// Coerce an initializer/assigned value to its slot's type.
    fn adapt_to_slot(&mut self, value: &Expr, kind: ValueKind, slot_ty: &TypeDescriptor) {
        match slot_ty {
            TypeDescriptor::Primitive(tag) => {
                if kind == ValueKind::Reference {
                    self.emit_unbox(*tag);
                } else {
                    self.convert(kind, tag.value_kind());
                }
            }
            _ => {
                if kind.is_numeric() {
                    self.box_natural(value.ty.as_ref(), kind);
                }
            }
        }
    }

    /// Locals currently known to the slot table (for the static-scope
    /// check).
    fn local_names(&self) -> std::collections::BTreeSet<String> {
        self.slots.names().map(str::to_string).collect()
    }
}
