//! Code unit instruction set and builders.
//!
//! A code unit is the compiler's output artifact: a self-contained byte
//! sequence holding constant pools and one or more methods of stack-machine
//! instructions. The typed subset mirrors the target machine's shape (kind-
//! suffixed arithmetic, compare-to-int plus branch, checked casts, pooled
//! method references); the `Dyn*` subset operates on boxed values and is
//! only ever produced by the fallback compiler.
//!
//! Branch targets are absolute instruction indices. The [`CodeBuilder`]
//! hands out labels and patches targets when a method is finished, so
//! emission code never computes offsets by hand.

use crate::error::CompileError;
use ruse_ast::ValueKind;
use rustc_hash::FxHashMap;

/// Numeric kind for typed arithmetic ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumKind {
    pub fn from_value_kind(kind: ValueKind) -> Option<NumKind> {
        Some(match kind {
            ValueKind::Int => NumKind::Int,
            ValueKind::Long => NumKind::Long,
            ValueKind::Float => NumKind::Float,
            ValueKind::Double => NumKind::Double,
            ValueKind::Reference => return None,
        })
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            NumKind::Int => ValueKind::Int,
            NumKind::Long => ValueKind::Long,
            NumKind::Float => ValueKind::Float,
            NumKind::Double => ValueKind::Double,
        }
    }

    pub fn prefix(self) -> char {
        self.value_kind().prefix()
    }
}

/// Width for bitwise and shift ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    Int,
    Long,
}

impl IntWidth {
    pub fn prefix(self) -> char {
        match self {
            IntWidth::Int => 'I',
            IntWidth::Long => 'L',
        }
    }
}

/// Branch condition against int(s) on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cmp {
    pub fn negate(self) -> Cmp {
        match self {
            Cmp::Eq => Cmp::Ne,
            Cmp::Ne => Cmp::Eq,
            Cmp::Lt => Cmp::Ge,
            Cmp::Ge => Cmp::Lt,
            Cmp::Gt => Cmp::Le,
            Cmp::Le => Cmp::Gt,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Cmp::Eq => "EQ",
            Cmp::Ne => "NE",
            Cmp::Lt => "LT",
            Cmp::Ge => "GE",
            Cmp::Gt => "GT",
            Cmp::Le => "LE",
        }
    }

    /// Apply to a compare-to-int result (-1/0/1) or a plain int.
    pub fn holds(self, v: i32) -> bool {
        match self {
            Cmp::Eq => v == 0,
            Cmp::Ne => v != 0,
            Cmp::Lt => v < 0,
            Cmp::Ge => v >= 0,
            Cmp::Gt => v > 0,
            Cmp::Le => v <= 0,
        }
    }
}

/// Constant pool entry. Floats are stored as raw bits so interning and
/// equality are total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolConst {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    /// Index into the string pool.
    Str(u16),
    Null,
}

/// Pooled method reference: `owner.name(descriptor)`.
///
/// The descriptor `"*"` marks a dynamic-arity reference used by the
/// fallback path; such refs are resolved by argument count at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: u16,
    pub name: u16,
    pub descriptor: u16,
}

/// One instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // === Constants, locals ===
    Const(u16),
    Load(ValueKind, u16),
    Store(ValueKind, u16),
    Iinc(u16, i16),

    // === Typed arithmetic ===
    Add(NumKind),
    Sub(NumKind),
    Mul(NumKind),
    Div(NumKind),
    Rem(NumKind),
    Neg(NumKind),

    // === Bitwise & shifts ===
    BitAnd(IntWidth),
    BitOr(IntWidth),
    BitXor(IntWidth),
    Shl(IntWidth),
    Shr(IntWidth),
    Ushr(IntWidth),

    // === Numeric conversion (I2L, D2I, …) ===
    Conv(NumKind, NumKind),

    // === Wide compares pushing -1/0/1 ===
    Lcmp,
    /// Float compare, NaN biased toward -1 (for `>`/`>=`).
    Fcmpl,
    /// Float compare, NaN biased toward +1 (for `<`/`<=`/`==`).
    Fcmpg,
    Dcmpl,
    Dcmpg,

    // === Branches (absolute instruction index) ===
    If(Cmp, u32),
    IfICmp(Cmp, u32),
    IfAcmpEq(u32),
    IfAcmpNe(u32),
    IfNull(u32),
    IfNonNull(u32),
    Goto(u32),

    // === Objects & calls ===
    /// Checked cast to the class named by the string-pool index.
    CheckCast(u16),
    InvokeStatic(u16),
    InvokeVirtual(u16),
    InvokeInterface(u16),
    /// Allocate + construct; the ref names `<init>` on the owner.
    InvokeCtor(u16),

    // === Stack ===
    Pop,

    // === Returns ===
    Return(ValueKind),
    ReturnVoid,

    // === Dynamic (boxed) subset — fallback compiler only ===
    DynAdd,
    DynSub,
    DynMul,
    DynDiv,
    DynRem,
    DynNeg,
    DynNot,
    DynBitNot,
    DynBitAnd,
    DynBitOr,
    DynBitXor,
    DynShl,
    DynShr,
    DynUshr,
    DynCmp(Cmp),
    /// Property/key read; operand is a string-pool index.
    DynGetField(u16),
    DynSetField(u16),
    DynIndex,
    DynIndexSet,
    /// Virtual dispatch by receiver runtime type: (name, argc).
    DynInvoke(u16, u8),
    /// Static dispatch by owner class: (method-ref with `"*"` descriptor, argc).
    DynInvokeStatic(u16, u8),
    /// (class string index, argc).
    DynNew(u16, u8),
    /// Cast/convert to the named type (primitive names included).
    DynCast(u16),
}

/// A method definition inside a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// String-pool index of the method name.
    pub name: u16,
    /// String-pool index of the descriptor.
    pub descriptor: u16,
    /// Local slot count (slot 0 receiver, slot 1 context parameter).
    pub max_slots: u16,
    pub code: Vec<Op>,
}

/// Decoded in-memory form of a code unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeUnit {
    /// String-pool index of the fully qualified unit name.
    pub fqcn: u16,
    pub strings: Vec<String>,
    pub consts: Vec<PoolConst>,
    pub method_refs: Vec<MethodRef>,
    pub methods: Vec<MethodDef>,
}

impl CodeUnit {
    pub fn string(&self, idx: u16) -> &str {
        self.strings
            .get(idx as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.string(self.fqcn)
    }

    pub fn method_named(&self, name: &str) -> Option<(usize, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| self.string(m.name) == name)
    }

    /// Render a method ref as `owner.name(descriptor)` pieces.
    pub fn ref_parts(&self, idx: u16) -> (&str, &str, &str) {
        match self.method_refs.get(idx as usize) {
            Some(r) => (
                self.string(r.owner),
                self.string(r.name),
                self.string(r.descriptor),
            ),
            None => ("", "", ""),
        }
    }
}

/// Number of parameters in a method descriptor `(…)R`.
pub fn descriptor_param_count(descriptor: &str) -> usize {
    let Some(inner) = descriptor
        .strip_prefix('(')
        .and_then(|d| d.split_once(')'))
        .map(|(params, _)| params)
    else {
        return 0;
    };
    let bytes = inner.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'L' => {
                while i < bytes.len() && bytes[i] != b';' {
                    i += 1;
                }
                i += 1;
            }
            b'[' => {
                i += 1;
                continue;
            }
            _ => i += 1,
        }
        count += 1;
    }
    count
}

/// Return descriptor of a method descriptor, `""` when malformed.
pub fn descriptor_return(descriptor: &str) -> &str {
    descriptor
        .split_once(')')
        .map(|(_, ret)| ret)
        .unwrap_or("")
}

// ─── Builders ────────────────────────────────────────────────────────────

/// Label handle for branch wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

/// Imperative instruction builder for one method.
///
/// Branches take [`Label`]s; targets are patched in [`CodeBuilder::finish`],
/// which fails if any used label was never bound.
pub struct CodeBuilder {
    ops: Vec<Op>,
    labels: Vec<Option<u32>>,
    patches: Vec<(usize, u32)>,
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            ops: Vec::with_capacity(32),
            labels: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Emit a non-branch instruction.
    pub fn emit(&mut self, op: Op) {
        debug_assert!(
            !matches!(
                op,
                Op::If(..)
                    | Op::IfICmp(..)
                    | Op::IfAcmpEq(_)
                    | Op::IfAcmpNe(_)
                    | Op::IfNull(_)
                    | Op::IfNonNull(_)
                    | Op::Goto(_)
            ),
            "branches must go through the label API"
        );
        self.ops.push(op);
    }

    pub fn new_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Bind a label to the next emitted instruction.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.ops.len() as u32);
    }

    fn push_branch(&mut self, op: Op, label: Label) {
        self.patches.push((self.ops.len(), label.0));
        self.ops.push(op);
    }

    pub fn jump_if(&mut self, cmp: Cmp, label: Label) {
        self.push_branch(Op::If(cmp, u32::MAX), label);
    }

    pub fn jump_icmp(&mut self, cmp: Cmp, label: Label) {
        self.push_branch(Op::IfICmp(cmp, u32::MAX), label);
    }

    pub fn jump_acmp_eq(&mut self, label: Label) {
        self.push_branch(Op::IfAcmpEq(u32::MAX), label);
    }

    pub fn jump_acmp_ne(&mut self, label: Label) {
        self.push_branch(Op::IfAcmpNe(u32::MAX), label);
    }

    pub fn jump_null(&mut self, label: Label) {
        self.push_branch(Op::IfNull(u32::MAX), label);
    }

    pub fn jump_non_null(&mut self, label: Label) {
        self.push_branch(Op::IfNonNull(u32::MAX), label);
    }

    pub fn goto(&mut self, label: Label) {
        self.push_branch(Op::Goto(u32::MAX), label);
    }

    /// Current instruction count (for tests and diagnostics).
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Resolve all labels and hand back the instruction stream.
    pub fn finish(mut self) -> Result<Vec<Op>, CompileError> {
        for (op_idx, label_id) in &self.patches {
            let target = self.labels[*label_id as usize].ok_or_else(|| {
                CompileError::new(format!("unbound label {label_id} in emitted method"))
            })?;
            match &mut self.ops[*op_idx] {
                Op::If(_, t)
                | Op::IfICmp(_, t)
                | Op::IfAcmpEq(t)
                | Op::IfAcmpNe(t)
                | Op::IfNull(t)
                | Op::IfNonNull(t)
                | Op::Goto(t) => *t = target,
                other => {
                    return Err(CompileError::new(format!(
                        "patch target is not a branch: {other:?}"
                    )))
                }
            }
        }
        Ok(self.ops)
    }
}

/// Builder for a whole code unit: interns pool entries and serializes.
pub struct UnitBuilder {
    fqcn: u16,
    strings: Vec<String>,
    string_index: FxHashMap<String, u16>,
    consts: Vec<PoolConst>,
    const_index: FxHashMap<PoolConst, u16>,
    method_refs: Vec<MethodRef>,
    ref_index: FxHashMap<MethodRef, u16>,
    methods: Vec<MethodDef>,
}

impl UnitBuilder {
    pub fn new(fqcn: &str) -> Self {
        let mut builder = Self {
            fqcn: 0,
            strings: Vec::new(),
            string_index: FxHashMap::default(),
            consts: Vec::new(),
            const_index: FxHashMap::default(),
            method_refs: Vec::new(),
            ref_index: FxHashMap::default(),
            methods: Vec::new(),
        };
        builder.fqcn = builder.intern(fqcn);
        builder
    }

    pub fn intern(&mut self, s: &str) -> u16 {
        if let Some(idx) = self.string_index.get(s) {
            return *idx;
        }
        let idx = self.strings.len() as u16;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
        idx
    }

    fn intern_const(&mut self, c: PoolConst) -> u16 {
        if let Some(idx) = self.const_index.get(&c) {
            return *idx;
        }
        let idx = self.consts.len() as u16;
        self.consts.push(c);
        self.const_index.insert(c, idx);
        idx
    }

    pub fn const_int(&mut self, v: i32) -> u16 {
        self.intern_const(PoolConst::Int(v))
    }

    pub fn const_long(&mut self, v: i64) -> u16 {
        self.intern_const(PoolConst::Long(v))
    }

    pub fn const_float(&mut self, v: f32) -> u16 {
        self.intern_const(PoolConst::Float(v.to_bits()))
    }

    pub fn const_double(&mut self, v: f64) -> u16 {
        self.intern_const(PoolConst::Double(v.to_bits()))
    }

    pub fn const_str(&mut self, s: &str) -> u16 {
        let idx = self.intern(s);
        self.intern_const(PoolConst::Str(idx))
    }

    pub fn const_null(&mut self) -> u16 {
        self.intern_const(PoolConst::Null)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let mref = MethodRef {
            owner: self.intern(owner),
            name: self.intern(name),
            descriptor: self.intern(descriptor),
        };
        if let Some(idx) = self.ref_index.get(&mref) {
            return *idx;
        }
        let idx = self.method_refs.len() as u16;
        self.method_refs.push(mref);
        self.ref_index.insert(mref, idx);
        idx
    }

    pub fn add_method(&mut self, name: &str, descriptor: &str, max_slots: u16, code: Vec<Op>) {
        let name = self.intern(name);
        let descriptor = self.intern(descriptor);
        self.methods.push(MethodDef {
            name,
            descriptor,
            max_slots,
            code,
        });
    }

    /// Finish the unit in decoded form (used by tests and the registry).
    pub fn into_unit(self) -> CodeUnit {
        CodeUnit {
            fqcn: self.fqcn,
            strings: self.strings,
            consts: self.consts,
            method_refs: self.method_refs,
            methods: self.methods,
        }
    }

    /// Serialize to the unit byte format.
    pub fn build(self) -> Vec<u8> {
        encode_unit(&self.into_unit())
    }
}

// ─── Byte format ─────────────────────────────────────────────────────────

pub const UNIT_MAGIC: &[u8; 4] = b"RUSE";
pub const UNIT_VERSION: u16 = 2;

struct Writer(Vec<u8>);

impl Writer {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn i16(&mut self, v: i16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
}

/// Serialize a decoded unit to bytes.
pub fn encode_unit(unit: &CodeUnit) -> Vec<u8> {
    let mut w = Writer(Vec::with_capacity(256));
    w.0.extend_from_slice(UNIT_MAGIC);
    w.u16(UNIT_VERSION);
    w.u16(unit.fqcn);

    w.u16(unit.strings.len() as u16);
    for s in &unit.strings {
        let bytes = s.as_bytes();
        w.u16(bytes.len() as u16);
        w.0.extend_from_slice(bytes);
    }

    w.u16(unit.consts.len() as u16);
    for c in &unit.consts {
        match c {
            PoolConst::Int(v) => {
                w.u8(0);
                w.i32(*v);
            }
            PoolConst::Long(v) => {
                w.u8(1);
                w.i64(*v);
            }
            PoolConst::Float(bits) => {
                w.u8(2);
                w.u32(*bits);
            }
            PoolConst::Double(bits) => {
                w.u8(3);
                w.u64(*bits);
            }
            PoolConst::Str(idx) => {
                w.u8(4);
                w.u16(*idx);
            }
            PoolConst::Null => w.u8(5),
        }
    }

    w.u16(unit.method_refs.len() as u16);
    for r in &unit.method_refs {
        w.u16(r.owner);
        w.u16(r.name);
        w.u16(r.descriptor);
    }

    w.u16(unit.methods.len() as u16);
    for m in &unit.methods {
        w.u16(m.name);
        w.u16(m.descriptor);
        w.u16(m.max_slots);
        w.u32(m.code.len() as u32);
        for op in &m.code {
            encode_op(&mut w, op);
        }
    }

    w.0
}

fn kind_code(kind: ValueKind) -> u8 {
    match kind {
        ValueKind::Int => 0,
        ValueKind::Long => 1,
        ValueKind::Float => 2,
        ValueKind::Double => 3,
        ValueKind::Reference => 4,
    }
}

fn num_code(kind: NumKind) -> u8 {
    match kind {
        NumKind::Int => 0,
        NumKind::Long => 1,
        NumKind::Float => 2,
        NumKind::Double => 3,
    }
}

fn width_code(width: IntWidth) -> u8 {
    match width {
        IntWidth::Int => 0,
        IntWidth::Long => 1,
    }
}

fn cmp_code(cmp: Cmp) -> u8 {
    match cmp {
        Cmp::Eq => 0,
        Cmp::Ne => 1,
        Cmp::Lt => 2,
        Cmp::Ge => 3,
        Cmp::Gt => 4,
        Cmp::Le => 5,
    }
}

fn encode_op(w: &mut Writer, op: &Op) {
    match *op {
        Op::Const(idx) => {
            w.u8(0x01);
            w.u16(idx);
        }
        Op::Load(kind, slot) => {
            w.u8(0x02);
            w.u8(kind_code(kind));
            w.u16(slot);
        }
        Op::Store(kind, slot) => {
            w.u8(0x03);
            w.u8(kind_code(kind));
            w.u16(slot);
        }
        Op::Iinc(slot, delta) => {
            w.u8(0x04);
            w.u16(slot);
            w.i16(delta);
        }
        Op::Add(k) => {
            w.u8(0x10);
            w.u8(num_code(k));
        }
        Op::Sub(k) => {
            w.u8(0x11);
            w.u8(num_code(k));
        }
        Op::Mul(k) => {
            w.u8(0x12);
            w.u8(num_code(k));
        }
        Op::Div(k) => {
            w.u8(0x13);
            w.u8(num_code(k));
        }
        Op::Rem(k) => {
            w.u8(0x14);
            w.u8(num_code(k));
        }
        Op::Neg(k) => {
            w.u8(0x15);
            w.u8(num_code(k));
        }
        Op::BitAnd(width) => {
            w.u8(0x18);
            w.u8(width_code(width));
        }
        Op::BitOr(width) => {
            w.u8(0x19);
            w.u8(width_code(width));
        }
        Op::BitXor(width) => {
            w.u8(0x1A);
            w.u8(width_code(width));
        }
        Op::Shl(width) => {
            w.u8(0x1B);
            w.u8(width_code(width));
        }
        Op::Shr(width) => {
            w.u8(0x1C);
            w.u8(width_code(width));
        }
        Op::Ushr(width) => {
            w.u8(0x1D);
            w.u8(width_code(width));
        }
        Op::Conv(from, to) => {
            w.u8(0x20);
            w.u8(num_code(from));
            w.u8(num_code(to));
        }
        Op::Lcmp => w.u8(0x28),
        Op::Fcmpl => w.u8(0x29),
        Op::Fcmpg => w.u8(0x2A),
        Op::Dcmpl => w.u8(0x2B),
        Op::Dcmpg => w.u8(0x2C),
        Op::If(cmp, target) => {
            w.u8(0x30);
            w.u8(cmp_code(cmp));
            w.u32(target);
        }
        Op::IfICmp(cmp, target) => {
            w.u8(0x31);
            w.u8(cmp_code(cmp));
            w.u32(target);
        }
        Op::IfAcmpEq(target) => {
            w.u8(0x32);
            w.u32(target);
        }
        Op::IfAcmpNe(target) => {
            w.u8(0x33);
            w.u32(target);
        }
        Op::IfNull(target) => {
            w.u8(0x34);
            w.u32(target);
        }
        Op::IfNonNull(target) => {
            w.u8(0x35);
            w.u32(target);
        }
        Op::Goto(target) => {
            w.u8(0x36);
            w.u32(target);
        }
        Op::CheckCast(idx) => {
            w.u8(0x40);
            w.u16(idx);
        }
        Op::InvokeStatic(idx) => {
            w.u8(0x41);
            w.u16(idx);
        }
        Op::InvokeVirtual(idx) => {
            w.u8(0x42);
            w.u16(idx);
        }
        Op::InvokeInterface(idx) => {
            w.u8(0x43);
            w.u16(idx);
        }
        Op::InvokeCtor(idx) => {
            w.u8(0x44);
            w.u16(idx);
        }
        Op::Pop => w.u8(0x48),
        Op::Return(kind) => {
            w.u8(0x50);
            w.u8(kind_code(kind));
        }
        Op::ReturnVoid => w.u8(0x51),
        Op::DynAdd => w.u8(0x60),
        Op::DynSub => w.u8(0x61),
        Op::DynMul => w.u8(0x62),
        Op::DynDiv => w.u8(0x63),
        Op::DynRem => w.u8(0x64),
        Op::DynNeg => w.u8(0x65),
        Op::DynNot => w.u8(0x66),
        Op::DynBitNot => w.u8(0x67),
        Op::DynBitAnd => w.u8(0x68),
        Op::DynBitOr => w.u8(0x69),
        Op::DynBitXor => w.u8(0x6A),
        Op::DynShl => w.u8(0x6B),
        Op::DynShr => w.u8(0x6C),
        Op::DynUshr => w.u8(0x6D),
        Op::DynCmp(cmp) => {
            w.u8(0x70);
            w.u8(cmp_code(cmp));
        }
        Op::DynGetField(idx) => {
            w.u8(0x72);
            w.u16(idx);
        }
        Op::DynSetField(idx) => {
            w.u8(0x73);
            w.u16(idx);
        }
        Op::DynIndex => w.u8(0x74),
        Op::DynIndexSet => w.u8(0x75),
        Op::DynInvoke(idx, argc) => {
            w.u8(0x76);
            w.u16(idx);
            w.u8(argc);
        }
        Op::DynInvokeStatic(idx, argc) => {
            w.u8(0x77);
            w.u16(idx);
            w.u8(argc);
        }
        Op::DynNew(idx, argc) => {
            w.u8(0x78);
            w.u16(idx);
            w.u8(argc);
        }
        Op::DynCast(idx) => {
            w.u8(0x79);
            w.u16(idx);
        }
    }
}

struct Reader<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    fn u8(&mut self) -> Result<u8, CompileError> {
        let v = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| CompileError::new("truncated code unit"))?;
        self.pos += 1;
        Ok(v)
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8], CompileError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| CompileError::new("truncated code unit"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, CompileError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("len 2")))
    }

    fn i16(&mut self) -> Result<i16, CompileError> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().expect("len 2")))
    }

    fn u32(&mut self) -> Result<u32, CompileError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("len 4")))
    }

    fn i32(&mut self) -> Result<i32, CompileError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().expect("len 4")))
    }

    fn u64(&mut self) -> Result<u64, CompileError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("len 8")))
    }

    fn i64(&mut self) -> Result<i64, CompileError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().expect("len 8")))
    }
}

fn decode_kind(code: u8) -> Result<ValueKind, CompileError> {
    Ok(match code {
        0 => ValueKind::Int,
        1 => ValueKind::Long,
        2 => ValueKind::Float,
        3 => ValueKind::Double,
        4 => ValueKind::Reference,
        other => return Err(CompileError::new(format!("bad value kind {other}"))),
    })
}

fn decode_num(code: u8) -> Result<NumKind, CompileError> {
    Ok(match code {
        0 => NumKind::Int,
        1 => NumKind::Long,
        2 => NumKind::Float,
        3 => NumKind::Double,
        other => return Err(CompileError::new(format!("bad numeric kind {other}"))),
    })
}

fn decode_width(code: u8) -> Result<IntWidth, CompileError> {
    Ok(match code {
        0 => IntWidth::Int,
        1 => IntWidth::Long,
        other => return Err(CompileError::new(format!("bad int width {other}"))),
    })
}

fn decode_cmp(code: u8) -> Result<Cmp, CompileError> {
    Ok(match code {
        0 => Cmp::Eq,
        1 => Cmp::Ne,
        2 => Cmp::Lt,
        3 => Cmp::Ge,
        4 => Cmp::Gt,
        5 => Cmp::Le,
        other => return Err(CompileError::new(format!("bad compare code {other}"))),
    })
}

fn decode_op(r: &mut Reader) -> Result<Op, CompileError> {
    let opcode = r.u8()?;
    Ok(match opcode {
        0x01 => Op::Const(r.u16()?),
        0x02 => Op::Load(decode_kind(r.u8()?)?, r.u16()?),
        0x03 => Op::Store(decode_kind(r.u8()?)?, r.u16()?),
        0x04 => Op::Iinc(r.u16()?, r.i16()?),
        0x10 => Op::Add(decode_num(r.u8()?)?),
        0x11 => Op::Sub(decode_num(r.u8()?)?),
        0x12 => Op::Mul(decode_num(r.u8()?)?),
        0x13 => Op::Div(decode_num(r.u8()?)?),
        0x14 => Op::Rem(decode_num(r.u8()?)?),
        0x15 => Op::Neg(decode_num(r.u8()?)?),
        0x18 => Op::BitAnd(decode_width(r.u8()?)?),
        0x19 => Op::BitOr(decode_width(r.u8()?)?),
        0x1A => Op::BitXor(decode_width(r.u8()?)?),
        0x1B => Op::Shl(decode_width(r.u8()?)?),
        0x1C => Op::Shr(decode_width(r.u8()?)?),
        0x1D => Op::Ushr(decode_width(r.u8()?)?),
        0x20 => Op::Conv(decode_num(r.u8()?)?, decode_num(r.u8()?)?),
        0x28 => Op::Lcmp,
        0x29 => Op::Fcmpl,
        0x2A => Op::Fcmpg,
        0x2B => Op::Dcmpl,
        0x2C => Op::Dcmpg,
        0x30 => Op::If(decode_cmp(r.u8()?)?, r.u32()?),
        0x31 => Op::IfICmp(decode_cmp(r.u8()?)?, r.u32()?),
        0x32 => Op::IfAcmpEq(r.u32()?),
        0x33 => Op::IfAcmpNe(r.u32()?),
        0x34 => Op::IfNull(r.u32()?),
        0x35 => Op::IfNonNull(r.u32()?),
        0x36 => Op::Goto(r.u32()?),
        0x40 => Op::CheckCast(r.u16()?),
        0x41 => Op::InvokeStatic(r.u16()?),
        0x42 => Op::InvokeVirtual(r.u16()?),
        0x43 => Op::InvokeInterface(r.u16()?),
        0x44 => Op::InvokeCtor(r.u16()?),
        0x48 => Op::Pop,
        0x50 => Op::Return(decode_kind(r.u8()?)?),
        0x51 => Op::ReturnVoid,
        0x60 => Op::DynAdd,
        0x61 => Op::DynSub,
        0x62 => Op::DynMul,
        0x63 => Op::DynDiv,
        0x64 => Op::DynRem,
        0x65 => Op::DynNeg,
        0x66 => Op::DynNot,
        0x67 => Op::DynBitNot,
        0x68 => Op::DynBitAnd,
        0x69 => Op::DynBitOr,
        0x6A => Op::DynBitXor,
        0x6B => Op::DynShl,
        0x6C => Op::DynShr,
        0x6D => Op::DynUshr,
        0x70 => Op::DynCmp(decode_cmp(r.u8()?)?),
        0x72 => Op::DynGetField(r.u16()?),
        0x73 => Op::DynSetField(r.u16()?),
        0x74 => Op::DynIndex,
        0x75 => Op::DynIndexSet,
        0x76 => Op::DynInvoke(r.u16()?, r.u8()?),
        0x77 => Op::DynInvokeStatic(r.u16()?, r.u8()?),
        0x78 => Op::DynNew(r.u16()?, r.u8()?),
        0x79 => Op::DynCast(r.u16()?),
        other => return Err(CompileError::new(format!("unknown opcode 0x{other:02X}"))),
    })
}

/// Parse unit bytes back into decoded form.
pub fn decode_unit(bytes: &[u8]) -> Result<CodeUnit, CompileError> {
    let mut r = Reader { bytes, pos: 0 };

    if r.take(4)? != UNIT_MAGIC {
        return Err(CompileError::new("not a code unit (bad magic)"));
    }
    let version = r.u16()?;
    if version != UNIT_VERSION {
        return Err(CompileError::new(format!(
            "unsupported unit version {version} (expected {UNIT_VERSION})"
        )));
    }
    let fqcn = r.u16()?;

    let string_count = r.u16()?;
    let mut strings = Vec::with_capacity(string_count as usize);
    for _ in 0..string_count {
        let len = r.u16()? as usize;
        let raw = r.take(len)?;
        let s = std::str::from_utf8(raw)
            .map_err(|_| CompileError::new("invalid utf8 in string pool"))?;
        strings.push(s.to_string());
    }

    let const_count = r.u16()?;
    let mut consts = Vec::with_capacity(const_count as usize);
    for _ in 0..const_count {
        consts.push(match r.u8()? {
            0 => PoolConst::Int(r.i32()?),
            1 => PoolConst::Long(r.i64()?),
            2 => PoolConst::Float(r.u32()?),
            3 => PoolConst::Double(r.u64()?),
            4 => PoolConst::Str(r.u16()?),
            5 => PoolConst::Null,
            other => return Err(CompileError::new(format!("bad constant tag {other}"))),
        });
    }

    let ref_count = r.u16()?;
    let mut method_refs = Vec::with_capacity(ref_count as usize);
    for _ in 0..ref_count {
        method_refs.push(MethodRef {
            owner: r.u16()?,
            name: r.u16()?,
            descriptor: r.u16()?,
        });
    }

    let method_count = r.u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        let name = r.u16()?;
        let descriptor = r.u16()?;
        let max_slots = r.u16()?;
        let op_count = r.u32()? as usize;
        let mut code = Vec::with_capacity(op_count);
        for _ in 0..op_count {
            code.push(decode_op(&mut r)?);
        }
        methods.push(MethodDef {
            name,
            descriptor,
            max_slots,
            code,
        });
    }

    if r.pos != bytes.len() {
        return Err(CompileError::new("trailing bytes after code unit"));
    }

    Ok(CodeUnit {
        fqcn,
        strings,
        consts,
        method_refs,
        methods,
    })
}
