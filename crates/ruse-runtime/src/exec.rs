//! Stack-machine executor for loaded units.
//!
//! Typed ops assume the kinds the emitter proved; the `Dyn*` ops carry the
//! general-path semantics of the fallback compiler (numeric promotion,
//! string concatenation on `+`, dispatch by receiver runtime type).
//!
//! Semantics follow the generated-code target: `int`/`long` arithmetic
//! wraps, integer division by zero is an error, float math is IEEE (NaN
//! ordered comparisons are false, `!=` true), shifts mask their distance.

use crate::bignum::BigDec;
use crate::chunk::{descriptor_param_count, descriptor_return, Cmp, IntWidth, NumKind, Op, PoolConst};
use crate::error::EvaluationError;
use crate::types::TypeRegistry;
use crate::unit::{LoadedUnit, MethodBinding};
use crate::value::Value;
use ruse_ast::PrimitiveTag;
use std::cmp::Ordering;

/// Execute one method of a loaded unit.
///
/// `args` fill slots starting at 1; slot 0 holds the receiver (always the
/// stateless unit itself, represented as null).
pub fn execute_method(
    loaded: &LoadedUnit,
    method_idx: usize,
    args: &[Value],
    types: &TypeRegistry,
) -> Result<Value, EvaluationError> {
    let method = loaded
        .unit
        .methods
        .get(method_idx)
        .ok_or_else(|| EvaluationError::Internal(format!("no method index {method_idx}")))?;

    let mut slots = vec![Value::Null; method.max_slots as usize];
    let mut next = 1usize;
    for arg in args {
        if next >= slots.len() {
            return Err(EvaluationError::Internal("argument slots exhausted".into()));
        }
        slots[next] = arg.clone();
        next += 1;
    }

    let mut stack: Vec<Value> = Vec::with_capacity(16);
    let mut pc = 0usize;
    let code = &method.code;

    macro_rules! pop {
        () => {
            stack
                .pop()
                .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?
        };
    }

    while pc < code.len() {
        let op = &code[pc];
        pc += 1;

        match *op {
            Op::Const(idx) => {
                let value = match loaded.unit.consts.get(idx as usize) {
                    Some(PoolConst::Int(v)) => Value::Int(*v),
                    Some(PoolConst::Long(v)) => Value::Long(*v),
                    Some(PoolConst::Float(bits)) => Value::Float(f32::from_bits(*bits)),
                    Some(PoolConst::Double(bits)) => Value::Double(f64::from_bits(*bits)),
                    Some(PoolConst::Str(s)) => Value::str(loaded.unit.string(*s)),
                    Some(PoolConst::Null) => Value::Null,
                    None => {
                        return Err(EvaluationError::Internal(format!(
                            "bad constant index {idx}"
                        )))
                    }
                };
                stack.push(value);
            }

            Op::Load(_, slot) => stack.push(slots[slot as usize].clone()),
            Op::Store(_, slot) => slots[slot as usize] = pop!(),
            Op::Iinc(slot, delta) => {
                let v = slots[slot as usize].as_int()?;
                slots[slot as usize] = Value::Int(v.wrapping_add(delta as i32));
            }

            Op::Add(kind) => arith(&mut stack, kind, ArithOp::Add)?,
            Op::Sub(kind) => arith(&mut stack, kind, ArithOp::Sub)?,
            Op::Mul(kind) => arith(&mut stack, kind, ArithOp::Mul)?,
            Op::Div(kind) => arith(&mut stack, kind, ArithOp::Div)?,
            Op::Rem(kind) => arith(&mut stack, kind, ArithOp::Rem)?,
            Op::Neg(kind) => {
                let v = pop!();
                stack.push(match kind {
                    NumKind::Int => Value::Int(v.as_int()?.wrapping_neg()),
                    NumKind::Long => Value::Long(v.as_long()?.wrapping_neg()),
                    NumKind::Float => Value::Float(-v.as_float()?),
                    NumKind::Double => Value::Double(-v.as_double()?),
                });
            }

            Op::BitAnd(width) => bitwise(&mut stack, width, |a, b| a & b, |a, b| a & b)?,
            Op::BitOr(width) => bitwise(&mut stack, width, |a, b| a | b, |a, b| a | b)?,
            Op::BitXor(width) => bitwise(&mut stack, width, |a, b| a ^ b, |a, b| a ^ b)?,
            Op::Shl(width) => shift(&mut stack, width, |a, s| a.wrapping_shl(s), |a, s| {
                a.wrapping_shl(s)
            })?,
            Op::Shr(width) => shift(&mut stack, width, |a, s| a.wrapping_shr(s), |a, s| {
                a.wrapping_shr(s)
            })?,
            Op::Ushr(width) => shift(
                &mut stack,
                width,
                |a, s| ((a as u32).wrapping_shr(s)) as i32,
                |a, s| ((a as u64).wrapping_shr(s)) as i64,
            )?,

            Op::Conv(from, to) => {
                let v = pop!();
                stack.push(convert(&v, from, to)?);
            }

            Op::Lcmp => {
                let r = pop!().as_long()?;
                let l = pop!().as_long()?;
                stack.push(Value::Int(ordering_to_int(l.cmp(&r))));
            }
            Op::Fcmpl | Op::Fcmpg => {
                let nan = if matches!(op, Op::Fcmpl) { -1 } else { 1 };
                let r = pop!().as_float()?;
                let l = pop!().as_float()?;
                stack.push(Value::Int(float_cmp(l as f64, r as f64, nan)));
            }
            Op::Dcmpl | Op::Dcmpg => {
                let nan = if matches!(op, Op::Dcmpl) { -1 } else { 1 };
                let r = pop!().as_double()?;
                let l = pop!().as_double()?;
                stack.push(Value::Int(float_cmp(l, r, nan)));
            }

            Op::If(cmp, target) => {
                let v = pop!().as_int()?;
                if cmp.holds(v) {
                    pc = target as usize;
                }
            }
            Op::IfICmp(cmp, target) => {
                let r = pop!().as_int()?;
                let l = pop!().as_int()?;
                if cmp.holds(ordering_to_int(l.cmp(&r))) {
                    pc = target as usize;
                }
            }
            Op::IfAcmpEq(target) => {
                let r = pop!();
                let l = pop!();
                if l.same_ref(&r) {
                    pc = target as usize;
                }
            }
            Op::IfAcmpNe(target) => {
                let r = pop!();
                let l = pop!();
                if !l.same_ref(&r) {
                    pc = target as usize;
                }
            }
            Op::IfNull(target) => {
                if pop!().is_null() {
                    pc = target as usize;
                }
            }
            Op::IfNonNull(target) => {
                if !pop!().is_null() {
                    pc = target as usize;
                }
            }
            Op::Goto(target) => pc = target as usize,

            Op::CheckCast(idx) => {
                let class = loaded.unit.string(idx);
                let v = pop!();
                if !v.is_null() && !value_matches_class(&v, class) {
                    return Err(EvaluationError::ClassCast {
                        value: v.class_name().to_string(),
                        target: class.to_string(),
                    });
                }
                stack.push(v);
            }

            Op::InvokeStatic(idx) | Op::InvokeCtor(idx) => {
                let (owner, name, desc) = loaded.unit.ref_parts(idx);
                let argc = invoke_argc(desc);
                let args = pop_args(&mut stack, argc)?;
                match &loaded.bindings[idx as usize] {
                    MethodBinding::Native(info) => {
                        let result = (info.native.expect("linked native"))(&args)?;
                        if descriptor_return(desc) != "V" || matches!(op, Op::InvokeCtor(_)) {
                            stack.push(result);
                        }
                    }
                    other => {
                        return Err(EvaluationError::Internal(format!(
                            "static call {owner}.{name} linked as {other:?}"
                        )))
                    }
                }
            }

            Op::InvokeVirtual(idx) | Op::InvokeInterface(idx) => {
                let (owner, name, desc) = loaded.unit.ref_parts(idx);
                let argc = invoke_argc(desc);
                let mut args = pop_args(&mut stack, argc)?;
                let receiver = pop!();
                match &loaded.bindings[idx as usize] {
                    MethodBinding::Native(info) => {
                        args.insert(0, receiver);
                        let result = (info.native.expect("linked native"))(&args)?;
                        if descriptor_return(desc) != "V" {
                            stack.push(result);
                        }
                    }
                    MethodBinding::OwnMethod(target) => {
                        let result = execute_method(loaded, *target, &args, types)?;
                        if descriptor_return(desc) != "V" {
                            stack.push(result);
                        }
                    }
                    MethodBinding::Virtual => {
                        let result = dispatch_virtual(&receiver, name, &args, types)?;
                        if descriptor_return(desc) != "V" {
                            stack.push(result);
                        }
                        let _ = owner;
                    }
                }
            }

            Op::Pop => {
                pop!();
            }

            Op::Return(_) => return Ok(pop!()),
            Op::ReturnVoid => return Ok(Value::Null),

            // ─── Dynamic subset ─────────────────────────────────────────
            Op::DynAdd => {
                let r = pop!();
                let l = pop!();
                stack.push(dyn_add(&l, &r)?);
            }
            Op::DynSub => dyn_numeric(&mut stack, "-", ArithOp::Sub)?,
            Op::DynMul => dyn_numeric(&mut stack, "*", ArithOp::Mul)?,
            Op::DynDiv => dyn_numeric(&mut stack, "/", ArithOp::Div)?,
            Op::DynRem => dyn_numeric(&mut stack, "%", ArithOp::Rem)?,
            Op::DynNeg => {
                let v = pop!();
                stack.push(dyn_neg(&v)?);
            }
            Op::DynNot => {
                let v = pop!().as_bool()?;
                stack.push(Value::Bool(!v));
            }
            Op::DynBitNot => {
                let v = pop!();
                stack.push(match v {
                    Value::Long(l) => Value::Long(!l),
                    other => Value::Int(!other.as_int()?),
                });
            }
            Op::DynBitAnd => dyn_bitwise(&mut stack, |a, b| a & b, |a, b| a & b)?,
            Op::DynBitOr => dyn_bitwise(&mut stack, |a, b| a | b, |a, b| a | b)?,
            Op::DynBitXor => dyn_bitwise(&mut stack, |a, b| a ^ b, |a, b| a ^ b)?,
            Op::DynShl => dyn_shift(&mut stack, |a, s| a.wrapping_shl(s), |a, s| {
                a.wrapping_shl(s)
            })?,
            Op::DynShr => dyn_shift(&mut stack, |a, s| a.wrapping_shr(s), |a, s| {
                a.wrapping_shr(s)
            })?,
            Op::DynUshr => dyn_shift(
                &mut stack,
                |a, s| ((a as u32).wrapping_shr(s)) as i32,
                |a, s| ((a as u64).wrapping_shr(s)) as i64,
            )?,
            Op::DynCmp(cmp) => {
                let r = pop!();
                let l = pop!();
                stack.push(Value::Bool(dyn_compare(cmp, &l, &r)?));
            }
            Op::DynGetField(idx) => {
                let field = loaded.unit.string(idx);
                let scope = pop!();
                stack.push(dyn_get_field(&scope, field)?);
            }
            Op::DynSetField(idx) => {
                let field = loaded.unit.string(idx);
                let value = pop!();
                let scope = pop!();
                dyn_set_field(&scope, field, value.clone())?;
                stack.push(value);
            }
            Op::DynIndex => {
                let index = pop!();
                let scope = pop!();
                stack.push(dyn_index(&scope, &index)?);
            }
            Op::DynIndexSet => {
                let value = pop!();
                let index = pop!();
                let scope = pop!();
                dyn_index_set(&scope, &index, value.clone())?;
                stack.push(value);
            }
            Op::DynInvoke(idx, argc) => {
                let name = loaded.unit.string(idx);
                let args = pop_args(&mut stack, argc as usize)?;
                let receiver = pop!();
                stack.push(dispatch_virtual(&receiver, name, &args, types)?);
            }
            Op::DynInvokeStatic(idx, argc) => {
                let (owner, name, _) = loaded.unit.ref_parts(idx);
                let args = pop_args(&mut stack, argc as usize)?;
                match &loaded.bindings[idx as usize] {
                    MethodBinding::Native(info) => {
                        stack.push((info.native.expect("linked native"))(&args)?)
                    }
                    _ => {
                        return Err(EvaluationError::NoSuchMethod {
                            class: owner.to_string(),
                            method: name.to_string(),
                            arity: argc as usize,
                        })
                    }
                }
            }
            Op::DynNew(idx, argc) => {
                let class = loaded.unit.string(idx);
                let args = pop_args(&mut stack, argc as usize)?;
                let ctor = types
                    .find_method(class, "<init>", argc as usize)
                    .and_then(|info| info.native)
                    .ok_or_else(|| EvaluationError::NoSuchMethod {
                        class: class.to_string(),
                        method: "<init>".to_string(),
                        arity: argc as usize,
                    })?;
                stack.push(ctor(&args)?);
            }
            Op::DynCast(idx) => {
                let target = loaded.unit.string(idx);
                let v = pop!();
                stack.push(dyn_cast(&v, target)?);
            }
        }
    }

    Err(EvaluationError::Internal(
        "control flow ran past end of method".into(),
    ))
}

// ─── Typed helpers ───────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn arith(stack: &mut Vec<Value>, kind: NumKind, op: ArithOp) -> Result<(), EvaluationError> {
    let r = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let l = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;

    let result = match kind {
        NumKind::Int => {
            let (a, b) = (l.as_int()?, r.as_int()?);
            Value::Int(int_arith(a, b, op)?)
        }
        NumKind::Long => {
            let (a, b) = (l.as_long()?, r.as_long()?);
            Value::Long(long_arith(a, b, op)?)
        }
        NumKind::Float => {
            let (a, b) = (l.as_float()?, r.as_float()?);
            Value::Float(float_arith(a as f64, b as f64, op) as f32)
        }
        NumKind::Double => {
            let (a, b) = (l.as_double()?, r.as_double()?);
            Value::Double(float_arith(a, b, op))
        }
    };
    stack.push(result);
    Ok(())
}

fn int_arith(a: i32, b: i32, op: ArithOp) -> Result<i32, EvaluationError> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div => {
            if b == 0 {
                return Err(EvaluationError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        ArithOp::Rem => {
            if b == 0 {
                return Err(EvaluationError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
    })
}

fn long_arith(a: i64, b: i64, op: ArithOp) -> Result<i64, EvaluationError> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div => {
            if b == 0 {
                return Err(EvaluationError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        ArithOp::Rem => {
            if b == 0 {
                return Err(EvaluationError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
    })
}

fn float_arith(a: f64, b: f64, op: ArithOp) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Rem => a % b,
    }
}

fn bitwise(
    stack: &mut Vec<Value>,
    width: IntWidth,
    int_op: fn(i32, i32) -> i32,
    long_op: fn(i64, i64) -> i64,
) -> Result<(), EvaluationError> {
    let r = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let l = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    stack.push(match width {
        IntWidth::Int => Value::Int(int_op(l.as_int()?, r.as_int()?)),
        IntWidth::Long => Value::Long(long_op(l.as_long()?, r.as_long()?)),
    });
    Ok(())
}

fn shift(
    stack: &mut Vec<Value>,
    width: IntWidth,
    int_op: fn(i32, u32) -> i32,
    long_op: fn(i64, u32) -> i64,
) -> Result<(), EvaluationError> {
    let r = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let l = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    // Shift distance is always int-kind; only the low bits count
    let distance = r.as_int()? as u32;
    stack.push(match width {
        IntWidth::Int => Value::Int(int_op(l.as_int()?, distance & 31)),
        IntWidth::Long => Value::Long(long_op(l.as_long()?, distance & 63)),
    });
    Ok(())
}

fn convert(v: &Value, from: NumKind, to: NumKind) -> Result<Value, EvaluationError> {
    let widened = match from {
        NumKind::Int => v.as_int()? as f64,
        NumKind::Long => v.as_long()? as f64,
        NumKind::Float => v.as_float()? as f64,
        NumKind::Double => v.as_double()?,
    };
    Ok(match (from, to) {
        (NumKind::Int, NumKind::Long) => Value::Long(v.as_int()? as i64),
        (NumKind::Int, NumKind::Int) => Value::Int(v.as_int()?),
        (NumKind::Long, NumKind::Int) => Value::Int(v.as_long()? as i32),
        (NumKind::Long, NumKind::Long) => Value::Long(v.as_long()?),
        (NumKind::Float, NumKind::Int) | (NumKind::Double, NumKind::Int) => {
            Value::Int(widened as i32)
        }
        (NumKind::Float, NumKind::Long) | (NumKind::Double, NumKind::Long) => {
            Value::Long(widened as i64)
        }
        (_, NumKind::Float) => Value::Float(widened as f32),
        (_, NumKind::Double) => Value::Double(widened),
    })
}

fn ordering_to_int(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn float_cmp(l: f64, r: f64, nan_result: i32) -> i32 {
    match l.partial_cmp(&r) {
        Some(ordering) => ordering_to_int(ordering),
        None => nan_result,
    }
}

fn invoke_argc(descriptor: &str) -> usize {
    match descriptor.strip_prefix('*') {
        Some(argc) => argc.parse().unwrap_or(0),
        None => descriptor_param_count(descriptor),
    }
}

fn pop_args(stack: &mut Vec<Value>, argc: usize) -> Result<Vec<Value>, EvaluationError> {
    if stack.len() < argc {
        return Err(EvaluationError::Internal("operand stack underflow".into()));
    }
    Ok(stack.split_off(stack.len() - argc))
}

fn value_matches_class(v: &Value, class: &str) -> bool {
    if class == "java.lang.Object" {
        return true;
    }
    v.class_name() == class
}

/// Instance dispatch by the receiver's runtime type.
fn dispatch_virtual(
    receiver: &Value,
    name: &str,
    args: &[Value],
    types: &TypeRegistry,
) -> Result<Value, EvaluationError> {
    if receiver.is_null() {
        return Err(EvaluationError::NullReference {
            context: format!("calling '{name}'"),
        });
    }

    if let Value::Obj(pojo) = receiver {
        return pojo.invoke(name, args);
    }

    let class = receiver.class_name();
    let info = types.find_method(class, name, args.len()).ok_or_else(|| {
        EvaluationError::NoSuchMethod {
            class: class.to_string(),
            method: name.to_string(),
            arity: args.len(),
        }
    })?;
    let native = info.native.ok_or_else(|| EvaluationError::NoSuchMethod {
        class: class.to_string(),
        method: name.to_string(),
        arity: args.len(),
    })?;

    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(receiver.clone());
    full.extend_from_slice(args);
    native(&full)
}

// ─── Dynamic helpers ─────────────────────────────────────────────────────

fn dyn_add(l: &Value, r: &Value) -> Result<Value, EvaluationError> {
    // String concatenation wins when either side is a string
    if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
        let mut s = l.to_display_string();
        s.push_str(&r.to_display_string());
        return Ok(Value::str(s));
    }
    if let (Value::Duration(a), Value::Duration(b)) = (l, r) {
        return a
            .checked_add(b)
            .map(Value::Duration)
            .ok_or_else(|| EvaluationError::Arithmetic("duration overflow".into()));
    }
    dyn_arith(l, r, ArithOp::Add, "+")
}

fn dyn_numeric(stack: &mut Vec<Value>, symbol: &str, op: ArithOp) -> Result<(), EvaluationError> {
    let r = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let l = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let result = dyn_arith(&l, &r, op, symbol)?;
    stack.push(result);
    Ok(())
}

/// Numeric promotion for the dynamic path: big-decimal > big-integer >
/// double > long > int.
fn dyn_arith(l: &Value, r: &Value, op: ArithOp, symbol: &str) -> Result<Value, EvaluationError> {
    use Value::*;

    let type_err = || {
        EvaluationError::Type(format!(
            "cannot apply '{symbol}' to {} and {}",
            l.class_name(),
            r.class_name()
        ))
    };

    if matches!(l, BigDecimal(_)) || matches!(r, BigDecimal(_)) {
        let a = to_dec(l).ok_or_else(type_err)?;
        let b = to_dec(r).ok_or_else(type_err)?;
        let result = match op {
            ArithOp::Add => a.add(b)?,
            ArithOp::Sub => a.sub(b)?,
            ArithOp::Mul => a.mul(b)?,
            ArithOp::Div => a.div(b)?,
            ArithOp::Rem => return Err(type_err()),
        };
        return Ok(BigDecimal(result));
    }

    if matches!(l, BigInteger(_)) || matches!(r, BigInteger(_)) {
        let a = to_bigint(l).ok_or_else(type_err)?;
        let b = to_bigint(r).ok_or_else(type_err)?;
        let result = match op {
            ArithOp::Add => a.add(b)?,
            ArithOp::Sub => a.sub(b)?,
            ArithOp::Mul => a.mul(b)?,
            ArithOp::Div => a.div(b)?,
            ArithOp::Rem => return Err(type_err()),
        };
        return Ok(BigInteger(result));
    }

    if matches!(l, Double(_) | Float(_)) || matches!(r, Double(_) | Float(_)) {
        let a = l.numeric_f64().ok_or_else(type_err)?;
        let b = r.numeric_f64().ok_or_else(type_err)?;
        return Ok(Double(float_arith(a, b, op)));
    }

    if matches!(l, Long(_)) || matches!(r, Long(_)) {
        return Ok(Long(long_arith(l.as_long()?, r.as_long()?, op)?));
    }

    match (l.as_int(), r.as_int()) {
        (Ok(a), Ok(b)) => Ok(Int(int_arith(a, b, op)?)),
        _ => Err(type_err()),
    }
}

fn to_dec(v: &Value) -> Option<BigDec> {
    match v {
        Value::BigDecimal(d) => Some(*d),
        Value::Int(v) => Some(BigDec::from_i64(*v as i64)),
        Value::Long(v) => Some(BigDec::from_i64(*v)),
        Value::Short(v) => Some(BigDec::from_i64(*v as i64)),
        Value::Byte(v) => Some(BigDec::from_i64(*v as i64)),
        _ => None,
    }
}

fn to_bigint(v: &Value) -> Option<crate::bignum::BigInt> {
    match v {
        Value::BigInteger(b) => Some(*b),
        Value::Int(v) => Some(crate::bignum::BigInt::from_i64(*v as i64)),
        Value::Long(v) => Some(crate::bignum::BigInt::from_i64(*v)),
        _ => None,
    }
}

fn dyn_neg(v: &Value) -> Result<Value, EvaluationError> {
    Ok(match v {
        Value::Int(i) => Value::Int(i.wrapping_neg()),
        Value::Long(l) => Value::Long(l.wrapping_neg()),
        Value::Float(f) => Value::Float(-f),
        Value::Double(d) => Value::Double(-d),
        Value::BigDecimal(d) => Value::BigDecimal(d.neg()),
        Value::BigInteger(b) => Value::BigInteger(b.neg()),
        Value::Short(s) => Value::Int((*s as i32).wrapping_neg()),
        Value::Byte(b) => Value::Int((*b as i32).wrapping_neg()),
        other => {
            return Err(EvaluationError::Type(format!(
                "cannot negate {}",
                other.class_name()
            )))
        }
    })
}

fn dyn_bitwise(
    stack: &mut Vec<Value>,
    int_op: fn(i32, i32) -> i32,
    long_op: fn(i64, i64) -> i64,
) -> Result<(), EvaluationError> {
    let r = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let l = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let result = if matches!(l, Value::Long(_)) || matches!(r, Value::Long(_)) {
        Value::Long(long_op(l.as_long()?, r.as_long()?))
    } else if let (Value::Bool(a), Value::Bool(b)) = (&l, &r) {
        // non-short-circuit boolean & | ^
        Value::Bool(int_op(*a as i32, *b as i32) != 0)
    } else {
        Value::Int(int_op(l.as_int()?, r.as_int()?))
    };
    stack.push(result);
    Ok(())
}

fn dyn_shift(
    stack: &mut Vec<Value>,
    int_op: fn(i32, u32) -> i32,
    long_op: fn(i64, u32) -> i64,
) -> Result<(), EvaluationError> {
    let r = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let l = stack
        .pop()
        .ok_or_else(|| EvaluationError::Internal("operand stack underflow".into()))?;
    let distance = r.as_int()? as u32;
    let result = if matches!(l, Value::Long(_)) {
        Value::Long(long_op(l.as_long()?, distance & 63))
    } else {
        Value::Int(int_op(l.as_int()?, distance & 31))
    };
    stack.push(result);
    Ok(())
}

fn dyn_compare(cmp: Cmp, l: &Value, r: &Value) -> Result<bool, EvaluationError> {
    // Equality first: null and reference comparisons only make sense there
    if matches!(cmp, Cmp::Eq | Cmp::Ne) {
        let equal = if l.is_null() || r.is_null() {
            l.is_null() && r.is_null()
        } else if l.is_numeric() && r.is_numeric() {
            numeric_ordering(l, r)? == Some(Ordering::Equal)
        } else {
            l == r
        };
        return Ok(if matches!(cmp, Cmp::Eq) { equal } else { !equal });
    }

    let ordering = if let (Value::Str(a), Value::Str(b)) = (l, r) {
        Some(a.cmp(b))
    } else if let (Value::Duration(a), Value::Duration(b)) = (l, r) {
        Some(a.cmp(b))
    } else if l.is_numeric() && r.is_numeric() {
        numeric_ordering(l, r)?
    } else {
        return Err(EvaluationError::Type(format!(
            "cannot order {} and {}",
            l.class_name(),
            r.class_name()
        )));
    };

    // NaN is unordered: every ordered comparison involving it is false
    Ok(match ordering {
        Some(ordering) => cmp.holds(ordering_to_int(ordering)),
        None => false,
    })
}

fn numeric_ordering(l: &Value, r: &Value) -> Result<Option<Ordering>, EvaluationError> {
    if let (Value::BigDecimal(a), Value::BigDecimal(b)) = (l, r) {
        return a.compare(*b).map(Some);
    }
    let a = l
        .numeric_f64()
        .ok_or_else(|| EvaluationError::Type("not a number".into()))?;
    let b = r
        .numeric_f64()
        .ok_or_else(|| EvaluationError::Type("not a number".into()))?;
    Ok(a.partial_cmp(&b))
}

fn dyn_get_field(scope: &Value, field: &str) -> Result<Value, EvaluationError> {
    match scope {
        Value::Null => Err(EvaluationError::NullReference {
            context: format!("reading '{field}'"),
        }),
        Value::Map(map) => Ok(map.read().get(field).cloned().unwrap_or(Value::Null)),
        Value::Obj(pojo) => {
            pojo.get_property(field)
                .ok_or_else(|| EvaluationError::NoSuchProperty {
                    class: pojo.class_name().to_string(),
                    field: field.to_string(),
                })
        }
        other => Err(EvaluationError::NoSuchProperty {
            class: other.class_name().to_string(),
            field: field.to_string(),
        }),
    }
}

fn dyn_set_field(scope: &Value, field: &str, value: Value) -> Result<(), EvaluationError> {
    match scope {
        Value::Null => Err(EvaluationError::NullReference {
            context: format!("writing '{field}'"),
        }),
        Value::Map(map) => {
            map.write().insert(field.to_string(), value);
            Ok(())
        }
        Value::Obj(pojo) => {
            if pojo.set_property(field, value) {
                Ok(())
            } else {
                Err(EvaluationError::NoSuchProperty {
                    class: pojo.class_name().to_string(),
                    field: field.to_string(),
                })
            }
        }
        other => Err(EvaluationError::NoSuchProperty {
            class: other.class_name().to_string(),
            field: field.to_string(),
        }),
    }
}

fn dyn_index(scope: &Value, index: &Value) -> Result<Value, EvaluationError> {
    match scope {
        Value::List(list) => {
            let idx = index.as_int()?;
            let guard = list.read();
            guard
                .get(idx.max(0) as usize)
                .cloned()
                .filter(|_| idx >= 0)
                .ok_or(EvaluationError::IndexOutOfBounds {
                    index: idx as i64,
                    len: guard.len(),
                })
        }
        Value::Map(map) => {
            let key = index.to_display_string();
            Ok(map.read().get(&key).cloned().unwrap_or(Value::Null))
        }
        Value::Null => Err(EvaluationError::NullReference {
            context: "indexing".to_string(),
        }),
        other => Err(EvaluationError::Type(format!(
            "cannot index {}",
            other.class_name()
        ))),
    }
}

fn dyn_index_set(scope: &Value, index: &Value, value: Value) -> Result<(), EvaluationError> {
    match scope {
        Value::List(list) => {
            let idx = index.as_int()?;
            let mut guard = list.write();
            let len = guard.len();
            let slot = guard
                .get_mut(idx.max(0) as usize)
                .filter(|_| idx >= 0)
                .ok_or(EvaluationError::IndexOutOfBounds {
                    index: idx as i64,
                    len,
                })?;
            *slot = value;
            Ok(())
        }
        Value::Map(map) => {
            map.write().insert(index.to_display_string(), value);
            Ok(())
        }
        other => Err(EvaluationError::Type(format!(
            "cannot index {}",
            other.class_name()
        ))),
    }
}

fn dyn_cast(v: &Value, target: &str) -> Result<Value, EvaluationError> {
    if v.is_null() {
        if PrimitiveTag::from_keyword(target).is_some() {
            return Err(EvaluationError::NullReference {
                context: format!("unboxing to {target}"),
            });
        }
        return Ok(Value::Null);
    }

    if let Some(tag) = PrimitiveTag::from_keyword(target) {
        return prim_convert(v, tag);
    }

    if target == "java.lang.Object" {
        return Ok(v.clone());
    }

    // Boxed wrapper target: convert within numerics like the unboxing cast
    // chain the prelude prints; otherwise it is a checked reference cast.
    if let Some(tag) = PrimitiveTag::from_boxed_name(target) {
        if value_matches_class(v, target) {
            return Ok(v.clone());
        }
        return prim_convert(v, tag);
    }

    if value_matches_class(v, target) {
        Ok(v.clone())
    } else {
        Err(EvaluationError::ClassCast {
            value: v.class_name().to_string(),
            target: target.to_string(),
        })
    }
}

fn prim_convert(v: &Value, tag: PrimitiveTag) -> Result<Value, EvaluationError> {
    let cast_err = || EvaluationError::ClassCast {
        value: v.class_name().to_string(),
        target: tag.keyword().to_string(),
    };
    let as_f64 = v.numeric_f64();
    Ok(match tag {
        PrimitiveTag::Int => Value::Int(match v {
            Value::Double(d) => *d as i32,
            Value::Float(f) => *f as i32,
            Value::Long(l) => *l as i32,
            other => other.as_int().map_err(|_| cast_err())?,
        }),
        PrimitiveTag::Long => Value::Long(match v {
            Value::Double(d) => *d as i64,
            Value::Float(f) => *f as i64,
            other => other.as_long().map_err(|_| cast_err())?,
        }),
        PrimitiveTag::Short => Value::Short(v.as_int().map_err(|_| cast_err())? as i16),
        PrimitiveTag::Byte => Value::Byte(v.as_int().map_err(|_| cast_err())? as i8),
        PrimitiveTag::Char => match v {
            Value::Char(c) => Value::Char(*c),
            other => {
                let code = other.as_int().map_err(|_| cast_err())? as u32;
                Value::Char(char::from_u32(code).unwrap_or('\u{FFFD}'))
            }
        },
        PrimitiveTag::Boolean => Value::Bool(v.as_bool().map_err(|_| cast_err())?),
        PrimitiveTag::Float => Value::Float(as_f64.ok_or_else(cast_err)? as f32),
        PrimitiveTag::Double => Value::Double(as_f64.ok_or_else(cast_err)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CodeBuilder, UnitBuilder};
    use crate::unit::load;
    use ruse_ast::ValueKind;

    fn run(build: impl FnOnce(&mut UnitBuilder, &mut CodeBuilder), args: &[Value]) -> Value {
        try_run(build, args).unwrap()
    }

    fn try_run(
        build: impl FnOnce(&mut UnitBuilder, &mut CodeBuilder),
        args: &[Value],
    ) -> Result<Value, EvaluationError> {
        let types = TypeRegistry::with_builtins();
        let mut unit = UnitBuilder::new("ruse.generated.T");
        let mut code = CodeBuilder::new();
        build(&mut unit, &mut code);
        let ops = code.finish().unwrap();
        unit.add_method("eval", "(Ljava/lang/Object;)Ljava/lang/Object;", 4, ops);
        let loaded = load(&unit.build(), &types).expect("unit must verify");
        execute_method(&loaded, 0, args, &types)
    }

    #[test]
    fn int_add_wraps() {
        let result = run(
            |unit, code| {
                let a = unit.const_int(i32::MAX);
                let b = unit.const_int(1);
                code.emit(Op::Const(a));
                code.emit(Op::Const(b));
                code.emit(Op::Add(NumKind::Int));
                code.emit(Op::Return(ValueKind::Int));
            },
            &[],
        );
        assert_eq!(result, Value::Int(i32::MIN));
    }

    #[test]
    fn int_division_by_zero_raises() {
        let err = try_run(
            |unit, code| {
                let a = unit.const_int(1);
                let b = unit.const_int(0);
                code.emit(Op::Const(a));
                code.emit(Op::Const(b));
                code.emit(Op::Div(NumKind::Int));
                code.emit(Op::Return(ValueKind::Int));
            },
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::DivisionByZero));
    }

    #[test]
    fn double_division_by_zero_is_infinite() {
        let result = run(
            |unit, code| {
                let a = unit.const_double(1.0);
                let b = unit.const_double(0.0);
                code.emit(Op::Const(a));
                code.emit(Op::Const(b));
                code.emit(Op::Div(NumKind::Double));
                code.emit(Op::Return(ValueKind::Double));
            },
            &[],
        );
        assert_eq!(result, Value::Double(f64::INFINITY));
    }

    #[test]
    fn nan_comparison_via_dcmpg_is_false_for_less() {
        // NaN < 1.0 → Dcmpg pushes +1 → IFLT not taken → false
        let result = run(
            |unit, code| {
                let nan = unit.const_double(f64::NAN);
                let one = unit.const_double(1.0);
                let is_true = code.new_label();
                let end = code.new_label();
                code.emit(Op::Const(nan));
                code.emit(Op::Const(one));
                code.emit(Op::Dcmpg);
                code.jump_if(Cmp::Lt, is_true);
                let f = unit.const_int(0);
                code.emit(Op::Const(f));
                code.goto(end);
                code.bind(is_true);
                let t = unit.const_int(1);
                code.emit(Op::Const(t));
                code.bind(end);
                code.emit(Op::Return(ValueKind::Int));
            },
            &[],
        );
        assert_eq!(result, Value::Int(0));
    }

    #[test]
    fn shifts_mask_distance() {
        let result = run(
            |unit, code| {
                let a = unit.const_int(1);
                let s = unit.const_int(33); // masked to 1
                code.emit(Op::Const(a));
                code.emit(Op::Const(s));
                code.emit(Op::Shl(IntWidth::Int));
                code.emit(Op::Return(ValueKind::Int));
            },
            &[],
        );
        assert_eq!(result, Value::Int(2));
    }

    #[test]
    fn invoke_interface_map_get() {
        let ctx = Value::map([("x".to_string(), Value::Int(7))]);
        let result = run(
            |unit, code| {
                let key = unit.const_str("x");
                let get = unit.method_ref(
                    "java.util.Map",
                    "get",
                    "(Ljava/lang/Object;)Ljava/lang/Object;",
                );
                code.emit(Op::Load(ValueKind::Reference, 1));
                code.emit(Op::Const(key));
                code.emit(Op::InvokeInterface(get));
                code.emit(Op::Return(ValueKind::Reference));
            },
            &[ctx],
        );
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn checkcast_failure_reports_types() {
        let err = try_run(
            |unit, code| {
                let int_class = unit.intern("java.lang.Integer");
                code.emit(Op::Load(ValueKind::Reference, 1));
                code.emit(Op::CheckCast(int_class));
                code.emit(Op::Return(ValueKind::Reference));
            },
            &[Value::str("not an int")],
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::ClassCast { .. }));
    }

    #[test]
    fn dyn_add_promotes_to_big_decimal() {
        let result = run(
            |unit, code| {
                code.emit(Op::Load(ValueKind::Reference, 1));
                let one = unit.const_int(1);
                code.emit(Op::Const(one));
                code.emit(Op::DynAdd);
                code.emit(Op::Return(ValueKind::Reference));
            },
            &[Value::BigDecimal(BigDec::parse("1").unwrap())],
        );
        assert_eq!(result.to_display_string(), "2");
    }

    #[test]
    fn dyn_add_concatenates_strings() {
        let result = run(
            |unit, code| {
                code.emit(Op::Load(ValueKind::Reference, 1));
                let suffix = unit.const_str("Bob");
                code.emit(Op::Const(suffix));
                code.emit(Op::DynAdd);
                code.emit(Op::Return(ValueKind::Reference));
            },
            &[Value::str("Alice")],
        );
        assert_eq!(result, Value::str("AliceBob"));
    }

    #[test]
    fn dyn_compare_handles_nan() {
        for cmp in [Cmp::Lt, Cmp::Le, Cmp::Gt, Cmp::Ge, Cmp::Eq] {
            assert!(!dyn_compare(cmp, &Value::Double(f64::NAN), &Value::Double(1.0)).unwrap());
        }
        assert!(dyn_compare(Cmp::Ne, &Value::Double(f64::NAN), &Value::Double(1.0)).unwrap());
    }

    #[test]
    fn dyn_field_on_map_and_null() {
        let ctx = Value::map([("name".to_string(), Value::str("Ada"))]);
        assert_eq!(dyn_get_field(&ctx, "name").unwrap(), Value::str("Ada"));
        assert_eq!(dyn_get_field(&ctx, "missing").unwrap(), Value::Null);
        assert!(matches!(
            dyn_get_field(&Value::Null, "x"),
            Err(EvaluationError::NullReference { .. })
        ));
    }

    #[test]
    fn dyn_cast_primitive_chain() {
        // the prelude pattern: (int)(java.lang.Integer) value
        let v = dyn_cast(&Value::Int(5), "java.lang.Integer").unwrap();
        let v = dyn_cast(&v, "int").unwrap();
        assert_eq!(v, Value::Int(5));

        assert!(matches!(
            dyn_cast(&Value::str("x"), "java.lang.Integer"),
            Err(EvaluationError::ClassCast { .. })
        ));
    }

    #[test]
    fn conversions_follow_target_rules() {
        // d2i on NaN is 0, l2i truncates
        assert_eq!(
            convert(&Value::Double(f64::NAN), NumKind::Double, NumKind::Int).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            convert(&Value::Long(i64::MAX), NumKind::Long, NumKind::Int).unwrap(),
            Value::Int(-1)
        );
        assert_eq!(
            convert(&Value::Int(7), NumKind::Int, NumKind::Double).unwrap(),
            Value::Double(7.0)
        );
    }
}
