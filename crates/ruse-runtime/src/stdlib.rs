//! Built-in classes of the generated-code namespace.
//!
//! These are the classes the lowering pass and the direct emitter name:
//! the boxed primitives and their factories, `Math`, `String`, the big
//! numbers, the collection interfaces with their `of` factories, `Duration`
//! for temporal literals, and the `ruse.Rt` utility statics used for context
//! write-back and string concatenation.

use crate::bignum::{BigDec, BigInt};
use crate::error::EvaluationError;
use crate::types::{
    declared, method, static_method, varargs_static, ClassInfo, TypeRegistry,
};
use crate::value::Value;
use chrono::Duration;
use ruse_ast::{PrimitiveTag as P, TypeDescriptor};

fn prim(tag: P) -> TypeDescriptor {
    TypeDescriptor::primitive(tag)
}

fn obj() -> TypeDescriptor {
    TypeDescriptor::object()
}

fn string() -> TypeDescriptor {
    TypeDescriptor::string()
}

fn boxed(tag: P) -> TypeDescriptor {
    TypeDescriptor::reference(tag.boxed_name())
}

fn big_dec() -> TypeDescriptor {
    TypeDescriptor::reference("java.math.BigDecimal")
}

fn big_int() -> TypeDescriptor {
    TypeDescriptor::reference("java.math.BigInteger")
}

fn duration() -> TypeDescriptor {
    TypeDescriptor::reference("java.time.Duration")
}

fn map_ty() -> TypeDescriptor {
    TypeDescriptor::reference("java.util.Map")
}

fn list_ty() -> TypeDescriptor {
    TypeDescriptor::reference("java.util.List")
}

// ─── Argument helpers ────────────────────────────────────────────────────

fn arg<'a>(args: &'a [Value], i: usize) -> Result<&'a Value, EvaluationError> {
    args.get(i)
        .ok_or_else(|| EvaluationError::Internal(format!("missing argument {i}")))
}

fn num(args: &[Value], i: usize) -> Result<f64, EvaluationError> {
    let v = arg(args, i)?;
    v.numeric_f64()
        .ok_or_else(|| EvaluationError::Type(format!("expected number, got {}", v.class_name())))
}

fn long(args: &[Value], i: usize) -> Result<i64, EvaluationError> {
    arg(args, i)?.as_long()
}

fn int(args: &[Value], i: usize) -> Result<i32, EvaluationError> {
    arg(args, i)?.as_int()
}

fn text(args: &[Value], i: usize) -> Result<String, EvaluationError> {
    Ok(arg(args, i)?.as_str()?.to_string())
}

fn dec(args: &[Value], i: usize) -> Result<BigDec, EvaluationError> {
    match arg(args, i)? {
        Value::BigDecimal(d) => Ok(*d),
        Value::Int(v) => Ok(BigDec::from_i64(*v as i64)),
        Value::Long(v) => Ok(BigDec::from_i64(*v)),
        other => Err(EvaluationError::Type(format!(
            "expected BigDecimal, got {}",
            other.class_name()
        ))),
    }
}

fn bigint(args: &[Value], i: usize) -> Result<BigInt, EvaluationError> {
    match arg(args, i)? {
        Value::BigInteger(v) => Ok(*v),
        Value::Int(v) => Ok(BigInt::from_i64(*v as i64)),
        Value::Long(v) => Ok(BigInt::from_i64(*v)),
        other => Err(EvaluationError::Type(format!(
            "expected BigInteger, got {}",
            other.class_name()
        ))),
    }
}

fn dur(args: &[Value], i: usize) -> Result<Duration, EvaluationError> {
    match arg(args, i)? {
        Value::Duration(d) => Ok(*d),
        other => Err(EvaluationError::Type(format!(
            "expected Duration, got {}",
            other.class_name()
        ))),
    }
}

fn overflow() -> EvaluationError {
    EvaluationError::Arithmetic("duration overflow".to_string())
}

// ─── Object ──────────────────────────────────────────────────────────────

fn object_to_string(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::str(arg(args, 0)?.to_display_string()))
}

fn object_equals(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(arg(args, 0)? == arg(args, 1)?))
}

// ─── Math ────────────────────────────────────────────────────────────────

fn math_abs(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.abs()))
}
fn math_max(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.max(num(args, 1)?)))
}
fn math_min(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.min(num(args, 1)?)))
}
fn math_pow(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.powf(num(args, 1)?)))
}
fn math_sqrt(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.sqrt()))
}
fn math_floor(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.floor()))
}
fn math_ceil(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.ceil()))
}
fn math_sin(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.sin()))
}
fn math_cos(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.cos()))
}
fn math_tan(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.tan()))
}
fn math_exp(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.exp()))
}
fn math_log(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(num(args, 0)?.ln()))
}
fn math_signum(args: &[Value]) -> Result<Value, EvaluationError> {
    let v = num(args, 0)?;
    Ok(Value::Double(if v == 0.0 { v } else { v.signum() }))
}

// ─── Boxed primitives ────────────────────────────────────────────────────

fn integer_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(int(args, 0)?))
}
fn long_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Long(long(args, 0)?))
}
fn short_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Short(int(args, 0)? as i16))
}
fn byte_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Byte(int(args, 0)? as i8))
}
fn char_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    let code = int(args, 0)? as u32;
    Ok(Value::Char(char::from_u32(code).unwrap_or('\u{FFFD}')))
}
fn boolean_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(arg(args, 0)?.as_bool()?))
}
fn float_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Float(arg(args, 0)?.as_float()?))
}
fn double_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(arg(args, 0)?.as_double()?))
}

fn unbox_int(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(arg(args, 0)?.as_int()?))
}
fn unbox_long(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Long(arg(args, 0)?.as_long()?))
}
fn unbox_short(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Short(arg(args, 0)?.as_int()? as i16))
}
fn unbox_byte(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Byte(arg(args, 0)?.as_int()? as i8))
}
fn unbox_char(args: &[Value]) -> Result<Value, EvaluationError> {
    match arg(args, 0)? {
        Value::Char(c) => Ok(Value::Char(*c)),
        other => Err(EvaluationError::Type(format!(
            "expected Character, got {}",
            other.class_name()
        ))),
    }
}
fn unbox_bool(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(arg(args, 0)?.as_bool()?))
}
fn unbox_float(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Float(arg(args, 0)?.as_float()?))
}
fn unbox_double(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(arg(args, 0)?.as_double()?))
}

// ─── String ──────────────────────────────────────────────────────────────

fn string_length(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(arg(args, 0)?.as_str()?.chars().count() as i32))
}
fn string_is_empty(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(arg(args, 0)?.as_str()?.is_empty()))
}
fn string_concat(args: &[Value]) -> Result<Value, EvaluationError> {
    let mut s = text(args, 0)?;
    s.push_str(&text(args, 1)?);
    Ok(Value::str(s))
}
fn string_to_upper(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::str(arg(args, 0)?.as_str()?.to_uppercase()))
}
fn string_to_lower(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::str(arg(args, 0)?.as_str()?.to_lowercase()))
}
fn string_trim(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::str(arg(args, 0)?.as_str()?.trim()))
}
fn string_starts_with(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(
        arg(args, 0)?.as_str()?.starts_with(&*text(args, 1)?),
    ))
}
fn string_ends_with(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(
        arg(args, 0)?.as_str()?.ends_with(&*text(args, 1)?),
    ))
}
fn string_contains(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(
        arg(args, 0)?.as_str()?.contains(&*text(args, 1)?),
    ))
}
fn string_index_of(args: &[Value]) -> Result<Value, EvaluationError> {
    let haystack = arg(args, 0)?.as_str()?.clone();
    let needle = text(args, 1)?;
    Ok(Value::Int(
        haystack.find(&needle).map(|i| i as i32).unwrap_or(-1),
    ))
}
fn string_char_at(args: &[Value]) -> Result<Value, EvaluationError> {
    let s = arg(args, 0)?.as_str()?.clone();
    let idx = int(args, 1)?;
    s.chars()
        .nth(idx.max(0) as usize)
        .map(Value::Char)
        .ok_or(EvaluationError::IndexOutOfBounds {
            index: idx as i64,
            len: s.chars().count(),
        })
}
fn string_substring_from(args: &[Value]) -> Result<Value, EvaluationError> {
    let s = arg(args, 0)?.as_str()?.clone();
    let from = int(args, 1)?.max(0) as usize;
    Ok(Value::str(s.chars().skip(from).collect::<String>()))
}
fn string_substring_range(args: &[Value]) -> Result<Value, EvaluationError> {
    let s = arg(args, 0)?.as_str()?.clone();
    let from = int(args, 1)?.max(0) as usize;
    let to = int(args, 2)?.max(0) as usize;
    Ok(Value::str(
        s.chars()
            .skip(from)
            .take(to.saturating_sub(from))
            .collect::<String>(),
    ))
}

// ─── BigDecimal / BigInteger ─────────────────────────────────────────────

fn bd_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigDecimal(BigDec::from_i64(long(args, 0)?)))
}
fn bd_new(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigDecimal(BigDec::parse(&text(args, 0)?)?))
}
fn bd_add(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigDecimal(dec(args, 0)?.add(dec(args, 1)?)?))
}
fn bd_subtract(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigDecimal(dec(args, 0)?.sub(dec(args, 1)?)?))
}
fn bd_multiply(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigDecimal(dec(args, 0)?.mul(dec(args, 1)?)?))
}
fn bd_divide(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigDecimal(dec(args, 0)?.div(dec(args, 1)?)?))
}
fn bd_negate(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigDecimal(dec(args, 0)?.neg()))
}
fn bd_compare_to(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(dec(args, 0)?.compare(dec(args, 1)?)? as i32))
}
fn bd_int_value(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(dec(args, 0)?.to_i64() as i32))
}
fn bd_long_value(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Long(dec(args, 0)?.to_i64()))
}
fn bd_double_value(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Double(dec(args, 0)?.to_f64()))
}

fn bi_value_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigInteger(BigInt::from_i64(long(args, 0)?)))
}
fn bi_new(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigInteger(BigInt::parse(&text(args, 0)?)?))
}
fn bi_add(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigInteger(bigint(args, 0)?.add(bigint(args, 1)?)?))
}
fn bi_subtract(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigInteger(bigint(args, 0)?.sub(bigint(args, 1)?)?))
}
fn bi_multiply(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigInteger(bigint(args, 0)?.mul(bigint(args, 1)?)?))
}
fn bi_divide(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigInteger(bigint(args, 0)?.div(bigint(args, 1)?)?))
}
fn bi_negate(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::BigInteger(bigint(args, 0)?.neg()))
}
fn bi_compare_to(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(bigint(args, 0)?.0.cmp(&bigint(args, 1)?.0) as i32))
}

// ─── Collections ─────────────────────────────────────────────────────────

fn map_get(args: &[Value]) -> Result<Value, EvaluationError> {
    let map = arg(args, 0)?.as_map()?;
    let key = arg(args, 1)?.to_display_string();
    Ok(map.read().get(&key).cloned().unwrap_or(Value::Null))
}
fn map_put(args: &[Value]) -> Result<Value, EvaluationError> {
    let map = arg(args, 0)?.as_map()?;
    let key = arg(args, 1)?.to_display_string();
    let value = arg(args, 2)?.clone();
    Ok(map.write().insert(key, value).unwrap_or(Value::Null))
}
fn map_contains_key(args: &[Value]) -> Result<Value, EvaluationError> {
    let map = arg(args, 0)?.as_map()?;
    let key = arg(args, 1)?.to_display_string();
    Ok(Value::Bool(map.read().contains_key(&key)))
}
fn map_size(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(arg(args, 0)?.as_map()?.read().len() as i32))
}
fn map_is_empty(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(arg(args, 0)?.as_map()?.read().is_empty()))
}
fn map_remove(args: &[Value]) -> Result<Value, EvaluationError> {
    let map = arg(args, 0)?.as_map()?;
    let key = arg(args, 1)?.to_display_string();
    Ok(map.write().remove(&key).unwrap_or(Value::Null))
}
fn map_of(args: &[Value]) -> Result<Value, EvaluationError> {
    if args.len() % 2 != 0 {
        return Err(EvaluationError::Type(
            "Map.of requires an even number of arguments".to_string(),
        ));
    }
    Ok(Value::map(args.chunks(2).map(|pair| {
        (pair[0].to_display_string(), pair[1].clone())
    })))
}

fn list_get(args: &[Value]) -> Result<Value, EvaluationError> {
    let list = arg(args, 0)?.as_list()?;
    let idx = int(args, 1)?;
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
fn list_size(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Int(arg(args, 0)?.as_list()?.read().len() as i32))
}
fn list_is_empty(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(arg(args, 0)?.as_list()?.read().is_empty()))
}
fn list_contains(args: &[Value]) -> Result<Value, EvaluationError> {
    let needle = arg(args, 1)?;
    Ok(Value::Bool(
        arg(args, 0)?.as_list()?.read().iter().any(|v| v == needle),
    ))
}
fn list_add(args: &[Value]) -> Result<Value, EvaluationError> {
    arg(args, 0)?.as_list()?.write().push(arg(args, 1)?.clone());
    Ok(Value::Bool(true))
}
fn list_of(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::list(args.iter().cloned()))
}
fn array_list_new(_args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::list([]))
}
fn hash_map_new(_args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::map([]))
}

// ─── Duration ────────────────────────────────────────────────────────────

fn duration_of_days(args: &[Value]) -> Result<Value, EvaluationError> {
    Duration::try_days(long(args, 0)?)
        .map(Value::Duration)
        .ok_or_else(overflow)
}
fn duration_of_hours(args: &[Value]) -> Result<Value, EvaluationError> {
    Duration::try_hours(long(args, 0)?)
        .map(Value::Duration)
        .ok_or_else(overflow)
}
fn duration_of_minutes(args: &[Value]) -> Result<Value, EvaluationError> {
    Duration::try_minutes(long(args, 0)?)
        .map(Value::Duration)
        .ok_or_else(overflow)
}
fn duration_of_seconds(args: &[Value]) -> Result<Value, EvaluationError> {
    Duration::try_seconds(long(args, 0)?)
        .map(Value::Duration)
        .ok_or_else(overflow)
}
fn duration_of_millis(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Duration(Duration::milliseconds(long(args, 0)?)))
}

fn duration_plus(base: Duration, extra: Option<Duration>) -> Result<Value, EvaluationError> {
    extra
        .and_then(|e| base.checked_add(&e))
        .map(Value::Duration)
        .ok_or_else(overflow)
}

fn duration_plus_days(args: &[Value]) -> Result<Value, EvaluationError> {
    duration_plus(dur(args, 0)?, Duration::try_days(long(args, 1)?))
}
fn duration_plus_hours(args: &[Value]) -> Result<Value, EvaluationError> {
    duration_plus(dur(args, 0)?, Duration::try_hours(long(args, 1)?))
}
fn duration_plus_minutes(args: &[Value]) -> Result<Value, EvaluationError> {
    duration_plus(dur(args, 0)?, Duration::try_minutes(long(args, 1)?))
}
fn duration_plus_seconds(args: &[Value]) -> Result<Value, EvaluationError> {
    duration_plus(dur(args, 0)?, Duration::try_seconds(long(args, 1)?))
}
fn duration_plus_millis(args: &[Value]) -> Result<Value, EvaluationError> {
    duration_plus(
        dur(args, 0)?,
        Some(Duration::milliseconds(long(args, 1)?)),
    )
}
fn duration_to_millis(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Long(dur(args, 0)?.num_milliseconds()))
}

// ─── ruse.Rt ─────────────────────────────────────────────────────────────

fn rt_put_map(args: &[Value]) -> Result<Value, EvaluationError> {
    map_put(args)?;
    Ok(arg(args, 2)?.clone())
}
fn rt_set_list(args: &[Value]) -> Result<Value, EvaluationError> {
    let list = arg(args, 0)?.as_list()?;
    let idx = int(args, 1)?;
    let value = arg(args, 2)?.clone();
    let mut guard = list.write();
    let len = guard.len();
    let slot = guard
        .get_mut(idx.max(0) as usize)
        .filter(|_| idx >= 0)
        .ok_or(EvaluationError::IndexOutOfBounds {
            index: idx as i64,
            len,
        })?;
    *slot = value.clone();
    Ok(value)
}
fn rt_concat(args: &[Value]) -> Result<Value, EvaluationError> {
    let mut s = arg(args, 0)?.to_display_string();
    s.push_str(&arg(args, 1)?.to_display_string());
    Ok(Value::str(s))
}
fn rt_str(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::str(arg(args, 0)?.to_display_string()))
}

// ─── Registration ────────────────────────────────────────────────────────

/// Register every built-in class into `registry`.
pub fn register_builtins(registry: &TypeRegistry) {
    registry.register(
        ClassInfo::new("java.lang.Object")
            .with_method(method("toString", &[], string(), object_to_string))
            .with_method(method("equals", &[obj()], prim(P::Boolean), object_equals)),
    );

    registry.register(ClassInfo::new("java.lang.Void"));

    let d = prim(P::Double);
    registry.register(
        ClassInfo::new("java.lang.Math")
            .with_method(static_method("abs", &[d.clone()], d.clone(), math_abs))
            .with_method(static_method("max", &[d.clone(), d.clone()], d.clone(), math_max))
            .with_method(static_method("min", &[d.clone(), d.clone()], d.clone(), math_min))
            .with_method(static_method("pow", &[d.clone(), d.clone()], d.clone(), math_pow))
            .with_method(static_method("sqrt", &[d.clone()], d.clone(), math_sqrt))
            .with_method(static_method("floor", &[d.clone()], d.clone(), math_floor))
            .with_method(static_method("ceil", &[d.clone()], d.clone(), math_ceil))
            .with_method(static_method("sin", &[d.clone()], d.clone(), math_sin))
            .with_method(static_method("cos", &[d.clone()], d.clone(), math_cos))
            .with_method(static_method("tan", &[d.clone()], d.clone(), math_tan))
            .with_method(static_method("exp", &[d.clone()], d.clone(), math_exp))
            .with_method(static_method("log", &[d.clone()], d.clone(), math_log))
            .with_method(static_method("signum", &[d.clone()], d, math_signum)),
    );

    // Boxed primitive wrappers: valueOf factory + primitive extraction.
    let boxes: &[(P, NativePair)] = &[
        (P::Int, (integer_value_of, unbox_int)),
        (P::Long, (long_value_of, unbox_long)),
        (P::Short, (short_value_of, unbox_short)),
        (P::Byte, (byte_value_of, unbox_byte)),
        (P::Char, (char_value_of, unbox_char)),
        (P::Boolean, (boolean_value_of, unbox_bool)),
        (P::Float, (float_value_of, unbox_float)),
        (P::Double, (double_value_of, unbox_double)),
    ];
    for (tag, (value_of, unbox)) in boxes {
        registry.register(
            ClassInfo::new(tag.boxed_name())
                .with_method(static_method("valueOf", &[prim(*tag)], boxed(*tag), *value_of))
                .with_method(method(tag.unbox_method(), &[], prim(*tag), *unbox))
                .with_method(method("toString", &[], string(), object_to_string)),
        );
    }

    registry.register(
        ClassInfo::new("java.lang.String")
            .with_method(method("length", &[], prim(P::Int), string_length))
            .with_method(method("isEmpty", &[], prim(P::Boolean), string_is_empty))
            .with_method(method("concat", &[string()], string(), string_concat))
            .with_method(method("toUpperCase", &[], string(), string_to_upper))
            .with_method(method("toLowerCase", &[], string(), string_to_lower))
            .with_method(method("trim", &[], string(), string_trim))
            .with_method(method("startsWith", &[string()], prim(P::Boolean), string_starts_with))
            .with_method(method("endsWith", &[string()], prim(P::Boolean), string_ends_with))
            .with_method(method("contains", &[string()], prim(P::Boolean), string_contains))
            .with_method(method("indexOf", &[string()], prim(P::Int), string_index_of))
            .with_method(method("charAt", &[prim(P::Int)], prim(P::Char), string_char_at))
            .with_method(method("substring", &[prim(P::Int)], string(), string_substring_from))
            .with_method(method(
                "substring",
                &[prim(P::Int), prim(P::Int)],
                string(),
                string_substring_range,
            ))
            .with_method(method("equals", &[obj()], prim(P::Boolean), object_equals))
            .with_method(method("toString", &[], string(), object_to_string)),
    );

    registry.register(
        ClassInfo::new("java.math.BigDecimal")
            .with_method(static_method("valueOf", &[prim(P::Long)], big_dec(), bd_value_of))
            .with_method(static_method("<init>", &[string()], big_dec(), bd_new))
            .with_method(method("add", &[big_dec()], big_dec(), bd_add))
            .with_method(method("subtract", &[big_dec()], big_dec(), bd_subtract))
            .with_method(method("multiply", &[big_dec()], big_dec(), bd_multiply))
            .with_method(method("divide", &[big_dec()], big_dec(), bd_divide))
            .with_method(method("negate", &[], big_dec(), bd_negate))
            .with_method(method("compareTo", &[big_dec()], prim(P::Int), bd_compare_to))
            .with_method(method("intValue", &[], prim(P::Int), bd_int_value))
            .with_method(method("longValue", &[], prim(P::Long), bd_long_value))
            .with_method(method("doubleValue", &[], prim(P::Double), bd_double_value))
            .with_method(method("toString", &[], string(), object_to_string)),
    );

    registry.register(
        ClassInfo::new("java.math.BigInteger")
            .with_method(static_method("valueOf", &[prim(P::Long)], big_int(), bi_value_of))
            .with_method(static_method("<init>", &[string()], big_int(), bi_new))
            .with_method(method("add", &[big_int()], big_int(), bi_add))
            .with_method(method("subtract", &[big_int()], big_int(), bi_subtract))
            .with_method(method("multiply", &[big_int()], big_int(), bi_multiply))
            .with_method(method("divide", &[big_int()], big_int(), bi_divide))
            .with_method(method("negate", &[], big_int(), bi_negate))
            .with_method(method("compareTo", &[big_int()], prim(P::Int), bi_compare_to))
            .with_method(method("toString", &[], string(), object_to_string)),
    );

    registry.register(
        ClassInfo::interface("java.util.Map")
            .with_method(method("get", &[obj()], obj(), map_get))
            .with_method(method("put", &[obj(), obj()], obj(), map_put))
            .with_method(method("containsKey", &[obj()], prim(P::Boolean), map_contains_key))
            .with_method(method("size", &[], prim(P::Int), map_size))
            .with_method(method("isEmpty", &[], prim(P::Boolean), map_is_empty))
            .with_method(method("remove", &[obj()], obj(), map_remove))
            .with_method(varargs_static("of", map_ty(), map_of)),
    );

    registry.register(
        ClassInfo::interface("java.util.List")
            .with_method(method("get", &[prim(P::Int)], obj(), list_get))
            .with_method(method("size", &[], prim(P::Int), list_size))
            .with_method(method("isEmpty", &[], prim(P::Boolean), list_is_empty))
            .with_method(method("contains", &[obj()], prim(P::Boolean), list_contains))
            .with_method(method("add", &[obj()], prim(P::Boolean), list_add))
            .with_method(varargs_static("of", list_ty(), list_of)),
    );

    registry.register(
        ClassInfo::new("java.util.ArrayList")
            .with_method(static_method("<init>", &[], list_ty(), array_list_new)),
    );
    registry.register(
        ClassInfo::new("java.util.HashMap")
            .with_method(static_method("<init>", &[], map_ty(), hash_map_new)),
    );

    let j = prim(P::Long);
    registry.register(
        ClassInfo::new("java.time.Duration")
            .with_method(static_method("ofDays", &[j.clone()], duration(), duration_of_days))
            .with_method(static_method("ofHours", &[j.clone()], duration(), duration_of_hours))
            .with_method(static_method("ofMinutes", &[j.clone()], duration(), duration_of_minutes))
            .with_method(static_method("ofSeconds", &[j.clone()], duration(), duration_of_seconds))
            .with_method(static_method("ofMillis", &[j.clone()], duration(), duration_of_millis))
            .with_method(method("plusDays", &[j.clone()], duration(), duration_plus_days))
            .with_method(method("plusHours", &[j.clone()], duration(), duration_plus_hours))
            .with_method(method("plusMinutes", &[j.clone()], duration(), duration_plus_minutes))
            .with_method(method("plusSeconds", &[j.clone()], duration(), duration_plus_seconds))
            .with_method(method("plusMillis", &[j.clone()], duration(), duration_plus_millis))
            .with_method(method("toMillis", &[], j, duration_to_millis))
            .with_method(method("toString", &[], string(), object_to_string)),
    );

    registry.register(
        ClassInfo::new("ruse.Rt")
            .with_method(static_method(
                "putMap",
                &[map_ty(), string(), obj()],
                obj(),
                rt_put_map,
            ))
            .with_method(static_method(
                "setList",
                &[list_ty(), prim(P::Int), obj()],
                obj(),
                rt_set_list,
            ))
            .with_method(static_method("concat", &[obj(), obj()], string(), rt_concat))
            .with_method(static_method("str", &[obj()], string(), rt_str)),
    );
}

type NativePair = (
    fn(&[Value]) -> Result<Value, EvaluationError>,
    fn(&[Value]) -> Result<Value, EvaluationError>,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_well_known_classes() {
        let registry = TypeRegistry::with_builtins();
        for fqcn in [
            "java.lang.Object",
            "java.lang.Math",
            "java.lang.Integer",
            "java.lang.Boolean",
            "java.lang.String",
            "java.math.BigDecimal",
            "java.math.BigInteger",
            "java.util.Map",
            "java.util.List",
            "java.time.Duration",
            "ruse.Rt",
        ] {
            assert!(registry.is_registered(fqcn), "{fqcn} missing");
        }
    }

    #[test]
    fn map_get_and_rt_put_map() {
        let ctx = Value::map([("a".to_string(), Value::Int(1))]);
        let got = map_get(&[ctx.clone(), Value::str("a")]).unwrap();
        assert_eq!(got, Value::Int(1));

        let put = rt_put_map(&[ctx.clone(), Value::str("a"), Value::Int(9)]).unwrap();
        assert_eq!(put, Value::Int(9));
        assert_eq!(map_get(&[ctx, Value::str("a")]).unwrap(), Value::Int(9));
    }

    #[test]
    fn rt_set_list_bounds_checked() {
        let list = Value::list([Value::Int(1), Value::Int(2)]);
        rt_set_list(&[list.clone(), Value::Int(1), Value::Int(5)]).unwrap();
        assert_eq!(
            list_get(&[list.clone(), Value::Int(1)]).unwrap(),
            Value::Int(5)
        );
        assert!(matches!(
            rt_set_list(&[list, Value::Int(7), Value::Int(0)]),
            Err(EvaluationError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn concat_uses_display_strings() {
        let s = rt_concat(&[Value::str("Alice"), Value::Bool(true)]).unwrap();
        assert_eq!(s, Value::str("Alicetrue"));
        let with_null = rt_concat(&[Value::Null, Value::str("x")]).unwrap();
        assert_eq!(with_null, Value::str("nullx"));
    }

    #[test]
    fn substring_overloads_resolve_by_arity() {
        let registry = TypeRegistry::with_builtins();
        let one = registry.find_method("java.lang.String", "substring", 1).unwrap();
        let two = registry.find_method("java.lang.String", "substring", 2).unwrap();
        assert_eq!(one.descriptor(1), "(I)Ljava/lang/String;");
        assert_eq!(two.descriptor(2), "(II)Ljava/lang/String;");
    }

    #[test]
    fn duration_chain_matches_temporal_literal() {
        // 12h30m == ofHours(12).plusMinutes(30)
        let d = duration_of_hours(&[Value::Long(12)]).unwrap();
        let d = duration_plus_minutes(&[d, Value::Long(30)]).unwrap();
        assert_eq!(
            duration_to_millis(&[d]).unwrap(),
            Value::Long((12 * 60 + 30) * 60 * 1000)
        );
    }

    #[test]
    fn map_of_pairs() {
        let m = map_of(&[Value::str("a"), Value::Int(1), Value::str("b"), Value::Int(2)]).unwrap();
        assert_eq!(map_size(&[m.clone()]).unwrap(), Value::Int(2));
        assert!(map_of(&[Value::str("odd")]).is_err());
    }
}
