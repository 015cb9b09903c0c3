//! Runtime value model.
//!
//! One `Value` enum covers everything an evaluator can touch: the eight
//! primitives, strings, big numbers, durations, the two context collection
//! shapes, and user objects behind the [`Pojo`] trait. Collections are
//! shared-mutable (`Arc<RwLock<…>>`) because context write-back mutates the
//! caller's map or list in place.

use crate::bignum::{BigDec, BigInt};
use crate::error::EvaluationError;
use chrono::Duration;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A user object visible to compiled evaluators.
///
/// The compiler resolves method descriptors against the registered
/// `ClassInfo` for `class_name()`; at run time dispatch goes through
/// [`Pojo::invoke`]. Getter/setter conventions apply: property `name`
/// is read as `getName()` and written as `setName(v)`.
pub trait Pojo: Send + Sync + fmt::Debug {
    /// Fully qualified class name this object belongs to.
    fn class_name(&self) -> &str;

    /// Read a property by bean name (`name`, not `getName`).
    fn get_property(&self, name: &str) -> Option<Value>;

    /// Write a property by bean name. Returns false when unknown.
    fn set_property(&self, _name: &str, _value: Value) -> bool {
        false
    }

    /// Invoke a method by its source name (`getName`, `setAge`, …).
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, EvaluationError>;
}

/// Shared mutable map used for MAP contexts and map literals.
pub type MapRef = Arc<RwLock<HashMap<String, Value>>>;
/// Shared mutable list used for LIST contexts and list literals.
pub type ListRef = Arc<RwLock<Vec<Value>>>;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(i8),
    Char(char),
    Float(f32),
    Double(f64),
    Str(Arc<str>),
    BigDecimal(BigDec),
    BigInteger(BigInt),
    Duration(Duration),
    Map(MapRef),
    List(ListRef),
    Obj(Arc<dyn Pojo>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn map(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Map(Arc::new(RwLock::new(entries.into_iter().collect())))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn obj(pojo: impl Pojo + 'static) -> Value {
        Value::Obj(Arc::new(pojo))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Class name of this value's runtime type.
    pub fn class_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "java.lang.Boolean",
            Value::Int(_) => "java.lang.Integer",
            Value::Long(_) => "java.lang.Long",
            Value::Short(_) => "java.lang.Short",
            Value::Byte(_) => "java.lang.Byte",
            Value::Char(_) => "java.lang.Character",
            Value::Float(_) => "java.lang.Float",
            Value::Double(_) => "java.lang.Double",
            Value::Str(_) => "java.lang.String",
            Value::BigDecimal(_) => "java.math.BigDecimal",
            Value::BigInteger(_) => "java.math.BigInteger",
            Value::Duration(_) => "java.time.Duration",
            Value::Map(_) => "java.util.Map",
            Value::List(_) => "java.util.List",
            Value::Obj(p) => p.class_name(),
        }
    }

    /// Computational int, accepting the int-kind primitives.
    pub fn as_int(&self) -> Result<i32, EvaluationError> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Bool(b) => Ok(*b as i32),
            Value::Short(v) => Ok(*v as i32),
            Value::Byte(v) => Ok(*v as i32),
            Value::Char(c) => Ok(*c as i32),
            other => Err(EvaluationError::Type(format!(
                "expected int, got {}",
                other.class_name()
            ))),
        }
    }

    pub fn as_long(&self) -> Result<i64, EvaluationError> {
        match self {
            Value::Long(v) => Ok(*v),
            other => other.as_int().map(|v| v as i64).map_err(|_| {
                EvaluationError::Type(format!("expected long, got {}", other.class_name()))
            }),
        }
    }

    pub fn as_float(&self) -> Result<f32, EvaluationError> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(EvaluationError::Type(format!(
                "expected float, got {}",
                other.class_name()
            ))),
        }
    }

    pub fn as_double(&self) -> Result<f64, EvaluationError> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(EvaluationError::Type(format!(
                "expected double, got {}",
                other.class_name()
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvaluationError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(v) => Ok(*v != 0),
            other => Err(EvaluationError::Type(format!(
                "expected boolean, got {}",
                other.class_name()
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&Arc<str>, EvaluationError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(EvaluationError::Type(format!(
                "expected String, got {}",
                other.class_name()
            ))),
        }
    }

    pub fn as_map(&self) -> Result<&MapRef, EvaluationError> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(EvaluationError::Type(format!(
                "expected Map, got {}",
                other.class_name()
            ))),
        }
    }

    pub fn as_list(&self) -> Result<&ListRef, EvaluationError> {
        match self {
            Value::List(l) => Ok(l),
            other => Err(EvaluationError::Type(format!(
                "expected List, got {}",
                other.class_name()
            ))),
        }
    }

    /// Numeric view as f64, for dynamic-op promotion.
    pub fn numeric_f64(&self) -> Option<f64> {
        Some(match self {
            Value::Int(v) => *v as f64,
            Value::Long(v) => *v as f64,
            Value::Short(v) => *v as f64,
            Value::Byte(v) => *v as f64,
            Value::Char(c) => *c as u32 as f64,
            Value::Float(v) => *v as f64,
            Value::Double(v) => *v,
            Value::BigDecimal(d) => d.to_f64(),
            Value::BigInteger(i) => i.0 as f64,
            _ => return None,
        })
    }

    /// Whether this value is any numeric type.
    pub fn is_numeric(&self) -> bool {
        self.numeric_f64().is_some() && !matches!(self, Value::Char(_))
    }

    /// Reference identity (the target's `==` on references).
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Obj(a), Value::Obj(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Render the way the target's `String.valueOf` would.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::Byte(v) => v.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Float(v) => format_float(*v as f64),
            Value::Double(v) => format_float(*v),
            Value::Str(s) => s.to_string(),
            Value::BigDecimal(d) => d.to_string(),
            Value::BigInteger(i) => i.to_string(),
            Value::Duration(d) => format!("PT{}S", d.num_seconds()),
            Value::Map(m) => format!("{{{} entries}}", m.read().len()),
            Value::List(l) => format!("[{} elements]", l.read().len()),
            Value::Obj(p) => format!("{}@obj", p.class_name()),
        }
    }
}

/// Floating-point rendering with the target's always-a-decimal-point rule
/// (`1.0`, not `1`).
fn format_float(v: f64) -> String {
    if v.is_finite() && v == v.trunc() && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

// Value equality used by tests and dynamic `equals`: numeric values compare
// by value within their variant, references by content where cheap.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::BigDecimal(a), Value::BigDecimal(b)) => a == b,
            (Value::BigInteger(a), Value::BigInteger(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Obj(a), Value::Obj(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_kind_coercions() {
        assert_eq!(Value::Bool(true).as_int().unwrap(), 1);
        assert_eq!(Value::Char('A').as_int().unwrap(), 65);
        assert_eq!(Value::Short(-3).as_int().unwrap(), -3);
        assert!(Value::Double(1.0).as_int().is_err());
    }

    #[test]
    fn display_matches_target_conventions() {
        assert_eq!(Value::Double(1.0).to_display_string(), "1.0");
        assert_eq!(Value::Double(1.5).to_display_string(), "1.5");
        assert_eq!(Value::Int(42).to_display_string(), "42");
        assert_eq!(Value::Null.to_display_string(), "null");
        assert_eq!(Value::str("x").to_display_string(), "x");
    }

    #[test]
    fn reference_identity() {
        let a = Value::str("hello");
        let b = a.clone();
        let c = Value::str("hello");
        assert!(a.same_ref(&b));
        assert!(!a.same_ref(&c));
        assert_eq!(a, c); // but value equality holds
    }

    #[test]
    fn shared_map_mutation_is_visible() {
        let ctx = Value::map([("a".to_string(), Value::Int(1))]);
        let alias = ctx.clone();
        ctx.as_map()
            .unwrap()
            .write()
            .insert("a".to_string(), Value::Int(2));
        assert_eq!(
            alias.as_map().unwrap().read().get("a"),
            Some(&Value::Int(2))
        );
    }
}
