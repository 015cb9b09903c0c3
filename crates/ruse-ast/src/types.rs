//! Static type descriptors for the expression IR.
//!
//! The type system mirrors the generated-code target: eight primitive tags,
//! reference types addressed by fully qualified class name, and parameterized
//! references whose generic arguments are retained only as source text (the
//! direct emitter works on the erased raw type; the generic text exists for
//! the fallback path's pretty-printer).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTag {
    Int,
    Long,
    Short,
    Byte,
    Char,
    Float,
    Double,
    Boolean,
}

impl PrimitiveTag {
    /// Source-level keyword for this primitive.
    pub fn keyword(self) -> &'static str {
        match self {
            PrimitiveTag::Int => "int",
            PrimitiveTag::Long => "long",
            PrimitiveTag::Short => "short",
            PrimitiveTag::Byte => "byte",
            PrimitiveTag::Char => "char",
            PrimitiveTag::Float => "float",
            PrimitiveTag::Double => "double",
            PrimitiveTag::Boolean => "boolean",
        }
    }

    /// Parse a primitive keyword.
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "int" => PrimitiveTag::Int,
            "long" => PrimitiveTag::Long,
            "short" => PrimitiveTag::Short,
            "byte" => PrimitiveTag::Byte,
            "char" => PrimitiveTag::Char,
            "float" => PrimitiveTag::Float,
            "double" => PrimitiveTag::Double,
            "boolean" => PrimitiveTag::Boolean,
            _ => return None,
        })
    }

    /// Single-letter descriptor used in method signatures.
    pub fn descriptor(self) -> &'static str {
        match self {
            PrimitiveTag::Int => "I",
            PrimitiveTag::Long => "J",
            PrimitiveTag::Short => "S",
            PrimitiveTag::Byte => "B",
            PrimitiveTag::Char => "C",
            PrimitiveTag::Float => "F",
            PrimitiveTag::Double => "D",
            PrimitiveTag::Boolean => "Z",
        }
    }

    /// Fully qualified name of the boxed wrapper class.
    pub fn boxed_name(self) -> &'static str {
        match self {
            PrimitiveTag::Int => "java.lang.Integer",
            PrimitiveTag::Long => "java.lang.Long",
            PrimitiveTag::Short => "java.lang.Short",
            PrimitiveTag::Byte => "java.lang.Byte",
            PrimitiveTag::Char => "java.lang.Character",
            PrimitiveTag::Float => "java.lang.Float",
            PrimitiveTag::Double => "java.lang.Double",
            PrimitiveTag::Boolean => "java.lang.Boolean",
        }
    }

    /// Name of the wrapper's primitive-extraction method (`intValue` etc.).
    pub fn unbox_method(self) -> &'static str {
        match self {
            PrimitiveTag::Int => "intValue",
            PrimitiveTag::Long => "longValue",
            PrimitiveTag::Short => "shortValue",
            PrimitiveTag::Byte => "byteValue",
            PrimitiveTag::Char => "charValue",
            PrimitiveTag::Float => "floatValue",
            PrimitiveTag::Double => "doubleValue",
            PrimitiveTag::Boolean => "booleanValue",
        }
    }

    /// Primitive tag for a boxed wrapper class name, if it is one.
    pub fn from_boxed_name(fqcn: &str) -> Option<Self> {
        Some(match fqcn {
            "java.lang.Integer" => PrimitiveTag::Int,
            "java.lang.Long" => PrimitiveTag::Long,
            "java.lang.Short" => PrimitiveTag::Short,
            "java.lang.Byte" => PrimitiveTag::Byte,
            "java.lang.Character" => PrimitiveTag::Char,
            "java.lang.Float" => PrimitiveTag::Float,
            "java.lang.Double" => PrimitiveTag::Double,
            "java.lang.Boolean" => PrimitiveTag::Boolean,
            _ => return None,
        })
    }

    /// Computational kind this primitive occupies on the operand stack.
    pub fn value_kind(self) -> ValueKind {
        match self {
            PrimitiveTag::Long => ValueKind::Long,
            PrimitiveTag::Float => ValueKind::Float,
            PrimitiveTag::Double => ValueKind::Double,
            // byte, short, char and boolean are int-kind on the stack
            _ => ValueKind::Int,
        }
    }

    /// Number of local slots a value of this type occupies.
    pub fn slot_size(self) -> u16 {
        match self {
            PrimitiveTag::Long | PrimitiveTag::Double => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for PrimitiveTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Computational kind of a value on the operand stack.
///
/// The sub-int primitives widen to `Int` at load, exactly like the target
/// machine; everything non-primitive is `Reference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// Whether this is a numeric primitive kind.
    pub fn is_numeric(self) -> bool {
        !matches!(self, ValueKind::Reference)
    }

    /// Number of operand-stack/local slots this kind occupies.
    pub fn slot_size(self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    /// Widen two numeric kinds using the `double > float > long > int` lattice.
    ///
    /// Returns `None` when either side is a reference.
    pub fn widen(a: ValueKind, b: ValueKind) -> Option<ValueKind> {
        use ValueKind::*;
        if a == Reference || b == Reference {
            return None;
        }
        Some(match (a, b) {
            (Double, _) | (_, Double) => Double,
            (Float, _) | (_, Float) => Float,
            (Long, _) | (_, Long) => Long,
            _ => Int,
        })
    }

    /// Opcode prefix letter (`I`, `L`, `F`, `D`, `A`) used in rendered names.
    pub fn prefix(self) -> char {
        match self {
            ValueKind::Int => 'I',
            ValueKind::Long => 'L',
            ValueKind::Float => 'F',
            ValueKind::Double => 'D',
            ValueKind::Reference => 'A',
        }
    }
}

/// Static type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// Primitive type.
    Primitive(PrimitiveTag),
    /// Reference type by fully qualified class name.
    Reference(String),
    /// Parameterized reference. The raw type drives emission; the generic
    /// argument text is carried verbatim for the fallback path only.
    Parameterized { raw: String, generics: String },
    /// The void return pseudo-type. Only valid as a method return.
    Void,
}

impl TypeDescriptor {
    pub fn primitive(tag: PrimitiveTag) -> Self {
        TypeDescriptor::Primitive(tag)
    }

    pub fn reference(fqcn: impl Into<String>) -> Self {
        TypeDescriptor::Reference(fqcn.into())
    }

    /// The common top reference type.
    pub fn object() -> Self {
        TypeDescriptor::reference("java.lang.Object")
    }

    pub fn string() -> Self {
        TypeDescriptor::reference("java.lang.String")
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeDescriptor::Primitive(_))
    }

    pub fn primitive_tag(&self) -> Option<PrimitiveTag> {
        match self {
            TypeDescriptor::Primitive(tag) => Some(*tag),
            _ => None,
        }
    }

    /// Raw class name for reference types (erasing generics).
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Reference(fqcn) => Some(fqcn),
            TypeDescriptor::Parameterized { raw, .. } => Some(raw),
            TypeDescriptor::Primitive(_) | TypeDescriptor::Void => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Void)
    }

    /// True for `java.lang.Object`.
    pub fn is_object(&self) -> bool {
        self.class_name() == Some("java.lang.Object")
    }

    /// True when this is the fqcn of a boxed primitive wrapper.
    pub fn boxed_tag(&self) -> Option<PrimitiveTag> {
        self.class_name().and_then(PrimitiveTag::from_boxed_name)
    }

    /// Boxed counterpart: primitives box, references stay as they are.
    pub fn boxed(&self) -> TypeDescriptor {
        match self {
            TypeDescriptor::Primitive(tag) => TypeDescriptor::reference(tag.boxed_name()),
            other => other.clone(),
        }
    }

    /// Computational kind a value of this type has on the stack.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            TypeDescriptor::Primitive(tag) => tag.value_kind(),
            _ => ValueKind::Reference,
        }
    }

    /// Number of local slots a value of this type occupies.
    pub fn slot_size(&self) -> u16 {
        match self {
            TypeDescriptor::Primitive(tag) => tag.slot_size(),
            _ => 1,
        }
    }

    /// Field descriptor form: `I`, `J`, `Ljava/lang/String;` …
    pub fn descriptor(&self) -> String {
        match self {
            TypeDescriptor::Primitive(tag) => tag.descriptor().to_string(),
            TypeDescriptor::Reference(fqcn) => format!("L{};", fqcn.replace('.', "/")),
            TypeDescriptor::Parameterized { raw, .. } => format!("L{};", raw.replace('.', "/")),
            TypeDescriptor::Void => "V".to_string(),
        }
    }

    /// Source-level rendering (used by the pretty-printer).
    pub fn source_name(&self) -> String {
        match self {
            TypeDescriptor::Primitive(tag) => tag.keyword().to_string(),
            TypeDescriptor::Reference(fqcn) => fqcn.clone(),
            TypeDescriptor::Parameterized { raw, generics } => format!("{raw}{generics}"),
            TypeDescriptor::Void => "void".to_string(),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_name())
    }
}

/// Render a method descriptor from parameter and return descriptors:
/// `(Ljava/util/Map;)Ljava/lang/Boolean;`.
pub fn method_descriptor(params: &[TypeDescriptor], ret: &TypeDescriptor) -> String {
    let mut out = String::with_capacity(16);
    out.push('(');
    for p in params {
        out.push_str(&p.descriptor());
    }
    out.push(')');
    out.push_str(&ret.descriptor());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_lattice() {
        use ValueKind::*;
        assert_eq!(ValueKind::widen(Int, Int), Some(Int));
        assert_eq!(ValueKind::widen(Int, Long), Some(Long));
        assert_eq!(ValueKind::widen(Long, Float), Some(Float));
        assert_eq!(ValueKind::widen(Float, Double), Some(Double));
        assert_eq!(ValueKind::widen(Int, Double), Some(Double));
        assert_eq!(ValueKind::widen(Double, Int), Some(Double));
        assert_eq!(ValueKind::widen(Reference, Int), None);
    }

    #[test]
    fn sub_int_primitives_are_int_kind() {
        for tag in [
            PrimitiveTag::Short,
            PrimitiveTag::Byte,
            PrimitiveTag::Char,
            PrimitiveTag::Boolean,
        ] {
            assert_eq!(tag.value_kind(), ValueKind::Int);
        }
        assert_eq!(PrimitiveTag::Long.value_kind(), ValueKind::Long);
    }

    #[test]
    fn wide_primitives_take_two_slots() {
        assert_eq!(TypeDescriptor::primitive(PrimitiveTag::Long).slot_size(), 2);
        assert_eq!(
            TypeDescriptor::primitive(PrimitiveTag::Double).slot_size(),
            2
        );
        assert_eq!(TypeDescriptor::primitive(PrimitiveTag::Int).slot_size(), 1);
        assert_eq!(TypeDescriptor::string().slot_size(), 1);
    }

    #[test]
    fn descriptors() {
        assert_eq!(TypeDescriptor::primitive(PrimitiveTag::Int).descriptor(), "I");
        assert_eq!(
            TypeDescriptor::string().descriptor(),
            "Ljava/lang/String;"
        );
        assert_eq!(
            method_descriptor(
                &[TypeDescriptor::reference("java.util.Map")],
                &TypeDescriptor::reference("java.lang.Boolean")
            ),
            "(Ljava/util/Map;)Ljava/lang/Boolean;"
        );
    }

    #[test]
    fn boxing_round_trip() {
        for tag in [
            PrimitiveTag::Int,
            PrimitiveTag::Long,
            PrimitiveTag::Short,
            PrimitiveTag::Byte,
            PrimitiveTag::Char,
            PrimitiveTag::Float,
            PrimitiveTag::Double,
            PrimitiveTag::Boolean,
        ] {
            assert_eq!(PrimitiveTag::from_boxed_name(tag.boxed_name()), Some(tag));
        }
        assert_eq!(PrimitiveTag::from_boxed_name("java.lang.String"), None);
    }

    #[test]
    fn parameterized_erases_for_descriptor() {
        let ty = TypeDescriptor::Parameterized {
            raw: "java.util.List".to_string(),
            generics: "<Foo>".to_string(),
        };
        assert_eq!(ty.descriptor(), "Ljava/util/List;");
        assert_eq!(ty.source_name(), "java.util.List<Foo>");
        assert_eq!(ty.class_name(), Some("java.util.List"));
    }
}
