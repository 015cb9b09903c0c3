//! Expression IR (EIR) — the typed, desugared tree the emitter consumes.
//!
//! The parser produces this tree with `ty: None` everywhere; the lowering
//! pass rewrites the rule-language surface forms (null-safe access, literal
//! collections, temporal literals, modify/with blocks, inline casts) into
//! host-primitive nodes, and the resolver fills in a `TypeDescriptor` on
//! every value-producing node. Node spans always point back at the original
//! source text.
//!
//! Equality on EIR deliberately ignores spans: two trees are equal when they
//! describe the same program, wherever they were written.

use crate::ops::{AssignOp, BinaryOp, UnaryOp};
use crate::span::Span;
use crate::types::{PrimitiveTag, TypeDescriptor};
use serde::{Deserialize, Serialize};

/// Unit of a temporal-literal chunk (`12h30m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
    Millis,
}

impl TimeUnit {
    /// Suffix as written in source.
    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Days => "d",
            TimeUnit::Hours => "h",
            TimeUnit::Minutes => "m",
            TimeUnit::Seconds => "s",
            TimeUnit::Millis => "ms",
        }
    }

    /// Static factory on the duration class (`ofHours` …).
    pub fn factory(self) -> &'static str {
        match self {
            TimeUnit::Days => "ofDays",
            TimeUnit::Hours => "ofHours",
            TimeUnit::Minutes => "ofMinutes",
            TimeUnit::Seconds => "ofSeconds",
            TimeUnit::Millis => "ofMillis",
        }
    }

    /// Combinator for non-leading chunks (`plusMinutes` …).
    pub fn combinator(self) -> &'static str {
        match self {
            TimeUnit::Days => "plusDays",
            TimeUnit::Hours => "plusHours",
            TimeUnit::Minutes => "plusMinutes",
            TimeUnit::Seconds => "plusSeconds",
            TimeUnit::Millis => "plusMillis",
        }
    }

    /// Rank for the descending-order rule (`1d2h`, never `2h1d`).
    pub fn rank(self) -> u8 {
        match self {
            TimeUnit::Days => 0,
            TimeUnit::Hours => 1,
            TimeUnit::Minutes => 2,
            TimeUnit::Seconds => 3,
            TimeUnit::Millis => 4,
        }
    }
}

/// A type as written in source, before resolution.
///
/// The resolver rewrites `Named` names to fully qualified form in place and
/// replaces `Var` with the concrete inferred type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeName {
    /// Primitive keyword (`int`, `boolean` …).
    Primitive(PrimitiveTag),
    /// Class name, possibly with generic argument text retained verbatim.
    Named {
        name: String,
        generics: Option<String>,
    },
    /// `var` — type inferred from the initializer.
    Var,
}

impl TypeName {
    pub fn named(name: impl Into<String>) -> Self {
        TypeName::Named {
            name: name.into(),
            generics: None,
        }
    }

    /// The resolved descriptor, if this name has been resolved.
    ///
    /// `Named` names are considered resolved once they contain a dot (the
    /// resolver always rewrites to fully qualified form).
    pub fn descriptor(&self) -> Option<TypeDescriptor> {
        match self {
            TypeName::Primitive(tag) => Some(TypeDescriptor::Primitive(*tag)),
            TypeName::Named { name, generics } if name.contains('.') => Some(match generics {
                Some(g) => TypeDescriptor::Parameterized {
                    raw: name.clone(),
                    generics: g.clone(),
                },
                None => TypeDescriptor::Reference(name.clone()),
            }),
            _ => None,
        }
    }

    /// Source rendering.
    pub fn source_name(&self) -> String {
        match self {
            TypeName::Primitive(tag) => tag.keyword().to_string(),
            TypeName::Named { name, generics } => match generics {
                Some(g) => format!("{name}{g}"),
                None => name.clone(),
            },
            TypeName::Var => "var".to_string(),
        }
    }
}

/// An expression node. `ty` is filled by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<TypeDescriptor>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn typed(kind: ExprKind, span: Span, ty: TypeDescriptor) -> Self {
        Self {
            kind,
            span,
            ty: Some(ty),
        }
    }

    /// The name, if this is a plain variable reference (through parens).
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(n) => Some(n),
            ExprKind::Enclosed(inner) => inner.as_name(),
            _ => None,
        }
    }

    /// Flatten a `Name`/`FieldGet` chain into a dotted path (`java.lang.Math`).
    ///
    /// Returns `None` if any link is not a plain name.
    pub fn as_dotted_path(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(n) => Some(n.clone()),
            ExprKind::FieldGet { scope, field } => {
                let mut path = scope.as_dotted_path()?;
                path.push('.');
                path.push_str(field);
                Some(path)
            }
            _ => None,
        }
    }
}

// Spans and resolved types are metadata: two trees are the same program when
// their kinds match.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    // === Literals ===
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
    /// Big-decimal literal; digits kept as written (`0`, `10.25`).
    BigDecimal(String),
    /// Big-integer literal; digits kept as written.
    BigInteger(String),
    /// Temporal literal chunks, descending by unit (`12h30m`).
    Temporal(Vec<(u64, TimeUnit)>),
    /// Map literal `[k: v, …]`. Eliminated by lowering.
    MapLit(Vec<(Expr, Expr)>),
    /// List literal `[v, …]`. Eliminated by lowering.
    ListLit(Vec<Expr>),

    // === References ===
    Name(String),
    FieldGet {
        scope: Box<Expr>,
        field: String,
    },
    Call {
        /// Absent for scope-less free-function calls (a permanent fallback
        /// category — the direct emitter refuses them).
        scope: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    New {
        class: TypeName,
        args: Vec<Expr>,
    },
    Index {
        scope: Box<Expr>,
        index: Box<Expr>,
    },

    // === Operators ===
    Unary {
        op: UnaryOp,
        inner: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Cast {
        target: TypeName,
        inner: Box<Expr>,
    },
    /// Conditional expression `c ? a : b`. Also the lowered form of the
    /// null-safe operators.
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Enclosed(Box<Expr>),

    // === Surface forms eliminated by lowering ===
    NullSafeField {
        scope: Box<Expr>,
        field: String,
    },
    NullSafeCall {
        scope: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// Inline cast `x#T`.
    InlineCast {
        target: TypeName,
        inner: Box<Expr>,
    },
}

/// A statement node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl PartialEq for Stmt {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl {
        ty: TypeName,
        name: String,
        init: Option<Expr>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Empty,

    // === Surface forms eliminated by lowering ===
    Modify {
        target: Expr,
        body: Vec<Stmt>,
    },
    With {
        target: Expr,
        body: Vec<Stmt>,
    },
}

impl StmtKind {
    /// Whether control flow cannot run past this statement.
    ///
    /// Used by the emitter to elide the goto after a then-branch that
    /// returns (dead code in the emitted unit is a verifier error).
    pub fn ends_with_return(&self) -> bool {
        match self {
            StmtKind::Return(_) => true,
            StmtKind::Block(stmts) => stmts.last().is_some_and(|s| s.kind.ends_with_return()),
            StmtKind::If {
                then, otherwise, ..
            } => {
                then.kind.ends_with_return()
                    && otherwise.as_ref().is_some_and(|e| e.kind.ends_with_return())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Expr {
        Expr::new(ExprKind::Name(n.to_string()), Span::zero())
    }

    #[test]
    fn equality_ignores_spans_and_types() {
        let a = Expr::new(ExprKind::Int(1), Span::new(0, 1));
        let mut b = Expr::new(ExprKind::Int(1), Span::new(10, 11));
        b.ty = Some(TypeDescriptor::primitive(PrimitiveTag::Int));
        assert_eq!(a, b);
    }

    #[test]
    fn dotted_path_flattening() {
        let math = Expr::new(
            ExprKind::FieldGet {
                scope: Box::new(Expr::new(
                    ExprKind::FieldGet {
                        scope: Box::new(name("java")),
                        field: "lang".to_string(),
                    },
                    Span::zero(),
                )),
                field: "Math".to_string(),
            },
            Span::zero(),
        );
        assert_eq!(math.as_dotted_path().as_deref(), Some("java.lang.Math"));

        let call = Expr::new(
            ExprKind::Call {
                scope: None,
                name: "f".to_string(),
                args: vec![],
            },
            Span::zero(),
        );
        assert_eq!(call.as_dotted_path(), None);
    }

    #[test]
    fn ends_with_return_through_blocks() {
        let ret = Stmt::new(StmtKind::Return(None), Span::zero());
        let block = StmtKind::Block(vec![Stmt::new(StmtKind::Empty, Span::zero()), ret.clone()]);
        assert!(block.ends_with_return());

        let half_if = StmtKind::If {
            cond: name("c"),
            then: Box::new(ret.clone()),
            otherwise: None,
        };
        assert!(!half_if.ends_with_return());

        let full_if = StmtKind::If {
            cond: name("c"),
            then: Box::new(ret.clone()),
            otherwise: Some(Box::new(ret)),
        };
        assert!(full_if.ends_with_return());
    }

    #[test]
    fn time_unit_ordering() {
        assert!(TimeUnit::Days.rank() < TimeUnit::Hours.rank());
        assert!(TimeUnit::Seconds.rank() < TimeUnit::Millis.rank());
    }

    #[test]
    fn type_name_resolution_state() {
        assert!(TypeName::Var.descriptor().is_none());
        assert!(TypeName::named("Foo").descriptor().is_none());
        assert_eq!(
            TypeName::named("java.lang.String").descriptor(),
            Some(TypeDescriptor::string())
        );
    }
}
