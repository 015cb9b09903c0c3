//! Type registry — the emit-time introspection boundary.
//!
//! The compiler builds exact method descriptors by looking receivers up
//! here, the way the original system used runtime reflection. Lookups are
//! keyed `(class, method name, arity)` and cached in a concurrent map;
//! a miss is a hard `MethodResolutionError` upstream, never a silent
//! Object-typed descriptor.
//!
//! Built-in classes of the generated-code namespace (`java.lang.*`,
//! `java.math.*`, `java.util.*`, `java.time.*`, `ruse.Rt`) are registered by
//! [`TypeRegistry::with_builtins`]; callers register their POJO classes with
//! [`TypeRegistry::register`].

use crate::error::EvaluationError;
use crate::value::Value;
use dashmap::DashMap;
use ruse_ast::{method_descriptor, TypeDescriptor};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Native implementation of a registered method.
///
/// For instance methods `args[0]` is the receiver.
pub type NativeFn = fn(&[Value]) -> Result<Value, EvaluationError>;

/// A method signature with an optional native implementation.
#[derive(Clone)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<TypeDescriptor>,
    pub ret: TypeDescriptor,
    pub is_static: bool,
    /// Matches any arity; `params` then describes nothing and the
    /// descriptor erases to `(Object…)`.
    pub is_varargs: bool,
    pub native: Option<NativeFn>,
}

impl std::fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInfo")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("is_static", &self.is_static)
            .field("is_varargs", &self.is_varargs)
            .field("native", &self.native.is_some())
            .finish()
    }
}

impl MethodInfo {
    /// Descriptor string for this signature at a concrete arity.
    pub fn descriptor(&self, arity: usize) -> String {
        if self.is_varargs {
            let params = vec![TypeDescriptor::object(); arity];
            method_descriptor(&params, &self.ret)
        } else {
            method_descriptor(&self.params, &self.ret)
        }
    }
}

/// A registered class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub fqcn: String,
    pub is_interface: bool,
    pub methods: Vec<MethodInfo>,
}

impl ClassInfo {
    pub fn new(fqcn: impl Into<String>) -> Self {
        Self {
            fqcn: fqcn.into(),
            is_interface: false,
            methods: Vec::new(),
        }
    }

    pub fn interface(fqcn: impl Into<String>) -> Self {
        Self {
            fqcn: fqcn.into(),
            is_interface: true,
            methods: Vec::new(),
        }
    }

    pub fn simple_name(&self) -> &str {
        self.fqcn.rsplit('.').next().unwrap_or(&self.fqcn)
    }

    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }
}

/// Registry of classes visible to compiled expressions.
#[derive(Debug)]
pub struct TypeRegistry {
    classes: DashMap<String, Arc<ClassInfo>>,
    /// Method lookup cache, keyed (fqcn, name, arity).
    lookup_cache: DashMap<(String, String, u8), Option<Arc<MethodInfo>>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Empty registry (tests; callers normally want [`with_builtins`]).
    ///
    /// [`with_builtins`]: TypeRegistry::with_builtins
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
            lookup_cache: DashMap::new(),
        }
    }

    /// Registry pre-loaded with the well-known classes.
    pub fn with_builtins() -> Arc<Self> {
        let registry = Self::new();
        crate::stdlib::register_builtins(&registry);
        Arc::new(registry)
    }

    /// Register (or replace) a class. Invalidates cached lookups for it.
    pub fn register(&self, info: ClassInfo) {
        let fqcn = info.fqcn.clone();
        self.classes.insert(fqcn.clone(), Arc::new(info));
        self.lookup_cache.retain(|(class, _, _), _| *class != fqcn);
    }

    pub fn class(&self, fqcn: &str) -> Option<Arc<ClassInfo>> {
        self.classes.get(fqcn).map(|entry| entry.value().clone())
    }

    pub fn is_registered(&self, fqcn: &str) -> bool {
        self.classes.contains_key(fqcn)
    }

    /// Resolve a source-level type name against an import set and the
    /// well-known prefixes. Returns the fully qualified name.
    pub fn resolve_name(&self, name: &str, imports: &BTreeSet<String>) -> Option<String> {
        if name.contains('.') {
            return Some(name.to_string());
        }

        let dotted = format!(".{name}");
        if let Some(import) = imports.iter().find(|i| i.ends_with(&dotted)) {
            return Some(import.clone());
        }

        for prefix in ["java.lang", "java.math", "java.util", "java.time"] {
            let candidate = format!("{prefix}.{name}");
            if self.is_registered(&candidate) {
                return Some(candidate);
            }
        }

        None
    }

    /// Look up a method by `(class, name, arity)`, consulting the cache.
    ///
    /// Exact-arity signatures win over a varargs signature.
    pub fn find_method(&self, fqcn: &str, name: &str, arity: usize) -> Option<Arc<MethodInfo>> {
        let key = (
            fqcn.to_string(),
            name.to_string(),
            arity.min(u8::MAX as usize) as u8,
        );
        if let Some(cached) = self.lookup_cache.get(&key) {
            return cached.value().clone();
        }

        let found = self.class(fqcn).and_then(|class| {
            class
                .methods
                .iter()
                .find(|m| m.name == name && !m.is_varargs && m.params.len() == arity)
                .or_else(|| class.methods.iter().find(|m| m.name == name && m.is_varargs))
                .cloned()
                .map(Arc::new)
        });

        self.lookup_cache.insert(key, found.clone());
        found
    }
}

/// Helper: build an instance method entry.
pub fn method(
    name: &str,
    params: &[TypeDescriptor],
    ret: TypeDescriptor,
    native: NativeFn,
) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        params: params.to_vec(),
        ret,
        is_static: false,
        is_varargs: false,
        native: Some(native),
    }
}

/// Helper: build a static method entry.
pub fn static_method(
    name: &str,
    params: &[TypeDescriptor],
    ret: TypeDescriptor,
    native: NativeFn,
) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        params: params.to_vec(),
        ret,
        is_static: true,
        is_varargs: false,
        native: Some(native),
    }
}

/// Helper: build a varargs static method entry.
pub fn varargs_static(name: &str, ret: TypeDescriptor, native: NativeFn) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        params: Vec::new(),
        ret,
        is_static: true,
        is_varargs: true,
        native: Some(native),
    }
}

/// Helper: declare a signature without an implementation (POJO classes
/// whose dispatch goes through the `Pojo` trait).
pub fn declared(name: &str, params: &[TypeDescriptor], ret: TypeDescriptor) -> MethodInfo {
    MethodInfo {
        name: name.to_string(),
        params: params.to_vec(),
        ret,
        is_static: false,
        is_varargs: false,
        native: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruse_ast::PrimitiveTag;

    fn nop(_args: &[Value]) -> Result<Value, EvaluationError> {
        Ok(Value::Null)
    }

    #[test]
    fn register_and_find() {
        let registry = TypeRegistry::new();
        registry.register(ClassInfo::new("demo.Foo").with_method(declared(
            "getName",
            &[],
            TypeDescriptor::string(),
        )));

        let found = registry.find_method("demo.Foo", "getName", 0).unwrap();
        assert_eq!(found.ret, TypeDescriptor::string());
        assert!(registry.find_method("demo.Foo", "getName", 1).is_none());
        assert!(registry.find_method("demo.Foo", "missing", 0).is_none());
    }

    #[test]
    fn exact_arity_beats_varargs() {
        let registry = TypeRegistry::new();
        registry.register(
            ClassInfo::new("demo.Bar")
                .with_method(varargs_static("of", TypeDescriptor::object(), nop))
                .with_method(static_method(
                    "of",
                    &[TypeDescriptor::primitive(PrimitiveTag::Int)],
                    TypeDescriptor::string(),
                    nop,
                )),
        );

        let exact = registry.find_method("demo.Bar", "of", 1).unwrap();
        assert!(!exact.is_varargs);
        let fallback = registry.find_method("demo.Bar", "of", 3).unwrap();
        assert!(fallback.is_varargs);
    }

    #[test]
    fn lookup_cache_survives_repeat_queries() {
        let registry = TypeRegistry::new();
        registry.register(ClassInfo::new("demo.Foo").with_method(declared(
            "getAge",
            &[],
            TypeDescriptor::primitive(PrimitiveTag::Int),
        )));
        for _ in 0..3 {
            assert!(registry.find_method("demo.Foo", "getAge", 0).is_some());
            assert!(registry.find_method("demo.Foo", "nope", 0).is_none());
        }
    }

    #[test]
    fn reregistration_invalidates_cache() {
        let registry = TypeRegistry::new();
        registry.register(ClassInfo::new("demo.Foo"));
        assert!(registry.find_method("demo.Foo", "getName", 0).is_none());

        registry.register(ClassInfo::new("demo.Foo").with_method(declared(
            "getName",
            &[],
            TypeDescriptor::string(),
        )));
        assert!(registry.find_method("demo.Foo", "getName", 0).is_some());
    }

    #[test]
    fn name_resolution_order() {
        let registry = TypeRegistry::new();
        registry.register(ClassInfo::new("java.lang.Integer"));

        let mut imports = BTreeSet::new();
        imports.insert("demo.model.Integer".to_string());

        // fully qualified names pass through
        assert_eq!(
            registry.resolve_name("demo.Foo", &imports).as_deref(),
            Some("demo.Foo")
        );
        // imports win over well-known prefixes
        assert_eq!(
            registry.resolve_name("Integer", &imports).as_deref(),
            Some("demo.model.Integer")
        );
        // well-known prefix otherwise
        assert_eq!(
            registry.resolve_name("Integer", &BTreeSet::new()).as_deref(),
            Some("java.lang.Integer")
        );
        assert_eq!(registry.resolve_name("Missing", &BTreeSet::new()), None);
    }

    #[test]
    fn varargs_descriptor_erases_to_objects() {
        let m = varargs_static("of", TypeDescriptor::reference("java.util.List"), nop);
        assert_eq!(
            m.descriptor(2),
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/util/List;"
        );
    }
}
