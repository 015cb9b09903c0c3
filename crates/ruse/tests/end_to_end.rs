//! End-to-end scenarios: compile real expressions, run them against real
//! contexts, check results and context write-back.

use ruse::{
    Declaration, EvaluationError, Evaluator, Pojo, PrimitiveTag, Ruse, TypeDescriptor, TypeRegistry,
    UnitRegistry, Value,
};
use std::sync::Arc;

fn int_decl(name: &str) -> Declaration {
    Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Int))
}

fn bool_decl(name: &str) -> Declaration {
    Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Boolean))
}

fn registry() -> Arc<UnitRegistry> {
    Arc::new(UnitRegistry::new(TypeRegistry::with_builtins()))
}

#[test]
fn compound_predicate_over_map_context() {
    let evaluator = Ruse::map(vec![
        int_decl("influence"),
        bool_decl("atWar"),
        int_decl("stability"),
    ])
    .out(TypeDescriptor::reference("java.lang.Boolean"))
    .expression("influence > 50 && !atWar && stability > 30")
    .compile()
    .unwrap();

    let case = |influence: i32, at_war: bool, stability: i32| {
        let ctx = Value::map([
            ("influence".to_string(), Value::Int(influence)),
            ("atWar".to_string(), Value::Bool(at_war)),
            ("stability".to_string(), Value::Int(stability)),
        ]);
        evaluator.eval(ctx).unwrap()
    };

    assert_eq!(case(75, false, 50), Value::Bool(true));
    assert_eq!(case(75, true, 50), Value::Bool(false));
    assert_eq!(case(25, false, 50), Value::Bool(false));
}

#[test]
fn integer_addition_over_map_context() {
    let evaluator = Ruse::map(vec![int_decl("a"), int_decl("b")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("a + b")
        .compile()
        .unwrap();

    let ctx = Value::map([
        ("a".to_string(), Value::Int(10)),
        ("b".to_string(), Value::Int(32)),
    ]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::Int(42));
}

#[test]
fn block_with_assignments_writes_back_into_the_map() {
    let evaluator = Ruse::map(vec![int_decl("a"), int_decl("b")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .block("a = a + 1; b = b * 2; return a + b;")
        .compile()
        .unwrap();

    let ctx = Value::map([
        ("a".to_string(), Value::Int(3)),
        ("b".to_string(), Value::Int(4)),
    ]);
    let result = evaluator.eval(ctx.clone()).unwrap();
    assert_eq!(result, Value::Int(12));

    // assignments flowed back into the caller's map
    let map = ctx.as_map().unwrap().read().clone();
    assert_eq!(map.get("a"), Some(&Value::Int(4)));
    assert_eq!(map.get("b"), Some(&Value::Int(8)));
}

#[test]
fn big_decimal_block_takes_the_fallback_path() {
    // `var` infers BigDecimal from the 0B literal; the compound operator on
    // a big-number type is a permanent fallback category.
    let evaluator = Ruse::map(vec![])
        .out(TypeDescriptor::object())
        .block("var s = 0B; s += 1; s += 1; return s;")
        .compile()
        .unwrap();

    let result = evaluator.eval(Value::map([])).unwrap();
    assert_eq!(result.to_display_string(), "2");
}

#[derive(Debug)]
struct Named {
    name: String,
}

impl Pojo for Named {
    fn class_name(&self) -> &str {
        "demo.Foo"
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::str(&self.name)),
            _ => None,
        }
    }

    fn invoke(&self, method: &str, _args: &[Value]) -> Result<Value, EvaluationError> {
        match method {
            "getName" => Ok(Value::str(&self.name)),
            other => Err(EvaluationError::NoSuchMethod {
                class: self.class_name().to_string(),
                method: other.to_string(),
                arity: 0,
            }),
        }
    }
}

#[test]
fn erased_list_access_takes_the_fallback_path() {
    let evaluator = Ruse::map(vec![Declaration::new(
        "foos",
        TypeDescriptor::Parameterized {
            raw: "java.util.List".to_string(),
            generics: "<Foo>".to_string(),
        },
    )])
    .out(TypeDescriptor::string())
    .expression("foos[0].name + foos[1].name")
    .compile()
    .unwrap();

    let foos = Value::list([
        Value::obj(Named {
            name: "Alice".to_string(),
        }),
        Value::obj(Named {
            name: "Bob".to_string(),
        }),
    ]);
    let ctx = Value::map([("foos".to_string(), foos)]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::str("AliceBob"));
}

#[test]
fn identical_compilations_share_one_backing_unit() {
    let registry = registry();
    let compile_once = || {
        Ruse::map(vec![int_decl("a"), int_decl("b")])
            .out(TypeDescriptor::reference("java.lang.Integer"))
            .expression("a + b")
            .registry(registry.clone())
            .compile()
            .unwrap()
    };

    let first = compile_once();
    let second = compile_once();

    assert_eq!(registry.entry_count(), 1);
    assert!(Arc::ptr_eq(first.unit(), second.unit()));

    // both instances still evaluate independently
    let ctx = Value::map([
        ("a".to_string(), Value::Int(20)),
        ("b".to_string(), Value::Int(22)),
    ]);
    assert_eq!(first.eval(ctx.clone()).unwrap(), Value::Int(42));
    assert_eq!(second.eval(ctx).unwrap(), Value::Int(42));
}

#[derive(Debug)]
struct Person {
    age: i32,
}

impl Pojo for Person {
    fn class_name(&self) -> &str {
        "demo.Person"
    }

    fn get_property(&self, name: &str) -> Option<Value> {
        (name == "age").then(|| Value::Int(self.age))
    }

    fn invoke(&self, method: &str, _args: &[Value]) -> Result<Value, EvaluationError> {
        match method {
            "getAge" => Ok(Value::Int(self.age)),
            other => Err(EvaluationError::NoSuchMethod {
                class: self.class_name().to_string(),
                method: other.to_string(),
                arity: 0,
            }),
        }
    }
}

#[test]
fn pojo_context_resolves_through_getters() {
    let types = TypeRegistry::with_builtins();
    types.register(ruse::ClassInfo::new("demo.Person").with_method(ruse::declared(
        "getAge",
        &[],
        TypeDescriptor::primitive(PrimitiveTag::Int),
    )));
    let registry = Arc::new(UnitRegistry::new(types));

    let evaluator = Ruse::pojo(
        Declaration::new("__context", TypeDescriptor::reference("demo.Person")),
        vec![int_decl("age")],
    )
    .out(TypeDescriptor::reference("java.lang.Boolean"))
    .expression("age >= 18")
    .registry(registry)
    .compile()
    .unwrap();

    assert_eq!(
        evaluator.eval(Value::obj(Person { age: 30 })).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        evaluator.eval(Value::obj(Person { age: 12 })).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn list_context_resolves_by_position() {
    let evaluator = Ruse::list(vec![int_decl("a"), int_decl("b")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("a + b")
        .compile()
        .unwrap();

    let ctx = Value::list([Value::Int(40), Value::Int(2)]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::Int(42));
}

#[test]
fn eval_with_serves_a_declared_with_target() {
    let evaluator = Ruse::map(vec![])
        .with(Declaration::new(
            "p",
            TypeDescriptor::reference("java.util.Map"),
        ))
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("(int) (java.lang.Integer) p.get(\"x\")")
        .compile()
        .unwrap();

    let with = Value::map([("x".to_string(), Value::Int(41))]);
    assert_eq!(evaluator.eval_with(with).unwrap(), Value::Int(41));
}

#[test]
fn eval_with_is_refused_without_a_with_target() {
    let evaluator = Ruse::map(vec![int_decl("a")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("a")
        .compile()
        .unwrap();

    assert!(matches!(
        evaluator.eval_with(Value::map([])),
        Err(EvaluationError::WrongFlavor(_))
    ));
}

#[test]
fn string_concatenation_on_the_direct_path() {
    let evaluator = Ruse::map(vec![
        Declaration::new("s", TypeDescriptor::string()),
        int_decl("n"),
    ])
    .out(TypeDescriptor::string())
    .expression("s + n")
    .compile()
    .unwrap();

    let ctx = Value::map([
        ("s".to_string(), Value::str("count=")),
        ("n".to_string(), Value::Int(7)),
    ]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::str("count=7"));
}

#[test]
fn math_static_call_widens_arguments() {
    let evaluator = Ruse::map(vec![int_decl("a")])
        .out(TypeDescriptor::reference("java.lang.Double"))
        .expression("Math.abs(a)")
        .compile()
        .unwrap();

    let ctx = Value::map([("a".to_string(), Value::Int(-5))]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::Double(5.0));
}

#[test]
fn temporal_literal_builds_a_duration() {
    let evaluator = Ruse::map(vec![])
        .out(TypeDescriptor::reference("java.time.Duration"))
        .expression("12h30m")
        .compile()
        .unwrap();

    let result = evaluator.eval(Value::map([])).unwrap();
    match result {
        Value::Duration(d) => assert_eq!(d.num_minutes(), 12 * 60 + 30),
        other => panic!("expected Duration, got {other:?}"),
    }
}

#[test]
fn map_literal_lowers_to_a_factory() {
    let evaluator = Ruse::map(vec![])
        .out(TypeDescriptor::reference("java.util.Map"))
        .expression(r#"[name: "Ada", age: 36]"#)
        .compile()
        .unwrap();

    let result = evaluator.eval(Value::map([])).unwrap();
    let map = result.as_map().unwrap().read().clone();
    assert_eq!(map.get("name"), Some(&Value::str("Ada")));
    assert_eq!(map.get("age"), Some(&Value::Int(36)));
}

#[test]
fn null_safe_access_short_circuits_on_null() {
    let evaluator = Ruse::map(vec![Declaration::new("s", TypeDescriptor::string())])
        .out(TypeDescriptor::object())
        .expression("s!.length()")
        .compile()
        .unwrap();

    let null_ctx = Value::map([("s".to_string(), Value::Null)]);
    assert_eq!(evaluator.eval(null_ctx).unwrap(), Value::Null);

    let ctx = Value::map([("s".to_string(), Value::str("four"))]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::Int(4));
}

#[test]
fn modify_block_mutates_and_writes_back() {
    let evaluator = Ruse::map(vec![Declaration::new(
        "p",
        TypeDescriptor::reference("java.util.Map"),
    )])
    .out(TypeDescriptor::object())
    .block("modify (p) { age = age + 1; }")
    .compile()
    .unwrap();

    let person = Value::map([("age".to_string(), Value::Int(41))]);
    let ctx = Value::map([("p".to_string(), person.clone())]);
    evaluator.eval(ctx).unwrap();

    assert_eq!(
        person.as_map().unwrap().read().get("age"),
        Some(&Value::Int(42))
    );
}
