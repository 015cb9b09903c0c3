//! Unit sharing and registry properties across full compilations.

use ruse::{
    Declaration, Evaluator, PrimitiveTag, Ruse, TypeDescriptor, TypeRegistry, UnitRegistry, Value,
};
use std::sync::Arc;

fn int_decl(name: &str) -> Declaration {
    Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Int))
}

fn registry() -> Arc<UnitRegistry> {
    Arc::new(UnitRegistry::new(TypeRegistry::with_builtins()))
}

#[test]
fn alpha_equivalent_list_expressions_share_a_unit() {
    // LIST contexts resolve positionally, so variable names never reach
    // the emitted unit: renamed-but-identical rules collapse to one entry.
    let registry = registry();

    let first = Ruse::list(vec![int_decl("a"), int_decl("b")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("a + b")
        .registry(registry.clone())
        .compile()
        .unwrap();

    let second = Ruse::list(vec![int_decl("x"), int_decl("y")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("x + y")
        .registry(registry.clone())
        .compile()
        .unwrap();

    assert_eq!(registry.entry_count(), 1);
    assert!(Arc::ptr_eq(first.unit(), second.unit()));

    let ctx = Value::list([Value::Int(40), Value::Int(2)]);
    assert_eq!(first.eval(ctx.clone()).unwrap(), Value::Int(42));
    assert_eq!(second.eval(ctx).unwrap(), Value::Int(42));
}

#[test]
fn different_rules_stay_distinct() {
    let registry = registry();
    for source in ["a + b", "a - b", "a * b"] {
        Ruse::map(vec![int_decl("a"), int_decl("b")])
            .out(TypeDescriptor::reference("java.lang.Integer"))
            .expression(source)
            .registry(registry.clone())
            .compile()
            .unwrap();
    }
    assert_eq!(registry.entry_count(), 3);
}

#[test]
fn direct_and_fallback_units_coexist() {
    let registry = registry();

    Ruse::map(vec![int_decl("a")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("a + 1")
        .registry(registry.clone())
        .compile()
        .unwrap();

    Ruse::map(vec![int_decl("a")])
        .out(TypeDescriptor::object())
        .expression("a > 0 ? 1 : 2")
        .registry(registry.clone())
        .compile()
        .unwrap();

    assert_eq!(registry.entry_count(), 2);
}

#[test]
fn concurrent_compilations_of_one_rule_converge() {
    let registry = registry();
    let mut handles = Vec::new();

    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(std::thread::spawn(move || {
            let evaluator = Ruse::map(vec![int_decl("a"), int_decl("b")])
                .out(TypeDescriptor::reference("java.lang.Integer"))
                .expression("a + b")
                .registry(registry)
                .compile()
                .unwrap();
            let ctx = Value::map([
                ("a".to_string(), Value::Int(2)),
                ("b".to_string(), Value::Int(3)),
            ]);
            assert_eq!(evaluator.eval(ctx).unwrap(), Value::Int(5));
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.entry_count(), 1);
}

#[test]
fn lookup_finds_defined_units_by_name() {
    let registry = registry();
    Ruse::map(vec![int_decl("a")])
        .out(TypeDescriptor::reference("java.lang.Integer"))
        .expression("a")
        .class_name("NamedRule__")
        .registry(registry.clone())
        .compile()
        .unwrap();

    assert!(registry.lookup("ruse.generated.NamedRule__").is_some());
    assert!(registry.lookup("ruse.generated.Missing__").is_none());
}

#[test]
fn both_paths_agree_on_results() {
    // The fallback path must be observationally equivalent to the direct
    // emitter on the shared subset.
    let cases: &[(&str, i32, i32, Value)] = &[
        ("a + b", 10, 32, Value::Int(42)),
        ("a * b - a", 6, 7, Value::Int(36)),
        ("a % b", 17, 5, Value::Int(2)),
        ("(a & b) | 2", 12, 10, Value::Int(10)),
        ("a << 2", 3, 0, Value::Int(12)),
    ];

    for (source, a, b, expected) in cases {
        let ctx = || {
            Value::map([
                ("a".to_string(), Value::Int(*a)),
                ("b".to_string(), Value::Int(*b)),
            ])
        };

        let direct = Ruse::map(vec![int_decl("a"), int_decl("b")])
            .out(TypeDescriptor::reference("java.lang.Integer"))
            .expression(*source)
            .compile()
            .unwrap();
        assert_eq!(&direct.eval(ctx()).unwrap(), expected, "direct: {source}");

        let mut config = ruse::CompilerConfig::new();
        config.direct_emitter_enabled = false;
        let fallback = Ruse::map(vec![int_decl("a"), int_decl("b")])
            .out(TypeDescriptor::reference("java.lang.Integer"))
            .expression(*source)
            .config(config)
            .compile()
            .unwrap();
        assert_eq!(&fallback.eval(ctx()).unwrap(), expected, "fallback: {source}");
    }
}
