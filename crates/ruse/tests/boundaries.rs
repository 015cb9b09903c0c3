//! Boundary behaviors: numeric edges, NaN, null, and error surfaces.

use ruse::{
    Declaration, Error, EvaluationError, Evaluator, PrimitiveTag, Ruse, TypeDescriptor, Value,
};

fn int_decl(name: &str) -> Declaration {
    Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Int))
}

fn double_decl(name: &str) -> Declaration {
    Declaration::new(name, TypeDescriptor::primitive(PrimitiveTag::Double))
}

fn eval_ints(source: &str, pairs: &[(&str, i32)], out: TypeDescriptor) -> Result<Value, EvaluationError> {
    let decls = pairs.iter().map(|(n, _)| int_decl(n)).collect();
    let evaluator = Ruse::map(decls)
        .out(out)
        .expression(source)
        .compile()
        .unwrap();
    let ctx = Value::map(
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), Value::Int(*v))),
    );
    evaluator.eval(ctx)
}

#[test]
fn integer_overflow_wraps() {
    let result = eval_ints(
        "a + b",
        &[("a", i32::MAX), ("b", 1)],
        TypeDescriptor::reference("java.lang.Integer"),
    )
    .unwrap();
    assert_eq!(result, Value::Int(i32::MIN));
}

#[test]
fn integer_division_by_zero_raises() {
    let err = eval_ints(
        "a / b",
        &[("a", 1), ("b", 0)],
        TypeDescriptor::reference("java.lang.Integer"),
    )
    .unwrap_err();
    assert!(matches!(err, EvaluationError::DivisionByZero));
}

#[test]
fn double_division_by_zero_is_signed_infinity() {
    let evaluator = Ruse::map(vec![double_decl("d")])
        .out(TypeDescriptor::reference("java.lang.Double"))
        .expression("d / 0.0")
        .compile()
        .unwrap();

    let at = |d: f64| {
        evaluator
            .eval(Value::map([("d".to_string(), Value::Double(d))]))
            .unwrap()
    };
    assert_eq!(at(1.0), Value::Double(f64::INFINITY));
    assert_eq!(at(-1.0), Value::Double(f64::NEG_INFINITY));
    match at(0.0) {
        Value::Double(v) => assert!(v.is_nan()),
        other => panic!("expected NaN, got {other:?}"),
    }
}

#[test]
fn nan_ordered_comparisons_are_false() {
    for source in ["d < 1.0", "d <= 1.0", "d > 1.0", "d >= 1.0", "d == d"] {
        let evaluator = Ruse::map(vec![double_decl("d")])
            .out(TypeDescriptor::reference("java.lang.Boolean"))
            .expression(source)
            .compile()
            .unwrap();
        let result = evaluator
            .eval(Value::map([("d".to_string(), Value::Double(f64::NAN))]))
            .unwrap();
        assert_eq!(result, Value::Bool(false), "{source}");
    }

    let evaluator = Ruse::map(vec![double_decl("d")])
        .out(TypeDescriptor::reference("java.lang.Boolean"))
        .expression("d != d")
        .compile()
        .unwrap();
    let result = evaluator
        .eval(Value::map([("d".to_string(), Value::Double(f64::NAN))]))
        .unwrap();
    assert_eq!(result, Value::Bool(true));
}

#[test]
fn null_comparisons_use_reference_semantics() {
    let evaluator = Ruse::map(vec![Declaration::new("s", TypeDescriptor::string())])
        .out(TypeDescriptor::reference("java.lang.Boolean"))
        .expression("s == null")
        .compile()
        .unwrap();

    let null_ctx = Value::map([("s".to_string(), Value::Null)]);
    assert_eq!(evaluator.eval(null_ctx).unwrap(), Value::Bool(true));

    let ctx = Value::map([("s".to_string(), Value::str("x"))]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::Bool(false));
}

#[test]
fn reference_equality_is_identity() {
    let evaluator = Ruse::map(vec![
        Declaration::new("a", TypeDescriptor::object()),
        Declaration::new("b", TypeDescriptor::object()),
    ])
    .out(TypeDescriptor::reference("java.lang.Boolean"))
    .expression("a == b")
    .compile()
    .unwrap();

    let shared = Value::str("same");
    let same = Value::map([
        ("a".to_string(), shared.clone()),
        ("b".to_string(), shared),
    ]);
    assert_eq!(evaluator.eval(same).unwrap(), Value::Bool(true));

    // equal contents, distinct references
    let distinct = Value::map([
        ("a".to_string(), Value::str("same")),
        ("b".to_string(), Value::str("same")),
    ]);
    assert_eq!(evaluator.eval(distinct).unwrap(), Value::Bool(false));
}

#[test]
fn short_circuit_skips_the_right_operand() {
    // b / 0 would raise; && must not evaluate it when a is false
    let result = eval_ints(
        "a > 0 && b / 0 > 0",
        &[("a", -1), ("b", 1)],
        TypeDescriptor::reference("java.lang.Boolean"),
    )
    .unwrap();
    assert_eq!(result, Value::Bool(false));

    let err = eval_ints(
        "a > 0 && b / 0 > 0",
        &[("a", 1), ("b", 1)],
        TypeDescriptor::reference("java.lang.Boolean"),
    )
    .unwrap_err();
    assert!(matches!(err, EvaluationError::DivisionByZero));
}

#[test]
fn long_comparison_and_shift_semantics() {
    let evaluator = Ruse::map(vec![Declaration::new(
        "x",
        TypeDescriptor::primitive(PrimitiveTag::Long),
    )])
    .out(TypeDescriptor::reference("java.lang.Boolean"))
    .expression("(x >> 1) == 4611686018427387903L")
    .compile()
    .unwrap();

    let ctx = Value::map([("x".to_string(), Value::Long(i64::MAX))]);
    assert_eq!(evaluator.eval(ctx).unwrap(), Value::Bool(true));
}

#[test]
fn unknown_variable_is_a_transpile_error() {
    let result = Ruse::map(vec![])
        .out(TypeDescriptor::object())
        .expression("ghost")
        .compile();
    assert!(matches!(result, Err(Error::Transpile { .. })));
}

#[test]
fn syntax_error_is_a_parse_error_with_position() {
    let result = Ruse::map(vec![])
        .out(TypeDescriptor::object())
        .expression("1 +")
        .compile();
    match result {
        Err(Error::Parse { line, column, .. }) => {
            assert_eq!(line, 1);
            assert!(column >= 3);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn unresolvable_type_is_a_transpile_error() {
    let result = Ruse::map(vec![int_decl("a")])
        .out(TypeDescriptor::object())
        .expression("(Mystery) a")
        .compile();
    match result {
        Err(Error::Transpile { error, .. }) => {
            assert!(error.to_string().contains("Mystery"));
        }
        other => panic!("expected transpile error, got {other:?}"),
    }
}

#[test]
fn missing_method_is_a_transpile_error() {
    let result = Ruse::map(vec![Declaration::new("s", TypeDescriptor::string())])
        .out(TypeDescriptor::object())
        .expression("s.frobnicate()")
        .compile();
    match result {
        Err(Error::Transpile { error, .. }) => {
            let text = error.to_string();
            assert!(text.contains("frobnicate"), "{text}");
            assert!(text.contains("java.lang.String"), "{text}");
        }
        other => panic!("expected transpile error, got {other:?}"),
    }
}
