//! Black-box parser tests covering both start rules.

use ruse_ast::{AssignOp, BinaryOp, ExprKind, StmtKind, TypeName};
use ruse_parser::{parse_block, parse_expression};

#[test]
fn parses_benchmark_predicate() {
    let expr = parse_expression("influence > 50 && !atWar && stability > 30").unwrap();
    // Left-assoc: (a && b) && c
    match expr.kind {
        ExprKind::Binary {
            op: BinaryOp::And,
            left,
            ..
        } => {
            assert!(matches!(
                left.kind,
                ExprKind::Binary {
                    op: BinaryOp::And,
                    ..
                }
            ));
        }
        other => panic!("expected And at root, got {other:?}"),
    }
}

#[test]
fn parses_block_with_assignments() {
    let stmts = parse_block("a = a + 1; b = b * 2; return a + b;").unwrap();
    assert_eq!(stmts.len(), 3);
    assert!(matches!(
        stmts[0].kind,
        StmtKind::Expr(ref e) if matches!(e.kind, ExprKind::Assign { op: AssignOp::Assign, .. })
    ));
    assert!(matches!(stmts[2].kind, StmtKind::Return(Some(_))));
}

#[test]
fn parses_var_declarations() {
    let stmts = parse_block("var s = 0B; int x = 5; java.util.List<Foo> xs = foos;").unwrap();
    assert_eq!(stmts.len(), 3);

    match &stmts[0].kind {
        StmtKind::VarDecl { ty, name, init } => {
            assert_eq!(*ty, TypeName::Var);
            assert_eq!(name, "s");
            assert!(matches!(
                init.as_ref().unwrap().kind,
                ExprKind::BigDecimal(_)
            ));
        }
        other => panic!("expected VarDecl, got {other:?}"),
    }

    match &stmts[2].kind {
        StmtKind::VarDecl { ty, .. } => match ty {
            TypeName::Named { name, generics } => {
                assert_eq!(name, "java.util.List");
                assert_eq!(generics.as_deref(), Some("<Foo>"));
            }
            other => panic!("expected Named type, got {other:?}"),
        },
        other => panic!("expected VarDecl, got {other:?}"),
    }
}

#[test]
fn declaration_vs_expression_ambiguity() {
    // `a * b;` is a multiplication statement, not a declaration
    let stmts = parse_block("a * b;").unwrap();
    assert!(matches!(
        stmts[0].kind,
        StmtKind::Expr(ref e) if matches!(e.kind, ExprKind::Binary { op: BinaryOp::Mul, .. })
    ));
}

#[test]
fn parses_if_else_chain() {
    let stmts = parse_block("if (a > 0) { return 1; } else if (a < 0) { return -1; } else { return 0; }").unwrap();
    assert_eq!(stmts.len(), 1);
    match &stmts[0].kind {
        StmtKind::If { otherwise, .. } => {
            assert!(matches!(
                otherwise.as_deref().map(|s| &s.kind),
                Some(StmtKind::If { .. })
            ));
        }
        other => panic!("expected If, got {other:?}"),
    }
    assert!(stmts[0].kind.ends_with_return());
}

#[test]
fn parses_modify_block() {
    let stmts = parse_block("modify (p) { age = age + 1; name = \"x\"; }").unwrap();
    match &stmts[0].kind {
        StmtKind::Modify { target, body } => {
            assert!(matches!(target.kind, ExprKind::Name(ref n) if n == "p"));
            assert_eq!(body.len(), 2);
        }
        other => panic!("expected Modify, got {other:?}"),
    }
}

#[test]
fn parses_with_block() {
    let stmts = parse_block("with (p) { age = 2; }").unwrap();
    assert!(matches!(stmts[0].kind, StmtKind::With { .. }));
}

#[test]
fn parses_nested_collection_literals() {
    let expr = parse_expression(r#"[a: [1, 2], b: [x: 1]]"#).unwrap();
    match expr.kind {
        ExprKind::MapLit(entries) => {
            assert_eq!(entries.len(), 2);
            assert!(matches!(entries[0].1.kind, ExprKind::ListLit(_)));
            assert!(matches!(entries[1].1.kind, ExprKind::MapLit(_)));
        }
        other => panic!("expected MapLit, got {other:?}"),
    }
}

#[test]
fn spans_point_into_source() {
    let source = "influence > 50";
    let expr = parse_expression(source).unwrap();
    assert_eq!(expr.span.snippet(source), source);
    match expr.kind {
        ExprKind::Binary { left, .. } => {
            assert_eq!(left.span.snippet(source), "influence");
        }
        other => panic!("expected Binary, got {other:?}"),
    }
}

#[test]
fn literal_forms_survive_parsing() {
    assert!(matches!(
        parse_expression("1L").unwrap().kind,
        ExprKind::Long(1)
    ));
    assert!(matches!(
        parse_expression("1.5f").unwrap().kind,
        ExprKind::Float(_)
    ));
    assert!(matches!(
        parse_expression("0B").unwrap().kind,
        ExprKind::BigDecimal(ref s) if s == "0"
    ));
    assert!(matches!(
        parse_expression("42I").unwrap().kind,
        ExprKind::BigInteger(ref s) if s == "42"
    ));
    assert!(matches!(
        parse_expression("'x'").unwrap().kind,
        ExprKind::Char('x')
    ));
}
