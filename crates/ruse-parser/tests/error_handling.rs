//! Parser error reporting tests.

use ruse_parser::{parse_block, parse_expression, ParseError, ParseErrorKind};

fn err(source: &str) -> ParseError {
    parse_expression(source).expect_err("expected parse failure")
}

#[test]
fn lexical_error_carries_location() {
    let e = err("a @ b");
    assert_eq!(e.kind, ParseErrorKind::InvalidToken);
    assert_eq!(e.line_col("a @ b"), (1, 3));
}

#[test]
fn unexpected_eof() {
    let e = err("a +");
    assert_eq!(e.kind, ParseErrorKind::UnexpectedEof);
}

#[test]
fn trailing_tokens_rejected() {
    let e = err("a b");
    assert_eq!(e.kind, ParseErrorKind::UnexpectedToken);
}

#[test]
fn unclosed_paren() {
    let e = err("(a + b");
    assert_eq!(e.kind, ParseErrorKind::UnexpectedEof);
}

#[test]
fn line_and_column_on_second_line() {
    let source = "a = 1;\nb = ;";
    let e = parse_block(source).expect_err("expected parse failure");
    let (line, col) = e.line_col(source);
    assert_eq!(line, 2);
    assert!(col >= 5, "column was {col}");
}

#[test]
fn invalid_assignment_target() {
    let e = err("a + b = c");
    assert_eq!(e.kind, ParseErrorKind::InvalidSyntax);
}

#[test]
fn ascending_temporal_units_rejected() {
    let e = err("30m12h");
    assert_eq!(e.kind, ParseErrorKind::InvalidSyntax);
    assert!(e.message.contains("descend"));
}

#[test]
fn missing_semicolon_in_block() {
    assert!(parse_block("a = 1 b = 2;").is_err());
}
