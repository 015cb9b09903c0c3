//! Pretty-printer — renders EIR back to host source text.
//!
//! Used by the fallback adapter to hand the lowered body to a host
//! compiler, and by diagnostics. Printing is precedence-aware and adds
//! parentheses only where the grammar needs them, so parsing a printed
//! tree reproduces the tree (modulo spans) for any tree the parser made.

use ruse_ast::{BinaryOp, Expr, ExprKind, Stmt, StmtKind, UnaryOp};
use std::fmt::Write;

/// Binding strength used for parenthesization.
fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } => 1,
        ExprKind::Cond { .. } => 2,
        ExprKind::Binary { op, .. } => binary_precedence(*op),
        ExprKind::Unary { .. } | ExprKind::Cast { .. } => 13,
        ExprKind::FieldGet { .. }
        | ExprKind::Call { .. }
        | ExprKind::Index { .. }
        | ExprKind::InlineCast { .. }
        | ExprKind::NullSafeField { .. }
        | ExprKind::NullSafeCall { .. }
        | ExprKind::New { .. } => 14,
        _ => 15,
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 3,
        BinaryOp::And => 4,
        BinaryOp::BitOr => 5,
        BinaryOp::BitXor => 6,
        BinaryOp::BitAnd => 7,
        BinaryOp::Eq | BinaryOp::Ne => 8,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 9,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => 10,
        BinaryOp::Add | BinaryOp::Sub => 11,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 12,
    }
}

/// Print an expression.
pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

/// Print a statement list at the given indent depth.
pub fn print_body(body: &[Stmt], indent: usize) -> String {
    let mut out = String::new();
    for stmt in body {
        write_stmt(&mut out, stmt, indent);
    }
    out
}

fn write_expr(out: &mut String, expr: &Expr, min_prec: u8) {
    let prec = precedence(expr);
    if prec < min_prec {
        out.push('(');
        write_expr(out, expr, 0);
        out.push(')');
        return;
    }

    match &expr.kind {
        ExprKind::Int(v) => {
            let _ = write!(out, "{v}");
        }
        ExprKind::Long(v) => {
            let _ = write!(out, "{v}L");
        }
        ExprKind::Float(v) => {
            let _ = write!(out, "{}f", float_text(*v as f64));
        }
        ExprKind::Double(v) => {
            let _ = write!(out, "{}", float_text(*v));
        }
        ExprKind::Bool(v) => {
            let _ = write!(out, "{v}");
        }
        ExprKind::Char(c) => {
            let _ = write!(out, "'{}'", escape_char(*c));
        }
        ExprKind::Str(s) => {
            let _ = write!(out, "\"{}\"", escape_str(s));
        }
        ExprKind::Null => out.push_str("null"),
        ExprKind::BigDecimal(digits) => {
            let _ = write!(out, "{digits}B");
        }
        ExprKind::BigInteger(digits) => {
            let _ = write!(out, "{digits}I");
        }
        ExprKind::Temporal(chunks) => {
            for (amount, unit) in chunks {
                let _ = write!(out, "{amount}{}", unit.suffix());
            }
        }
        ExprKind::MapLit(entries) => {
            if entries.is_empty() {
                out.push_str("[:]");
            } else {
                out.push('[');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_expr(out, k, 0);
                    out.push_str(": ");
                    write_expr(out, v, 0);
                }
                out.push(']');
            }
        }
        ExprKind::ListLit(elements) => {
            out.push('[');
            for (i, e) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, e, 0);
            }
            out.push(']');
        }

        ExprKind::Name(name) => out.push_str(name),
        ExprKind::FieldGet { scope, field } => {
            write_expr(out, scope, 14);
            let _ = write!(out, ".{field}");
        }
        ExprKind::NullSafeField { scope, field } => {
            write_expr(out, scope, 14);
            let _ = write!(out, "!.{field}");
        }
        ExprKind::Call { scope, name, args } => {
            if let Some(scope) = scope {
                write_expr(out, scope, 14);
                out.push('.');
            }
            out.push_str(name);
            write_args(out, args);
        }
        ExprKind::NullSafeCall { scope, name, args } => {
            write_expr(out, scope, 14);
            let _ = write!(out, "!.{name}");
            write_args(out, args);
        }
        ExprKind::New { class, args } => {
            let _ = write!(out, "new {}", class.source_name());
            write_args(out, args);
        }
        ExprKind::Index { scope, index } => {
            write_expr(out, scope, 14);
            out.push('[');
            write_expr(out, index, 0);
            out.push(']');
        }

        ExprKind::Unary { op, inner } => {
            out.push_str(op.symbol());
            // `- -x` must not collapse into a decrement-looking `--x`
            if *op == UnaryOp::Neg && matches!(inner.kind, ExprKind::Unary { op: UnaryOp::Neg, .. })
            {
                out.push(' ');
            }
            write_expr(out, inner, 13);
        }
        ExprKind::Binary { op, left, right } => {
            let prec = binary_precedence(*op);
            write_expr(out, left, prec);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, right, prec + 1);
        }
        ExprKind::Assign { op, target, value } => {
            write_expr(out, target, 14);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, value, 1);
        }
        ExprKind::Cast { target, inner } => {
            let _ = write!(out, "({}) ", target.source_name());
            write_expr(out, inner, 13);
        }
        ExprKind::InlineCast { target, inner } => {
            write_expr(out, inner, 14);
            let _ = write!(out, "#{}", target.source_name());
        }
        ExprKind::Cond {
            cond,
            then,
            otherwise,
        } => {
            write_expr(out, cond, 3);
            out.push_str(" ? ");
            write_expr(out, then, 2);
            out.push_str(" : ");
            write_expr(out, otherwise, 2);
        }
        ExprKind::Enclosed(inner) => {
            out.push('(');
            write_expr(out, inner, 0);
            out.push(')');
        }
    }
}

fn write_args(out: &mut String, args: &[Expr]) {
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, arg, 0);
    }
    out.push(')');
}

fn write_stmt(out: &mut String, stmt: &Stmt, indent: usize) {
    let pad = "    ".repeat(indent);
    match &stmt.kind {
        StmtKind::Expr(e) => {
            out.push_str(&pad);
            write_expr(out, e, 0);
            out.push_str(";\n");
        }
        StmtKind::VarDecl { ty, name, init } => {
            out.push_str(&pad);
            let _ = write!(out, "{} {name}", ty.source_name());
            if let Some(init) = init {
                out.push_str(" = ");
                write_expr(out, init, 0);
            }
            out.push_str(";\n");
        }
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => {
            out.push_str(&pad);
            out.push_str("if (");
            write_expr(out, cond, 0);
            out.push_str(")");
            write_branch(out, then, indent);
            if let Some(otherwise) = otherwise {
                out.push_str(&pad);
                out.push_str("else");
                write_branch(out, otherwise, indent);
            }
        }
        StmtKind::Block(stmts) => {
            out.push_str(&pad);
            out.push_str("{\n");
            for s in stmts {
                write_stmt(out, s, indent + 1);
            }
            out.push_str(&pad);
            out.push_str("}\n");
        }
        StmtKind::Return(e) => {
            out.push_str(&pad);
            out.push_str("return");
            if let Some(e) = e {
                out.push(' ');
                write_expr(out, e, 0);
            }
            out.push_str(";\n");
        }
        StmtKind::Empty => {
            out.push_str(&pad);
            out.push_str(";\n");
        }
        StmtKind::Modify { target, body } => {
            write_receiver_block(out, "modify", target, body, indent);
        }
        StmtKind::With { target, body } => {
            write_receiver_block(out, "with", target, body, indent);
        }
    }
}

fn write_branch(out: &mut String, stmt: &Stmt, indent: usize) {
    if matches!(stmt.kind, StmtKind::Block(_)) {
        out.push(' ');
        // inline the block's braces on the if line
        let mut inner = String::new();
        write_stmt(&mut inner, stmt, indent);
        out.push_str(inner.trim_start());
    } else {
        out.push('\n');
        write_stmt(out, stmt, indent + 1);
    }
}

fn write_receiver_block(
    out: &mut String,
    keyword: &str,
    target: &Expr,
    body: &[Stmt],
    indent: usize,
) {
    let pad = "    ".repeat(indent);
    out.push_str(&pad);
    let _ = write!(out, "{keyword} (");
    write_expr(out, target, 0);
    out.push_str(") {\n");
    for s in body {
        write_stmt(out, s, indent + 1);
    }
    out.push_str(&pad);
    out.push_str("}\n");
}

/// Double rendering that always reparses as a double (`1.0`, not `1`).
fn float_text(v: f64) -> String {
    if v == v.trunc() && v.is_finite() && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

fn escape_char(c: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '\\' => "\\\\".to_string(),
        '\'' => "\\'".to_string(),
        other => other.to_string(),
    }
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruse_parser::{parse_block, parse_expression};

    /// parse → print → parse must reproduce the tree (spans aside).
    #[test]
    fn expression_round_trip() {
        for source in [
            "a + b * c",
            "(a + b) * c",
            "influence > 50 && !atWar && stability > 30",
            "a ? b : c",
            "a = b += 2",
            "foo.bar(1, \"x\").baz",
            "foos[0].name + foos[1].name",
            "(int) x + 1",
            "new java.util.ArrayList()",
            "a!.b",
            "x#java.math.BigDecimal",
            "[a: 1, b: [2, 3]]",
            "12h30m",
            "0B",
            "~a & b | c ^ d",
            "a << 2 >>> 1",
            "-(-x)",
            "s + 1.5f + 2.0",
        ] {
            let first = parse_expression(source).expect(source);
            let printed = print_expr(&first);
            let second = parse_expression(&printed)
                .unwrap_or_else(|e| panic!("reparse of '{printed}' failed: {e}"));
            assert_eq!(first, second, "round trip of '{source}' via '{printed}'");
        }
    }

    #[test]
    fn block_round_trip() {
        for source in [
            "a = a + 1; b = b * 2; return a + b;",
            "var s = 0B; s += 1; return s;",
            "if (a > 0) { return 1; } else { return 2; }",
            "int x = 5; ; return x;",
            "modify (p) { age = age + 1; }",
        ] {
            let first = parse_block(source).expect(source);
            let printed = print_body(&first, 0);
            let second = parse_block(&printed)
                .unwrap_or_else(|e| panic!("reparse of '{printed}' failed: {e}"));
            assert_eq!(first, second, "round trip of '{source}' via '{printed}'");
        }
    }

    #[test]
    fn doubles_keep_their_point() {
        let e = parse_expression("1.0 + 2").unwrap();
        assert_eq!(print_expr(&e), "1.0 + 2");
    }

    #[test]
    fn string_escapes_survive() {
        let e = parse_expression(r#""a\"b\n""#).unwrap();
        let printed = print_expr(&e);
        let again = parse_expression(&printed).unwrap();
        assert_eq!(e, again);
    }
}
