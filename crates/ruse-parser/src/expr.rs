//! Expression parsing — precedence climbing for binary operators, prefix
//! unary/cast handling, postfix chains, atoms.

use crate::types::{parse_simple_type_name, parse_type_name, read_ident};
use crate::{ParseError, TokenStream};
use ruse_ast::{AssignOp, BinaryOp, Expr, ExprKind, TimeUnit, UnaryOp};
use ruse_lexer::Token;

/// Get binary operator metadata (precedence and operator enum).
///
/// Returns (precedence, op) where higher precedence = tighter binding.
/// All binary operators of the language are left-associative; this table is
/// the single source of truth for binary operator parsing.
fn binary_op_info(token: &Token) -> Option<(u8, BinaryOp)> {
    match token {
        Token::OrOr => Some((10, BinaryOp::Or)),
        Token::AndAnd => Some((20, BinaryOp::And)),
        Token::Pipe => Some((30, BinaryOp::BitOr)),
        Token::Caret => Some((40, BinaryOp::BitXor)),
        Token::Amp => Some((50, BinaryOp::BitAnd)),
        Token::EqEq => Some((60, BinaryOp::Eq)),
        Token::BangEq => Some((60, BinaryOp::Ne)),
        Token::Lt => Some((70, BinaryOp::Lt)),
        Token::LtEq => Some((70, BinaryOp::Le)),
        Token::Gt => Some((70, BinaryOp::Gt)),
        Token::GtEq => Some((70, BinaryOp::Ge)),
        Token::Shl => Some((80, BinaryOp::Shl)),
        Token::Shr => Some((80, BinaryOp::Shr)),
        Token::Ushr => Some((80, BinaryOp::Ushr)),
        Token::Plus => Some((90, BinaryOp::Add)),
        Token::Minus => Some((90, BinaryOp::Sub)),
        Token::Star => Some((100, BinaryOp::Mul)),
        Token::Slash => Some((100, BinaryOp::Div)),
        Token::Percent => Some((100, BinaryOp::Rem)),
        _ => None,
    }
}

/// Assignment operator for a token, if it is one.
fn assign_op_info(token: &Token) -> Option<AssignOp> {
    match token {
        Token::Eq => Some(AssignOp::Assign),
        Token::PlusEq => Some(AssignOp::Add),
        Token::MinusEq => Some(AssignOp::Sub),
        Token::StarEq => Some(AssignOp::Mul),
        Token::SlashEq => Some(AssignOp::Div),
        Token::PercentEq => Some(AssignOp::Rem),
        Token::AmpEq => Some(AssignOp::BitAnd),
        Token::PipeEq => Some(AssignOp::BitOr),
        Token::CaretEq => Some(AssignOp::BitXor),
        Token::ShlEq => Some(AssignOp::Shl),
        Token::ShrEq => Some(AssignOp::Shr),
        Token::UshrEq => Some(AssignOp::Ushr),
        _ => None,
    }
}

/// Parse a full expression (assignment level, right-associative).
pub(crate) fn parse_expr(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let target = parse_ternary(stream)?;

    let Some(op) = stream.peek().and_then(assign_op_info) else {
        return Ok(target);
    };

    if !matches!(
        target.kind,
        ExprKind::Name(_) | ExprKind::FieldGet { .. } | ExprKind::Index { .. }
    ) {
        return Err(ParseError::invalid_syntax(
            "assignment target must be a variable, field or index",
            target.span,
        ));
    }

    stream.advance();
    let value = parse_expr(stream)?;
    let span = stream.span_from(start);
    Ok(Expr::new(
        ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        span,
    ))
}

/// Parse a conditional expression `c ? a : b` (right-associative).
fn parse_ternary(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let cond = parse_binary(stream, 0)?;

    if !stream.eat(&Token::Question) {
        return Ok(cond);
    }

    let then = parse_ternary(stream)?;
    stream.expect(Token::Colon)?;
    let otherwise = parse_ternary(stream)?;
    let span = stream.span_from(start);
    Ok(Expr::new(
        ExprKind::Cond {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
        span,
    ))
}

/// Pratt parser — handles binary operators with precedence climbing.
fn parse_binary(stream: &mut TokenStream, min_prec: u8) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let mut left = parse_unary(stream)?;

    while let Some(token) = stream.peek() {
        if let Some((prec, op)) = binary_op_info(token) {
            if prec < min_prec {
                break;
            }

            stream.advance();
            let right = parse_binary(stream, prec + 1)?;

            let span = stream.span_from(start);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        } else {
            break;
        }
    }

    Ok(left)
}

/// Parse prefix expressions: unary operators and C-style casts.
fn parse_unary(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();

    let op = match stream.peek() {
        Some(Token::Bang) => Some(UnaryOp::Not),
        Some(Token::Minus) => Some(UnaryOp::Neg),
        Some(Token::Tilde) => Some(UnaryOp::BitNot),
        _ => None,
    };
    if let Some(op) = op {
        stream.advance();
        let inner = parse_unary(stream)?;
        let span = stream.span_from(start);
        return Ok(Expr::new(
            ExprKind::Unary {
                op,
                inner: Box::new(inner),
            },
            span,
        ));
    }

    if matches!(stream.peek(), Some(Token::LParen)) && cast_lookahead(stream) {
        stream.advance(); // (
        let target = parse_type_name(stream)?;
        stream.expect(Token::RParen)?;
        let inner = parse_unary(stream)?;
        let span = stream.span_from(start);
        return Ok(Expr::new(
            ExprKind::Cast {
                target,
                inner: Box::new(inner),
            },
            span,
        ));
    }

    parse_postfix(stream)
}

/// Decide whether a `(` starts a cast rather than a parenthesized
/// expression.
///
/// The lookahead accepts `(` TypeName `)` followed by a token that can begin
/// a cast operand. `-` only counts as an operand starter after a primitive
/// type name, so `(a) - b` keeps its arithmetic meaning.
fn cast_lookahead(stream: &TokenStream) -> bool {
    let mut i = 1usize;

    let primitive = match stream.peek_nth(i) {
        Some(Token::Ident(name)) => ruse_ast::PrimitiveTag::from_keyword(name).is_some(),
        _ => return false,
    };
    i += 1;

    if !primitive {
        // Dotted name
        while matches!(stream.peek_nth(i), Some(Token::Dot)) {
            if !matches!(stream.peek_nth(i + 1), Some(Token::Ident(_))) {
                return false;
            }
            i += 2;
        }
        // Optional generics — scan a balanced angle-bracket group
        if matches!(stream.peek_nth(i), Some(Token::Lt)) {
            let mut depth: i32 = 1;
            i += 1;
            while depth > 0 {
                match stream.peek_nth(i) {
                    Some(Token::Lt) => depth += 1,
                    Some(Token::Gt) => depth -= 1,
                    Some(Token::Shr) => depth -= 2,
                    Some(Token::Ushr) => depth -= 3,
                    Some(Token::Ident(_)) | Some(Token::Dot) | Some(Token::Comma)
                    | Some(Token::Question) => {}
                    _ => return false,
                }
                i += 1;
            }
        }
    }

    if !matches!(stream.peek_nth(i), Some(Token::RParen)) {
        return false;
    }
    i += 1;

    match stream.peek_nth(i) {
        Some(Token::Ident(_))
        | Some(Token::Int(_))
        | Some(Token::LongLit(_))
        | Some(Token::FloatLit(_))
        | Some(Token::DoubleLit(_))
        | Some(Token::BigDecimalLit(_))
        | Some(Token::BigIntegerLit(_))
        | Some(Token::TemporalLit(_))
        | Some(Token::CharLit(_))
        | Some(Token::StringLit(_))
        | Some(Token::LParen)
        | Some(Token::Null)
        | Some(Token::True)
        | Some(Token::False)
        | Some(Token::New)
        | Some(Token::Bang)
        | Some(Token::Tilde) => true,
        Some(Token::Minus) => primitive,
        _ => false,
    }
}

/// Parse postfix chains: field access, method calls, null-safe access,
/// indexing, and inline casts.
fn parse_postfix(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let mut expr = parse_atom(stream)?;

    loop {
        match stream.peek() {
            Some(Token::Dot) => {
                stream.advance();
                let member = read_ident(stream, "after '.'")?;
                expr = finish_member(stream, expr, member, start, false)?;
            }
            Some(Token::BangDot) => {
                stream.advance();
                let member = read_ident(stream, "after '!.'")?;
                expr = finish_member(stream, expr, member, start, true)?;
            }
            Some(Token::LBracket) => {
                stream.advance();
                let index = parse_expr(stream)?;
                stream.expect(Token::RBracket)?;
                let span = stream.span_from(start);
                expr = Expr::new(
                    ExprKind::Index {
                        scope: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            }
            Some(Token::Hash) => {
                stream.advance();
                let target = parse_simple_type_name(stream)?;
                let span = stream.span_from(start);
                expr = Expr::new(
                    ExprKind::InlineCast {
                        target,
                        inner: Box::new(expr),
                    },
                    span,
                );
            }
            _ => break,
        }
    }

    Ok(expr)
}

/// After `.member` or `!.member`: either a call (when `(` follows) or a
/// field access.
fn finish_member(
    stream: &mut TokenStream,
    scope: Expr,
    member: String,
    start: usize,
    null_safe: bool,
) -> Result<Expr, ParseError> {
    if matches!(stream.peek(), Some(Token::LParen)) {
        let args = parse_call_args(stream)?;
        let span = stream.span_from(start);
        let kind = if null_safe {
            ExprKind::NullSafeCall {
                scope: Box::new(scope),
                name: member,
                args,
            }
        } else {
            ExprKind::Call {
                scope: Some(Box::new(scope)),
                name: member,
                args,
            }
        };
        Ok(Expr::new(kind, span))
    } else {
        let span = stream.span_from(start);
        let kind = if null_safe {
            ExprKind::NullSafeField {
                scope: Box::new(scope),
                field: member,
            }
        } else {
            ExprKind::FieldGet {
                scope: Box::new(scope),
                field: member,
            }
        };
        Ok(Expr::new(kind, span))
    }
}

/// Parse function call arguments.
fn parse_call_args(stream: &mut TokenStream) -> Result<Vec<Expr>, ParseError> {
    stream.expect(Token::LParen)?;

    let mut args = Vec::new();
    while !matches!(stream.peek(), Some(Token::RParen)) {
        args.push(parse_expr(stream)?);
        if matches!(stream.peek(), Some(Token::RParen)) {
            break;
        }
        stream.expect(Token::Comma)?;
    }

    stream.expect(Token::RParen)?;
    Ok(args)
}

/// Parse atomic expressions: literals, names, parenthesized expressions,
/// collection literals, `new`.
fn parse_atom(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    let span = stream.current_span();

    match stream.peek() {
        Some(Token::True) => {
            stream.advance();
            Ok(Expr::new(ExprKind::Bool(true), stream.span_from(start)))
        }
        Some(Token::False) => {
            stream.advance();
            Ok(Expr::new(ExprKind::Bool(false), stream.span_from(start)))
        }
        Some(Token::Null) => {
            stream.advance();
            Ok(Expr::new(ExprKind::Null, stream.span_from(start)))
        }
        Some(Token::Int(_)) => {
            let value = match stream.advance() {
                Some(Token::Int(n)) => *n,
                _ => unreachable!(),
            };
            let value = i32::try_from(value).map_err(|_| {
                ParseError::invalid_syntax("integer literal out of int range", span)
            })?;
            Ok(Expr::new(ExprKind::Int(value), stream.span_from(start)))
        }
        Some(Token::LongLit(_)) => {
            let value = match stream.advance() {
                Some(Token::LongLit(n)) => *n,
                _ => unreachable!(),
            };
            Ok(Expr::new(ExprKind::Long(value), stream.span_from(start)))
        }
        Some(Token::FloatLit(_)) => {
            let value = match stream.advance() {
                Some(Token::FloatLit(x)) => *x,
                _ => unreachable!(),
            };
            Ok(Expr::new(ExprKind::Float(value), stream.span_from(start)))
        }
        Some(Token::DoubleLit(_)) => {
            let value = match stream.advance() {
                Some(Token::DoubleLit(x)) => *x,
                _ => unreachable!(),
            };
            Ok(Expr::new(ExprKind::Double(value), stream.span_from(start)))
        }
        Some(Token::BigDecimalLit(_)) => {
            let digits = match stream.advance() {
                Some(Token::BigDecimalLit(s)) => s.to_string(),
                _ => unreachable!(),
            };
            Ok(Expr::new(
                ExprKind::BigDecimal(digits),
                stream.span_from(start),
            ))
        }
        Some(Token::BigIntegerLit(_)) => {
            let digits = match stream.advance() {
                Some(Token::BigIntegerLit(s)) => s.to_string(),
                _ => unreachable!(),
            };
            Ok(Expr::new(
                ExprKind::BigInteger(digits),
                stream.span_from(start),
            ))
        }
        Some(Token::TemporalLit(_)) => {
            let text = match stream.advance() {
                Some(Token::TemporalLit(s)) => s.to_string(),
                _ => unreachable!(),
            };
            let chunks = parse_temporal_chunks(&text, span)?;
            Ok(Expr::new(
                ExprKind::Temporal(chunks),
                stream.span_from(start),
            ))
        }
        Some(Token::CharLit(_)) => {
            let value = match stream.advance() {
                Some(Token::CharLit(c)) => *c,
                _ => unreachable!(),
            };
            Ok(Expr::new(ExprKind::Char(value), stream.span_from(start)))
        }
        Some(Token::StringLit(_)) => {
            let value = match stream.advance() {
                Some(Token::StringLit(s)) => s.to_string(),
                _ => unreachable!(),
            };
            Ok(Expr::new(ExprKind::Str(value), stream.span_from(start)))
        }
        Some(Token::Ident(_)) => {
            let name = read_ident(stream, "in expression")?;
            Ok(Expr::new(ExprKind::Name(name), stream.span_from(start)))
        }
        Some(Token::LParen) => {
            stream.advance();
            let inner = parse_expr(stream)?;
            stream.expect(Token::RParen)?;
            Ok(Expr::new(
                ExprKind::Enclosed(Box::new(inner)),
                stream.span_from(start),
            ))
        }
        Some(Token::LBracket) => parse_collection_literal(stream),
        Some(Token::New) => {
            stream.advance();
            let class = parse_type_name(stream)?;
            let args = parse_call_args(stream)?;
            Ok(Expr::new(
                ExprKind::New { class, args },
                stream.span_from(start),
            ))
        }
        other => Err(ParseError::unexpected_token(other, "in expression", span)),
    }
}

/// Parse `[...]` — a list literal, or a map literal when the first element
/// is followed by `:`. `[:]` is the empty map.
fn parse_collection_literal(stream: &mut TokenStream) -> Result<Expr, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::LBracket)?;

    // []
    if stream.eat(&Token::RBracket) {
        return Ok(Expr::new(ExprKind::ListLit(vec![]), stream.span_from(start)));
    }

    // [:]
    if matches!(stream.peek(), Some(Token::Colon)) {
        stream.advance();
        stream.expect(Token::RBracket)?;
        return Ok(Expr::new(ExprKind::MapLit(vec![]), stream.span_from(start)));
    }

    let first = parse_expr(stream)?;

    if stream.eat(&Token::Colon) {
        // Map literal
        let mut entries = Vec::new();
        let value = parse_expr(stream)?;
        entries.push((map_key(first), value));

        while stream.eat(&Token::Comma) {
            let key = parse_expr(stream)?;
            stream.expect(Token::Colon)?;
            let value = parse_expr(stream)?;
            entries.push((map_key(key), value));
        }
        stream.expect(Token::RBracket)?;
        Ok(Expr::new(ExprKind::MapLit(entries), stream.span_from(start)))
    } else {
        // List literal
        let mut elements = vec![first];
        while stream.eat(&Token::Comma) {
            elements.push(parse_expr(stream)?);
        }
        stream.expect(Token::RBracket)?;
        Ok(Expr::new(
            ExprKind::ListLit(elements),
            stream.span_from(start),
        ))
    }
}

/// A bare name in map-key position is a string key (`[name: v]` means
/// `["name": v]`).
fn map_key(key: Expr) -> Expr {
    match key.kind {
        ExprKind::Name(n) => Expr::new(ExprKind::Str(n), key.span),
        _ => key,
    }
}

/// Split a temporal literal's raw text into (amount, unit) chunks and
/// enforce the strictly-descending-unit rule.
fn parse_temporal_chunks(
    text: &str,
    span: ruse_ast::Span,
) -> Result<Vec<(u64, TimeUnit)>, ParseError> {
    let bytes = text.as_bytes();
    let mut chunks: Vec<(u64, TimeUnit)> = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let digit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let amount: u64 = text[digit_start..i].parse().map_err(|_| {
            ParseError::invalid_syntax("temporal literal amount out of range", span)
        })?;

        let unit = if text[i..].starts_with("ms") {
            i += 2;
            TimeUnit::Millis
        } else {
            let unit = match bytes.get(i) {
                Some(b'd') => TimeUnit::Days,
                Some(b'h') => TimeUnit::Hours,
                Some(b'm') => TimeUnit::Minutes,
                Some(b's') => TimeUnit::Seconds,
                _ => {
                    return Err(ParseError::invalid_syntax(
                        "invalid temporal literal unit",
                        span,
                    ))
                }
            };
            i += 1;
            unit
        };

        if let Some(&(_, prev)) = chunks.last() {
            if unit.rank() <= prev.rank() {
                return Err(ParseError::invalid_syntax(
                    format!(
                        "temporal literal units must strictly descend ('{}' after '{}')",
                        unit.suffix(),
                        prev.suffix()
                    ),
                    span,
                ));
            }
        }
        chunks.push((amount, unit));
    }

    Ok(chunks)
}
