//! Statement parsing — declarations, control flow, blocks, and the
//! modify/with rule-language forms.

use crate::expr::parse_expr;
use crate::types::{parse_type_name, read_ident};
use crate::{ParseError, TokenStream};
use ruse_ast::{Stmt, StmtKind, TypeName};
use ruse_lexer::Token;

/// Parse a single statement.
pub(crate) fn parse_stmt(stream: &mut TokenStream) -> Result<Stmt, ParseError> {
    let start = stream.current_pos();

    match stream.peek() {
        Some(Token::Semicolon) => {
            stream.advance();
            Ok(Stmt::new(StmtKind::Empty, stream.span_from(start)))
        }
        Some(Token::LBrace) => {
            stream.advance();
            let stmts = parse_stmts_until(stream, &Token::RBrace)?;
            stream.expect(Token::RBrace)?;
            Ok(Stmt::new(StmtKind::Block(stmts), stream.span_from(start)))
        }
        Some(Token::If) => parse_if(stream),
        Some(Token::Return) => {
            stream.advance();
            let expr = if matches!(stream.peek(), Some(Token::Semicolon)) {
                None
            } else {
                Some(parse_expr(stream)?)
            };
            stream.expect(Token::Semicolon)?;
            Ok(Stmt::new(StmtKind::Return(expr), stream.span_from(start)))
        }
        Some(Token::Modify) => parse_receiver_block(stream, true),
        Some(Token::With) => parse_receiver_block(stream, false),
        Some(Token::Var) => {
            stream.advance();
            let name = read_ident(stream, "after 'var'")?;
            stream.expect(Token::Eq)?;
            let init = parse_expr(stream)?;
            stream.expect(Token::Semicolon)?;
            Ok(Stmt::new(
                StmtKind::VarDecl {
                    ty: TypeName::Var,
                    name,
                    init: Some(init),
                },
                stream.span_from(start),
            ))
        }
        Some(Token::Ident(_)) => {
            // Either a typed declaration (`int x = 1;`, `List<Foo> xs;`) or
            // an expression statement. Try the declaration shape first and
            // rewind when it does not fit.
            if let Some(stmt) = try_parse_var_decl(stream)? {
                return Ok(stmt);
            }
            parse_expr_stmt(stream)
        }
        Some(_) => parse_expr_stmt(stream),
        None => Err(ParseError::unexpected_token(
            None,
            "while parsing statement",
            stream.current_span(),
        )),
    }
}

/// Parse statements until the given closing token (not consumed) or EOF.
pub(crate) fn parse_stmts_until(
    stream: &mut TokenStream,
    end: &Token,
) -> Result<Vec<Stmt>, ParseError> {
    let mut stmts = Vec::new();
    while !stream.at_end() && !stream.check(end) {
        stmts.push(parse_stmt(stream)?);
    }
    Ok(stmts)
}

/// Parse statements to end of input.
pub(crate) fn parse_stmts_to_eof(stream: &mut TokenStream) -> Result<Vec<Stmt>, ParseError> {
    let mut stmts = Vec::new();
    while !stream.at_end() {
        stmts.push(parse_stmt(stream)?);
    }
    Ok(stmts)
}

fn parse_expr_stmt(stream: &mut TokenStream) -> Result<Stmt, ParseError> {
    let start = stream.current_pos();
    let expr = parse_expr(stream)?;
    stream.expect(Token::Semicolon)?;
    Ok(Stmt::new(StmtKind::Expr(expr), stream.span_from(start)))
}

fn parse_if(stream: &mut TokenStream) -> Result<Stmt, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::If)?;
    stream.expect(Token::LParen)?;
    let cond = parse_expr(stream)?;
    stream.expect(Token::RParen)?;
    let then = parse_stmt(stream)?;

    let otherwise = if stream.eat(&Token::Else) {
        Some(Box::new(parse_stmt(stream)?))
    } else {
        None
    };

    Ok(Stmt::new(
        StmtKind::If {
            cond,
            then: Box::new(then),
            otherwise,
        },
        stream.span_from(start),
    ))
}

/// `modify (target) { stmts }` / `with (target) { stmts }`.
fn parse_receiver_block(stream: &mut TokenStream, is_modify: bool) -> Result<Stmt, ParseError> {
    let start = stream.current_pos();
    stream.advance(); // modify / with
    stream.expect(Token::LParen)?;
    let target = parse_expr(stream)?;
    stream.expect(Token::RParen)?;
    stream.expect(Token::LBrace)?;
    let body = parse_stmts_until(stream, &Token::RBrace)?;
    stream.expect(Token::RBrace)?;

    let kind = if is_modify {
        StmtKind::Modify { target, body }
    } else {
        StmtKind::With { target, body }
    };
    Ok(Stmt::new(kind, stream.span_from(start)))
}

/// Attempt to parse a typed variable declaration; rewinds and returns
/// `None` when the statement is not declaration-shaped.
fn try_parse_var_decl(stream: &mut TokenStream) -> Result<Option<Stmt>, ParseError> {
    let start = stream.current_pos();

    let ty = match parse_type_name(stream) {
        Ok(ty) => ty,
        Err(_) => {
            stream.rewind(start);
            return Ok(None);
        }
    };

    let name = match stream.peek() {
        Some(Token::Ident(name)) => name.to_string(),
        _ => {
            stream.rewind(start);
            return Ok(None);
        }
    };
    stream.advance();

    match stream.peek() {
        Some(Token::Eq) => {
            stream.advance();
            let init = parse_expr(stream)?;
            stream.expect(Token::Semicolon)?;
            Ok(Some(Stmt::new(
                StmtKind::VarDecl {
                    ty,
                    name,
                    init: Some(init),
                },
                stream.span_from(start),
            )))
        }
        Some(Token::Semicolon) => {
            stream.advance();
            Ok(Some(Stmt::new(
                StmtKind::VarDecl {
                    ty,
                    name,
                    init: None,
                },
                stream.span_from(start),
            )))
        }
        _ => {
            stream.rewind(start);
            Ok(None)
        }
    }
}
