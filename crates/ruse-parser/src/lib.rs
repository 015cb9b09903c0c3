// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Hand-written recursive descent parser producing Ruse EIR.
//!
//! Two start rules, matching the compiler's two content kinds:
//!
//! - [`parse_expression`] — a single expression (`influence > 50 && !atWar`)
//! - [`parse_block`] — a statement list (`a = a + 1; return a + b;`)
//!
//! The parser preserves literal forms (a `1L` token arrives as a long, `0B`
//! as a big-decimal literal) and keeps rule-language surface constructs
//! (null-safe access, collection literals, modify/with) as dedicated EIR
//! nodes for the lowering pass to rewrite.

mod error;
mod expr;
mod stmt;
mod stream;
mod types;

pub use error::{ParseError, ParseErrorKind};
pub use stream::TokenStream;

use logos::Logos;
use ruse_ast::{Expr, Span, Stmt};
use ruse_lexer::Token;
use std::ops::Range;

/// Lex a source string into spanned tokens.
///
/// Lexical failures surface as [`ParseError`] with the offending byte range.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>, ParseError> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(ParseError::invalid_token(Span::from(span))),
        }
    }
    Ok(tokens)
}

/// Parse a single expression; the whole input must be consumed.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut stream = TokenStream::new(&tokens, source);
    let expr = expr::parse_expr(&mut stream)?;
    expect_eof(&stream)?;
    Ok(expr)
}

/// Parse a statement block; the whole input must be consumed.
pub fn parse_block(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = tokenize(source)?;
    let mut stream = TokenStream::new(&tokens, source);
    let stmts = stmt::parse_stmts_to_eof(&mut stream)?;
    Ok(stmts)
}

fn expect_eof(stream: &TokenStream) -> Result<(), ParseError> {
    if stream.at_end() {
        Ok(())
    } else {
        Err(ParseError::unexpected_token(
            stream.peek(),
            "after expression",
            stream.current_span(),
        ))
    }
}
