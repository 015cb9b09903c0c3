//! Type-name parsing (casts, declarations, `new` expressions).

use crate::{ParseError, TokenStream};
use ruse_ast::{PrimitiveTag, TypeName};
use ruse_lexer::Token;

/// Parse a type name: a primitive keyword, or a dotted class name with
/// optional generic arguments.
///
/// Generic argument text is captured verbatim from the source — the type
/// system erases it for emission and only the fallback pretty-printer needs
/// it back.
pub(crate) fn parse_type_name(stream: &mut TokenStream) -> Result<TypeName, ParseError> {
    let first = read_ident(stream, "in type name")?;

    if let Some(tag) = PrimitiveTag::from_keyword(&first) {
        return Ok(TypeName::Primitive(tag));
    }

    let mut name = first;
    while matches!(stream.peek(), Some(Token::Dot)) {
        stream.advance();
        name.push('.');
        name.push_str(&read_ident(stream, "after '.' in type name")?);
    }

    let generics = if matches!(stream.peek(), Some(Token::Lt)) {
        Some(parse_generics_text(stream)?)
    } else {
        None
    };

    Ok(TypeName::Named { name, generics })
}

/// Parse a dotted type name without generics (inline casts).
pub(crate) fn parse_simple_type_name(stream: &mut TokenStream) -> Result<TypeName, ParseError> {
    let first = read_ident(stream, "in type name")?;
    if let Some(tag) = PrimitiveTag::from_keyword(&first) {
        return Ok(TypeName::Primitive(tag));
    }
    let mut name = first;
    while matches!(stream.peek(), Some(Token::Dot)) {
        stream.advance();
        name.push('.');
        name.push_str(&read_ident(stream, "after '.' in type name")?);
    }
    Ok(TypeName::Named {
        name,
        generics: None,
    })
}

/// Consume a balanced `<...>` group and return its source text verbatim.
///
/// `>>` and `>>>` close two and three levels, the way shift tokens do in
/// nested generic types.
fn parse_generics_text(stream: &mut TokenStream) -> Result<String, ParseError> {
    let start = stream.current_pos();
    stream.expect(Token::Lt)?;
    let mut depth: i32 = 1;

    while depth > 0 {
        let span = stream.current_span();
        match stream.advance() {
            Some(Token::Lt) => depth += 1,
            Some(Token::Gt) => depth -= 1,
            Some(Token::Shr) => depth -= 2,
            Some(Token::Ushr) => depth -= 3,
            Some(Token::Ident(_))
            | Some(Token::Dot)
            | Some(Token::Comma)
            | Some(Token::Question) => {}
            other => {
                return Err(ParseError::unexpected_token(
                    other,
                    "in generic arguments",
                    span,
                ));
            }
        }
    }
    if depth < 0 {
        return Err(ParseError::invalid_syntax(
            "unbalanced '>' in generic arguments",
            stream.current_span(),
        ));
    }

    Ok(stream.text_between(start, stream.current_pos()).to_string())
}

/// Read an identifier token, or fail with context.
pub(crate) fn read_ident(stream: &mut TokenStream, context: &str) -> Result<String, ParseError> {
    let span = stream.current_span();
    match stream.advance() {
        Some(Token::Ident(s)) => Ok(s.to_string()),
        other => Err(ParseError::unexpected_token(other, context, span)),
    }
}
