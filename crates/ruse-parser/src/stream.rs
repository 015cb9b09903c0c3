//! Token stream wrapper for the hand-written parser.

use ruse_ast::Span;
use ruse_lexer::Token;
use std::ops::Range;

/// Token stream with lookahead and position tracking.
///
/// Provides methods for consuming tokens, lookahead, backtracking and span
/// tracking for the hand-written recursive descent parser.
///
/// Each token is paired with its byte span from the source, enabling
/// accurate error message locations.
pub struct TokenStream<'src> {
    tokens: &'src [(Token, Range<usize>)],
    source: &'src str,
    pos: usize,
}

impl<'src> TokenStream<'src> {
    /// Create a new token stream from tokens with their byte spans.
    pub fn new(tokens: &'src [(Token, Range<usize>)], source: &'src str) -> Self {
        Self {
            tokens,
            source,
            pos: 0,
        }
    }

    /// The source text this stream was lexed from.
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    /// Peek at the nth token ahead without consuming.
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(tok, _)| tok)
    }

    /// Advance to the next token and return the current one.
    pub fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(tok, _)| tok);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token matches the expected token.
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consume the current token if it matches, returning whether it did.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a specific token and advance if it matches.
    ///
    /// Returns an error if the token doesn't match.
    pub fn expect(&mut self, expected: Token) -> Result<Span, super::ParseError> {
        if self.check(&expected) {
            let start = self.pos;
            self.advance();
            Ok(self.span_from(start))
        } else {
            Err(super::ParseError::expected_token(
                expected,
                self.peek().cloned(),
                self.current_span(),
            ))
        }
    }

    /// Check if we've reached the end of the token stream.
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Get the current position in the token stream.
    pub fn current_pos(&self) -> usize {
        self.pos
    }

    /// Rewind to a previously recorded position (backtracking for the
    /// declaration-vs-expression ambiguity).
    pub fn rewind(&mut self, pos: usize) {
        debug_assert!(pos <= self.pos, "rewind must move backwards");
        self.pos = pos;
    }

    /// Create a span from a starting position to the last consumed token.
    ///
    /// Uses actual byte offsets from the source for accurate error locations.
    pub fn span_from(&self, start: usize) -> Span {
        let start_byte = match self.tokens.get(start) {
            Some((_, span)) => span.start,
            None => return self.current_span(),
        };

        let end_byte = if self.pos > 0 && self.pos <= self.tokens.len() {
            // Use the end of the previous token (last consumed token)
            self.tokens[self.pos - 1].1.end
        } else {
            start_byte
        };

        Span::new(start_byte as u32, end_byte as u32)
    }

    /// Get a span for the current token (or a zero-length span at EOF).
    pub fn current_span(&self) -> Span {
        if let Some((_, span)) = self.tokens.get(self.pos) {
            Span::new(span.start as u32, span.end as u32)
        } else if let Some((_, span)) = self.tokens.last() {
            Span::new(span.end as u32, span.end as u32)
        } else {
            Span::zero()
        }
    }

    /// Source text between two stream positions, trimmed.
    ///
    /// Used to retain generic-argument text verbatim for the fallback path.
    pub fn text_between(&self, start: usize, end: usize) -> &'src str {
        let (Some((_, a)), Some((_, b))) = (self.tokens.get(start), end.checked_sub(1).and_then(|e| self.tokens.get(e)))
        else {
            return "";
        };
        self.source[a.start..b.end].trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logos::Logos;

    fn spanned(source: &str) -> Vec<(Token, Range<usize>)> {
        Token::lexer(source)
            .spanned()
            .map(|(tok, span)| (tok.expect("lex error"), span))
            .collect()
    }

    #[test]
    fn peek_and_advance() {
        let tokens = spanned("a + b");
        let mut stream = TokenStream::new(&tokens, "a + b");
        assert!(matches!(stream.peek(), Some(Token::Ident(_))));
        stream.advance();
        assert_eq!(stream.peek(), Some(&Token::Plus));
        assert_eq!(stream.peek_nth(1).is_some(), true);
        assert_eq!(stream.peek_nth(2), None);
    }

    #[test]
    fn spans_use_byte_offsets() {
        let src = "ab + cd";
        let tokens = spanned(src);
        let mut stream = TokenStream::new(&tokens, src);
        let start = stream.current_pos();
        stream.advance(); // ab
        stream.advance(); // +
        stream.advance(); // cd
        let span = stream.span_from(start);
        assert_eq!(span.snippet(src), "ab + cd");
    }

    #[test]
    fn rewind_restores_position() {
        let tokens = spanned("a + b");
        let mut stream = TokenStream::new(&tokens, "a + b");
        let mark = stream.current_pos();
        stream.advance();
        stream.advance();
        stream.rewind(mark);
        assert!(matches!(stream.peek(), Some(Token::Ident(_))));
    }

    #[test]
    fn expect_reports_mismatch() {
        let tokens = spanned("a");
        let mut stream = TokenStream::new(&tokens, "a");
        assert!(stream.expect(Token::Plus).is_err());
        assert!(stream.expect(Token::Ident("".into())).is_ok());
    }
}
