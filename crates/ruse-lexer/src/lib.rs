// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lexical analysis for the Ruse expression language.
//!
//! This module provides tokenization of Ruse source code using logos.
//!
//! # Design
//!
//! - `Token` — all token types (keywords, operators, literals, identifiers)
//! - Comments are stripped during lexing (not tokens)
//! - Token strings defined once in `TOKEN_STRINGS` table (single source of truth for Display)
//! - Literal forms are part of the contract: `1L` lexes as a long, `1.5f` as
//!   a float, `0B`/`0I` as big-decimal/big-integer literals, `12h30m` as a
//!   temporal literal. Downstream passes never re-inspect digit suffixes.
//!
//! # Examples
//!
//! ```
//! # use ruse_lexer::Token;
//! # use logos::Logos;
//! let source = "influence > 50 && !atWar";
//! let tokens: Vec<Result<Token, ()>> = Token::lexer(source).collect();
//! ```

use logos::Logos;
use std::rc::Rc;

/// Ruse token.
///
/// Represents all lexical elements of the expression language including
/// keywords, operators, literals, and identifiers.
///
/// Token strings for keywords, operators, and delimiters are defined once
/// in the `TOKEN_STRINGS` table and indexed by discriminant for Display.
///
/// # Layout
///
/// Uses `#[repr(u16)]` to guarantee discriminant values are stable and
/// can be safely used to index into `TOKEN_STRINGS`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[repr(u16)]
#[logos(skip r"[ \t\r\n]+")] // Skip whitespace
#[logos(skip r"//[^\n]*")] // Skip // comments
#[logos(skip r"/\*([^*]|\*[^/])*\*/")] // Skip /* */ comments
pub enum Token {
    // === Keywords ===
    /// Keyword `var`
    #[token("var")]
    Var,
    /// Keyword `if`
    #[token("if")]
    If,
    /// Keyword `else`
    #[token("else")]
    Else,
    /// Keyword `return`
    #[token("return")]
    Return,
    /// Keyword `new`
    #[token("new")]
    New,
    /// Keyword `null`
    #[token("null")]
    Null,
    /// Boolean literal `true`
    #[token("true")]
    True,
    /// Boolean literal `false`
    #[token("false")]
    False,
    /// Keyword `modify`
    #[token("modify")]
    Modify,
    /// Keyword `with`
    #[token("with")]
    With,

    // === Operators ===

    // Arithmetic
    /// Operator `+`
    #[token("+")]
    Plus,
    /// Operator `-`
    #[token("-")]
    Minus,
    /// Operator `*`
    #[token("*")]
    Star,
    /// Operator `/`
    #[token("/")]
    Slash,
    /// Operator `%`
    #[token("%")]
    Percent,

    // Bitwise & shift
    /// Operator `&`
    #[token("&")]
    Amp,
    /// Operator `|`
    #[token("|")]
    Pipe,
    /// Operator `^`
    #[token("^")]
    Caret,
    /// Operator `~`
    #[token("~")]
    Tilde,
    /// Operator `<<`
    #[token("<<")]
    Shl,
    /// Operator `>>`
    #[token(">>")]
    Shr,
    /// Operator `>>>`
    #[token(">>>")]
    Ushr,

    // Comparison
    /// Operator `==`
    #[token("==")]
    EqEq,
    /// Operator `!=`
    #[token("!=")]
    BangEq,
    /// Operator `<`
    #[token("<")]
    Lt,
    /// Operator `<=`
    #[token("<=")]
    LtEq,
    /// Operator `>`
    #[token(">")]
    Gt,
    /// Operator `>=`
    #[token(">=")]
    GtEq,

    // Logic
    /// Operator `&&`
    #[token("&&")]
    AndAnd,
    /// Operator `||`
    #[token("||")]
    OrOr,
    /// Operator `!`
    #[token("!")]
    Bang,

    // Rule-language extensions
    /// Null-safe access `!.`
    #[token("!.")]
    BangDot,
    /// Inline cast `#`
    #[token("#")]
    Hash,

    // Assignment
    /// Operator `=`
    #[token("=")]
    Eq,
    /// Operator `+=`
    #[token("+=")]
    PlusEq,
    /// Operator `-=`
    #[token("-=")]
    MinusEq,
    /// Operator `*=`
    #[token("*=")]
    StarEq,
    /// Operator `/=`
    #[token("/=")]
    SlashEq,
    /// Operator `%=`
    #[token("%=")]
    PercentEq,
    /// Operator `&=`
    #[token("&=")]
    AmpEq,
    /// Operator `|=`
    #[token("|=")]
    PipeEq,
    /// Operator `^=`
    #[token("^=")]
    CaretEq,
    /// Operator `<<=`
    #[token("<<=")]
    ShlEq,
    /// Operator `>>=`
    #[token(">>=")]
    ShrEq,
    /// Operator `>>>=`
    #[token(">>>=")]
    UshrEq,

    // Ternary & punctuation
    /// Operator `?`
    #[token("?")]
    Question,
    /// Operator `:`
    #[token(":")]
    Colon,
    /// Operator `.`
    #[token(".")]
    Dot,
    /// Operator `,`
    #[token(",")]
    Comma,
    /// Operator `;`
    #[token(";")]
    Semicolon,

    // === Delimiters ===
    /// Delimiter `(`
    #[token("(")]
    LParen,
    /// Delimiter `)`
    #[token(")")]
    RParen,
    /// Delimiter `{`
    #[token("{")]
    LBrace,
    /// Delimiter `}`
    #[token("}")]
    RBrace,
    /// Delimiter `[`
    #[token("[")]
    LBracket,
    /// Delimiter `]`
    #[token("]")]
    RBracket,

    // === Literals ===
    /// Integer literal without suffix (e.g., 42, 0, 1000).
    ///
    /// Carried as i64 so the parser can range-check against the declared
    /// int width; overflow of i64 itself fails the lex.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok(), priority = 4)]
    Int(i64),

    /// Long literal with `L`/`l` suffix (e.g., 1L).
    #[regex(r"[0-9]+[lL]", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<i64>().ok()
    })]
    LongLit(i64),

    /// Float literal with `f`/`F` suffix (e.g., 1.5f, 3f).
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[fF]", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<f32>().ok()
    })]
    #[regex(r"[0-9]+[fF]", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<f32>().ok()
    })]
    FloatLit(f32),

    /// Double literal (e.g., 3.14, 1e10, 2d).
    ///
    /// A bare `d` suffix is a double, never a day-valued temporal literal;
    /// day durations are written with a second chunk (`1d2h`) or as hours.
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[dD]?", |lex| {
        let s = lex.slice().trim_end_matches(['d', 'D']);
        s.parse::<f64>().ok()
    })]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[dD]", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<f64>().ok()
    }, priority = 5)]
    DoubleLit(f64),

    /// Big-decimal literal with `B` suffix (e.g., 0B, 10.25B).
    ///
    /// Digits are kept as written; the literal lowers to a
    /// `BigDecimal.valueOf` factory call.
    #[regex(r"[0-9]+(\.[0-9]+)?B", |lex| {
        let s = lex.slice();
        Rc::from(&s[..s.len() - 1])
    })]
    BigDecimalLit(Rc<str>),

    /// Big-integer literal with `I` suffix (e.g., 0I, 42I).
    #[regex(r"[0-9]+I", |lex| {
        let s = lex.slice();
        Rc::from(&s[..s.len() - 1])
    })]
    BigIntegerLit(Rc<str>),

    /// Temporal literal (e.g., `12h30m`, `250ms`, `1d2h`).
    ///
    /// Kept as raw text; the parser splits it into (amount, unit) chunks and
    /// enforces the descending-unit rule.
    #[regex(r"[0-9]+(ms|[dhms])([0-9]+(ms|[dhms]))*", |lex| Rc::from(lex.slice()), priority = 3)]
    TemporalLit(Rc<str>),

    /// Character literal (e.g., 'a', '\n').
    #[regex(r"'([^'\\]|\\.)'", |lex| {
        let s = lex.slice();
        unescape_char(&s[1..s.len() - 1])
    })]
    CharLit(char),

    /// String literal (e.g., "hello").
    ///
    /// Uses `Rc<str>` for cheap cloning throughout the parser pipeline.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        let content = &s[1..s.len() - 1];
        unescape_string(content).map(|s| Rc::from(s.as_str()))
    })]
    StringLit(Rc<str>),

    /// Identifier (e.g., influence, atWar, BigDecimal).
    ///
    /// Uses `Rc<str>` for cheap cloning throughout the parser pipeline.
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| Rc::from(lex.slice()))]
    Ident(Rc<str>),
}

/// Unescape a string literal content.
fn unescape_string(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some(_) => {
                    // Unsupported escape sequence
                    return None;
                }
                None => return None, // Trailing backslash
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

/// Unescape a character literal content (exactly one resulting char).
fn unescape_char(s: &str) -> Option<char> {
    let unescaped = unescape_string(s)?;
    let mut chars = unescaped.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Some(c)
}

/// Token string lookup table.
///
/// Maps discriminant indices to their string representation.
/// This is the single source of truth for token display strings,
/// indexed by the enum discriminant order.
///
/// NOTE: The `#[token("...")]` attributes above must match these strings.
/// This duplication is unavoidable due to logos requiring literal strings,
/// but this table at least consolidates Display logic to avoid a large match.
const TOKEN_STRINGS: &[&str] = &[
    "var",
    "if",
    "else",
    "return",
    "new",
    "null",
    "true",
    "false",
    "modify",
    "with", // keywords
    "+",
    "-",
    "*",
    "/",
    "%", // arithmetic
    "&",
    "|",
    "^",
    "~",
    "<<",
    ">>",
    ">>>", // bitwise & shift
    "==",
    "!=",
    "<",
    "<=",
    ">",
    ">=", // comparison
    "&&",
    "||",
    "!", // logic
    "!.",
    "#", // extensions
    "=",
    "+=",
    "-=",
    "*=",
    "/=",
    "%=",
    "&=",
    "|=",
    "^=",
    "<<=",
    ">>=",
    ">>>=", // assignment
    "?",
    ":",
    ".",
    ",",
    ";", // ternary & punctuation
    "(",
    ")",
    "{",
    "}",
    "[",
    "]", // delimiters
];

impl Token {
    /// Get the index into TOKEN_STRINGS for simple tokens.
    ///
    /// # Safety
    ///
    /// Safe due to `#[repr(u16)]` on Token enum ensuring stable discriminants.
    fn token_string_index(&self) -> usize {
        // Safe: Token has #[repr(u16)] so discriminant values are stable
        let discriminant = unsafe { *(self as *const Token as *const u16) };
        discriminant as usize
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Literals with data (not in TOKEN_STRINGS table)
            Token::Int(n) => write!(f, "{}", n),
            Token::LongLit(n) => write!(f, "{}L", n),
            Token::FloatLit(x) => write!(f, "{}f", x),
            Token::DoubleLit(x) => write!(f, "{}", x),
            Token::BigDecimalLit(s) => write!(f, "{}B", s),
            Token::BigIntegerLit(s) => write!(f, "{}I", s),
            Token::TemporalLit(s) => write!(f, "{}", s),
            Token::CharLit(c) => write!(f, "'{}'", c),
            Token::StringLit(s) => write!(f, "\"{}\"", s),
            Token::Ident(id) => write!(f, "{}", id),

            // Simple tokens (keywords, operators, delimiters)
            // Index into TOKEN_STRINGS using discriminant
            _ => {
                let idx = self.token_string_index();
                let s = TOKEN_STRINGS
                    .get(idx)
                    .expect("BUG: token discriminant out of bounds for TOKEN_STRINGS");
                write!(f, "{}", s)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test helper: lex source and panic on any error.
    fn lex(source: &str) -> Vec<Token> {
        Token::lexer(source)
            .collect::<Result<Vec<_>, _>>()
            .expect("lexing failed - invalid token encountered")
    }

    /// Test helper: create an identifier token.
    fn ident(s: &str) -> Token {
        Token::Ident(Rc::from(s))
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("var if else return new null modify with");
        assert_eq!(
            tokens,
            vec![
                Token::Var,
                Token::If,
                Token::Else,
                Token::Return,
                Token::New,
                Token::Null,
                Token::Modify,
                Token::With,
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        let tokens = lex("influence atWar my_var $tmp x2");
        assert_eq!(
            tokens,
            vec![
                ident("influence"),
                ident("atWar"),
                ident("my_var"),
                ident("$tmp"),
                ident("x2"),
            ]
        );
    }

    #[test]
    fn test_integer_and_long_suffix() {
        let tokens = lex("42 0 1L 99l");
        assert_eq!(
            tokens,
            vec![
                Token::Int(42),
                Token::Int(0),
                Token::LongLit(1),
                Token::LongLit(99),
            ]
        );
    }

    #[test]
    fn test_float_double_suffixes() {
        let tokens = lex("3.14 1.5f 2F 1e10 2.5e-3 7d 8D");
        assert_eq!(
            tokens,
            vec![
                Token::DoubleLit(3.14),
                Token::FloatLit(1.5),
                Token::FloatLit(2.0),
                Token::DoubleLit(1e10),
                Token::DoubleLit(2.5e-3),
                Token::DoubleLit(7.0),
                Token::DoubleLit(8.0),
            ]
        );
    }

    #[test]
    fn test_big_number_literals() {
        let tokens = lex("0B 10.25B 42I");
        assert_eq!(
            tokens,
            vec![
                Token::BigDecimalLit(Rc::from("0")),
                Token::BigDecimalLit(Rc::from("10.25")),
                Token::BigIntegerLit(Rc::from("42")),
            ]
        );
    }

    #[test]
    fn test_temporal_literals() {
        let tokens = lex("12h30m 250ms 1d2h 45s");
        assert_eq!(
            tokens,
            vec![
                Token::TemporalLit(Rc::from("12h30m")),
                Token::TemporalLit(Rc::from("250ms")),
                Token::TemporalLit(Rc::from("1d2h")),
                Token::TemporalLit(Rc::from("45s")),
            ]
        );
    }

    #[test]
    fn test_bare_d_suffix_is_double_not_temporal() {
        // `1d` is a double literal; day durations need a second chunk
        let tokens = lex("1d 1d2h");
        assert_eq!(
            tokens,
            vec![Token::DoubleLit(1.0), Token::TemporalLit(Rc::from("1d2h")),]
        );
    }

    #[test]
    fn test_char_and_string_literals() {
        let tokens = lex(r#"'a' '\n' "hello" "a\"b""#);
        assert_eq!(
            tokens,
            vec![
                Token::CharLit('a'),
                Token::CharLit('\n'),
                Token::StringLit(Rc::from("hello")),
                Token::StringLit(Rc::from("a\"b")),
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens = lex("+ - * / % == != < <= > >= && || !");
        assert_eq!(
            tokens,
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::Percent,
                Token::EqEq,
                Token::BangEq,
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::AndAnd,
                Token::OrOr,
                Token::Bang,
            ]
        );
    }

    #[test]
    fn test_shift_operators() {
        let tokens = lex("<< >> >>> <<= >>= >>>=");
        assert_eq!(
            tokens,
            vec![
                Token::Shl,
                Token::Shr,
                Token::Ushr,
                Token::ShlEq,
                Token::ShrEq,
                Token::UshrEq,
            ]
        );
    }

    #[test]
    fn test_compound_assignment() {
        let tokens = lex("= += -= *= /= %= &= |= ^=");
        assert_eq!(
            tokens,
            vec![
                Token::Eq,
                Token::PlusEq,
                Token::MinusEq,
                Token::StarEq,
                Token::SlashEq,
                Token::PercentEq,
                Token::AmpEq,
                Token::PipeEq,
                Token::CaretEq,
            ]
        );
    }

    #[test]
    fn test_null_safe_access() {
        let tokens = lex("a!.b");
        assert_eq!(tokens, vec![ident("a"), Token::BangDot, ident("b"),]);
    }

    #[test]
    fn test_bang_vs_bang_eq_vs_bang_dot() {
        let tokens = lex("!a a != b a!.b");
        assert_eq!(
            tokens,
            vec![
                Token::Bang,
                ident("a"),
                ident("a"),
                Token::BangEq,
                ident("b"),
                ident("a"),
                Token::BangDot,
                ident("b"),
            ]
        );
    }

    #[test]
    fn test_inline_cast() {
        let tokens = lex("x#BigDecimal");
        assert_eq!(tokens, vec![ident("x"), Token::Hash, ident("BigDecimal"),]);
    }

    #[test]
    fn test_map_literal_tokens() {
        let tokens = lex(r#"[name: "a", age: 3]"#);
        assert_eq!(
            tokens,
            vec![
                Token::LBracket,
                ident("name"),
                Token::Colon,
                Token::StringLit(Rc::from("a")),
                Token::Comma,
                ident("age"),
                Token::Colon,
                Token::Int(3),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_predicate_expression() {
        let tokens = lex("influence > 50 && !atWar");
        assert_eq!(
            tokens,
            vec![
                ident("influence"),
                Token::Gt,
                Token::Int(50),
                Token::AndAnd,
                Token::Bang,
                ident("atWar"),
            ]
        );
    }

    #[test]
    fn test_block_statements() {
        let tokens = lex("var s = 0B; s += 1; return s;");
        assert_eq!(
            tokens,
            vec![
                Token::Var,
                ident("s"),
                Token::Eq,
                Token::BigDecimalLit(Rc::from("0")),
                Token::Semicolon,
                ident("s"),
                Token::PlusEq,
                Token::Int(1),
                Token::Semicolon,
                Token::Return,
                ident("s"),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_line_comments() {
        let tokens = lex("a // comment\n+ b");
        assert_eq!(tokens, vec![ident("a"), Token::Plus, ident("b"),]);
    }

    #[test]
    fn test_block_comments() {
        let tokens = lex("a /* multi\nline */ + b");
        assert_eq!(tokens, vec![ident("a"), Token::Plus, ident("b"),]);
    }

    #[test]
    fn test_lexer_error_detection() {
        let results: Vec<_> = Token::lexer("a @ b").collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err()); // @
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_int_overflow_is_error() {
        let results: Vec<_> = Token::lexer("99999999999999999999").collect();
        assert!(results.iter().any(|r| r.is_err()));
    }

    /// Verify that TOKEN_STRINGS matches token definitions.
    #[test]
    fn test_token_string_consistency() {
        assert_eq!(Token::Var.to_string(), "var");
        assert_eq!(Token::Modify.to_string(), "modify");
        assert_eq!(Token::Plus.to_string(), "+");
        assert_eq!(Token::Ushr.to_string(), ">>>");
        assert_eq!(Token::EqEq.to_string(), "==");
        assert_eq!(Token::BangDot.to_string(), "!.");
        assert_eq!(Token::UshrEq.to_string(), ">>>=");
        assert_eq!(Token::Semicolon.to_string(), ";");
        assert_eq!(Token::RBracket.to_string(), "]");
    }
}
