//! Tokens of the expression language, produced lazily with logos.
//!
//! Whitespace is skipped. Signs are separate tokens; the parser glues a sign onto a
//! directly following number when it appears in operand position.

use std::fmt;

use logos::Logos;

/// One lexical unit of an expression.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token<'src> {
    /// Decimal literal with optional fraction and exponent: `1`, `1.5`, `.5`, `2.`, `1e-3`
    #[regex(r"([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    Number(&'src str),
    /// Variable or function name
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(text) | Token::Ident(text) => f.write_str(text),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Result<Token<'_>, ()>> {
        Token::lexer(source).collect()
    }

    #[test]
    fn test_numbers() {
        for text in ["0", "0.0", "1.5", "1e10", "1e-10", "1E+10", "1.23456", ".5", "2."] {
            assert_eq!(lex(text), vec![Ok(Token::Number(text))], "{text}");
        }
    }

    #[test]
    fn test_identifiers() {
        for text in ["a", "abc", "abc_EF5z", "_x", "red_sum"] {
            assert_eq!(lex(text), vec![Ok(Token::Ident(text))], "{text}");
        }
        // a leading digit starts a number
        assert_eq!(
            lex("0abc"),
            vec![Ok(Token::Number("0")), Ok(Token::Ident("abc"))]
        );
    }

    #[test]
    fn test_expression() {
        assert_eq!(
            lex(" exp(x*x*0.1 +0.3)\n"),
            vec![
                Ok(Token::Ident("exp")),
                Ok(Token::LParen),
                Ok(Token::Ident("x")),
                Ok(Token::Star),
                Ok(Token::Ident("x")),
                Ok(Token::Star),
                Ok(Token::Number("0.1")),
                Ok(Token::Plus),
                Ok(Token::Number("0.3")),
                Ok(Token::RParen),
            ]
        );
        assert_eq!(
            lex("x-1,2/y"),
            vec![
                Ok(Token::Ident("x")),
                Ok(Token::Minus),
                Ok(Token::Number("1")),
                Ok(Token::Comma),
                Ok(Token::Number("2")),
                Ok(Token::Slash),
                Ok(Token::Ident("y")),
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let mut lexer = Token::lexer("x $ 1");
        assert_eq!(lexer.next(), Some(Ok(Token::Ident("x"))));
        assert_eq!(lexer.next(), Some(Err(())));
        assert_eq!(lexer.span(), 2..3);
    }
}
