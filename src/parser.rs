//! Recursive-descent parser from source text to [`Ast`].
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! source         := "red_sum" "(" additive ")" | additive
//! additive       := multiplicative (("+" | "-") multiplicative)*
//! multiplicative := operand (("*" | "/") operand)*
//! operand        := NAME "(" additive ("," additive)* ")"
//!                 | ["+" | "-"] NUMBER
//!                 | NAME
//!                 | "(" additive ")"
//! ```
//!
//! Names resolve against the declared variable and the function registry; anything else
//! is rejected here. `red_sum` is accepted only as the wrapper of the whole source.

use logos::{Lexer, Logos};

use crate::errors::{ParseError, ParseErrorKind};
use crate::expr::{Expr, FuncKind, OpKind, REDUCE_SUM};
use crate::lexer::Token;

/// Reduction applied to the per-element values of the wrapped expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    /// `red_sum(...)`
    Sum,
}

/// A parsed source: the per-element expression plus an optional top-level reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub body: Expr,
    pub reduction: Option<Reduction>,
}

/// Parses `source`, resolving identifiers against `variable` and the function registry.
///
/// # Errors
/// Returns a `ParseError` carrying the byte offset of the offending token.
pub fn parse(source: &str, variable: &str) -> Result<Ast, ParseError> {
    Parser::new(source, variable).parse_source()
}

type Spanned<'src> = (Token<'src>, usize);

struct Parser<'src> {
    lexer: Lexer<'src, Token<'src>>,
    peeked: Option<Option<Spanned<'src>>>,
    variable: &'src str,
    source_len: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str, variable: &'src str) -> Self {
        Self {
            lexer: Token::lexer(source),
            peeked: None,
            variable,
            source_len: source.len(),
        }
    }

    fn lex(&mut self) -> Result<Option<Spanned<'src>>, ParseError> {
        match self.lexer.next() {
            None => Ok(None),
            Some(Ok(token)) => Ok(Some((token, self.lexer.span().start))),
            Some(Err(())) => {
                let span = self.lexer.span();
                Err(ParseError::new(
                    span.start,
                    ParseErrorKind::UnexpectedChar(self.lexer.slice().to_string()),
                ))
            }
        }
    }

    fn peek(&mut self) -> Result<Option<Spanned<'src>>, ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex()?);
        }
        Ok(self.peeked.flatten())
    }

    fn next(&mut self) -> Result<Option<Spanned<'src>>, ParseError> {
        match self.peeked.take() {
            Some(spanned) => Ok(spanned),
            None => self.lex(),
        }
    }

    fn expect(&mut self, wanted: Token<'static>, expected: &str) -> Result<usize, ParseError> {
        match self.next()? {
            Some((token, position)) if token == wanted => Ok(position),
            Some((token, position)) => Err(unexpected(token, position, expected)),
            None => Err(self.end(expected)),
        }
    }

    fn end(&self, expected: &str) -> ParseError {
        ParseError::new(
            self.source_len,
            ParseErrorKind::UnexpectedEnd {
                expected: expected.to_string(),
            },
        )
    }

    fn parse_source(mut self) -> Result<Ast, ParseError> {
        let reduction = match self.peek()? {
            Some((Token::Ident(REDUCE_SUM), _)) => {
                self.next()?;
                self.expect(Token::LParen, "`(` after `red_sum`")?;
                Some(Reduction::Sum)
            }
            _ => None,
        };

        let body = self.parse_additive()?;

        if reduction.is_some() {
            self.expect(Token::RParen, "`)`")?;
        }

        match self.next()? {
            None => Ok(Ast { body, reduction }),
            Some((_, position)) if reduction.is_some() => {
                // red_sum(...) followed by more input is arithmetic around the reduction
                Err(ParseError::new(position, ParseErrorKind::MisplacedReduction))
            }
            Some((Token::RParen, position)) => Err(unexpected(Token::RParen, position, "an operator")),
            Some((_, position)) => Err(ParseError::new(
                position,
                ParseErrorKind::TrailingInput(self.lexer.source()[position..].trim().to_string()),
            )),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek()? {
                Some((Token::Plus, _)) => OpKind::Add,
                Some((Token::Minus, _)) => OpKind::Sub,
                _ => return Ok(lhs),
            };
            self.next()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_operand()?;
        loop {
            let op = match self.peek()? {
                Some((Token::Star, _)) => OpKind::Mul,
                Some((Token::Slash, _)) => OpKind::Div,
                _ => return Ok(lhs),
            };
            self.next()?;
            let rhs = self.parse_operand()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn parse_operand(&mut self) -> Result<Expr, ParseError> {
        const EXPECTED: &str = "a number, variable, call or `(`";

        let Some((token, position)) = self.next()? else {
            return Err(self.end(EXPECTED));
        };

        match token {
            Token::Number(text) => parse_number(text, position),
            Token::Plus | Token::Minus => match self.next()? {
                Some((Token::Number(text), _)) => {
                    let value = parse_number(text, position)?;
                    Ok(if token == Token::Minus { negate(value) } else { value })
                }
                Some((other, position)) => Err(unexpected(other, position, "a number after the sign")),
                None => Err(self.end("a number after the sign")),
            },
            Token::LParen => {
                let inner = self.parse_additive()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if matches!(self.peek()?, Some((Token::LParen, _))) {
                    self.next()?;
                    return self.parse_call(name, position);
                }
                if name == self.variable {
                    Ok(Expr::var(name))
                } else if name == REDUCE_SUM {
                    Err(ParseError::new(position, ParseErrorKind::MisplacedReduction))
                } else if FuncKind::from_name(name).is_some() {
                    Err(ParseError::new(position, ParseErrorKind::MissingCall(name.to_string())))
                } else {
                    Err(ParseError::new(position, ParseErrorKind::UnknownSymbol(name.to_string())))
                }
            }
            other => Err(unexpected(other, position, EXPECTED)),
        }
    }

    /// Parses the argument list of `name(`; the opening parenthesis is already consumed.
    fn parse_call(&mut self, name: &str, position: usize) -> Result<Expr, ParseError> {
        let func = match FuncKind::from_name(name) {
            Some(func) => func,
            None if name == REDUCE_SUM => {
                return Err(ParseError::new(position, ParseErrorKind::MisplacedReduction))
            }
            None => {
                return Err(ParseError::new(
                    position,
                    ParseErrorKind::UnknownFunction(name.to_string()),
                ))
            }
        };

        let mut args = vec![self.parse_additive()?];
        loop {
            match self.next()? {
                Some((Token::Comma, _)) => args.push(self.parse_additive()?),
                Some((Token::RParen, _)) => return Ok(Expr::Call(func, args)),
                Some((token, position)) => return Err(unexpected(token, position, "`,` or `)`")),
                None => return Err(self.end("`)`")),
            }
        }
    }
}

fn parse_number(text: &str, position: usize) -> Result<Expr, ParseError> {
    text.parse::<f64>()
        .map(Expr::Literal)
        .map_err(|_| ParseError::new(position, ParseErrorKind::InvalidNumber(text.to_string())))
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(value) => Expr::Literal(-value),
        other => other,
    }
}

fn unexpected(found: Token<'_>, position: usize, expected: &str) -> ParseError {
    ParseError::new(
        position,
        ParseErrorKind::UnexpectedToken {
            found: found.to_string(),
            expected: expected.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    fn lit(value: f64) -> Expr {
        Expr::literal(value)
    }

    fn body(source: &str) -> Expr {
        let ast = parse(source, "x").unwrap();
        assert_eq!(ast.reduction, None);
        ast.body
    }

    fn error(source: &str) -> ParseError {
        parse(source, "x").unwrap_err()
    }

    #[test]
    fn test_precedence() {
        // 1 + x * 2 - 3 / x  →  ((1 + (x * 2)) - (3 / x))
        assert_eq!(
            body("1 + x * 2 - 3 / x"),
            Expr::binary(
                OpKind::Sub,
                Expr::binary(OpKind::Add, lit(1.0), Expr::binary(OpKind::Mul, x(), lit(2.0))),
                Expr::binary(OpKind::Div, lit(3.0), x()),
            )
        );
        // parentheses override precedence
        assert_eq!(
            body("(1+x)*2"),
            Expr::binary(OpKind::Mul, Expr::binary(OpKind::Add, lit(1.0), x()), lit(2.0))
        );
        // left associativity
        assert_eq!(
            body("x-1-2"),
            Expr::binary(OpKind::Sub, Expr::binary(OpKind::Sub, x(), lit(1.0)), lit(2.0))
        );
    }

    #[test]
    fn test_calls() {
        assert_eq!(
            body("log(cosh(x))"),
            Expr::call(FuncKind::Log, Expr::call(FuncKind::Cosh, x()))
        );
        assert_eq!(body("exp (x)"), Expr::call(FuncKind::Exp, x()));
        // arity is left to the checker
        assert_eq!(
            body("sin(x, 2)"),
            Expr::Call(FuncKind::Sin, vec![x(), lit(2.0)])
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(body("x*-2"), Expr::binary(OpKind::Mul, x(), lit(-2.0)));
        assert_eq!(body("x+ +1e-3"), Expr::binary(OpKind::Add, x(), lit(1e-3)));
        assert_eq!(body(".5*x"), Expr::binary(OpKind::Mul, lit(0.5), x()));
        assert_eq!(body("x - -1"), Expr::binary(OpKind::Sub, x(), lit(-1.0)));
        assert_eq!(body("2."), lit(2.0));
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        assert_eq!(body(" x\t*\n( x + 0.5 ) "), body("x*(x+0.5)"));
    }

    #[test]
    fn test_other_variable_names() {
        let ast = parse("exp(value_1 * 2)", "value_1").unwrap();
        assert_eq!(
            ast.body,
            Expr::call(FuncKind::Exp, Expr::binary(OpKind::Mul, Expr::var("value_1"), lit(2.0)))
        );
        assert_eq!(
            parse("x", "y").unwrap_err().kind,
            ParseErrorKind::UnknownSymbol("x".to_string())
        );
    }

    #[test]
    fn test_reduction() {
        let ast = parse("red_sum(log(cosh(x)))", "x").unwrap();
        assert_eq!(ast.reduction, Some(Reduction::Sum));
        assert_eq!(ast.body, Expr::call(FuncKind::Log, Expr::call(FuncKind::Cosh, x())));

        let ast = parse("  red_sum ( x )  ", "x").unwrap();
        assert_eq!(ast.reduction, Some(Reduction::Sum));
        assert_eq!(ast.body, x());
    }

    #[test]
    fn test_misplaced_reduction() {
        assert_eq!(
            error("red_sum(x)+1"),
            ParseError::new(10, ParseErrorKind::MisplacedReduction)
        );
        assert_eq!(
            error("1+red_sum(x)"),
            ParseError::new(2, ParseErrorKind::MisplacedReduction)
        );
        assert_eq!(
            error("red_sum(red_sum(x))"),
            ParseError::new(8, ParseErrorKind::MisplacedReduction)
        );
        assert_eq!(
            error("exp(red_sum(x))"),
            ParseError::new(4, ParseErrorKind::MisplacedReduction)
        );
        assert_eq!(error("red_sum").kind, ParseErrorKind::UnexpectedEnd {
            expected: "`(` after `red_sum`".to_string()
        });
        assert_eq!(error("x*red_sum").kind, ParseErrorKind::MisplacedReduction);
    }

    #[test]
    fn test_unknown_symbols() {
        assert_eq!(
            error("foo(x)"),
            ParseError::new(0, ParseErrorKind::UnknownFunction("foo".to_string()))
        );
        assert_eq!(
            error("x + y"),
            ParseError::new(4, ParseErrorKind::UnknownSymbol("y".to_string()))
        );
        assert_eq!(
            error("exp + 1"),
            ParseError::new(0, ParseErrorKind::MissingCall("exp".to_string()))
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(error("x $ 1"), ParseError::new(2, ParseErrorKind::UnexpectedChar("$".to_string())));
        assert_eq!(
            error(""),
            ParseError::new(
                0,
                ParseErrorKind::UnexpectedEnd {
                    expected: "a number, variable, call or `(`".to_string()
                }
            )
        );
        assert_eq!(error("(x + 1").kind, ParseErrorKind::UnexpectedEnd {
            expected: "`)`".to_string()
        });
        assert_eq!(
            error("x + 1)"),
            ParseError::new(
                5,
                ParseErrorKind::UnexpectedToken {
                    found: ")".to_string(),
                    expected: "an operator".to_string()
                }
            )
        );
        assert_eq!(
            error("x 1"),
            ParseError::new(2, ParseErrorKind::TrailingInput("1".to_string()))
        );
        assert_eq!(
            error("-x"),
            ParseError::new(
                1,
                ParseErrorKind::UnexpectedToken {
                    found: "x".to_string(),
                    expected: "a number after the sign".to_string()
                }
            )
        );
        assert!(matches!(error("x * * 2").kind, ParseErrorKind::UnexpectedToken { .. }));
        assert!(matches!(error("exp(x").kind, ParseErrorKind::UnexpectedEnd { .. }));
        assert!(matches!(error("exp()").kind, ParseErrorKind::UnexpectedToken { .. }));
    }
}
