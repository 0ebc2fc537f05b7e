//! Semantic checks between parsing and code generation.
//!
//! The checker verifies that the declared variable is a plain identifier, that it is
//! the only variable and occurs at least once, and that every call has the arity its
//! function declares. A successful check yields a [`Program`], the only input the code
//! generator accepts.

use std::fmt;

use logos::Logos;

use crate::errors::SemanticError;
use crate::expr::{Expr, FuncKind, REDUCE_SUM};
use crate::kernel::Convention;
use crate::lexer::Token;
use crate::parser::{Ast, Reduction};

/// A validated expression together with the calling convention it compiles to.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    body: Expr,
    variable: String,
    convention: Convention,
}

impl Program {
    /// The per-element expression (the inside of `red_sum` for reductions).
    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Replaces the body with an equivalent one, e.g. after constant folding.
    pub(crate) fn map_body(self, f: impl FnOnce(Expr) -> Expr) -> Self {
        Self {
            body: f(self.body),
            ..self
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.convention {
            Convention::ElementwiseMap => write!(f, "{}", self.body),
            Convention::ReduceSum => write!(f, "{REDUCE_SUM}({})", self.body),
        }
    }
}

/// Validates `ast` against the declared `variable`.
///
/// # Errors
/// Returns the first violated rule, in tree order.
pub fn check(ast: Ast, variable: &str) -> Result<Program, SemanticError> {
    check_variable(variable)?;
    check_node(&ast.body, variable)?;
    if ast.body.is_constant() {
        return Err(SemanticError::MissingVariable(variable.to_string()));
    }

    let convention = match ast.reduction {
        None => Convention::ElementwiseMap,
        Some(Reduction::Sum) => Convention::ReduceSum,
    };

    Ok(Program {
        body: ast.body,
        variable: variable.to_string(),
        convention,
    })
}

/// Checks that `variable` can be declared: a single identifier that is not taken by
/// `red_sum` or a registered function.
///
/// # Errors
/// `InvalidVariable` for anything that does not lex as one identifier,
/// `ReservedVariable` for a name the parser would read as a function.
pub fn check_variable(variable: &str) -> Result<(), SemanticError> {
    let mut tokens = Token::lexer(variable);
    match (tokens.next(), tokens.next()) {
        (Some(Ok(Token::Ident(name))), None) if name == variable => {}
        _ => return Err(SemanticError::InvalidVariable(variable.to_string())),
    }
    if variable == REDUCE_SUM || FuncKind::from_name(variable).is_some() {
        return Err(SemanticError::ReservedVariable(variable.to_string()));
    }
    Ok(())
}

fn check_node(expr: &Expr, variable: &str) -> Result<(), SemanticError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Variable(name) if name == variable => Ok(()),
        Expr::Variable(name) => Err(SemanticError::VariableMismatch {
            expected: variable.to_string(),
            found: name.clone(),
        }),
        Expr::Call(func, args) => {
            if args.len() != func.arity() {
                return Err(SemanticError::ArityMismatch {
                    function: *func,
                    expected: func.arity(),
                    found: args.len(),
                });
            }
            args.iter().try_for_each(|arg| check_node(arg, variable))
        }
        Expr::Binary(_, lhs, rhs) => {
            check_node(lhs, variable)?;
            check_node(rhs, variable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{FuncKind, OpKind};
    use crate::parser::parse;

    fn checked(source: &str) -> Result<Program, SemanticError> {
        check(parse(source, "x").unwrap(), "x")
    }

    #[test]
    fn test_conventions() {
        let program = checked("log(cosh(x))").unwrap();
        assert_eq!(program.convention(), Convention::ElementwiseMap);
        assert_eq!(program.variable(), "x");
        assert_eq!(program.to_string(), "log(cosh(x))");

        let program = checked("red_sum(x*2)").unwrap();
        assert_eq!(program.convention(), Convention::ReduceSum);
        assert_eq!(
            program.body(),
            &Expr::binary(OpKind::Mul, Expr::var("x"), Expr::literal(2.0))
        );
        assert_eq!(program.to_string(), "red_sum((x * 2))");
    }

    #[test]
    fn test_arity() {
        assert_eq!(
            checked("exp(x, 1)"),
            Err(SemanticError::ArityMismatch {
                function: FuncKind::Exp,
                expected: 1,
                found: 2
            })
        );
        assert_eq!(
            checked("x + log(sin(x), x, x)"),
            Err(SemanticError::ArityMismatch {
                function: FuncKind::Log,
                expected: 1,
                found: 3
            })
        );
        let ast = Ast {
            body: Expr::Call(FuncKind::Sin, vec![]),
            reduction: None,
        };
        assert!(matches!(
            check(ast, "x"),
            Err(SemanticError::ArityMismatch { found: 0, .. })
        ));
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            checked("1 + 2"),
            Err(SemanticError::MissingVariable("x".to_string()))
        );
        assert_eq!(
            checked("red_sum(0.5)"),
            Err(SemanticError::MissingVariable("x".to_string()))
        );

        // trees built by hand can still carry foreign names
        let ast = Ast {
            body: Expr::binary(OpKind::Add, Expr::var("x"), Expr::var("y")),
            reduction: None,
        };
        assert_eq!(
            check(ast, "x"),
            Err(SemanticError::VariableMismatch {
                expected: "x".to_string(),
                found: "y".to_string()
            })
        );
    }

    #[test]
    fn test_variable_names() {
        for name in ["x", "t", "_x1", "cosh2", "Exp"] {
            assert_eq!(check_variable(name), Ok(()), "{name}");
        }
        for name in ["", " x", "x y", "2x", "x+1", "é"] {
            assert_eq!(
                check_variable(name),
                Err(SemanticError::InvalidVariable(name.to_string())),
                "{name:?}"
            );
        }
        for name in ["red_sum", "exp", "cosh", "abs"] {
            assert_eq!(
                check_variable(name),
                Err(SemanticError::ReservedVariable(name.to_string())),
                "{name}"
            );
        }

        let ast = Ast {
            body: Expr::var("exp"),
            reduction: None,
        };
        assert_eq!(
            check(ast, "exp"),
            Err(SemanticError::ReservedVariable("exp".to_string()))
        );
    }
}
