//! Expression module for representing single-variable float expressions.
//!
//! This module defines the expression tree produced by the parser and consumed by the
//! checker, the constant folder and the code generator:
//!
//! - `Expr`: a closed sum type of literals, the variable, function calls and binary operators
//! - `FuncKind`: the registry of named unary math functions
//! - `OpKind`: the four arithmetic operators
//!
//! Every consumer matches on `Expr` exhaustively, so adding a node kind is a compile error
//! everywhere it needs handling.
//!
//! # Reference evaluation
//! `Expr::eval` evaluates the tree for one input the way a kernel lane does: arithmetic is
//! performed in f32 and functions use the standard library's f32 routines. Tests compare
//! compiled kernels against it.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

/// Name of the top-level reduction wrapper.
pub const REDUCE_SUM: &str = "red_sum";

/// A named unary math function.
///
/// Each kind has a vectorized lowering in the `operators` module and a reference
/// implementation in [`FuncKind::eval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncKind {
    /// e^x
    Exp,
    /// Natural logarithm
    Log,
    /// Hyperbolic cosine
    Cosh,
    /// Sine (argument in radians)
    Sin,
    /// Hyperbolic tangent
    Tanh,
    /// Reciprocal 1/x
    Inv,
    /// Square root
    Sqrt,
    /// Absolute value
    Abs,
}

impl FuncKind {
    /// Every registered function, in lookup order.
    pub const ALL: [FuncKind; 8] = [
        FuncKind::Exp,
        FuncKind::Log,
        FuncKind::Cosh,
        FuncKind::Sin,
        FuncKind::Tanh,
        FuncKind::Inv,
        FuncKind::Sqrt,
        FuncKind::Abs,
    ];

    /// The name used in source text.
    pub fn name(self) -> &'static str {
        match self {
            FuncKind::Exp => "exp",
            FuncKind::Log => "log",
            FuncKind::Cosh => "cosh",
            FuncKind::Sin => "sin",
            FuncKind::Tanh => "tanh",
            FuncKind::Inv => "inv",
            FuncKind::Sqrt => "sqrt",
            FuncKind::Abs => "abs",
        }
    }

    /// Looks a function up by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Number of arguments the function takes.
    pub fn arity(self) -> usize {
        1
    }

    /// Reference implementation on one value.
    pub fn eval(self, x: f32) -> f32 {
        match self {
            FuncKind::Exp => x.exp(),
            FuncKind::Log => x.ln(),
            FuncKind::Cosh => x.cosh(),
            FuncKind::Sin => x.sin(),
            FuncKind::Tanh => x.tanh(),
            FuncKind::Inv => 1.0 / x,
            FuncKind::Sqrt => x.sqrt(),
            FuncKind::Abs => x.abs(),
        }
    }
}

impl fmt::Display for FuncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FuncKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| s.to_string())
    }
}

/// A binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
}

impl OpKind {
    /// The operator's source symbol.
    pub fn symbol(self) -> char {
        match self {
            OpKind::Add => '+',
            OpKind::Sub => '-',
            OpKind::Mul => '*',
            OpKind::Div => '/',
        }
    }

    /// Applies the operator in f32.
    pub fn apply(self, lhs: f32, rhs: f32) -> f32 {
        match self {
            OpKind::Add => lhs + rhs,
            OpKind::Sub => lhs - rhs,
            OpKind::Mul => lhs * rhs,
            OpKind::Div => lhs / rhs,
        }
    }
}

/// An expression tree node.
///
/// Nodes own their children exclusively. Calls keep their argument list as written so
/// that the checker can report arity errors; after checking, every call has exactly
/// `FuncKind::arity` arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal
    Literal(f64),
    /// A reference to the free variable
    Variable(String),
    /// A call of a registered function
    Call(FuncKind, Vec<Expr>),
    /// A binary arithmetic operation
    Binary(OpKind, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn literal(value: f64) -> Self {
        Expr::Literal(value)
    }

    pub fn var(name: &str) -> Self {
        Expr::Variable(name.to_string())
    }

    pub fn call(func: FuncKind, arg: Expr) -> Self {
        Expr::Call(func, vec![arg])
    }

    pub fn binary(op: OpKind, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Returns true if no variable occurs in the tree.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Variable(_) => false,
            Expr::Call(_, args) => args.iter().all(Expr::is_constant),
            Expr::Binary(_, lhs, rhs) => lhs.is_constant() && rhs.is_constant(),
        }
    }

    /// Evaluates the expression with the variable bound to `x`.
    ///
    /// Literals are rounded to f32 before use, matching what the generated code loads.
    /// Calls with a missing argument evaluate to NaN.
    pub fn eval(&self, x: f32) -> f32 {
        match self {
            Expr::Literal(value) => *value as f32,
            Expr::Variable(_) => x,
            Expr::Call(func, args) => match args.first() {
                Some(arg) => func.eval(arg.eval(x)),
                None => f32::NAN,
            },
            Expr::Binary(op, lhs, rhs) => op.apply(lhs.eval(x), rhs.eval(x)),
        }
    }
}

/// Formats the expression fully parenthesized, e.g. `log(cosh(x))` or `((x * x) + 1)`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Variable(name) => f.write_str(name),
            Expr::Call(func, args) => write!(f, "{func}({})", args.iter().join(", ")),
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    #[test]
    fn test_func_registry() {
        for kind in FuncKind::ALL {
            assert_eq!(FuncKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.name().parse::<FuncKind>(), Ok(kind));
            assert_eq!(kind.arity(), 1);
        }
        assert_eq!(FuncKind::from_name("foo"), None);
        assert_eq!(FuncKind::from_name(REDUCE_SUM), None);
    }

    #[test]
    fn test_eval() {
        // x * x + 0.5
        let expr = Expr::binary(
            OpKind::Add,
            Expr::binary(OpKind::Mul, x(), x()),
            Expr::literal(0.5),
        );
        assert_eq!(expr.eval(3.0), 9.5);

        // log(cosh(x))
        let expr = Expr::call(FuncKind::Log, Expr::call(FuncKind::Cosh, x()));
        assert_eq!(expr.eval(0.0), 0.0);
        assert!((expr.eval(1.0) - 1.0f32.cosh().ln()).abs() < 1e-7);

        assert_eq!(Expr::call(FuncKind::Inv, x()).eval(4.0), 0.25);
        assert!(Expr::Call(FuncKind::Exp, vec![]).eval(1.0).is_nan());
    }

    #[test]
    fn test_constness() {
        let expr = Expr::binary(
            OpKind::Sub,
            Expr::call(FuncKind::Sin, x()),
            Expr::binary(OpKind::Div, Expr::var("y"), x()),
        );
        assert!(!expr.is_constant());

        let constant = Expr::call(FuncKind::Exp, Expr::literal(1.0));
        assert!(constant.is_constant());
    }

    #[test]
    fn test_display() {
        let expr = Expr::call(
            FuncKind::Exp,
            Expr::binary(
                OpKind::Add,
                Expr::binary(OpKind::Mul, Expr::binary(OpKind::Mul, x(), x()), Expr::literal(0.1)),
                Expr::literal(0.3),
            ),
        );
        assert_eq!(expr.to_string(), "exp((((x * x) * 0.1) + 0.3))");
        assert_eq!(
            Expr::Call(FuncKind::Abs, vec![x(), Expr::literal(2.0)]).to_string(),
            "abs(x, 2)"
        );
    }
}
