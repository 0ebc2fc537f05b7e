//! Constant folding for expression trees.
//!
//! Two rewrites, applied bottom-up in a single traversal:
//!  1. **constants** – evaluate variable-free subtrees in f32, the way the kernel would.
//!  2. **neutral elements** – remove `x-0`, `x+(-0)`, `(-0)+x`, `x*1`, `1*x` and `x/1`.
//!
//! Folding is optional: the generated code is correct without it, only shorter with it.
//! Every rewrite is exact for all inputs, signed zeros included. `x+0` stays because
//! `-0 + 0` is `+0`, and `x*0` stays because it is not zero for infinite or NaN `x`.

use crate::expr::{Expr, OpKind};

/// Folds constants and drops neutral elements.
pub fn optimize(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(_) | Expr::Variable(_) => expr,
        Expr::Call(func, args) => {
            let args: Vec<Expr> = args.into_iter().map(optimize).collect();
            match args.as_slice() {
                [Expr::Literal(value)] => Expr::Literal(f64::from(func.eval(*value as f32))),
                _ => Expr::Call(func, args),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = optimize(*lhs);
            let rhs = optimize(*rhs);
            fold_binary(op, lhs, rhs)
        }
    }
}

fn fold_binary(op: OpKind, lhs: Expr, rhs: Expr) -> Expr {
    use OpKind::*;

    match (op, &lhs, &rhs) {
        (_, Expr::Literal(a), Expr::Literal(b)) => {
            Expr::Literal(f64::from(op.apply(*a as f32, *b as f32)))
        }
        (Add, _, Expr::Literal(c)) if is_zero(*c, true) => lhs,
        (Sub, _, Expr::Literal(c)) if is_zero(*c, false) => lhs,
        (Add, Expr::Literal(c), _) if is_zero(*c, true) => rhs,
        (Mul, _, Expr::Literal(c)) | (Div, _, Expr::Literal(c)) if is_one(*c) => lhs,
        (Mul, Expr::Literal(c), _) if is_one(*c) => rhs,
        _ => Expr::binary(op, lhs, rhs),
    }
}

fn is_zero(value: f64, negative: bool) -> bool {
    let value = value as f32;
    value == 0.0 && value.is_sign_negative() == negative
}

fn is_one(value: f64) -> bool {
    value as f32 == 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::FuncKind;
    use crate::parser::parse;

    fn folded(source: &str) -> Expr {
        optimize(parse(source, "x").unwrap().body)
    }

    #[test]
    fn test_fold_consts() {
        assert_eq!(folded("1 + 2 * 3"), Expr::literal(7.0));
        assert_eq!(
            folded("x * (2 - 0.5)"),
            Expr::binary(OpKind::Mul, Expr::var("x"), Expr::literal(1.5))
        );
        assert_eq!(
            folded("exp(0) * x"),
            Expr::var("x"),
            "exp(0) folds to 1, then the multiplication by one disappears"
        );
        assert_eq!(
            folded("sin(x - 1 * 0)"),
            Expr::call(FuncKind::Sin, Expr::var("x"))
        );
    }

    #[test]
    fn test_fold_matches_f32_evaluation() {
        // 0.1 + 0.2 must fold to the f32 sum, not the f64 one
        let Expr::Literal(value) = folded("0.1 + 0.2") else {
            panic!("expected a literal");
        };
        assert_eq!(value as f32, 0.1f32 + 0.2f32);
    }

    #[test]
    fn test_neutral_elements() {
        let x = Expr::var("x");
        assert_eq!(folded("x - 0"), x);
        assert_eq!(folded("x + -0"), x);
        assert_eq!(folded("-0 + x"), x);
        assert_eq!(folded("x * 1"), x);
        assert_eq!(folded("1 * x"), x);
        assert_eq!(folded("x / 1"), x);
        // not neutral on the left
        assert_eq!(
            folded("0 - x"),
            Expr::binary(OpKind::Sub, Expr::literal(0.0), x.clone())
        );
        assert_eq!(
            folded("1 / x"),
            Expr::binary(OpKind::Div, Expr::literal(1.0), x.clone())
        );
        // -0 + 0 is +0, so adding positive zero is not neutral
        assert_eq!(
            folded("x + 0"),
            Expr::binary(OpKind::Add, x.clone(), Expr::literal(0.0))
        );
        assert_eq!(
            folded("0 + x"),
            Expr::binary(OpKind::Add, Expr::literal(0.0), x.clone())
        );
        assert!(matches!(folded("x - -0"), Expr::Binary(OpKind::Sub, _, _)));
        // x * 0 is NaN for infinite x
        assert_eq!(
            folded("x * 0"),
            Expr::binary(OpKind::Mul, x, Expr::literal(0.0))
        );
    }

    #[test]
    fn test_calls_keep_extra_arguments() {
        let expr = Expr::Call(FuncKind::Exp, vec![Expr::literal(1.0), Expr::literal(2.0)]);
        assert_eq!(optimize(expr.clone()), expr);
    }
}
