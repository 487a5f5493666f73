//! Constant folding.
//!
//! The only optimization the compiler performs: a pure, bottom-up rewrite
//! that collapses arithmetic over integer literals before code generation.
//! It runs once per assignment right-hand side and once per call argument.
//!
//! Arithmetic wraps in 64 bits; range enforcement belongs to the back end,
//! which knows the target type.  The one failure here is a constant
//! division by zero.

use crate::common::{ErrorKind, Result};
use crate::front::ast::{BinOp, Expr};

/// Fold an expression subtree.  Non-constant subtrees pass through
/// unchanged, so the result is the input shape with every closed integer
/// computation collapsed to a literal.  Idempotent.
pub fn fold_expr(expr: Expr) -> Result<Expr> {
    match expr {
        Expr::Negation { inner, location } => {
            let inner = fold_expr(*inner)?;
            match inner {
                Expr::Integer { value, .. } => Ok(Expr::Integer {
                    value: value.wrapping_neg(),
                    location,
                }),
                inner => Ok(Expr::Negation {
                    inner: Box::new(inner),
                    location,
                }),
            }
        }
        Expr::Binary {
            op,
            left,
            right,
            location,
        } => {
            let left = fold_expr(*left)?;
            let right = fold_expr(*right)?;
            match (&left, &right) {
                (Expr::Integer { value: a, .. }, Expr::Integer { value: b, .. }) => {
                    let value = match op {
                        BinOp::Add => a.wrapping_add(*b),
                        BinOp::Sub => a.wrapping_sub(*b),
                        BinOp::Mul => a.wrapping_mul(*b),
                        BinOp::Div => {
                            if *b == 0 {
                                return Err(ErrorKind::DivisionByZero.at(location));
                            }
                            a.wrapping_div(*b)
                        }
                    };
                    Ok(Expr::Integer { value, location })
                }
                _ => Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    location,
                }),
            }
        }
        Expr::TypeCast {
            inner,
            target,
            location,
        } => Ok(Expr::TypeCast {
            inner: Box::new(fold_expr(*inner)?),
            target,
            location,
        }),
        // Identifiers, literals, and calls pass through; call arguments
        // are folded when the call itself is compiled.
        expr => Ok(expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::front::parse;
    use crate::front::ast::{Decl, Program};

    fn initializer(source: &str) -> Expr {
        let Program { decls } = parse(source, "test.mc").unwrap();
        match decls.into_iter().next() {
            Some(Decl::Variable { initializer, .. }) => initializer,
            other => panic!("expected a variable declaration, got {other:?}"),
        }
    }

    fn folded(source: &str) -> Expr {
        fold_expr(initializer(source)).unwrap()
    }

    #[test]
    fn folds_closed_arithmetic_to_a_literal() {
        assert!(matches!(
            folded("i32 a = 5 + 3 * 2;"),
            Expr::Integer { value: 11, .. }
        ));
        assert!(matches!(
            folded("i32 a = (10 - 4) / 3;"),
            Expr::Integer { value: 2, .. }
        ));
    }

    #[test]
    fn folds_negation() {
        assert!(matches!(
            folded("i32 a = -(2 + 3);"),
            Expr::Integer { value: -5, .. }
        ));
    }

    #[test]
    fn keeps_casts_around_folded_literals() {
        let expr = folded("u8 a = (300 - 44) : u8;");
        let Expr::TypeCast { inner, target, .. } = expr else {
            panic!("expected a cast to survive folding");
        };
        assert_eq!(target.name, id("u8"));
        assert!(matches!(*inner, Expr::Integer { value: 256, .. }));
    }

    #[test]
    fn leaves_identifiers_untouched() {
        let expr = folded("i32 a = b + 2;");
        assert!(matches!(expr, Expr::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn division_by_zero_is_rejected() {
        let error = fold_expr(initializer("i32 a = 1 / 0;")).unwrap_err();
        assert_eq!(error.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn wraps_modulo_two_to_the_sixty_four() {
        assert!(matches!(
            folded("i32 a = 9223372036854775807 + 1;"),
            Expr::Integer {
                value: i64::MIN,
                ..
            }
        ));
    }

    #[test]
    fn folding_is_idempotent() {
        for source in ["i32 a = 5 + 3 * 2;", "i32 a = b + 2 * 3;", "i32 a = -f(1);"] {
            let once = fold_expr(initializer(source)).unwrap();
            let twice = fold_expr(once.clone()).unwrap();
            assert_eq!(once, twice, "folding {source} twice changed the tree");
        }
    }
}
