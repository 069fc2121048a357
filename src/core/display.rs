//! Infix rendering of expression trees.
//!
//! The output is meant for logs, error messages and test assertions, so it
//! favors readability: parentheses only where precedence demands them,
//! constants printed with `{}` (shortest round-trippable form), formal
//! parameters printed as `$0`, `$1`, ...

use std::fmt;

use super::expr::{BinaryOp, Expr, UnaryOp};

// Binding strength used to decide parenthesization.
fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add | BinaryOp::Sub => 1,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 2,
        BinaryOp::Pow => 3,
        BinaryOp::Min | BinaryOp::Max => 4,
    }
}

fn write_expr(f: &mut fmt::Formatter<'_>, e: &Expr, parent: u8) -> fmt::Result {
    match e {
        Expr::Const(v) => {
            if *v < 0.0 && parent > 0 {
                write!(f, "({})", v)
            } else {
                write!(f, "{}", v)
            }
        }
        Expr::Var(k) => write!(f, "${}", k),
        Expr::Unary(UnaryOp::Neg, a) => {
            if parent > 1 {
                write!(f, "(-")?;
                write_expr(f, a, 2)?;
                write!(f, ")")
            } else {
                write!(f, "-")?;
                write_expr(f, a, 2)
            }
        }
        Expr::Unary(op, a) => {
            write!(f, "{}(", op.name())?;
            write_expr(f, a, 0)?;
            write!(f, ")")
        }
        Expr::Binary(op @ (BinaryOp::Min | BinaryOp::Max), a, b) => {
            write!(f, "{}(", op.name())?;
            write_expr(f, a, 0)?;
            write!(f, ", ")?;
            write_expr(f, b, 0)?;
            write!(f, ")")
        }
        Expr::Binary(op, a, b) => {
            let prec = precedence(*op);
            let needs_parens = prec < parent;
            if needs_parens {
                write!(f, "(")?;
            }
            write_expr(f, a, prec)?;
            write!(f, "{}", op.name())?;
            // Right operand of a non-commutative operator binds tighter.
            let right_prec = match op {
                BinaryOp::Sub | BinaryOp::Div | BinaryOp::Pow => prec + 1,
                _ => prec,
            };
            write_expr(f, b, right_prec)?;
            if needs_parens {
                write!(f, ")")?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::expr::{BinaryOp, Expr, UnaryOp};

    fn bin(op: BinaryOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let e = bin(
            BinaryOp::Mul,
            bin(BinaryOp::Add, Expr::var(0), Expr::num(1.0)),
            Expr::var(1),
        );
        assert_eq!(e.to_string(), "($0+1)*$1");

        let e = bin(
            BinaryOp::Add,
            bin(BinaryOp::Mul, Expr::num(2.0), Expr::var(0)),
            Expr::num(3.0),
        );
        assert_eq!(e.to_string(), "2*$0+3");
    }

    #[test]
    fn right_associativity_of_sub_and_div() {
        let e = bin(
            BinaryOp::Sub,
            Expr::var(0),
            bin(BinaryOp::Sub, Expr::var(1), Expr::var(2)),
        );
        assert_eq!(e.to_string(), "$0-($1-$2)");

        let e = bin(
            BinaryOp::Div,
            Expr::var(0),
            bin(BinaryOp::Mul, Expr::var(1), Expr::var(2)),
        );
        assert_eq!(e.to_string(), "$0/($1*$2)");
    }

    #[test]
    fn functions_and_negation() {
        let e = Expr::Unary(
            UnaryOp::Sin,
            Box::new(bin(BinaryOp::Add, Expr::var(0), Expr::num(1.0))),
        );
        assert_eq!(e.to_string(), "sin($0+1)");

        let e = bin(
            BinaryOp::Mul,
            Expr::Unary(UnaryOp::Neg, Box::new(Expr::var(0))),
            Expr::var(1),
        );
        assert_eq!(e.to_string(), "(-$0)*$1");
    }
}
