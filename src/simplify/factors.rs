//! Multiplicative factor collection.
//!
//! Flattens a `*`/`/`/`sqrt`/`^` spine into `(base, exponent)` pairs with
//! symbolic exponents (`sqrt` halves, division negates, nested powers
//! multiply), merges equal bases by adding exponents, applies the
//! tan/sin/cos ratio rewrites, and rebuilds the tree as
//! `constant * numerator / denominator` with negative exponents moved
//! into the denominator.

use crate::core::{BinaryOp, Expr, UnaryOp};

use super::terms::simplify_terms;
use super::{add, div, mul, neg, pow};

// A collected factor: base ^ expo. `base == None` marks a factor consumed
// by a rewrite. Pure constants are folded into the scalar coefficient
// instead of being stored here.
struct Factor {
    base: Option<Expr>,
    expo: Expr,
}

fn merge_or_push(a: Expr, expo: &Expr, v: &mut Vec<Factor>) {
    for f in v.iter_mut() {
        if f.base.as_ref() == Some(&a) {
            let old = std::mem::replace(&mut f.expo, Expr::Const(0.0));
            f.expo = add(old, expo.clone());
            return;
        }
    }
    v.push(Factor {
        base: Some(a),
        expo: expo.clone(),
    });
}

fn collect(mut a: Expr, expo: &Expr, constant: &mut f64, v: &mut Vec<Factor>) {
    if matches!(
        a,
        Expr::Binary(BinaryOp::Add | BinaryOp::Sub, _, _)
    ) {
        a = simplify_terms(a);
    }
    if let (Some(base), Some(e)) = (a.const_value(), expo.const_value()) {
        *constant *= base.powf(e);
        return;
    }
    match a {
        Expr::Binary(BinaryOp::Mul, c1, c2) => {
            collect(*c1, expo, constant, v);
            collect(*c2, expo, constant, v);
        }
        Expr::Binary(BinaryOp::Div, c1, c2) => {
            collect(*c1, expo, constant, v);
            collect(*c2, &neg(expo.clone()), constant, v);
        }
        Expr::Unary(UnaryOp::Neg, c) => {
            collect(*c, expo, constant, v);
            collect(Expr::Const(-1.0), expo, constant, v);
        }
        Expr::Unary(UnaryOp::Sqrt, c) => {
            collect(*c, &mul(Expr::Const(0.5), expo.clone()), constant, v);
        }
        Expr::Binary(BinaryOp::Pow, c1, c2) => {
            let inner = mul(*c2, expo.clone());
            collect(*c1, &inner, constant, v);
        }
        leaf => merge_or_push(leaf, expo, v),
    }
}

// The argument of tan(t)/sin(t)/cos(t), if the base is that call.
fn trig_arg(base: &Option<Expr>, op: UnaryOp) -> Option<&Expr> {
    match base {
        Some(Expr::Unary(o, arg)) if *o == op => Some(arg),
        _ => None,
    }
}

// Structural check for e1 == -e2.
fn opposite(e1: &Expr, e2: &Expr) -> bool {
    *e1 == neg(e2.clone())
}

// tan(t)^a*cos(t)^a -> sin(t)^a, tan(t)^a*sin(t)^-a -> cos(t)^-a,
// sin(t)^a*cos(t)^-a -> tan(t)^a. Same argument required on both sides.
fn trig_rewrites(v: &mut [Factor]) {
    for i in 0..v.len() {
        if let Some(t) = trig_arg(&v[i].base, UnaryOp::Tan).cloned() {
            for j in 0..v.len() {
                if i == j || v[j].base.is_none() {
                    continue;
                }
                if trig_arg(&v[j].base, UnaryOp::Cos) == Some(&t) && v[j].expo == v[i].expo {
                    v[i].base = Some(Expr::Unary(UnaryOp::Sin, Box::new(t.clone())));
                    v[j].base = None;
                } else if trig_arg(&v[j].base, UnaryOp::Sin) == Some(&t)
                    && opposite(&v[j].expo, &v[i].expo)
                {
                    let e = v[j].expo.clone();
                    v[i].base = Some(Expr::Unary(UnaryOp::Cos, Box::new(t.clone())));
                    v[i].expo = e;
                    v[j].base = None;
                }
            }
        }
    }
    for i in 0..v.len() {
        if let Some(t) = trig_arg(&v[i].base, UnaryOp::Sin).cloned() {
            for j in 0..v.len() {
                if i == j || v[j].base.is_none() {
                    continue;
                }
                if trig_arg(&v[j].base, UnaryOp::Cos) == Some(&t)
                    && opposite(&v[j].expo, &v[i].expo)
                {
                    v[i].base = Some(Expr::Unary(UnaryOp::Tan, Box::new(t.clone())));
                    v[j].base = None;
                }
            }
        }
    }
}

// Rewrites can leave two factors with equal bases; merge them so that a
// second collection pass sees nothing new.
fn remerge(v: &mut Vec<Factor>) {
    let mut i = 0;
    while i < v.len() {
        if v[i].base.is_none() {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < v.len() {
            if v[i].base == v[j].base {
                let e2 = std::mem::replace(&mut v[j].expo, Expr::Const(0.0));
                let e1 = std::mem::replace(&mut v[i].expo, Expr::Const(0.0));
                v[i].expo = add(e1, e2);
                v[j].base = None;
            }
            j += 1;
        }
        i += 1;
    }
}

fn is_negative_expo(e: &Expr) -> bool {
    matches!(e, Expr::Const(c) if *c < 0.0) || matches!(e, Expr::Unary(UnaryOp::Neg, _))
}

/// Collect multiplicative factors, merge equal bases, rewrite trig ratios
/// and rebuild as `constant * numerator / denominator`.
pub(crate) fn simplify_factors(a: Expr) -> Expr {
    let mut constant = 1.0;
    let mut v = Vec::new();
    collect(a, &Expr::Const(1.0), &mut constant, &mut v);
    trig_rewrites(&mut v);
    remerge(&mut v);

    let mut num: Option<Expr> = None;
    let mut den: Option<Expr> = None;
    for f in v {
        let base = match f.base {
            Some(b) => b,
            None => continue,
        };
        if is_negative_expo(&f.expo) {
            let piece = pow(base, neg(f.expo));
            den = Some(match den {
                None => piece,
                Some(d) => mul(d, piece),
            });
        } else {
            let piece = pow(base, f.expo);
            num = Some(match num {
                None => piece,
                Some(n) => mul(n, piece),
            });
        }
    }
    match (num, den) {
        (None, None) => Expr::Const(constant),
        (Some(n), None) => mul(Expr::Const(constant), n),
        (None, Some(d)) => div(Expr::Const(constant), d),
        (Some(n), Some(d)) => div(mul(Expr::Const(constant), n), d),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{div, mul, pow, simplify, sqr, unary};
    use crate::core::{BinaryOp, Expr, UnaryOp};

    fn raw(op: BinaryOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    #[test]
    fn merges_equal_bases() {
        // x * x -> x^2
        let x = Expr::var(0);
        assert_eq!(simplify(sqr(x.clone())).to_string(), "$0^2");
        // x^2 * x^3 -> x^5
        let e = raw(
            BinaryOp::Mul,
            pow(x.clone(), Expr::num(2.0)),
            pow(x.clone(), Expr::num(3.0)),
        );
        assert_eq!(simplify(e).to_string(), "$0^5");
    }

    #[test]
    fn division_cancels_factors() {
        // (x*y) / x -> y
        let e = raw(
            BinaryOp::Div,
            raw(BinaryOp::Mul, Expr::var(0), Expr::var(1)),
            Expr::var(0),
        );
        assert_eq!(simplify(e), Expr::var(1));
    }

    #[test]
    fn sqrt_becomes_half_exponent() {
        // sqrt(x) * sqrt(x) -> x
        let x = Expr::var(0);
        let s = Expr::Unary(UnaryOp::Sqrt, Box::new(x.clone()));
        let e = raw(BinaryOp::Mul, s.clone(), s);
        assert_eq!(simplify(e), x);
    }

    #[test]
    fn negative_exponents_go_to_denominator() {
        // x^-2 * y -> y / x^2
        let e = raw(
            BinaryOp::Mul,
            raw(BinaryOp::Pow, Expr::var(0), Expr::num(-2.0)),
            Expr::var(1),
        );
        assert_eq!(simplify(e).to_string(), "$1/$0^2");
    }

    #[test]
    fn constants_fold_into_coefficient() {
        // 2 * x * 3 / 4 -> 1.5 * x
        let e = raw(
            BinaryOp::Div,
            raw(
                BinaryOp::Mul,
                raw(BinaryOp::Mul, Expr::num(2.0), Expr::var(0)),
                Expr::num(3.0),
            ),
            Expr::num(4.0),
        );
        assert_eq!(simplify(e).to_string(), "1.5*$0");
    }

    #[test]
    fn tan_times_cos_is_sin() {
        let t = Expr::var(0);
        let e = raw(
            BinaryOp::Mul,
            unary(UnaryOp::Tan, t.clone()),
            unary(UnaryOp::Cos, t.clone()),
        );
        assert_eq!(simplify(e), unary(UnaryOp::Sin, t));
    }

    #[test]
    fn tan_over_sin_is_one_over_cos() {
        let t = Expr::var(0);
        let e = raw(
            BinaryOp::Div,
            unary(UnaryOp::Tan, t.clone()),
            unary(UnaryOp::Sin, t.clone()),
        );
        // tan/sin = 1/cos
        assert_eq!(simplify(e).to_string(), "1/cos($0)");
    }

    #[test]
    fn sin_over_cos_is_tan() {
        let t = Expr::var(0);
        let e = raw(
            BinaryOp::Div,
            unary(UnaryOp::Sin, t.clone()),
            unary(UnaryOp::Cos, t.clone()),
        );
        assert_eq!(simplify(e), unary(UnaryOp::Tan, t));
    }

    #[test]
    fn trig_rewrite_requires_same_argument() {
        let e = raw(
            BinaryOp::Mul,
            unary(UnaryOp::Tan, Expr::var(0)),
            unary(UnaryOp::Cos, Expr::var(1)),
        );
        let s = simplify(e.clone());
        // Different arguments: value preserved, no sin() introduced.
        let vals = [0.4, 1.1];
        assert!((s.eval_with(&vals) - e.eval_with(&vals)).abs() < 1e-12);
        assert!(s.to_string().contains("tan"));
    }

    #[test]
    fn rewrite_then_merge_stays_idempotent() {
        // tan(t)*cos(t)*sin(t) -> sin(t)^2 in one pass.
        let t = Expr::var(0);
        let e = raw(
            BinaryOp::Mul,
            raw(
                BinaryOp::Mul,
                unary(UnaryOp::Tan, t.clone()),
                unary(UnaryOp::Cos, t.clone()),
            ),
            unary(UnaryOp::Sin, t.clone()),
        );
        let once = simplify(e);
        assert_eq!(once.to_string(), "sin($0)^2");
        assert_eq!(simplify(once.clone()), once);
    }

    #[test]
    fn value_preserved_by_factor_rebuild() {
        // (2*x) / (x*x) * y
        let x = Expr::var(0);
        let y = Expr::var(1);
        let e = mul(
            div(mul(Expr::num(2.0), x.clone()), mul(x.clone(), x.clone())),
            y.clone(),
        );
        let s = simplify(raw(BinaryOp::Mul, e.clone(), Expr::num(1.0)));
        for vals in [[2.0, 3.0], [0.5, -4.0]] {
            assert!((s.eval_with(&vals) - e.eval_with(&vals)).abs() < 1e-12);
        }
    }
}
