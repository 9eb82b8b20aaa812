//! Monadic and dyadic scalar functions.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{EvalErrorKind, Result};
use crate::token::Tok;
use crate::workspace::{DataType, Desc, Workspace, CHAR_SIZE, NUM_SIZE};

use super::{as_int, conformable, ArrayView};

/// Lanczos approximation (g = 7, n = 9) backing `!` and the binomial.
/// The standard library has no gamma function.
fn gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection for the left half-plane.
        std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * gamma(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut acc = COEF[0];
        for (i, &c) in COEF.iter().enumerate().skip(1) {
            acc += c / (x + i as f64);
        }
        let t = x + G + 0.5;
        (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * acc
    }
}

/// `!x` is gamma(x+1); negative integers are outside the domain.
fn factorial(x: f64) -> Result<f64> {
    if let Some(i) = as_int(x) {
        if i < 0 {
            return Err(EvalErrorKind::Domain.into());
        }
    }
    Ok(gamma(x + 1.0))
}

/// `X!Y` ←→ (!Y)÷(!X)×!Y−X
fn binomial(x: f64, y: f64) -> Result<f64> {
    if as_int(x).is_some_and(|i| i < 0) || as_int(y).is_some_and(|i| i < 0) {
        return Err(EvalErrorKind::Domain.into());
    }
    Ok(gamma(y + 1.0) / (gamma(x + 1.0) * gamma((y - x) + 1.0)))
}

/// `L ○ R`: trigonometric / hyperbolic / inverse / sqrt variants selected
/// by the integer left operand, −7..7.
fn circular(fun: f64, arg: f64) -> Result<f64> {
    let sel = as_int(fun).ok_or(EvalErrorKind::Domain)?;
    let out = match sel {
        -7 if arg > -1.0 && arg < 1.0 => arg.atanh(),
        -6 if arg >= 1.0 => arg.acosh(),
        -5 => arg.asinh(),
        -4 if arg <= -1.0 || arg >= 1.0 => (arg * arg - 1.0).sqrt(),
        -3 => arg.atan(),
        -2 if (-1.0..=1.0).contains(&arg) => arg.acos(),
        -1 if (-1.0..=1.0).contains(&arg) => arg.asin(),
        0 if (-1.0..=1.0).contains(&arg) => (1.0 - arg * arg).sqrt(),
        1 => arg.sin(),
        2 => arg.cos(),
        3 => arg.tan(),
        4 => (1.0 + arg * arg).sqrt(),
        5 => arg.sinh(),
        6 => arg.cosh(),
        7 => arg.tanh(),
        _ => return Err(EvalErrorKind::Domain.into()),
    };
    Ok(out)
}

fn require_bool(v: f64) -> Result<bool> {
    if v == 0.0 {
        Ok(false)
    } else if v == 1.0 {
        Ok(true)
    } else {
        Err(EvalErrorKind::Domain.into())
    }
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// One application of a dyadic scalar numeric primitive. This single
/// kernel also backs reduction, scan and the products.
pub fn dyadic_scalar_num(fun: Tok, l: f64, r: f64) -> Result<f64> {
    let res = match fun {
        Tok::Circle => circular(l, r)?,
        Tok::UpStile => l.max(r),
        Tok::DownStile => l.min(r),
        Tok::Plus => l + r,
        Tok::Minus => l - r,
        Tok::Times => l * r,
        Tok::Div => {
            if r == 0.0 {
                return Err(EvalErrorKind::DivideByZero.into());
            }
            l / r
        }
        Tok::Star => l.powf(r),
        Tok::CircleStar => {
            // L⍟R: log of R base L.
            if r <= 0.0 || l <= 0.0 || l == 1.0 {
                return Err(EvalErrorKind::Domain.into());
            }
            r.ln() / l.ln()
        }
        Tok::ExclMark => binomial(l, r)?,
        Tok::Stile => {
            if l != 0.0 {
                r % l
            } else if r >= 0.0 {
                r
            } else {
                return Err(EvalErrorKind::Domain.into());
            }
        }
        Tok::And => bool_num(require_bool(l)? && require_bool(r)?),
        Tok::Or => bool_num(require_bool(l)? || require_bool(r)?),
        Tok::Nand => bool_num(!(require_bool(l)? && require_bool(r)?)),
        Tok::Nor => bool_num(!(require_bool(l)? || require_bool(r)?)),
        Tok::LessThan => bool_num(l < r),
        Tok::Equal => bool_num(l == r),
        Tok::GreaterThan => bool_num(l > r),
        Tok::LessOrEqual => bool_num(l <= r),
        Tok::NotEqual => bool_num(l != r),
        Tok::GreaterOrEqual => bool_num(l >= r),
        _ => return Err(EvalErrorKind::NotImplemented.into()),
    };
    Ok(res)
}

/// Shape bookkeeping shared by the elementwise kernels. Returns the
/// element count and the result descriptor skeleton (type still unset).
fn elementwise_frame(l: &Desc, r: &Desc) -> Result<(usize, Desc)> {
    let mut out = *r;
    let nelem = match (l.is_array(), r.is_array()) {
        (false, false) => 1,
        (false, true) => r.nelem(),
        (true, false) => {
            out.rank = l.rank;
            out.shape = l.shape;
            l.nelem()
        }
        (true, true) => {
            if !conformable(l, r) {
                return Err(EvalErrorKind::NotConformable.into());
            }
            r.nelem()
        }
    };
    Ok((nelem, out))
}

fn dyadic_num_elementwise(ws: &mut Workspace, fun: Tok, l: Desc, r: Desc) -> Result<()> {
    let (nelem, mut out) = elementwise_frame(&l, &r)?;
    let lv = ArrayView::from_desc(&l);
    let rv = ArrayView::from_desc(&r);
    out.dtype = DataType::Num;
    if nelem == 1 {
        // One-element results collapse to a scalar.
        out.rank = 0;
        out.num = dyadic_scalar_num(fun, lv.num(ws, 0), rv.num(ws, 0))?;
        out.doff = 0;
    } else {
        let dst = ws.temp_alloc(NUM_SIZE, nelem)?;
        for i in 0..nelem {
            let v = dyadic_scalar_num(fun, lv.num(ws, i), rv.num(ws, i))?;
            ws.set_f64(dst + i * NUM_SIZE, v);
        }
        out.doff = dst;
    }
    ws.opr_set_top(&out);
    Ok(())
}

fn dyadic_chr_elementwise(ws: &mut Workspace, fun: Tok, l: Desc, r: Desc) -> Result<()> {
    if fun != Tok::Equal && fun != Tok::NotEqual {
        return Err(EvalErrorKind::Domain.into());
    }
    let (nelem, mut out) = elementwise_frame(&l, &r)?;
    let lv = ArrayView::from_desc(&l);
    let rv = ArrayView::from_desc(&r);
    out.dtype = DataType::Num;
    let eq = fun == Tok::Equal;
    if nelem == 1 {
        out.rank = 0;
        out.num = bool_num((lv.chr(ws, 0) == rv.chr(ws, 0)) == eq);
        out.doff = 0;
    } else {
        let dst = ws.temp_alloc(NUM_SIZE, nelem)?;
        for i in 0..nelem {
            let v = bool_num((lv.chr(ws, i) == rv.chr(ws, i)) == eq);
            ws.set_f64(dst + i * NUM_SIZE, v);
        }
        out.doff = dst;
    }
    ws.opr_set_top(&out);
    Ok(())
}

/// Mixed character/numeric operands: only `=` and `≠` are legal and the
/// answer is all zeros (for `=`) or all ones (for `≠`).
fn dyadic_mixed_elementwise(ws: &mut Workspace, fun: Tok, l: Desc, r: Desc) -> Result<()> {
    if fun != Tok::Equal && fun != Tok::NotEqual {
        return Err(EvalErrorKind::Domain.into());
    }
    let (nelem, mut out) = elementwise_frame(&l, &r)?;
    out.dtype = DataType::Num;
    let fill = bool_num(fun == Tok::NotEqual);
    if nelem == 1 {
        out.rank = 0;
        out.num = fill;
        out.doff = 0;
    } else {
        let dst = ws.temp_alloc(NUM_SIZE, nelem)?;
        for i in 0..nelem {
            ws.set_f64(dst + i * NUM_SIZE, fill);
        }
        out.doff = dst;
    }
    ws.opr_set_top(&out);
    Ok(())
}

/// Elementwise dyadic scalar application after shape expansion. The left
/// operand is on top of the stack; the result lands in the right
/// operand's slot.
pub fn dyadic_elementwise(ws: &mut Workspace, fun: Tok) -> Result<()> {
    let l = ws.opr_pop();
    let r = ws.opr_top_desc();
    match (l.dtype.is_number(), r.dtype.is_number()) {
        (true, true) => dyadic_num_elementwise(ws, fun, l, r),
        (false, true) | (true, false) => dyadic_mixed_elementwise(ws, fun, l, r),
        (false, false) => dyadic_chr_elementwise(ws, fun, l, r),
    }
}

fn roll(n: f64, origin: usize, rng: &mut StdRng) -> Result<f64> {
    let n = as_int(n).ok_or(EvalErrorKind::Domain)?;
    if n < 0 {
        return Err(EvalErrorKind::Domain.into());
    }
    if n == 0 {
        Ok(rng.gen::<f64>())
    } else {
        Ok((rng.gen_range(0..n) + origin as i64) as f64)
    }
}

fn monadic_scalar_num(fun: Tok, v: f64, origin: usize, rng: &mut StdRng) -> Result<f64> {
    let res = match fun {
        Tok::Plus => v,
        Tok::Minus => -v,
        Tok::Times => {
            if v == 0.0 {
                0.0
            } else if v < 0.0 {
                -1.0
            } else {
                1.0
            }
        }
        Tok::Div => {
            if v == 0.0 {
                return Err(EvalErrorKind::DivideByZero.into());
            }
            1.0 / v
        }
        Tok::Stile => v.abs(),
        Tok::UpStile => v.ceil(),
        Tok::DownStile => v.floor(),
        Tok::Star => v.exp(),
        Tok::CircleStar => {
            if v == 0.0 {
                return Err(EvalErrorKind::Domain.into());
            }
            v.ln()
        }
        Tok::Circle => v * std::f64::consts::PI,
        Tok::Tilde => {
            if v == 0.0 {
                1.0
            } else if v == 1.0 {
                0.0
            } else {
                return Err(EvalErrorKind::Domain.into());
            }
        }
        Tok::ExclMark => factorial(v)?,
        Tok::QuestionMark => roll(v, origin, rng)?,
        _ => return Err(EvalErrorKind::NotImplemented.into()),
    };
    Ok(res)
}

/// Monadic scalar functions plus ravel, applied in place to the top of
/// the stack.
pub fn monadic_scalar(
    ws: &mut Workspace,
    fun: Tok,
    origin: usize,
    rng: &mut StdRng,
) -> Result<()> {
    let mut d = ws.opr_top_desc();

    // Characters only ravel.
    if d.is_char() && fun != Tok::Comma {
        return Err(EvalErrorKind::Domain.into());
    }

    if d.is_scalar() {
        match fun {
            Tok::Comma => {
                if d.is_char() {
                    let dst = ws.temp_alloc(CHAR_SIZE, 1)?;
                    ws.set_u32(dst, d.chr);
                    d.doff = dst;
                } else {
                    let dst = ws.temp_alloc(NUM_SIZE, 1)?;
                    ws.set_f64(dst, d.num);
                    d.doff = dst;
                }
                d.set_shape(&[1]);
            }
            _ => d.num = monadic_scalar_num(fun, d.num, origin, rng)?,
        }
        ws.opr_set_top(&d);
        return Ok(());
    }

    let nelem = d.nelem();
    match fun {
        Tok::Plus => {}
        Tok::Comma => {
            // Ravel is a descriptor change only.
            d.set_shape(&[nelem]);
            ws.opr_set_top(&d);
        }
        _ => {
            let src = d.doff;
            let dst = ws.temp_alloc(NUM_SIZE, nelem)?;
            for i in 0..nelem {
                let v = ws.f64_at(src + i * NUM_SIZE);
                let v = monadic_scalar_num(fun, v, origin, rng)?;
                ws.set_f64(dst + i * NUM_SIZE, v);
            }
            d.doff = dst;
            ws.opr_set_top(&d);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Tok::Plus, 2.0, 3.0, 5.0)]
    #[case(Tok::Minus, 2.0, 3.0, -1.0)]
    #[case(Tok::Times, 2.0, 3.0, 6.0)]
    #[case(Tok::Div, 3.0, 4.0, 0.75)]
    #[case(Tok::UpStile, 2.0, 3.0, 3.0)]
    #[case(Tok::DownStile, 2.0, 3.0, 2.0)]
    #[case(Tok::Star, 2.0, 10.0, 1024.0)]
    #[case(Tok::Stile, 3.0, 7.0, 1.0)]
    #[case(Tok::LessThan, 2.0, 3.0, 1.0)]
    #[case(Tok::GreaterOrEqual, 2.0, 3.0, 0.0)]
    #[case(Tok::And, 1.0, 1.0, 1.0)]
    #[case(Tok::Nor, 0.0, 0.0, 1.0)]
    fn dyadic_table(#[case] fun: Tok, #[case] l: f64, #[case] r: f64, #[case] want: f64) {
        assert_eq!(dyadic_scalar_num(fun, l, r).unwrap(), want);
    }

    #[test]
    fn dyadic_domain_failures() {
        assert!(dyadic_scalar_num(Tok::Div, 1.0, 0.0).is_err());
        assert!(dyadic_scalar_num(Tok::And, 2.0, 1.0).is_err());
        assert!(dyadic_scalar_num(Tok::Stile, 0.0, -1.0).is_err());
        // 0|R with non-negative R passes R through.
        assert_eq!(dyadic_scalar_num(Tok::Stile, 0.0, 4.0).unwrap(), 4.0);
    }

    #[test]
    fn gamma_matches_integer_factorials() {
        for (n, want) in [(0.0, 1.0), (1.0, 1.0), (5.0, 120.0), (10.0, 3628800.0)] {
            let got = factorial(n).unwrap();
            assert!((got - want).abs() < 1e-6 * want.max(1.0), "{n}! = {got}");
        }
        assert!(factorial(-3.0).is_err());
        // Half-integer check: (1/2)! = gamma(3/2) = sqrt(pi)/2.
        let half = factorial(0.5).unwrap();
        assert!((half - std::f64::consts::PI.sqrt() / 2.0).abs() < 1e-10);
    }

    #[test]
    fn binomial_chooses() {
        assert!((binomial(2.0, 5.0).unwrap() - 10.0).abs() < 1e-9);
        assert!((binomial(0.0, 7.0).unwrap() - 1.0).abs() < 1e-9);
        assert!(binomial(-1.0, 5.0).is_err());
    }

    #[rstest]
    #[case(1, 0.5)]
    #[case(2, 0.5)]
    #[case(3, 0.5)]
    #[case(5, 0.5)]
    #[case(-5, 0.5)]
    fn circular_inverts(#[case] sel: i32, #[case] x: f64) {
        let fwd = circular(sel as f64, x).unwrap();
        let back = circular(-sel as f64, fwd).unwrap();
        assert!((back - x).abs() < 1e-12);
    }

    #[test]
    fn circular_domain() {
        assert!(circular(-1.0, 2.0).is_err());
        assert!(circular(8.0, 0.0).is_err());
        assert_eq!(circular(0.0, 0.0).unwrap(), 1.0);
    }
}
