//! Reduction, scan, and the inner and outer products.

use crate::error::{EvalErrorKind, Result};
use crate::token::Tok;
use crate::workspace::{DataType, Desc, Workspace, MAX_RANK, NUM_SIZE};

use super::scalar::dyadic_scalar_num;
use super::ArrayView;

/// Identity element of a dyadic scalar primitive, for reductions over an
/// empty axis. `○` has none.
fn ident_element(fun: Tok) -> Result<f64> {
    let id = match fun {
        Tok::UpStile => -f64::MAX,
        Tok::DownStile => f64::MAX,
        Tok::Equal
        | Tok::Times
        | Tok::Div
        | Tok::ExclMark
        | Tok::Star
        | Tok::And
        | Tok::Nor
        | Tok::LessOrEqual
        | Tok::GreaterOrEqual => 1.0,
        Tok::Circle => return Err(EvalErrorKind::Domain.into()),
        _ => 0.0,
    };
    Ok(id)
}

/// `fun/[axis]A`: fold right-to-left along one axis, removing it.
pub fn reduce(ws: &mut Workspace, fun: Tok, axis: usize) -> Result<()> {
    let mut d = ws.opr_top_desc();
    if !d.is_array() {
        return Ok(());
    }
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }

    let v = ArrayView::from_desc(&d);
    let rank = v.rank;
    let ax_len = v.shape[axis];
    let inner = v.inner[axis];
    let outer = v.outer[axis];

    let mut new_shape = Vec::with_capacity(rank - 1);
    for i in 0..rank {
        if i != axis {
            new_shape.push(v.shape[i]);
        }
    }
    let new_nelem: usize = new_shape.iter().product();

    // A singleton axis only reshapes; an empty axis yields the identity.
    if ax_len == 1 {
        if new_shape.is_empty() {
            d = Desc::scalar_num(ws.f64_at(v.elems));
        } else {
            d.set_shape(&new_shape);
        }
        ws.opr_set_top(&d);
        return Ok(());
    }
    if ax_len == 0 {
        let id = ident_element(fun)?;
        if new_shape.is_empty() {
            d = Desc::scalar_num(id);
        } else {
            let dst = ws.temp_alloc(NUM_SIZE, new_nelem)?;
            for i in 0..new_nelem {
                ws.set_f64(dst + i * NUM_SIZE, id);
            }
            d.set_shape(&new_shape);
            d.doff = dst;
        }
        ws.opr_set_top(&d);
        return Ok(());
    }
    if v.nelem == 0 {
        // Some other axis is empty; the result is empty too.
        d.set_shape(&new_shape);
        ws.opr_set_top(&d);
        return Ok(());
    }

    let src = v.elems;
    let fold = |ws: &Workspace, o: usize, k: usize| -> Result<f64> {
        let lane = |j: usize| src + (o * ax_len * inner + j * inner + k) * NUM_SIZE;
        let mut acc = ws.f64_at(lane(ax_len - 1));
        for j in (0..ax_len - 1).rev() {
            acc = dyadic_scalar_num(fun, ws.f64_at(lane(j)), acc)?;
        }
        Ok(acc)
    };

    if new_shape.is_empty() {
        let acc = fold(ws, 0, 0)?;
        d = Desc::scalar_num(acc);
    } else {
        let dst = ws.temp_alloc(NUM_SIZE, new_nelem)?;
        let mut w = 0usize;
        for o in 0..outer {
            for k in 0..inner {
                let acc = fold(ws, o, k)?;
                ws.set_f64(dst + w * NUM_SIZE, acc);
                w += 1;
            }
        }
        d.dtype = DataType::Num;
        d.set_shape(&new_shape);
        d.doff = dst;
    }
    ws.opr_set_top(&d);
    Ok(())
}

/// Operators whose scan cannot be done in one accumulation pass; each
/// prefix takes a full right-to-left fold.
fn scan_is_quadratic(fun: Tok) -> bool {
    matches!(
        fun,
        Tok::Minus
            | Tok::Div
            | Tok::Stile
            | Tok::Star
            | Tok::ExclMark
            | Tok::LessThan
            | Tok::Equal
            | Tok::GreaterThan
            | Tok::LessOrEqual
            | Tok::NotEqual
            | Tok::GreaterOrEqual
    )
}

/// `fun\[axis]A`: cumulative fold along one axis, shape preserved.
pub fn scan(ws: &mut Workspace, fun: Tok, axis: usize) -> Result<()> {
    let mut d = ws.opr_top_desc();
    if !d.is_array() {
        return Ok(());
    }
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }

    let v = ArrayView::from_desc(&d);
    if v.nelem == 0 {
        return Ok(());
    }
    let ax_len = v.shape[axis];
    let inner = v.inner[axis];
    let outer = v.outer[axis];
    let src = v.elems;

    let dst = ws.temp_alloc(NUM_SIZE, v.nelem)?;
    let lane = |j: usize, o: usize, k: usize| (o * ax_len * inner + j * inner + k) * NUM_SIZE;

    for o in 0..outer {
        for k in 0..inner {
            if scan_is_quadratic(fun) {
                for pos in 0..ax_len {
                    let mut acc = ws.f64_at(src + lane(pos, o, k));
                    for j in (0..pos).rev() {
                        acc = dyadic_scalar_num(fun, ws.f64_at(src + lane(j, o, k)), acc)?;
                    }
                    ws.set_f64(dst + lane(pos, o, k), acc);
                }
            } else {
                let mut acc = ws.f64_at(src + lane(0, o, k));
                ws.set_f64(dst + lane(0, o, k), acc);
                for j in 1..ax_len {
                    acc = dyadic_scalar_num(fun, acc, ws.f64_at(src + lane(j, o, k)))?;
                    ws.set_f64(dst + lane(j, o, k), acc);
                }
            }
        }
    }

    d.doff = dst;
    ws.opr_set_top(&d);
    Ok(())
}

/// `L f.g R`: shapes must share the joining axis; the result drops it
/// from both sides. `+.×` takes the direct path.
pub fn inner_product(ws: &mut Workspace, fun_l: Tok, fun_r: Tok) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let lv = ArrayView::from_desc(&ldesc);
    let rv = ArrayView::from_desc(&rdesc);

    let n = lv.shape[lv.rank - 1];
    if n != rv.shape[0] {
        return Err(EvalErrorKind::Length.into());
    }

    let mut shape = Vec::new();
    shape.extend_from_slice(&lv.shape[..lv.rank - 1]);
    shape.extend_from_slice(&rv.shape[1..rv.rank]);
    if shape.len() > MAX_RANK {
        return Err(EvalErrorKind::ArrayOverflow.into());
    }

    let ni: usize = lv.shape[..lv.rank - 1].iter().product();
    let nj: usize = rv.shape[1..rv.rank].iter().product();

    let both_num = lv.is_num() && rv.is_num();
    let both_chr = !lv.is_num() && !rv.is_num();
    if !both_num && !both_chr {
        return Err(EvalErrorKind::Domain.into());
    }
    if both_chr && fun_r != Tok::Equal && fun_r != Tok::NotEqual {
        return Err(EvalErrorKind::Domain.into());
    }

    let cell = |ws: &Workspace, i: usize, j: usize, k: usize| -> Result<f64> {
        if both_num {
            dyadic_scalar_num(fun_r, lv.num(ws, i * n + k), rv.num(ws, k * nj + j))
        } else {
            let eq = lv.chr(ws, i * n + k) == rv.chr(ws, k * nj + j);
            Ok(if (fun_r == Tok::Equal) == eq { 1.0 } else { 0.0 })
        }
    };

    let dot = |ws: &Workspace, i: usize, j: usize| -> Result<f64> {
        if n == 0 {
            return ident_element(fun_l);
        }
        if both_num && fun_l == Tok::Plus && fun_r == Tok::Times {
            let mut acc = 0.0;
            for k in 0..n {
                acc += lv.num(ws, i * n + k) * rv.num(ws, k * nj + j);
            }
            return Ok(acc);
        }
        let mut acc = cell(ws, i, j, n - 1)?;
        for k in (0..n - 1).rev() {
            acc = dyadic_scalar_num(fun_l, cell(ws, i, j, k)?, acc)?;
        }
        Ok(acc)
    };

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    if shape.is_empty() {
        out.num = dot(ws, 0, 0)?;
    } else {
        out.set_shape(&shape);
        let dst = ws.temp_alloc(NUM_SIZE, ni * nj)?;
        let mut w = 0usize;
        for i in 0..ni {
            for j in 0..nj {
                let acc = dot(ws, i, j)?;
                ws.set_f64(dst + w * NUM_SIZE, acc);
                w += 1;
            }
        }
        out.doff = dst;
    }
    ws.opr_set_top(&out);
    Ok(())
}

/// `L ∘.f R`: every pairing; result shape is the shape concatenation.
pub fn outer_product(ws: &mut Workspace, fun: Tok) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let lv = ArrayView::from_desc(&ldesc);
    let rv = ArrayView::from_desc(&rdesc);

    let mut shape = Vec::new();
    shape.extend_from_slice(&lv.shape[..lv.rank]);
    shape.extend_from_slice(&rv.shape[..rv.rank]);
    if shape.len() > MAX_RANK {
        return Err(EvalErrorKind::ArrayOverflow.into());
    }

    let both_num = lv.is_num() && rv.is_num();
    let both_chr = !lv.is_num() && !rv.is_num();
    if !both_num && !both_chr {
        return Err(EvalErrorKind::Domain.into());
    }
    if both_chr && fun != Tok::Equal && fun != Tok::NotEqual {
        return Err(EvalErrorKind::Domain.into());
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&shape);
    let dst = ws.temp_alloc(NUM_SIZE, lv.nelem * rv.nelem)?;
    let mut w = 0usize;
    for i in 0..lv.nelem {
        for j in 0..rv.nelem {
            let val = if both_num {
                dyadic_scalar_num(fun, lv.num(ws, i), rv.num(ws, j))?
            } else {
                let eq = lv.chr(ws, i) == rv.chr(ws, j);
                if (fun == Tok::Equal) == eq {
                    1.0
                } else {
                    0.0
                }
            };
            ws.set_f64(dst + w * NUM_SIZE, val);
            w += 1;
        }
    }
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}
