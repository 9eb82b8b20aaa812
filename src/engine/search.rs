//! Generators and searches: iota, index-of, membership, grade, deal,
//! and the positional conversions encode/decode.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{EvalErrorKind, Result};
use crate::workspace::{DataType, Desc, Workspace, MAX_INDEX, NUM_SIZE};

use super::{as_int, ArrayView};

/// `⍳n`: the index vector `origin … origin+n−1`.
pub fn fun_iota(ws: &mut Workspace, origin: usize) -> Result<()> {
    let d = ws.opr_top_desc();
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    let raw = if d.is_scalar() {
        d.num
    } else {
        if d.rank != 1 || d.shape[0] != 1 {
            return Err(EvalErrorKind::Length.into());
        }
        ws.f64_at(d.doff)
    };
    let n = as_int(raw).ok_or(EvalErrorKind::Domain)?;
    if n < 0 || n as usize > MAX_INDEX {
        return Err(EvalErrorKind::InvalidIndex.into());
    }
    let n = n as usize;

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&[n]);
    if n > 0 {
        let dst = ws.temp_alloc(NUM_SIZE, n)?;
        for i in 0..n {
            ws.set_f64(dst + i * NUM_SIZE, (origin + i) as f64);
        }
        out.doff = dst;
    }
    ws.opr_set_top(&out);
    Ok(())
}

/// `V⍳A`: the index of each element of A in V, `nelem(V)+origin` when
/// absent.
pub fn fun_index_of(ws: &mut Workspace, origin: usize) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let lv = ArrayView::from_desc(&ldesc);
    let rv = ArrayView::from_desc(&rdesc);

    if lv.is_num() != rv.is_num() {
        return Err(EvalErrorKind::Domain.into());
    }
    if lv.rank != 1 {
        return Err(EvalErrorKind::Rank.into());
    }

    let absent = (lv.nelem + origin) as f64;
    let dst = ws.temp_alloc(NUM_SIZE, rv.nelem)?;
    for i in 0..rv.nelem {
        let mut index = absent;
        for j in 0..lv.nelem {
            let hit = if lv.is_num() {
                lv.num(ws, j) == rv.num(ws, i)
            } else {
                lv.chr(ws, j) == rv.chr(ws, i)
            };
            if hit {
                index = (j + origin) as f64;
                break;
            }
        }
        ws.set_f64(dst + i * NUM_SIZE, index);
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&rv.shape[..rv.rank].iter().map(|&s| s as usize).collect::<Vec<_>>());
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// `L∊R`: boolean array shaped like L.
pub fn fun_membership(ws: &mut Workspace) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let lv = ArrayView::from_desc(&ldesc);
    let rv = ArrayView::from_desc(&rdesc);

    if lv.is_num() != rv.is_num() {
        return Err(EvalErrorKind::Domain.into());
    }

    let dst = ws.temp_alloc(NUM_SIZE, lv.nelem)?;
    for i in 0..lv.nelem {
        let mut found = 0.0;
        for j in 0..rv.nelem {
            let hit = if lv.is_num() {
                lv.num(ws, i) == rv.num(ws, j)
            } else {
                lv.chr(ws, i) == rv.chr(ws, j)
            };
            if hit {
                found = 1.0;
                break;
            }
        }
        ws.set_f64(dst + i * NUM_SIZE, found);
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&lv.shape[..lv.rank].iter().map(|&s| s as usize).collect::<Vec<_>>());
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// `⍋V` / `⍒V`: stable sort indices of a vector, in the index origin.
pub fn fun_grade(ws: &mut Workspace, up: bool, origin: usize) -> Result<()> {
    let d = ws.opr_top_desc();
    if !d.is_array() || d.rank != 1 {
        return Err(EvalErrorKind::Rank.into());
    }
    let v = ArrayView::from_desc(&d);

    let mut order: Vec<usize> = (0..v.nelem).collect();
    if v.is_num() {
        let keys: Vec<f64> = (0..v.nelem).map(|i| v.num(ws, i)).collect();
        order.sort_by(|&a, &b| {
            let ord = keys[a].partial_cmp(&keys[b]).unwrap_or(std::cmp::Ordering::Equal);
            if up {
                ord
            } else {
                ord.reverse()
            }
        });
    } else {
        let keys: Vec<u32> = (0..v.nelem).map(|i| v.chr(ws, i)).collect();
        order.sort_by(|&a, &b| {
            let ord = keys[a].cmp(&keys[b]);
            if up {
                ord
            } else {
                ord.reverse()
            }
        });
    }

    let dst = ws.temp_alloc(NUM_SIZE, v.nelem)?;
    for (i, &idx) in order.iter().enumerate() {
        ws.set_f64(dst + i * NUM_SIZE, (idx + origin) as f64);
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&[v.nelem]);
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// `L?R`: L distinct draws from `[origin, R+origin)`.
pub fn fun_deal(ws: &mut Workspace, origin: usize, rng: &mut StdRng) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let lv = ArrayView::from_desc(&ldesc);
    let rv = ArrayView::from_desc(&rdesc);

    if lv.nelem != 1 || rv.nelem != 1 {
        return Err(EvalErrorKind::Length.into());
    }
    if !lv.is_num() || !rv.is_num() {
        return Err(EvalErrorKind::Domain.into());
    }
    let count = as_int(lv.num(ws, 0)).ok_or(EvalErrorKind::Domain)?;
    let total = as_int(rv.num(ws, 0)).ok_or(EvalErrorKind::Domain)?;
    if count > MAX_INDEX as i64 {
        return Err(EvalErrorKind::Length.into());
    }
    if count < 0 || total < 0 || count > total {
        return Err(EvalErrorKind::Domain.into());
    }
    let count = count as usize;
    let total = total as usize;

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&[count]);
    if count > 0 {
        // Draw into a bitmap of available slots, probing forward from a
        // random start when a slot was already taken.
        let mut taken = vec![false; total];
        let dst = ws.temp_alloc(NUM_SIZE, count)?;
        for i in 0..count {
            let mut slot = rng.gen_range(0..total);
            while taken[slot] {
                slot = if slot + 1 < total { slot + 1 } else { 0 };
            }
            taken[slot] = true;
            ws.set_f64(dst + i * NUM_SIZE, (slot + origin) as f64);
        }
        out.doff = dst;
    }
    ws.opr_set_top(&out);
    Ok(())
}

/// `L⊥R`: evaluate the digits R in the radix vector L.
pub fn fun_decode(ws: &mut Workspace) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let lv = ArrayView::from_desc(&ldesc);
    let rv = ArrayView::from_desc(&rdesc);

    if !lv.is_num() || !rv.is_num() {
        return Err(EvalErrorKind::Domain.into());
    }
    if lv.rank != 1 || rv.rank != 1 {
        return Err(EvalErrorKind::Rank.into());
    }
    if lv.nelem != rv.nelem && lv.nelem != 1 && rv.nelem != 1 {
        return Err(EvalErrorKind::Length.into());
    }

    let n = lv.nelem.max(rv.nelem);
    let radix = |ws: &Workspace, i: usize| {
        if lv.nelem == 1 {
            lv.num(ws, 0)
        } else {
            lv.num(ws, i)
        }
    };
    let digit = |ws: &Workspace, i: usize| {
        if rv.nelem == 1 {
            rv.num(ws, 0)
        } else {
            rv.num(ws, i)
        }
    };

    let mut value = digit(ws, 0);
    for i in 1..n {
        value = value * radix(ws, i) + digit(ws, i);
    }
    ws.opr_set_top(&Desc::scalar_num(value));
    Ok(())
}

/// `L⊤R`: represent the single number R in the radix vector L.
pub fn fun_encode(ws: &mut Workspace) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let lv = ArrayView::from_desc(&ldesc);
    let rv = ArrayView::from_desc(&rdesc);

    if !lv.is_num() || !rv.is_num() {
        return Err(EvalErrorKind::Domain.into());
    }
    if lv.rank != 1 || rv.nelem != 1 {
        return Err(EvalErrorKind::Rank.into());
    }

    let digits = lv.nelem;
    let dst = ws.temp_alloc(NUM_SIZE, digits)?;
    let mut num = rv.num(ws, 0);
    for i in (0..digits).rev() {
        let div = lv.num(ws, i);
        if div == 0.0 {
            // A zero radix absorbs whatever is left.
            ws.set_f64(dst + i * NUM_SIZE, num);
            num = 0.0;
        } else {
            let rem = num % div;
            ws.set_f64(dst + i * NUM_SIZE, rem);
            num = (num - rem) / div;
        }
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&[digits]);
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}
