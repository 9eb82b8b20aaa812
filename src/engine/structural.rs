//! Structural primitives: shape, reshape, ravel is in `scalar` (it is a
//! descriptor change), catenate/laminate, take, drop, compress, expand,
//! rotate, reverse, transpose.

use crate::error::{EvalErrorKind, Result};
use crate::workspace::{DataType, Desc, Workspace, CHAR_SIZE, MAX_INDEX, MAX_RANK, NUM_SIZE};

use super::indexing::{DropIter, TakeIter};
use super::{as_int, ArrayView};

const CHAR_FILL: u32 = ' ' as u32;

/// `⍴A`: the shape as a numeric vector; a scalar yields the empty vector.
pub fn fun_shape(ws: &mut Workspace) -> Result<()> {
    let d = ws.opr_top_desc();
    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    if d.is_scalar() {
        out.set_shape(&[0]);
        ws.opr_set_top(&out);
        return Ok(());
    }
    let rank = d.rank as usize;
    let dst = ws.temp_alloc(NUM_SIZE, rank)?;
    for i in 0..rank {
        ws.set_f64(dst + i * NUM_SIZE, d.shape[i] as f64);
    }
    out.set_shape(&[rank]);
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// `V⍴A`: reshape with element recycling. An empty right operand
/// recycles the type prototype (0 or space).
pub fn fun_reshape(ws: &mut Workspace) -> Result<()> {
    let l = ws.opr_pop();
    if !l.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }

    let mut shape = Vec::new();
    if l.is_scalar() {
        let n = as_int(l.num).ok_or(EvalErrorKind::Domain)?;
        if n < 0 || n as usize > MAX_INDEX {
            return Err(EvalErrorKind::Domain.into());
        }
        shape.push(n as usize);
    } else {
        if l.rank != 1 {
            return Err(EvalErrorKind::Rank.into());
        }
        let lv = ArrayView::from_desc(&l);
        if lv.nelem > MAX_RANK {
            return Err(EvalErrorKind::Domain.into());
        }
        for i in 0..lv.nelem {
            let n = as_int(lv.num(ws, i)).ok_or(EvalErrorKind::Domain)?;
            if n < 0 || n as usize > MAX_INDEX {
                return Err(EvalErrorKind::Domain.into());
            }
            shape.push(n as usize);
        }
    }
    let nelem_new: usize = shape.iter().product();

    let mut out = ws.opr_top_desc();
    let src = ArrayView::from_desc(&out);
    let nelem_old = if out.is_scalar() { 1 } else { src.nelem };

    if out.is_scalar() || nelem_new > nelem_old {
        if out.is_number() {
            let dst = ws.temp_alloc(NUM_SIZE, nelem_new)?;
            for i in 0..nelem_new {
                let v = if nelem_old == 0 {
                    0.0
                } else {
                    src.num(ws, i % nelem_old)
                };
                ws.set_f64(dst + i * NUM_SIZE, v);
            }
            out.doff = dst;
        } else {
            let dst = ws.temp_alloc(CHAR_SIZE, nelem_new)?;
            for i in 0..nelem_new {
                let v = if nelem_old == 0 {
                    CHAR_FILL
                } else {
                    src.chr(ws, i % nelem_old)
                };
                ws.set_u32(dst + i * CHAR_SIZE, v);
            }
            out.doff = dst;
        }
    }
    // Shrinking reuses the existing payload prefix.

    out.set_shape(&shape);
    ws.opr_set_top(&out);
    Ok(())
}

/// `⌽[axis]A` / `⊖[axis]A`: reverse along one axis.
pub fn fun_reverse(ws: &mut Workspace, axis: usize) -> Result<()> {
    let mut d = ws.opr_top_desc();
    if !d.is_array() {
        return Ok(());
    }
    let v = ArrayView::from_desc(&d);
    if v.nelem == 0 {
        return Ok(());
    }

    let ax_len = v.shape[axis];
    let inner = v.inner[axis];
    let outer = v.outer[axis];
    let src = v.elems;
    if d.is_number() {
        let dst = ws.temp_alloc(NUM_SIZE, v.nelem)?;
        for o in 0..outer {
            for j in 0..ax_len {
                for k in 0..inner {
                    let from = o * ax_len * inner + (ax_len - 1 - j) * inner + k;
                    let to = o * ax_len * inner + j * inner + k;
                    let val = ws.f64_at(src + from * NUM_SIZE);
                    ws.set_f64(dst + to * NUM_SIZE, val);
                }
            }
        }
        d.doff = dst;
    } else {
        let dst = ws.temp_alloc(CHAR_SIZE, v.nelem)?;
        for o in 0..outer {
            for j in 0..ax_len {
                for k in 0..inner {
                    let from = o * ax_len * inner + (ax_len - 1 - j) * inner + k;
                    let to = o * ax_len * inner + j * inner + k;
                    let val = ws.u32_at(src + from * CHAR_SIZE);
                    ws.set_u32(dst + to * CHAR_SIZE, val);
                }
            }
        }
        d.doff = dst;
    }
    ws.opr_set_top(&d);
    Ok(())
}

/// `A⌽[axis]B`: rotate along one axis. `A` is a scalar or an array shaped
/// like `B` with the rotation axis removed.
pub fn fun_rotate(ws: &mut Workspace, axis: usize) -> Result<()> {
    let rot = ws.opr_pop();
    if !rot.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    let mut d = ws.opr_top_desc();

    if rot.is_scalar() && d.is_scalar() {
        return Ok(());
    }
    if !d.is_array() {
        return Err(EvalErrorKind::Rank.into());
    }

    let v = ArrayView::from_desc(&d);
    let rank = v.rank;

    // Rotation counts, indexed like B with the rotation axis removed.
    let rot_vals: Vec<i64> = if rot.is_scalar() {
        let n = rot.num as i64;
        let copies: usize = (0..rank).filter(|&i| i != axis).map(|i| v.shape[i]).product();
        vec![n; copies.max(1)]
    } else {
        if rot.rank as usize != rank - 1 {
            return Err(EvalErrorKind::Rank.into());
        }
        let mut r = 0;
        for i in 0..rank {
            if i != axis {
                if rot.shape[r] as usize != v.shape[i] {
                    return Err(EvalErrorKind::Length.into());
                }
                r += 1;
            }
        }
        let rv = ArrayView::from_desc(&rot);
        (0..rv.nelem).map(|i| rv.num(ws, i) as i64).collect()
    };

    if v.nelem == 0 {
        return Ok(());
    }

    // Rotation-array sizes over the non-axis dimensions.
    let mut rsize = [0usize; MAX_RANK];
    {
        let mut size = 1usize;
        let mut r = rank.saturating_sub(1);
        for i in (0..rank).rev() {
            if i != axis {
                r -= 1;
                rsize[r] = size;
                size *= v.shape[i];
            }
        }
    }

    let ax_len = v.shape[axis];
    let src = v.elems;
    let is_num = d.is_number();
    let dst = if is_num {
        ws.temp_alloc(NUM_SIZE, v.nelem)?
    } else {
        ws.temp_alloc(CHAR_SIZE, v.nelem)?
    };

    let mut index = [0usize; MAX_RANK];
    for seq in 0..v.nelem {
        // Rotation count for this lane.
        let mut rind = 0usize;
        let mut r = 0usize;
        for i in 0..rank {
            if i != axis {
                rind += index[i] * rsize[r];
                r += 1;
            }
        }
        let count = rot_vals[rind];

        // Destination index: rotate the axis coordinate left by count.
        let mut linear = 0usize;
        for i in 0..rank {
            if i != axis {
                linear += index[i] * v.inner[i];
            } else {
                let ir = (index[i] as i64 - count).rem_euclid(ax_len as i64) as usize;
                linear += ir * v.inner[i];
            }
        }

        if is_num {
            let val = ws.f64_at(src + seq * NUM_SIZE);
            ws.set_f64(dst + linear * NUM_SIZE, val);
        } else {
            let val = ws.u32_at(src + seq * CHAR_SIZE);
            ws.set_u32(dst + linear * CHAR_SIZE, val);
        }

        for i in (0..rank).rev() {
            index[i] += 1;
            if index[i] < v.shape[i] {
                break;
            }
            index[i] = 0;
        }
    }

    d.doff = dst;
    ws.opr_set_top(&d);
    Ok(())
}

fn all_zero_strides(v: &ArrayView) -> bool {
    v.stride[..v.rank].iter().all(|&s| s == 0)
}

/// `A,[axis]B` and `A⍪[axis]B`. `laminate` marks a fractional axis, which
/// joins the operands along a new length-1 axis.
pub fn fun_catenate(ws: &mut Workspace, axis: usize, laminate: bool) -> Result<()> {
    let ldesc = ws.opr_pop();
    let rdesc = ws.opr_top_desc();
    let mut lv = ArrayView::from_desc(&ldesc);
    let mut rv = ArrayView::from_desc(&rdesc);

    if lv.is_num() != rv.is_num() {
        return Err(EvalErrorKind::Domain.into());
    }

    let mut copy_left_shape = false;

    if lv.rank == rv.rank + 1 {
        rv.insert_axis(axis)?;
        copy_left_shape = true;
    } else if rv.rank == lv.rank + 1 {
        lv.insert_axis(axis)?;
    }

    let mut out = rdesc;
    if lv.rank == rv.rank {
        if laminate {
            lv.insert_axis(axis)?;
            rv.insert_axis(axis)?;
        }
        for i in 0..lv.rank {
            if i != axis && lv.shape[i] != rv.shape[i] {
                return Err(EvalErrorKind::Length.into());
            }
            if laminate {
                out.shape[i] = lv.shape[i] as u32;
            }
        }
    } else if lv.rank == 1 && lv.nelem == 1 {
        lv.extend_like(&rv, axis);
    } else if rv.rank == 1 && rv.nelem == 1 {
        rv.extend_like(&lv, axis);
        copy_left_shape = true;
    } else {
        return Err(EvalErrorKind::Rank.into());
    }

    out.rank = lv.rank.max(rv.rank) as u16;
    if copy_left_shape {
        for i in 0..lv.rank {
            out.shape[i] = lv.shape[i] as u32;
        }
        out.rank = lv.rank as u16;
    }
    out.shape[axis] = (lv.shape[axis] + rv.shape[axis]) as u32;
    out.dtype = ldesc.dtype;

    let rank = out.rank as usize;
    let inner = lv.inner[axis].max(rv.inner[axis]);
    let outer: usize = (0..axis).map(|i| out.shape[i] as usize).product();
    let l_ax = lv.shape[axis];
    let r_ax = rv.shape[axis];
    let l_flat = all_zero_strides(&lv);
    let r_flat = all_zero_strides(&rv);
    debug_assert_eq!(rank, lv.rank);

    let nelem = lv.nelem + rv.nelem;
    let is_num = lv.is_num();
    let dst = if is_num {
        ws.temp_alloc(NUM_SIZE, nelem)?
    } else {
        ws.temp_alloc(CHAR_SIZE, nelem)?
    };

    let dst_ax = l_ax + r_ax;
    let write = |ws: &mut Workspace, view: &ArrayView, flat: bool, o: usize, j: usize, k: usize, jd: usize| {
        let from = if flat { 0 } else { o * view.shape[axis] * inner + j * inner + k };
        let to = o * dst_ax * inner + jd * inner + k;
        if is_num {
            let v = view.num(ws, from);
            ws.set_f64(dst + to * NUM_SIZE, v);
        } else {
            let v = view.chr(ws, from);
            ws.set_u32(dst + to * CHAR_SIZE, v);
        }
    };

    for o in 0..outer {
        for j in 0..l_ax {
            for k in 0..inner {
                write(ws, &lv, l_flat, o, j, k, j);
            }
        }
        for j in 0..r_ax {
            for k in 0..inner {
                write(ws, &rv, r_flat, o, j, k, l_ax + j);
            }
        }
    }

    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// Left-operand mask for compress/expand: an integer scalar or vector.
fn read_mask(ws: &Workspace, d: &Desc) -> Result<(Vec<i64>, bool)> {
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if d.is_array() {
        if d.rank != 1 {
            return Err(EvalErrorKind::Rank.into());
        }
        let v = ArrayView::from_desc(d);
        let mut mask = Vec::with_capacity(v.nelem);
        for i in 0..v.nelem {
            mask.push(as_int(v.num(ws, i)).ok_or(EvalErrorKind::Domain)?);
        }
        Ok((mask, false))
    } else {
        Ok((vec![as_int(d.num).ok_or(EvalErrorKind::Domain)?], true))
    }
}

/// `V/[axis]A`: positive mask entries replicate, negative entries insert
/// filler, zero entries drop.
pub fn fun_compress(ws: &mut Workspace, axis: usize) -> Result<()> {
    let l = ws.opr_pop();
    let (mut mask, lhs_scalar) = read_mask(ws, &l)?;
    let mut out = ws.opr_top_desc();
    let is_num = out.is_number();

    if out.is_array() {
        let v = ArrayView::from_desc(&out);
        if lhs_scalar {
            mask = vec![mask[0]; v.shape[axis]];
        }
        if mask.len() != v.shape[axis] {
            return Err(EvalErrorKind::Length.into());
        }
        let ax_new: usize = mask.iter().map(|n| n.unsigned_abs() as usize).sum();
        let inner = v.inner[axis];
        let outer = v.outer[axis];
        let nelem_dst = v.nelem / v.shape[axis].max(1) * ax_new;

        out.shape[axis] = ax_new as u32;
        out.doff = 0;
        if nelem_dst > 0 {
            let elem = if is_num { NUM_SIZE } else { CHAR_SIZE };
            let dst = ws.temp_alloc(elem, nelem_dst)?;
            let src = v.elems;
            let mut w = 0usize;
            for o in 0..outer {
                for (j, &n) in mask.iter().enumerate() {
                    let chunk = src + (o * v.shape[axis] + j) * inner * elem;
                    if n > 0 {
                        for _ in 0..n {
                            for k in 0..inner {
                                if is_num {
                                    let val = ws.f64_at(chunk + k * NUM_SIZE);
                                    ws.set_f64(dst + w * NUM_SIZE, val);
                                } else {
                                    let val = ws.u32_at(chunk + k * CHAR_SIZE);
                                    ws.set_u32(dst + w * CHAR_SIZE, val);
                                }
                                w += 1;
                            }
                        }
                    } else if n < 0 {
                        for _ in 0..(-n as usize) * inner {
                            if is_num {
                                ws.set_f64(dst + w * NUM_SIZE, 0.0);
                            } else {
                                ws.set_u32(dst + w * CHAR_SIZE, CHAR_FILL);
                            }
                            w += 1;
                        }
                    }
                }
            }
            out.doff = dst;
        }
        ws.opr_set_top(&out);
    } else {
        // Scalar right operand: the result is a vector.
        let ax_new: usize = mask.iter().map(|n| n.unsigned_abs() as usize).sum();
        let elem = if is_num { NUM_SIZE } else { CHAR_SIZE };
        let dst = ws.temp_alloc(elem, ax_new)?;
        let mut w = 0usize;
        for &n in &mask {
            let fill = n < 0;
            for _ in 0..n.unsigned_abs() {
                if is_num {
                    ws.set_f64(dst + w * NUM_SIZE, if fill { 0.0 } else { out.num });
                } else {
                    ws.set_u32(dst + w * CHAR_SIZE, if fill { CHAR_FILL } else { out.chr });
                }
                w += 1;
            }
        }
        out.set_shape(&[ax_new]);
        out.doff = dst;
        ws.opr_set_top(&out);
    }
    Ok(())
}

/// `V\[axis]A`: positive entries copy source cells, non-positive entries
/// insert filler (a zero counts as one filler).
pub fn fun_expand(ws: &mut Workspace, axis: usize) -> Result<()> {
    let l = ws.opr_pop();
    let (mut mask, lhs_scalar) = read_mask(ws, &l)?;
    for n in mask.iter_mut() {
        if *n == 0 {
            *n = -1;
        }
    }
    let num_pos = mask.iter().filter(|&&n| n > 0).count();
    let ax_new: usize = mask.iter().map(|n| n.unsigned_abs() as usize).sum();

    let mut out = ws.opr_top_desc();
    let is_num = out.is_number();
    let elem = if is_num { NUM_SIZE } else { CHAR_SIZE };

    if out.is_array() {
        let v = ArrayView::from_desc(&out);
        if v.shape[axis] > 1 && num_pos != v.shape[axis] {
            return Err(EvalErrorKind::Length.into());
        }
        if lhs_scalar
            && !((v.shape[axis] == 0 && num_pos == 0) || (v.shape[axis] == 1 && num_pos > 0))
        {
            return Err(EvalErrorKind::Length.into());
        }
        let inner = v.inner[axis];
        let outer = v.outer[axis];
        let nelem_dst = v.nelem / v.shape[axis].max(1) * ax_new;

        out.shape[axis] = ax_new as u32;
        out.doff = 0;
        if nelem_dst > 0 {
            let dst = ws.temp_alloc(elem, nelem_dst)?;
            let src = v.elems;
            let mut w = 0usize;
            for o in 0..outer {
                let mut consumed = 0usize;
                for &n in &mask {
                    if n > 0 {
                        let chunk = src + (o * v.shape[axis] + consumed) * inner * elem;
                        for _ in 0..n {
                            for k in 0..inner {
                                if is_num {
                                    let val = ws.f64_at(chunk + k * NUM_SIZE);
                                    ws.set_f64(dst + w * NUM_SIZE, val);
                                } else {
                                    let val = ws.u32_at(chunk + k * CHAR_SIZE);
                                    ws.set_u32(dst + w * CHAR_SIZE, val);
                                }
                                w += 1;
                            }
                        }
                        consumed += 1;
                    } else {
                        for _ in 0..(-n as usize) * inner {
                            if is_num {
                                ws.set_f64(dst + w * NUM_SIZE, 0.0);
                            } else {
                                ws.set_u32(dst + w * CHAR_SIZE, CHAR_FILL);
                            }
                            w += 1;
                        }
                    }
                }
            }
            out.doff = dst;
        }
        ws.opr_set_top(&out);
    } else {
        let dst = ws.temp_alloc(elem, ax_new)?;
        let mut w = 0usize;
        for &n in &mask {
            let fill = n < 0;
            for _ in 0..n.unsigned_abs() {
                if is_num {
                    ws.set_f64(dst + w * NUM_SIZE, if fill { 0.0 } else { out.num });
                } else {
                    ws.set_u32(dst + w * CHAR_SIZE, if fill { CHAR_FILL } else { out.chr });
                }
                w += 1;
            }
        }
        out.set_shape(&[ax_new]);
        out.doff = dst;
        ws.opr_set_top(&out);
    }
    Ok(())
}

/// Left operand of take/drop: signed per-axis counts.
fn signed_counts(ws: &Workspace, d: &Desc) -> Result<Vec<i64>> {
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if d.is_array() {
        if d.rank != 1 {
            return Err(EvalErrorKind::Rank.into());
        }
        let v = ArrayView::from_desc(d);
        if v.nelem > MAX_RANK {
            return Err(EvalErrorKind::Rank.into());
        }
        let mut out = Vec::with_capacity(v.nelem);
        for i in 0..v.nelem {
            let n = v.num(ws, i) as i64;
            if n.unsigned_abs() as usize > MAX_INDEX {
                return Err(EvalErrorKind::Domain.into());
            }
            out.push(n);
        }
        Ok(out)
    } else {
        Ok(vec![d.num as i64])
    }
}

/// `L↑R`: positive counts take from the front, negative from the back,
/// with 0/space filler where the source runs out.
pub fn fun_take(ws: &mut Workspace) -> Result<()> {
    let l = ws.opr_pop();
    let mut dst_shape = signed_counts(ws, &l)?;

    let mut out = ws.opr_top_desc();
    let is_num = out.is_number();
    let elem = if is_num { NUM_SIZE } else { CHAR_SIZE };

    let mut src_shape = Vec::new();
    let src_view = ArrayView::from_desc(&out);
    if out.is_array() {
        let src_rank = out.rank as usize;
        if dst_shape.len() > src_rank {
            return Err(EvalErrorKind::Domain.into());
        }
        for i in 0..src_rank {
            src_shape.push(out.shape[i] as usize);
        }
        // Unspecified trailing axes are taken whole.
        for i in dst_shape.len()..src_rank {
            dst_shape.push(src_shape[i] as i64);
        }
    } else {
        src_shape = vec![1; dst_shape.len()];
    }

    let rank = dst_shape.len();
    let shape: Vec<usize> = dst_shape.iter().map(|n| n.unsigned_abs() as usize).collect();
    let nelem: usize = shape.iter().product();
    out.set_shape(&shape);
    out.doff = 0;

    if nelem > 0 {
        let dst = ws.temp_alloc(elem, nelem)?;
        for i in 0..nelem {
            if is_num {
                ws.set_f64(dst + i * NUM_SIZE, 0.0);
            } else {
                ws.set_u32(dst + i * CHAR_SIZE, CHAR_FILL);
            }
        }

        let src_empty = src_shape.iter().any(|&s| s == 0);
        if !src_empty {
            let (mut iter, copy_len) = TakeIter::new(&dst_shape, &src_shape);
            while let Some((dst_ind, src_ind)) = iter.next() {
                for k in 0..copy_len {
                    if is_num {
                        let v = src_view.num(ws, src_ind + k);
                        ws.set_f64(dst + (dst_ind + k) * NUM_SIZE, v);
                    } else {
                        let v = src_view.chr(ws, src_ind + k);
                        ws.set_u32(dst + (dst_ind + k) * CHAR_SIZE, v);
                    }
                }
            }
        }
        out.doff = dst;
    }

    debug_assert_eq!(rank, out.rank as usize);
    ws.opr_set_top(&out);
    Ok(())
}

/// `L↓R`: drop from the front (positive) or the back (negative).
pub fn fun_drop(ws: &mut Workspace) -> Result<()> {
    let l = ws.opr_pop();
    let mut drops = signed_counts(ws, &l)?;

    let mut out = ws.opr_top_desc();
    let is_num = out.is_number();
    let elem = if is_num { NUM_SIZE } else { CHAR_SIZE };
    let src_view = ArrayView::from_desc(&out);

    let mut src_shape = Vec::new();
    if out.is_array() {
        let src_rank = out.rank as usize;
        if drops.len() > src_rank {
            return Err(EvalErrorKind::Domain.into());
        }
        for i in 0..src_rank {
            src_shape.push(out.shape[i] as usize);
        }
        drops.resize(src_rank, 0);
    } else {
        // Dropping from a scalar leaves an all-zero shape.
        src_shape = vec![0; drops.len()];
        drops.iter_mut().for_each(|n| *n = 0);
    }

    let shape: Vec<usize> = src_shape
        .iter()
        .zip(&drops)
        .map(|(&s, &n)| s.saturating_sub(n.unsigned_abs() as usize))
        .collect();
    let nelem: usize = shape.iter().product();
    out.set_shape(&shape);
    out.doff = 0;

    if nelem > 0 {
        let dst = ws.temp_alloc(elem, nelem)?;
        let (mut iter, copy_len) = DropIter::new(&drops, &src_shape);
        let mut w = 0usize;
        while let Some(src_ind) = iter.next() {
            for k in 0..copy_len {
                if is_num {
                    let v = src_view.num(ws, src_ind + k);
                    ws.set_f64(dst + w * NUM_SIZE, v);
                } else {
                    let v = src_view.chr(ws, src_ind + k);
                    ws.set_u32(dst + w * CHAR_SIZE, v);
                }
                w += 1;
            }
        }
        out.doff = dst;
    }
    ws.opr_set_top(&out);
    Ok(())
}

/// `⍉A`: reverse the axis order. Scalars and vectors pass through.
pub fn fun_transpose(ws: &mut Workspace) -> Result<()> {
    let mut d = ws.opr_top_desc();
    let rank = d.rank as usize;
    if rank < 2 {
        return Ok(());
    }
    let v = ArrayView::from_desc(&d);

    // Reversed shape; sizes of the transpose, in source axis order.
    let mut tr_size = [0usize; MAX_RANK];
    let mut nelem = 1usize;
    for i in 0..rank {
        tr_size[i] = nelem;
        nelem *= v.shape[i];
    }
    for i in 0..rank {
        d.shape[i] = v.shape[rank - 1 - i] as u32;
    }

    if nelem == 0 {
        ws.opr_set_top(&d);
        return Ok(());
    }

    let is_num = d.is_number();
    let elem = if is_num { NUM_SIZE } else { CHAR_SIZE };
    let dst = ws.temp_alloc(elem, nelem)?;
    let src = v.elems;

    let mut index = [0usize; MAX_RANK];
    for seq in 0..nelem {
        let linear: usize = (0..rank).map(|i| index[i] * tr_size[i]).sum();
        if is_num {
            let val = ws.f64_at(src + seq * NUM_SIZE);
            ws.set_f64(dst + linear * NUM_SIZE, val);
        } else {
            let val = ws.u32_at(src + seq * CHAR_SIZE);
            ws.set_u32(dst + linear * CHAR_SIZE, val);
        }
        for i in (0..rank).rev() {
            index[i] += 1;
            if index[i] < v.shape[i] {
                break;
            }
            index[i] = 0;
        }
    }

    d.doff = dst;
    ws.opr_set_top(&d);
    Ok(())
}
