//! Index iterators and bracket indexing (`X[I;…]` get and set).
//!
//! Three iterator families: the generic odometer over mixed
//! scalar/vector/elided index specifiers, the paired source/destination
//! iterator for take, and the source-only iterator for drop. Rotation has
//! its own iterator in `structural`.

use crate::error::{EvalErrorKind, Result};
use crate::workspace::{Desc, Workspace, CHAR_SIZE, MAX_RANK, NUM_SIZE};

use super::ArrayView;

/// One bracket slot: elided (use the whole axis), a single index, or an
/// array of indices (kept with its shape for the result).
enum IdxAxis {
    All { shape: usize },
    Single { index: i64 },
    List { values: Vec<f64>, shape: Vec<usize> },
}

struct AxisState {
    axis: IdxAxis,
    /// Elements spanned by one step along this axis of the target.
    size: usize,
    /// Target axis length.
    shape: usize,
    pos: usize,
}

impl AxisState {
    fn count(&self) -> usize {
        match &self.axis {
            IdxAxis::All { shape } => *shape,
            IdxAxis::Single { .. } => 1,
            IdxAxis::List { values, .. } => values.len(),
        }
    }

    fn current(&self, origin: usize) -> Result<usize> {
        let raw = match &self.axis {
            IdxAxis::All { .. } => return Ok(self.pos),
            IdxAxis::Single { index } => *index,
            IdxAxis::List { values, .. } => values[self.pos] as i64,
        };
        let idx = raw - origin as i64;
        if idx < 0 || idx as usize >= self.shape {
            return Err(EvalErrorKind::InvalidIndex.into());
        }
        Ok(idx as usize)
    }
}

/// Odometer over the index specifiers of `X[I1;…;In]`.
pub struct IndexIter {
    axes: Vec<AxisState>,
    origin: usize,
    total: usize,
    produced: usize,
}

impl IndexIter {
    /// Build from the operand stack: target on top, specifiers above it
    /// (leftmost nearest the top). The target rank must equal `n`.
    pub fn from_stack(ws: &Workspace, n: usize, origin: usize) -> Result<IndexIter> {
        let target = ws.opr_top_desc();
        if !target.is_array() {
            return Err(EvalErrorKind::Domain.into());
        }
        if target.rank as usize != n {
            return Err(EvalErrorKind::NotConformable.into());
        }

        let mut axes = Vec::with_capacity(n);
        for d in 0..n {
            let spec = ws.opr_desc(1 + d);
            let shape = target.shape[d] as usize;
            let axis = if spec.dtype == crate::workspace::DataType::Und {
                IdxAxis::All { shape }
            } else if spec.is_number() {
                if spec.is_scalar() {
                    IdxAxis::Single {
                        index: spec.num as i64,
                    }
                } else {
                    let view = ArrayView::from_desc(&spec);
                    let values = (0..view.nelem).map(|i| view.num(ws, i)).collect();
                    let shape_spec = spec.shape[..spec.rank as usize]
                        .iter()
                        .map(|&s| s as usize)
                        .collect();
                    IdxAxis::List {
                        values,
                        shape: shape_spec,
                    }
                }
            } else {
                return Err(EvalErrorKind::InvalidIndex.into());
            };
            axes.push(AxisState {
                axis,
                size: 0,
                shape,
                pos: 0,
            });
        }

        let mut size = 1usize;
        for state in axes.iter_mut().rev() {
            state.size = size;
            size *= state.shape;
        }
        let total = axes.iter().map(AxisState::count).product();

        Ok(IndexIter {
            axes,
            origin,
            total,
            produced: 0,
        })
    }

    /// Result rank/shape: the concatenation of the specifier shapes.
    pub fn result_shape(&self) -> Result<Vec<usize>> {
        let mut shape = Vec::new();
        for state in &self.axes {
            match &state.axis {
                IdxAxis::All { shape: s } => shape.push(*s),
                IdxAxis::Single { .. } => {}
                IdxAxis::List { shape: s, .. } => shape.extend_from_slice(s),
            }
            if shape.len() > MAX_RANK {
                return Err(EvalErrorKind::ArrayOverflow.into());
            }
        }
        Ok(shape)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Next linear index into the target, validating as it goes.
    pub fn next(&mut self) -> Result<Option<usize>> {
        if self.produced >= self.total {
            return Ok(None);
        }
        if self.produced > 0 {
            // Advance the odometer, last axis fastest.
            let mut carry = true;
            for state in self.axes.iter_mut().rev() {
                state.pos += 1;
                if state.pos < state.count() {
                    carry = false;
                    break;
                }
                state.pos = 0;
            }
            debug_assert!(!carry, "odometer overran its element count");
        }
        self.produced += 1;
        let mut linear = 0usize;
        for state in &self.axes {
            linear += state.current(self.origin)? * state.size;
        }
        Ok(Some(linear))
    }
}

/// `X[I…]`: replace the target and its specifiers on the stack with the
/// selected elements.
pub fn indexed_get(ws: &mut Workspace, n: usize, origin: usize) -> Result<()> {
    let target = ws.opr_top_desc();
    let mut iter = IndexIter::from_stack(ws, n, origin)?;
    let shape = iter.result_shape()?;
    let nelem: usize = shape.iter().product();

    let mut out = Desc::undef();
    out.dtype = target.dtype;
    out.set_shape(&shape);

    if shape.is_empty() {
        // Single element.
        let linear = iter.next()?.expect("scalar index produces one element");
        if target.is_number() {
            out.num = ws.f64_at(target.doff + linear * NUM_SIZE);
        } else {
            out.chr = ws.u32_at(target.doff + linear * CHAR_SIZE);
        }
    } else if target.is_number() {
        let dst = ws.temp_alloc(NUM_SIZE, nelem)?;
        out.doff = dst;
        for i in 0..nelem {
            let linear = iter.next()?.expect("iterator matches element count");
            let v = ws.f64_at(target.doff + linear * NUM_SIZE);
            ws.set_f64(dst + i * NUM_SIZE, v);
        }
    } else {
        let dst = ws.temp_alloc(CHAR_SIZE, nelem)?;
        out.doff = dst;
        for i in 0..nelem {
            let linear = iter.next()?.expect("iterator matches element count");
            let v = ws.u32_at(target.doff + linear * CHAR_SIZE);
            ws.set_u32(dst + i * CHAR_SIZE, v);
        }
    }

    ws.opr_drop(n);
    ws.opr_set_top(&out);
    Ok(())
}

/// `X[I…]←Y`: store Y's elements through the index specifiers into the
/// target's payload in place. Stack has the target on top, then the
/// specifiers, then Y; Y stays as the expression value.
pub fn indexed_set(ws: &mut Workspace, n: usize, origin: usize) -> Result<()> {
    let target = ws.opr_top_desc();
    let mut iter = IndexIter::from_stack(ws, n, origin)?;
    let shape = iter.result_shape()?;

    ws.opr_drop(n + 1);
    let value = ws.opr_top_desc();

    if value.is_number() != target.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if value.is_array() {
        if value.rank as usize != shape.len() {
            return Err(EvalErrorKind::NotConformable.into());
        }
        for (i, &s) in shape.iter().enumerate() {
            if value.shape[i] as usize != s {
                return Err(EvalErrorKind::NotConformable.into());
            }
        }
    }

    let view = ArrayView::from_desc(&value);
    let mut i = 0usize;
    while let Some(linear) = iter.next()? {
        if target.is_number() {
            let v = view.num(ws, i);
            ws.set_f64(target.doff + linear * NUM_SIZE, v);
        } else {
            let v = view.chr(ws, i);
            ws.set_u32(target.doff + linear * CHAR_SIZE, v);
        }
        i += 1;
    }
    Ok(())
}

/// Paired source/destination iterator for `L↑R`. Produces one row (last
/// axis run) per step.
pub struct TakeIter {
    src_first: [usize; MAX_RANK],
    src_last: [i64; MAX_RANK],
    src_index: [i64; MAX_RANK],
    src_size: [usize; MAX_RANK],
    dst_first: [usize; MAX_RANK],
    dst_index: [i64; MAX_RANK],
    dst_size: [usize; MAX_RANK],
    rank: usize,
    done: bool,
}

impl TakeIter {
    /// `dst_shape` entries are the signed take counts; `src_shape` the
    /// source extents. Returns the iterator and the row length to copy.
    pub fn new(dst_shape: &[i64], src_shape: &[usize]) -> (TakeIter, usize) {
        let rank = dst_shape.len();
        let mut it = TakeIter {
            src_first: [0; MAX_RANK],
            src_last: [0; MAX_RANK],
            src_index: [0; MAX_RANK],
            src_size: [0; MAX_RANK],
            dst_first: [0; MAX_RANK],
            dst_index: [0; MAX_RANK],
            dst_size: [0; MAX_RANK],
            rank,
            done: false,
        };

        let mut src_size = 1usize;
        let mut dst_size = 1usize;
        for d in (0..rank).rev() {
            it.src_size[d] = src_size;
            src_size *= src_shape[d];
            it.dst_size[d] = dst_size;
            dst_size *= dst_shape[d].unsigned_abs() as usize;
        }

        for d in 0..rank {
            let n = dst_shape[d];
            let s = src_shape[d] as i64;
            if n > 0 {
                it.src_first[d] = 0;
                it.src_index[d] = 0;
                it.src_last[d] = if n > s { s - 1 } else { n - 1 };
                it.dst_first[d] = 0;
                it.dst_index[d] = 0;
            } else if n < 0 {
                let n = -n;
                if n > s {
                    it.src_first[d] = 0;
                    it.src_index[d] = 0;
                    it.dst_first[d] = (n - s) as usize;
                } else {
                    it.src_first[d] = (s - n) as usize;
                    it.src_index[d] = s - n;
                    it.dst_first[d] = 0;
                }
                it.src_last[d] = s - 1;
                it.dst_index[d] = it.dst_first[d] as i64;
            } else {
                it.done = true;
            }
        }

        let copy_len = if rank == 0 || it.done {
            0
        } else {
            (it.src_last[rank - 1] - it.src_first[rank - 1] as i64 + 1) as usize
        };
        (it, copy_len)
    }

    /// Next (dst, src) linear element offsets for a row copy.
    pub fn next(&mut self) -> Option<(usize, usize)> {
        if self.done {
            return None;
        }
        let pair = (self.linear_dst(), self.linear_src());

        // Advance above the row axis, backtracking on exhaustion.
        let mut advanced = false;
        for d in (0..self.rank.saturating_sub(1)).rev() {
            self.src_index[d] += 1;
            if self.src_index[d] <= self.src_last[d] {
                self.dst_index[d] += 1;
                advanced = true;
                break;
            }
            self.src_index[d] = self.src_first[d] as i64;
            self.dst_index[d] = self.dst_first[d] as i64;
        }
        if !advanced {
            self.done = true;
        }
        Some(pair)
    }

    fn linear_src(&self) -> usize {
        (0..self.rank)
            .map(|d| self.src_index[d] as usize * self.src_size[d])
            .sum()
    }

    fn linear_dst(&self) -> usize {
        (0..self.rank)
            .map(|d| self.dst_index[d] as usize * self.dst_size[d])
            .sum()
    }
}

/// Source-only iterator for `L↓R`; the destination rows are contiguous.
pub struct DropIter {
    first: [usize; MAX_RANK],
    last: [i64; MAX_RANK],
    index: [i64; MAX_RANK],
    size: [usize; MAX_RANK],
    rank: usize,
    done: bool,
}

impl DropIter {
    pub fn new(drops: &[i64], src_shape: &[usize]) -> (DropIter, usize) {
        let rank = drops.len();
        let mut it = DropIter {
            first: [0; MAX_RANK],
            last: [0; MAX_RANK],
            index: [0; MAX_RANK],
            size: [0; MAX_RANK],
            rank,
            done: false,
        };

        let mut size = 1usize;
        for d in (0..rank).rev() {
            it.size[d] = size;
            size *= src_shape[d];
        }

        for d in 0..rank {
            let n = drops[d];
            let s = src_shape[d] as i64;
            if n > 0 {
                it.first[d] = n as usize;
                it.last[d] = s - 1;
            } else if n < 0 {
                it.first[d] = 0;
                it.last[d] = s + n - 1;
            } else {
                it.first[d] = 0;
                it.last[d] = s - 1;
            }
            it.index[d] = it.first[d] as i64;
        }

        let copy_len = if rank == 0 {
            0
        } else {
            (it.last[rank - 1] - it.first[rank - 1] as i64 + 1).max(0) as usize
        };
        (it, copy_len)
    }

    /// Next source linear element offset for a row copy.
    pub fn next(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        let linear: usize = (0..self.rank)
            .map(|d| self.index[d] as usize * self.size[d])
            .sum();

        let mut advanced = false;
        for d in (0..self.rank.saturating_sub(1)).rev() {
            self.index[d] += 1;
            if self.index[d] <= self.last[d] {
                advanced = true;
                break;
            }
            self.index[d] = self.first[d] as i64;
        }
        if !advanced {
            self.done = true;
        }
        Some(linear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_front_rows() {
        // 2 2 ↑ 3x3: rows 0,1 cols 0,1.
        let (mut it, copy_len) = TakeIter::new(&[2, 2], &[3, 3]);
        assert_eq!(copy_len, 2);
        assert_eq!(it.next(), Some((0, 0)));
        assert_eq!(it.next(), Some((2, 3)));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn take_from_the_back_with_overhang() {
        // ¯4 ↑ 1 2 3: one row, dst starts at 1, src covers the whole row.
        let (mut it, copy_len) = TakeIter::new(&[-4], &[3]);
        assert_eq!(copy_len, 3);
        assert_eq!(it.next(), Some((1, 0)));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn drop_rows_and_columns() {
        // 1 ¯1 ↓ 3x3: rows 1..3, cols 0..2.
        let (mut it, copy_len) = DropIter::new(&[1, -1], &[3, 3]);
        assert_eq!(copy_len, 2);
        assert_eq!(it.next(), Some(3));
        assert_eq!(it.next(), Some(6));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn drop_more_than_there_is() {
        let (mut it, copy_len) = DropIter::new(&[5], &[3]);
        assert_eq!(copy_len, 0);
        // Caller skips the copy loop when the destination is empty.
        let _ = it.next();
    }
}
