//! The array engine: shape introspection, conformability and the
//! primitive kernels.
//!
//! Kernels share one calling convention: operands are consumed from the
//! top of the operand stack and the result is written into the slot of
//! the topmost remaining operand, with payloads borrowed from the
//! temp-array stack.

pub mod indexing;
pub mod linalg;
pub mod reduce;
pub mod scalar;
pub mod search;
pub mod structural;

use num_traits::ToPrimitive;

use crate::error::{EvalErrorKind, Result};
use crate::workspace::{DataType, Desc, Offset, Workspace, CHAR_SIZE, MAX_RANK, NUM_SIZE};

/// How an axis was written: absent, `[n]` with integral n, or `[n]` with a
/// fractional n (lamination, legal for catenate only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSpec {
    Default,
    Regular(usize),
    Laminate(usize),
}

/// Resolve an axis for a primitive whose default is the last
/// (`last_default`) or first axis. Scalars only accept the default.
pub fn resolve_axis(d: &Desc, spec: AxisSpec, last_default: bool) -> Result<usize> {
    if d.is_array() {
        let rank = d.rank as usize;
        match spec {
            AxisSpec::Default => Ok(if last_default { rank - 1 } else { 0 }),
            AxisSpec::Regular(ax) => {
                if ax >= rank {
                    Err(EvalErrorKind::InvalidAxis.into())
                } else {
                    Ok(ax)
                }
            }
            AxisSpec::Laminate(_) => Err(EvalErrorKind::InvalidAxis.into()),
        }
    } else if spec != AxisSpec::Default {
        Err(EvalErrorKind::InvalidAxis.into())
    } else {
        Ok(0)
    }
}

/// An array-info view of a descriptor. Scalars are virtualized as
/// one-element rank-1 arrays with stride 0 so every kernel can scan its
/// operands uniformly.
#[derive(Debug, Clone)]
pub struct ArrayView {
    pub elems: Offset,
    pub dtype: DataType,
    pub rank: usize,
    pub nelem: usize,
    /// 0 when the view wraps a scalar, 1 otherwise.
    pub step: usize,
    scalar_num: f64,
    scalar_chr: u32,
    pub shape: [usize; MAX_RANK],
    /// Product of the higher-index axes (elements inside one cell).
    pub inner: [usize; MAX_RANK],
    /// Product of the lower-index axes (cells enclosing this axis).
    pub outer: [usize; MAX_RANK],
    /// Element distance along the axis; equals `inner` for real arrays
    /// and 0 for extended scalars.
    pub stride: [usize; MAX_RANK],
}

impl ArrayView {
    pub fn from_desc(d: &Desc) -> ArrayView {
        let mut view = ArrayView {
            elems: 0,
            dtype: d.dtype,
            rank: 1,
            nelem: 1,
            step: 0,
            scalar_num: 0.0,
            scalar_chr: 0,
            shape: [0; MAX_RANK],
            inner: [0; MAX_RANK],
            outer: [0; MAX_RANK],
            stride: [0; MAX_RANK],
        };

        if d.is_array() {
            view.rank = d.rank as usize;
            view.elems = d.doff;
            view.step = 1;
            for i in 0..view.rank {
                view.shape[i] = d.shape[i] as usize;
            }
        } else {
            view.shape[0] = 1;
            view.scalar_num = d.num;
            view.scalar_chr = d.chr;
        }

        let mut nelem = 1usize;
        for i in (0..view.rank).rev() {
            view.inner[i] = nelem;
            view.stride[i] = nelem;
            nelem *= view.shape[i];
        }
        view.nelem = nelem;
        if view.step == 0 {
            view.stride[0] = 0;
        }
        let mut outer = 1usize;
        for i in 0..view.rank {
            view.outer[i] = outer;
            outer *= view.shape[i];
        }
        view
    }

    pub fn is_num(&self) -> bool {
        self.dtype.is_number()
    }

    /// Numeric element by logical index; a scalar always yields itself.
    pub fn num(&self, ws: &Workspace, i: usize) -> f64 {
        if self.step == 0 {
            self.scalar_num
        } else {
            ws.f64_at(self.elems + i * NUM_SIZE)
        }
    }

    /// Character element (code point) by logical index.
    pub fn chr(&self, ws: &Workspace, i: usize) -> u32 {
        if self.step == 0 {
            self.scalar_chr
        } else {
            ws.u32_at(self.elems + i * CHAR_SIZE)
        }
    }

    /// Insert a length-1 axis at `axis`, rebuilding the size tables.
    /// Extended length-1 views keep stride 0 so the single element is
    /// recycled.
    pub fn insert_axis(&mut self, axis: usize) -> Result<()> {
        if axis > self.rank {
            return Err(EvalErrorKind::InvalidAxis.into());
        }
        let rank = self.rank + 1;
        let scalar = rank == 2 && self.nelem == 1;
        for i in (axis..self.rank).rev() {
            self.shape[i + 1] = self.shape[i];
        }
        self.shape[axis] = 1;
        let mut size = 1usize;
        for i in (0..rank).rev() {
            self.inner[i] = size;
            self.stride[i] = if scalar { 0 } else { size };
            size *= self.shape[i];
        }
        let mut outer = 1usize;
        for i in 0..rank {
            self.outer[i] = outer;
            outer *= self.shape[i];
        }
        self.rank = rank;
        Ok(())
    }

    /// Reshape this one-element view to `like`'s shape with a length-1
    /// `axis`, all strides 0 (scalar extension for catenation).
    pub fn extend_like(&mut self, like: &ArrayView, axis: usize) {
        let rank = like.rank;
        self.shape[..rank].copy_from_slice(&like.shape[..rank]);
        self.shape[axis] = 1;
        let mut nelem = 1usize;
        for i in (0..rank).rev() {
            self.inner[i] = nelem;
            self.stride[i] = 0;
            nelem *= self.shape[i];
        }
        let mut outer = 1usize;
        for i in 0..rank {
            self.outer[i] = outer;
            outer *= self.shape[i];
        }
        self.rank = rank;
        self.nelem = nelem;
    }
}

/// Elementwise conformability: equal rank and equal shape.
pub fn conformable(a: &Desc, b: &Desc) -> bool {
    a.rank == b.rank && a.shape[..a.rank as usize] == b.shape[..b.rank as usize]
}

/// `x` as an exact integer, if it is one.
pub fn as_int(x: f64) -> Option<i64> {
    let i = x.to_i64()?;
    (i as f64 == x).then_some(i)
}

/// A scalar or one-element numeric vector, as a number.
pub fn num_value(ws: &Workspace, d: &Desc) -> Result<f64> {
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if d.is_scalar() {
        Ok(d.num)
    } else {
        if d.rank != 1 || d.shape[0] != 1 {
            return Err(EvalErrorKind::Rank.into());
        }
        Ok(ws.f64_at(d.doff))
    }
}

pub fn int_value(ws: &Workspace, d: &Desc) -> Result<i64> {
    let num = num_value(ws, d)?;
    as_int(num).ok_or_else(|| EvalErrorKind::Domain.into())
}

pub fn bool_value(ws: &Workspace, d: &Desc) -> Result<i64> {
    let val = int_value(ws, d)?;
    if val != 0 && val != 1 {
        return Err(EvalErrorKind::Domain.into());
    }
    Ok(val)
}

/// A character scalar or vector, as a string of code points.
pub fn str_value(ws: &Workspace, d: &Desc) -> Result<Vec<u32>> {
    if !d.is_char() {
        return Err(EvalErrorKind::Domain.into());
    }
    if d.is_scalar() {
        return Ok(vec![d.chr]);
    }
    if d.rank != 1 {
        return Err(EvalErrorKind::Rank.into());
    }
    let len = d.shape[0] as usize;
    Ok((0..len).map(|i| ws.u32_at(d.doff + i * CHAR_SIZE)).collect())
}

/// Write a numeric vector into temp storage and return its offset.
pub fn temp_num_vec(ws: &mut Workspace, items: &[f64]) -> Result<Offset> {
    let off = ws.temp_alloc(NUM_SIZE, items.len())?;
    for (i, &v) in items.iter().enumerate() {
        ws.set_f64(off + i * NUM_SIZE, v);
    }
    Ok(off)
}

/// Write a character vector (code points) into temp storage.
pub fn temp_chr_vec(ws: &mut Workspace, items: &[u32]) -> Result<Offset> {
    let off = ws.temp_alloc(CHAR_SIZE, items.len())?;
    for (i, &c) in items.iter().enumerate() {
        ws.set_u32(off + i * CHAR_SIZE, c);
    }
    Ok(off)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MIN_WS_KB;

    fn matrix(ws: &mut Workspace, rows: usize, cols: usize) -> Desc {
        let items: Vec<f64> = (0..rows * cols).map(|i| i as f64).collect();
        let off = temp_num_vec(ws, &items).unwrap();
        let mut d = Desc::undef();
        d.dtype = DataType::Num;
        d.set_shape(&[rows, cols]);
        d.doff = off;
        d
    }

    #[test]
    fn view_fills_size_tables() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        let d = matrix(&mut ws, 2, 3);
        let v = ArrayView::from_desc(&d);
        assert_eq!(v.rank, 2);
        assert_eq!(v.nelem, 6);
        assert_eq!(&v.shape[..2], &[2, 3]);
        assert_eq!(&v.inner[..2], &[3, 1]);
        assert_eq!(&v.outer[..2], &[1, 2]);
        assert_eq!(v.num(&ws, 4), 4.0);
    }

    #[test]
    fn scalars_virtualize_with_zero_stride() {
        let d = Desc::scalar_num(7.5);
        let v = ArrayView::from_desc(&d);
        let ws = Workspace::new(MIN_WS_KB).unwrap();
        assert_eq!(v.rank, 1);
        assert_eq!(v.nelem, 1);
        assert_eq!(v.step, 0);
        assert_eq!(v.stride[0], 0);
        // Any logical index reads the same element.
        assert_eq!(v.num(&ws, 0), 7.5);
        assert_eq!(v.num(&ws, 99), 7.5);
    }

    #[test]
    fn axis_insertion_shifts_shape() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        let d = matrix(&mut ws, 2, 3);
        let mut v = ArrayView::from_desc(&d);
        v.insert_axis(1).unwrap();
        assert_eq!(v.rank, 3);
        assert_eq!(&v.shape[..3], &[2, 1, 3]);
        assert!(v.insert_axis(9).is_err());
    }

    #[test]
    fn integer_detection() {
        assert_eq!(as_int(4.0), Some(4));
        assert_eq!(as_int(-3.0), Some(-3));
        assert_eq!(as_int(2.5), None);
        assert_eq!(as_int(f64::NAN), None);
        assert_eq!(as_int(1e300), None);
    }

    #[test]
    fn axis_resolution() {
        let mut d = Desc::undef();
        d.dtype = DataType::Num;
        d.set_shape(&[2, 3]);
        assert_eq!(resolve_axis(&d, AxisSpec::Default, true).unwrap(), 1);
        assert_eq!(resolve_axis(&d, AxisSpec::Default, false).unwrap(), 0);
        assert_eq!(resolve_axis(&d, AxisSpec::Regular(1), true).unwrap(), 1);
        assert!(resolve_axis(&d, AxisSpec::Regular(2), true).is_err());
        assert!(resolve_axis(&d, AxisSpec::Laminate(0), true).is_err());
        let s = Desc::scalar_num(1.0);
        assert!(resolve_axis(&s, AxisSpec::Regular(0), true).is_err());
        assert!(resolve_axis(&s, AxisSpec::Default, true).is_ok());
    }
}
