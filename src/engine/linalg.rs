//! Naive linear algebra backing `⌹`, `⎕rref`, `⎕lu` and `⎕ident`.

use crate::error::{EvalErrorKind, Result};
use crate::workspace::{DataType, Desc, Workspace, NUM_SIZE};

use super::{as_int, ArrayView};

/// In-arena matrix accessors over a temp allocation of `nr × nc` doubles.
fn mat_get(ws: &Workspace, base: usize, nc: usize, r: usize, c: usize) -> f64 {
    ws.f64_at(base + (r * nc + c) * NUM_SIZE)
}

fn mat_set(ws: &mut Workspace, base: usize, nc: usize, r: usize, c: usize, v: f64) {
    ws.set_f64(base + (r * nc + c) * NUM_SIZE, v);
}

fn swap_rows(ws: &mut Workspace, base: usize, nc: usize, i: usize, j: usize) {
    for c in 0..nc {
        let a = mat_get(ws, base, nc, i, c);
        let b = mat_get(ws, base, nc, j, c);
        mat_set(ws, base, nc, i, c, b);
        mat_set(ws, base, nc, j, c, a);
    }
}

/// Transform the matrix at `base` into reduced row echelon form with
/// partial pivoting. Returns the rank of the square sub-matrix.
pub fn mat_rref(ws: &mut Workspace, base: usize, nr: usize, nc: usize) -> usize {
    let mut rank = 0;
    let maxc = nr.min(nc);
    let mut c = 0;

    for r in 0..nr {
        if c >= nc {
            break;
        }
        // Largest pivot in this column; advance past all-zero columns.
        let mut pivot = 0.0f64;
        let mut pr = r;
        loop {
            for i in r..nr {
                let t = mat_get(ws, base, nc, i, c).abs();
                if t > pivot {
                    pr = i;
                    pivot = t;
                }
            }
            if pivot != 0.0 {
                break;
            }
            c += 1;
            if c == nc {
                return rank;
            }
        }
        if pr != r {
            swap_rows(ws, base, nc, pr, r);
        }
        if c < maxc {
            rank += 1;
        }

        let pivot = mat_get(ws, base, nc, r, c);
        if pivot != 1.0 {
            let mult = 1.0 / pivot;
            for j in 0..nc {
                let v = mat_get(ws, base, nc, r, j) * mult;
                mat_set(ws, base, nc, r, j, v);
            }
            // Force exactly 1 to sidestep rounding.
            mat_set(ws, base, nc, r, c, 1.0);
        }
        for i in 0..nr {
            let mult = mat_get(ws, base, nc, i, c);
            if i != r && mult != 0.0 {
                for k in 0..nc {
                    let v = mat_get(ws, base, nc, i, k) - mat_get(ws, base, nc, r, k) * mult;
                    mat_set(ws, base, nc, i, k, v);
                }
                mat_set(ws, base, nc, i, c, 0.0);
            }
        }
        c += 1;
    }
    rank
}

/// LU factorization with partial pivoting; the lower factor lands at
/// `lbase` while the matrix at `ubase` is reduced to upper triangular
/// form in place.
pub fn mat_lu(ws: &mut Workspace, lbase: usize, ubase: usize, nr: usize, nc: usize) -> usize {
    let mut rank = 0;
    let maxc = nr.min(nc);
    let mut c = 0;

    for r in 0..nr {
        if c >= nc {
            break;
        }
        let mut pivot = 0.0f64;
        let mut pr = r;
        loop {
            for i in r..nr {
                let t = mat_get(ws, ubase, nc, i, c).abs();
                if t > pivot {
                    pr = i;
                    pivot = t;
                }
            }
            if pivot != 0.0 {
                break;
            }
            c += 1;
            if c == nc {
                return rank;
            }
        }
        if pr != r {
            swap_rows(ws, ubase, nc, pr, r);
        }
        if c < maxc {
            rank += 1;
        }

        let pivot = mat_get(ws, ubase, nc, r, c);
        mat_set(ws, lbase, nc, r, c, 1.0);
        for i in r + 1..nr {
            let mult = mat_get(ws, ubase, nc, i, c) / pivot;
            mat_set(ws, lbase, nc, i, c, mult);
            if mult != 0.0 {
                for k in 0..nc {
                    let v = mat_get(ws, ubase, nc, i, k) - mat_get(ws, ubase, nc, r, k) * mult;
                    mat_set(ws, ubase, nc, i, k, v);
                }
                mat_set(ws, ubase, nc, i, c, 0.0);
            }
        }
        c += 1;
    }
    rank
}

fn square_matrix(d: &Desc) -> Result<usize> {
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if !d.is_array() || d.rank != 2 {
        return Err(EvalErrorKind::Rank.into());
    }
    let nr = d.shape[0] as usize;
    let nc = d.shape[1] as usize;
    if nr != nc {
        return Err(EvalErrorKind::Length.into());
    }
    Ok(nr)
}

/// `L⌹M`: solve M·X = L through the augmented matrix. A vector L yields
/// the solution vector, a matrix L a matrix of column solutions (so
/// `A⌹A` is the identity).
pub fn fun_mat_divide(ws: &mut Workspace) -> Result<()> {
    let vdesc = ws.opr_pop();
    if !vdesc.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if !vdesc.is_array() || vdesc.rank > 2 {
        return Err(EvalErrorKind::Rank.into());
    }
    let rows = vdesc.shape[0] as usize;
    let cols = if vdesc.rank == 2 {
        vdesc.shape[1] as usize
    } else {
        1
    };

    let mdesc = ws.opr_top_desc();
    let n = square_matrix(&mdesc)?;
    if n != rows {
        return Err(EvalErrorKind::Length.into());
    }

    // Augment M with the columns of L.
    let nc = n + cols;
    let aug = ws.temp_alloc(NUM_SIZE, n * nc)?;
    for r in 0..n {
        for c in 0..n {
            let v = ws.f64_at(mdesc.doff + (r * n + c) * NUM_SIZE);
            mat_set(ws, aug, nc, r, c, v);
        }
        for c in 0..cols {
            let v = ws.f64_at(vdesc.doff + (r * cols + c) * NUM_SIZE);
            mat_set(ws, aug, nc, r, n + c, v);
        }
    }

    if mat_rref(ws, aug, n, nc) < n {
        return Err(EvalErrorKind::Domain.into());
    }

    let dst = ws.temp_alloc(NUM_SIZE, n * cols)?;
    for r in 0..n {
        for c in 0..cols {
            let v = mat_get(ws, aug, nc, r, n + c);
            ws.set_f64(dst + (r * cols + c) * NUM_SIZE, v);
        }
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    if vdesc.rank == 2 {
        out.set_shape(&[n, cols]);
    } else {
        out.set_shape(&[n]);
    }
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// `⌹M`: invert a square matrix via `[M | I]` reduction.
pub fn fun_mat_inverse(ws: &mut Workspace) -> Result<()> {
    let mdesc = ws.opr_top_desc();
    let n = square_matrix(&mdesc)?;

    let nc = n * 2;
    let aug = ws.temp_alloc(NUM_SIZE, n * nc)?;
    for r in 0..n {
        for c in 0..n {
            let v = ws.f64_at(mdesc.doff + (r * n + c) * NUM_SIZE);
            mat_set(ws, aug, nc, r, c, v);
            mat_set(ws, aug, nc, r, n + c, if r == c { 1.0 } else { 0.0 });
        }
    }

    if mat_rref(ws, aug, n, nc) < n {
        return Err(EvalErrorKind::Domain.into());
    }

    let dst = ws.temp_alloc(NUM_SIZE, n * n)?;
    for r in 0..n {
        for c in 0..n {
            let v = mat_get(ws, aug, nc, r, n + c);
            ws.set_f64(dst + (r * n + c) * NUM_SIZE, v);
        }
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&[n, n]);
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// `⎕ident n`: the n×n identity matrix.
pub fn sys_ident(ws: &mut Workspace) -> Result<()> {
    let d = ws.opr_top_desc();
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    let view = ArrayView::from_desc(&d);
    if view.nelem != 1 {
        return Err(EvalErrorKind::Length.into());
    }
    let n = as_int(view.num(ws, 0)).ok_or(EvalErrorKind::Domain)?;
    if !(1..=15).contains(&n) {
        return Err(EvalErrorKind::Length.into());
    }
    let n = n as usize;

    let dst = ws.temp_alloc(NUM_SIZE, n * n)?;
    for r in 0..n {
        for c in 0..n {
            ws.set_f64(dst + (r * n + c) * NUM_SIZE, if r == c { 1.0 } else { 0.0 });
        }
    }

    let mut out = Desc::undef();
    out.dtype = DataType::Num;
    out.set_shape(&[n, n]);
    out.doff = dst;
    ws.opr_set_top(&out);
    Ok(())
}

/// `⎕rref M`: the reduced row echelon form of any numeric matrix.
pub fn sys_rref(ws: &mut Workspace) -> Result<()> {
    let mut d = ws.opr_top_desc();
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if !d.is_array() || d.rank != 2 {
        return Err(EvalErrorKind::Rank.into());
    }
    let nr = d.shape[0] as usize;
    let nc = d.shape[1] as usize;

    let dst = ws.temp_alloc(NUM_SIZE, nr * nc)?;
    for i in 0..nr * nc {
        let v = ws.f64_at(d.doff + i * NUM_SIZE);
        ws.set_f64(dst + i * NUM_SIZE, v);
    }
    mat_rref(ws, dst, nr, nc);
    d.doff = dst;
    ws.opr_set_top(&d);
    Ok(())
}

/// `⎕lu M`: the unit-lower-triangular factor from partially pivoted
/// elimination.
pub fn sys_lu(ws: &mut Workspace) -> Result<()> {
    let mut d = ws.opr_top_desc();
    if !d.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    if !d.is_array() || d.rank != 2 {
        return Err(EvalErrorKind::Rank.into());
    }
    let nr = d.shape[0] as usize;
    let nc = d.shape[1] as usize;

    let lbase = ws.temp_alloc(NUM_SIZE, nr * nc)?;
    let ubase = ws.temp_alloc(NUM_SIZE, nr * nc)?;
    for i in 0..nr * nc {
        ws.set_f64(lbase + i * NUM_SIZE, 0.0);
        let v = ws.f64_at(d.doff + i * NUM_SIZE);
        ws.set_f64(ubase + i * NUM_SIZE, v);
    }
    mat_lu(ws, lbase, ubase, nr, nc);
    d.doff = lbase;
    ws.opr_set_top(&d);
    Ok(())
}
