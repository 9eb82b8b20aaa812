//! Column-aware number formatting for display and the `⍕` primitive.
//!
//! Each column gets a format (integer, decimal or exponential), a width
//! and a precision measured over the column's values at the current print
//! precision. Cells are rendered right-justified behind a one-space
//! column separator; integer columns blank their trailing zeros; a cell
//! that will not fit its column is filled with `*`.

use crate::error::{EvalErrorKind, Result};
use crate::workspace::{DataType, Desc, Workspace, CHAR_SIZE, NUM_SIZE};

use crate::engine::ArrayView;

/// Outside this range a column flips to exponential format.
pub const MAX_FMT_INT: f64 = 1e8;
pub const MIN_FMT_INT: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColFmt {
    /// Fixed point with trailing zeros (and a trailing point) blanked.
    Int,
    /// Fixed point as-is; used by dyadic `⍕`.
    Dec,
    /// C-style exponential (`d.dde+02`).
    Exp,
}

#[derive(Debug, Clone, Copy)]
pub struct ColFormat {
    pub fmt: ColFmt,
    pub width: usize,
    pub prec: usize,
}

fn unsign_zero(num: f64) -> f64 {
    if num == 0.0 {
        0.0
    } else {
        num
    }
}

/// `%.*e` equivalent: sign, one integer digit, `prec` fraction digits,
/// and a signed two-digit exponent.
pub fn format_e(num: f64, prec: usize) -> String {
    let num = unsign_zero(num);
    let s = format!("{:.*e}", prec, num);
    let (mantissa, exp) = s.split_once('e').expect("e-format always has an exponent");
    let exp: i32 = exp.parse().expect("exponent is an integer");
    format!("{mantissa}e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs())
}

/// `%.*g` equivalent: `prec` significant digits, fixed or exponential by
/// magnitude, trailing fraction zeros removed.
pub fn format_g(num: f64, prec: usize) -> String {
    let prec = prec.max(1);
    let num = unsign_zero(num);
    if num == 0.0 {
        return "0".to_string();
    }
    // The exponent after rounding to the requested significant digits.
    let rounded = format!("{:.*e}", prec - 1, num);
    let exp: i32 = rounded
        .split_once('e')
        .expect("e-format always has an exponent")
        .1
        .parse()
        .expect("exponent is an integer");

    if exp < -4 || exp >= prec as i32 {
        let mut mantissa = rounded
            .split_once('e')
            .expect("checked above")
            .0
            .to_string();
        if mantissa.contains('.') {
            while mantissa.ends_with('0') {
                mantissa.pop();
            }
            if mantissa.ends_with('.') {
                mantissa.pop();
            }
        }
        format!("{mantissa}e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs())
    } else {
        let decimals = (prec as i32 - 1 - exp).max(0) as usize;
        let mut s = format!("{:.*}", decimals, num);
        if s.contains('.') {
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    }
}

/// Measure a column layout over row-major `values` with `nc` columns.
pub fn measure_columns(values: &[f64], nc: usize, print_prec: usize) -> Vec<ColFormat> {
    let nr = if nc == 0 { 0 } else { values.len() / nc };
    let mut fmts = vec![
        ColFormat {
            fmt: ColFmt::Int,
            width: 0,
            prec: 0,
        };
        nc
    ];

    for (c, fmt) in fmts.iter_mut().enumerate() {
        // Anything too large or too small forces the whole column into
        // exponential format.
        for r in 0..nr {
            let num = values[r * nc + c].abs();
            if (num < MIN_FMT_INT && num != 0.0) || num > MAX_FMT_INT {
                fmt.fmt = ColFmt::Exp;
                break;
            }
        }

        // Width and precision from the %g rendering of every cell.
        let mut li = 0usize; // integer part
        let mut lp = 0usize; // decimal point
        let mut ld = 0usize; // fraction part
        let mut le = 0usize; // exponent part
        for r in 0..nr {
            let s = format_g(values[r * nc + c], print_prec);
            if let Some(dot) = s.find('.') {
                let mut d = s.len() - dot - 1;
                lp = 1;
                li = li.max(dot);
                if s.contains('e') {
                    d -= 4;
                    le = 4;
                    fmt.fmt = ColFmt::Exp;
                }
                ld = ld.max(d);
            } else if let Some(epos) = s.find('e') {
                li = li.max(epos);
                le = 4;
                fmt.fmt = ColFmt::Exp;
            } else {
                li = li.max(s.len());
            }
        }
        fmt.width = li + lp + ld + le;
        fmt.prec = ld;
    }
    fmts
}

/// Dyadic `⍕` precision-only form: pick one width large enough for every
/// value at the shared precision.
pub fn update_widths(values: &[f64], fmts: &mut [ColFormat]) {
    let mut w = 0usize;
    if let Some(f) = fmts.first() {
        for &num in values {
            let s = match f.fmt {
                ColFmt::Exp => format_e(num, f.prec),
                _ => format!("{:.*}", f.prec, unsign_zero(num)),
            };
            w = w.max(s.len());
        }
    }
    for f in fmts.iter_mut() {
        f.width = w;
    }
}

/// Render one row. Every cell is right-justified to its column width
/// behind a single separator space; an overflowing cell becomes `*`s.
pub fn format_row(values: &[f64], fmts: &[ColFormat]) -> String {
    let mut out = String::new();
    for (&raw, f) in values.iter().zip(fmts) {
        let num = unsign_zero(raw);
        let cell = match f.fmt {
            ColFmt::Int => {
                let mut s = format!("{:>width$.prec$}", num, width = f.width, prec = f.prec);
                if s.contains('.') {
                    // Blank trailing zeros and a trailing point in place.
                    let mut bytes: Vec<u8> = s.into_bytes();
                    let mut i = bytes.len();
                    while i > 0 && bytes[i - 1] == b'0' {
                        bytes[i - 1] = b' ';
                        i -= 1;
                    }
                    if i > 0 && bytes[i - 1] == b'.' {
                        bytes[i - 1] = b' ';
                    }
                    s = String::from_utf8(bytes).expect("ascii digits");
                }
                s
            }
            ColFmt::Dec => format!("{:>width$.prec$}", num, width = f.width, prec = f.prec),
            ColFmt::Exp => format!("{:>width$}", format_e(num, f.prec), width = f.width),
        };
        if cell.len() == f.width {
            out.push(' ');
            out.push_str(&cell);
        } else {
            out.push(' ');
            out.push_str(&"*".repeat(f.width));
        }
    }
    out
}

fn read_values(ws: &Workspace, view: &ArrayView) -> Vec<f64> {
    (0..view.nelem).map(|i| view.num(ws, i)).collect()
}

/// Lines of a displayed numeric array, planes separated by blank lines.
pub fn display_lines(ws: &Workspace, d: &Desc, print_prec: usize) -> Vec<String> {
    let view = ArrayView::from_desc(d);
    if view.nelem == 0 {
        return Vec::new();
    }
    let nc = view.shape[view.rank - 1];
    let values = read_values(ws, &view);
    let fmts = measure_columns(&values, nc, print_prec);

    let mut lines = Vec::new();
    let nr = view.nelem / nc;
    // Rows are organized by the leading axes; a completed axis inserts a
    // blank separator line per level.
    let row_shape = &view.shape[..view.rank - 1];
    for r in 0..nr {
        lines.push(format_row(&values[r * nc..(r + 1) * nc], &fmts));
        if r + 1 < nr {
            let mut span = 1usize;
            for i in (1..row_shape.len()).rev() {
                span *= row_shape[i];
                if (r + 1) % span == 0 {
                    lines.push(String::new());
                } else {
                    break;
                }
            }
        }
    }
    lines
}

fn char_result(ws: &mut Workspace, d: &Desc, lines: &[String], rowlen: usize) -> Result<Desc> {
    let nr = lines.len();
    let dst = ws.temp_alloc(CHAR_SIZE, nr * rowlen)?;
    for (r, line) in lines.iter().enumerate() {
        for (c, ch) in line.chars().enumerate() {
            ws.set_u32(dst + (r * rowlen + c) * CHAR_SIZE, ch as u32);
        }
    }
    let mut out = *d;
    out.dtype = DataType::Chr;
    out.shape[out.rank as usize - 1] = rowlen as u32;
    out.doff = dst;
    Ok(out)
}

/// Monadic `⍕`: a character array laid out like the display form.
/// Characters are already formatted and pass through.
pub fn fun_format(ws: &mut Workspace, print_prec: usize) -> Result<()> {
    let mut d = ws.opr_top_desc();
    if d.is_char() {
        return Ok(());
    }
    let view = ArrayView::from_desc(&d);
    let nc = view.shape[view.rank - 1];
    let values = read_values(ws, &view);
    let fmts = measure_columns(&values, nc, print_prec);
    let rowlen: usize = fmts.iter().map(|f| 1 + f.width).sum();

    let nr = if nc == 0 { 0 } else { view.nelem / nc };
    let lines: Vec<String> = (0..nr)
        .map(|r| format_row(&values[r * nc..(r + 1) * nc], &fmts))
        .collect();

    if d.is_scalar() {
        // The virtualized scalar formats as a one-row vector.
        d.set_shape(&[rowlen]);
        let result = char_result(ws, &d, &lines, rowlen)?;
        ws.opr_set_top(&result);
        return Ok(());
    }
    let result = char_result(ws, &d, &lines, rowlen)?;
    ws.opr_set_top(&result);
    Ok(())
}

/// Dyadic `L⍕A` with a 1, 2, or 2×ncols element control vector; negative
/// precision selects exponential format.
pub fn fun_format_dyadic(ws: &mut Workspace) -> Result<()> {
    let l = ws.opr_pop();
    let mut d = ws.opr_top_desc();
    if d.is_char() {
        return Ok(());
    }
    if !l.is_number() {
        return Err(EvalErrorKind::Domain.into());
    }
    let lv = ArrayView::from_desc(&l);
    let view = ArrayView::from_desc(&d);
    let nc = view.shape[view.rank - 1];
    let values = read_values(ws, &view);

    let control: Vec<f64> = (0..lv.nelem).map(|i| lv.num(ws, i)).collect();
    let mut fmts = vec![
        ColFormat {
            fmt: ColFmt::Dec,
            width: 0,
            prec: 0,
        };
        nc
    ];

    let decode = |w: f64, p: f64| -> ColFormat {
        let (fmt, prec) = if p < 0.0 {
            (ColFmt::Exp, (-p - 1.0) as usize)
        } else {
            (ColFmt::Dec, p as usize)
        };
        ColFormat {
            fmt,
            width: w as usize,
            prec,
        }
    };

    match control.len() {
        1 => {
            let f = decode(0.0, control[0]);
            fmts.iter_mut().for_each(|slot| *slot = f);
            update_widths(&values, &mut fmts);
        }
        2 => {
            let f = decode(control[0], control[1]);
            fmts.iter_mut().for_each(|slot| *slot = f);
        }
        n if n == nc * 2 => {
            for (c, f) in fmts.iter_mut().enumerate() {
                *f = decode(control[c * 2], control[c * 2 + 1]);
            }
        }
        _ => return Err(EvalErrorKind::Length.into()),
    }

    let rowlen: usize = fmts.iter().map(|f| 1 + f.width).sum();
    let nr = if nc == 0 { 0 } else { view.nelem / nc };
    let lines: Vec<String> = (0..nr)
        .map(|r| format_row(&values[r * nc..(r + 1) * nc], &fmts))
        .collect();

    if d.is_scalar() {
        d.set_shape(&[rowlen]);
    }
    let result = char_result(ws, &d, &lines, rowlen)?;
    ws.opr_set_top(&result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(5.0, 10, "5")]
    #[case(-25.0, 10, "-25")]
    #[case(1.345, 10, "1.345")]
    #[case(0.0, 10, "0")]
    #[case(1234567890123.0, 10, "1.23456789e+12")]
    #[case(0.00001, 10, "1e-05")]
    #[case(1.5, 2, "1.5")]
    #[case(123.456, 2, "1.2e+02")]
    fn g_format(#[case] num: f64, #[case] prec: usize, #[case] want: &str) {
        assert_eq!(format_g(num, prec), want);
    }

    #[rstest]
    #[case(150.0, 2, "1.50e+02")]
    #[case(-0.0345, 3, "-3.450e-02")]
    #[case(0.0, 1, "0.0e+00")]
    #[case(2.0, 0, "2e+00")]
    fn e_format(#[case] num: f64, #[case] prec: usize, #[case] want: &str) {
        assert_eq!(format_e(num, prec), want);
    }

    #[test]
    fn integer_columns_blank_trailing_zeros() {
        // Column of 1.5, 2.5, 3: width 3, precision 1.
        let values = [1.5, 2.5, 3.0];
        let fmts = measure_columns(&values, 1, 10);
        assert_eq!(fmts[0].width, 3);
        assert_eq!(fmts[0].prec, 1);
        assert_eq!(format_row(&values[0..1], &fmts), " 1.5");
        // Whole numbers blank the fraction and the point.
        assert_eq!(format_row(&values[2..3], &fmts), " 3  ");
    }

    #[test]
    fn mixed_row_layout() {
        let values = [1.0, 20.0, 300.0];
        let fmts = measure_columns(&values, 3, 10);
        assert_eq!(format_row(&values, &fmts), " 1 20 300");
    }

    #[test]
    fn huge_values_force_exponential() {
        let values = [1e9];
        let fmts = measure_columns(&values, 1, 10);
        assert_eq!(fmts[0].fmt, ColFmt::Exp);
        let row = format_row(&values, &fmts);
        assert!(row.contains("e+09"), "row was {row:?}");
    }

    #[test]
    fn overflowing_cells_fill_with_stars() {
        let fmts = [ColFormat {
            fmt: ColFmt::Dec,
            width: 3,
            prec: 0,
        }];
        assert_eq!(format_row(&[12345.0], &fmts), " ***");
    }
}
