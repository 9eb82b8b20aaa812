//! The bytecode evaluator: expression walking, assignment, user-function
//! frames, branches and the system-variable dispatcher.
//!
//! The compiled stream is stored right-to-left, so one forward pass here
//! applies APL's right-to-left precedence. At each step the next one or
//! two tokens decide between axis brackets, reduce/scan, the products,
//! monadic or dyadic application, assignment and function calls.

use chrono::{Datelike, Timelike};
use log::debug;

use crate::engine::{
    self, indexing, linalg, reduce as red, scalar, search, structural, AxisSpec,
};
use crate::error::{EvalErrorKind, Result};
use crate::format;
use crate::function::FunObj;
use crate::interp::Interpreter;
use crate::lexer::Lexer;
use crate::token::{SysName, Tok};
use crate::utf8;
use crate::workspace::{
    DataType, Desc, Offset, Workspace, CHAR_SIZE, DESC_SIZE, NUM_SIZE, WSID_SIZE, WS_VERSION,
};

/// Evaluation environment: where code and literals come from and where
/// the current frame starts on the operand stack.
#[derive(Debug, Clone)]
pub struct Env {
    pub code: Offset,
    pub lit_base: Offset,
    pub lin_base: Offset,
    /// Operand-stack offset of the frame base; the stack depth of the
    /// current statement is measured against it.
    pub var_base: Offset,
    /// `⍎` keeps the last diamond value on the stack for its caller.
    pub keep_last: bool,
}

impl Env {
    pub fn from_lexer(lex: &Lexer, ws: &Workspace) -> Env {
        Env {
            code: lex.code + 1,
            lit_base: lex.lit_base,
            lin_base: lex.lin_base,
            var_base: ws.opr_base(),
            keep_last: false,
        }
    }
}

fn tok_of(byte: u8) -> Tok {
    // Invalid bytes map to a flagless token and surface as syntax errors.
    Tok::try_from(byte).unwrap_or(Tok::At)
}

fn peek(it: &Interpreter, env: &Env) -> Tok {
    tok_of(it.ws.u8_at(env.code))
}

fn peek_at(it: &Interpreter, env: &Env, k: usize) -> Tok {
    tok_of(it.ws.u8_at(env.code + k))
}

fn num_vals(it: &Interpreter, env: &Env) -> usize {
    (env.var_base - it.ws.opr_top()) / DESC_SIZE
}

fn validate_args(it: &Interpreter, env: &Env, n: usize) -> Result<()> {
    if num_vals(it, env) < n {
        return Err(EvalErrorKind::NoValue.into());
    }
    Ok(())
}

/// Evaluate a diamond-separated statement list. Each statement's value
/// is printed and dropped unless the environment keeps the last one.
pub fn eval_expr_list(it: &mut Interpreter, env: &mut Env) -> Result<()> {
    loop {
        eval_expr(it, env)?;
        let term = peek(it, env);
        if num_vals(it, env) > 0
            && term != Tok::RightArrow
            && (term == Tok::Diamond || !env.keep_last)
        {
            if it.print_expr {
                let top = it.ws.opr_top_desc();
                print_value(it, &top);
                it.print("\n");
            }
            it.ws.opr_drop(1);
        }
        let byte = it.ws.u8_at(env.code);
        env.code += 1;
        if tok_of(byte) != Tok::Diamond {
            env.code -= 1;
            return Ok(());
        }
    }
}

pub fn eval_expr(it: &mut Interpreter, env: &mut Env) -> Result<()> {
    match peek(it, env) {
        Tok::End | Tok::Nl | Tok::Diamond => return Ok(()),
        tok if tok.is_atom() => eval_atom(it, env)?,
        _ => return Err(EvalErrorKind::NotAtom.into()),
    }

    while !peek(it, env).is_end() {
        // Axis specification precedes its operator in the stream.
        let axis = if peek(it, env) == Tok::RightBracket {
            env.code += 1;
            eval_expr(it, env)?;
            if peek(it, env) != Tok::LeftBracket {
                return Err(EvalErrorKind::UnmatchedBrackets.into());
            }
            env.code += 1;
            let top = it.ws.opr_top_desc();
            if !top.is_number() || !top.is_scalar() {
                return Err(EvalErrorKind::Domain.into());
            }
            it.ws.opr_drop(1);
            let origin = it.origin() as i64;
            let (raw, laminate) = match engine::as_int(top.num) {
                Some(i) => (i, false),
                None => (top.num.ceil() as i64, true),
            };
            if raw < origin {
                return Err(EvalErrorKind::InvalidAxis.into());
            }
            let ax = (raw - origin) as usize;
            if laminate {
                AxisSpec::Laminate(ax)
            } else {
                AxisSpec::Regular(ax)
            }
        } else {
            AxisSpec::Default
        };

        let fun = peek(it, env);
        let nxt = peek_at(it, env, 1);

        if fun == Tok::LeftArrow {
            env.code += 1;
            validate_args(it, env, 1)?;

            let dims = if peek(it, env) == Tok::RightBracket {
                eval_index(it, env)?
            } else {
                0
            };

            match peek(it, env) {
                Tok::VarInx => var_set_inx(it, env, dims)?,
                Tok::VarNam => var_set_nam(it, env, dims)?,
                Tok::VarSys => {
                    if dims != 0 {
                        return Err(EvalErrorKind::SyntaxError.into());
                    }
                    var_set_sys(it, env)?;
                }
                Tok::Quad => {
                    if dims != 0 {
                        return Err(EvalErrorKind::SyntaxError.into());
                    }
                    let top = it.ws.opr_top_desc();
                    print_value(it, &top);
                    it.print("\n");
                    env.code += 1;
                }
                Tok::QuoteQuad => {
                    if dims != 0 {
                        return Err(EvalErrorKind::SyntaxError.into());
                    }
                    let top = it.ws.opr_top_desc();
                    print_value(it, &top);
                    env.code += 1;
                }
                _ => return Err(EvalErrorKind::BadFunction.into()),
            }

            let term = peek(it, env);
            if term == Tok::Diamond {
                it.ws.opr_drop(1);
            } else if (term == Tok::End || term == Tok::Nl) && !env.keep_last {
                it.ws.opr_drop(1);
            }
        } else if (fun == Tok::Slash || fun == Tok::SlashBar) && nxt.is_dyadic() {
            let top = it.ws.opr_top_desc();
            let ax = engine::resolve_axis(&top, axis, fun == Tok::Slash)?;
            red::reduce(&mut it.ws, nxt, ax)?;
            env.code += 2;
        } else if (fun == Tok::Backslash || fun == Tok::BackslashBar) && nxt.is_dyadic() {
            let top = it.ws.opr_top_desc();
            let ax = engine::resolve_axis(&top, axis, fun == Tok::Backslash)?;
            red::scan(&mut it.ws, nxt, ax)?;
            env.code += 2;
        } else if fun.is_dyadic() && nxt.is_atom() {
            env.code += 1;
            eval_atom(it, env)?;
            validate_args(it, env, 2)?;
            eval_dyadic(it, fun, axis)?;
        } else if fun.is_dyadic() && nxt == Tok::Dot && peek_at(it, env, 3).is_atom() {
            let third = peek_at(it, env, 2);
            if third == Tok::Jot {
                // A ∘.fun B
                env.code += 3;
                eval_atom(it, env)?;
                validate_args(it, env, 2)?;
                red::outer_product(&mut it.ws, fun)?;
            } else if third.is_dyadic() {
                // A fun2 . fun B
                env.code += 3;
                eval_atom(it, env)?;
                validate_args(it, env, 2)?;
                red::inner_product(&mut it.ws, third, fun)?;
            } else {
                return Err(EvalErrorKind::SyntaxError.into());
            }
        } else if fun.is_monadic() {
            validate_args(it, env, 1)?;
            env.code += 1;
            if fun == Tok::SysFun1 {
                let idx = it.ws.u8_at(env.code);
                env.code += 1;
                fun_system1(it, idx)?;
            } else {
                eval_monadic(it, fun, axis)?;
            }
        } else if fun == Tok::VarNam {
            // A name in operator position must be a defined function.
            env.code += 1;
            let len = it.ws.u8_at(env.code) as usize;
            let name = it.ws.bytes(env.code + 1, len).to_vec();
            env.code += 1 + len;
            let entry = it
                .ws
                .name_lookup(&name)
                .filter(|e| e.odesc != 0)
                .ok_or(EvalErrorKind::UndefinedVar)?;
            let desc = it.ws.desc_at(entry.odesc);
            if !desc.is_function() {
                return Err(EvalErrorKind::BadFunction.into());
            }
            let fun_base = desc.doff;
            let fobj = FunObj::read(&it.ws, fun_base);
            if desc.dtype.arity() == 2 && peek(it, env).is_atom() {
                eval_atom(it, env)?;
                validate_args(it, env, 2)?;
            } else if desc.dtype.arity() == 1 {
                validate_args(it, env, 1)?;
            } else {
                return Err(EvalErrorKind::BadFunction.into());
            }
            eval_function(it, fun_base, &fobj)?;
        } else {
            return Err(EvalErrorKind::SyntaxError.into());
        }
    }
    Ok(())
}

fn eval_atom(it: &mut Interpreter, env: &mut Env) -> Result<()> {
    // An index applies to any atom, not just variables.
    let dims = if peek(it, env) == Tok::RightBracket {
        eval_index(it, env)?
    } else {
        0
    };

    let byte = it.ws.u8_at(env.code);
    env.code += 1;
    match tok_of(byte) {
        Tok::Num => {
            let idx = it.ws.u8_at(env.code) as usize;
            env.code += 1;
            let num = it.ws.f64_at(env.lit_base + idx * NUM_SIZE);
            it.ws.opr_push(&Desc::scalar_num(num))?;
        }
        Tok::Chr => {
            let code = it.ws.u32_at(env.code);
            env.code += 4;
            it.ws.opr_push(&Desc::scalar_chr(code))?;
        }
        Tok::Arr => {
            let n = it.ws.u8_at(env.code) as usize;
            let idx = it.ws.u8_at(env.code + 1) as usize;
            env.code += 2;
            let mut d = Desc::undef();
            d.dtype = DataType::Num;
            d.set_shape(&[n]);
            d.doff = env.lit_base + idx * NUM_SIZE;
            it.ws.opr_push(&d)?;
        }
        Tok::Str => {
            let len = it.ws.u8_at(env.code) as usize;
            env.code += 1;
            let mut d = Desc::undef();
            d.dtype = DataType::Chr;
            d.set_shape(&[len]);
            // The code points in the stream are the payload.
            d.doff = env.code;
            env.code += len * 4;
            it.ws.opr_push(&d)?;
        }
        Tok::VarNam => var_get_nam(it, env)?,
        Tok::VarInx => var_get_inx(it, env)?,
        Tok::VarSys => var_get_sys(it, env)?,
        Tok::RightParen => {
            eval_expr(it, env)?;
            if peek(it, env) != Tok::LeftParen {
                return Err(EvalErrorKind::UnmatchedParens.into());
            }
            env.code += 1;
        }
        Tok::Quad => quad_input(it, env)?,
        Tok::QuoteQuad => quote_quad_input(it)?,
        _ => {}
    }

    if dims != 0 {
        let origin = it.origin();
        indexing::indexed_get(&mut it.ws, dims, origin)?;
    }
    Ok(())
}

/// Parse a bracketed index list; pushes one value (or an undefined
/// "whole axis" marker) per slot and returns the slot count.
fn eval_index(it: &mut Interpreter, env: &mut Env) -> Result<usize> {
    let mut dims = 0;
    loop {
        env.code += 1; // skip ] or ;
        if matches!(peek(it, env), Tok::Semicolon | Tok::LeftBracket) {
            it.ws.opr_push(&Desc::undef())?;
        } else {
            eval_expr(it, env)?;
        }
        dims += 1;
        if peek(it, env) != Tok::Semicolon {
            break;
        }
    }
    if peek(it, env) != Tok::LeftBracket {
        return Err(EvalErrorKind::UnmatchedBrackets.into());
    }
    env.code += 1;
    Ok(dims)
}

fn eval_dyadic(it: &mut Interpreter, fun: Tok, axis: AxisSpec) -> Result<()> {
    let origin = it.origin();
    match fun {
        Tok::Epsilon => search::fun_membership(&mut it.ws),
        Tok::Iota => search::fun_index_of(&mut it.ws, origin),
        Tok::Rho => {
            if axis != AxisSpec::Default {
                return Err(EvalErrorKind::SyntaxError.into());
            }
            structural::fun_reshape(&mut it.ws)
        }
        Tok::UpArrow => {
            if axis != AxisSpec::Default {
                return Err(EvalErrorKind::SyntaxError.into());
            }
            structural::fun_take(&mut it.ws)
        }
        Tok::DownArrow => {
            if axis != AxisSpec::Default {
                return Err(EvalErrorKind::SyntaxError.into());
            }
            structural::fun_drop(&mut it.ws)
        }
        Tok::DownTack => search::fun_encode(&mut it.ws),
        Tok::UpTack => search::fun_decode(&mut it.ws),
        Tok::Domino => linalg::fun_mat_divide(&mut it.ws),
        Tok::Comma | Tok::CommaBar => {
            let l = it.ws.opr_top_desc();
            let r = it.ws.opr_desc(1);
            let rank = l.rank.max(r.rank) as usize;
            let (ax, laminate) = match axis {
                AxisSpec::Default => {
                    if fun == Tok::Comma {
                        (rank.saturating_sub(1), false)
                    } else {
                        (0, false)
                    }
                }
                AxisSpec::Regular(ax) => {
                    if ax >= rank {
                        return Err(EvalErrorKind::InvalidAxis.into());
                    }
                    (ax, false)
                }
                AxisSpec::Laminate(ax) => (ax, true),
            };
            structural::fun_catenate(&mut it.ws, ax, laminate)
        }
        Tok::Thorn => format::fun_format_dyadic(&mut it.ws),
        Tok::QuestionMark => search::fun_deal(&mut it.ws, origin, &mut it.rng),
        Tok::Slash | Tok::SlashBar => {
            let target = it.ws.opr_desc(1);
            let ax = engine::resolve_axis(&target, axis, fun == Tok::Slash)?;
            structural::fun_compress(&mut it.ws, ax)
        }
        Tok::Backslash | Tok::BackslashBar => {
            let target = it.ws.opr_desc(1);
            let ax = engine::resolve_axis(&target, axis, fun == Tok::Backslash)?;
            structural::fun_expand(&mut it.ws, ax)
        }
        Tok::CircleStile | Tok::CircleBar => {
            let target = it.ws.opr_desc(1);
            let ax = engine::resolve_axis(&target, axis, fun == Tok::CircleStile)?;
            structural::fun_rotate(&mut it.ws, ax)
        }
        _ => scalar::dyadic_elementwise(&mut it.ws, fun),
    }
}

fn eval_monadic(it: &mut Interpreter, fun: Tok, axis: AxisSpec) -> Result<()> {
    // A fractional axis only laminates; a regular axis only applies to
    // the rotate/reverse pair.
    if matches!(axis, AxisSpec::Laminate(_)) {
        return Err(EvalErrorKind::SyntaxError.into());
    }
    if matches!(axis, AxisSpec::Regular(_))
        && !matches!(fun, Tok::CircleStile | Tok::CircleBar)
    {
        return Err(EvalErrorKind::SyntaxError.into());
    }

    let origin = it.origin();
    match fun {
        Tok::Iota => search::fun_iota(&mut it.ws, origin),
        Tok::Rho => structural::fun_shape(&mut it.ws),
        Tok::Domino => linalg::fun_mat_inverse(&mut it.ws),
        Tok::GradeUp => search::fun_grade(&mut it.ws, true, origin),
        Tok::GradeDown => search::fun_grade(&mut it.ws, false, origin),
        Tok::Transpose => structural::fun_transpose(&mut it.ws),
        Tok::CircleStile | Tok::CircleBar => {
            let top = it.ws.opr_top_desc();
            let ax = engine::resolve_axis(&top, axis, fun == Tok::CircleStile)?;
            structural::fun_reverse(&mut it.ws, ax)
        }
        Tok::Thorn => {
            let prec = it.print_prec();
            format::fun_format(&mut it.ws, prec)
        }
        Tok::Hydrant => fun_execute(it),
        _ => scalar::monadic_scalar(&mut it.ws, fun, origin, &mut it.rng),
    }
}

fn fun_system1(it: &mut Interpreter, idx: u8) -> Result<()> {
    match SysName::try_from(idx) {
        Ok(SysName::Ident) => linalg::sys_ident(&mut it.ws),
        Ok(SysName::Rref) => linalg::sys_rref(&mut it.ws),
        Ok(SysName::Lu) => linalg::sys_lu(&mut it.ws),
        _ => Err(EvalErrorKind::NotImplemented.into()),
    }
}

// --- variables ----------------------------------------------------------

fn var_get_nam(it: &mut Interpreter, env: &mut Env) -> Result<()> {
    let len = it.ws.u8_at(env.code) as usize;
    let name = it.ws.bytes(env.code + 1, len).to_vec();
    env.code += 1 + len;

    let entry = it
        .ws
        .name_lookup(&name)
        .filter(|e| e.odesc != 0)
        .ok_or(EvalErrorKind::UndefinedVar)?;
    let desc = it.ws.desc_at(entry.odesc);
    if !desc.is_function() {
        it.ws.opr_push(&desc)?;
        Ok(())
    } else if desc.dtype == DataType::Fun {
        // Niladic functions are invoked from atom position.
        let fobj = FunObj::read(&it.ws, desc.doff);
        eval_function(it, desc.doff, &fobj)
    } else {
        Err(EvalErrorKind::NotAtom.into())
    }
}

fn var_get_inx(it: &mut Interpreter, env: &mut Env) -> Result<()> {
    let idx = it.ws.u8_at(env.code) as usize;
    env.code += 1;
    let d = it.ws.desc_at(env.var_base + idx * DESC_SIZE);
    it.ws.opr_push(&d)
}

fn push_temp_chars(it: &mut Interpreter, chars: &[u32]) -> Result<()> {
    let off = engine::temp_chr_vec(&mut it.ws, chars)?;
    let mut d = Desc::undef();
    d.dtype = DataType::Chr;
    d.set_shape(&[chars.len()]);
    d.doff = off;
    it.ws.opr_push(&d)
}

fn push_temp_nums(it: &mut Interpreter, nums: &[f64]) -> Result<()> {
    let off = engine::temp_num_vec(&mut it.ws, nums)?;
    let mut d = Desc::undef();
    d.dtype = DataType::Num;
    d.set_shape(&[nums.len()]);
    d.doff = off;
    it.ws.opr_push(&d)
}

fn var_get_sys(it: &mut Interpreter, env: &mut Env) -> Result<()> {
    let idx = it.ws.u8_at(env.code);
    env.code += 1;
    match SysName::try_from(idx).map_err(|_| EvalErrorKind::NotImplemented)? {
        SysName::Alphabet => {
            let letters: Vec<u32> = (b'A'..=b'Z').map(u32::from).collect();
            push_temp_chars(it, &letters)
        }
        SysName::Digits => {
            let digits: Vec<u32> = (b'0'..=b'9').map(u32::from).collect();
            push_temp_chars(it, &digits)
        }
        SysName::CompTol => it.ws.opr_push(&Desc::scalar_num(it.comp_tol)),
        SysName::Debug => it.ws.opr_push(&Desc::scalar_num(it.dbg_flags as f64)),
        SysName::Origin => {
            let origin = it.origin() as f64;
            it.ws.opr_push(&Desc::scalar_num(origin))
        }
        SysName::PrintPrec => {
            let prec = it.print_prec() as f64;
            it.ws.opr_push(&Desc::scalar_num(prec))
        }
        SysName::Pid => it.ws.opr_push(&Desc::scalar_num(std::process::id() as f64)),
        SysName::Timestamp => {
            let now = chrono::Local::now();
            let stamp = [
                now.year() as f64,
                now.month() as f64,
                now.day() as f64,
                now.hour() as f64,
                now.minute() as f64,
                now.second() as f64,
                now.timestamp_subsec_micros() as f64,
            ];
            push_temp_nums(it, &stamp)
        }
        SysName::Version => {
            let ver: Vec<f64> = WS_VERSION.iter().map(|&v| v as f64).collect();
            push_temp_nums(it, &ver)
        }
        SysName::Wsid => {
            let id: Vec<u32> = it.ws.wsid().chars().map(|c| c as u32).collect();
            push_temp_chars(it, &id)
        }
        _ => Err(EvalErrorKind::NotImplemented.into()),
    }
}

fn var_set_sys(it: &mut Interpreter, env: &mut Env) -> Result<()> {
    env.code += 1; // skip VarSys
    let idx = it.ws.u8_at(env.code);
    env.code += 1;
    let top = it.ws.opr_top_desc();
    match SysName::try_from(idx).map_err(|_| EvalErrorKind::ReadOnlySysVar)? {
        SysName::CompTol => {
            it.comp_tol = engine::num_value(&it.ws, &top)?;
        }
        SysName::Debug => {
            it.dbg_flags = engine::int_value(&it.ws, &top)? as u32;
        }
        SysName::Origin => {
            let v = engine::bool_value(&it.ws, &top)?;
            it.ws.set_origin(v as usize);
        }
        SysName::PrintPrec => {
            let v = engine::int_value(&it.ws, &top)?;
            if !(1..=16).contains(&v) {
                return Err(EvalErrorKind::Domain.into());
            }
            it.ws.set_print_prec(v as usize);
        }
        SysName::Wsid => {
            let chars = engine::str_value(&it.ws, &top)?;
            let id: String = chars
                .iter()
                .filter_map(|&c| char::from_u32(c))
                .collect();
            if id.len() > WSID_SIZE - 1 {
                return Err(EvalErrorKind::Length.into());
            }
            it.ws.set_wsid(&id);
        }
        _ => return Err(EvalErrorKind::ReadOnlySysVar.into()),
    }
    Ok(())
}

fn var_set_inx(it: &mut Interpreter, env: &mut Env, dims: usize) -> Result<()> {
    env.code += 1; // skip VarInx
    let idx = it.ws.u8_at(env.code) as usize;
    env.code += 1;
    let slot = env.var_base + idx * DESC_SIZE;

    if dims == 0 {
        // Locals hold temporary payloads; a descriptor copy is enough.
        let top = it.ws.opr_top_desc();
        it.ws.set_desc_at(slot, &top);
    } else {
        let d = it.ws.desc_at(slot);
        it.ws.opr_push(&d)?;
        let origin = it.origin();
        indexing::indexed_set(&mut it.ws, dims, origin)?;
    }
    Ok(())
}

/// Assign a global: scalars store inline; array payloads are copied from
/// the temp stack into a heap block sized for them.
fn var_set_nam(it: &mut Interpreter, env: &mut Env, dims: usize) -> Result<()> {
    env.code += 1; // skip VarNam
    let len = it.ws.u8_at(env.code) as usize;
    let name = it.ws.bytes(env.code + 1, len).to_vec();
    env.code += 1 + len;

    let entry = match it.ws.name_lookup(&name) {
        Some(e) => e,
        None => {
            if dims != 0 {
                return Err(EvalErrorKind::UndefinedVar.into());
            }
            it.ws.name_add(&name)?
        }
    };

    let desc_off = if entry.odesc != 0 {
        entry.odesc
    } else {
        if dims != 0 {
            return Err(EvalErrorKind::UndefinedVar.into());
        }
        let off = it.ws.desc_alloc()?;
        it.ws.name_set_odesc(entry.offset, off, DataType::Und);
        off
    };

    if dims != 0 {
        let d = it.ws.desc_at(desc_off);
        it.ws.opr_push(&d)?;
        let origin = it.origin();
        return indexing::indexed_set(&mut it.ws, dims, origin);
    }

    let top = it.ws.opr_top_desc();
    let old = it.ws.desc_at(desc_off);
    it.ws
        .name_set_odesc(entry.offset, desc_off, top.dtype);

    if top.is_scalar() {
        if old.is_array() {
            it.ws.heap_free(old.doff);
        }
        it.ws.set_desc_at(desc_off, &top);
        return Ok(());
    }

    let elem = if top.is_number() { NUM_SIZE } else { CHAR_SIZE };
    let size_new = top.nelem() * elem;
    let block = if old.is_array() {
        let old_elem = if old.is_number() { NUM_SIZE } else { CHAR_SIZE };
        let size_old = old.nelem() * old_elem;
        if size_old != size_new {
            it.ws.heap_free(old.doff);
            it.ws.heap_alloc(size_new, desc_off)?
        } else {
            old.doff
        }
    } else {
        it.ws.heap_alloc(size_new, desc_off)?
    };

    let mut stored = top;
    stored.doff = block;
    it.ws.copy_within(top.doff, block, size_new);
    it.ws.set_desc_at(desc_off, &stored);
    Ok(())
}

// --- user functions ------------------------------------------------------

/// Pick the branch target from the value of `→ expr`: a numeric scalar
/// jumps; an empty array or undefined value falls through; a non-empty
/// array jumps to its first element; anything else returns.
fn branch_line(it: &Interpreter, previous: i64) -> i64 {
    let top = it.ws.opr_top_desc();
    match top.dtype {
        DataType::Num | DataType::Int => {
            if top.is_scalar() {
                top.num as i64
            } else if top.nelem() == 0 {
                previous + 1
            } else {
                it.ws.f64_at(top.doff) as i64
            }
        }
        DataType::Und => previous + 1,
        _ => 0,
    }
}

/// Run a compiled function body. The frame below the caller's stack is
/// `[locals…, args reversed, return-slot]`; on return the stack is cut
/// back so only the return value (if declared) remains.
pub fn eval_function(it: &mut Interpreter, fun_base: Offset, fobj: &FunObj) -> Result<()> {
    debug!(
        "calling {} ({} args)",
        String::from_utf8_lossy(&fobj.name(&it.ws, fun_base)),
        fobj.n_args
    );

    match fobj.n_args * 2 + fobj.has_ret as usize {
        0 | 2 => {}
        1 => {
            it.ws.opr_push(&Desc::undef())?;
        }
        3 => {
            it.ws.opr_push(&Desc::undef())?;
            it.ws.opr_swap();
        }
        4 => it.ws.opr_swap(),
        5 => {
            let omega = it.ws.opr_desc(1);
            it.ws.opr_set_desc(1, &Desc::undef()); // return slot
            it.ws.opr_push(&Desc::undef())?;
            it.ws.opr_set_desc(0, &omega);
        }
        _ => unreachable!("arity is 0, 1 or 2"),
    }
    for _ in 0..fobj.n_locals {
        it.ws.opr_push(&Desc::undef())?;
    }

    let mut env = Env {
        code: 0,
        lit_base: fobj.lit_off(fun_base),
        lin_base: fobj.lin_off(fun_base),
        var_base: it.ws.opr_top(),
        keep_last: false,
    };
    let obj_abs = fun_base + fobj.o_object;

    let mut line: i64 = 1;
    while line >= 1 && line <= fobj.n_lines as i64 {
        env.code = obj_abs + fobj.obj_lineoff(&it.ws, fun_base, line as usize);
        it.ws.opr_truncate(env.var_base);
        eval_expr_list(it, &mut env)?;
        match peek(it, &env) {
            Tok::Nl => line += 1,
            Tok::RightArrow => {
                validate_args(it, &env, 1)?;
                line = branch_line(it, line);
            }
            _ => return Err(EvalErrorKind::SyntaxError.into()),
        }
    }

    // Drop locals and arguments; the return slot (when declared) is left
    // as the call's value.
    let cut = env.var_base + (fobj.n_locals + fobj.n_args) * DESC_SIZE;
    it.ws.opr_truncate(cut);
    Ok(())
}

// --- execute and quad input ----------------------------------------------

/// `⍎S`: lex and run a string in a transient buffer on the temp stack,
/// leaving the last value on the operand stack.
fn fun_execute(it: &mut Interpreter) -> Result<()> {
    let top = it.ws.opr_top_desc();
    if !top.is_char() {
        return Err(EvalErrorKind::Domain.into());
    }
    if top.rank != 1 {
        return Err(EvalErrorKind::Rank.into());
    }
    let len = top.shape[0] as usize;
    let chars: Vec<u32> = (0..len)
        .map(|i| it.ws.u32_at(top.doff + i * CHAR_SIZE))
        .collect();
    it.ws.opr_drop(1);

    let mut bytes = Vec::with_capacity(len * 4 + 1);
    for &c in &chars {
        utf8::push_encoded(c, &mut bytes);
    }
    bytes.push(0);

    let buf_len = (bytes.len() * 8).max(128);
    let buf = it.ws.temp_alloc(1, buf_len)?;
    it.ws.bytes_mut(buf, bytes.len()).copy_from_slice(&bytes);

    it.enter_context()?;
    let result = (|| {
        let mut lex = Lexer::new(buf, buf_len, 0, None);
        lex.init(bytes.len())?;
        lex.start_line(&mut it.ws)?;
        lex.tok_expr(&mut it.ws)?;

        let mut env = Env::from_lexer(&lex, &it.ws);
        env.var_base = it.ws.opr_top();
        env.keep_last = true;
        eval_expr_list(it, &mut env)
    })();
    it.leave_context();
    result
}

/// `⍞`: read a raw line as a character vector (empty on EOF).
fn quote_quad_input(it: &mut Interpreter) -> Result<()> {
    let mut d = Desc::undef();
    d.dtype = DataType::Chr;
    d.set_shape(&[0]);

    let line = it.input.read_line("");
    match line {
        Some(text) if !text.is_empty() => {
            let chars: Vec<u32> = text.chars().map(|c| c as u32).collect();
            push_temp_chars(it, &chars)
        }
        _ => it.ws.opr_push(&d),
    }
}

/// `⎕` input: prompt, read a line, evaluate it.
fn quad_input(it: &mut Interpreter, _env: &mut Env) -> Result<()> {
    it.print("⎕:\n");
    it.print(crate::interp::PROMPT);
    quote_quad_input(it)?;
    fun_execute(it)
}

// --- printing -------------------------------------------------------------

/// Rows of a character array, planes separated by blank lines.
fn char_lines(ws: &Workspace, d: &Desc) -> Vec<String> {
    let view = engine::ArrayView::from_desc(d);
    if view.nelem == 0 {
        return Vec::new();
    }
    let nc = view.shape[view.rank - 1];
    let nr = view.nelem / nc;
    let row_shape = &view.shape[..view.rank - 1];

    let mut lines = Vec::new();
    for r in 0..nr {
        let row: String = (0..nc)
            .map(|c| char::from_u32(view.chr(ws, r * nc + c)).unwrap_or(' '))
            .collect();
        lines.push(row);
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

/// Display a value (no trailing newline). Higher-rank arrays get a blank
/// line before and after. Numeric display swaps `-` for the APL high
/// minus.
pub fn print_value(it: &mut Interpreter, d: &Desc) {
    if d.rank > 1 {
        it.print("\n");
    }
    match d.dtype {
        DataType::Num | DataType::Int => {
            let lines = format::display_lines(&it.ws, d, it.print_prec());
            let text = lines.join("\n").replace('-', "¯");
            it.print(&text);
        }
        DataType::Chr => {
            if d.is_scalar() {
                if let Some(c) = char::from_u32(d.chr) {
                    it.print(&c.to_string());
                }
            } else {
                let text = char_lines(&it.ws, d).join("\n");
                it.print(&text);
            }
        }
        _ => {}
    }
    if d.rank > 1 {
        it.print("\n");
    }
}

// --- debug listing --------------------------------------------------------

/// Listing of a compiled stream (⎕dbg bit 1), one token per line.
pub fn tok_print(it: &Interpreter, base: Offset, lit_base: Offset) -> String {
    use std::fmt::Write;

    let ws = &it.ws;
    let mut out = String::new();
    let mut pc = base;
    loop {
        let byte = ws.u8_at(pc);
        let tok = tok_of(byte);
        if tok == Tok::End && byte == u8::from(Tok::End) {
            let _ = writeln!(out, "{:04} 000 END", pc - base);
            return out;
        }
        let _ = write!(out, "{:04} {:03} ", pc - base, byte);
        match tok {
            Tok::Num => {
                pc += 1;
                let idx = ws.u8_at(pc) as usize;
                let _ = writeln!(out, "NUM={}", format::format_g(ws.f64_at(lit_base + idx * NUM_SIZE), 10));
            }
            Tok::Chr => {
                pc += 1;
                let c = char::from_u32(ws.u32_at(pc)).unwrap_or('?');
                let _ = writeln!(out, "CHR='{c}'");
                pc += 3;
            }
            Tok::Arr => {
                let n = ws.u8_at(pc + 1) as usize;
                let idx = ws.u8_at(pc + 2) as usize;
                pc += 2;
                let nums: Vec<String> = (0..n)
                    .map(|i| format::format_g(ws.f64_at(lit_base + (idx + i) * NUM_SIZE), 10))
                    .collect();
                let _ = writeln!(out, "ARR={}", nums.join(" "));
            }
            Tok::Str => {
                let n = ws.u8_at(pc + 1) as usize;
                let text: String = (0..n)
                    .map(|i| char::from_u32(ws.u32_at(pc + 2 + i * 4)).unwrap_or('?'))
                    .collect();
                let _ = writeln!(out, "STR={text}");
                pc += 1 + n * 4;
            }
            Tok::VarNam => {
                let n = ws.u8_at(pc + 1) as usize;
                let name = String::from_utf8_lossy(ws.bytes(pc + 2, n)).into_owned();
                let _ = writeln!(out, "VARNAM {name} (L={n})");
                pc += 1 + n;
            }
            Tok::VarInx => {
                pc += 1;
                let _ = writeln!(out, "VARINX I={}", ws.u8_at(pc));
            }
            Tok::VarSys => {
                pc += 1;
                let _ = writeln!(out, "VARSYS I={}", ws.u8_at(pc));
            }
            Tok::SysFun1 => {
                pc += 1;
                let _ = writeln!(out, "SYSFUN1 I={}", ws.u8_at(pc));
            }
            Tok::Nl => {
                let _ = writeln!(out, "NL");
            }
            _ => {
                let _ = writeln!(out, "{}", tok.glyph().unwrap_or('?'));
            }
        }
        pc += 1;
    }
}
