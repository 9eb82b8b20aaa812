//! User-defined function objects: header grammar, compilation and the
//! packed in-heap representation.
//!
//! A function object is one heap block laid out as
//! `header · names · (align) · literals · line offsets · source · object`.
//! Offsets inside the object are relative to its base so the block moves
//! freely with the workspace.

use log::debug;

use crate::error::{AplError, LexErrorKind, Result};
use crate::lexer::{find_name, Lexer, ROLE_ARG, ROLE_FUN, ROLE_LAB, ROLE_LOC, ROLE_RET};
use crate::token::Tok;
use crate::workspace::{align8, DataType, Offset, Workspace, EDIT_BUF_SIZE, NUM_SIZE};

/// Size of the fixed function header; the local-names table follows it.
pub const FUN_HDR: usize = 32;
/// Bytes reserved for the names table in a scratch buffer.
pub const FUN_NAMES_CAP: usize = 256;

/// Decoded fixed header of a function object.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunObj {
    pub total: usize,
    pub hdr: usize,
    pub src_size: usize,
    pub obj_size: usize,
    pub o_source: usize,
    pub o_object: usize,
    pub n_lines: usize,
    pub n_lits: usize,
    pub n_args: usize,
    pub n_locals: usize,
    pub has_ret: bool,
    pub dirty: bool,
}

impl FunObj {
    pub fn read(ws: &Workspace, base: Offset) -> FunObj {
        FunObj {
            total: ws.u32_at(base) as usize,
            hdr: ws.u32_at(base + 4) as usize,
            src_size: ws.u32_at(base + 8) as usize,
            obj_size: ws.u32_at(base + 12) as usize,
            o_source: ws.u32_at(base + 16) as usize,
            o_object: ws.u32_at(base + 20) as usize,
            n_lines: ws.u8_at(base + 24) as usize,
            n_lits: ws.u8_at(base + 25) as usize,
            n_args: ws.u8_at(base + 26) as usize,
            n_locals: ws.u8_at(base + 27) as usize,
            has_ret: ws.u8_at(base + 28) != 0,
            dirty: ws.u8_at(base + 29) != 0,
        }
    }

    pub fn write(&self, ws: &mut Workspace, base: Offset) {
        ws.set_u32(base, self.total as u32);
        ws.set_u32(base + 4, self.hdr as u32);
        ws.set_u32(base + 8, self.src_size as u32);
        ws.set_u32(base + 12, self.obj_size as u32);
        ws.set_u32(base + 16, self.o_source as u32);
        ws.set_u32(base + 20, self.o_object as u32);
        ws.set_u8(base + 24, self.n_lines as u8);
        ws.set_u8(base + 25, self.n_lits as u8);
        ws.set_u8(base + 26, self.n_args as u8);
        ws.set_u8(base + 27, self.n_locals as u8);
        ws.set_u8(base + 28, self.has_ret as u8);
        ws.set_u8(base + 29, self.dirty as u8);
        ws.set_u8(base + 30, 0);
        ws.set_u8(base + 31, 0);
    }

    pub fn names_off(base: Offset) -> Offset {
        base + FUN_HDR
    }

    /// Literal table of a saved object (the header size is 8-aligned at
    /// save time).
    pub fn lit_off(&self, base: Offset) -> Offset {
        base + self.hdr
    }

    pub fn lin_off(&self, base: Offset) -> Offset {
        self.lit_off(base) + self.n_lits * NUM_SIZE
    }

    pub fn obj_lineoff(&self, ws: &Workspace, base: Offset, line: usize) -> usize {
        ws.u32_at(self.lin_off(base) + line * 8 + 4) as usize
    }

    /// The name of the function: first entry of the names table.
    pub fn name(&self, ws: &Workspace, base: Offset) -> Vec<u8> {
        let off = FunObj::names_off(base);
        let len = ws.u8_at(off) as usize;
        ws.bytes(off + 3, len).to_vec()
    }

    /// Source lines (line 0 is the header), without terminators.
    pub fn source_lines(&self, ws: &Workspace, base: Offset) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.n_lines + 1);
        let mut off = base + self.o_source;
        for _ in 0..=self.n_lines {
            let len = ws.u8_at(off) as usize;
            let text = String::from_utf8_lossy(ws.bytes(off + 1, len)).into_owned();
            let text = text.trim_end_matches('\0').to_string();
            lines.push(text);
            off += len + 2;
        }
        lines
    }
}

/// Allocate and zero a scratch buffer for building or editing a function.
/// The buffer lives on the temp-array stack like any other intermediate.
pub fn new_edit_buffer(ws: &mut Workspace) -> Result<Offset> {
    let ebuf = ws.temp_alloc(NUM_SIZE, EDIT_BUF_SIZE / NUM_SIZE)?;
    ws.bytes_mut(ebuf, EDIT_BUF_SIZE).fill(0);
    let fun = FunObj {
        total: EDIT_BUF_SIZE,
        o_source: FUN_HDR + FUN_NAMES_CAP,
        ..FunObj::default()
    };
    fun.write(ws, ebuf);
    Ok(ebuf)
}

/// Parse the header line `∇ {ret ←} {A} fun {B} {; L1; …}` into the
/// names table, deriving arity, return flag and frame indices.
///
/// Frame indices are assigned in reverse because the evaluator's frame is
/// `[locals…, args reversed, return]` indexed from its base.
pub fn parse_header(ws: &mut Workspace, lex: &mut Lexer, ebuf: Offset) -> Result<()> {
    let mut fun = FunObj::read(ws, ebuf);
    let bad = |lex: &Lexer, ws: &Workspace| lex.err(ws, LexErrorKind::BadFunctionHeader);

    if lex.tok != Tok::Del {
        return Err(bad(lex, ws));
    }
    let names = FunObj::names_off(ebuf);
    let mut cursor = names;

    // Collected positional names, in source order.
    let mut positions: Vec<Offset> = Vec::new();
    let append = |ws: &mut Workspace, lex: &Lexer, cursor: &mut Offset| -> Result<Offset> {
        let entry = *cursor;
        if entry + 3 + lex.tok_len + 1 > names + FUN_NAMES_CAP {
            return Err(AplError::lex(LexErrorKind::BadFunctionHeader));
        }
        ws.set_u8(entry, lex.tok_len as u8);
        ws.set_u8(entry + 1, ROLE_FUN);
        ws.set_u8(entry + 2, 0);
        ws.copy_within(lex.tok_base, entry + 3, lex.tok_len);
        *cursor = entry + 3 + lex.tok_len;
        ws.set_u8(*cursor, 0);
        Ok(entry)
    };

    lex.next_tok(ws)?;
    if lex.tok != Tok::VarNam {
        return Err(bad(lex, ws));
    }
    positions.push(append(ws, lex, &mut cursor)?);
    lex.next_tok(ws)?;

    if lex.tok == Tok::LeftArrow {
        fun.has_ret = true;
        lex.next_tok(ws)?;
    }

    while lex.tok == Tok::VarNam {
        if positions.len() == 4 {
            return Err(bad(lex, ws));
        }
        let name = ws.bytes(lex.tok_base, lex.tok_len).to_vec();
        if find_name(ws, names, &name).is_some() {
            return Err(bad(lex, ws));
        }
        positions.push(append(ws, lex, &mut cursor)?);
        lex.next_tok(ws)?;
    }

    // Patch roles by position and put the function name first.
    let set_role = |ws: &mut Workspace, entry: Offset, role: u8, idx: u8| {
        ws.set_u8(entry + 1, role);
        ws.set_u8(entry + 2, idx);
    };
    let mut next_index;
    if fun.has_ret {
        match positions.len() {
            2 => {
                // ret ← fun
                set_role(ws, positions[0], ROLE_RET, 0);
                next_index = 1;
                swap_names(ws, positions[0], positions[1]);
            }
            3 => {
                // ret ← fun A
                set_role(ws, positions[0], ROLE_RET, 0);
                set_role(ws, positions[2], ROLE_ARG, 1);
                fun.n_args = 1;
                next_index = 2;
                swap_names(ws, positions[0], positions[1]);
            }
            4 => {
                // ret ← A fun B
                set_role(ws, positions[0], ROLE_RET, 0);
                set_role(ws, positions[1], ROLE_ARG, 1);
                set_role(ws, positions[3], ROLE_ARG, 2);
                fun.n_args = 2;
                next_index = 3;
                swap_names(ws, positions[0], positions[2]);
            }
            _ => return Err(bad(lex, ws)),
        }
    } else {
        match positions.len() {
            1 => next_index = 0,
            2 => {
                // fun A
                set_role(ws, positions[1], ROLE_ARG, 0);
                fun.n_args = 1;
                next_index = 1;
            }
            3 => {
                // A fun B
                set_role(ws, positions[0], ROLE_ARG, 0);
                set_role(ws, positions[2], ROLE_ARG, 1);
                fun.n_args = 2;
                next_index = 2;
                swap_names(ws, positions[0], positions[1]);
            }
            _ => return Err(bad(lex, ws)),
        }
    }

    // Locals after semicolons.
    while lex.tok == Tok::Semicolon {
        lex.next_tok(ws)?;
        if lex.tok != Tok::VarNam {
            return Err(bad(lex, ws));
        }
        let name = ws.bytes(lex.tok_base, lex.tok_len).to_vec();
        if find_name(ws, names, &name).is_some() {
            return Err(bad(lex, ws));
        }
        let entry = append(ws, lex, &mut cursor)?;
        set_role(ws, entry, ROLE_LOC, next_index as u8);
        next_index += 1;
        fun.n_locals += 1;
        lex.next_tok(ws)?;
    }

    ws.set_u8(cursor, 0);
    fun.hdr = cursor + 1 - ebuf;

    // Re-index everything but the function name in reverse order: that
    // is how the frame is laid out at call time.
    let mut off = names;
    loop {
        let len = ws.u8_at(off) as usize;
        if len == 0 {
            break;
        }
        if ws.u8_at(off + 1) != ROLE_FUN {
            next_index -= 1;
            ws.set_u8(off + 2, next_index as u8);
        }
        off += len + 3;
    }

    if lex.tok != Tok::End {
        return Err(bad(lex, ws));
    }
    fun.write(ws, ebuf);
    Ok(())
}

/// Swap two name entries so the function name comes first (header order
/// puts the return value or left argument before it).
fn swap_names(ws: &mut Workspace, first: Offset, fun_entry: Offset) {
    let fun_len = ws.u8_at(fun_entry) as usize + 3;
    let var_len = fun_entry - first;
    let mut temp = ws.bytes(fun_entry, fun_len).to_vec();
    temp[2] = 0;
    let vars = ws.bytes(first, var_len).to_vec();
    ws.bytes_mut(first + fun_len, var_len).copy_from_slice(&vars);
    ws.bytes_mut(first, fun_len).copy_from_slice(&temp);
}

/// Record a label (`name:` at the start of a line) with its line number.
fn add_label(ws: &mut Workspace, lex: &Lexer, ebuf: Offset, line: usize) -> Result<()> {
    let names = FunObj::names_off(ebuf);
    let name = ws.bytes(lex.tok_base, lex.tok_len).to_vec();
    if find_name(ws, names, &name).is_some() {
        return Err(lex.err(ws, LexErrorKind::BadLabel));
    }

    let mut off = names;
    loop {
        let len = ws.u8_at(off) as usize;
        if len == 0 {
            break;
        }
        off += len + 3;
    }
    if off + 3 + name.len() + 1 > names + FUN_NAMES_CAP {
        return Err(lex.err(ws, LexErrorKind::BadLabel));
    }
    ws.set_u8(off, name.len() as u8);
    ws.set_u8(off + 1, ROLE_LAB);
    ws.set_u8(off + 2, line as u8);
    ws.bytes_mut(off + 3, name.len()).copy_from_slice(&name);
    ws.set_u8(off + 3 + name.len(), 0);

    let mut fun = FunObj::read(ws, ebuf);
    fun.hdr = off + 3 + name.len() + 1 - ebuf;
    fun.write(ws, ebuf);
    Ok(())
}

/// Compile every body line of the function in the scratch buffer.
///
/// Lines are compiled from last to first so the downward-growing object
/// region ends up in source order; each line is terminated by `NL` unless
/// it already ends in a branch. Labels are collected first so forward
/// references resolve to line-number literals.
pub fn compile_fun(ws: &mut Workspace, lex: &mut Lexer, ebuf: Offset) -> Result<()> {
    let mut fun = FunObj::read(ws, ebuf);

    // Source line offsets; line 0 is the header.
    let mut off = lex.src_base;
    for line in 0..=fun.n_lines {
        lex.set_src_lineoff(ws, line, off - lex.src_base);
        off += ws.u8_at(off) as usize + 2;
    }

    // Label scan.
    for line in 1..=fun.n_lines {
        let start = lex.src_base + lex.src_lineoff(ws, line) + 1;
        lex.seek(ws, start)?;
        if lex.tok == Tok::VarNam && lex.current_char() == ':' as u32 {
            add_label(ws, lex, ebuf, line)?;
        }
    }

    lex.start_object(ws);
    for line in (1..=fun.n_lines).rev() {
        let start = lex.src_base + lex.src_lineoff(ws, line) + 1;
        lex.seek(ws, start)?;
        if lex.tok == Tok::VarNam && lex.current_char() == ':' as u32 {
            lex.next_tok(ws)?; // label
            lex.next_tok(ws)?; // colon
        }
        if lex.tok != Tok::RightArrow {
            // A branch stays as the line terminator.
            lex.emit_tok(ws, Tok::Nl.into())?;
        }
        lex.tok_expr(ws)?;
        lex.set_obj_lineoff(ws, line, lex.code + 1 - ebuf);
    }
    fun.obj_size = lex.obj_base - lex.code;
    fun.n_lits = lex.lit_count;
    lex.code += 1;

    // Rebase object offsets to the start of the object region.
    let base = if fun.n_lines > 0 {
        lex.obj_lineoff(ws, 1)
    } else {
        lex.code - ebuf
    };
    fun.o_object = base;
    lex.set_obj_lineoff(ws, 0, 0);
    for line in 1..=fun.n_lines {
        let rebased = lex.obj_lineoff(ws, line) - base;
        lex.set_obj_lineoff(ws, line, rebased);
    }
    fun.write(ws, ebuf);
    Ok(())
}

/// Copy the compiled function from the scratch buffer into a fresh heap
/// block and bind it under its own name.
pub fn save_fun(ws: &mut Workspace, lex: &Lexer, ebuf: Offset) -> Result<Offset> {
    let mut fun = FunObj::read(ws, ebuf);

    let snames = align8(fun.hdr);
    let slits = fun.n_lits * NUM_SIZE;
    let slins = (fun.n_lines + 1) * 2 * 4;
    let ssrc = fun.src_size;
    let sobj = fun.obj_size;
    let total = snames + slits + slins + ssrc + sobj;

    let block = ws.heap_alloc(total, 0)?;
    let mut dst = block;
    ws.copy_within(ebuf, dst, fun.hdr);
    // Zero the alignment gap after the names.
    for i in fun.hdr..snames {
        ws.set_u8(block + i, 0);
    }
    dst += snames;
    ws.copy_within(lex.lit_base, dst, slits);
    dst += slits;
    ws.copy_within(lex.lin_base, dst, slins);
    dst += slins;
    ws.copy_within(lex.src_base, dst, ssrc);
    dst += ssrc;
    ws.copy_within(lex.code, dst, sobj);

    fun.total = total;
    fun.hdr = snames;
    fun.o_source = snames + slits + slins;
    fun.o_object = fun.o_source + ssrc;
    fun.dirty = false;
    fun.write(ws, block);

    let name = fun.name(ws, block);
    let desc_off = ws.desc_alloc()?;
    let mut desc = crate::workspace::Desc::undef();
    desc.dtype = DataType::fun_of_arity(fun.n_args as u8);
    desc.doff = block;
    ws.set_desc_at(desc_off, &desc);
    ws.name_bind(&name, desc_off)?;
    debug!(
        "saved function {} ({} lines, {} literals)",
        String::from_utf8_lossy(&name),
        fun.n_lines,
        fun.n_lits
    );
    Ok(block)
}

/// The role mnemonics used by the function dump.
const ROLE_NAMES: [&str; 6] = ["FUN", "RET", "ARG", "LOC", "LAB", "GLB"];

/// Dump a saved function object (⎕dbg bit 2).
pub fn dump_fun(ws: &Workspace, base: Offset, out: &mut String) {
    use std::fmt::Write;

    let fun = FunObj::read(ws, base);
    let _ = writeln!(out, "--- FUNCTION at {base:#x} ---");
    let _ = writeln!(out, "total   = {}", fun.total);
    let _ = writeln!(out, "header  = {}", fun.hdr);
    let _ = writeln!(out, "source  = {}", fun.src_size);
    let _ = writeln!(out, "object  = {}", fun.obj_size);
    let _ = writeln!(out, "lines   = {}", fun.n_lines);
    let _ = writeln!(out, "lits    = {}", fun.n_lits);
    let _ = writeln!(out, "args    = {}", fun.n_args);
    let _ = writeln!(out, "locals  = {}", fun.n_locals);
    let _ = writeln!(out, "ret     = {}", fun.has_ret as u8);

    let _ = writeln!(out, "--- Names ---");
    let mut off = FunObj::names_off(base);
    loop {
        let len = ws.u8_at(off) as usize;
        if len == 0 {
            break;
        }
        let role = ws.u8_at(off + 1) as usize;
        let idx = ws.u8_at(off + 2);
        let name = String::from_utf8_lossy(ws.bytes(off + 3, len)).into_owned();
        let _ = writeln!(
            out,
            "{name:>8} T={}, I={idx}",
            ROLE_NAMES.get(role).unwrap_or(&"?")
        );
        off += len + 3;
    }

    let _ = writeln!(out, "--- Index  Literal ---");
    for i in 0..fun.n_lits {
        let _ = writeln!(out, "  {i:>4}  {:>8}", ws.f64_at(fun.lit_off(base) + i * NUM_SIZE));
    }

    let _ = writeln!(out, "--- Line  Source  Object ---");
    for i in 0..=fun.n_lines {
        let s = ws.u32_at(fun.lin_off(base) + i * 8);
        let o = ws.u32_at(fun.lin_off(base) + i * 8 + 4);
        let _ = writeln!(out, "  {i:>4}  {s:>6}  {o:>6}");
    }

    let _ = writeln!(out, "--- Source ---");
    for (i, line) in fun.source_lines(ws, base).iter().enumerate() {
        let _ = writeln!(out, "[{i}] {line}");
    }
    let _ = writeln!(out, "---");
}
