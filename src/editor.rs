//! The `∇` definition/edit mode.
//!
//! Inside definition mode each input line is either a bracketed editor
//! command (`[⎕]`, `[N⎕]`, `[⎕N]`, `[M⎕N]`, `[N]`, `[∆N]`, `[<N]`,
//! `[>N]`), body text, or a closing `∇`. A whole function may also be
//! given on one line with diamonds separating the body lines.

use crate::error::{AplError, EditErrorKind, LexErrorKind, Result};
use crate::function::{
    compile_fun, dump_fun, new_edit_buffer, parse_header, save_fun, FunObj,
};
use crate::interp::{Interpreter, DBG_DUMP_FUNCTION, PROMPT};
use crate::lexer::Lexer;
use crate::token::Tok;
use crate::workspace::{Offset, Workspace};

/// Line prompt in the editor: `[n]` padded like the session prompt.
fn line_prompt(n: usize) -> String {
    let head = format!("[{n}]");
    if head.len() >= PROMPT.len() {
        head
    } else {
        format!("{head}{}", &PROMPT[head.len()..])
    }
}

/// Split a `∇ …` line into header and body segments on diamonds that are
/// outside string quotes. A trailing `∇` closes the definition.
fn split_del_line(line: &str) -> (Vec<String>, bool) {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut closed = false;

    for c in line.chars() {
        match c {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '⋄' if !in_quotes => {
                segments.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let mut last = current.trim().to_string();
    if !in_quotes && last.ends_with('∇') {
        closed = true;
        last = last.trim_end_matches('∇').trim_end().to_string();
    }
    if !last.is_empty() || segments.is_empty() {
        segments.push(last);
    }
    (segments, closed)
}

/// Dispatch a REPL line that starts with `∇`: definition of a new
/// function, or an edit of an existing one.
pub fn del_command(it: &mut Interpreter, lex: &mut Lexer) -> Result<()> {
    lex.next_tok(&mut it.ws)?;
    if lex.tok != Tok::VarNam {
        return Err(lex.err(&it.ws, LexErrorKind::BadDelCommand));
    }
    let name = it.ws.bytes(lex.tok_base, lex.tok_len).to_vec();
    let entry = it.ws.name_lookup(&name).filter(|e| e.is_defined());

    lex.next_tok(&mut it.ws)?;
    if lex.tok == Tok::LeftBracket {
        // ∇ fun [...] : edit command on an existing function.
        let entry = entry
            .filter(|e| e.is_function())
            .ok_or_else(|| lex.err(&it.ws, LexErrorKind::FunNotDefined))?;
        let fun_block = it.ws.desc_at(entry.odesc).doff;
        let ebuf = open_fun(&mut it.ws, fun_block)?;
        return edit_fun(it, lex, ebuf, true);
    }

    match entry {
        Some(e) if e.is_function() => {
            if lex.tok == Tok::End {
                let fun_block = it.ws.desc_at(e.odesc).doff;
                let ebuf = open_fun(&mut it.ws, fun_block)?;
                edit_fun(it, lex, ebuf, false)
            } else {
                Err(lex.err(&it.ws, LexErrorKind::FunAlreadyDefined))
            }
        }
        Some(_) => Err(lex.err(&it.ws, LexErrorKind::NameConflict)),
        None => {
            // New definition; the line may carry the whole body.
            let raw = read_line_text(&it.ws, lex.src_base);
            let (segments, closed) = split_del_line(&raw);
            let ebuf = new_fun(it, lex, &segments[0])?;
            for body in &segments[1..] {
                append_line(&mut it.ws, ebuf, body)?;
            }
            if closed {
                compile_and_save(it, ebuf)
            } else {
                edit_fun(it, lex, ebuf, false)
            }
        }
    }
}

fn read_line_text(ws: &Workspace, base: Offset) -> String {
    let mut end = base;
    while ws.u8_at(end) != 0 {
        end += 1;
    }
    String::from_utf8_lossy(ws.bytes(base, end - base)).into_owned()
}

/// Start a new function from its header text: scratch buffer, header
/// parse, source line 0.
fn new_fun(it: &mut Interpreter, lex: &mut Lexer, header: &str) -> Result<Offset> {
    let ebuf = new_edit_buffer(&mut it.ws)?;

    let len = it.stage_line(header);
    lex.init(len)?;
    lex.start_line(&mut it.ws)?;
    parse_header(&mut it.ws, lex, ebuf)?;

    let mut fun = FunObj::read(&it.ws, ebuf);
    let src = ebuf + fun.o_source;
    let bytes = header.as_bytes();
    it.ws.set_u8(src, bytes.len() as u8);
    it.ws.bytes_mut(src + 1, bytes.len()).copy_from_slice(bytes);
    it.ws.set_u8(src + 1 + bytes.len(), 0);
    fun.src_size = bytes.len() + 2;
    fun.n_lines = 0;
    fun.dirty = true;
    fun.write(&mut it.ws, ebuf);
    Ok(ebuf)
}

/// Copy an existing function into a scratch buffer for editing: header,
/// names (labels dropped; they are rediscovered at compile), and source.
fn open_fun(ws: &mut Workspace, fun_block: Offset) -> Result<Offset> {
    let old = FunObj::read(ws, fun_block);
    let ebuf = new_edit_buffer(ws)?;
    let mut fun = FunObj::read(ws, ebuf);

    // Copy name entries, skipping labels.
    let mut src = FunObj::names_off(fun_block);
    let mut dst = FunObj::names_off(ebuf);
    loop {
        let len = ws.u8_at(src) as usize;
        if len == 0 {
            break;
        }
        if ws.u8_at(src + 1) < crate::lexer::ROLE_LAB {
            ws.copy_within(src, dst, len + 3);
            dst += len + 3;
        }
        src += len + 3;
    }
    ws.set_u8(dst, 0);
    fun.hdr = dst + 1 - ebuf;

    fun.n_lines = old.n_lines;
    fun.n_args = old.n_args;
    fun.n_locals = old.n_locals;
    fun.has_ret = old.has_ret;
    fun.src_size = old.src_size;
    ws.copy_within(fun_block + old.o_source, ebuf + fun.o_source, old.src_size);
    fun.dirty = false;
    fun.write(ws, ebuf);
    Ok(ebuf)
}

/// Append one body line to the function under construction.
fn append_line(ws: &mut Workspace, ebuf: Offset, text: &str) -> Result<()> {
    let fun = FunObj::read(ws, ebuf);
    insert_line(ws, ebuf, fun.n_lines + 1, text, false)
}

fn line_offset(ws: &Workspace, ebuf: Offset, line: usize) -> Offset {
    let fun = FunObj::read(ws, ebuf);
    let mut off = ebuf + fun.o_source;
    for _ in 0..line {
        off += ws.u8_at(off) as usize + 2;
    }
    off
}

fn insert_line(ws: &mut Workspace, ebuf: Offset, at: usize, text: &str, replace: bool) -> Result<()> {
    let mut fun = FunObj::read(ws, ebuf);
    let src_max = fun.total - fun.o_source;
    let src_base = ebuf + fun.o_source;
    let mut end = src_base + fun.src_size;

    let at_off = line_offset(ws, ebuf, at);
    if replace && at_off != end {
        let slot = ws.u8_at(at_off) as usize + 2;
        ws.copy_within(at_off + slot, at_off, end - at_off - slot);
        end -= slot;
        fun.n_lines -= 1;
        fun.src_size -= slot;
    }

    let bytes = text.as_bytes();
    if bytes.len() > 255 {
        return Err(EditErrorKind::FunctionTooBig.into());
    }
    let slot = bytes.len() + 2;
    if fun.src_size + slot > src_max {
        fun.write(ws, ebuf);
        return Err(EditErrorKind::FunctionTooBig.into());
    }
    if at_off != end {
        // Open a gap for the new line.
        let tail = end - at_off;
        let moved = ws.bytes(at_off, tail).to_vec();
        ws.bytes_mut(at_off + slot, tail).copy_from_slice(&moved);
    }
    ws.set_u8(at_off, bytes.len() as u8);
    ws.bytes_mut(at_off + 1, bytes.len()).copy_from_slice(bytes);
    ws.set_u8(at_off + 1 + bytes.len(), 0);

    fun.n_lines += 1;
    fun.src_size += slot;
    fun.dirty = true;
    fun.write(ws, ebuf);
    Ok(())
}

fn delete_line(ws: &mut Workspace, ebuf: Offset, at: usize) {
    let mut fun = FunObj::read(ws, ebuf);
    let src_base = ebuf + fun.o_source;
    let end = src_base + fun.src_size;
    let at_off = line_offset(ws, ebuf, at);
    if at_off == end {
        return;
    }
    let slot = ws.u8_at(at_off) as usize + 2;
    ws.copy_within(at_off + slot, at_off, end - at_off - slot);
    fun.n_lines -= 1;
    fun.src_size -= slot;
    fun.dirty = true;
    fun.write(ws, ebuf);
}

/// Print lines `line1..=line2` of a function; `all` also shows the
/// header and the closing del.
pub fn print_fun(it: &mut Interpreter, base: Offset, line1: usize, line2: usize, all: bool) {
    let fun = FunObj::read(&it.ws, base);
    let lines = fun.source_lines(&it.ws, base);
    let (from, to) = if all {
        (1, fun.n_lines)
    } else {
        (line1.max(1), line2.min(fun.n_lines))
    };
    if all {
        it.println(&format!("{PROMPT}{}", lines[0]));
    }
    for (n, line) in lines.iter().enumerate().take(to + 1).skip(from) {
        it.println(&format!("{}{line}", line_prompt(n)));
    }
    if all {
        it.println(&format!("{PROMPT}∇"));
    }
}

struct EditState {
    cur_line: usize,
    /// Replace the current line with the next insertion.
    replace: bool,
}

/// The interactive editor loop. Editor errors abort the offending
/// command but keep lines already accepted.
pub fn edit_fun(
    it: &mut Interpreter,
    lex: &mut Lexer,
    ebuf: Offset,
    mut pending: bool,
) -> Result<()> {
    let mut state = EditState {
        cur_line: FunObj::read(&it.ws, ebuf).n_lines + 1,
        replace: false,
    };

    loop {
        if !pending {
            let prompt = line_prompt(state.cur_line);
            let Some(line) = it.input.read_line(&prompt) else {
                return Ok(());
            };
            if line.is_empty() {
                continue;
            }
            let len = it.stage_line(&line);
            lex.init(len)?;
            lex.start_line(&mut it.ws)?;
        }
        pending = false;

        match edit_line(it, lex, ebuf, &mut state) {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) if !err.is_fatal() => it.println(&format!("{err}")),
            Err(err) => return Err(err),
        }
    }

    let fun = FunObj::read(&it.ws, ebuf);
    if fun.dirty {
        compile_and_save(it, ebuf)?;
    }
    Ok(())
}

/// Process one editor input; returns true when the closing `∇` was seen.
fn edit_line(
    it: &mut Interpreter,
    lex: &mut Lexer,
    ebuf: Offset,
    state: &mut EditState,
) -> Result<bool> {
    let n_lines = FunObj::read(&it.ws, ebuf).n_lines;
    let bad_cmd = || AplError::edit(EditErrorKind::BadEditCommand);

    let check_line = |state: &mut EditState, n_lines: usize| -> Result<()> {
        if state.cur_line < 1 || state.cur_line > n_lines + 1 {
            state.cur_line = n_lines + 1;
            return Err(EditErrorKind::BadLineNumber.into());
        }
        Ok(())
    };

    let mut text_start = lex.src_base;
    let mut show: Option<(usize, usize)> = None;

    if lex.tok == Tok::LeftBracket {
        lex.next_tok(&mut it.ws)?;
        match lex.tok {
            Tok::LessThan => {
                // [< {line}] : insert before a line.
                lex.next_tok(&mut it.ws)?;
                if lex.tok == Tok::Num {
                    state.cur_line = lex.tok_num as usize;
                    check_line(state, n_lines)?;
                    lex.next_tok(&mut it.ws)?;
                } else {
                    state.cur_line = 1;
                }
            }
            Tok::GreaterThan => {
                // [> {line}] : insert after a line.
                lex.next_tok(&mut it.ws)?;
                if lex.tok == Tok::Num {
                    state.cur_line = lex.tok_num as usize + 1;
                    check_line(state, n_lines)?;
                    lex.next_tok(&mut it.ws)?;
                } else {
                    state.cur_line = n_lines + 1;
                }
            }
            Tok::Delta => {
                // [∆ {line}] : delete a line, insert at that point.
                lex.next_tok(&mut it.ws)?;
                if lex.tok == Tok::Num {
                    state.cur_line = lex.tok_num as usize;
                    check_line(state, n_lines)?;
                    lex.next_tok(&mut it.ws)?;
                }
                delete_line(&mut it.ws, ebuf, state.cur_line);
            }
            _ => {
                // Display commands [{line1} {⎕} {line2}] or replace [N].
                let mut line1 = 0usize;
                let mut seen = false;
                if lex.tok == Tok::Num {
                    seen = true;
                    line1 = lex.tok_num as usize;
                    lex.next_tok(&mut it.ws)?;
                    if lex.tok == Tok::RightBracket {
                        state.cur_line = line1;
                        check_line(state, n_lines)?;
                        state.replace = true;
                    }
                }
                if lex.tok == Tok::Quad {
                    seen = true;
                    lex.next_tok(&mut it.ws)?;
                    let line2;
                    if lex.tok == Tok::Num {
                        if line1 == 0 {
                            line1 = 1;
                        }
                        line2 = lex.tok_num as usize;
                        lex.next_tok(&mut it.ws)?;
                        show = Some((line1, line2));
                    } else {
                        line2 = n_lines;
                        show = Some((if line1 == 0 { 1 } else { line1 }, line2));
                        if line1 == 0 {
                            // [⎕] : display everything.
                            show = Some((0, line2));
                        }
                    }
                    state.cur_line = line2 + 1;
                    check_line(state, n_lines)?;
                    state.replace = false;
                }
                if !seen {
                    return Err(bad_cmd());
                }
            }
        }
        if lex.tok != Tok::RightBracket {
            return Err(bad_cmd());
        }
        lex.next_tok(&mut it.ws)?;
        text_start = lex.tok_base;
    }

    // Scan the remainder: a del closes the definition; nothing may
    // follow it.
    let mut finished = false;
    while lex.tok != Tok::End {
        if finished {
            return Err(bad_cmd());
        }
        if lex.tok == Tok::Del {
            it.ws.set_u8(lex.tok_base, 0);
            finished = true;
        }
        lex.next_tok(&mut it.ws)?;
    }

    if let Some((from, to)) = show {
        print_fun(it, ebuf, from.max(1), to, from == 0);
    }

    let text = read_line_text(&it.ws, text_start);
    let text = text.trim_end();
    if !text.is_empty() {
        insert_line(&mut it.ws, ebuf, state.cur_line, text, state.replace)?;
        state.replace = false;
        state.cur_line += 1;
    }

    Ok(finished)
}

/// Compile the scratch buffer and install the function in the workspace.
pub fn compile_and_save(it: &mut Interpreter, ebuf: Offset) -> Result<()> {
    let fun = FunObj::read(&it.ws, ebuf);
    let src_base = ebuf + fun.o_source;
    let mut lex = Lexer::new(
        src_base,
        fun.total - fun.o_source,
        fun.n_lines,
        Some(FunObj::names_off(ebuf)),
    );
    lex.init(fun.src_size)?;
    compile_fun(&mut it.ws, &mut lex, ebuf)?;
    let block = save_fun(&mut it.ws, &lex, ebuf)?;

    if it.dbg_flags & DBG_DUMP_FUNCTION != 0 {
        let mut text = String::new();
        dump_fun(&it.ws, block, &mut text);
        it.print(&text);
    }
    Ok(())
}

/// Consume a function definition while sourcing a file: the header line
/// has been seen; body lines follow until a line starting with `∇`.
pub fn load_fun(
    it: &mut Interpreter,
    lex: &mut Lexer,
    header: &str,
    next_line: &mut dyn FnMut() -> Option<String>,
) -> Result<()> {
    let header_text = header.trim_start_matches('∇').trim();
    let (segments, mut closed) = split_del_line(&format!("∇{header_text}"));
    let head = segments[0].trim_start_matches('∇').trim().to_string();
    let ebuf = new_fun(it, lex, &format!("∇{head}"))?;
    for body in &segments[1..] {
        append_line(&mut it.ws, ebuf, body)?;
    }

    while !closed {
        let Some(line) = next_line() else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('∇') {
            closed = true;
            break;
        }
        append_line(&mut it.ws, ebuf, trimmed)?;
    }

    let fun = FunObj::read(&it.ws, ebuf);
    if fun.n_lines > 0 {
        compile_and_save(it, ebuf)?;
    }
    Ok(())
}
