//! The tokenizer and expression compiler.
//!
//! A lexer works over a scratch region inside the workspace:
//!
//! ```text
//! [ source |0| align | line-offset table | literals →     ← bytecode ]
//! ```
//!
//! Bytecode fills the region from high to low while literals (packed
//! doubles) fill from low to high; their collision is code-full. Because
//! an APL expression evaluates right to left, emitting tokens in source
//! order at descending addresses leaves a stream the evaluator can walk
//! forward. Diamond-separated statements are re-reversed at the end so
//! they still run left to right.

use crate::error::{AplError, LexErrorKind, Result};
use crate::token::{lookup_sys_name, Tok, CHAR_DELTA, CHAR_HIGH_MINUS};
use crate::utf8;
use crate::workspace::{align8, Offset, Workspace, NAME_MAX, NUM_SIZE, STRING_MAX};

/// Roles in a function's local-names table.
pub const ROLE_FUN: u8 = 0;
pub const ROLE_RET: u8 = 1;
pub const ROLE_ARG: u8 = 2;
pub const ROLE_LOC: u8 = 3;
pub const ROLE_LAB: u8 = 4;

pub struct Lexer {
    // Buffer geometry.
    pub src_base: Offset,
    pub buf_len: usize,
    pub nlines: usize,
    /// Function local-names table, when compiling a function body.
    pub names: Option<Offset>,
    /// Last byte of the buffer; bytecode grows down from here.
    pub obj_base: Offset,

    // Cursors.
    pub src_end: Offset,
    pos: Offset,
    pub chr_base: Offset,
    pub expr_base: Offset,
    pub tok_base: Offset,
    pub lin_base: Offset,
    pub lit_base: Offset,
    pub lit_count: usize,
    pub code: Offset,

    // Current character and token.
    chr: u32,
    pub tok: Tok,
    pub tok_len: usize,
    pub tok_aux: u8,
    pub tok_num: f64,
    pub tok_str: Vec<u32>,
}

fn is_digit(c: u32) -> bool {
    (c as u8 as char).is_ascii_digit() && c < 128
}

fn is_number_start(c: u32) -> bool {
    is_digit(c) || c == CHAR_HIGH_MINUS || c == '.' as u32
}

fn is_name_start(c: u32) -> bool {
    (c < 128 && (c as u8 as char).is_ascii_alphabetic()) || c == CHAR_DELTA || c == '_' as u32
}

fn is_name_char(c: u32) -> bool {
    (c < 128 && (c as u8 as char).is_ascii_alphanumeric()) || c == CHAR_DELTA || c == '_' as u32
}

impl Lexer {
    /// Attach a lexer to `buf_len` bytes of workspace at `src_base`.
    pub fn new(src_base: Offset, buf_len: usize, nlines: usize, names: Option<Offset>) -> Lexer {
        Lexer {
            src_base,
            buf_len,
            nlines,
            names,
            obj_base: src_base + buf_len - 1,
            src_end: src_base,
            pos: src_base,
            chr_base: src_base,
            expr_base: src_base,
            tok_base: src_base,
            lin_base: 0,
            lit_base: 0,
            lit_count: 0,
            code: 0,
            chr: 0,
            tok: Tok::End,
            tok_len: 0,
            tok_aux: 0,
            tok_num: 0.0,
            tok_str: Vec::new(),
        }
    }

    /// Prepare for a new source of `src_len` bytes (terminator included)
    /// already copied to the start of the buffer.
    pub fn init(&mut self, src_len: usize) -> Result<()> {
        self.src_end = self.src_base + src_len;
        self.pos = self.src_base;
        self.expr_base = self.src_base;
        self.lin_base = align8(self.src_end);
        self.init_aux()
    }

    fn init_aux(&mut self) -> Result<()> {
        self.lit_base = self.lin_base + (self.nlines + 1) * 2 * 4;
        if self.lit_base > self.obj_base {
            return Err(crate::error::EditErrorKind::FunctionTooBig.into());
        }
        self.lit_count = 0;
        self.code = self.obj_base;
        Ok(())
    }

    /// Finish initialization for single-line input (the REPL, `⍎`): write
    /// the END marker and read the first token. Function compilation
    /// primes per line instead because line bytes begin with a length.
    pub fn start_line(&mut self, ws: &mut Workspace) -> Result<()> {
        ws.set_u8(self.code, Tok::End.into());
        self.code -= 1;
        self.next_chr(ws)?;
        self.next_tok(ws)
    }

    /// Write the END marker without priming (function compilation).
    pub fn start_object(&mut self, ws: &mut Workspace) {
        ws.set_u8(self.code, Tok::End.into());
        self.code -= 1;
    }

    /// Reposition at `pos` and read the first token from there.
    pub fn seek(&mut self, ws: &mut Workspace, pos: Offset) -> Result<()> {
        self.pos = pos;
        self.expr_base = pos;
        self.next_chr(ws)?;
        self.next_tok(ws)
    }

    pub fn current_char(&self) -> u32 {
        self.chr
    }

    fn lit_top(&self) -> Offset {
        self.lit_base + self.lit_count * NUM_SIZE
    }

    /// The offending source line plus caret position for error reports.
    pub fn err(&self, ws: &Workspace, kind: LexErrorKind) -> AplError {
        let mut end = self.expr_base;
        while end < self.src_end && ws.u8_at(end) != 0 {
            end += 1;
        }
        let line = String::from_utf8_lossy(ws.bytes(self.expr_base, end - self.expr_base))
            .into_owned();
        let column = self.chr_base.saturating_sub(self.expr_base);
        AplError::lex(kind).with_context(&line, column)
    }

    pub fn next_chr(&mut self, ws: &Workspace) -> Result<()> {
        if self.pos >= self.src_end {
            self.chr = 0;
            return Ok(());
        }
        self.chr_base = self.pos;
        let byte = ws.u8_at(self.pos);
        if byte < 128 {
            self.chr = byte as u32;
            self.pos += 1;
        } else {
            let avail = (self.src_end - self.pos).min(4);
            match utf8::decode(ws.bytes(self.pos, avail)) {
                Some((code, len)) => {
                    self.chr = code;
                    self.pos += len;
                }
                None => return Err(self.err(ws, LexErrorKind::BadToken)),
            }
        }
        Ok(())
    }

    pub fn next_tok(&mut self, ws: &mut Workspace) -> Result<()> {
        while self.chr == ' ' as u32 || self.chr == '\t' as u32 || self.chr == '\n' as u32 {
            self.next_chr(ws)?;
        }
        self.tok_base = self.chr_base;

        let chr = self.chr;
        if chr == 0 {
            self.tok = Tok::End;
            return Ok(());
        }

        if is_number_start(chr) {
            self.tok_number(ws)
        } else if chr == '\'' as u32 {
            self.tok_string(ws)
        } else if is_name_start(chr) {
            self.tok_name(ws)
        } else {
            self.tok = match Tok::from_char(chr) {
                Some(tok) => tok,
                None => return Err(self.err(ws, LexErrorKind::BadToken)),
            };
            self.next_chr(ws)?;
            if self.tok == Tok::Quad && self.chr < 128 && (self.chr as u8).is_ascii_alphabetic() {
                self.tok_sys_name(ws)?;
            }
            Ok(())
        }
    }

    fn tok_number(&mut self, ws: &mut Workspace) -> Result<()> {
        // A dot not followed by a digit is the product operator.
        let next_byte = if self.pos < self.src_end {
            ws.u8_at(self.pos)
        } else {
            0
        };
        if self.chr == '.' as u32 && !next_byte.is_ascii_digit() {
            self.tok = Tok::Dot;
            return self.next_chr(ws);
        }

        if self.lit_top() + NUM_SIZE >= self.code {
            return Err(self.err(ws, LexErrorKind::TooManyLiterals));
        }

        let mut sign = false;
        if self.chr == CHAR_HIGH_MINUS {
            sign = true;
            self.next_chr(ws)?;
            if !is_digit(self.chr) && self.chr != '.' as u32 {
                return Err(self.err(ws, LexErrorKind::BadNumber));
            }
        }

        self.tok = Tok::Num;

        // At least an integer part or a fraction must be present.
        if self.chr == '.' as u32 {
            self.next_chr(ws)?;
            if !is_digit(self.chr) {
                return Err(self.err(ws, LexErrorKind::BadNumber));
            }
            self.tok_num = 0.0;
            self.tok_fraction(ws)?;
        } else {
            self.tok_num = self.tok_integer(ws)?;
            if self.chr == '.' as u32 {
                self.next_chr(ws)?;
                self.tok_fraction(ws)?;
            }
        }

        if self.chr == 'E' as u32 || self.chr == 'e' as u32 {
            self.tok_exponent(ws)?;
        }

        if sign {
            self.tok_num = -self.tok_num;
        }

        ws.set_f64(self.lit_base + self.lit_count * NUM_SIZE, self.tok_num);
        self.lit_count += 1;
        Ok(())
    }

    fn tok_integer(&mut self, ws: &Workspace) -> Result<f64> {
        let mut val = 0.0f64;
        while is_digit(self.chr) {
            val = val * 10.0 + (self.chr - '0' as u32) as f64;
            self.next_chr(ws)?;
        }
        Ok(val)
    }

    fn tok_fraction(&mut self, ws: &Workspace) -> Result<()> {
        let mut pow10 = 0.1f64;
        while is_digit(self.chr) {
            self.tok_num += pow10 * (self.chr - '0' as u32) as f64;
            pow10 /= 10.0;
            self.next_chr(ws)?;
        }
        Ok(())
    }

    fn tok_exponent(&mut self, ws: &Workspace) -> Result<()> {
        let mut sign = false;
        self.next_chr(ws)?;
        if self.chr == CHAR_HIGH_MINUS {
            sign = true;
            self.next_chr(ws)?;
            if !is_digit(self.chr) {
                return Err(self.err(ws, LexErrorKind::BadNumber));
            }
        } else if self.chr == '+' as u32 {
            self.next_chr(ws)?;
        }
        if !is_digit(self.chr) {
            return Err(self.err(ws, LexErrorKind::BadNumber));
        }
        let mut expo = 0i32;
        while is_digit(self.chr) {
            expo = expo * 10 + (self.chr - '0' as u32) as i32;
            self.next_chr(ws)?;
        }
        if sign {
            expo = -expo;
        }
        self.tok_num *= 10f64.powi(expo);
        Ok(())
    }

    fn tok_string(&mut self, ws: &Workspace) -> Result<()> {
        self.tok_str.clear();
        loop {
            self.next_chr(ws)?;
            if self.chr == '\'' as u32 {
                self.next_chr(ws)?;
                if self.chr != '\'' as u32 {
                    break;
                }
                // A doubled quote is an embedded quote.
            }
            if self.chr == 0 {
                return Err(self.err(ws, LexErrorKind::BadString));
            }
            if self.tok_str.len() >= STRING_MAX {
                return Err(self.err(ws, LexErrorKind::StringTooLong));
            }
            self.tok_str.push(self.chr);
        }
        self.tok_len = self.tok_str.len();
        self.tok = Tok::Str;
        Ok(())
    }

    fn tok_name(&mut self, ws: &Workspace) -> Result<()> {
        loop {
            self.next_chr(ws)?;
            if !is_name_char(self.chr) {
                break;
            }
        }
        self.tok = Tok::VarNam;
        self.tok_len = self.chr_base - self.tok_base;
        if self.tok_len > NAME_MAX {
            return Err(self.err(ws, LexErrorKind::BadName));
        }
        Ok(())
    }

    fn tok_sys_name(&mut self, ws: &Workspace) -> Result<()> {
        let mut name = String::new();
        while self.chr < 128 && (self.chr as u8).is_ascii_alphabetic() {
            if name.len() >= NAME_MAX {
                return Err(self.err(ws, LexErrorKind::BadSystemName));
            }
            name.push((self.chr as u8).to_ascii_lowercase() as char);
            self.next_chr(ws)?;
        }
        match lookup_sys_name(&name) {
            Some((tok, idx)) => {
                self.tok = tok;
                self.tok_aux = idx.into();
                Ok(())
            }
            None => Err(self.err(ws, LexErrorKind::BadSystemName)),
        }
    }

    // --- emission --------------------------------------------------------

    pub fn emit_tok(&mut self, ws: &mut Workspace, byte: u8) -> Result<()> {
        if self.code < self.lit_top() {
            return Err(self.err(ws, LexErrorKind::CodeFull));
        }
        ws.set_u8(self.code, byte);
        self.code -= 1;
        Ok(())
    }

    /// Store a literal and emit a scalar reference to it.
    pub fn emit_number(&mut self, ws: &mut Workspace, num: f64) -> Result<()> {
        if self.lit_top() + NUM_SIZE >= self.code {
            return Err(self.err(ws, LexErrorKind::TooManyLiterals));
        }
        ws.set_f64(self.lit_base + self.lit_count * NUM_SIZE, num);
        let index = self.lit_count as u8;
        self.lit_count += 1;
        self.emit_tok(ws, index)?;
        self.emit_tok(ws, Tok::Num.into())
    }

    /// Emit a number or a numeric vector: consecutive numeric tokens
    /// share one literal run.
    fn emit_array(&mut self, ws: &mut Workspace) -> Result<()> {
        let first = self.lit_count - 1;
        while self.tok == Tok::Num {
            self.next_tok(ws)?;
        }
        let n = self.lit_count - first;
        self.emit_tok(ws, first as u8)?;
        if n > 1 {
            self.emit_tok(ws, n as u8)?;
            self.emit_tok(ws, Tok::Arr.into())
        } else {
            self.emit_tok(ws, Tok::Num.into())
        }
    }

    /// Emit a name: frame index for locals/args/return, the label's line
    /// number for labels, the spelled-out name otherwise.
    fn emit_name(&mut self, ws: &mut Workspace) -> Result<()> {
        if let Some(table) = self.names {
            let name: Vec<u8> = ws.bytes(self.tok_base, self.tok_len).to_vec();
            if let Some((role, index)) = find_name(ws, table, &name) {
                if role == ROLE_LAB {
                    return self.emit_number(ws, index as f64);
                }
                if role != ROLE_FUN {
                    self.code = self
                        .code
                        .checked_sub(2)
                        .filter(|&c| c >= self.lit_top())
                        .ok_or_else(|| self.err(ws, LexErrorKind::CodeFull))?;
                    ws.set_u8(self.code + 2, index);
                    ws.set_u8(self.code + 1, Tok::VarInx.into());
                    return Ok(());
                }
                // The function's own name recurses through VarNam.
            }
        }

        let len = self.tok_len;
        self.code = self
            .code
            .checked_sub(len + 2)
            .filter(|&c| c >= self.lit_top())
            .ok_or_else(|| self.err(ws, LexErrorKind::CodeFull))?;
        ws.set_u8(self.code + 1, Tok::VarNam.into());
        ws.set_u8(self.code + 2, len as u8);
        ws.copy_within(self.tok_base, self.code + 3, len);
        Ok(())
    }

    fn emit_sys_name(&mut self, ws: &mut Workspace) -> Result<()> {
        self.code = self
            .code
            .checked_sub(2)
            .filter(|&c| c >= self.lit_top())
            .ok_or_else(|| self.err(ws, LexErrorKind::CodeFull))?;
        ws.set_u8(self.code + 2, self.tok_aux);
        ws.set_u8(self.code + 1, self.tok.into());
        Ok(())
    }

    /// Strings and characters carry 4-byte code points in the stream so
    /// the evaluator can use them as an array payload in place.
    fn emit_string(&mut self, ws: &mut Workspace) -> Result<()> {
        if self.tok_len == 1 {
            self.code = self
                .code
                .checked_sub(5)
                .filter(|&c| c >= self.lit_top())
                .ok_or_else(|| self.err(ws, LexErrorKind::CodeFull))?;
            ws.set_u8(self.code + 1, Tok::Chr.into());
            ws.set_u32(self.code + 2, self.tok_str[0]);
        } else {
            let bytes = 2 + 4 * self.tok_len;
            self.code = self
                .code
                .checked_sub(bytes)
                .filter(|&c| c >= self.lit_top())
                .ok_or_else(|| self.err(ws, LexErrorKind::CodeFull))?;
            ws.set_u8(self.code + 1, Tok::Str.into());
            ws.set_u8(self.code + 2, self.tok_len as u8);
            for (i, &c) in self.tok_str.iter().enumerate() {
                ws.set_u32(self.code + 3 + i * 4, c);
            }
        }
        Ok(())
    }

    /// Compile one expression (or diamond list) to bytecode.
    pub fn tok_expr(&mut self, ws: &mut Workspace) -> Result<()> {
        let mut pdiam = self.obj_base;

        while self.tok != Tok::End {
            match self.tok {
                Tok::Num => self.emit_array(ws)?,
                Tok::Str => {
                    self.emit_string(ws)?;
                    self.next_tok(ws)?;
                }
                Tok::VarNam => {
                    self.emit_name(ws)?;
                    self.next_tok(ws)?;
                }
                Tok::VarSys | Tok::SysFun1 => {
                    self.emit_sys_name(ws)?;
                    self.next_tok(ws)?;
                }
                Tok::Lamp => {
                    // Comment: ignore the rest of the line.
                    self.tok = Tok::End;
                    self.chr = 0;
                }
                Tok::Diamond => {
                    let len = (pdiam - self.code - 1) as u8;
                    self.emit_tok(ws, len)?;
                    pdiam = self.code + 1;
                    self.next_tok(ws)?;
                }
                tok => {
                    if !tok.is_token() {
                        return Err(self.err(ws, LexErrorKind::BadToken));
                    }
                    self.emit_tok(ws, tok.into())?;
                    self.next_tok(ws)?;
                }
            }
        }

        // Sub-expressions run left to right, so a diamond list needs its
        // statement blocks reversed in place.
        if pdiam != self.obj_base {
            let len = (pdiam - self.code - 1) as u8;
            self.emit_tok(ws, len)?;
            self.reverse_subexprs(ws);
        }
        Ok(())
    }

    fn reverse_subexprs(&mut self, ws: &mut Workspace) {
        let len = self.obj_base - self.code;
        let temp = ws.bytes(self.code + 1, len).to_vec();
        let end = len - 1; // exclude END at the top

        let mut src = 0usize;
        let mut dst = self.obj_base;
        while src < end {
            let n = temp[src] as usize;
            src += 1;
            dst -= n;
            ws.bytes_mut(dst, n).copy_from_slice(&temp[src..src + n]);
            src += n;
            dst -= 1;
            ws.set_u8(dst, Tok::Diamond.into());
        }
        // Skip the diamond preceding the first statement.
        self.code += 1;
    }

    // --- line offset table ----------------------------------------------

    pub fn src_lineoff(&self, ws: &Workspace, n: usize) -> usize {
        ws.u32_at(self.lin_base + n * 8) as usize
    }

    pub fn set_src_lineoff(&self, ws: &mut Workspace, n: usize, off: usize) {
        ws.set_u32(self.lin_base + n * 8, off as u32);
    }

    pub fn obj_lineoff(&self, ws: &Workspace, n: usize) -> usize {
        ws.u32_at(self.lin_base + n * 8 + 4) as usize
    }

    pub fn set_obj_lineoff(&self, ws: &mut Workspace, n: usize, off: usize) {
        ws.set_u32(self.lin_base + n * 8 + 4, off as u32);
    }
}

/// Search a function's local-names table (`{len, role, index, bytes}`…,
/// zero-length terminated) for `name`.
pub fn find_name(ws: &Workspace, table: Offset, name: &[u8]) -> Option<(u8, u8)> {
    let mut off = table;
    loop {
        let len = ws.u8_at(off) as usize;
        if len == 0 {
            return None;
        }
        if len == name.len() && ws.bytes(off + 3, len) == name {
            return Some((ws.u8_at(off + 1), ws.u8_at(off + 2)));
        }
        off += len + 3;
    }
}
