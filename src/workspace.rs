//! The workspace: one contiguous arena holding all interpreter state.
//!
//! Every cross-reference inside the arena is a byte offset from its base,
//! so the whole workspace can be written to disk and reloaded at a
//! different address without relocation. Layout, low to high:
//!
//! ```text
//! [ header | name table | heap ↑   ↓ operand stack |
//!   descriptor pool ↑   ↓ temp-array stack | REPL/compile buffer ]
//! ```
//!
//! The heap grows upward and the operand stack downward inside one region;
//! their collision is heap-full / stack-overflow. The descriptor pool and
//! the temp-array stack oppose each other the same way. The REPL buffer
//! sits inside the workspace because compiled literals and bytecode are
//! addressed through workspace offsets.

pub mod desc;
pub mod heap;
pub mod names;

use crate::error::{EvalErrorKind, Result};

pub use desc::{DataType, Desc};

/// Runtime offsets are `usize`; arena fields store them as `u32`.
pub type Offset = usize;

pub const MAX_RANK: usize = 14;
pub const DESC_SIZE: usize = 64;
pub const NUM_SIZE: usize = 8;
pub const CHAR_SIZE: usize = 4;
pub const STRING_MAX: usize = 255;
pub const NAME_MAX: usize = 64;
pub const LINE_MAX: usize = 255;
pub const REPL_BUF_SIZE: usize = 1024;
pub const EDIT_BUF_SIZE: usize = 2048;
pub const HASH_SIZE: usize = 32;
pub const WSID_SIZE: usize = 32;
pub const HEAP_MIN_BLOCK: usize = 128;
pub const MAX_INDEX: usize = i32::MAX as usize;
pub const DEF_WS_KB: usize = 1024;
pub const MAX_WS_KB: usize = 2 * 1024 * 1024;
pub const MIN_WS_KB: usize = 64;

/// `"APL "` little-endian.
pub const WS_MAGIC: u32 = u32::from_le_bytes(*b"APL ");
pub const WS_VERSION: [u8; 3] = [0, 5, 0];

// Header field offsets.
const H_MAGIC: usize = 0;
const H_VERSION: usize = 4; // 3 bytes
const H_ORIGIN: usize = 7;
const H_PREC: usize = 8;
const H_HDRSZ: usize = 12;
const H_NAMSZ: usize = 16;
const H_HEPOPRSZ: usize = 20;
const H_GBLARRSZ: usize = 24;
const H_WKSSZ: usize = 28;
const H_NAM_TOP: usize = 32;
const H_HEP_TOP: usize = 36;
const H_FREE_HEAD: usize = 40;
const H_OPR_TOP: usize = 44;
const H_GBL_TOP: usize = 48;
const H_ARR_TOP: usize = 52;
const H_DESC_FREE: usize = 56;
const H_WSID: usize = 60;
const H_HASHTAB: usize = H_WSID + WSID_SIZE; // 92
pub const HDR_SIZE: usize = align8(H_HASHTAB + HASH_SIZE * 4); // 224

pub const fn align8(v: usize) -> usize {
    (v + 7) & !7
}

pub const fn align4(v: usize) -> usize {
    (v + 3) & !3
}

pub const fn align_down(v: usize, size: usize) -> usize {
    v & !(size - 1)
}

pub struct Workspace {
    mem: Vec<u8>,
}

impl Workspace {
    /// Allocate and initialize a fresh workspace of `total_kb` KiB.
    pub fn new(total_kb: usize) -> Result<Workspace> {
        if !(MIN_WS_KB..=MAX_WS_KB).contains(&total_kb) {
            return Err(crate::error::AplError::fatal(format!(
                "workspace size must be between {MIN_WS_KB} and {MAX_WS_KB} KiB"
            )));
        }
        let total = total_kb * 1024;
        let mut ws = Workspace {
            mem: vec![0u8; total],
        };
        ws.format(total);
        Ok(ws)
    }

    /// Reconstruct a workspace from raw image bytes. `bytes` holds the
    /// arena up to the descriptor-pool top; the remainder is zeroed.
    pub(crate) fn from_image_bytes(bytes: Vec<u8>, total: usize) -> Workspace {
        let mut mem = bytes;
        mem.resize(total, 0);
        let mut ws = Workspace { mem };
        // Transient stacks are always empty in a saved image.
        ws.opr_reset();
        ws.temp_reset();
        ws
    }

    /// Write a pristine header and region bookkeeping. Loses all contents.
    fn format(&mut self, total: usize) {
        self.mem.fill(0);
        let total_kb = total / 1024;
        let namsz = if total_kb <= 64 {
            2 * 1024
        } else if total_kb <= 1024 {
            8 * 1024
        } else {
            16 * 1024
        };
        let rest = total - HDR_SIZE - namsz - REPL_BUF_SIZE;
        let hepoprsz = align8(rest / 3);
        let gblarrsz = rest - hepoprsz;

        self.set_u32(H_MAGIC, WS_MAGIC);
        self.mem[H_VERSION..H_VERSION + 3].copy_from_slice(&WS_VERSION);
        self.set_u32(H_HDRSZ, HDR_SIZE as u32);
        self.set_u32(H_NAMSZ, namsz as u32);
        self.set_u32(H_HEPOPRSZ, hepoprsz as u32);
        self.set_u32(H_GBLARRSZ, gblarrsz as u32);
        self.set_u32(H_WKSSZ, total as u32);

        self.set_origin(1);
        self.set_print_prec(10);
        self.set_wsid("CLEAR-WS");

        self.set_off(H_NAM_TOP, self.nam_base());
        self.set_off(H_HEP_TOP, self.hep_base());
        self.set_off(H_FREE_HEAD, 0);
        self.set_off(H_OPR_TOP, self.opr_base());
        self.set_off(H_GBL_TOP, self.gbl_base());
        self.set_off(H_ARR_TOP, self.arr_base());
        self.set_off(H_DESC_FREE, 0);
    }

    /// Reinitialize, optionally carrying the user settings over.
    pub fn clear(&mut self, preserve_settings: bool) {
        let origin = self.origin();
        let prec = self.print_prec();
        let wsid = self.wsid();
        let total = self.mem.len();
        self.format(total);
        if preserve_settings {
            self.set_origin(origin);
            self.set_print_prec(prec);
            self.set_wsid(&wsid);
        }
    }

    // --- primitive field access -----------------------------------------

    pub fn u8_at(&self, off: Offset) -> u8 {
        self.mem[off]
    }

    pub fn set_u8(&mut self, off: Offset, v: u8) {
        self.mem[off] = v;
    }

    pub fn u16_at(&self, off: Offset) -> u16 {
        u16::from_le_bytes(self.mem[off..off + 2].try_into().unwrap())
    }

    pub fn set_u16(&mut self, off: Offset, v: u16) {
        self.mem[off..off + 2].copy_from_slice(&v.to_le_bytes());
    }

    pub fn u32_at(&self, off: Offset) -> u32 {
        u32::from_le_bytes(self.mem[off..off + 4].try_into().unwrap())
    }

    pub fn set_u32(&mut self, off: Offset, v: u32) {
        self.mem[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn f64_at(&self, off: Offset) -> f64 {
        f64::from_le_bytes(self.mem[off..off + 8].try_into().unwrap())
    }

    pub fn set_f64(&mut self, off: Offset, v: f64) {
        self.mem[off..off + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn off_at(&self, field: usize) -> Offset {
        self.u32_at(field) as Offset
    }

    fn set_off(&mut self, field: usize, v: Offset) {
        self.set_u32(field, v as u32);
    }

    pub fn bytes(&self, off: Offset, len: usize) -> &[u8] {
        &self.mem[off..off + len]
    }

    pub fn bytes_mut(&mut self, off: Offset, len: usize) -> &mut [u8] {
        &mut self.mem[off..off + len]
    }

    pub fn copy_within(&mut self, src: Offset, dst: Offset, len: usize) {
        self.mem.copy_within(src..src + len, dst);
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.mem[..self.gbl_top()]
    }

    // --- header fields --------------------------------------------------

    pub fn magic(&self) -> u32 {
        self.u32_at(H_MAGIC)
    }

    pub fn version(&self) -> [u8; 3] {
        self.mem[H_VERSION..H_VERSION + 3].try_into().unwrap()
    }

    pub fn origin(&self) -> usize {
        self.mem[H_ORIGIN] as usize
    }

    pub fn set_origin(&mut self, origin: usize) {
        self.mem[H_ORIGIN] = origin as u8;
    }

    pub fn print_prec(&self) -> usize {
        self.u32_at(H_PREC) as usize
    }

    pub fn set_print_prec(&mut self, prec: usize) {
        self.set_u32(H_PREC, prec as u32);
    }

    pub fn wsid(&self) -> String {
        let raw = &self.mem[H_WSID..H_WSID + WSID_SIZE];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(WSID_SIZE);
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    pub fn set_wsid(&mut self, id: &str) {
        let bytes = id.as_bytes();
        let n = bytes.len().min(WSID_SIZE - 1);
        self.mem[H_WSID..H_WSID + WSID_SIZE].fill(0);
        self.mem[H_WSID..H_WSID + n].copy_from_slice(&bytes[..n]);
    }

    pub(crate) fn hash_bucket(&self, bucket: usize) -> Offset {
        self.off_at(H_HASHTAB + bucket * 4)
    }

    pub(crate) fn set_hash_bucket(&mut self, bucket: usize, off: Offset) {
        self.set_off(H_HASHTAB + bucket * 4, off);
    }

    // --- region geometry ------------------------------------------------

    pub fn total_size(&self) -> usize {
        self.u32_at(H_WKSSZ) as usize
    }

    pub fn nam_size(&self) -> usize {
        self.u32_at(H_NAMSZ) as usize
    }

    pub fn hepopr_size(&self) -> usize {
        self.u32_at(H_HEPOPRSZ) as usize
    }

    pub fn gblarr_size(&self) -> usize {
        self.u32_at(H_GBLARRSZ) as usize
    }

    pub fn nam_base(&self) -> Offset {
        HDR_SIZE
    }

    pub fn hep_base(&self) -> Offset {
        self.nam_base() + self.nam_size()
    }

    /// Base (empty top) of the operand stack; also the descriptor-pool base.
    pub fn opr_base(&self) -> Offset {
        self.hep_base() + self.hepopr_size()
    }

    pub fn gbl_base(&self) -> Offset {
        self.opr_base()
    }

    /// Base (empty top) of the temp-array stack; also the REPL buffer base.
    pub fn arr_base(&self) -> Offset {
        self.gbl_base() + self.gblarr_size()
    }

    pub fn buf_base(&self) -> Offset {
        self.arr_base()
    }

    pub fn nam_top(&self) -> Offset {
        self.off_at(H_NAM_TOP)
    }

    pub(crate) fn set_nam_top(&mut self, off: Offset) {
        self.set_off(H_NAM_TOP, off);
    }

    pub fn hep_top(&self) -> Offset {
        self.off_at(H_HEP_TOP)
    }

    pub(crate) fn set_hep_top(&mut self, off: Offset) {
        self.set_off(H_HEP_TOP, off);
    }

    pub(crate) fn free_head(&self) -> Offset {
        self.off_at(H_FREE_HEAD)
    }

    pub(crate) fn set_free_head(&mut self, off: Offset) {
        self.set_off(H_FREE_HEAD, off);
    }

    pub fn opr_top(&self) -> Offset {
        self.off_at(H_OPR_TOP)
    }

    fn set_opr_top(&mut self, off: Offset) {
        self.set_off(H_OPR_TOP, off);
    }

    pub fn gbl_top(&self) -> Offset {
        self.off_at(H_GBL_TOP)
    }

    pub(crate) fn set_gbl_top(&mut self, off: Offset) {
        self.set_off(H_GBL_TOP, off);
    }

    pub fn arr_top(&self) -> Offset {
        self.off_at(H_ARR_TOP)
    }

    fn set_arr_top(&mut self, off: Offset) {
        self.set_off(H_ARR_TOP, off);
    }

    pub(crate) fn desc_free_head(&self) -> Offset {
        self.off_at(H_DESC_FREE)
    }

    pub(crate) fn set_desc_free_head(&mut self, off: Offset) {
        self.set_off(H_DESC_FREE, off);
    }

    // --- operand stack --------------------------------------------------

    /// Truncate both evaluation stacks to their bases.
    pub fn reset_stacks(&mut self) {
        self.opr_reset();
        self.temp_reset();
    }

    pub fn opr_reset(&mut self) {
        let base = self.opr_base();
        self.set_opr_top(base);
    }

    pub fn opr_depth(&self) -> usize {
        (self.opr_base() - self.opr_top()) / DESC_SIZE
    }

    /// Push pre-decrements; overflow is checked against the heap top.
    pub fn opr_push(&mut self, d: &Desc) -> Result<()> {
        let new_top = self
            .opr_top()
            .checked_sub(DESC_SIZE)
            .ok_or(EvalErrorKind::StackOverflow)?;
        if new_top <= self.hep_top() {
            return Err(EvalErrorKind::StackOverflow.into());
        }
        self.set_opr_top(new_top);
        self.set_desc_at(new_top, d);
        Ok(())
    }

    /// Pop post-increments. The evaluator validates depth before popping.
    pub fn opr_pop(&mut self) -> Desc {
        let top = self.opr_top();
        debug_assert!(top < self.opr_base(), "operand stack underflow");
        let d = self.desc_at(top);
        self.set_opr_top(top + DESC_SIZE);
        d
    }

    pub fn opr_drop(&mut self, n: usize) {
        let top = self.opr_top();
        self.set_opr_top(top + n * DESC_SIZE);
    }

    /// Truncate the stack so that `off` becomes the new top.
    pub fn opr_truncate(&mut self, off: Offset) {
        self.set_opr_top(off);
    }

    pub fn opr_top_desc(&self) -> Desc {
        self.desc_at(self.opr_top())
    }

    pub fn opr_set_top(&mut self, d: &Desc) {
        let top = self.opr_top();
        self.set_desc_at(top, d);
    }

    /// Descriptor `i` slots above the top (0 = top of stack).
    pub fn opr_desc(&self, i: usize) -> Desc {
        self.desc_at(self.opr_top() + i * DESC_SIZE)
    }

    pub fn opr_set_desc(&mut self, i: usize, d: &Desc) {
        let off = self.opr_top() + i * DESC_SIZE;
        self.set_desc_at(off, d);
    }

    pub fn opr_swap(&mut self) {
        let a = self.opr_desc(0);
        let b = self.opr_desc(1);
        self.opr_set_desc(0, &b);
        self.opr_set_desc(1, &a);
    }

    // --- temp-array stack -----------------------------------------------

    pub fn temp_reset(&mut self) {
        let base = self.arr_base();
        self.set_arr_top(base);
    }

    pub fn temp_top(&self) -> Offset {
        self.arr_top()
    }

    /// Downward bump allocation, aligned to the element size.
    pub fn temp_alloc(&mut self, elem_size: usize, n: usize) -> Result<Offset> {
        let aligned = align_down(self.arr_top(), elem_size.max(1));
        let size = elem_size * n;
        let new_top = aligned
            .checked_sub(size)
            .ok_or(EvalErrorKind::ArrayOverflow)?;
        if new_top <= self.gbl_top() {
            return Err(EvalErrorKind::ArrayOverflow.into());
        }
        self.set_arr_top(new_top);
        Ok(new_top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_accounts_for_every_byte() {
        let ws = Workspace::new(DEF_WS_KB).unwrap();
        assert_eq!(ws.magic(), WS_MAGIC);
        assert_eq!(ws.nam_base(), HDR_SIZE);
        assert_eq!(
            ws.total_size(),
            HDR_SIZE + ws.nam_size() + ws.hepopr_size() + ws.gblarr_size() + REPL_BUF_SIZE
        );
        assert_eq!(ws.buf_base() + REPL_BUF_SIZE, ws.total_size());
        assert_eq!(ws.hep_base() % 8, 0);
        assert_eq!(ws.gbl_base() % 8, 0);
        assert_eq!(ws.arr_base() % 8, 0);
    }

    #[test]
    fn rejects_out_of_range_sizes() {
        assert!(Workspace::new(0).is_err());
        assert!(Workspace::new(MAX_WS_KB + 1).is_err());
        assert!(Workspace::new(MIN_WS_KB).is_ok());
    }

    #[test]
    fn operand_stack_push_pop() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        assert_eq!(ws.opr_depth(), 0);
        ws.opr_push(&Desc::scalar_num(4.25)).unwrap();
        ws.opr_push(&Desc::scalar_num(-1.0)).unwrap();
        assert_eq!(ws.opr_depth(), 2);
        assert_eq!(ws.opr_pop().num, -1.0);
        assert_eq!(ws.opr_pop().num, 4.25);
        assert_eq!(ws.opr_depth(), 0);
    }

    #[test]
    fn temp_stack_is_aligned_and_resets() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        let a = ws.temp_alloc(1, 3).unwrap();
        let b = ws.temp_alloc(8, 2).unwrap();
        assert_eq!(b % 8, 0);
        assert!(b < a);
        ws.temp_reset();
        assert_eq!(ws.temp_top(), ws.arr_base());
    }

    #[test]
    fn clear_preserves_settings() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        ws.set_origin(0);
        ws.set_print_prec(5);
        ws.set_wsid("MYWS");
        ws.clear(true);
        assert_eq!(ws.origin(), 0);
        assert_eq!(ws.print_prec(), 5);
        assert_eq!(ws.wsid(), "MYWS");
        ws.clear(false);
        assert_eq!(ws.origin(), 1);
        assert_eq!(ws.print_prec(), 10);
        assert_eq!(ws.wsid(), "CLEAR-WS");
    }
}
