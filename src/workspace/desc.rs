//! Value descriptors and the fixed-size descriptor pool.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{EvalErrorKind, Result};

use super::{Offset, Workspace, DESC_SIZE, MAX_RANK};

/// APL data types. `Int` is internal (single-index marker); the function
/// variants encode arity in the low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum DataType {
    Und = 0,
    Int = 1,
    Num = 2,
    Chr = 4,
    Fun = 16,
    Fun1 = 17,
    Fun2 = 18,
}

impl DataType {
    pub fn is_number(self) -> bool {
        matches!(self, DataType::Int | DataType::Num)
    }

    pub fn is_char(self) -> bool {
        self == DataType::Chr
    }

    pub fn is_function(self) -> bool {
        u16::from(self) >= 16
    }

    pub fn fun_of_arity(args: u8) -> DataType {
        match args {
            0 => DataType::Fun,
            1 => DataType::Fun1,
            _ => DataType::Fun2,
        }
    }

    /// Number of arguments a function type takes.
    pub fn arity(self) -> usize {
        (u16::from(self) - 16) as usize
    }
}

/// The universal value carrier, serialized to 64 bytes in the arena:
/// payload offset, type, rank, then either the shape (arrays) or the
/// inline scalar (rank 0).
///
/// A scalar owns no storage; an array's `doff` addresses heap storage for
/// globals or temp-array storage for intermediates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Desc {
    pub doff: Offset,
    pub dtype: DataType,
    pub rank: u16,
    pub shape: [u32; MAX_RANK],
    /// Inline scalar number (rank 0, numeric).
    pub num: f64,
    /// Inline scalar character code point (rank 0, character).
    pub chr: u32,
}

impl Desc {
    pub fn undef() -> Desc {
        Desc {
            doff: 0,
            dtype: DataType::Und,
            rank: 0,
            shape: [0; MAX_RANK],
            num: 0.0,
            chr: 0,
        }
    }

    pub fn scalar_num(v: f64) -> Desc {
        Desc {
            dtype: DataType::Num,
            num: v,
            ..Desc::undef()
        }
    }

    pub fn scalar_chr(code: u32) -> Desc {
        Desc {
            dtype: DataType::Chr,
            chr: code,
            ..Desc::undef()
        }
    }

    pub fn is_array(&self) -> bool {
        self.rank > 0
    }

    pub fn is_scalar(&self) -> bool {
        self.rank == 0
    }

    pub fn is_number(&self) -> bool {
        self.dtype.is_number()
    }

    pub fn is_char(&self) -> bool {
        self.dtype.is_char()
    }

    pub fn is_function(&self) -> bool {
        self.dtype.is_function()
    }

    /// Element count: the product of the shape. An axis of length 0 is
    /// legal and makes the array empty.
    pub fn nelem(&self) -> usize {
        self.shape[..self.rank as usize]
            .iter()
            .fold(1usize, |acc, &n| acc * n as usize)
    }

    pub fn set_shape(&mut self, shape: &[usize]) {
        self.rank = shape.len() as u16;
        for (dst, &src) in self.shape.iter_mut().zip(shape) {
            *dst = src as u32;
        }
    }

    pub fn decode(buf: &[u8]) -> Desc {
        let mut d = Desc::undef();
        d.doff = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as Offset;
        let raw_type = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        d.dtype = DataType::try_from(raw_type).unwrap_or(DataType::Und);
        d.rank = u16::from_le_bytes(buf[6..8].try_into().unwrap());
        if d.rank == 0 {
            d.num = f64::from_le_bytes(buf[8..16].try_into().unwrap());
            d.chr = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        } else {
            for (i, slot) in d.shape.iter_mut().enumerate() {
                let at = 8 + i * 4;
                *slot = u32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
            }
        }
        d
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..DESC_SIZE].fill(0);
        buf[0..4].copy_from_slice(&(self.doff as u32).to_le_bytes());
        buf[4..6].copy_from_slice(&u16::from(self.dtype).to_le_bytes());
        buf[6..8].copy_from_slice(&self.rank.to_le_bytes());
        if self.rank == 0 {
            if self.dtype == DataType::Chr {
                buf[8..12].copy_from_slice(&self.chr.to_le_bytes());
            } else {
                buf[8..16].copy_from_slice(&self.num.to_le_bytes());
            }
        } else {
            for (i, &n) in self.shape.iter().enumerate() {
                let at = 8 + i * 4;
                buf[at..at + 4].copy_from_slice(&n.to_le_bytes());
            }
        }
    }
}

impl Workspace {
    pub fn desc_at(&self, off: Offset) -> Desc {
        Desc::decode(self.bytes(off, DESC_SIZE))
    }

    pub fn set_desc_at(&mut self, off: Offset, d: &Desc) {
        d.encode(self.bytes_mut(off, DESC_SIZE));
    }

    /// Allocate a descriptor slot: free list first, then bump. The payload
    /// offset field of a freed slot threads the free list.
    pub fn desc_alloc(&mut self) -> Result<Offset> {
        let head = self.desc_free_head();
        if head != 0 {
            let next = self.u32_at(head) as Offset;
            self.set_desc_free_head(next);
            self.set_desc_at(head, &Desc::undef());
            return Ok(head);
        }
        let top = self.gbl_top();
        if top + DESC_SIZE > self.arr_top() {
            return Err(EvalErrorKind::DescPoolFull.into());
        }
        self.set_gbl_top(top + DESC_SIZE);
        self.set_desc_at(top, &Desc::undef());
        Ok(top)
    }

    pub fn desc_release(&mut self, off: Offset) {
        let head = self.desc_free_head();
        let mut d = Desc::undef();
        d.doff = head;
        self.set_desc_at(off, &d);
        self.set_desc_free_head(off);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MIN_WS_KB;

    #[test]
    fn descriptor_round_trips_through_bytes() {
        let mut buf = [0u8; DESC_SIZE];
        let mut d = Desc::undef();
        d.dtype = DataType::Num;
        d.set_shape(&[3, 4, 5]);
        d.doff = 0x1234;
        d.encode(&mut buf);
        let back = Desc::decode(&buf);
        assert_eq!(back.dtype, DataType::Num);
        assert_eq!(back.rank, 3);
        assert_eq!(&back.shape[..3], &[3, 4, 5]);
        assert_eq!(back.doff, 0x1234);
        assert_eq!(back.nelem(), 60);

        let d = Desc::scalar_num(2.5);
        d.encode(&mut buf);
        assert_eq!(Desc::decode(&buf).num, 2.5);

        let d = Desc::scalar_chr('⍴' as u32);
        d.encode(&mut buf);
        assert_eq!(Desc::decode(&buf).chr, '⍴' as u32);
    }

    #[test]
    fn zero_length_axis_is_empty() {
        let mut d = Desc::undef();
        d.dtype = DataType::Num;
        d.set_shape(&[2, 0, 3]);
        assert_eq!(d.nelem(), 0);
    }

    #[test]
    fn pool_reuses_freed_slots() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        let a = ws.desc_alloc().unwrap();
        let b = ws.desc_alloc().unwrap();
        assert_eq!(b, a + DESC_SIZE);
        ws.desc_release(a);
        assert_eq!(ws.desc_alloc().unwrap(), a);
        ws.desc_release(b);
        ws.desc_release(a);
        assert_eq!(ws.desc_alloc().unwrap(), a);
        assert_eq!(ws.desc_alloc().unwrap(), b);
    }
}
