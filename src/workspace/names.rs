//! The hashed name table: identifiers → descriptor slots.
//!
//! Entries are allocation-only; `)erase` nulls the descriptor offset but
//! the entry itself stays. Each entry caches the value type so the
//! compiler and REPL can tell variables from functions without
//! dereferencing the descriptor.

use crate::error::{EvalErrorKind, Result};

use super::{align4, DataType, Desc, Offset, Workspace, HASH_SIZE};

// Entry layout: odesc u32, next u32, len u8, type u8, name bytes, NUL.
const N_ODESC: usize = 0;
const N_NEXT: usize = 4;
const N_LEN: usize = 8;
const N_TYPE: usize = 9;
const N_NAME: usize = 10;

fn entry_size(len: usize) -> usize {
    align4(N_NAME + len + 1)
}

fn hash(name: &[u8]) -> usize {
    name.iter().fold(0usize, |acc, &b| acc + b as usize) & (HASH_SIZE - 1)
}

/// A decoded name-table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NameEntry {
    pub offset: Offset,
    pub odesc: Offset,
    pub dtype: DataType,
    pub name: String,
}

impl NameEntry {
    pub fn is_function(&self) -> bool {
        self.dtype.is_function()
    }

    pub fn is_variable(&self) -> bool {
        !self.dtype.is_function()
    }

    pub fn is_defined(&self) -> bool {
        self.odesc != 0 && self.dtype != DataType::Und
    }
}

impl Workspace {
    fn entry_at(&self, off: Offset) -> NameEntry {
        let len = self.u8_at(off + N_LEN) as usize;
        let raw_type = self.u8_at(off + N_TYPE) as u16;
        NameEntry {
            offset: off,
            odesc: self.u32_at(off + N_ODESC) as Offset,
            dtype: DataType::try_from(raw_type).unwrap_or(DataType::Und),
            name: String::from_utf8_lossy(self.bytes(off + N_NAME, len)).into_owned(),
        }
    }

    pub fn name_lookup(&self, name: &[u8]) -> Option<NameEntry> {
        let mut off = self.hash_bucket(hash(name));
        while off != 0 {
            let len = self.u8_at(off + N_LEN) as usize;
            if len == name.len() && self.bytes(off + N_NAME, len) == name {
                return Some(self.entry_at(off));
            }
            off = self.u32_at(off + N_NEXT) as Offset;
        }
        None
    }

    /// Append a new undefined entry; fails when the table would overrun
    /// the heap base.
    pub fn name_add(&mut self, name: &[u8]) -> Result<NameEntry> {
        let size = entry_size(name.len());
        let off = self.nam_top();
        if off + size > self.hep_base() {
            return Err(EvalErrorKind::NameTableFull.into());
        }
        self.set_nam_top(off + size);

        self.set_u32(off + N_ODESC, 0);
        self.set_u8(off + N_LEN, name.len() as u8);
        self.set_u8(off + N_TYPE, u16::from(DataType::Und) as u8);
        self.bytes_mut(off + N_NAME, name.len()).copy_from_slice(name);
        self.set_u8(off + N_NAME + name.len(), 0);

        let bucket = hash(name);
        let head = self.hash_bucket(bucket);
        self.set_u32(off + N_NEXT, head as u32);
        self.set_hash_bucket(bucket, off);

        Ok(self.entry_at(off))
    }

    pub fn name_set_odesc(&mut self, entry_off: Offset, odesc: Offset, dtype: DataType) {
        self.set_u32(entry_off + N_ODESC, odesc as u32);
        self.set_u8(entry_off + N_TYPE, u16::from(dtype) as u8);
    }

    /// Bind `name` to the descriptor at `desc_off`, releasing whatever
    /// storage the name previously owned.
    pub fn name_bind(&mut self, name: &[u8], desc_off: Offset) -> Result<()> {
        let entry = match self.name_lookup(name) {
            Some(e) => e,
            None => self.name_add(name)?,
        };
        if entry.odesc != 0 {
            let old = self.desc_at(entry.odesc);
            if old.is_array() || old.is_function() {
                self.heap_free(old.doff);
            }
            self.desc_release(entry.odesc);
        }
        let dtype = self.desc_at(desc_off).dtype;
        self.name_set_odesc(entry.offset, desc_off, dtype);
        Ok(())
    }

    /// Undefine a name, freeing its storage; the entry is kept. Returns
    /// false when the name was not defined.
    pub fn name_erase(&mut self, name: &[u8]) -> bool {
        match self.name_lookup(name) {
            Some(entry) if entry.odesc != 0 => {
                let d = self.desc_at(entry.odesc);
                if d.is_array() || d.is_function() {
                    self.heap_free(d.doff);
                }
                self.desc_release(entry.odesc);
                self.name_set_odesc(entry.offset, 0, DataType::Und);
                true
            }
            _ => false,
        }
    }

    /// All entries, in insertion order.
    pub fn name_entries(&self) -> Vec<NameEntry> {
        let mut out = Vec::new();
        let mut off = self.nam_base();
        let top = self.nam_top();
        while off < top {
            let entry = self.entry_at(off);
            let size = entry_size(entry.name.len());
            out.push(entry);
            off += size;
        }
        out
    }

    /// Look up a defined function's object offset and its descriptor.
    pub fn function_of(&self, name: &[u8]) -> Option<(Desc, Offset)> {
        let entry = self.name_lookup(name)?;
        if entry.odesc == 0 {
            return None;
        }
        let d = self.desc_at(entry.odesc);
        if d.is_function() {
            Some((d, d.doff))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::MIN_WS_KB;

    #[test]
    fn lookup_follows_collision_chains() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        // "AB" and "BA" share a byte sum, hence a bucket.
        ws.name_add(b"AB").unwrap();
        ws.name_add(b"BA").unwrap();
        assert_eq!(ws.name_lookup(b"AB").unwrap().name, "AB");
        assert_eq!(ws.name_lookup(b"BA").unwrap().name, "BA");
        assert!(ws.name_lookup(b"CC").is_none());
    }

    #[test]
    fn bind_frees_previous_storage() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        let heap_base = ws.hep_top();

        let d1 = ws.desc_alloc().unwrap();
        let payload = ws.heap_alloc(80, d1).unwrap();
        let mut desc = Desc::undef();
        desc.dtype = DataType::Num;
        desc.set_shape(&[10]);
        desc.doff = payload;
        ws.set_desc_at(d1, &desc);
        ws.name_bind(b"X", d1).unwrap();

        let d2 = ws.desc_alloc().unwrap();
        ws.set_desc_at(d2, &Desc::scalar_num(5.0));
        ws.name_bind(b"X", d2).unwrap();

        // The array block was returned to the heap and the old descriptor
        // recycled.
        assert_eq!(ws.hep_top(), heap_base);
        assert_eq!(ws.name_lookup(b"X").unwrap().odesc, d2);
        assert_eq!(ws.desc_alloc().unwrap(), d1);
    }

    #[test]
    fn erase_keeps_the_entry() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        let d = ws.desc_alloc().unwrap();
        ws.set_desc_at(d, &Desc::scalar_num(1.0));
        ws.name_bind(b"GONE", d).unwrap();
        assert!(ws.name_erase(b"GONE"));
        let entry = ws.name_lookup(b"GONE").unwrap();
        assert_eq!(entry.odesc, 0);
        assert_eq!(entry.dtype, DataType::Und);
        assert!(!ws.name_erase(b"GONE"));
    }

    #[test]
    fn entries_iterate_in_insertion_order() {
        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        ws.name_add(b"ONE").unwrap();
        ws.name_add(b"TWO").unwrap();
        ws.name_add(b"THREE").unwrap();
        let names: Vec<_> = ws.name_entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["ONE", "TWO", "THREE"]);
    }
}
