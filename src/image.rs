//! Binary workspace images.
//!
//! The image is position-independent: a small serialized prelude followed
//! by the arena's bytes up to the top of the descriptor pool. Loading
//! re-derives every pointer from the offsets stored in the arena header;
//! magic and version fields allow rejection of foreign or stale files.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};

use crate::workspace::{Workspace, HDR_SIZE, MAX_WS_KB, WS_MAGIC, WS_VERSION};

/// `"APLW"` little-endian; leads the image file.
pub const IMAGE_MAGIC: u32 = u32::from_le_bytes(*b"APLW");

#[derive(Debug, Serialize, Deserialize)]
struct ImagePrelude {
    magic: u32,
    version: [u8; 3],
    length: u32,
}

pub fn save_image(ws: &Workspace, path: &Path) -> Result<()> {
    let bytes = ws.image_bytes();
    let prelude = ImagePrelude {
        magic: IMAGE_MAGIC,
        version: WS_VERSION,
        length: bytes.len() as u32,
    };
    let mut out = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut out, &prelude)?;
    out.write_all(bytes)?;
    Ok(())
}

pub fn load_image(path: &Path) -> Result<Workspace> {
    let mut input = BufReader::new(File::open(path)?);
    let prelude: ImagePrelude = bincode::deserialize_from(&mut input)?;
    ensure!(prelude.magic == IMAGE_MAGIC, "not a workspace image");
    ensure!(
        prelude.version == WS_VERSION,
        "workspace image version {:?} does not match {:?}",
        prelude.version,
        WS_VERSION
    );
    ensure!(
        prelude.length as usize >= HDR_SIZE,
        "workspace image is truncated"
    );

    let mut bytes = vec![0u8; prelude.length as usize];
    input.read_exact(&mut bytes)?;

    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    ensure!(magic == WS_MAGIC, "corrupt workspace header");
    let total = u32::from_le_bytes(bytes[28..32].try_into().unwrap()) as usize;
    if total < bytes.len() || total > MAX_WS_KB * 1024 {
        return Err(anyhow!("implausible workspace size {total}"));
    }

    Ok(Workspace::from_image_bytes(bytes, total))
}

/// Cheap sniff used by `)load` to tell an image from a text script.
pub fn is_image_file(path: &Path) -> bool {
    let Ok(mut f) = File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() {
        return false;
    }
    u32::from_le_bytes(magic) == IMAGE_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{DataType, Desc, MIN_WS_KB};

    #[test]
    fn image_round_trips_bindings() {
        let dir = std::env::temp_dir().join(format!("apl-image-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("round.aws");

        let mut ws = Workspace::new(MIN_WS_KB).unwrap();
        ws.set_wsid("IMAGED");
        let desc = ws.desc_alloc().unwrap();
        ws.set_desc_at(desc, &Desc::scalar_num(42.0));
        ws.name_bind(b"X", desc).unwrap();

        save_image(&ws, &path).unwrap();
        assert!(is_image_file(&path));

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.wsid(), "IMAGED");
        assert_eq!(loaded.total_size(), ws.total_size());
        let entry = loaded.name_lookup(b"X").unwrap();
        assert_eq!(entry.dtype, DataType::Num);
        assert_eq!(loaded.desc_at(entry.odesc).num, 42.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn text_files_are_not_images() {
        let dir = std::env::temp_dir().join(format!("apl-noimg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("script.apl");
        std::fs::write(&path, "2+3\n").unwrap();
        assert!(!is_image_file(&path));
        assert!(load_image(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
