//! ROM and asset loading
//!
//! ROM images are flat byte blobs copied verbatim to a region base. Named
//! assets (palettes and tile sheets) are looked up in an asset directory
//! by name plus a fixed extension.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::memory::{
    Memory, GRAPHICS_ROM, GRAPHICS_ROM_BYTES, INSTRUCTION_ROM, PALETTES, PALETTE_BYTES,
};

/// ROM loading errors
#[derive(Debug, Error)]
pub enum RomError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{size} bytes do not fit in a {capacity}-byte region")]
    TooLarge { size: usize, capacity: usize },
    #[error("region base ${base:04X} is outside memory")]
    RegionOutOfRange { base: u16 },
    #[error("invalid asset name {0:?}")]
    InvalidAssetName(String),
}

/// Destination of a ROM image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomRegion {
    /// Program code at $E000
    Instruction,
    /// Tile bitmaps at $9000
    Graphics,
    /// Palette colors at $8003
    Palette,
    /// Any other base address, up to the end of memory
    At(u16),
}

impl RomRegion {
    pub fn base(self) -> u16 {
        match self {
            RomRegion::Instruction => INSTRUCTION_ROM,
            RomRegion::Graphics => GRAPHICS_ROM,
            RomRegion::Palette => PALETTES,
            RomRegion::At(base) => base,
        }
    }

    /// Fixed region size, if the region has one
    fn limit(self) -> Option<usize> {
        match self {
            RomRegion::Graphics => Some(GRAPHICS_ROM_BYTES),
            RomRegion::Palette => Some(PALETTE_BYTES),
            _ => None,
        }
    }

    /// Bytes available in this region of `memory`
    pub fn capacity(self, memory: &Memory) -> usize {
        let remaining = memory.capacity_from(self.base());
        match self.limit() {
            Some(limit) => remaining.min(limit),
            None => remaining,
        }
    }
}

/// Named asset kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Palette,
    Tiles,
}

impl AssetKind {
    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Palette => "kvmpal",
            AssetKind::Tiles => "kvmpix",
        }
    }

    pub fn region(self) -> RomRegion {
        match self {
            AssetKind::Palette => RomRegion::Palette,
            AssetKind::Tiles => RomRegion::Graphics,
        }
    }
}

/// Copy `bytes` into `region`. Returns the number of bytes written.
pub fn load_into(memory: &mut Memory, bytes: &[u8], region: RomRegion) -> Result<usize, RomError> {
    let base = region.base();
    if base as usize >= memory.size() {
        return Err(RomError::RegionOutOfRange { base });
    }
    let capacity = region.capacity(memory);
    if bytes.len() > capacity {
        return Err(RomError::TooLarge {
            size: bytes.len(),
            capacity,
        });
    }
    if !memory.copy_from(base, bytes) {
        return Err(RomError::TooLarge {
            size: bytes.len(),
            capacity,
        });
    }
    Ok(bytes.len())
}

/// Read a whole file
pub fn read_file(path: &Path) -> Result<Vec<u8>, RomError> {
    fs::read(path).map_err(|source| RomError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Path of a named asset. Names are bare file stems.
pub fn asset_path(dir: &Path, name: &str, kind: AssetKind) -> Result<PathBuf, RomError> {
    let bare = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if !bare {
        return Err(RomError::InvalidAssetName(name.to_string()));
    }
    Ok(dir.join(format!("{}.{}", name, kind.extension())))
}

/// Load a named asset from `dir` into its region
pub fn load_asset(
    memory: &mut Memory,
    dir: &Path,
    name: &str,
    kind: AssetKind,
) -> Result<usize, RomError> {
    let path = asset_path(dir, name, kind)?;
    let bytes = read_file(&path)?;
    let written = load_into(memory, &bytes, kind.region())?;
    info!("loaded {} ({} bytes)", path.display(), written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_instruction_rom() {
        let mut mem = Memory::new(0x10000).unwrap();
        assert_eq!(load_into(&mut mem, &[1, 2, 3], RomRegion::Instruction).unwrap(), 3);
        assert_eq!(mem.read(0xE000), 1);
        assert_eq!(mem.read(0xE002), 3);
    }

    #[test]
    fn test_rom_too_large() {
        let mut mem = Memory::new(0x10000).unwrap();
        let rom = vec![0u8; 0x2001];
        match load_into(&mut mem, &rom, RomRegion::Instruction) {
            Err(RomError::TooLarge { size, capacity }) => {
                assert_eq!(size, 0x2001);
                assert_eq!(capacity, 0x2000);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // A full 8 KiB image fits exactly
        assert!(load_into(&mut mem, &rom[..0x2000], RomRegion::Instruction).is_ok());
    }

    #[test]
    fn test_palette_region_limit() {
        let mut mem = Memory::new(0x10000).unwrap();
        assert!(load_into(&mut mem, &[0u8; 192], RomRegion::Palette).is_ok());
        assert!(matches!(
            load_into(&mut mem, &[0u8; 193], RomRegion::Palette),
            Err(RomError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_region_outside_small_memory() {
        let mut mem = Memory::new(0x1000).unwrap();
        assert!(matches!(
            load_into(&mut mem, &[0], RomRegion::Instruction),
            Err(RomError::RegionOutOfRange { base: 0xE000 })
        ));
    }

    #[test]
    fn test_asset_names() {
        let dir = Path::new("assets");
        assert_eq!(
            asset_path(dir, "hero", AssetKind::Tiles).unwrap(),
            dir.join("hero.kvmpix")
        );
        assert!(asset_path(dir, "../etc/passwd", AssetKind::Palette).is_err());
        assert!(asset_path(dir, "", AssetKind::Palette).is_err());
    }

    #[test]
    fn test_missing_asset_is_io_error() {
        let mut mem = Memory::new(0x10000).unwrap();
        let result = load_asset(&mut mem, Path::new("/nonexistent"), "nope", AssetKind::Palette);
        assert!(matches!(result, Err(RomError::Io { .. })));
    }
}
