//! Flat memory and the fixed memory map
//!
//! The INDY-3 memory map (offsets are part of the ROM ABI):
//! $0000-$0002 - Syscall mailbox (id, operand low, operand high)
//! $0100-$01FF - Stack page
//! $7C00-$7C4F - Keyboard snapshot (one four-state byte per key)
//! $7D00-$7D02 - Mouse snapshot (x, y, button mask)
//! $8000-$8002 - Background color (R, G, B)
//! $8003-$80C2 - 16 palettes x 4 colors x RGB
//! $80FF       - Screen flags
//! $8100-$811F - Per-line scroll table
//! $8120-$813F - Per-line lock table
//! $8140       - Perpendicular scroll
//! $8300-$833F - Pixel offset map (written by the compositor)
//! $8400-$87FF - Tile map (32x32)
//! $8800-$8BFF - Tile attributes (32x32)
//! $8C00-$8FFF - Sprite X / Y / tile / attribute tables
//! $9000-$9FFF - Graphics ROM (256 tiles x 16 bytes)
//! $E000-$FFFF - Instruction ROM

use std::fmt::Write as _;

use crate::cpu::Bus as CpuBus;

/// Default memory size in bytes (full 16-bit address space)
pub const DEFAULT_MEMORY_SIZE: usize = 0x10000;

/// Syscall mailbox: id byte followed by a little-endian operand
pub const SYSCALL_MAILBOX: u16 = 0x0000;
/// Base of the one-page stack.
///
/// SP = $FF is the empty stack and a push at SP = $00 faults, so the usable
/// stack is $0101-$01FF (255 bytes) and $0100 is never written by it.
pub const STACK_PAGE: u16 = 0x0100;

pub const KEYBOARD_SNAPSHOT: u16 = 0x7C00;
pub const MOUSE_SNAPSHOT: u16 = 0x7D00;

pub const BACKGROUND_COLOR: u16 = 0x8000;
pub const PALETTES: u16 = 0x8003;
/// 16 palettes x 4 colors x 3 bytes
pub const PALETTE_BYTES: usize = 192;
pub const SCREEN_FLAGS: u16 = 0x80FF;
pub const LINE_SCROLL_TABLE: u16 = 0x8100;
pub const LINE_LOCK_TABLE: u16 = 0x8120;
pub const PERPENDICULAR_SCROLL: u16 = 0x8140;
pub const PIXEL_OFFSET_MAP: u16 = 0x8300;
pub const TILE_MAP: u16 = 0x8400;
pub const TILE_ATTRIBUTES: u16 = 0x8800;
pub const SPRITE_X_TABLE: u16 = 0x8C00;
pub const SPRITE_Y_TABLE: u16 = 0x8D00;
pub const SPRITE_TILE_TABLE: u16 = 0x8E00;
pub const SPRITE_ATTRIBUTE_TABLE: u16 = 0x8F00;

pub const GRAPHICS_ROM: u16 = 0x9000;
/// 256 tiles x 16 bytes
pub const GRAPHICS_ROM_BYTES: usize = 4096;
pub const INSTRUCTION_ROM: u16 = 0xE000;

/// Flat VM memory
#[derive(Debug, Clone)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create zeroed memory of `size` bytes.
    ///
    /// Returns `None` when the size cannot be addressed with 16 bits.
    pub fn new(size: usize) -> Option<Self> {
        if size == 0 || size > DEFAULT_MEMORY_SIZE {
            return None;
        }
        Some(Self {
            data: vec![0; size],
        })
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Read a byte; addresses past the end read as 0
    pub fn read(&self, address: u16) -> u8 {
        self.data.get(address as usize).copied().unwrap_or(0)
    }

    /// Write a byte; addresses past the end are ignored
    pub fn write(&mut self, address: u16, value: u8) {
        if let Some(cell) = self.data.get_mut(address as usize) {
            *cell = value;
        }
    }

    /// Read a little-endian word
    pub fn read_u16(&self, address: u16) -> u16 {
        let lo = self.read(address) as u16;
        let hi = self.read(address.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    /// Write a little-endian word
    pub fn write_u16(&mut self, address: u16, value: u16) {
        self.write(address, value as u8);
        self.write(address.wrapping_add(1), (value >> 8) as u8);
    }

    /// Number of bytes addressable from `base` to the end of memory
    pub fn capacity_from(&self, base: u16) -> usize {
        self.data.len().saturating_sub(base as usize)
    }

    /// Copy `bytes` verbatim starting at `base`.
    ///
    /// Returns false (and leaves memory untouched) if they do not fit.
    pub fn copy_from(&mut self, base: u16, bytes: &[u8]) -> bool {
        let start = base as usize;
        match self.data.get_mut(start..start + bytes.len()) {
            Some(region) => {
                region.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Fill `len` bytes starting at `base` with `value`, clamped to memory
    pub fn fill(&mut self, base: u16, len: usize, value: u8) {
        let start = (base as usize).min(self.data.len());
        let end = (start + len).min(self.data.len());
        self.data[start..end].fill(value);
    }

    /// Read a NUL-terminated string starting at `address`.
    ///
    /// Stops at the end of memory or after `max_len` bytes. Returns the
    /// string and the address just past the terminator.
    pub fn read_cstring(&self, address: u16, max_len: usize) -> (String, u16) {
        let mut bytes = Vec::new();
        let mut cursor = address;
        while bytes.len() < max_len && (cursor as usize) < self.data.len() {
            let byte = self.read(cursor);
            cursor = cursor.wrapping_add(1);
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        (String::from_utf8_lossy(&bytes).into_owned(), cursor)
    }

    /// Raw view of the whole memory
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Classic 16-bytes-per-row hexdump of `len` bytes from `start`
    pub fn hexdump(&self, start: usize, len: usize) -> String {
        let end = (start + len).min(self.data.len());
        let mut out = String::new();
        let mut row = start - start % 16;
        while row < end {
            let _ = write!(out, "{:04X}:", row);
            for address in row..row + 16 {
                if address >= start && address < end {
                    let _ = write!(out, " {:02X}", self.data[address]);
                } else {
                    out.push_str("   ");
                }
            }
            out.push('\n');
            row += 16;
        }
        out
    }
}

impl CpuBus for Memory {
    fn read(&self, address: u16) -> u8 {
        Memory::read(self, address)
    }

    fn write(&mut self, address: u16, value: u8) {
        Memory::write(self, address, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new(DEFAULT_MEMORY_SIZE).unwrap();

        mem.write(0x0010, 0x42);
        assert_eq!(mem.read(0x0010), 0x42);

        mem.write_u16(0x0020, 0xBEEF);
        assert_eq!(mem.read(0x0020), 0xEF);
        assert_eq!(mem.read(0x0021), 0xBE);
        assert_eq!(mem.read_u16(0x0020), 0xBEEF);
    }

    #[test]
    fn test_out_of_range_reads_zero() {
        let mut mem = Memory::new(0x1000).unwrap();
        mem.write(0x2000, 0x55);
        assert_eq!(mem.read(0x2000), 0);
        assert_eq!(mem.read(0xFFFF), 0);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(Memory::new(0).is_none());
        assert!(Memory::new(DEFAULT_MEMORY_SIZE + 1).is_none());
        assert!(Memory::new(1).is_some());
    }

    #[test]
    fn test_copy_from_bounds() {
        let mut mem = Memory::new(0x100).unwrap();
        assert!(mem.copy_from(0xF0, &[1; 16]));
        assert!(!mem.copy_from(0xF0, &[2; 17]));
        // Failed copies leave memory untouched
        assert_eq!(mem.read(0xF0), 1);
        assert_eq!(mem.capacity_from(0xF0), 16);
        assert_eq!(mem.capacity_from(0x200), 0);
    }

    #[test]
    fn test_read_cstring() {
        let mut mem = Memory::new(0x100).unwrap();
        mem.copy_from(0x10, b"hello\0world");
        let (text, next) = mem.read_cstring(0x10, 64);
        assert_eq!(text, "hello");
        assert_eq!(next, 0x16);
    }

    #[test]
    fn test_hexdump_rows() {
        let mut mem = Memory::new(0x100).unwrap();
        mem.write(0x11, 0xAB);
        let dump = mem.hexdump(0x10, 32);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0010: 00 AB"));
        assert!(lines[1].starts_with("0020:"));
    }
}
