//! Tile/sprite compositor
//!
//! Renders the video region of memory into a 256x256 frame:
//! - 32x32 tile map of 8x8 2bpp tiles from the graphics ROM
//! - 16 palettes of 4 RGB colors, plus a background color
//! - per-line scroll along the scroll axis, one shared perpendicular scroll
//! - locked lines, frozen at the top/left and skipped by perpendicular scroll
//! - 256 sprites drawn over the tiles, later slots on top

use crate::memory::{
    Memory, BACKGROUND_COLOR, GRAPHICS_ROM, GRAPHICS_ROM_BYTES, LINE_LOCK_TABLE,
    LINE_SCROLL_TABLE, PALETTES, PERPENDICULAR_SCROLL, PIXEL_OFFSET_MAP, SCREEN_FLAGS,
    SPRITE_ATTRIBUTE_TABLE, SPRITE_TILE_TABLE, SPRITE_X_TABLE, SPRITE_Y_TABLE, TILE_ATTRIBUTES,
    TILE_MAP,
};

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 256;
/// Tiles per map row/column
pub const MAP_LINES: usize = 32;
pub const SPRITE_SLOTS: usize = 256;
/// Tile id that always renders as background
pub const EMPTY_TILE: u8 = 0xFF;

/// Tile/sprite attribute byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileAttributes(u8);

impl TileAttributes {
    pub const FLIP_HORIZONTAL: u8 = 0b1000_0000;
    pub const FLIP_VERTICAL: u8 = 0b0100_0000;
    pub const TRANSPOSE: u8 = 0b0010_0000;
    /// Color index 0 draws palette color 0 instead of falling through
    pub const OPAQUE_ZERO: u8 = 0b0001_0000;
    pub const PALETTE: u8 = 0b0000_1111;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn flip_horizontal(&self) -> bool {
        (self.0 & Self::FLIP_HORIZONTAL) != 0
    }

    pub fn flip_vertical(&self) -> bool {
        (self.0 & Self::FLIP_VERTICAL) != 0
    }

    pub fn transpose(&self) -> bool {
        (self.0 & Self::TRANSPOSE) != 0
    }

    pub fn opaque_zero(&self) -> bool {
        (self.0 & Self::OPAQUE_ZERO) != 0
    }

    pub fn palette(&self) -> u8 {
        self.0 & Self::PALETTE
    }
}

/// Screen flag byte at $80FF
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenFlags(u8);

impl ScreenFlags {
    /// Set: scroll table shifts tile rows horizontally.
    /// Clear: it shifts tile columns vertically.
    pub const ROW_SCROLL: u8 = 0b0000_0001;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn row_scroll(&self) -> bool {
        (self.0 & Self::ROW_SCROLL) != 0
    }
}

/// Color index (0-3) of one pixel of a tile.
///
/// `x` and `y` are tile-local (0-7). Transpose swaps the axes before the
/// flips are applied. Pixels are packed four per byte, low bits first.
pub fn tile_pixel(
    graphics: &[u8; GRAPHICS_ROM_BYTES],
    tile: u8,
    attributes: TileAttributes,
    x: u8,
    y: u8,
) -> u8 {
    let (dx, dy) = if attributes.transpose() { (y, x) } else { (x, y) };
    let bx = if attributes.flip_horizontal() { 7 - dx } else { dx };
    let by = if attributes.flip_vertical() { 7 - dy } else { dy };
    let index = (by as usize & 7) * 8 + (bx as usize & 7);
    let byte = graphics[tile as usize * 16 + index / 4];
    (byte >> ((index % 4) * 2)) & 0b11
}

/// Pack an RGB triple into 0x00RRGGBB
fn rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Composed 256x256 frame, one 0x00RRGGBB word per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pixels: Vec<u32>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }

    pub fn width(&self) -> usize {
        SCREEN_WIDTH
    }

    pub fn height(&self) -> usize {
        SCREEN_HEIGHT
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Pixel at (x, y); out-of-range coordinates read as black
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        if x >= SCREEN_WIDTH || y >= SCREEN_HEIGHT {
            return 0;
        }
        self.pixels[y * SCREEN_WIDTH + x]
    }

    fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        if x < SCREEN_WIDTH && y < SCREEN_HEIGHT {
            self.pixels[y * SCREEN_WIDTH + x] = color;
        }
    }

    /// Nearest-neighbour upscale by an integer factor (0 is treated as 1)
    pub fn scaled(&self, factor: usize) -> Vec<u32> {
        let factor = factor.max(1);
        let width = SCREEN_WIDTH * factor;
        let mut out = Vec::with_capacity(width * SCREEN_HEIGHT * factor);
        for row in self.pixels.chunks_exact(SCREEN_WIDTH) {
            let start = out.len();
            for &pixel in row {
                out.extend(std::iter::repeat(pixel).take(factor));
            }
            for _ in 1..factor {
                out.extend_from_within(start..start + width);
            }
        }
        out
    }

    /// RGBA8 bytes, fully opaque
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &pixel in &self.pixels {
            out.extend_from_slice(&[(pixel >> 16) as u8, (pixel >> 8) as u8, pixel as u8, 0xFF]);
        }
        out
    }

    /// Binary PPM (P6) image
    pub fn to_ppm(&self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", SCREEN_WIDTH, SCREEN_HEIGHT).into_bytes();
        for &pixel in &self.pixels {
            out.extend_from_slice(&[(pixel >> 16) as u8, (pixel >> 8) as u8, pixel as u8]);
        }
        out
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

/// Packing of locked and unlocked lines, computed once per refresh.
///
/// `order[k]` is the line shown at packed position `k`: locked lines first
/// in ascending order, then the unlocked ones. `offsets[line]` is that
/// line's packed pixel offset (8 x its position).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetMap {
    pub order: [u8; MAP_LINES],
    pub offsets: [u8; MAP_LINES],
    pub locked: usize,
}

impl OffsetMap {
    /// Build from the 32-entry lock table (non-zero = locked)
    pub fn from_lock_table(locks: &[u8; MAP_LINES]) -> Self {
        let mut order = [0u8; MAP_LINES];
        let mut offsets = [0u8; MAP_LINES];
        let locked_lines = (0..MAP_LINES).filter(|&line| locks[line] != 0);
        let unlocked_lines = (0..MAP_LINES).filter(|&line| locks[line] == 0);
        let mut locked = 0;
        for (position, line) in locked_lines.chain(unlocked_lines).enumerate() {
            order[position] = line as u8;
            offsets[line] = (position * 8) as u8;
            if locks[line] != 0 {
                locked += 1;
            }
        }
        Self {
            order,
            offsets,
            locked,
        }
    }

    /// The 64-byte layout published at $8300
    pub fn to_bytes(&self) -> [u8; 2 * MAP_LINES] {
        let mut bytes = [0u8; 2 * MAP_LINES];
        bytes[..MAP_LINES].copy_from_slice(&self.order);
        bytes[MAP_LINES..].copy_from_slice(&self.offsets);
        bytes
    }

    /// Resolve a screen coordinate across the scroll lines into
    /// `(line, pixel within line)`
    fn resolve(&self, across: usize, perpendicular: u8) -> (usize, usize) {
        let band_start = self.locked * 8;
        if across < band_start {
            let line = self.order[across / 8] as usize;
            return (line, across % 8);
        }
        let band = SCREEN_HEIGHT - band_start;
        let packed = (across - band_start + perpendicular as usize) % band;
        let line = self.order[self.locked + packed / 8] as usize;
        (line, packed % 8)
    }
}

/// Snapshot of the video registers taken at the start of a refresh
struct VideoState {
    background: u32,
    palettes: [u32; 64],
    flags: ScreenFlags,
    scroll: [u8; MAP_LINES],
    perpendicular: u8,
    graphics: Box<[u8; GRAPHICS_ROM_BYTES]>,
}

impl VideoState {
    fn capture(memory: &Memory) -> Self {
        let color_at = |base: u16| {
            rgb(
                memory.read(base),
                memory.read(base.wrapping_add(1)),
                memory.read(base.wrapping_add(2)),
            )
        };
        let mut palettes = [0u32; 64];
        for (i, color) in palettes.iter_mut().enumerate() {
            *color = color_at(PALETTES + (i * 3) as u16);
        }
        let mut scroll = [0u8; MAP_LINES];
        for (line, value) in scroll.iter_mut().enumerate() {
            *value = memory.read(LINE_SCROLL_TABLE + line as u16);
        }
        let mut graphics = Box::new([0u8; GRAPHICS_ROM_BYTES]);
        for (i, byte) in graphics.iter_mut().enumerate() {
            *byte = memory.read(GRAPHICS_ROM + i as u16);
        }
        Self {
            background: color_at(BACKGROUND_COLOR),
            palettes,
            flags: ScreenFlags::new(memory.read(SCREEN_FLAGS)),
            scroll,
            perpendicular: memory.read(PERPENDICULAR_SCROLL),
            graphics,
        }
    }

    /// Color of a tile pixel, or `None` when it falls through
    fn color(&self, tile: u8, attributes: TileAttributes, x: u8, y: u8) -> Option<u32> {
        if tile == EMPTY_TILE {
            return None;
        }
        let index = tile_pixel(&self.graphics, tile, attributes, x, y);
        if index == 0 && !attributes.opaque_zero() {
            return None;
        }
        Some(self.palettes[attributes.palette() as usize * 4 + index as usize])
    }
}

/// Tile/sprite compositor
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    frame: Frame,
    offsets: Option<OffsetMap>,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last composed frame
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Offset map computed by the last refresh
    pub fn offset_map(&self) -> Option<&OffsetMap> {
        self.offsets.as_ref()
    }

    /// Compute the offset map, publish it at $8300 and compose a frame
    pub fn refresh(&mut self, memory: &mut Memory) -> &Frame {
        let mut locks = [0u8; MAP_LINES];
        for (line, lock) in locks.iter_mut().enumerate() {
            *lock = memory.read(LINE_LOCK_TABLE + line as u16);
        }
        let offsets = OffsetMap::from_lock_table(&locks);
        memory.copy_from(PIXEL_OFFSET_MAP, &offsets.to_bytes());
        self.offsets = Some(offsets);

        let video = VideoState::capture(memory);
        self.draw_tiles(memory, &video, &offsets);
        self.draw_sprites(memory, &video);
        &self.frame
    }

    fn draw_tiles(&mut self, memory: &Memory, video: &VideoState, offsets: &OffsetMap) {
        let row_mode = video.flags.row_scroll();
        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                let (along, across) = if row_mode { (x, y) } else { (y, x) };
                let (line, intra) = offsets.resolve(across, video.perpendicular);
                let source_along = (along + video.scroll[line] as usize) % SCREEN_WIDTH;
                let source_across = line * 8 + intra;
                let (sx, sy) = if row_mode {
                    (source_along, source_across)
                } else {
                    (source_across, source_along)
                };

                let cell = ((sy / 8) * MAP_LINES + sx / 8) as u16;
                let tile = memory.read(TILE_MAP + cell);
                let attributes = TileAttributes::new(memory.read(TILE_ATTRIBUTES + cell));
                let color = video
                    .color(tile, attributes, (sx % 8) as u8, (sy % 8) as u8)
                    .unwrap_or(video.background);
                self.frame.set_pixel(x, y, color);
            }
        }
    }

    fn draw_sprites(&mut self, memory: &Memory, video: &VideoState) {
        for slot in 0..SPRITE_SLOTS as u16 {
            let x = memory.read(SPRITE_X_TABLE + slot);
            let y = memory.read(SPRITE_Y_TABLE + slot);
            // Position 0 hides a sprite, so does anything past the right/bottom edge
            if x.wrapping_sub(1) > 248 || y.wrapping_sub(1) > 248 {
                continue;
            }
            let tile = memory.read(SPRITE_TILE_TABLE + slot);
            if tile == EMPTY_TILE {
                continue;
            }
            let attributes = TileAttributes::new(memory.read(SPRITE_ATTRIBUTE_TABLE + slot));
            let origin_x = (x - 1) as usize;
            let origin_y = (y - 1) as usize;
            for dy in 0..8u8 {
                for dx in 0..8u8 {
                    if let Some(color) = video.color(tile, attributes, dx, dy) {
                        self.frame
                            .set_pixel(origin_x + dx as usize, origin_y + dy as usize, color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphics_with(tile: u8, bytes: [u8; 16]) -> Box<[u8; GRAPHICS_ROM_BYTES]> {
        let mut graphics = Box::new([0u8; GRAPHICS_ROM_BYTES]);
        let base = tile as usize * 16;
        graphics[base..base + 16].copy_from_slice(&bytes);
        graphics
    }

    #[test]
    fn test_tile_pixel_packing() {
        // First byte holds pixels 0-3 of row 0, lowest bits first
        let mut bytes = [0u8; 16];
        bytes[0] = 0b11_10_01_00;
        let graphics = graphics_with(3, bytes);
        let plain = TileAttributes::default();
        assert_eq!(tile_pixel(&graphics, 3, plain, 0, 0), 0);
        assert_eq!(tile_pixel(&graphics, 3, plain, 1, 0), 1);
        assert_eq!(tile_pixel(&graphics, 3, plain, 2, 0), 2);
        assert_eq!(tile_pixel(&graphics, 3, plain, 3, 0), 3);
    }

    #[test]
    fn test_tile_pixel_flips() {
        let mut bytes = [0u8; 16];
        // Pixel (0, 0) only
        bytes[0] = 0b11;
        let graphics = graphics_with(0, bytes);

        let flip_h = TileAttributes::new(TileAttributes::FLIP_HORIZONTAL);
        assert_eq!(tile_pixel(&graphics, 0, flip_h, 7, 0), 3);
        assert_eq!(tile_pixel(&graphics, 0, flip_h, 0, 0), 0);

        let flip_v = TileAttributes::new(TileAttributes::FLIP_VERTICAL);
        assert_eq!(tile_pixel(&graphics, 0, flip_v, 0, 7), 3);

        let both = TileAttributes::new(
            TileAttributes::FLIP_HORIZONTAL | TileAttributes::FLIP_VERTICAL,
        );
        assert_eq!(tile_pixel(&graphics, 0, both, 7, 7), 3);
    }

    #[test]
    fn test_tile_pixel_transpose() {
        let mut bytes = [0u8; 16];
        // Pixel (1, 0) = 2
        bytes[0] = 0b10_00;
        let graphics = graphics_with(0, bytes);
        let transpose = TileAttributes::new(TileAttributes::TRANSPOSE);
        assert_eq!(tile_pixel(&graphics, 0, transpose, 0, 1), 2);
        assert_eq!(tile_pixel(&graphics, 0, transpose, 1, 0), 0);
    }

    #[test]
    fn test_offset_map_packing() {
        let mut locks = [0u8; MAP_LINES];
        locks[5] = 1;
        locks[2] = 1;
        let map = OffsetMap::from_lock_table(&locks);
        assert_eq!(map.locked, 2);
        assert_eq!(&map.order[..4], &[2, 5, 0, 1]);
        assert_eq!(map.offsets[2], 0);
        assert_eq!(map.offsets[5], 8);
        assert_eq!(map.offsets[0], 16);
        assert_eq!(map.offsets[31], 248);
    }

    #[test]
    fn test_offset_map_resolve() {
        let mut locks = [0u8; MAP_LINES];
        locks[10] = 1;
        let map = OffsetMap::from_lock_table(&locks);
        // Locked band ignores the perpendicular scroll
        assert_eq!(map.resolve(3, 100), (10, 3));
        // First unlocked line after the band, no scroll
        assert_eq!(map.resolve(8, 0), (0, 0));
        // Scrolling by 8 skips one unlocked line
        assert_eq!(map.resolve(8, 8), (1, 0));
        // Wraps within the unlocked band (248 pixels)
        assert_eq!(map.resolve(255, 1), (0, 0));
    }

    #[test]
    fn test_all_lines_locked() {
        let map = OffsetMap::from_lock_table(&[1u8; MAP_LINES]);
        assert_eq!(map.locked, MAP_LINES);
        assert_eq!(map.resolve(255, 77), (31, 7));
    }

    #[test]
    fn test_frame_scaled() {
        let mut frame = Frame::new();
        frame.set_pixel(1, 0, 0x123456);
        let scaled = frame.scaled(2);
        assert_eq!(scaled.len(), 512 * 512);
        assert_eq!(scaled[2], 0x123456);
        assert_eq!(scaled[3], 0x123456);
        assert_eq!(scaled[512 + 2], 0x123456);
        assert_eq!(scaled[1], 0);
    }

    #[test]
    fn test_frame_rgba_and_ppm() {
        let mut frame = Frame::new();
        frame.set_pixel(0, 0, 0xAABBCC);
        let rgba = frame.to_rgba_bytes();
        assert_eq!(&rgba[..4], &[0xAA, 0xBB, 0xCC, 0xFF]);
        let ppm = frame.to_ppm();
        assert!(ppm.starts_with(b"P6\n256 256\n255\n"));
        assert_eq!(ppm.len(), 15 + 256 * 256 * 3);
    }
}
