//! Stamp/map graphics processor ($FF8058-$FF8067) and font registers

mod fixedpoint;
pub mod font;

use crate::graphics::fixedpoint::Fixed;
use crate::graphics::font::Font;
use crate::irq::Irq;
use crate::memory::wordram::{self, Nibble, WordRamControl};
use bincode::{Decode, Encode};
use mcd_common::num::{GetBit, U16Ext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum TileSize {
    #[default]
    Sixteen,
    ThirtyTwo,
}

impl TileSize {
    fn dots(self) -> u32 {
        match self {
            Self::Sixteen => 16,
            Self::ThirtyTwo => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum MapSize {
    // 256x256 dots
    #[default]
    Small,
    // 4096x4096 dots
    Large,
}

impl MapSize {
    fn dots(self) -> u32 {
        match self {
            Self::Small => 256,
            Self::Large => 4096,
        }
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Stamp {
    pub repeat: bool,
    pub tile: TileSize,
    pub map: MapSize,
    pub base: u32,
}

impl Stamp {
    // The map must be aligned to its own size
    fn aligned_base(&self) -> u32 {
        let mask = match (self.map, self.tile) {
            (MapSize::Small, TileSize::Sixteen) => 0x03FE00,
            (MapSize::Small, TileSize::ThirtyTwo) => 0x03FF80,
            (MapSize::Large, TileSize::Sixteen) => 0x020000,
            (MapSize::Large, TileSize::ThirtyTwo) => 0x038000,
        };
        self.base & mask
    }

    fn map_entry_address(&self, x: u32, y: u32) -> u32 {
        let map_dots = self.map.dots();
        let tile_dots = self.tile.dots();
        let column = (x & (map_dots - 1)) / tile_dots;
        let row = (y & (map_dots - 1)) / tile_dots;

        self.aligned_base() + 2 * (row * (map_dots / tile_dots) + column)
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Image {
    pub base: u32,
    // V offset in bits 5-3, H offset in bits 2-0
    pub offset: u8,
    // Height of the buffer in cells, minus one
    pub vcells: u8,
    pub vdots: u8,
    pub hdots: u16,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Vector {
    pub base: u32,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Gpu {
    pub irq: Irq,
    pub font: Font,
    pub stamp: Stamp,
    pub image: Image,
    pub vector: Vector,
    pub active: bool,
    pub counter: u32,
    pub period: u32,
}

impl Gpu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            irq: Irq::default(),
            font: Font::default(),
            stamp: Stamp::default(),
            image: Image::default(),
            vector: Vector::default(),
            active: false,
            counter: 0,
            period: 0,
        }
    }

    pub fn power(&mut self) {
        *self = Self { irq: Irq { enable: self.irq.enable, pending: false }, ..Self::new() };
    }

    /// Arm a render pass. Ignored while a pass is already in progress.
    pub fn start(&mut self) {
        if self.active {
            log::warn!("Graphics operation started while another was in progress");
            return;
        }

        // 3 sub CPU cycles per word RAM access, with this many accesses per image line
        let hdots = u32::from(self.image.hdots);
        let accesses_per_line = 4 + 2 * hdots + hdots / 4;

        self.active = true;
        self.counter = 0;
        self.period = 3 * u32::from(self.image.vdots) * accesses_per_line;

        log::trace!(
            "Graphics operation started: {}x{} dots, period {} cycles",
            self.image.hdots,
            self.image.vdots,
            self.period
        );
    }

    /// Advance by the given number of sub CPU cycles. The image is rendered once the period
    /// elapses. Returns whether the interrupt output changed.
    pub fn step(&mut self, clocks: u32, word_ram: &mut [u8], control: &WordRamControl) -> bool {
        if !self.active {
            return false;
        }

        self.counter = self.counter.saturating_add(clocks);
        if self.counter < self.period {
            return false;
        }

        self.render(word_ram, control);

        self.active = false;
        self.image.vdots = 0;
        log::trace!("Graphics operation complete");

        self.irq.raise()
    }

    fn render(&self, word_ram: &mut [u8], control: &WordRamControl) {
        let line_dots = 8 * (u32::from(self.image.vcells) + 1);
        let h_offset = u32::from(self.image.offset & 0x07);
        let map_dots = self.stamp.map.dots();

        let mut image_base = self.image.base;
        let mut image_line = u32::from(self.image.offset >> 3) & 0x07;

        for line in 0..u32::from(self.image.vdots) {
            let vector_address = (self.vector.base + 8 * line) & wordram::ADDRESS_MASK;
            let mut x = Fixed::from_position(read_word(word_ram, control, vector_address));
            let mut y = Fixed::from_position(read_word(word_ram, control, vector_address + 2));
            let dx = Fixed::from_delta(read_word(word_ram, control, vector_address + 4));
            let dy = Fixed::from_delta(read_word(word_ram, control, vector_address + 6));

            for dot in 0..u32::from(self.image.hdots) {
                let (map_x, map_y) = (x.whole(), y.whole());

                let pixel = if !self.stamp.repeat && (map_x >= map_dots || map_y >= map_dots) {
                    0
                } else {
                    let entry_address = self.stamp.map_entry_address(map_x, map_y);
                    let entry = read_word(word_ram, control, entry_address);
                    sample_stamp(word_ram, control, entry, self.stamp.tile, map_x, map_y)
                };

                let image_dot = h_offset + dot;
                let address = image_base + cell_address(line_dots, image_dot, image_line);
                let nibble = if image_dot.bit(0) { Nibble::Low } else { Nibble::High };
                control.graphics_write(word_ram, address, nibble, pixel);

                x += dx;
                y += dy;
            }

            image_line += 1;
            if image_line == line_dots {
                image_line = 0;
                image_base = (image_base + line_dots * 8 / 2) & wordram::ADDRESS_MASK;
            }
        }
    }

    #[must_use]
    pub fn read(&self, address: u32) -> u16 {
        match address & 0x1FE {
            0x58 => {
                (u16::from(self.active) << 15)
                    | (u16::from(self.stamp.map == MapSize::Large) << 2)
                    | (u16::from(self.stamp.tile == TileSize::ThirtyTwo) << 1)
                    | u16::from(self.stamp.repeat)
            }
            0x5A => (self.stamp.base >> 2) as u16,
            0x5C => self.image.vcells.into(),
            0x5E => (self.image.base >> 2) as u16,
            0x60 => self.image.offset.into(),
            0x62 => self.image.hdots,
            0x64 => self.image.vdots.into(),
            _ => 0,
        }
    }

    /// Register write. For a byte write the byte sits in its lane of `value`; the word-wide
    /// registers latch the byte into both halves.
    pub fn write(&mut self, upper: bool, lower: bool, address: u32, value: u16) {
        log::trace!("GPU register write {address:06X} {value:04X} (upper={upper}, lower={lower})");

        let word = match (upper, lower) {
            (true, false) => u16::from_be_bytes([value.msb(), value.msb()]),
            (false, true) => u16::from_be_bytes([value.lsb(), value.lsb()]),
            _ => value,
        };

        match address & 0x1FE {
            0x58 if lower => {
                self.stamp.map = if value.bit(2) { MapSize::Large } else { MapSize::Small };
                self.stamp.tile =
                    if value.bit(1) { TileSize::ThirtyTwo } else { TileSize::Sixteen };
                self.stamp.repeat = value.bit(0);
            }
            0x5A => self.stamp.base = u32::from(word & 0xFFE0) << 2,
            0x5C if lower => self.image.vcells = (value & 0x1F) as u8,
            0x5E => self.image.base = u32::from(word & 0xFFF8) << 2,
            0x60 if lower => self.image.offset = (value & 0x3F) as u8,
            0x62 => self.image.hdots = word & 0x01FF,
            0x64 => self.image.vdots = word as u8,
            0x66 => {
                self.vector.base = u32::from(word & 0xFFFE) << 2;
                self.start();
            }
            _ => {}
        }
    }
}

impl Default for Gpu {
    fn default() -> Self {
        Self::new()
    }
}

fn read_word(word_ram: &[u8], control: &WordRamControl, address: u32) -> u16 {
    u16::from_be_bytes([
        control.graphics_read(word_ram, address),
        control.graphics_read(word_ram, address + 1),
    ])
}

// Cells are 8x8 dots at 4 bytes per row, stacked vertically in columns `column_dots` tall
fn cell_address(column_dots: u32, x: u32, y: u32) -> u32 {
    (x >> 3) * column_dots * 4 + y * 4 + ((x & 0x07) >> 1)
}

fn sample_stamp(
    word_ram: &[u8],
    control: &WordRamControl,
    entry: u16,
    tile: TileSize,
    x: u32,
    y: u32,
) -> u8 {
    // Bits 15-13 hold flip and rotation attributes, which are not applied
    let number = u32::from(entry & 0x07FF);
    let number = match tile {
        TileSize::Sixteen => number,
        // Low 2 bits are ignored for 32x32 stamps
        TileSize::ThirtyTwo => number >> 2,
    };

    if number == 0 {
        return 0;
    }

    let dots = tile.dots();
    let stamp_address = number * dots * dots / 2;
    let address = stamp_address + cell_address(dots, x & (dots - 1), y & (dots - 1));
    let byte = control.graphics_read(word_ram, address);

    if x.bit(0) { byte & 0x0F } else { byte >> 4 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn word_ram() -> (Vec<u8>, WordRamControl) {
        (vec![0; wordram::WORD_RAM_LEN], WordRamControl::new())
    }

    fn put_word(ram: &mut [u8], address: u32, value: u16) {
        ram[address as usize..address as usize + 2].copy_from_slice(&value.to_be_bytes());
    }

    const MAP_BASE: u32 = 0x10000;
    const IMAGE_BASE: u32 = 0x20000;
    const VECTOR_BASE: u32 = 0x30000;

    // One 256x256 map of 16x16 stamps with stamp 1 in the top left corner. Stamp 1's top row is
    // 0 1 2 3 4 5 6 7 ...
    fn stamp_scene(ram: &mut [u8], entry: u16) -> Gpu {
        put_word(ram, MAP_BASE, entry);
        for i in 0..4 {
            ram[(128 + i) as usize] = ((2 * i as u8) << 4) | (2 * i as u8 + 1);
        }

        // One line starting at (0, 0), stepping one dot right per pixel
        put_word(ram, VECTOR_BASE, 0);
        put_word(ram, VECTOR_BASE + 2, 0);
        put_word(ram, VECTOR_BASE + 4, 1 << 11);
        put_word(ram, VECTOR_BASE + 6, 0);

        let mut gpu = Gpu::new();
        gpu.irq.enable = true;
        gpu.write(true, true, 0x58, 0x0000);
        gpu.write(true, true, 0x5A, (MAP_BASE >> 2) as u16);
        gpu.write(true, true, 0x5C, 0x0000);
        gpu.write(true, true, 0x5E, (IMAGE_BASE >> 2) as u16);
        gpu.write(true, true, 0x60, 0x0000);
        gpu.write(true, true, 0x62, 8);
        gpu.write(true, true, 0x64, 1);
        gpu
    }

    #[test]
    fn stamp_map_address() {
        let stamp = Stamp {
            repeat: false,
            tile: TileSize::Sixteen,
            map: MapSize::Large,
            base: 0x20000,
        };
        assert_eq!(stamp.map_entry_address(0, 0), 0x20000);
        assert_eq!(stamp.map_entry_address(16, 15), 0x20002);
        assert_eq!(stamp.map_entry_address(15, 16), 0x20200);
        assert_eq!(stamp.map_entry_address(4095, 4095), 0x3FFFE);

        let stamp =
            Stamp { map: MapSize::Small, tile: TileSize::ThirtyTwo, base: 0x1FFFF, ..stamp };
        assert_eq!(stamp.map_entry_address(0, 0), 0x1FF80);
        assert_eq!(stamp.map_entry_address(32, 32), 0x1FF80 + 2 * 9);
    }

    #[test]
    fn renders_once_after_period() {
        let (mut ram, control) = word_ram();
        let mut gpu = stamp_scene(&mut ram, 0x0001);

        gpu.write(true, true, 0x66, (VECTOR_BASE >> 2) as u16);
        assert!(gpu.active);
        assert_eq!(gpu.read(0x58) >> 15, 1);

        // 3 * 1 * (4 + 16 + 2)
        assert_eq!(gpu.period, 66);

        assert!(!gpu.step(65, &mut ram, &control));
        assert!(gpu.active);
        assert_eq!(ram[IMAGE_BASE as usize], 0);

        assert!(gpu.step(1, &mut ram, &control));
        assert!(!gpu.active);
        assert!(gpu.irq.pending);
        assert_eq!(gpu.image.vdots, 0);
        assert_eq!(&ram[IMAGE_BASE as usize..IMAGE_BASE as usize + 4], &[0x01, 0x23, 0x45, 0x67]);

        gpu.irq.lower();
        ram[IMAGE_BASE as usize] = 0xEE;
        assert!(!gpu.step(1000, &mut ram, &control));
        assert!(!gpu.irq.pending);
        assert_eq!(ram[IMAGE_BASE as usize], 0xEE);
    }

    #[test]
    fn start_while_active_is_ignored() {
        let (mut ram, _) = word_ram();
        let mut gpu = stamp_scene(&mut ram, 0x0001);

        gpu.start();
        gpu.counter = 10;
        gpu.start();
        assert_eq!(gpu.counter, 10);
    }

    #[test]
    fn attribute_bits_ignored() {
        let (mut ram, control) = word_ram();
        let mut gpu = stamp_scene(&mut ram, 0xE001);

        gpu.start();
        gpu.step(gpu.period, &mut ram, &control);
        assert_eq!(&ram[IMAGE_BASE as usize..IMAGE_BASE as usize + 4], &[0x01, 0x23, 0x45, 0x67]);
    }

    #[test]
    fn stamp_zero_is_transparent() {
        let (mut ram, control) = word_ram();
        let mut gpu = stamp_scene(&mut ram, 0x0000);
        ram[IMAGE_BASE as usize..IMAGE_BASE as usize + 4].fill(0xFF);

        gpu.start();
        gpu.step(gpu.period, &mut ram, &control);
        assert_eq!(&ram[IMAGE_BASE as usize..IMAGE_BASE as usize + 4], &[0; 4]);
    }

    #[test]
    fn outside_map_without_repeat() {
        let (mut ram, control) = word_ram();
        let mut gpu = stamp_scene(&mut ram, 0x0001);
        // Start at x=256, just past the right edge of the map
        put_word(&mut ram, VECTOR_BASE, 256 << 3);

        gpu.start();
        gpu.step(gpu.period, &mut ram, &control);
        assert_eq!(&ram[IMAGE_BASE as usize..IMAGE_BASE as usize + 4], &[0; 4]);

        gpu.write(false, true, 0x58, 0x0001);
        gpu.write(true, true, 0x64, 1);
        gpu.start();
        gpu.step(gpu.period, &mut ram, &control);
        assert_eq!(&ram[IMAGE_BASE as usize..IMAGE_BASE as usize + 4], &[0x01, 0x23, 0x45, 0x67]);
    }

    #[test]
    fn underwrite_priority() {
        let (mut ram, mut control) = word_ram();
        control.sub_write_control(0x08);
        let mut gpu = stamp_scene(&mut ram, 0x0001);
        ram[IMAGE_BASE as usize] = 0x90;

        gpu.start();
        gpu.step(gpu.period, &mut ram, &control);
        assert_eq!(&ram[IMAGE_BASE as usize..IMAGE_BASE as usize + 4], &[0x91, 0x23, 0x45, 0x67]);
    }

    #[test]
    fn byte_writes() {
        let mut gpu = Gpu::new();

        gpu.write(false, true, 0x5D, 0x00FF);
        assert_eq!(gpu.read(0x5C), 0x1F);

        gpu.write(false, true, 0x63, 0x0040);
        assert_eq!(gpu.read(0x62), 0x0040);

        gpu.write(true, false, 0x62, 0x0100);
        assert_eq!(gpu.read(0x62), 0x0101);

        gpu.write(true, false, 0x58, 0x0700);
        assert_eq!(gpu.read(0x58), 0);

        gpu.write(false, true, 0x59, 0x0006);
        assert_eq!(gpu.stamp.map, MapSize::Large);
        assert_eq!(gpu.stamp.tile, TileSize::ThirtyTwo);
        assert!(!gpu.stamp.repeat);
    }
}
