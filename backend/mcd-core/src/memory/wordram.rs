//! Word RAM: 256KB shared between the main CPU, the sub CPU, the graphics processor, and CDC DMA.
//!
//! In 2M mode the whole block belongs to one CPU at a time. In 1M mode it is split into two
//! interleaved banks, one per CPU, which can be swapped.

use bincode::{Decode, Encode};
use mcd_common::num::GetBit;

pub const WORD_RAM_LEN: usize = 256 * 1024;
pub const ADDRESS_MASK: u32 = WORD_RAM_LEN as u32 - 1;

// Word RAM (2M) / 1M pixel view
pub const SUB_BASE_ADDRESS: u32 = 0x080000;
// 1M sub CPU bank
pub const SUB_1M_BANK_ADDRESS: u32 = 0x0C0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum WordRamMode {
    #[default]
    TwoM,
    OneM,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum WordRamPriority {
    #[default]
    Off,
    Underwrite,
    Overwrite,
    Invalid,
}

impl WordRamPriority {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0x00 => Self::Off,
            0x01 => Self::Underwrite,
            0x02 => Self::Overwrite,
            _ => Self::Invalid,
        }
    }

    fn to_bits(self) -> u8 {
        self as u8
    }

    fn should_write(self, current: u8, pixel: u8) -> bool {
        match self {
            Self::Off | Self::Invalid => true,
            Self::Underwrite => current == 0,
            Self::Overwrite => pixel != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nibble {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cpu {
    Main,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubMapping {
    None,
    Byte(u32),
    // Nibble address into word RAM; even = high nibble
    Pixel(u32),
}

/// Word RAM mode and ownership state ($A12003 / $FF8003).
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct WordRamControl {
    pub mode: WordRamMode,
    // 2M: set while the sub CPU owns word RAM
    pub switch: bool,
    // 1M: RET; set while the sub CPU owns bank 0
    pub select: bool,
    pub swap_request: bool,
    pub priority: WordRamPriority,
}

// (offset, length, V size in cells) of each cell image region at $220000-$23FFFF
const CELL_IMAGE_REGIONS: [(u32, u32, u32); 5] = [
    (0x00000, 0x10000, 32),
    (0x10000, 0x08000, 16),
    (0x18000, 0x04000, 8),
    (0x1C000, 0x02000, 4),
    (0x1E000, 0x02000, 4),
];

// 64 cells horizontally, 8 pixels per cell line, 2 pixels per byte
const CELL_IMAGE_LINE_BYTES: u32 = 64 * 8 / 2;

impl WordRamControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bank_0_owner(&self) -> Cpu {
        if self.select { Cpu::Sub } else { Cpu::Main }
    }

    fn dmna_ret(&self) -> (bool, bool) {
        match self.mode {
            WordRamMode::TwoM => (self.switch, !self.switch),
            WordRamMode::OneM => (self.swap_request, self.select),
        }
    }

    /// Low byte of $A12002.
    #[must_use]
    pub fn main_read_control(&self) -> u8 {
        let (dmna, ret) = self.dmna_ret();
        (u8::from(self.mode == WordRamMode::OneM) << 2) | (u8::from(dmna) << 1) | u8::from(ret)
    }

    /// Low byte of $FF8002.
    #[must_use]
    pub fn sub_read_control(&self) -> u8 {
        (self.priority.to_bits() << 3) | self.main_read_control()
    }

    pub fn main_write_control(&mut self, value: u8) {
        let dmna = value.bit(1);

        // DMNA=1 always hands 2M word RAM to the sub CPU, regardless of mode
        if dmna {
            self.switch = true;
        }

        // In 1M mode, DMNA=0 requests a bank swap
        if self.mode == WordRamMode::OneM && !dmna {
            self.swap_request = true;
        }

        log::trace!("Main CPU word RAM control write: DMNA={dmna}, mode={:?}", self.mode);
    }

    pub fn sub_write_control(&mut self, value: u8) {
        self.mode = if value.bit(2) { WordRamMode::OneM } else { WordRamMode::TwoM };
        let ret = value.bit(0);

        // RET=1 always returns 2M word RAM to the main CPU, regardless of mode
        if ret {
            self.switch = false;
        }

        if self.select != ret {
            self.select = ret;
            self.swap_request = false;
        }

        self.priority = WordRamPriority::from_bits(value >> 3);

        log::trace!(
            "Sub CPU word RAM control write: RET={ret}, mode={:?}, priority={:?}",
            self.mode,
            self.priority
        );
    }

    /// Whether CDC DMA into word RAM can proceed.
    #[must_use]
    pub fn sub_cpu_can_dma(&self) -> bool {
        self.mode == WordRamMode::OneM || self.switch
    }

    fn main_map(&self, address: u32) -> Option<u32> {
        let address = address & ADDRESS_MASK;
        match self.mode {
            WordRamMode::TwoM => (!self.switch).then_some(address),
            WordRamMode::OneM if address < 0x20000 => {
                Some(interleave_1m(address, Cpu::Main, self.bank_0_owner()))
            }
            WordRamMode::OneM => {
                let offset = address & 0x1FFFF;
                CELL_IMAGE_REGIONS
                    .iter()
                    .find(|&&(start, len, _)| (start..start + len).contains(&offset))
                    .map(|&(start, _, v_cells)| {
                        let relative = offset - start;
                        let column_bytes = v_cells * 8 * 4;
                        let row = (relative % column_bytes) >> 2;
                        let column = relative / column_bytes;
                        let linear =
                            start + row * CELL_IMAGE_LINE_BYTES + (column << 2) + (relative & 0x03);
                        interleave_1m(linear, Cpu::Main, self.bank_0_owner())
                    })
            }
        }
    }

    fn sub_map(&self, address: u32) -> SubMapping {
        match (self.mode, address) {
            // Sub CPU accesses to 2M word RAM go through even while the main CPU owns it
            (WordRamMode::TwoM, 0x080000..=0x0BFFFF) => SubMapping::Byte(address & ADDRESS_MASK),
            (WordRamMode::OneM, 0x080000..=0x0BFFFF) => {
                let byte_address =
                    interleave_1m((address & ADDRESS_MASK) >> 1, Cpu::Sub, self.bank_0_owner());
                SubMapping::Pixel((byte_address << 1) | (address & 1))
            }
            (WordRamMode::OneM, 0x0C0000..=0x0DFFFF) => {
                SubMapping::Byte(interleave_1m(address & 0x1FFFF, Cpu::Sub, self.bank_0_owner()))
            }
            _ => SubMapping::None,
        }
    }

    /// Main CPU read from $200000-$23FFFF. Returns `None` if the main CPU cannot see word RAM.
    #[must_use]
    pub fn main_read(&self, ram: &[u8], address: u32) -> Option<u8> {
        self.main_map(address).map(|address| ram[address as usize])
    }

    pub fn main_write(&self, ram: &mut [u8], address: u32, value: u8) {
        if let Some(address) = self.main_map(address) {
            ram[address as usize] = value;
        }
    }

    /// Sub CPU read from $080000-$0DFFFF.
    #[must_use]
    pub fn sub_read(&self, ram: &[u8], address: u32) -> Option<u8> {
        match self.sub_map(address) {
            SubMapping::None => None,
            SubMapping::Byte(address) => Some(ram[address as usize]),
            SubMapping::Pixel(pixel_address) => {
                let byte = ram[(pixel_address >> 1) as usize];
                Some(if pixel_address.bit(0) { byte & 0x0F } else { byte >> 4 })
            }
        }
    }

    pub fn sub_write(&self, ram: &mut [u8], address: u32, value: u8) {
        match self.sub_map(address) {
            SubMapping::None => {}
            SubMapping::Byte(address) => ram[address as usize] = value,
            SubMapping::Pixel(pixel_address) => {
                self.write_pixel(ram, pixel_address, value & 0x0F);
            }
        }
    }

    /// Graphics processor pixel write; the address is relative to the sub CPU word RAM window.
    pub fn graphics_write(&self, ram: &mut [u8], address: u32, nibble: Nibble, pixel: u8) {
        match self.sub_map(SUB_BASE_ADDRESS | (address & ADDRESS_MASK)) {
            SubMapping::None => {}
            SubMapping::Byte(address) => {
                let pixel_address = (address << 1) | u32::from(nibble == Nibble::Low);
                self.write_pixel(ram, pixel_address, pixel);
            }
            SubMapping::Pixel(pixel_address) => {
                // Only the low nibble of each byte exists in the pixel view
                if nibble == Nibble::Low {
                    self.write_pixel(ram, pixel_address, pixel);
                }
            }
        }
    }

    /// Graphics processor read; the address is relative to the sub CPU word RAM window.
    #[must_use]
    pub fn graphics_read(&self, ram: &[u8], address: u32) -> u8 {
        self.sub_read(ram, SUB_BASE_ADDRESS | (address & ADDRESS_MASK)).unwrap_or(0)
    }

    fn write_pixel(&self, ram: &mut [u8], pixel_address: u32, pixel: u8) {
        let byte_address = (pixel_address >> 1) as usize;
        let current = ram[byte_address];
        let low = pixel_address.bit(0);
        let current_pixel = if low { current & 0x0F } else { current >> 4 };

        if self.priority.should_write(current_pixel, pixel) {
            ram[byte_address] =
                if low { (current & 0xF0) | pixel } else { (current & 0x0F) | (pixel << 4) };
        }
    }

    /// CDC DMA write. Targets the 2M window in 2M mode and the sub CPU's bank in 1M mode.
    pub fn dma_write(&self, ram: &mut [u8], address: u32, value: u8) {
        let address = match self.mode {
            WordRamMode::TwoM => SUB_BASE_ADDRESS | (address & ADDRESS_MASK),
            WordRamMode::OneM => SUB_1M_BANK_ADDRESS | (address & 0x1FFFF),
        };
        self.sub_write(ram, address, value);
    }
}

fn interleave_1m(address: u32, cpu: Cpu, bank_0_owner: Cpu) -> u32 {
    ((address & !1) << 1) | (u32::from(cpu != bank_0_owner) << 1) | (address & 1)
}
