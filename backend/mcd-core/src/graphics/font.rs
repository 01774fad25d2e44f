//! Font color expansion registers ($FF804C-$FF8057)

use bincode::{Decode, Encode};
use mcd_common::num::GetBit;

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Font {
    // Color for 0 bits
    pub background: u8,
    // Color for 1 bits
    pub foreground: u8,
    pub data: u16,
}

impl Font {
    /// Low byte of $FF804C.
    #[must_use]
    pub fn read_color(&self) -> u8 {
        (self.foreground << 4) | self.background
    }

    pub fn write_color(&mut self, value: u8) {
        self.background = value & 0x0F;
        self.foreground = value >> 4;
    }

    /// One of the four expanded words at $FF8050-$FF8057. Word 0 expands font data bits 15-12,
    /// word 3 expands bits 3-0; each bit becomes one 4-bit pixel.
    #[must_use]
    pub fn read_expanded(&self, word: u32) -> u16 {
        let first_bit = ((3 - (word & 0x03)) << 2) as u8;

        (0..4).fold(0, |expanded, pixel| {
            let set = self.data.bit(first_bit + pixel);
            let color = if set { self.foreground } else { self.background };
            expanded | (u16::from(color & 0x0F) << (4 * pixel))
        })
    }
}
