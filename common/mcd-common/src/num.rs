use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($($t:ty),* $(,)?) => {
        $(
            impl GetBit for $t {
                #[inline]
                fn bit(self, i: u8) -> bool {
                    debug_assert!(i < (<$t>::BITS as u8));
                    self & (1 << i) != 0
                }

                #[inline]
                fn bits(self, range: RangeInclusive<u8>) -> Self {
                    let (start, end) = (*range.start(), *range.end());
                    debug_assert!(start <= end && end < (<$t>::BITS as u8));

                    let len = u32::from(end - start + 1);
                    (self >> start) & <$t>::MAX.checked_shr(<$t>::BITS - len).unwrap_or(0)
                }
            }
        )*
    };
}

impl_get_bit!(u8, u16, u32, usize);

/// Byte lane access on a 16-bit bus word.
pub trait U16Ext {
    fn lsb(self) -> u8;

    fn msb(self) -> u8;

    fn set_lsb(&mut self, value: u8);

    fn set_msb(&mut self, value: u8);

    /// Replace the bytes selected by `upper` / `lower` with the corresponding bytes of `value`.
    fn write_lanes(&mut self, upper: bool, lower: bool, value: u16);
}

impl U16Ext for u16 {
    #[inline(always)]
    fn lsb(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    fn msb(self) -> u8 {
        (self >> 8) as u8
    }

    #[inline(always)]
    fn set_lsb(&mut self, value: u8) {
        *self = (*self & 0xFF00) | u16::from(value);
    }

    #[inline(always)]
    fn set_msb(&mut self, value: u8) {
        *self = (*self & 0x00FF) | (u16::from(value) << 8);
    }

    #[inline]
    fn write_lanes(&mut self, upper: bool, lower: bool, value: u16) {
        if upper {
            self.set_msb(value.msb());
        }
        if lower {
            self.set_lsb(value.lsb());
        }
    }
}

#[inline]
#[must_use]
pub fn binary_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

#[inline]
#[must_use]
pub fn bcd_to_binary(value: u8) -> u8 {
    10 * (value >> 4) + (value & 0x0F)
}
