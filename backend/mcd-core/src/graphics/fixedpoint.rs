use std::ops::{Add, AddAssign};

const FRACT_BITS: u32 = 11;

// 13 integer bits + 11 fractional bits
const MASK: u32 = (1 << (13 + FRACT_BITS)) - 1;

/// 13.11 fixed point position on the stamp map. Arithmetic wraps at 24 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed(u32);

impl Fixed {
    /// Trace vector start positions are 13.3.
    pub fn from_position(word: u16) -> Self {
        Self(u32::from(word) << (FRACT_BITS - 3))
    }

    /// Trace vector deltas are signed 5.11.
    pub fn from_delta(word: u16) -> Self {
        Self((word as i16 as i32 as u32) & MASK)
    }

    pub fn whole(self) -> u32 {
        (self.0 & MASK) >> FRACT_BITS
    }
}

impl Add for Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_add(rhs.0) & MASK)
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
