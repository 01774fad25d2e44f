//! Disc positions in minutes / seconds / frames

use bincode::{Decode, Encode};
use mcd_common::num::{bcd_to_binary, binary_to_bcd};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct CdTime {
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl CdTime {
    pub const ZERO: Self = Self { minutes: 0, seconds: 0, frames: 0 };
    pub const DISC_END: Self = Self { minutes: 60, seconds: 3, frames: 74 };

    pub const MAX_MINUTES: u8 = 100;
    pub const SECONDS_PER_MINUTE: u8 = 60;
    pub const FRAMES_PER_SECOND: u8 = 75;

    const FRAMES_PER_MINUTE: u32 = 60 * 75;
    const MAX_FRAMES: u32 = 100 * Self::FRAMES_PER_MINUTE - 1;

    #[must_use]
    pub fn new_checked(minutes: u8, seconds: u8, frames: u8) -> Option<Self> {
        (minutes < Self::MAX_MINUTES
            && seconds < Self::SECONDS_PER_MINUTE
            && frames < Self::FRAMES_PER_SECOND)
            .then_some(Self { minutes, seconds, frames })
    }

    #[must_use]
    pub fn to_frames(self) -> u32 {
        u32::from(self.minutes) * Self::FRAMES_PER_MINUTE
            + u32::from(self.seconds) * u32::from(Self::FRAMES_PER_SECOND)
            + u32::from(self.frames)
    }

    /// Values past 99:59:74 saturate.
    #[must_use]
    pub fn from_frames(frames: u32) -> Self {
        let frames = frames.min(Self::MAX_FRAMES);
        Self {
            minutes: (frames / Self::FRAMES_PER_MINUTE) as u8,
            seconds: ((frames / u32::from(Self::FRAMES_PER_SECOND))
                % u32::from(Self::SECONDS_PER_MINUTE)) as u8,
            frames: (frames % u32::from(Self::FRAMES_PER_SECOND)) as u8,
        }
    }

    #[must_use]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self::from_frames(self.to_frames().saturating_sub(rhs.to_frames()))
    }

    #[must_use]
    pub fn abs_diff(self, rhs: Self) -> u32 {
        self.to_frames().abs_diff(rhs.to_frames())
    }

    /// Parse a time from six BCD digits stored one per nibble (MM SS FF).
    #[must_use]
    pub fn from_digits(digits: &[u8]) -> Option<Self> {
        let &[m1, m0, s1, s0, f1, f0] = digits else { return None };
        if [m1, m0, s1, s0, f1, f0].iter().any(|&digit| digit > 9) {
            return None;
        }

        Self::new_checked(10 * m1 + m0, 10 * s1 + s0, 10 * f1 + f0)
    }

    /// Write the time as six BCD digits, one per nibble (MM SS FF).
    pub fn write_digits(self, out: &mut [u8]) {
        for (i, component) in [self.minutes, self.seconds, self.frames].into_iter().enumerate() {
            out[2 * i] = component / 10;
            out[2 * i + 1] = component % 10;
        }
    }

    /// Time as it appears in a sector header (packed BCD bytes).
    #[must_use]
    pub fn to_bcd_bytes(self) -> [u8; 3] {
        [binary_to_bcd(self.minutes), binary_to_bcd(self.seconds), binary_to_bcd(self.frames)]
    }

    #[must_use]
    pub fn from_bcd_bytes(bytes: [u8; 3]) -> Option<Self> {
        Self::new_checked(bcd_to_binary(bytes[0]), bcd_to_binary(bytes[1]), bcd_to_binary(bytes[2]))
    }
}

impl Add for CdTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::from_frames(self.to_frames() + rhs.to_frames())
    }
}

impl Sub for CdTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl PartialOrd for CdTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CdTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_frames().cmp(&other.to_frames())
    }
}

impl Display for CdTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.minutes, self.seconds, self.frames)
    }
}
