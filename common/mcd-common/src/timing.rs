use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};

/// Timing mode of the console that the expansion unit is attached to. Only affects the ratio
/// between the console master clock and the expansion unit master clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum TimingMode {
    #[default]
    Ntsc,
    Pal,
}

impl TimingMode {
    pub const NTSC_MASTER_CLOCK_RATE: u64 = 53_693_175;
    pub const PAL_MASTER_CLOCK_RATE: u64 = 53_203_424;

    #[inline]
    #[must_use]
    pub fn master_clock_rate(self) -> u64 {
        match self {
            Self::Ntsc => Self::NTSC_MASTER_CLOCK_RATE,
            Self::Pal => Self::PAL_MASTER_CLOCK_RATE,
        }
    }
}

impl Display for TimingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ntsc => write!(f, "NTSC"),
            Self::Pal => write!(f, "PAL"),
        }
    }
}
