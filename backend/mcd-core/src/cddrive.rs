//! CD-ROM subsystem: the LC8951 controller (CDC), the drive mechanism (CDD), and the boundary to
//! the disc image supplied by the host

pub mod cdc;
pub mod cdd;
pub mod cdtime;

#[cfg(test)]
pub(crate) mod testdisc;

use crate::cddrive::cdtime::CdTime;
use crate::macros::impl_skip_serialization;
use std::fmt::Debug;
use std::io;

pub const BYTES_PER_SECTOR: usize = 2352;

pub type SectorBuffer = [u8; BYTES_PER_SECTOR];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Data,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    pub number: u8,
    pub track_type: TrackType,
    pub start_time: CdTime,
    pub end_time: CdTime,
}

impl Track {
    #[must_use]
    pub fn contains(&self, time: CdTime) -> bool {
        (self.start_time..self.end_time).contains(&time)
    }
}

/// A mounted disc image. Parsing and mounting image files is the host's responsibility; the drive
/// only needs the table of contents and raw 2352-byte sectors.
///
/// All times are absolute disc times as reported by the drive, starting from 00:00:00.
pub trait Disc: Debug + Send {
    /// Tracks in ascending order, numbered from 1.
    fn tracks(&self) -> &[Track];

    /// Read the raw sector at the given absolute time, including the 12-byte sync pattern.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error from the underlying image.
    fn read_sector(&mut self, time: CdTime, out: &mut SectorBuffer) -> io::Result<()>;

    fn find_track(&self, time: CdTime) -> Option<&Track> {
        self.tracks().iter().find(|track| track.contains(time))
    }

    fn track(&self, number: u8) -> Option<&Track> {
        self.tracks().iter().find(|track| track.number == number)
    }

    fn last_track_number(&self) -> u8 {
        self.tracks().last().map_or(0, |track| track.number)
    }

    fn lead_out(&self) -> CdTime {
        self.tracks().last().map_or(CdTime::ZERO, |track| track.end_time)
    }
}

/// Holder for the mounted disc. Not part of save states; the disc is carried over from the running
/// instance when a state is loaded.
#[derive(Debug, Default)]
pub struct DiscSlot(Option<Box<dyn Disc>>);

impl_skip_serialization!(DiscSlot);

impl DiscSlot {
    pub fn insert(&mut self, disc: Box<dyn Disc>) {
        self.0 = Some(disc);
    }

    pub fn take(&mut self) -> Option<Box<dyn Disc>> {
        self.0.take()
    }

    #[must_use]
    pub fn get(&self) -> Option<&dyn Disc> {
        self.0.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut (dyn Disc + 'static)> {
        self.0.as_deref_mut()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

pub(crate) const CD_SAMPLE_RATE: u64 = 44_100;

/// Converts sub CPU cycles into 44.1 kHz drive clocks.
pub(crate) fn drive_clocks(product: &mut u32, sub_cpu_cycles: u64) -> u32 {
    let sub_cpu_frequency = crate::api::SUB_CPU_FREQUENCY;

    let mut total = u64::from(*product) + sub_cpu_cycles * CD_SAMPLE_RATE;
    let clocks = total / sub_cpu_frequency;
    total %= sub_cpu_frequency;
    *product = total as u32;

    clocks as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn drive_clock_rate() {
        let cycles = crate::api::SUB_CPU_FREQUENCY / 1000;
        let mut product = 0;
        let clocks: u32 = (0..1000).map(|_| drive_clocks(&mut product, cycles)).sum();
        assert_eq!(clocks, 44_100);
        assert_eq!(product, 0);
    }
}
