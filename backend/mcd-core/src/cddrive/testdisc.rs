use crate::cddrive::cdtime::CdTime;
use crate::cddrive::{Disc, SectorBuffer, Track, TrackType};
use crc::Crc;
use std::io;

const CD_ROM_EDC: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_CD_ROM_EDC);

/// Two-track disc generated on the fly: a Mode 1 data track followed by an audio track.
#[derive(Debug)]
pub(crate) struct MemoryDisc {
    tracks: Vec<Track>,
    pub reads: Vec<CdTime>,
}

impl MemoryDisc {
    pub(crate) const DATA_END: CdTime = CdTime { minutes: 0, seconds: 10, frames: 0 };
    pub(crate) const LEAD_OUT: CdTime = CdTime { minutes: 0, seconds: 20, frames: 0 };

    pub(crate) fn new() -> Self {
        Self {
            tracks: vec![
                Track {
                    number: 1,
                    track_type: TrackType::Data,
                    start_time: CdTime::ZERO,
                    end_time: Self::DATA_END,
                },
                Track {
                    number: 2,
                    track_type: TrackType::Audio,
                    start_time: Self::DATA_END,
                    end_time: Self::LEAD_OUT,
                },
            ],
            reads: Vec::new(),
        }
    }
}

impl Disc for MemoryDisc {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn read_sector(&mut self, time: CdTime, out: &mut SectorBuffer) -> io::Result<()> {
        if time >= Self::LEAD_OUT {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read past lead-out at {time}"),
            ));
        }

        self.reads.push(time);

        if time >= Self::DATA_END {
            out.fill(time.frames);
            return Ok(());
        }

        out.fill(0);
        out[1..11].fill(0xFF);
        out[12..15].copy_from_slice(&time.to_bcd_bytes());
        out[15] = 0x01;
        out[16..2064].fill(time.seconds);
        let edc = CD_ROM_EDC.checksum(&out[0..2064]);
        out[2064..2068].copy_from_slice(&edc.to_le_bytes());

        Ok(())
    }
}
