//! The CD drive mechanism (CDD) and the nibble-serial command/status protocol used to control it
//!
//! The host writes a 10-nibble command to $FF8042-$FF804B and triggers a send. The drive consumes
//! one nibble per exchange clock, executes the command, and on every 75 Hz sector boundary sends
//! back a 10-nibble status frame. The last nibble of each frame is a checksum.

use crate::api::{McdError, McdResult};
use crate::cddrive::cdc::Cdc;
use crate::cddrive::cdtime::CdTime;
use crate::cddrive::{Disc, DiscSlot, SectorBuffer, TrackType, BYTES_PER_SECTOR};
use crate::irq::Irq;
use bincode::{Decode, Encode};
use mcd_common::num::GetBit;
use mcd_common::BoxedByteArray;

// 44.1 kHz drive clocks per sector at 1x speed
pub const FRAME_CLOCKS: u16 = 588;

pub const FRAME_NIBBLES: usize = 10;

// All counts below are in 75 Hz sectors
const PLAY_DELAY_FRAMES: u8 = 6;
const TOC_READ_FRAMES: u8 = 10;
const TRAY_FRAMES: u8 = 75;
const MIN_SEEK_FRAMES: u32 = 7;
const FULL_SEEK_FRAMES: u32 = 113;
const TRACK_SKIP_FRAMES: u32 = 15;

const ONE_FRAME: CdTime = CdTime { minutes: 0, seconds: 0, frames: 1 };
const SCAN_STEP: CdTime = CdTime { minutes: 0, seconds: 1, frames: 25 };

// Seeks land slightly before the requested block so that the BIOS does not miss it
const SEEK_LEAD: CdTime = CdTime { minutes: 0, seconds: 0, frames: 3 };

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum DriveStatus {
    #[default]
    Stop = 0x0,
    Play = 0x1,
    Seek = 0x2,
    Scan = 0x3,
    Pause = 0x4,
    Open = 0x5,
    ChecksumError = 0x6,
    CommandError = 0x7,
    FunctionError = 0x8,
    TableOfContents = 0x9,
    TrackMove = 0xA,
    NoDisc = 0xB,
    DiscEnd = 0xC,
    Tray = 0xD,
    Test = 0xE,
}

// Second status nibble: what nibbles 2-8 contain
const REPORT_ABSOLUTE_TIME: u8 = 0x0;
const REPORT_RELATIVE_TIME: u8 = 0x1;
const REPORT_TRACK_NUMBER: u8 = 0x2;
const REPORT_DISC_LENGTH: u8 = 0x3;
const REPORT_TRACK_COUNT: u8 = 0x4;
const REPORT_TRACK_START: u8 = 0x5;
const REPORT_NOT_READY: u8 = 0xF;

/// Sum of the first 9 nibbles, inverted.
#[must_use]
pub fn checksum(frame: &[u8; FRAME_NIBBLES]) -> u8 {
    let sum =
        frame[..FRAME_NIBBLES - 1].iter().fold(0_u8, |sum, &nibble| sum.wrapping_add(nibble));
    !sum & 0x0F
}

#[must_use]
pub fn valid(frame: &[u8; FRAME_NIBBLES]) -> bool {
    checksum(frame) == frame[FRAME_NIBBLES - 1] & 0x0F
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
enum SeekEnd {
    Pause,
    Play,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
enum Mechanism {
    Stop,
    NoDisc,
    ReadingToc { frames: u8 },
    Seeking { current: CdTime, target: CdTime, then: SeekEnd, frames: u32 },
    PreparingToPlay { time: CdTime, frames: u8 },
    Playing(CdTime),
    Paused(CdTime),
    Scanning { time: CdTime, reverse: bool },
    TrackMove { target: CdTime, frames: u32 },
    DiscEnd(CdTime),
    TrayMoving { opening: bool, frames: u8 },
    TrayOpen,
    Error { status: DriveStatus, time: CdTime },
}

impl Mechanism {
    fn current_time(self) -> CdTime {
        match self {
            Self::Stop
            | Self::NoDisc
            | Self::ReadingToc { .. }
            | Self::TrayMoving { .. }
            | Self::TrayOpen => CdTime::ZERO,
            Self::Seeking { current: time, .. }
            | Self::PreparingToPlay { time, .. }
            | Self::Playing(time)
            | Self::Paused(time)
            | Self::Scanning { time, .. }
            | Self::TrackMove { target: time, .. }
            | Self::DiscEnd(time)
            | Self::Error { time, .. } => time,
        }
    }

    fn drive_status(self) -> DriveStatus {
        match self {
            Self::Stop => DriveStatus::Stop,
            Self::NoDisc => DriveStatus::NoDisc,
            Self::ReadingToc { .. } => DriveStatus::TableOfContents,
            Self::Seeking { .. } | Self::PreparingToPlay { .. } => DriveStatus::Seek,
            Self::Playing(..) => DriveStatus::Play,
            Self::Paused(..) => DriveStatus::Pause,
            Self::Scanning { .. } => DriveStatus::Scan,
            Self::TrackMove { .. } => DriveStatus::TrackMove,
            Self::DiscEnd(..) => DriveStatus::DiscEnd,
            Self::TrayMoving { .. } => DriveStatus::Tray,
            Self::TrayOpen => DriveStatus::Open,
            Self::Error { status, .. } => status,
        }
    }

    fn reports_position(self) -> bool {
        !matches!(
            self,
            Self::NoDisc
                | Self::ReadingToc { .. }
                | Self::Seeking { .. }
                | Self::TrackMove { .. }
                | Self::TrayMoving { .. }
                | Self::TrayOpen
        )
    }

    fn tray_open(self) -> bool {
        matches!(self, Self::TrayOpen | Self::TrayMoving { .. })
    }
}

/// $FF8034
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Fader {
    pub spindle_speed: bool,
    pub deemphasis: u8,
    pub volume: u16,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct CddIo {
    pub status: DriveStatus,
    // HOCK
    pub host_clock_enable: bool,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct StatusPort {
    // $FF8038-$FF8041
    pub nibbles: [u8; FRAME_NIBBLES],
    response: [u8; FRAME_NIBBLES],
    index: u8,
    pub receiving: bool,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct CommandPort {
    // $FF8042-$FF804B
    pub nibbles: [u8; FRAME_NIBBLES],
    latched: [u8; FRAME_NIBBLES],
    index: u8,
    pub sending: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Cdd {
    pub irq: Irq,
    pub counter: u16,
    elapsed: u16,
    pub fader: Fader,
    pub io: CddIo,
    pub status: StatusPort,
    pub command: CommandPort,
    state: Mechanism,
    report: u8,
    report_track: u8,
    data_speed: u8,
    reading_data: bool,
    sector: BoxedByteArray<BYTES_PER_SECTOR>,
}

impl Cdd {
    /// `data_speed` multiplies the sector rate while reading data tracks; 1 is accurate.
    #[must_use]
    pub fn new(data_speed: u8) -> Self {
        let mut cdd = Self {
            irq: Irq::default(),
            counter: 0,
            elapsed: 0,
            fader: Fader::default(),
            io: CddIo::default(),
            status: StatusPort::default(),
            command: CommandPort::default(),
            state: Mechanism::NoDisc,
            report: REPORT_ABSOLUTE_TIME,
            report_track: 0,
            data_speed: data_speed.clamp(1, 4),
            reading_data: false,
            sector: BoxedByteArray::new(),
        };
        cdd.sync_status();
        cdd
    }

    pub fn power(&mut self, disc_present: bool) {
        let irq_enable = self.irq.enable;
        *self = Self::new(self.data_speed);
        self.irq.enable = irq_enable;

        if disc_present {
            self.state = Mechanism::Stop;
            self.sync_status();
        }
    }

    pub fn disc_inserted(&mut self) {
        if !self.state.tray_open() {
            self.state = Mechanism::Stop;
            self.sync_status();
        }
    }

    pub fn disc_removed(&mut self) {
        if !self.state.tray_open() {
            self.state = Mechanism::NoDisc;
            self.sync_status();
        }
    }

    pub fn set_data_speed(&mut self, data_speed: u8) {
        self.data_speed = data_speed.clamp(1, 4);
    }

    #[must_use]
    pub fn playing_audio(&self) -> bool {
        matches!(self.state, Mechanism::Playing(_)) && !self.reading_data
    }

    /// Most recently read sector, while the drive is playing an audio track.
    #[must_use]
    pub fn audio_sector(&self) -> Option<&SectorBuffer> {
        self.playing_audio().then_some(&*self.sector)
    }

    fn frame_clocks(&self) -> u16 {
        if self.reading_data && matches!(self.state, Mechanism::Playing(_)) {
            FRAME_CLOCKS / u16::from(self.data_speed)
        } else {
            FRAME_CLOCKS
        }
    }

    fn sync_status(&mut self) {
        let status = self.state.drive_status();
        if status != self.io.status {
            log::debug!("CDD status changed from {:?} to {status:?}", self.io.status);
            self.io.status = status;
        }
    }

    /// Clocked at 44.1 kHz. Returns whether a sector (and its subcode block) was read.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the disc fails.
    pub fn clock(&mut self, disc: &mut DiscSlot, cdc: &mut Cdc) -> McdResult<bool> {
        self.elapsed = self.elapsed.saturating_add(1);
        self.counter = self.counter.saturating_sub(1);
        if self.counter != 0 {
            return Ok(false);
        }

        let sector_read = self.process(disc, cdc)?;

        self.counter = if self.command.sending || self.status.receiving {
            1
        } else {
            self.frame_clocks().saturating_sub(self.elapsed).max(1)
        };

        Ok(sector_read)
    }

    fn process(&mut self, disc: &mut DiscSlot, cdc: &mut Cdc) -> McdResult<bool> {
        if self.elapsed >= self.frame_clocks() {
            self.elapsed = 0;
            let sector_read = self.advance(disc, cdc)?;
            self.begin_response(disc.get());
            return Ok(sector_read);
        }

        if self.command.sending {
            let index = usize::from(self.command.index);
            self.command.latched[index] = self.command.nibbles[index] & 0x0F;
            self.command.index += 1;

            if usize::from(self.command.index) == FRAME_NIBBLES {
                self.command.sending = false;
                self.execute(disc);
            }
        } else if self.status.receiving {
            let index = usize::from(self.status.index);
            self.status.nibbles[index] = self.status.response[index];
            self.status.index += 1;

            if usize::from(self.status.index) == FRAME_NIBBLES {
                self.status.receiving = false;
                if self.io.host_clock_enable {
                    self.irq.raise();
                }
            }
        }

        Ok(false)
    }

    // Moves the mechanism forward by one sector
    fn advance(&mut self, disc: &mut DiscSlot, cdc: &mut Cdc) -> McdResult<bool> {
        let mut sector_read = false;

        let state = self.state;
        self.state = match state {
            Mechanism::ReadingToc { frames } => {
                if frames <= 1 {
                    Mechanism::Paused(CdTime::ZERO)
                } else {
                    Mechanism::ReadingToc { frames: frames - 1 }
                }
            }
            Mechanism::Seeking { current, target, then, frames } => {
                if frames <= 1 {
                    log::trace!("Seek to {target} complete");
                    match then {
                        SeekEnd::Pause => Mechanism::Paused(target),
                        SeekEnd::Play => {
                            Mechanism::PreparingToPlay { time: target, frames: PLAY_DELAY_FRAMES }
                        }
                    }
                } else {
                    // Approximate the head position from the remaining seek time
                    let remaining = (frames - 1) * CdTime::DISC_END.to_frames() / FULL_SEEK_FRAMES;
                    let distance = CdTime::from_frames(remaining.min(current.abs_diff(target)));
                    let current =
                        if current < target { target - distance } else { target + distance };
                    Mechanism::Seeking { current, target, then, frames: frames - 1 }
                }
            }
            Mechanism::PreparingToPlay { time, frames } => {
                if frames <= 1 {
                    log::trace!("Beginning to play at {time}");
                    Mechanism::Playing(time)
                } else {
                    Mechanism::PreparingToPlay { time, frames: frames - 1 }
                }
            }
            Mechanism::Playing(time) => match disc.get_mut() {
                None => Mechanism::NoDisc,
                Some(disc) if time >= disc.lead_out() => Mechanism::DiscEnd(time),
                Some(disc) => {
                    self.read_sector(disc, time, cdc)?;
                    sector_read = true;
                    Mechanism::Playing(time + ONE_FRAME)
                }
            },
            Mechanism::Scanning { time, reverse } => {
                let lead_out = disc.get().map_or(CdTime::ZERO, |disc| disc.lead_out());
                let time = if reverse { time - SCAN_STEP } else { time + SCAN_STEP };
                if time >= lead_out {
                    Mechanism::DiscEnd(lead_out)
                } else {
                    Mechanism::Scanning { time, reverse }
                }
            }
            Mechanism::TrackMove { target, frames } => {
                if frames <= 1 {
                    Mechanism::Paused(target)
                } else {
                    Mechanism::TrackMove { target, frames: frames - 1 }
                }
            }
            Mechanism::TrayMoving { opening, frames } => {
                if frames > 1 {
                    Mechanism::TrayMoving { opening, frames: frames - 1 }
                } else if opening {
                    Mechanism::TrayOpen
                } else if disc.is_present() {
                    Mechanism::Stop
                } else {
                    Mechanism::NoDisc
                }
            }
            state @ (Mechanism::Stop
            | Mechanism::NoDisc
            | Mechanism::Paused(_)
            | Mechanism::DiscEnd(_)
            | Mechanism::TrayOpen
            | Mechanism::Error { .. }) => state,
        };

        self.sync_status();

        Ok(sector_read)
    }

    fn read_sector(&mut self, disc: &mut dyn Disc, time: CdTime, cdc: &mut Cdc) -> McdResult<()> {
        let track_type = disc
            .find_track(time)
            .or_else(|| disc.track(1))
            .map_or(TrackType::Data, |track| track.track_type);

        disc.read_sector(time, &mut self.sector).map_err(McdError::DiscRead)?;

        self.reading_data = track_type == TrackType::Data;
        if self.reading_data {
            cdc.decode(&self.sector);
        }

        Ok(())
    }

    fn begin_response(&mut self, disc: Option<&dyn Disc>) {
        if !self.io.host_clock_enable {
            return;
        }

        let mut response = [0; FRAME_NIBBLES];
        response[0] = self.io.status as u8;
        match disc {
            Some(disc) if self.state.reports_position() => {
                response[1] = self.report;
                self.write_report(disc, &mut response);
            }
            _ => response[1] = REPORT_NOT_READY,
        }
        response[9] = checksum(&response);

        self.status.response = response;
        self.status.index = 0;
        self.status.receiving = true;
    }

    fn write_report(&self, disc: &dyn Disc, response: &mut [u8; FRAME_NIBBLES]) {
        let time = self.state.current_time();

        match self.report {
            REPORT_ABSOLUTE_TIME => time.write_digits(&mut response[2..8]),
            REPORT_RELATIVE_TIME => {
                let relative =
                    disc.find_track(time).map_or(CdTime::ZERO, |track| time - track.start_time);
                relative.write_digits(&mut response[2..8]);
            }
            REPORT_TRACK_NUMBER => {
                let number =
                    disc.find_track(time).map_or(disc.last_track_number(), |track| track.number);
                response[2] = number / 10;
                response[3] = number % 10;
            }
            REPORT_DISC_LENGTH => disc.lead_out().write_digits(&mut response[2..8]),
            REPORT_TRACK_COUNT => {
                let last = disc.last_track_number();
                response[2] = 0;
                response[3] = 1;
                response[4] = last / 10;
                response[5] = last % 10;
            }
            REPORT_TRACK_START => {
                if let Some(track) = disc.track(self.report_track) {
                    track.start_time.write_digits(&mut response[2..8]);
                    if track.track_type == TrackType::Data {
                        response[6] |= 0x08;
                    }
                    response[8] = track.number & 0x0F;
                }
            }
            _ => {}
        }
    }

    fn execute(&mut self, disc: &DiscSlot) {
        let command = self.command.latched;
        log::trace!("CDD command: {command:X?}");

        if !valid(&command) {
            log::debug!("CDD command checksum mismatch: {command:X?}");
            self.state = Mechanism::Error {
                status: DriveStatus::ChecksumError,
                time: self.state.current_time(),
            };
            self.sync_status();
            return;
        }

        if self.state.tray_open() && !matches!(command[0], 0x0 | 0xC | 0xD) {
            log::debug!("CDD command {:X} ignored while the tray is open", command[0]);
            return;
        }

        match (command[0], disc.get()) {
            (0x0, _) => {}
            (0x1, Some(_)) => self.state = Mechanism::Stop,
            (0x2, disc) => self.request_report(command, disc),
            (0x3, Some(disc)) => self.seek(command, SeekEnd::Play, disc),
            (0x4, Some(disc)) => self.seek(command, SeekEnd::Pause, disc),
            (0x6, Some(_)) => self.state = Mechanism::Paused(self.state.current_time()),
            (0x7, Some(disc)) => self.play(disc),
            (0x8 | 0x9, Some(_)) => {
                let time = self.state.current_time();
                self.state = Mechanism::Scanning { time, reverse: command[0] == 0x9 };
            }
            (0xA, Some(disc)) => self.skip_tracks(command, disc),
            (0xB, Some(disc)) => self.cue_track(command, disc),
            (0xC, _) => {
                if self.state.tray_open() {
                    self.state = Mechanism::TrayMoving { opening: false, frames: TRAY_FRAMES };
                }
            }
            (0xD, _) => {
                if self.state != Mechanism::TrayOpen {
                    self.state = Mechanism::TrayMoving { opening: true, frames: TRAY_FRAMES };
                }
            }
            (0x1 | 0x3 | 0x4 | 0x6 | 0x7 | 0x8 | 0x9 | 0xA | 0xB, None) => {
                self.state = Mechanism::NoDisc;
            }
            (code, _) => {
                log::debug!("Unrecognized CDD command {code:X}");
                self.state = Mechanism::Error {
                    status: DriveStatus::CommandError,
                    time: self.state.current_time(),
                };
            }
        }

        self.sync_status();
    }

    fn function_error(&mut self) {
        let time = self.state.current_time();
        self.state = Mechanism::Error { status: DriveStatus::FunctionError, time };
    }

    fn request_report(&mut self, command: [u8; FRAME_NIBBLES], disc: Option<&dyn Disc>) {
        if command[3] > REPORT_TRACK_START {
            log::debug!("Unsupported CDD report type {:X}", command[3]);
            self.function_error();
            return;
        }

        self.report = command[3];
        if self.report == REPORT_TRACK_START {
            self.report_track = 10 * command[4] + command[5];
        }

        match (self.state, disc) {
            (_, None) => self.state = Mechanism::NoDisc,
            (Mechanism::Stop, Some(_)) => {
                self.state = Mechanism::ReadingToc { frames: TOC_READ_FRAMES };
            }
            _ => {}
        }
    }

    fn seek(&mut self, command: [u8; FRAME_NIBBLES], then: SeekEnd, disc: &dyn Disc) {
        let Some(requested) = CdTime::from_digits(&command[2..8]) else {
            log::debug!("Invalid CDD seek time: {:X?}", &command[2..8]);
            self.function_error();
            return;
        };

        let target = requested.saturating_sub(SEEK_LEAD).min(disc.lead_out());
        let current = self.state.current_time();
        let frames = seek_frames(current, target);

        log::trace!("Seeking from {current} to {target}; estimated {frames} sectors");

        self.state = Mechanism::Seeking { current, target, then, frames };
    }

    fn play(&mut self, disc: &dyn Disc) {
        self.state = match self.state {
            Mechanism::Stop | Mechanism::ReadingToc { .. } => {
                let target = disc.track(1).map_or(CdTime::ZERO, |track| track.start_time);
                Mechanism::Seeking {
                    current: CdTime::ZERO,
                    target,
                    then: SeekEnd::Play,
                    frames: seek_frames(CdTime::ZERO, target),
                }
            }
            Mechanism::Seeking { current, target, frames, .. } => {
                Mechanism::Seeking { current, target, then: SeekEnd::Play, frames }
            }
            state @ (Mechanism::Playing(_) | Mechanism::PreparingToPlay { .. }) => state,
            state => Mechanism::PreparingToPlay {
                time: state.current_time(),
                frames: PLAY_DELAY_FRAMES,
            },
        };
    }

    fn skip_tracks(&mut self, command: [u8; FRAME_NIBBLES], disc: &dyn Disc) {
        let count =
            command[4..8].iter().fold(0_u32, |count, &nibble| (count << 4) | u32::from(nibble));
        let reverse = command[3] != 0;

        let current = disc.find_track(self.state.current_time()).map_or(1, |track| track.number);
        let last = disc.last_track_number().max(1);
        let skipped = count.min(u32::from(u8::MAX)) as u8;
        let number = if reverse {
            current.saturating_sub(skipped).max(1)
        } else {
            current.saturating_add(skipped).min(last)
        };

        let target = disc.track(number).map_or(CdTime::ZERO, |track| track.start_time);
        let frames = (count * TRACK_SKIP_FRAMES).max(1);
        self.state = Mechanism::TrackMove { target, frames };
    }

    fn cue_track(&mut self, command: [u8; FRAME_NIBBLES], disc: &dyn Disc) {
        let number = 10 * command[2] + command[3];
        let Some(track) = disc.track(number) else {
            log::debug!("CDD track cue to nonexistent track {number}");
            self.function_error();
            return;
        };

        let target = track.start_time;
        self.state =
            Mechanism::TrackMove { target, frames: seek_frames(self.state.current_time(), target) };
    }

    /// $FF8034
    #[must_use]
    pub fn read_fader(&self) -> u16 {
        (self.fader.volume << 4)
            | (u16::from(self.fader.deemphasis) << 2)
            | (u16::from(self.fader.spindle_speed) << 1)
    }

    pub fn write_fader(&mut self, value: u16) {
        self.fader.spindle_speed = value.bit(1);
        self.fader.deemphasis = ((value >> 2) & 0x03) as u8;
        self.fader.volume = (value >> 4) & 0x07FF;

        log::trace!("CDD fader write: {:?}", self.fader);
    }

    /// $FF8036
    #[must_use]
    pub fn read_control(&self) -> u16 {
        (u16::from(!self.playing_audio()) << 8) | (u16::from(self.io.host_clock_enable) << 2)
    }

    /// $FF8037
    pub fn write_control(&mut self, value: u8) {
        let enable = value.bit(2);
        if enable != self.io.host_clock_enable {
            log::debug!("CDD host clock {}", if enable { "enabled" } else { "disabled" });
        }

        self.io.host_clock_enable = enable;
        if !enable {
            self.irq.lower();
        }
    }

    #[must_use]
    pub fn read_status_nibble(&self, index: usize) -> u8 {
        self.status.nibbles[index]
    }

    #[must_use]
    pub fn read_command_nibble(&self, index: usize) -> u8 {
        self.command.nibbles[index]
    }

    pub fn write_command_nibble(&mut self, index: usize, value: u8) {
        self.command.nibbles[index] = value & 0x0F;
    }

    /// Start clocking the command registers out to the drive.
    pub fn send_command(&mut self) {
        log::trace!("CDD command send: {:X?}", self.command.nibbles);

        self.command.sending = true;
        self.command.index = 0;
        self.counter = 1;
    }
}

// Roughly 113 sectors to traverse the whole disc
fn seek_frames(from: CdTime, to: CdTime) -> u32 {
    let distance = from.abs_diff(to);
    (FULL_SEEK_FRAMES * distance / CdTime::DISC_END.to_frames()).max(MIN_SEEK_FRAMES)
}

#[cfg(test)]
mod tests;
