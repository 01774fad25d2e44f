use super::*;
use crate::cddrive::testdisc::MemoryDisc;
use std::array;
use test_log::test;

struct Drive {
    cdd: Cdd,
    disc: DiscSlot,
    cdc: Cdc,
}

impl Drive {
    fn new() -> Self {
        let mut drive = Self::empty();
        drive.disc.insert(Box::new(MemoryDisc::new()));
        drive.cdd.disc_inserted();
        drive
    }

    fn empty() -> Self {
        let mut cdd = Cdd::new(1);
        cdd.write_control(0x04);
        Self { cdd, disc: DiscSlot::default(), cdc: Cdc::new() }
    }

    // Returns the number of sectors read
    fn run(&mut self, clocks: u32) -> u32 {
        let mut sectors = 0;
        for _ in 0..clocks {
            if self.cdd.clock(&mut self.disc, &mut self.cdc).unwrap() {
                sectors += 1;
            }
        }
        sectors
    }

    // Runs exactly `frames` sector boundaries, then finishes any status frame in flight
    fn run_frames(&mut self, frames: u32) -> u32 {
        let mut sectors = self.run(frames * u32::from(FRAME_CLOCKS));
        while self.cdd.status.receiving {
            sectors += self.run(1);
        }
        sectors
    }

    fn send(&mut self, payload: [u8; 9]) {
        let mut frame = [0; FRAME_NIBBLES];
        frame[..9].copy_from_slice(&payload);
        frame[9] = checksum(&frame);
        self.send_raw(frame);
    }

    fn send_raw(&mut self, frame: [u8; FRAME_NIBBLES]) {
        for (i, &nibble) in frame.iter().enumerate() {
            self.cdd.write_command_nibble(i, nibble);
        }
        self.cdd.send_command();
        self.run(12);
    }

    fn status(&self) -> [u8; FRAME_NIBBLES] {
        array::from_fn(|i| self.cdd.read_status_nibble(i))
    }

    fn read_toc(&mut self) {
        self.send([0x2, 0, 0, REPORT_TRACK_COUNT, 0, 0, 0, 0, 0]);
        self.run_frames(u32::from(TOC_READ_FRAMES) + 1);
        assert_eq!(self.cdd.io.status, DriveStatus::Pause);
    }
}

#[test]
fn checksum_detects_single_nibble_flips() {
    let payloads = [
        [0x0; 9],
        [0x1, 0x2, 0x3, 0x4, 0x5, 0x6, 0x7, 0x8, 0x9],
        [0xF; 9],
        [0x3, 0x0, 0x0, 0x0, 0x2, 0x0, 0x0, 0x0, 0x0],
    ];

    for payload in payloads {
        let mut frame = [0; FRAME_NIBBLES];
        frame[..9].copy_from_slice(&payload);
        frame[9] = checksum(&frame);
        assert!(valid(&frame), "{frame:X?}");

        for i in 0..FRAME_NIBBLES {
            for value in (0..16).filter(|&value| value != frame[i]) {
                let mut corrupted = frame;
                corrupted[i] = value;
                assert!(!valid(&corrupted), "{corrupted:X?}");
            }
        }
    }
}

#[test]
fn initial_status() {
    assert_eq!(Drive::new().cdd.io.status, DriveStatus::Stop);
    assert_eq!(Drive::empty().cdd.io.status, DriveStatus::NoDisc);
}

#[test]
fn status_frame_raises_irq() {
    let mut drive = Drive::new();
    drive.cdd.irq.enable = true;

    drive.run(u32::from(FRAME_CLOCKS));
    assert!(drive.cdd.status.receiving);
    assert!(!drive.cdd.irq.pending);

    drive.run(10);
    assert!(!drive.cdd.status.receiving);
    assert!(drive.cdd.irq.pending);
    assert_eq!(drive.status(), [0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0xF]);
}

#[test]
fn no_status_without_host_clock() {
    let mut drive = Drive::new();
    drive.cdd.irq.enable = true;
    drive.cdd.write_control(0x00);

    drive.run_frames(2);
    assert!(!drive.cdd.status.receiving);
    assert!(!drive.cdd.irq.pending);
    assert_eq!(drive.status(), [0; FRAME_NIBBLES]);
}

#[test]
fn play_from_stop_seeks_first() {
    let mut drive = Drive::new();

    drive.send([0x7, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::Seek);

    drive.run_frames(3);
    assert_eq!(drive.cdd.io.status, DriveStatus::Seek);

    let sectors = drive.run_frames(20);
    assert_eq!(drive.cdd.io.status, DriveStatus::Play);
    assert!(sectors > 0);
    assert_eq!(drive.status()[0], DriveStatus::Play as u8);
}

#[test]
fn seek_and_play_decodes_data_sectors() {
    let mut drive = Drive::new();
    drive.cdc.address = 10;
    drive.cdc.write(0xC0);

    drive.send([0x3, 0, 0, 0, 0, 0x2, 0, 0, 0]);
    drive.run_frames(20);
    assert_eq!(drive.cdd.io.status, DriveStatus::Play);
    assert!(!drive.cdd.playing_audio());
    assert!(drive.cdd.audio_sector().is_none());

    let header = drive.cdc.header;
    let time = CdTime::from_bcd_bytes([header.minutes, header.seconds, header.blocks]).unwrap();
    assert!(time >= CdTime::new_checked(0, 1, 72).unwrap(), "{time}");
    assert!(time < CdTime::new_checked(0, 2, 10).unwrap(), "{time}");
    assert_eq!(header.mode, 0x01);

    // CRCOK
    assert_eq!(drive.cdc.decoder.result, 0x80);
}

#[test]
fn audio_playback_reaches_disc_end() {
    let mut drive = Drive::new();

    drive.send([0x3, 0, 0, 0, 0x1, 0x9, 0x6, 0x0, 0]);
    drive.run_frames(16);
    assert_eq!(drive.cdd.io.status, DriveStatus::Play);
    assert!(drive.cdd.playing_audio());
    assert!(drive.cdd.audio_sector().is_some());
    assert_eq!(drive.cdd.read_control() & 0x0100, 0x0000);

    drive.run_frames(30);
    assert_eq!(drive.cdd.io.status, DriveStatus::DiscEnd);
    assert_eq!(drive.cdd.read_control() & 0x0100, 0x0100);
}

#[test]
fn tray_open_and_close() {
    let mut drive = Drive::new();

    drive.send([0xD, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::Tray);

    drive.run_frames(u32::from(TRAY_FRAMES) + 1);
    assert_eq!(drive.cdd.io.status, DriveStatus::Open);
    assert_eq!(drive.status()[1], REPORT_NOT_READY);

    // Disc commands are ignored while the tray is open
    drive.send([0x3, 0, 0, 0, 0, 0x2, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::Open);

    drive.send([0xC, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::Tray);

    drive.run_frames(u32::from(TRAY_FRAMES) + 1);
    assert_eq!(drive.cdd.io.status, DriveStatus::Stop);
}

#[test]
fn toc_read_reports_track_count() {
    let mut drive = Drive::new();

    drive.send([0x2, 0, 0, REPORT_TRACK_COUNT, 0, 0, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::TableOfContents);

    drive.run_frames(u32::from(TOC_READ_FRAMES) + 1);
    assert_eq!(drive.cdd.io.status, DriveStatus::Pause);

    let status = drive.status();
    assert_eq!(&status[..9], &[0x4, 0x4, 0x0, 0x1, 0x0, 0x2, 0x0, 0x0, 0x0]);
    assert!(valid(&status));
}

#[test]
fn track_start_reports() {
    let mut drive = Drive::new();
    drive.read_toc();

    drive.send([0x2, 0, 0, REPORT_TRACK_START, 0x0, 0x2, 0, 0, 0]);
    drive.run_frames(1);
    assert_eq!(&drive.status()[1..9], &[0x5, 0x0, 0x0, 0x1, 0x0, 0x0, 0x0, 0x2]);

    // Data tracks set bit 3 of the frames tens digit
    drive.send([0x2, 0, 0, REPORT_TRACK_START, 0x0, 0x1, 0, 0, 0]);
    drive.run_frames(1);
    assert_eq!(&drive.status()[1..9], &[0x5, 0x0, 0x0, 0x0, 0x0, 0x8, 0x0, 0x1]);
}

#[test]
fn track_skip() {
    let mut drive = Drive::new();
    drive.read_toc();

    drive.send([0xA, 0, 0, 0x0, 0x0, 0x0, 0x0, 0x1, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::TrackMove);

    drive.run_frames(TRACK_SKIP_FRAMES + 2);
    assert_eq!(drive.cdd.io.status, DriveStatus::Pause);

    drive.send([0x2, 0, 0, REPORT_ABSOLUTE_TIME, 0, 0, 0, 0, 0]);
    drive.run_frames(1);
    assert_eq!(&drive.status()[..8], &[0x4, 0x0, 0x0, 0x0, 0x1, 0x0, 0x0, 0x0]);
}

#[test]
fn checksum_error() {
    let mut drive = Drive::new();

    drive.send_raw([0x1, 0, 0, 0, 0, 0, 0, 0, 0, 0x0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::ChecksumError);

    drive.run_frames(1);
    assert_eq!(drive.status()[0], DriveStatus::ChecksumError as u8);

    drive.send([0x1, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::Stop);
}

#[test]
fn unrecognized_command() {
    let mut drive = Drive::new();
    drive.read_toc();

    drive.send([0x5, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::CommandError);

    drive.run_frames(1);
    assert_eq!(drive.status()[0], DriveStatus::CommandError as u8);
}

#[test]
fn invalid_seek_time() {
    let mut drive = Drive::new();

    drive.send([0x4, 0, 0, 0, 0, 0xA, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::FunctionError);
}

#[test]
fn commands_without_disc() {
    let mut drive = Drive::empty();

    drive.send([0x3, 0, 0, 0, 0, 0x2, 0, 0, 0]);
    assert_eq!(drive.cdd.io.status, DriveStatus::NoDisc);

    drive.run_frames(1);
    assert_eq!(&drive.status()[..2], &[DriveStatus::NoDisc as u8, REPORT_NOT_READY]);
}

#[test]
fn fader_register() {
    let mut cdd = Cdd::new(1);

    cdd.write_fader(0x7FFE);
    assert_eq!(cdd.fader.volume, 0x07FF);
    assert_eq!(cdd.fader.deemphasis, 0x3);
    assert!(cdd.fader.spindle_speed);
    assert_eq!(cdd.read_fader(), 0x7FFE);

    cdd.write_fader(0x4008);
    assert_eq!(cdd.fader.volume, 0x0400);
    assert_eq!(cdd.fader.deemphasis, 0x2);
    assert!(!cdd.fader.spindle_speed);
}
