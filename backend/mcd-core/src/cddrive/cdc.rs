//! The LC8951, which Sega documentation calls the CDC. It decodes sectors delivered by the drive
//! into a 16KB buffer and transfers buffered data to the host CPUs or to RAM.


use crate::cddrive::{SectorBuffer, BYTES_PER_SECTOR};
use crate::irq::Irq;
use crate::memory::wordram::WordRamControl;
use crate::rf5c164::Rf5c164;
use bincode::{Decode, Encode};
use crc::Crc;
use mcd_common::num::GetBit;
use mcd_common::BoxedByteArray;

const BUFFER_RAM_LEN: usize = 16 * 1024;
const BUFFER_ADDRESS_MASK: u16 = (1 << 14) - 1;

// Sync pattern is the first 12 bytes of every sector; the header follows
const HEADER_OFFSET: u16 = 12;

const DMA_BYTES_PER_CLOCK: u32 = 8;

const FIFO_LEN: u8 = 8;

const CD_ROM_EDC: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_CD_ROM_EDC);

// STAT0 bits
const CRCOK: u8 = 1 << 7;
const UCEBLK: u8 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum Destination {
    #[default]
    MainCpuRegister,
    SubCpuRegister,
    Pcm,
    PrgRam,
    WordRam,
}

impl Destination {
    #[must_use]
    pub fn to_bits(self) -> u8 {
        match self {
            Self::MainCpuRegister => 0b010,
            Self::SubCpuRegister => 0b011,
            Self::Pcm => 0b100,
            Self::PrgRam => 0b101,
            Self::WordRam => 0b111,
        }
    }

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0b010 => Self::MainCpuRegister,
            0b011 => Self::SubCpuRegister,
            0b100 => Self::Pcm,
            0b101 => Self::PrgRam,
            0b111 => Self::WordRam,
            prohibited => {
                log::warn!("Prohibited CDC destination set: {prohibited:03b}");
                Self::MainCpuRegister
            }
        }
    }

    fn is_dma(self) -> bool {
        matches!(self, Self::Pcm | Self::PrgRam | Self::WordRam)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    MainCpu,
    SubCpu,
}

/// 8-slot byte FIFO. Only `empty` is stored; the FIFO is full when advancing the write cursor would
/// make it equal to the read cursor.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Fifo {
    data: [u8; FIFO_LEN as usize],
    read: u8,
    write: u8,
    empty: bool,
}

impl Default for Fifo {
    fn default() -> Self {
        Self::new()
    }
}

impl Fifo {
    #[must_use]
    pub fn new() -> Self {
        Self { data: [0; FIFO_LEN as usize], read: 0, write: 0, empty: true }
    }

    #[must_use]
    pub fn empty(&self) -> bool {
        self.empty
    }

    #[must_use]
    pub fn full(&self) -> bool {
        (self.write + 1) % FIFO_LEN == self.read
    }

    #[must_use]
    pub fn len(&self) -> u8 {
        self.write.wrapping_sub(self.read) % FIFO_LEN
    }

    /// Returns false and leaves the FIFO unchanged if it is full.
    pub fn push(&mut self, value: u8) -> bool {
        if self.full() {
            return false;
        }

        self.data[self.write as usize] = value;
        self.write = (self.write + 1) % FIFO_LEN;
        self.empty = false;
        true
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.empty {
            return None;
        }

        let value = self.data[self.read as usize];
        self.read = (self.read + 1) % FIFO_LEN;
        self.empty = self.read == self.write;
        Some(value)
    }

    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.empty = true;
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct StatusPort {
    pub fifo: Fifo,
    // SOUTEN
    pub enable: bool,
    // STEN
    pub active: bool,
    // STBSY
    pub busy: bool,
    // STWAI
    pub wait: bool,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Transfer {
    // DAC
    pub source: u16,
    // Destination byte address, from the DMA address register
    pub target: u32,
    // PT
    pub pointer: u16,
    // DBC; number of bytes minus one
    pub length: u16,
    // DOUTEN
    pub enable: bool,
    // DTEN
    pub active: bool,
    // DTBSY
    pub busy: bool,
    // Destination not ready; the transfer is stalled
    pub wait: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum SectorMode {
    #[default]
    Mode1,
    Mode2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum SectorForm {
    #[default]
    Form1,
    Form2,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Decoder {
    // DECEN
    pub enable: bool,
    pub mode: SectorMode,
    pub form: SectorForm,
    // WA
    pub write_address: u16,
    // STAT0 of the most recently decoded block
    pub result: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Header {
    pub minutes: u8,
    pub seconds: u8,
    pub blocks: u8,
    pub mode: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self { minutes: 0, seconds: 0, blocks: 0, mode: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Subheader {
    pub file: u8,
    pub channel: u8,
    pub submode: u8,
    pub coding: u8,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Control {
    // SHDREN: false = header registers show the header, true = the subheader
    pub head: bool,
    // MODRQ
    pub mode: bool,
    // FORMRQ
    pub form: bool,
    // CMDBK
    pub command_break: bool,
    // MBCKRQ
    pub mode_byte_check: bool,
    // ERAMRQ
    pub erasure_request: bool,
    // WRRQ
    pub write_request: bool,
    // PRQ
    pub p_code_correction: bool,
    // QRQ
    pub q_code_correction: bool,
    // AUTORQ
    pub auto_correction: bool,
    // E01RQ
    pub error_correction: bool,
    // EDCRQ
    pub edc_correction: bool,
    // COWREN
    pub correction_write: bool,
    // DSCREN
    pub descramble: bool,
    // SYDEN
    pub sync_detection: bool,
    // SYIEN
    pub sync_interrupt: bool,
    // ERAMSL
    pub erasure_correction: bool,
    // STENTRG
    pub status_trigger: bool,
    // STENCTL
    pub status_control: bool,
}

/// The three CDC interrupt sources share sub CPU interrupt level 5. `line` carries the level 5
/// mask bit and the combined output.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct CdcIrq {
    pub line: Irq,
    // DECIEN + DECI
    pub decoder: Irq,
    // DTEIEN + DTEI
    pub transfer: Irq,
    // CMDIEN + CMDI
    pub command: Irq,
}

impl CdcIrq {
    fn new() -> Self {
        Self {
            line: Irq::default(),
            decoder: Irq::enabled(),
            transfer: Irq::enabled(),
            command: Irq::default(),
        }
    }
}

/// Memories that CDC DMA can write to.
pub struct DmaArgs<'a> {
    pub prg_ram: &'a mut [u8],
    pub word_ram: &'a mut [u8],
    pub word_ram_control: &'a WordRamControl,
    pub pcm: &'a mut Rf5c164,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Cdc {
    pub dsr: bool,
    pub edt: bool,
    pub address: u8,
    pub destination: Destination,
    pub stopwatch: u16,
    pub irq: CdcIrq,
    pub command: Fifo,
    pub status: StatusPort,
    pub transfer: Transfer,
    pub decoder: Decoder,
    pub header: Header,
    pub subheader: Subheader,
    pub control: Control,
    buffer: BoxedByteArray<BUFFER_RAM_LEN>,
}

impl Default for Cdc {
    fn default() -> Self {
        Self::new()
    }
}

impl Cdc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dsr: false,
            edt: false,
            address: 0,
            destination: Destination::default(),
            stopwatch: 0,
            irq: CdcIrq::new(),
            command: Fifo::new(),
            status: StatusPort::default(),
            transfer: Transfer::default(),
            decoder: Decoder::default(),
            header: Header::default(),
            subheader: Subheader::default(),
            control: Control::default(),
            buffer: BoxedByteArray::new(),
        }
    }

    /// Re-evaluate the status/transfer flags and the combined interrupt output. Returns whether the
    /// interrupt output changed.
    pub fn poll(&mut self) -> bool {
        self.status.active = !self.status.fifo.empty();
        self.status.busy = self.status.active && self.status.wait;

        let active =
            self.irq.decoder.output() || self.irq.transfer.output() || self.irq.command.output();
        if active { self.irq.line.raise() } else { self.irq.line.lower() }
    }

    /// Clocked once every 384 sub CPU cycles. Returns whether the interrupt output changed.
    pub fn clock(&mut self, dma: DmaArgs<'_>) -> bool {
        self.stopwatch = (self.stopwatch + 1) & 0x0FFF;

        if !self.control.command_break {
            if let Some(command) = self.command.pop() {
                log::trace!("CDC consumed command byte {command:02X}");
                if self.command.empty() {
                    self.irq.command.raise();
                }
            }
        }

        if self.transfer.active && self.destination.is_dma() {
            self.progress_dma(dma);
        }

        self.poll()
    }

    fn progress_dma(&mut self, dma: DmaArgs<'_>) {
        self.transfer.wait = self.destination == Destination::WordRam
            && !dma.word_ram_control.sub_cpu_can_dma();
        if self.transfer.wait {
            return;
        }

        for _ in 0..DMA_BYTES_PER_CLOCK {
            let byte = self.buffer[(self.transfer.source & BUFFER_ADDRESS_MASK) as usize];

            match self.destination {
                Destination::Pcm => {
                    // PCM RAM is on odd bytes only; the DMA address counts bus bytes
                    dma.pcm.dma_write((self.transfer.target >> 1) & 0x0FFF, byte);
                    self.transfer.target = self.transfer.target.wrapping_add(2);
                }
                Destination::PrgRam => {
                    let address = self.transfer.target as usize & (dma.prg_ram.len() - 1);
                    dma.prg_ram[address] = byte;
                    self.transfer.target = self.transfer.target.wrapping_add(1);
                }
                Destination::WordRam => {
                    dma.word_ram_control.dma_write(dma.word_ram, self.transfer.target, byte);
                    self.transfer.target = self.transfer.target.wrapping_add(1);
                }
                Destination::MainCpuRegister | Destination::SubCpuRegister => {
                    unreachable!("register destinations are not DMA")
                }
            }

            self.transfer.source = self.transfer.source.wrapping_add(1) & BUFFER_ADDRESS_MASK;
            if self.consume_transfer_bytes(1) {
                break;
            }
        }
    }

    // Returns true if the transfer finished
    fn consume_transfer_bytes(&mut self, bytes: u16) -> bool {
        if self.transfer.length < bytes {
            self.finish_transfer();
            return true;
        }

        self.transfer.length -= bytes;
        false
    }

    fn finish_transfer(&mut self) {
        log::trace!("CDC transfer to {:?} complete", self.destination);

        self.transfer.length = 0x0FFF;
        self.transfer.active = false;
        self.transfer.busy = false;
        self.transfer.wait = false;
        self.dsr = false;
        self.edt = true;
        self.irq.transfer.raise();
    }

    fn start_transfer(&mut self) {
        if !self.transfer.enable {
            log::debug!("CDC DTTRG written while DOUTEN=0; ignoring");
            return;
        }

        log::trace!(
            "CDC transfer started: destination={:?}, DAC={:04X}, DBC={:03X}, target={:05X}",
            self.destination,
            self.transfer.source,
            self.transfer.length,
            self.transfer.target
        );

        self.transfer.active = true;
        self.transfer.busy = true;
        self.transfer.wait = false;
        self.edt = false;
        self.dsr = !self.destination.is_dma();
    }

    fn abort_transfer(&mut self) {
        self.transfer.active = false;
        self.transfer.busy = false;
        self.transfer.wait = false;
        self.dsr = false;
    }

    /// Word read from the host data register ($A12008 / $FF8008).
    pub fn read_host_data(&mut self, host: Host) -> u16 {
        let expected = match host {
            Host::MainCpu => Destination::MainCpuRegister,
            Host::SubCpu => Destination::SubCpuRegister,
        };
        if self.destination != expected || !self.dsr {
            log::debug!("Host data read by {host:?} with no data ready");
            return 0x0000;
        }

        let source = self.transfer.source & BUFFER_ADDRESS_MASK;
        let word = u16::from_be_bytes([
            self.buffer[source as usize],
            self.buffer[((source + 1) & BUFFER_ADDRESS_MASK) as usize],
        ]);
        self.transfer.source = (source + 2) & BUFFER_ADDRESS_MASK;
        self.consume_transfer_bytes(2);

        word
    }

    pub fn set_destination(&mut self, destination: Destination) {
        log::trace!("CDC destination set to {destination:?}");

        // Writing the destination terminates any transfer in progress
        self.destination = destination;
        self.abort_transfer();
        self.edt = false;
    }

    pub fn set_dma_address(&mut self, value: u16) {
        self.transfer.target = u32::from(value) << 3;
    }

    #[must_use]
    pub fn dma_address(&self) -> u16 {
        (self.transfer.target >> 3) as u16
    }

    fn increment_address(&mut self) {
        // Register address automatically increments on each access when it is not 0
        if self.address != 0 {
            self.address = (self.address + 1) & 0x0F;
        }
    }

    /// Read the register selected by `address` ($FF8007).
    pub fn read(&mut self) -> u8 {
        let value = match self.address {
            0 => {
                // SBOUT side of the status FIFO
                let value = self.status.fifo.pop().unwrap_or(0xFF);
                log::trace!("CDC status FIFO read: {value:02X}");
                value
            }
            1 => self.read_ifstat(),
            2 => self.transfer.length as u8,
            3 => (self.transfer.length >> 8) as u8,
            4..=7 => {
                let idx = self.address - 4;
                if self.control.head {
                    let subheader = self.subheader;
                    [subheader.file, subheader.channel, subheader.submode, subheader.coding]
                        [idx as usize]
                } else {
                    let header = self.header;
                    [header.minutes, header.seconds, header.blocks, header.mode][idx as usize]
                }
            }
            8 => self.transfer.pointer as u8,
            9 => (self.transfer.pointer >> 8) as u8,
            10 => self.decoder.write_address as u8,
            11 => (self.decoder.write_address >> 8) as u8,
            12 => self.decoder.result,
            // STAT1: header/subheader error flags
            13 => 0x00,
            14 => {
                // STAT2
                (u8::from(self.decoder.mode == SectorMode::Mode2) << 3)
                    | (u8::from(self.decoder.form == SectorForm::Form2) << 2)
            }
            15 => {
                // STAT3; VALST is active low
                let value = u8::from(!self.irq.decoder.pending) << 7;

                // Reading STAT3 clears the decoder interrupt
                self.irq.decoder.lower();

                value
            }
            _ => unreachable!("CDC register address is 4 bits"),
        };

        log::trace!("CDC register {} read: {value:02X}", self.address);

        self.increment_address();
        self.poll();

        value
    }

    fn read_ifstat(&self) -> u8 {
        // All status bits are active low; bit 4 is unused and reads 1
        (u8::from(!self.irq.command.pending) << 7)
            | (u8::from(!self.irq.transfer.pending) << 6)
            | (u8::from(!self.irq.decoder.pending) << 5)
            | (1 << 4)
            | (u8::from(!self.transfer.busy) << 3)
            | (u8::from(!self.status.busy) << 2)
            | (u8::from(!self.transfer.active) << 1)
            | u8::from(!self.status.active)
    }

    /// Write the register selected by `address` ($FF8007).
    pub fn write(&mut self, value: u8) {
        log::trace!("CDC register {} write: {value:02X}", self.address);

        match self.address {
            0 => {
                // COMIN side of the command FIFO
                if !self.command.push(value) {
                    log::debug!("CDC command FIFO full; dropped {value:02X}");
                }
                self.irq.command.lower();
            }
            1 => self.write_ifctrl(value),
            2 => {
                self.transfer.length = (self.transfer.length & 0x0F00) | u16::from(value);
            }
            3 => {
                // DBC is a 12-bit counter
                self.transfer.length =
                    (self.transfer.length & 0x00FF) | (u16::from(value & 0x0F) << 8);
            }
            4 => {
                self.transfer.source = (self.transfer.source & 0xFF00) | u16::from(value);
            }
            5 => {
                self.transfer.source = (self.transfer.source & 0x00FF) | (u16::from(value) << 8);
            }
            6 => self.start_transfer(),
            7 => {
                // DTACK
                self.irq.transfer.lower();
            }
            8 => {
                self.decoder.write_address =
                    (self.decoder.write_address & 0xFF00) | u16::from(value);
            }
            9 => {
                self.decoder.write_address =
                    (self.decoder.write_address & 0x00FF) | (u16::from(value) << 8);
            }
            10 => self.write_ctrl0(value),
            11 => self.write_ctrl1(value),
            12 => {
                self.transfer.pointer = (self.transfer.pointer & 0xFF00) | u16::from(value);
            }
            13 => {
                self.transfer.pointer = (self.transfer.pointer & 0x00FF) | (u16::from(value) << 8);
            }
            14 => {
                // CTRL2
                self.control.status_trigger = value.bit(4);
                self.control.status_control = value.bit(3);
                self.control.erasure_correction = value.bit(2);
            }
            15 => self.reset(),
            _ => unreachable!("CDC register address is 4 bits"),
        }

        self.increment_address();
        self.poll();
    }

    fn write_ifctrl(&mut self, value: u8) {
        self.irq.command.set_enable(value.bit(7));
        self.irq.transfer.set_enable(value.bit(6));
        self.irq.decoder.set_enable(value.bit(5));
        self.control.command_break = value.bit(4);
        self.status.wait = value.bit(2);
        self.transfer.enable = value.bit(1);
        self.status.enable = value.bit(0);

        if value.bit(3) {
            log::debug!("CDC DTWAI set; transfers are not wait-stated by the host side");
        }

        if !self.transfer.enable && self.transfer.active {
            log::trace!("DOUTEN cleared; aborting CDC transfer");
            self.abort_transfer();
        }

        log::trace!(
            "  CMDIEN={} DTEIEN={} DECIEN={} CMDBK={} STWAI={} DOUTEN={} SOUTEN={}",
            self.irq.command.enable,
            self.irq.transfer.enable,
            self.irq.decoder.enable,
            self.control.command_break,
            self.status.wait,
            self.transfer.enable,
            self.status.enable
        );
    }

    fn write_ctrl0(&mut self, value: u8) {
        self.decoder.enable = value.bit(7);
        self.control.edc_correction = value.bit(6);
        self.control.error_correction = value.bit(5);
        self.control.auto_correction = value.bit(4);
        self.control.erasure_request = value.bit(3);
        self.control.write_request = value.bit(2);
        self.control.q_code_correction = value.bit(1);
        self.control.p_code_correction = value.bit(0);

        // Disabling the decoder also clears any pending decoder interrupt
        if !self.decoder.enable {
            self.irq.decoder.lower();
        }

        log::trace!(
            "  DECEN={} EDCRQ={} AUTORQ={} WRRQ={}",
            self.decoder.enable,
            self.control.edc_correction,
            self.control.auto_correction,
            self.control.write_request
        );
    }

    fn write_ctrl1(&mut self, value: u8) {
        self.control.sync_interrupt = value.bit(7);
        self.control.sync_detection = value.bit(6);
        self.control.descramble = value.bit(5);
        self.control.correction_write = value.bit(4);
        self.control.mode = value.bit(3);
        self.control.form = value.bit(2);
        self.control.mode_byte_check = value.bit(1);
        self.control.head = value.bit(0);

        log::trace!(
            "  MODRQ={} FORMRQ={} SHDREN={}",
            self.control.mode,
            self.control.form,
            self.control.head
        );
    }

    /// Decode a raw sector delivered by the drive while reading a data track.
    pub fn decode(&mut self, sector: &SectorBuffer) {
        if !self.decoder.enable {
            return;
        }

        // Header data and subheader data are always read from bytes 12-15 and 16-19 respectively
        self.header = Header {
            minutes: sector[12],
            seconds: sector[13],
            blocks: sector[14],
            mode: sector[15],
        };
        self.subheader = Subheader {
            file: sector[16],
            channel: sector[17],
            submode: sector[18],
            coding: sector[19],
        };

        let (mode, form) = if self.control.auto_correction {
            let mode = if self.header.mode == 2 { SectorMode::Mode2 } else { SectorMode::Mode1 };
            let form =
                if self.subheader.submode.bit(5) { SectorForm::Form2 } else { SectorForm::Form1 };
            (mode, form)
        } else {
            let mode = if self.control.mode { SectorMode::Mode2 } else { SectorMode::Mode1 };
            let form = if self.control.form { SectorForm::Form2 } else { SectorForm::Form1 };
            (mode, form)
        };
        self.decoder.mode = mode;
        self.decoder.form = form;

        let edc_ok = !self.control.edc_correction || check_edc(sector, mode, form);
        self.decoder.result = if edc_ok { CRCOK } else { UCEBLK };

        if !edc_ok {
            log::debug!(
                "EDC mismatch in sector {:02X}:{:02X}:{:02X} ({mode:?} {form:?})",
                self.header.minutes,
                self.header.seconds,
                self.header.blocks
            );
        }

        if self.control.write_request {
            let block_start = self.decoder.write_address;
            for (i, &byte) in sector.iter().enumerate() {
                let address = (block_start.wrapping_add(i as u16)) & BUFFER_ADDRESS_MASK;
                self.buffer[address as usize] = byte;
            }

            self.decoder.write_address =
                block_start.wrapping_add(BYTES_PER_SECTOR as u16) & BUFFER_ADDRESS_MASK;
            self.transfer.pointer = block_start.wrapping_add(HEADER_OFFSET) & BUFFER_ADDRESS_MASK;

            log::trace!(
                "Decoder wrote block; WA={:04X}, PT={:04X}",
                self.decoder.write_address,
                self.transfer.pointer
            );
        }

        if self.status.enable && !(self.status.wait && !self.status.fifo.empty()) {
            let stat2 = (u8::from(mode == SectorMode::Mode2) << 3)
                | (u8::from(form == SectorForm::Form2) << 2);
            for value in [self.decoder.result, 0x00, stat2, 0x00] {
                self.status.fifo.push(value);
            }
        }

        self.irq.decoder.raise();
        self.poll();
    }

    /// RESET register write.
    fn reset(&mut self) {
        log::trace!("CDC reset");

        self.irq.decoder = Irq::enabled();
        self.irq.transfer = Irq::enabled();
        self.irq.command = Irq::default();
        self.command.clear();
        self.status = StatusPort::default();
        self.abort_transfer();
        self.transfer.enable = false;
        self.decoder.enable = false;
        self.control = Control::default();
    }

    pub fn power(&mut self) {
        let line_enable = self.irq.line.enable;
        *self = Self::new();
        self.irq.line.enable = line_enable;
    }

    #[cfg(test)]
    pub(crate) fn buffer(&self) -> &[u8; BUFFER_RAM_LEN] {
        &self.buffer
    }
}

fn check_edc(sector: &SectorBuffer, mode: SectorMode, form: SectorForm) -> bool {
    let (range, edc_offset) = match (mode, form) {
        (SectorMode::Mode1, _) => (0..2064, 2064),
        (SectorMode::Mode2, SectorForm::Form1) => (16..2072, 2072),
        (SectorMode::Mode2, SectorForm::Form2) => (16..2348, 2348),
    };

    let expected = u32::from_le_bytes([
        sector[edc_offset],
        sector[edc_offset + 1],
        sector[edc_offset + 2],
        sector[edc_offset + 3],
    ]);

    // Form 2 sectors may omit the EDC entirely
    if mode == SectorMode::Mode2 && form == SectorForm::Form2 && expected == 0 {
        return true;
    }

    CD_ROM_EDC.checksum(&sector[range]) == expected
}
