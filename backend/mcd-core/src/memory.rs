//! Memory map, register block and bus decoding for both CPUs

pub mod backupram;
pub mod wordram;

use crate::api::Mcd;
use crate::cddrive::cdc::{Destination, Host};
use crate::cpu::BusInterface;
use crate::macros::impl_skip_serialization;
use crate::memory::wordram::WordRamControl;
use bincode::{Decode, Encode};
use mcd_common::num::{GetBit, U16Ext};
use mcd_common::BoxedByteArray;

pub const BIOS_LEN: usize = 128 * 1024;
pub const PRG_RAM_LEN: usize = 512 * 1024;

// PRG RAM write protection is set in units of 512 bytes
const PRG_RAM_PROTECT_UNIT: u32 = 0x200;

// Sub CPU registers are mirrored every 512 bytes throughout $FF8000-$FFFFFF
const SUB_REGISTER_MASK: u32 = 0x1FE;
const MAIN_REGISTER_MASK: u32 = 0x3E;

// 68000 address bus is 24 bits
const SUB_ADDRESS_MASK: u32 = 0xFFFFFF;

// The main CPU sees the expansion unit through a 22-bit window
const EXTERNAL_ADDRESS_MASK: u32 = 0x3FFFFF;

/// Run/halt handshake, memory mode and bank selection, and clock dividers.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Io {
    // SRES: sub CPU released from reset
    pub run: bool,
    // SBRQ: main CPU requests the sub CPU bus
    pub request: bool,
    pub halt: bool,
    pub wram: WordRamControl,
    pub pram_bank: u8,
    pub pram_protect: u8,
    // $A12006
    pub vector: u16,
    // Sub CPU cycles toward the next peripheral clock
    pub counter: u16,
    // 44.1 kHz drive clock accumulator
    pub decoder: u32,
}

impl Io {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run: false,
            request: true,
            halt: true,
            wram: WordRamControl::new(),
            pram_bank: 0,
            pram_protect: 0,
            vector: 0xFFFF,
            counter: 0,
            decoder: 0,
        }
    }

    fn prg_ram_window(&self, address: u32) -> usize {
        ((u32::from(self.pram_bank) << 17) | (address & 0x1FFFF)) as usize
    }
}

impl Default for Io {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Led {
    pub red: bool,
    pub green: bool,
}

/// Flags and words passed between the two CPUs ($A1200E-$A1202F / $FF800E-$FF802F).
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Communication {
    // Written by the main CPU
    pub cfm: u8,
    // Written by the sub CPU
    pub cfs: u8,
    pub command: [u16; 8],
    pub status: [u16; 8],
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Bios(pub(crate) Option<BoxedByteArray<BIOS_LEN>>);

impl_skip_serialization!(Bios);

fn read_ram_word(ram: &[u8], address: usize) -> u16 {
    u16::from_be_bytes([ram[address], ram[address + 1]])
}

fn write_ram_lanes(ram: &mut [u8], address: usize, upper: bool, lower: bool, data: u16) {
    if upper {
        ram[address] = data.msb();
    }
    if lower {
        ram[address + 1] = data.lsb();
    }
}

impl Mcd {
    fn cdc_mode(&self) -> u8 {
        (u8::from(self.cdc.edt) << 7)
            | (u8::from(self.cdc.dsr) << 6)
            | self.cdc.destination.to_bits()
    }

    fn interrupt_mask(&self) -> u8 {
        (u8::from(self.irqs.subcode.enable) << 6)
            | (u8::from(self.cdc.irq.line.enable) << 5)
            | (u8::from(self.cdd.irq.enable) << 4)
            | (u8::from(self.timer.irq.enable) << 3)
            | (u8::from(self.external.irq.enable) << 2)
            | (u8::from(self.gpu.irq.enable) << 1)
    }

    pub(crate) fn write_interrupt_mask(&mut self, value: u8) {
        log::trace!("Interrupt mask write: {value:08b}");

        self.irqs.subcode.set_enable(value.bit(6));
        self.cdc.irq.line.set_enable(value.bit(5));
        self.cdd.irq.set_enable(value.bit(4));
        self.timer.irq.set_enable(value.bit(3));
        self.external.irq.set_enable(value.bit(2));
        self.gpu.irq.set_enable(value.bit(1));
    }

    fn pram_protected(&self, address: usize) -> bool {
        self.config.enforce_pram_protection
            && (address as u32) < u32::from(self.io.pram_protect) * PRG_RAM_PROTECT_UNIT
    }

    fn write_prg_ram_sub(&mut self, address: usize, upper: bool, lower: bool, data: u16) {
        // Both bytes of a word always fall in the same protection unit
        if self.pram_protected(address) {
            log::debug!("Sub CPU write to protected PRG RAM at {address:05X} dropped");
            return;
        }

        write_ram_lanes(&mut *self.prg_ram, address, upper, lower, data);
    }

    /// Sub CPU read. `upper`/`lower` select the active byte lanes and `data` is returned for
    /// unmapped addresses.
    pub fn read(&mut self, upper: bool, lower: bool, address: u32, data: u16) -> u16 {
        let address = address & SUB_ADDRESS_MASK & !1;
        match address {
            0x000000..=0x07FFFF => read_ram_word(&*self.prg_ram, address as usize),
            0x080000..=0x0DFFFF => {
                let control = &self.io.wram;
                match (
                    control.sub_read(&*self.word_ram, address),
                    control.sub_read(&*self.word_ram, address | 1),
                ) {
                    (Some(msb), Some(lsb)) => u16::from_be_bytes([msb, lsb]),
                    _ => data,
                }
            }
            0xFE0000..=0xFEFFFF => backupram::index(address | 1)
                .map_or(data, |index| u16::from(self.backup_ram[index])),
            0xFF0000..=0xFF7FFF => {
                // PCM is on odd addresses; $FF0000-$FF3FFF mirrored at $FF4000-$FF7FFF
                self.pcm.read(((address | 1) & 0x3FFF) >> 1).into()
            }
            0xFF8000..=0xFFFFFF => self.read_io(upper, lower, address, data),
            _ => {
                log::debug!("Sub CPU read from unmapped address {address:06X}");
                data
            }
        }
    }

    pub fn write(&mut self, upper: bool, lower: bool, address: u32, data: u16) {
        let address = address & SUB_ADDRESS_MASK & !1;
        match address {
            0x000000..=0x07FFFF => self.write_prg_ram_sub(address as usize, upper, lower, data),
            0x080000..=0x0DFFFF => {
                let control = &self.io.wram;
                if upper {
                    control.sub_write(&mut *self.word_ram, address, data.msb());
                }
                if lower {
                    control.sub_write(&mut *self.word_ram, address | 1, data.lsb());
                }
            }
            0xFE0000..=0xFEFFFF => {
                if let (true, Some(index)) = (lower, backupram::index(address | 1)) {
                    self.backup_ram[index] = data.lsb();
                    self.backup_ram_dirty = true;
                }
            }
            0xFF0000..=0xFF7FFF => {
                if lower {
                    self.pcm.write(((address | 1) & 0x3FFF) >> 1, data.lsb());
                }
            }
            0xFF8000..=0xFFFFFF => self.write_io(upper, lower, address, data),
            _ => log::debug!("Sub CPU write to unmapped address {address:06X} {data:04X}"),
        }
    }

    /// Main CPU read from the 22-bit expansion window: BIOS and the PRG RAM bank at
    /// $000000-$1FFFFF, word RAM at $200000-$3FFFFF.
    pub fn external_read(&mut self, _upper: bool, _lower: bool, address: u32, data: u16) -> u16 {
        let address = address & EXTERNAL_ADDRESS_MASK & !1;
        match address {
            0x000000..=0x1FFFFF if !address.bit(17) => {
                // The BIOS reads the H-INT vector from $70-$73, which resolves to $FFFF and the
                // value written to $A12006
                match address & 0x1FFFF {
                    0x70 => 0xFFFF,
                    0x72 => self.io.vector,
                    bios_address => match &self.bios.0 {
                        Some(bios) => read_ram_word(&**bios, bios_address as usize),
                        None => data,
                    },
                }
            }
            0x000000..=0x1FFFFF => read_ram_word(&*self.prg_ram, self.io.prg_ram_window(address)),
            _ => {
                let control = &self.io.wram;
                match (
                    control.main_read(&*self.word_ram, address),
                    control.main_read(&*self.word_ram, address | 1),
                ) {
                    (Some(msb), Some(lsb)) => u16::from_be_bytes([msb, lsb]),
                    _ => data,
                }
            }
        }
    }

    pub fn external_write(&mut self, upper: bool, lower: bool, address: u32, data: u16) {
        let address = address & EXTERNAL_ADDRESS_MASK & !1;
        match address {
            0x000000..=0x1FFFFF if !address.bit(17) => {
                log::debug!("Main CPU write to BIOS at {address:06X} ignored");
            }
            0x000000..=0x1FFFFF => {
                // Write protection only applies to the sub CPU
                let prg_ram_address = self.io.prg_ram_window(address);
                write_ram_lanes(&mut *self.prg_ram, prg_ram_address, upper, lower, data);
            }
            _ => {
                let control = &self.io.wram;
                if upper {
                    control.main_write(&mut *self.word_ram, address, data.msb());
                }
                if lower {
                    control.main_write(&mut *self.word_ram, address | 1, data.lsb());
                }
            }
        }
    }

    /// Sub CPU register read ($FF8000-$FF81FF).
    pub fn read_io(&mut self, upper: bool, lower: bool, address: u32, data: u16) -> u16 {
        let address = address & SUB_REGISTER_MASK;
        log::trace!("Sub CPU register read {address:03X} (upper={upper}, lower={lower})");

        let value = match address {
            0x00 => {
                // Bit 0 (drive ready) always reads 1
                let leds = (u8::from(self.led.green) << 1) | u8::from(self.led.red);
                u16::from_be_bytes([leds, 0x01])
            }
            0x02 => u16::from_be_bytes([self.io.pram_protect, self.io.wram.sub_read_control()]),
            0x04 => u16::from_be_bytes([self.cdc_mode(), self.cdc.address]),
            0x06 => {
                if lower {
                    self.cdc.read().into()
                } else {
                    0x0000
                }
            }
            0x08 => self.cdc.read_host_data(Host::SubCpu),
            0x0A => self.cdc.dma_address(),
            0x0C => self.cdc.stopwatch,
            0x0E => u16::from_be_bytes([self.communication.cfm, self.communication.cfs]),
            0x10..=0x1E => self.communication.command[((address & 0xF) >> 1) as usize],
            0x20..=0x2E => self.communication.status[((address & 0xF) >> 1) as usize],
            0x30 => self.timer.period.into(),
            0x32 => self.interrupt_mask().into(),
            0x34 => self.cdd.read_fader(),
            0x36 => self.cdd.read_control(),
            0x38..=0x40 => {
                let index = (address - 0x38) as usize;
                u16::from_be_bytes([
                    self.cdd.read_status_nibble(index),
                    self.cdd.read_status_nibble(index + 1),
                ])
            }
            0x42..=0x4A => {
                let index = (address - 0x42) as usize;
                u16::from_be_bytes([
                    self.cdd.read_command_nibble(index),
                    self.cdd.read_command_nibble(index + 1),
                ])
            }
            0x4C => self.gpu.font.read_color().into(),
            0x4E => self.gpu.font.data,
            0x50..=0x56 => self.gpu.font.read_expanded((address - 0x50) >> 1),
            0x58..=0x66 => self.gpu.read(address),
            _ => {
                log::debug!("Sub CPU read from unmapped register {address:03X}");
                data
            }
        };

        self.synchronize();
        value
    }

    /// Sub CPU register write ($FF8000-$FF81FF).
    pub fn write_io(&mut self, upper: bool, lower: bool, address: u32, data: u16) {
        let address = address & SUB_REGISTER_MASK;
        log::trace!(
            "Sub CPU register write {address:03X} {data:04X} (upper={upper}, lower={lower})"
        );

        match address {
            0x00 => {
                if upper {
                    self.led.green = data.bit(9);
                    self.led.red = data.bit(8);
                }
                if lower && !data.bit(0) {
                    log::debug!("CD peripheral reset");
                    self.cdc.power();
                    self.cdd.power(self.disc.is_present());
                }
            }
            0x02 => {
                // Write protect is read-only from the sub CPU side
                if lower {
                    self.io.wram.sub_write_control(data.lsb());
                }
            }
            0x04 => {
                if upper {
                    self.cdc.set_destination(Destination::from_bits(data.msb()));
                }
                if lower {
                    self.cdc.address = data.lsb() & 0x0F;
                }
            }
            0x06 => {
                if lower {
                    self.cdc.write(data.lsb());
                }
            }
            0x0A => {
                let mut dma_address = self.cdc.dma_address();
                dma_address.write_lanes(upper, lower, data);
                self.cdc.set_dma_address(dma_address);
            }
            0x0C => {
                let mut stopwatch = self.cdc.stopwatch;
                stopwatch.write_lanes(upper, lower, data);
                self.cdc.stopwatch = stopwatch & 0x0FFF;
            }
            0x0E => {
                if lower {
                    self.communication.cfs = data.lsb();
                }
            }
            0x20..=0x2E => {
                let index = ((address & 0xF) >> 1) as usize;
                self.communication.status[index].write_lanes(upper, lower, data);
            }
            0x30 => {
                if lower {
                    self.timer.write(data.lsb());
                }
            }
            0x32 => {
                if lower {
                    self.write_interrupt_mask(data.lsb());
                }
            }
            0x34 => {
                let mut fader = self.cdd.read_fader();
                fader.write_lanes(upper, lower, data);
                self.cdd.write_fader(fader);
            }
            0x36 => {
                if lower {
                    self.cdd.write_control(data.lsb());
                }
            }
            0x42..=0x4A => {
                let index = (address - 0x42) as usize;
                if upper {
                    self.cdd.write_command_nibble(index, data.msb());
                }
                if lower {
                    self.cdd.write_command_nibble(index + 1, data.lsb());
                }

                // Writing the last nibble clocks the command out to the drive
                if address == 0x4A && lower {
                    self.cdd.send_command();
                }
            }
            0x4C => {
                if lower {
                    self.gpu.font.write_color(data.lsb());
                }
            }
            0x4E => self.gpu.font.data.write_lanes(upper, lower, data),
            0x58..=0x66 => self.gpu.write(upper, lower, address, data),
            _ => log::debug!("Sub CPU write to read-only or unmapped register {address:03X}"),
        }

        self.synchronize();
    }

    /// Main CPU register read ($A12000-$A1202F).
    pub fn external_read_io(&mut self, upper: bool, lower: bool, address: u32, data: u16) -> u16 {
        let address = address & MAIN_REGISTER_MASK;
        log::trace!("Main CPU register read {address:02X} (upper={upper}, lower={lower})");

        let value = match address {
            0x00 => u16::from_be_bytes([
                (u8::from(self.external.irq.enable) << 7) | u8::from(self.external.irq.pending),
                (u8::from(self.io.request) << 1) | u8::from(self.io.run),
            ]),
            0x02 => u16::from_be_bytes([
                self.io.pram_protect,
                (self.io.pram_bank << 6) | self.io.wram.main_read_control(),
            ]),
            0x04 => u16::from(self.cdc_mode()) << 8,
            0x06 => self.io.vector,
            0x08 => self.cdc.read_host_data(Host::MainCpu),
            0x0C => self.cdc.stopwatch,
            0x0E => u16::from_be_bytes([self.communication.cfm, self.communication.cfs]),
            0x10..=0x1E => self.communication.command[((address & 0xF) >> 1) as usize],
            0x20..=0x2E => self.communication.status[((address & 0xF) >> 1) as usize],
            _ => {
                log::debug!("Main CPU read from unmapped register {address:02X}");
                data
            }
        };

        self.synchronize();
        value
    }

    /// Main CPU register write ($A12000-$A1202F).
    pub fn external_write_io(&mut self, upper: bool, lower: bool, address: u32, data: u16) {
        let address = address & MAIN_REGISTER_MASK;
        log::trace!(
            "Main CPU register write {address:02X} {data:04X} (upper={upper}, lower={lower})"
        );

        match address {
            0x00 => {
                // IFL2: writing 1 interrupts the sub CPU at level 2
                if upper && data.bit(8) {
                    self.external.irq.raise();
                }
                if lower {
                    let run = data.bit(0);
                    if run && !self.io.run {
                        self.irqs.reset.raise();
                    }
                    self.io.run = run;
                    self.io.request = data.bit(1);

                    log::debug!("Sub CPU run={}, request={}", self.io.run, self.io.request);
                }
            }
            0x02 => {
                if upper {
                    self.io.pram_protect = data.msb();
                }
                if lower {
                    self.io.pram_bank = data.lsb() >> 6;
                    self.io.wram.main_write_control(data.lsb());
                }
            }
            0x06 => self.io.vector.write_lanes(upper, lower, data),
            0x0E => {
                // Only the main CPU flags are writable from this side; a byte write to either
                // half lands there
                if upper {
                    self.communication.cfm = data.msb();
                } else if lower {
                    self.communication.cfm = data.lsb();
                }
            }
            0x10..=0x1E => {
                let index = ((address & 0xF) >> 1) as usize;
                self.communication.command[index].write_lanes(upper, lower, data);
            }
            _ => log::debug!("Main CPU write to read-only or unmapped register {address:02X}"),
        }

        self.synchronize();
    }
}

impl BusInterface for Mcd {
    #[inline]
    fn read(&mut self, upper: bool, lower: bool, address: u32, data: u16) -> u16 {
        Mcd::read(self, upper, lower, address, data)
    }

    #[inline]
    fn write(&mut self, upper: bool, lower: bool, address: u32, data: u16) {
        Mcd::write(self, upper, lower, address, data);
    }

    #[inline]
    fn interrupt_level(&self) -> u8 {
        self.irqs.level
    }

    #[inline]
    fn acknowledge_interrupt(&mut self, interrupt_level: u8) {
        self.acknowledge(interrupt_level);
    }

    #[inline]
    fn halt(&self) -> bool {
        self.io.halt
    }
}
