//! Public interface of the expansion unit: configuration, errors, and the [`Mcd`] cluster that owns
//! every peripheral, memory, and the sub CPU's view of them

use crate::cddrive::cdc::{Cdc, DmaArgs};
use crate::cddrive::cdd::{Cdd, Fader};
use crate::cddrive::{Disc, DiscSlot, SectorBuffer};
use crate::cpu::SubCpu;
use crate::graphics::Gpu;
use crate::irq::{External, IrqSources, Irqs};
use crate::memory::backupram::{self, BackupRam};
use crate::memory::wordram::WORD_RAM_LEN;
use crate::memory::{Bios, Communication, Io, Led, BIOS_LEN, PRG_RAM_LEN};
use crate::rf5c164::Rf5c164;
use crate::timer::Timer;
use crate::{cddrive, irq};
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use mcd_common::{BoxedByteArray, TimingMode};
use std::io;
use thiserror::Error;

/// 50 MHz expansion unit master clock divided by 4.
pub const SUB_CPU_FREQUENCY: u64 = 12_500_000;

// Timer, CDC, and PCM all run off a divider of the sub CPU clock
const PERIPHERAL_DIVIDER: u32 = 384;

// Cycles to idle for while the sub CPU is held in reset or its bus is granted to the main CPU
const HALTED_CYCLES: u32 = 4;

macro_rules! bincode_config {
    () => {
        bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding()
            .with_limit::<{ 100 * 1024 * 1024 }>()
    };
}

#[derive(Debug, Error)]
pub enum McdError {
    #[error("BIOS is required to be {BIOS_LEN} bytes, was {bios_len} bytes")]
    InvalidBios { bios_len: usize },
    #[error("I/O error reading from disc: {0}")]
    DiscRead(#[source] io::Error),
    #[error("Error saving state: {0}")]
    SaveStateEncode(#[from] EncodeError),
    #[error("Error loading state: {0}")]
    SaveStateDecode(#[from] DecodeError),
}

pub type McdResult<T> = Result<T, McdError>;

/// Sector rate multiplier while the drive is reading data tracks. Audio playback always runs at 1x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum DiscSpeed {
    #[default]
    Single,
    Double,
    Triple,
    Quadruple,
}

impl DiscSpeed {
    #[must_use]
    pub fn multiplier(self) -> u8 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
            Self::Quadruple => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct McdConfig {
    pub timing_mode: TimingMode,
    pub disc_speed: DiscSpeed,
    pub enforce_pram_protection: bool,
    /// Start with a formatted backup RAM when no persisted contents are available
    pub format_backup_ram: bool,
}

impl Default for McdConfig {
    fn default() -> Self {
        Self {
            timing_mode: TimingMode::default(),
            disc_speed: DiscSpeed::default(),
            enforce_pram_protection: true,
            format_backup_ram: true,
        }
    }
}

/// The expansion unit. Field order is the save state layout.
#[derive(Debug, Encode, Decode)]
pub struct Mcd {
    pub(crate) io: Io,
    pub(crate) led: Led,
    pub(crate) irqs: Irqs,
    pub(crate) external: External,
    pub(crate) communication: Communication,
    pub(crate) cdc: Cdc,
    pub(crate) cdd: Cdd,
    pub(crate) timer: Timer,
    pub(crate) gpu: Gpu,
    pub(crate) pcm: Rf5c164,
    pub(crate) prg_ram: BoxedByteArray<PRG_RAM_LEN>,
    pub(crate) word_ram: BoxedByteArray<WORD_RAM_LEN>,
    pub(crate) backup_ram: BackupRam,
    pub(crate) backup_ram_dirty: bool,
    pub(crate) config: McdConfig,
    pub(crate) bios: Bios,
    pub(crate) disc: DiscSlot,
}

impl Mcd {
    /// Create a powered-on unit with no BIOS or disc. `backup_ram` is previously persisted backup
    /// RAM contents, if any.
    #[must_use]
    pub fn new(config: McdConfig, backup_ram: Option<&[u8]>) -> Self {
        let mut mcd = Self {
            io: Io::new(),
            led: Led::default(),
            irqs: Irqs::new(),
            external: External::default(),
            communication: Communication::default(),
            cdc: Cdc::new(),
            cdd: Cdd::new(config.disc_speed.multiplier()),
            timer: Timer::new(),
            gpu: Gpu::new(),
            pcm: Rf5c164::new(),
            prg_ram: BoxedByteArray::new(),
            word_ram: BoxedByteArray::new(),
            backup_ram: backupram::initial(backup_ram, config.format_backup_ram),
            backup_ram_dirty: false,
            config,
            bios: Bios::default(),
            disc: DiscSlot::default(),
        };
        mcd.power(false);
        mcd
    }

    /// Load a BIOS image.
    ///
    /// # Errors
    ///
    /// Returns an error if the BIOS is not exactly 128KB.
    pub fn load(&mut self, bios: &[u8]) -> McdResult<()> {
        let Some(bios) = BoxedByteArray::from_slice(bios) else {
            return Err(McdError::InvalidBios { bios_len: bios.len() });
        };

        self.bios = Bios(Some(bios));
        log::info!("Loaded BIOS");

        Ok(())
    }

    /// Release the BIOS and eject the disc, returning the disc if one was inserted.
    pub fn unload(&mut self) -> Option<Box<dyn Disc>> {
        self.bios = Bios::default();
        log::info!("Unloaded BIOS");

        self.remove_disc()
    }

    pub fn insert_disc(&mut self, disc: Box<dyn Disc>) {
        log::info!("Inserted disc with {} tracks", disc.tracks().len());

        self.disc.insert(disc);
        self.cdd.disc_inserted();
    }

    pub fn remove_disc(&mut self) -> Option<Box<dyn Disc>> {
        let disc = self.disc.take();
        if disc.is_some() {
            log::info!("Removed disc");
            self.cdd.disc_removed();
        }
        disc
    }

    /// Reinitialize every component. A cold boot (`reset = false`) also clears PRG RAM and word
    /// RAM; backup RAM always survives.
    pub fn power(&mut self, reset: bool) {
        log::info!("Powering on ({})", if reset { "reset" } else { "cold boot" });

        self.io = Io::new();
        self.led = Led::default();
        self.irqs = Irqs::new();
        self.external = External::default();
        self.communication = Communication::default();
        self.cdc.power();
        self.cdd.power(self.disc.is_present());
        self.timer.power();
        self.gpu.power();
        self.pcm.power();
        self.write_interrupt_mask(0);

        if !reset {
            self.prg_ram.fill(0);
            self.word_ram.fill(0);
        }

        self.synchronize();
    }

    pub fn reload_config(&mut self, config: McdConfig) {
        self.config = config;
        self.cdd.set_data_speed(config.disc_speed.multiplier());
    }

    #[must_use]
    pub fn config(&self) -> McdConfig {
        self.config
    }

    /// Resample every interrupt source and recompute the level presented to the sub CPU.
    pub(crate) fn synchronize(&mut self) {
        self.cdc.poll();

        let sources: IrqSources = [
            false,
            self.gpu.irq.output(),
            self.external.irq.output(),
            self.timer.irq.output(),
            self.cdd.irq.output() && self.cdd.io.host_clock_enable,
            self.cdc.irq.line.output(),
            self.irqs.subcode.output(),
        ];

        let level = irq::highest_level(&sources);
        if level != self.irqs.level {
            log::trace!("Sub CPU interrupt level changed from {} to {level}", self.irqs.level);
        }

        self.irqs.level = level;
        self.irqs.pending = level != 0;
    }

    /// The sub CPU acknowledged an interrupt; clear the source for that level.
    pub(crate) fn acknowledge(&mut self, level: u8) {
        log::trace!("Sub CPU acknowledged level {level} interrupt");

        match level {
            1 => self.gpu.irq.lower(),
            2 => self.external.irq.lower(),
            3 => self.timer.irq.lower(),
            4 => self.cdd.irq.lower(),
            5 => self.cdc.irq.line.lower(),
            6 => self.irqs.subcode.lower(),
            _ => false,
        };

        self.synchronize();
    }

    /// Advance every peripheral by the given number of sub CPU cycles.
    ///
    /// # Errors
    ///
    /// Propagates disc read errors from the drive.
    pub fn step(&mut self, clocks: u32) -> McdResult<()> {
        if self.gpu.step(clocks, &mut *self.word_ram, &self.io.wram) {
            log::trace!("Graphics operation complete");
        }

        let mut counter = u32::from(self.io.counter) + clocks;
        while counter >= PERIPHERAL_DIVIDER {
            counter -= PERIPHERAL_DIVIDER;

            self.timer.clock();
            self.cdc.clock(DmaArgs {
                prg_ram: &mut *self.prg_ram,
                word_ram: &mut *self.word_ram,
                word_ram_control: &self.io.wram,
                pcm: &mut self.pcm,
            });
            self.pcm.clock();
        }
        self.io.counter = counter as u16;

        for _ in 0..cddrive::drive_clocks(&mut self.io.decoder, clocks.into()) {
            if self.cdd.clock(&mut self.disc, &mut self.cdc)? {
                self.irqs.subcode.raise();
            }
        }

        self.synchronize();

        Ok(())
    }

    /// Run one sub CPU instruction, or idle while the sub CPU is halted, then advance the
    /// peripherals by the elapsed cycles. Returns the sub CPU cycles elapsed.
    ///
    /// # Errors
    ///
    /// Propagates disc read errors from the drive.
    pub fn main<C: SubCpu>(&mut self, cpu: &mut C) -> McdResult<u32> {
        // Run/request changes made by the main CPU take effect here
        self.io.halt = !self.io.run || self.io.request;

        let cycles = if self.io.halt {
            HALTED_CYCLES
        } else {
            if self.irqs.reset.lower() {
                log::debug!("Sub CPU leaving reset");
                cpu.reset(self);
            }
            cpu.execute_instruction(self)
        };

        self.step(cycles)?;

        Ok(cycles)
    }

    /// Serialize the unit's state. The BIOS and disc are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn save_state(&self) -> McdResult<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, bincode_config!())?)
    }

    /// Restore state produced by [`Mcd::save_state`], keeping the current BIOS and disc.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails; the current state is left untouched in that case.
    pub fn load_state(&mut self, bytes: &[u8]) -> McdResult<()> {
        let (mut loaded, _): (Self, _) = bincode::decode_from_slice(bytes, bincode_config!())?;
        loaded.take_rom_from(self);
        *self = loaded;

        log::info!("Loaded state");

        Ok(())
    }

    fn take_rom_from(&mut self, other: &mut Self) {
        self.bios = std::mem::take(&mut other.bios);
        self.disc = std::mem::take(&mut other.disc);
    }

    #[must_use]
    pub fn sub_cpu_halted(&self) -> bool {
        self.io.halt
    }

    #[must_use]
    pub fn leds(&self) -> (bool, bool) {
        (self.led.red, self.led.green)
    }

    #[must_use]
    pub fn backup_ram(&self) -> &[u8] {
        &*self.backup_ram
    }

    /// Whether backup RAM was written since the last call.
    pub fn take_backup_ram_dirty(&mut self) -> bool {
        std::mem::take(&mut self.backup_ram_dirty)
    }

    #[must_use]
    pub fn pcm(&self) -> &Rf5c164 {
        &self.pcm
    }

    /// The sector currently playing and the fader applied to it, while an audio track plays.
    #[must_use]
    pub fn cd_audio(&self) -> Option<(&SectorBuffer, &Fader)> {
        self.cdd.audio_sector().map(|sector| (sector, &self.cdd.fader))
    }
}
