//! Ricoh RF5C164, the 8-channel PCM sound generator

use bincode::{Decode, Encode};
use mcd_common::num::{GetBit, U16Ext};
use mcd_common::BoxedByteArray;
use std::array;

pub const PCM_RAM_LEN: usize = 64 * 1024;
const PCM_ADDRESS_MASK: u32 = PCM_RAM_LEN as u32 - 1;

const ADDRESS_FRACT_BITS: u32 = 11;
const ADDRESS_FRACT_MASK: u32 = (1 << ADDRESS_FRACT_BITS) - 1;

// Bank window size in the register address space
const BANK_WINDOW_MASK: u32 = 0x0FFF;

const LOOP_MARKER: u8 = 0xFF;

pub const CHANNELS: usize = 8;

#[derive(Debug, Clone, Encode, Decode)]
pub struct Channel {
    pub enable: bool,
    pub envelope: u8,
    // Low nibble = left, high nibble = right
    pub pan: u8,
    // Fixed point 5.11
    pub step: u16,
    pub loop_address: u16,
    // High byte of the start address
    pub start: u8,
    // Fixed point 16.11
    pub address: u32,
    sample: u8,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            enable: false,
            envelope: 0,
            pan: 0xFF,
            step: 0,
            loop_address: 0,
            start: 0,
            address: 0,
            sample: 0,
        }
    }
}

impl Channel {
    fn start_address(&self) -> u32 {
        u32::from(self.start) << 8
    }

    fn key_on(&mut self, ram: &[u8; PCM_RAM_LEN]) {
        if self.enable {
            return;
        }

        self.enable = true;
        self.address = self.start_address() << ADDRESS_FRACT_BITS;
        self.sample = ram[self.start_address() as usize];
        if self.sample == LOOP_MARKER {
            self.jump_to_loop(ram);
        }
    }

    fn clock(&mut self, ram: &[u8; PCM_RAM_LEN]) {
        if !self.enable {
            return;
        }

        let next = self.address + u32::from(self.step);
        let mut sample_address = self.address >> ADDRESS_FRACT_BITS;
        let steps = (next >> ADDRESS_FRACT_BITS) - sample_address;

        for _ in 0..steps {
            sample_address = (sample_address + 1) & PCM_ADDRESS_MASK;
            let sample = ram[sample_address as usize];
            if sample == LOOP_MARKER {
                self.jump_to_loop(ram);
                return;
            }

            self.sample = sample;
        }

        self.address = (sample_address << ADDRESS_FRACT_BITS) | (next & ADDRESS_FRACT_MASK);
    }

    fn jump_to_loop(&mut self, ram: &[u8; PCM_RAM_LEN]) {
        let loop_sample = ram[self.loop_address as usize];
        if loop_sample == LOOP_MARKER {
            // Looping back onto another end marker would never produce a sample
            log::debug!(
                "PCM channel looped onto an end marker at {:04X}; stopping",
                self.loop_address
            );
            self.enable = false;
            self.sample = 0;
            return;
        }

        self.address = u32::from(self.loop_address) << ADDRESS_FRACT_BITS;
        self.sample = loop_sample;
    }

    /// Current sample after envelope and pan, as signed (left, right).
    #[must_use]
    pub fn output(&self) -> (i32, i32) {
        if !self.enable {
            return (0, 0);
        }

        // Samples are sign + 7-bit magnitude; sign bit set = positive
        let magnitude = i32::from(self.sample & 0x7F) * i32::from(self.envelope);
        let sign = if self.sample.bit(7) { 1 } else { -1 };

        // The lowest 5 bits are dropped from the magnitude before applying the sign
        let left = (magnitude * i32::from(self.pan & 0x0F)) >> 5;
        let right = (magnitude * i32::from(self.pan >> 4)) >> 5;
        (sign * left, sign * right)
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct PcmIo {
    pub enable: bool,
    pub bank: u8,
    pub channel: u8,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Rf5c164 {
    pub io: PcmIo,
    pub channels: [Channel; CHANNELS],
    ram: BoxedByteArray<PCM_RAM_LEN>,
}

impl Default for Rf5c164 {
    fn default() -> Self {
        Self::new()
    }
}

impl Rf5c164 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            io: PcmIo::default(),
            channels: array::from_fn(|_| Channel::default()),
            ram: BoxedByteArray::new(),
        }
    }

    pub fn power(&mut self) {
        self.io = PcmIo::default();
        self.channels = array::from_fn(|_| Channel::default());
        self.ram.fill(0);
    }

    fn bank_address(&self, address: u32) -> usize {
        ((u32::from(self.io.bank) << 12) | (address & BANK_WINDOW_MASK)) as usize
    }

    /// Read from the chip's address space ($0000-$1FFF, one byte per sub CPU word).
    #[must_use]
    pub fn read(&self, address: u32) -> u8 {
        match address {
            0x0008 => self
                .channels
                .iter()
                .enumerate()
                .fold(0, |value, (i, channel)| value | (u8::from(channel.enable) << i)),
            0x0010..=0x001F => {
                let channel = &self.channels[((address & 0x0F) >> 1) as usize];
                let current = if channel.enable {
                    (channel.address >> ADDRESS_FRACT_BITS) as u16
                } else {
                    channel.start_address() as u16
                };
                if address.bit(0) { current.msb() } else { current.lsb() }
            }
            0x1000..=0x1FFF => {
                // Sample RAM is only readable while the chip is stopped
                if self.io.enable { 0x00 } else { self.ram[self.bank_address(address)] }
            }
            _ => 0x00,
        }
    }

    pub fn write(&mut self, address: u32, value: u8) {
        match address {
            0x0000..=0x0008 => self.write_register(address, value),
            0x1000..=0x1FFF => {
                let ram_address = self.bank_address(address);
                self.ram[ram_address] = value;
            }
            _ => log::trace!("Unmapped PCM write: {address:04X} {value:02X}"),
        }
    }

    /// CDC DMA into the current sample RAM bank.
    pub fn dma_write(&mut self, address: u32, value: u8) {
        let ram_address = self.bank_address(address);
        self.ram[ram_address] = value;
    }

    fn write_register(&mut self, address: u32, value: u8) {
        log::trace!("PCM register {address:X} write: {value:02X} (channel {})", self.io.channel);

        let channel = &mut self.channels[self.io.channel as usize];
        match address {
            0x0 => channel.envelope = value,
            0x1 => channel.pan = value,
            0x2 => channel.step.set_lsb(value),
            0x3 => channel.step.set_msb(value),
            0x4 => channel.loop_address.set_lsb(value),
            0x5 => channel.loop_address.set_msb(value),
            0x6 => channel.start = value,
            0x7 => {
                self.io.enable = value.bit(7);
                if value.bit(6) {
                    self.io.channel = value & 0x07;
                } else {
                    self.io.bank = value & 0x0F;
                }

                log::trace!(
                    "  PCM enable={} bank={:X} channel={}",
                    self.io.enable,
                    self.io.bank,
                    self.io.channel
                );
            }
            0x8 => {
                // 1 = off, 0 = on
                for (i, channel) in self.channels.iter_mut().enumerate() {
                    if value.bit(i as u8) {
                        channel.enable = false;
                    } else {
                        channel.key_on(&self.ram);
                    }
                }
            }
            _ => unreachable!("PCM register address is at most 8"),
        }
    }

    /// Clocked once every 384 sub CPU cycles.
    pub fn clock(&mut self) {
        if !self.io.enable {
            return;
        }

        for channel in &mut self.channels {
            channel.clock(&self.ram);
        }
    }

    /// Per-channel output for the audio sink; zero while the chip is stopped.
    #[must_use]
    pub fn channel_output(&self, channel: usize) -> (i32, i32) {
        if !self.io.enable {
            return (0, 0);
        }

        self.channels[channel].output()
    }

    #[must_use]
    pub fn ram(&self) -> &[u8; PCM_RAM_LEN] {
        &self.ram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn pcm_with_samples(bank: u8, samples: &[u8]) -> Rf5c164 {
        let mut pcm = Rf5c164::new();
        pcm.write(0x7, bank & 0x0F);
        for (i, &sample) in samples.iter().enumerate() {
            pcm.write(0x1000 + i as u32, sample);
        }
        pcm
    }

    #[test]
    fn defaults() {
        let pcm = Rf5c164::new();
        assert!(pcm.channels.iter().all(|channel| channel.pan == 0xFF && !channel.enable));
        assert_eq!(pcm.read(0x0008), 0x00);
    }

    #[test]
    fn banked_ram_access() {
        let mut pcm = pcm_with_samples(0x3, &[0x12, 0x34]);
        assert_eq!(pcm.ram()[0x3000..0x3002], [0x12, 0x34]);
        assert_eq!(pcm.read(0x1001), 0x34);

        pcm.dma_write(0x0005, 0x56);
        assert_eq!(pcm.ram()[0x3005], 0x56);

        // Not readable while running
        pcm.write(0x7, 0x83);
        assert_eq!(pcm.read(0x1001), 0x00);
    }

    #[test]
    fn channel_registers() {
        let mut pcm = Rf5c164::new();
        pcm.write(0x7, 0x45);
        pcm.write(0x0, 0x80);
        pcm.write(0x1, 0x3C);
        pcm.write(0x2, 0x00);
        pcm.write(0x3, 0x08);
        pcm.write(0x4, 0x10);
        pcm.write(0x5, 0x20);
        pcm.write(0x6, 0x40);

        let channel = &pcm.channels[5];
        assert_eq!(channel.envelope, 0x80);
        assert_eq!(channel.pan, 0x3C);
        assert_eq!(channel.step, 0x0800);
        assert_eq!(channel.loop_address, 0x2010);
        assert_eq!(channel.start, 0x40);

        assert_eq!(pcm.read(0x001A), 0x00);
        assert_eq!(pcm.read(0x001B), 0x40);
        assert!(pcm.channels[..5].iter().all(|channel| channel.envelope == 0));
    }

    #[test]
    fn channel_steps_through_samples() {
        let mut pcm = pcm_with_samples(0, &[0x81, 0x82, 0x83, 0x84, 0x85]);
        pcm.write(0x7, 0xC0);
        // Half speed
        pcm.write(0x2, 0x00);
        pcm.write(0x3, 0x04);
        pcm.write(0x8, 0xFE);

        assert_eq!(pcm.read(0x0008), 0x01);
        assert_eq!(pcm.channels[0].sample, 0x81);

        let samples: Vec<_> = (0..6)
            .map(|_| {
                pcm.clock();
                pcm.channels[0].sample
            })
            .collect();
        assert_eq!(samples, vec![0x81, 0x82, 0x82, 0x83, 0x83, 0x84]);
    }

    #[test]
    fn loop_marker_jumps_to_loop() {
        let mut pcm = pcm_with_samples(0, &[0x81, 0x82, 0xFF]);
        pcm.write(0x7, 0xC0);
        pcm.write(0x3, 0x08);
        pcm.write(0x4, 0x01);
        pcm.write(0x8, 0xFE);

        let samples: Vec<_> = (0..5)
            .map(|_| {
                pcm.clock();
                pcm.channels[0].sample
            })
            .collect();
        assert_eq!(samples, vec![0x82, 0x82, 0x82, 0x82, 0x82]);
        assert!(pcm.channels[0].enable);
        assert_eq!(pcm.read(0x0010), 0x01);
    }

    #[test]
    fn loop_onto_marker_disables_channel() {
        let mut pcm = pcm_with_samples(0, &[0x81, 0xFF]);
        pcm.write(0x7, 0xC0);
        pcm.write(0x3, 0x08);
        pcm.write(0x4, 0x01);
        pcm.write(0x8, 0xFE);

        pcm.clock();
        assert!(!pcm.channels[0].enable);
        assert_eq!(pcm.read(0x0008), 0x00);
        assert_eq!(pcm.channel_output(0), (0, 0));
    }

    #[test]
    fn stopped_chip_does_not_advance() {
        let mut pcm = pcm_with_samples(0, &[0x81, 0x82]);
        pcm.write(0x7, 0x40);
        pcm.write(0x3, 0x08);
        pcm.write(0x8, 0xFE);

        pcm.clock();
        assert_eq!(pcm.channels[0].address, 0);
        assert_eq!(pcm.channel_output(0), (0, 0));
    }

    #[test]
    fn output_applies_envelope_and_pan() {
        let mut pcm = pcm_with_samples(0, &[0x7F, 0x10]);
        pcm.write(0x7, 0xC0);
        pcm.write(0x0, 0xFF);
        pcm.write(0x1, 0x0F);
        pcm.write(0x8, 0xFE);

        // Negative full-scale sample panned hard left
        assert_eq!(pcm.channel_output(0), (-((0x7F * 0xFF * 0x0F) >> 5), 0));
    }
}
