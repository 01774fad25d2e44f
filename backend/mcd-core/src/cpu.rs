//! Boundary to the CPU cores that drive the cluster

use crate::api::Mcd;
use mcd_common::num::{GetBit, U16Ext};

/// Sub CPU view of the cluster. Accesses are word-aligned with byte lane selects; byte writes
/// place the byte on both lanes.
pub trait BusInterface {
    /// Read a word. `data` is returned unchanged for unmapped addresses.
    fn read(&mut self, upper: bool, lower: bool, address: u32, data: u16) -> u16;

    fn write(&mut self, upper: bool, lower: bool, address: u32, data: u16);

    fn read_byte(&mut self, address: u32) -> u8 {
        let odd = address.bit(0);
        let word = self.read(!odd, odd, address & !1, 0);
        if odd { word.lsb() } else { word.msb() }
    }

    fn read_word(&mut self, address: u32) -> u16 {
        self.read(true, true, address & !1, 0)
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        let odd = address.bit(0);
        self.write(!odd, odd, address & !1, u16::from_be_bytes([value, value]));
    }

    fn write_word(&mut self, address: u32, value: u16) {
        self.write(true, true, address & !1, value);
    }

    // Auto-vectored interrupt level, 0 if no interrupt is asserted
    fn interrupt_level(&self) -> u8;

    fn acknowledge_interrupt(&mut self, interrupt_level: u8);

    fn halt(&self) -> bool;
}

/// Instruction-level core for the sub CPU.
pub trait SubCpu {
    /// Execute one instruction (or begin interrupt processing) and return the number of sub CPU
    /// cycles it took.
    fn execute_instruction<B: BusInterface>(&mut self, bus: &mut B) -> u32;

    /// Load the initial stack pointer and program counter through the bus.
    fn reset<B: BusInterface>(&mut self, bus: &mut B);
}

/// The console's main CPU, reaching the cluster through the `external_*` accessors.
pub trait MainCpu {
    /// Run one slice and return the number of console master clock cycles it took.
    fn execute_slice(&mut self, mcd: &mut Mcd) -> u64;
}
