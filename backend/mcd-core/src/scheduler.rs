//! Interleaves the main CPU and the sub CPU

use crate::api::{Mcd, McdResult, SUB_CPU_FREQUENCY};
use crate::cpu::{MainCpu, SubCpu};
use bincode::{Decode, Encode};
use mcd_common::TimingMode;

/// Alternates a main CPU slice with enough sub CPU execution to cover the same span of time.
/// Master clock cycles convert to sub CPU cycles with the remainder carried between slices.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Scheduler {
    timing_mode: TimingMode,
    product: u64,
    // Cycles left before the sub CPU's last instruction completes
    wait: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new(timing_mode: TimingMode) -> Self {
        Self { timing_mode, product: 0, wait: 0 }
    }

    /// Convert console master clock cycles to sub CPU cycles.
    pub fn sub_cpu_cycles(&mut self, master_clocks: u64) -> u64 {
        let master_clock_rate = self.timing_mode.master_clock_rate();

        self.product += master_clocks * SUB_CPU_FREQUENCY;
        let cycles = self.product / master_clock_rate;
        self.product -= cycles * master_clock_rate;

        cycles
    }

    /// Run one main CPU slice followed by the sub CPU for the equivalent time. Returns the master
    /// clock cycles elapsed.
    ///
    /// # Errors
    ///
    /// Propagates disc read errors from the cluster.
    pub fn tick<M: MainCpu, S: SubCpu>(
        &mut self,
        main_cpu: &mut M,
        mcd: &mut Mcd,
        sub_cpu: &mut S,
    ) -> McdResult<u64> {
        let master_clocks = main_cpu.execute_slice(mcd);

        let mut sub_cpu_cycles = self.sub_cpu_cycles(master_clocks);
        while sub_cpu_cycles >= self.wait {
            sub_cpu_cycles -= self.wait;
            self.wait = mcd.main(sub_cpu)?.into();
        }
        self.wait -= sub_cpu_cycles;

        Ok(master_clocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn remainder_carries() {
        let mut scheduler = Scheduler::new(TimingMode::Ntsc);

        // One second of master clocks, in uneven slices
        let rate = TimingMode::NTSC_MASTER_CLOCK_RATE;
        let mut total = 0;
        let mut remaining = rate;
        while remaining != 0 {
            let slice = remaining.min(7 * 13);
            total += scheduler.sub_cpu_cycles(slice);
            remaining -= slice;
        }

        assert_eq!(total, SUB_CPU_FREQUENCY);
        assert_eq!(scheduler.product, 0);
    }

    #[test]
    fn pal_rate() {
        let mut scheduler = Scheduler::new(TimingMode::Pal);
        assert_eq!(scheduler.sub_cpu_cycles(TimingMode::PAL_MASTER_CLOCK_RATE), SUB_CPU_FREQUENCY);
    }
}
