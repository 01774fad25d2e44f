//! Sub CPU interval timer ($FF8030)

use crate::irq::Irq;
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Timer {
    pub irq: Irq,
    pub counter: u8,
    pub period: u8,
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clocked once every 384 sub CPU cycles. Returns whether the interrupt output changed.
    pub fn clock(&mut self) -> bool {
        if self.counter != 0 {
            self.counter -= 1;
            return false;
        }

        self.counter = self.period;
        if self.period != 0 {
            log::trace!("Timer interrupt, reloading counter to {}", self.period);
            self.irq.raise()
        } else {
            false
        }
    }

    pub fn write(&mut self, value: u8) {
        log::trace!("Timer period write: {value:02X}");
        self.period = value;
        self.counter = value;
    }

    pub fn power(&mut self) {
        self.irq = Irq { enable: self.irq.enable, pending: false };
        self.counter = 0;
        self.period = 0;
    }
}
