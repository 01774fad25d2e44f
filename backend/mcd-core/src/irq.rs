//! Interrupt latches and the sub CPU interrupt level

use bincode::{Decode, Encode};

/// A single interrupt source: an enable bit from the mask register and a pending latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Irq {
    pub enable: bool,
    pub pending: bool,
}

impl Irq {
    #[must_use]
    pub const fn enabled() -> Self {
        Self { enable: true, pending: false }
    }

    /// Latch the interrupt if it is enabled. Returns whether the output changed.
    pub fn raise(&mut self) -> bool {
        if !self.enable || self.pending {
            return false;
        }

        self.pending = true;
        true
    }

    /// Clear the pending latch. Returns whether the output changed.
    pub fn lower(&mut self) -> bool {
        let changed = self.output();
        self.pending = false;
        changed
    }

    /// Update the enable bit. Disabling a source also clears its pending latch.
    pub fn set_enable(&mut self, enable: bool) -> bool {
        let prev_output = self.output();

        self.enable = enable;
        if !enable {
            self.pending = false;
        }

        prev_output != self.output()
    }

    #[inline]
    #[must_use]
    pub fn output(self) -> bool {
        self.enable && self.pending
    }
}

/// Cluster-level interrupt state: the sub CPU reset request, the subcode interrupt, and the
/// currently asserted level.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Irqs {
    pub pending: bool,
    pub level: u8,
    pub reset: Irq,
    pub subcode: Irq,
}

impl Irqs {
    #[must_use]
    pub fn new() -> Self {
        Self { pending: false, level: 0, reset: Irq::enabled(), subcode: Irq::default() }
    }
}

/// Interrupt raised by the main CPU through $A12000 (level 2 on the sub CPU).
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct External {
    pub irq: Irq,
}

/// Interrupt output of every source, indexed by level. Index 0 is unused.
pub type IrqSources = [bool; 7];

/// Highest active level among the given sources, or 0 if none are active.
#[must_use]
pub fn highest_level(sources: &IrqSources) -> u8 {
    (1..sources.len()).rev().find(|&level| sources[level]).map_or(0, |level| level as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn raise_requires_enable() {
        let mut irq = Irq::default();
        assert!(!irq.raise());
        assert!(!irq.pending);

        irq.enable = true;
        assert!(irq.raise());
        assert!(irq.pending);
    }

    #[test]
    fn raise_is_idempotent() {
        let mut irq = Irq::enabled();
        assert!(irq.raise());
        assert!(!irq.raise());
        assert!(irq.output());

        assert!(irq.lower());
        assert!(!irq.lower());
        assert!(!irq.output());
    }

    #[test]
    fn disable_clears_pending() {
        let mut irq = Irq::enabled();
        irq.raise();

        assert!(irq.set_enable(false));
        assert!(!irq.pending);

        assert!(!irq.set_enable(true));
        assert!(!irq.output());
    }

    #[test]
    fn highest_level_wins() {
        let mut sources: IrqSources = [false; 7];
        assert_eq!(highest_level(&sources), 0);

        sources[1] = true;
        sources[3] = true;
        assert_eq!(highest_level(&sources), 3);

        sources[6] = true;
        assert_eq!(highest_level(&sources), 6);
    }
}
