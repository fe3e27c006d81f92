//! Building blocks shared by every clocked component of the model.
//!
//! The whole device runs on a single global clock. A component exposes a
//! `tick`-like method that consumes the signals of the current cycle and
//! produces the signals seen by the next one; nothing happens between ticks.

/// A clocked simulator. One call to [`GpuSim::step`] is one clock cycle.
pub trait GpuSim {
    /// Advance the device by one cycle.
    fn step(&mut self);

    /// Whether the current kernel has completed.
    fn is_terminate(&self) -> bool;

    /// Number of cycles elapsed since the last reset.
    fn cycle_count(&self) -> u64;

    /// Step until the kernel terminates. Returns the cycle count.
    ///
    /// A memory request that never completes stalls the device forever, so
    /// the caller has to bound the run.
    fn run(&mut self, max_cycles: u64) -> anyhow::Result<u64> {
        while !self.is_terminate() {
            if self.cycle_count() >= max_cycles {
                anyhow::bail!("exceed maximum cycle limit ({})", max_cycles);
            }
            self.step();
        }
        Ok(self.cycle_count())
    }
}

/// A signal that is asserted for exactly one cycle.
///
/// Unlike a held boolean, a pulse carries its payload only on the cycle it
/// fires; the receiver has to latch whatever it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse<T>(Option<T>);

impl<T> Pulse<T> {
    pub fn idle() -> Self {
        Self(None)
    }
    pub fn fire(payload: T) -> Self {
        Self(Some(payload))
    }
    pub fn fired(self) -> Option<T> {
        self.0
    }
    pub fn is_fired(&self) -> bool {
        self.0.is_some()
    }
}

impl<T> Default for Pulse<T> {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        left: u64,
        cycle: u64,
    }

    impl GpuSim for Countdown {
        fn step(&mut self) {
            self.left = self.left.saturating_sub(1);
            self.cycle += 1;
        }
        fn is_terminate(&self) -> bool {
            self.left == 0
        }
        fn cycle_count(&self) -> u64 {
            self.cycle
        }
    }

    #[test]
    fn test_run_limit() {
        let mut sim = Countdown { left: 5, cycle: 0 };
        assert_eq!(sim.run(10).unwrap(), 5);

        let mut sim = Countdown { left: 50, cycle: 0 };
        assert!(sim.run(10).is_err());
    }

    #[test]
    fn test_pulse() {
        let p: Pulse<u8> = Pulse::default();
        assert!(!p.is_fired());
        assert_eq!(Pulse::fire(3).fired(), Some(3));
    }
}
