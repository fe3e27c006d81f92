//! Banked memories with a request/ready handshake.
//!
//! Each requester owns a [`MemPort`]. It places a request on the port and
//! waits until the memory fills in `ready`. A memory serves at most
//! `channels` ports per service cycle, scanning them in a fixed order, and
//! only every `interval` cycles, which models a slow memory.

use anyhow::ensure;

/// Both memories are addressed by 8-bit addresses.
pub const ADDR_SPACE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<T> {
    Read { addr: u8 },
    Write { addr: u8, data: T },
}

#[derive(Debug, Clone, Default)]
pub struct MemPort<T> {
    pending: Option<Request<T>>,
    ready: Option<T>,
}

impl<T: Copy> MemPort<T> {
    /// Place a request. Any unconsumed response is dropped.
    pub fn issue(&mut self, req: Request<T>) {
        self.pending = Some(req);
        self.ready = None;
    }
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
    /// Consume the response, if it arrived.
    pub fn take_ready(&mut self) -> Option<T> {
        self.ready.take()
    }
}

#[derive(Debug, Clone)]
pub struct Memory<T> {
    name: &'static str,
    cells: Vec<T>,
    channels: usize,
    interval: u64,
}

impl<T: Copy + Default + std::fmt::Debug> Memory<T> {
    pub fn new(
        name: &'static str,
        init: &[T],
        channels: usize,
        interval: u64,
    ) -> anyhow::Result<Self> {
        ensure!(
            init.len() <= ADDR_SPACE,
            "{} memory: {} words do not fit in {} cells",
            name,
            init.len(),
            ADDR_SPACE
        );
        ensure!(channels > 0, "{} memory needs at least one channel", name);
        ensure!(interval > 0, "{} memory: service interval must be positive", name);
        let mut cells = init.to_vec();
        cells.resize(ADDR_SPACE, T::default());
        Ok(Self {
            name,
            cells,
            channels,
            interval,
        })
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Serve pending requests of `ports` for this cycle. Returns the number of
    /// requests served.
    pub fn service<'a>(
        &mut self,
        cycle: u64,
        ports: impl IntoIterator<Item = &'a mut MemPort<T>>,
    ) -> usize
    where
        T: 'a,
    {
        if cycle % self.interval != 0 {
            return 0;
        }
        let mut served = 0;
        for port in ports {
            if served == self.channels {
                break;
            }
            let Some(req) = port.pending.take() else {
                continue;
            };
            let data = match req {
                Request::Read { addr } => self.cells[addr as usize],
                Request::Write { addr, data } => {
                    self.cells[addr as usize] = data;
                    data
                }
            };
            tracing::trace!(memory = self.name, ?req, "served");
            port.ready = Some(data);
            served += 1;
        }
        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_and_order() -> anyhow::Result<()> {
        let mut mem = Memory::new("data", &[10u8, 11, 12], 2, 1)?;
        let mut ports = vec![MemPort::default(); 3];
        for (i, port) in ports.iter_mut().enumerate() {
            port.issue(Request::Read { addr: i as u8 });
        }
        assert_eq!(mem.service(0, ports.iter_mut()), 2);
        assert_eq!(ports[0].take_ready(), Some(10));
        assert_eq!(ports[1].take_ready(), Some(11));
        assert!(ports[2].is_pending());

        assert_eq!(mem.service(1, ports.iter_mut()), 1);
        assert_eq!(ports[2].take_ready(), Some(12));
        Ok(())
    }

    #[test]
    fn test_interval_and_write() -> anyhow::Result<()> {
        let mut mem = Memory::new("data", &[], 4, 3)?;
        let mut port = MemPort::default();
        port.issue(Request::Write { addr: 7, data: 42u8 });
        assert_eq!(mem.service(1, [&mut port]), 0);
        assert_eq!(mem.service(2, [&mut port]), 0);
        assert_eq!(mem.service(3, [&mut port]), 1);
        assert_eq!(port.take_ready(), Some(42));
        assert_eq!(mem.cells()[7], 42);
        Ok(())
    }

    #[test]
    fn test_capacity() {
        assert!(Memory::new("program", &[0u16; ADDR_SPACE + 1], 1, 1).is_err());
        assert!(Memory::new("program", &[0u16; 4], 0, 1).is_err());
    }
}
