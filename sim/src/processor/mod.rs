//! A compute core: the two-context scheduler wired to a shared fetcher and
//! one bank of lanes per context.

pub mod fetch;
pub mod lane;
pub mod sched;

use crate::dispatch::BlockAssignment;
use crate::isa::{decode, Disasm};
use crate::memory::MemPort;
use fetch::{unit_in, Fetcher};
use lane::{Lane, LaneDrive};
use sched::{ContextSignals, ContextTag, Scheduler, Stage, Step};

#[derive(Debug, Clone)]
pub struct Core {
    id: usize,
    /// lane slots per context
    block_dim: u8,
    block: Option<BlockAssignment>,
    scheduler: Scheduler,
    fetcher: Fetcher,
    fetch_sig: fetch::unit_out::Fetcher,
    /// instruction register of each context
    ir: [u16; 2],
    lanes: [Vec<Lane>; 2],
}

impl Core {
    pub fn new(id: usize, block_dim: u8) -> Self {
        Self {
            id,
            block_dim,
            block: None,
            scheduler: Scheduler::new(),
            fetcher: Fetcher::default(),
            fetch_sig: Default::default(),
            ir: [0; 2],
            lanes: [Vec::new(), Vec::new()],
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn block(&self) -> Option<BlockAssignment> {
        self.block
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Tear down the current block. Both contexts go back to IDLE.
    pub fn reset(&mut self) {
        *self = Self::new(self.id, self.block_dim);
    }

    /// Latch a freshly dispatched block and seed the lanes of both contexts.
    pub fn start(&mut self, block: BlockAssignment) {
        self.reset();
        let lanes = (0..block.thread_count)
            .map(|t| Lane::new(block.block_id, self.block_dim, t))
            .collect::<Vec<_>>();
        self.lanes = [lanes.clone(), lanes];
        self.block = Some(block);
        tracing::debug!(
            core = self.id,
            block = block.block_id,
            threads = block.thread_count,
            "start block"
        );
    }

    /// Both contexts have retired the block.
    pub fn done(&self) -> bool {
        self.block.is_some() && self.scheduler.done()
    }

    /// Data memory ports, context A's lanes first.
    pub fn data_ports(&mut self) -> impl Iterator<Item = &mut MemPort<u8>> {
        self.lanes.iter_mut().flatten().map(|lane| lane.port())
    }

    pub fn program_port(&mut self) -> &mut MemPort<u16> {
        &mut self.fetcher.port
    }

    fn signals(&self, tag: ContextTag) -> ContextSignals {
        let lanes = &self.lanes[tag.index()];
        let decoded = decode(self.ir[tag.index()]);
        ContextSignals {
            fetch_complete: self.fetch_sig.complete_for(tag),
            mem_access: decoded.touches_memory(),
            ret: decoded.ret,
            lsu_busy: lanes.iter().any(|lane| lane.lsu_busy()),
            next_pc: lanes.last().map_or(0, |lane| lane.next_pc()),
        }
    }

    /// Run one clock cycle.
    pub fn tick(&mut self) -> Step {
        let start = self.block.is_some();
        let signals = ContextTag::ALL.map(|tag| self.signals(tag));
        let pc = self.scheduler.current_pc();
        let step = self.scheduler.tick(start, &signals);
        let active = step.active;

        if step.accepted_fetch() {
            let word = self.fetch_sig.instruction;
            self.ir[active.index()] = word;
            if !decode(word).valid {
                tracing::warn!(
                    core = self.id,
                    context = %active,
                    pc,
                    "invalid instruction {:#06x}",
                    word
                );
            } else {
                tracing::trace!(core = self.id, context = %active, pc, "fetched {}", Disasm(word));
            }
        }

        // bootstrap does not fetch: the datapath sees both contexts in IDLE
        let stage = if step.bootstrap { Stage::Idle } else { step.from };
        self.fetcher.trigger(
            unit_in::Fetcher {
                stage,
                owner: active,
                pc,
                accept: step.accepted_fetch(),
            },
            &mut self.fetch_sig,
        );

        for tag in ContextTag::ALL {
            let is_active = tag == active && !step.bootstrap;
            let ctx = self.scheduler.context(tag);
            let drive = LaneDrive {
                active: is_active,
                stage: if is_active { stage } else { ctx.stage },
                issue: is_active && step.issued_request(),
                pc,
                decoded: decode(self.ir[tag.index()]),
            };
            for lane in &mut self.lanes[tag.index()] {
                lane.tick(&drive);
            }
        }
        step
    }
}

impl std::fmt::Display for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "core{}", self.id)?;
        match self.block {
            Some(b) => write!(f, " block {:>2}", b.block_id)?,
            None => write!(f, " --------")?,
        }
        for tag in ContextTag::ALL {
            let ctx = self.scheduler.context(tag);
            let mark = if self.scheduler.active() == tag { '*' } else { ' ' };
            write!(f, " | {}{} pc={:#04x} {}", mark, tag, ctx.pc, ctx.stage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    struct Rig {
        core: Core,
        program: Memory<u16>,
        data: Memory<u8>,
        cycle: u64,
    }

    impl Rig {
        fn new(program: &[u16], threads: u8, data_interval: u64) -> anyhow::Result<Self> {
            let mut core = Core::new(0, 4);
            core.start(BlockAssignment {
                block_id: 0,
                thread_count: threads,
            });
            Ok(Self {
                core,
                program: Memory::new("program", program, 1, 1)?,
                data: Memory::new("data", &[], 4, data_interval)?,
                cycle: 0,
            })
        }

        fn step(&mut self) -> Step {
            self.program.service(self.cycle, [self.core.program_port()]);
            self.data.service(self.cycle, self.core.data_ports());
            self.cycle += 1;
            self.core.tick()
        }

        fn run(&mut self, limit: u64) -> anyhow::Result<u64> {
            while !self.core.done() {
                anyhow::ensure!(self.cycle < limit, "core did not finish");
                self.step();
            }
            Ok(self.cycle)
        }
    }

    #[test]
    fn test_idle_without_block() {
        let mut core = Core::new(0, 4);
        for _ in 0..5 {
            core.tick();
        }
        assert!(!core.done());
        assert_eq!(core.scheduler().core_state(), Stage::Idle);
    }

    #[test]
    fn test_store_thread_ids() -> anyhow::Result<()> {
        // CONST R1, #1; ADD R0, %threadIdx, R1; STR %threadIdx, R0; RET
        let program = [
            0b1001_0001_0000_0001,
            0b0011_0000_1111_0001,
            0b1000_0000_1111_0000,
            0b1111_0000_0000_0000,
        ];
        let mut rig = Rig::new(&program, 3, 1)?;
        rig.run(500)?;
        assert_eq!(&rig.data.cells()[..4], &[1, 2, 3, 0]);
        for tag in ContextTag::ALL {
            assert!(rig.core.scheduler().context(tag).finished);
        }
        Ok(())
    }

    #[test]
    fn test_memory_stall_lets_b_run() -> anyhow::Result<()> {
        // LDR R0, R0; RET
        let program = [0b0111_0000_0000_0000, 0b1111_0000_0000_0000];
        let mut rig = Rig::new(&program, 4, 16)?;
        let mut b_ran_while_a_waits = false;
        while !rig.core.done() {
            anyhow::ensure!(rig.cycle < 1000, "core did not finish");
            let a = rig.core.scheduler().context(ContextTag::A).stage;
            let step = rig.step();
            if a == Stage::Wait {
                assert_eq!(step.active, ContextTag::B);
                b_ran_while_a_waits |= step.from != step.to;
            }
        }
        assert!(b_ran_while_a_waits);
        Ok(())
    }

    #[test]
    fn test_reset_clears_block() -> anyhow::Result<()> {
        let mut rig = Rig::new(&[0b1111_0000_0000_0000], 1, 1)?;
        rig.run(100)?;
        assert!(rig.core.done());
        rig.core.reset();
        assert!(!rig.core.done());
        assert_eq!(rig.core.block(), None);
        Ok(())
    }
}
