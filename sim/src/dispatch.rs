//! Block dispatcher.
//!
//! A kernel launch of `total_threads` threads is cut into blocks of
//! `block_size` threads. The dispatcher hands blocks to cores, highest block
//! id first, recycles cores when they report completion and asserts `done`
//! once every block has completed.
//!
//! [`Dispatcher::tick`] is a pure reducer: it reads the current state and the
//! inputs of the cycle and returns the next state together with the outputs.
//! Decisions taken for several cores in the same cycle see each other's
//! effects, so no block is ever handed out twice.

use bitvec::{array::BitArray, BitArr};
use serde::Serialize;

use crate::framework::Pulse;

/// Largest number of blocks a single launch may consist of.
pub const MAX_BLOCKS: usize = 64;

/// One bit per block id.
pub type BlockMask = BitArr!(for MAX_BLOCKS, in u64);

/// Block metadata latched by a core together with its start pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockAssignment {
    pub block_id: u8,
    pub thread_count: u8,
}

/// Number of blocks needed for `total_threads`.
pub fn block_count(total_threads: usize, block_size: u8) -> usize {
    total_threads.div_ceil(block_size as usize)
}

/// Dispatcher's view of one core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreSlot {
    /// the core runs a block and has not reported completion yet
    pub busy: bool,
    /// the core is held in reset and gets a block on the next cycle
    pub awaiting: bool,
    pub block: Option<BlockAssignment>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchInput<'a> {
    /// Launch request, a level held by the host.
    pub start: bool,
    pub total_threads: usize,
    /// `done` line of every core.
    pub core_done: &'a [bool],
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOutput {
    /// Held reset line of every core.
    pub reset: Vec<bool>,
    /// One-cycle start pulse carrying the block for every core.
    pub start: Vec<Pulse<BlockAssignment>>,
    /// Blocks whose completion was observed this cycle, per core.
    pub completed: Vec<Option<BlockAssignment>>,
    /// Kernel done, held until the next reset.
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    block_size: u8,
    total_threads: usize,
    total_blocks: usize,
    dispatched: BlockMask,
    dispatched_count: usize,
    completed_count: usize,
    cores: Vec<CoreSlot>,
    /// a launch is in progress
    launched: bool,
    done: bool,
}

impl Dispatcher {
    pub fn new(core_count: usize, block_size: u8) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            block_size,
            total_threads: 0,
            total_blocks: 0,
            dispatched: BitArray::ZERO,
            dispatched_count: 0,
            completed_count: 0,
            cores: vec![CoreSlot::default(); core_count],
            launched: false,
            done: false,
        }
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }
    pub fn dispatched_count(&self) -> usize {
        self.dispatched_count
    }
    pub fn completed_count(&self) -> usize {
        self.completed_count
    }
    pub fn dispatched(&self) -> &BlockMask {
        &self.dispatched
    }
    pub fn cores(&self) -> &[CoreSlot] {
        &self.cores
    }
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn thread_count_of(&self, block_id: usize) -> u8 {
        if block_id + 1 == self.total_blocks {
            (self.total_threads - block_id * self.block_size as usize) as u8
        } else {
            self.block_size
        }
    }

    /// Highest block id that is not dispatched yet.
    fn pick(&self) -> Option<usize> {
        (0..MAX_BLOCKS)
            .rev()
            .find(|&id| id < self.total_blocks && !self.dispatched[id])
    }

    /// Compute the next state and the outputs of this cycle.
    ///
    /// # Panics
    ///
    /// When a launch needs more than [`MAX_BLOCKS`] blocks, or when
    /// `core_done` does not cover every core.
    pub fn tick(&self, input: &DispatchInput) -> (Self, DispatchOutput) {
        assert_eq!(input.core_done.len(), self.cores.len(), "one done line per core");
        let mut next = self.clone();
        let n = self.cores.len();
        let mut out = DispatchOutput {
            reset: vec![false; n],
            start: vec![Pulse::idle(); n],
            completed: vec![None; n],
            done: false,
        };

        if input.start && !self.launched && !self.done {
            let total_blocks = block_count(input.total_threads, self.block_size);
            assert!(
                total_blocks <= MAX_BLOCKS,
                "{} blocks exceed the dispatcher capacity of {}",
                total_blocks,
                MAX_BLOCKS
            );
            next.total_threads = input.total_threads;
            next.total_blocks = total_blocks;
            next.launched = true;
            for slot in &mut next.cores {
                slot.awaiting = true;
            }
            tracing::info!(
                threads = input.total_threads,
                blocks = total_blocks,
                "kernel launched"
            );
        } else if self.launched {
            // assignment: `next.dispatched` is the shadow mask, updated core by core
            for (i, slot) in self.cores.iter().enumerate() {
                if !slot.awaiting {
                    continue;
                }
                next.cores[i].awaiting = false;
                let Some(id) = next.pick() else {
                    continue;
                };
                next.dispatched.set(id, true);
                next.dispatched_count += 1;
                let block = BlockAssignment {
                    block_id: id as u8,
                    thread_count: next.thread_count_of(id),
                };
                next.cores[i].busy = true;
                next.cores[i].block = Some(block);
                out.start[i] = Pulse::fire(block);
                tracing::debug!(core = i, block = id, threads = block.thread_count, "dispatch");
            }

            // completion is judged on the busy flags of the current state
            for (i, slot) in self.cores.iter().enumerate() {
                if slot.busy && input.core_done[i] {
                    next.completed_count += 1;
                    next.cores[i].busy = false;
                    next.cores[i].awaiting = true;
                    out.completed[i] = slot.block;
                    tracing::debug!(core = i, block = ?slot.block.map(|b| b.block_id), "complete");
                }
            }
        }

        if next.launched && next.completed_count >= next.total_blocks {
            next.done = true;
            next.launched = false;
            tracing::info!(blocks = next.total_blocks, "kernel done");
        }
        debug_assert!(next.completed_count <= next.dispatched_count);

        out.reset = next.cores.iter().map(|slot| slot.awaiting).collect();
        out.done = next.done;
        (next, out)
    }
}
