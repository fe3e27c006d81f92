//! Instruction fetcher shared by both contexts of a core.

use super::sched::{ContextTag, Stage};
use crate::memory::{MemPort, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetcherState {
    #[default]
    Idle,
    Fetching,
    Fetched,
}

crate::define_units! {
    /// Reads one instruction word from program memory for the active context.
    /// The result is tagged with the context it was fetched for; a result
    /// left behind by a context switch is discarded once the other context
    /// starts fetching.
    Fetcher fetcher {
        .input(
            /// stage of the active context
            stage: Stage,
            /// the active context
            owner: ContextTag,
            pc: u8,
            /// the active context consumed the instruction this cycle
            accept: bool
        )
        .output(
            state: FetcherState,
            instruction: u16,
            fetched_for: ContextTag
        )
        port: MemPort<u16>
    } {
        match *state {
            FetcherState::Idle => {
                if stage == Stage::Fetch {
                    port.issue(Request::Read { addr: pc });
                    *fetched_for = owner;
                    *state = FetcherState::Fetching;
                }
            }
            FetcherState::Fetching => {
                if let Some(word) = port.take_ready() {
                    *instruction = word;
                    *state = FetcherState::Fetched;
                }
            }
            FetcherState::Fetched => {
                if accept {
                    *state = FetcherState::Idle;
                } else if stage == Stage::Fetch && *fetched_for != owner {
                    tracing::trace!(stale = %fetched_for, "squash fetched instruction");
                    port.issue(Request::Read { addr: pc });
                    *fetched_for = owner;
                    *state = FetcherState::Fetching;
                }
            }
        }
    }
}

impl unit_out::Fetcher {
    /// Whether an instruction for `tag` is waiting to be consumed.
    pub fn complete_for(&self, tag: ContextTag) -> bool {
        self.state == FetcherState::Fetched && self.fetched_for == tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    fn input(stage: Stage, owner: ContextTag, pc: u8, accept: bool) -> unit_in::Fetcher {
        unit_in::Fetcher {
            stage,
            owner,
            pc,
            accept,
        }
    }

    #[test]
    fn test_fetch_and_squash() -> anyhow::Result<()> {
        let mut mem = Memory::new("program", &[0x1111, 0x2222, 0x3333], 1, 1)?;
        let mut units = Units::default();
        let mut sig = UnitOutputSignal::default();

        // B asks for pc 1
        units
            .fetcher
            .trigger(input(Stage::Fetch, ContextTag::B, 1, false), &mut sig.fetcher);
        assert_eq!(sig.fetcher.state, FetcherState::Fetching);
        mem.service(1, [&mut units.fetcher.port]);
        units
            .fetcher
            .trigger(input(Stage::Execute, ContextTag::A, 0, false), &mut sig.fetcher);
        assert!(sig.fetcher.complete_for(ContextTag::B));
        assert!(!sig.fetcher.complete_for(ContextTag::A));

        // A takes over the datapath and fetches pc 2, dropping B's word
        units
            .fetcher
            .trigger(input(Stage::Fetch, ContextTag::A, 2, false), &mut sig.fetcher);
        assert_eq!(sig.fetcher.state, FetcherState::Fetching);
        assert_eq!(sig.fetcher.fetched_for, ContextTag::A);
        mem.service(2, [&mut units.fetcher.port]);
        units
            .fetcher
            .trigger(input(Stage::Fetch, ContextTag::A, 2, false), &mut sig.fetcher);
        assert!(sig.fetcher.complete_for(ContextTag::A));
        assert_eq!(sig.fetcher.instruction, 0x3333);

        units
            .fetcher
            .trigger(input(Stage::Fetch, ContextTag::A, 2, true), &mut sig.fetcher);
        assert_eq!(sig.fetcher.state, FetcherState::Idle);
        Ok(())
    }
}
