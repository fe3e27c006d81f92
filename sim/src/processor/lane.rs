//! Per-thread execution resources. Every context of a core owns one lane per
//! thread slot; the lanes of a context act only while the context is active.

use super::sched::Stage;
use crate::dsl::mtc;
use crate::isa::{self, reg_code, Decoded, RegInput, FIRST_SPECIAL_REG, REG_COUNT};
use crate::memory::{MemPort, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LsuState {
    #[default]
    Idle,
    Requesting,
    Waiting,
    Done,
}

impl LsuState {
    /// A busy unit keeps its context in WAIT.
    pub fn is_busy(self) -> bool {
        mtc(self, [LsuState::Requesting, LsuState::Waiting])
    }
}

crate::define_units! {
    RegisterFile reg_file {
        .input(
            active: bool,
            stage: Stage,
            decoded: Decoded,
            alu_out: u8,
            lsu_out: u8
        )
        .output(rs_data: u8, rt_data: u8)
        regs: [u8; REG_COUNT]
    } {
        if active {
            match stage {
                Stage::Request => {
                    *rs_data = regs[decoded.rs as usize];
                    *rt_data = regs[decoded.rt as usize];
                }
                // the block/thread registers are read-only
                Stage::Update if decoded.reg_write && decoded.rd < FIRST_SPECIAL_REG => {
                    regs[decoded.rd as usize] = match decoded.reg_input {
                        RegInput::Arithmetic => alu_out,
                        RegInput::Memory => lsu_out,
                        RegInput::Constant => decoded.imm,
                    };
                }
                _ => {}
            }
        }
    }

    /// The load/store unit's handshake keeps running while its context is
    /// switched out; only issuing and retiring need the context to be active.
    LoadStoreUnit lsu {
        .input(
            active: bool,
            /// the context leaves REQUEST this cycle
            issue: bool,
            stage: Stage,
            decoded: Decoded,
            rs_data: u8,
            rt_data: u8
        )
        .output(state: LsuState, lsu_out: u8)
        port: MemPort<u8>
    } {
        match *state {
            LsuState::Idle => {
                if active && issue && decoded.touches_memory() {
                    let req = if decoded.mem_read {
                        Request::Read { addr: rs_data }
                    } else {
                        Request::Write {
                            addr: rs_data,
                            data: rt_data,
                        }
                    };
                    port.issue(req);
                    *state = LsuState::Requesting;
                }
            }
            LsuState::Requesting => *state = LsuState::Waiting,
            LsuState::Waiting => {
                if let Some(data) = port.take_ready() {
                    *lsu_out = data;
                    *state = LsuState::Done;
                }
            }
            LsuState::Done => {
                if active && stage == Stage::Update {
                    *state = LsuState::Idle;
                }
            }
        }
    }

    ArithmeticLogicUnit alu {
        .input(
            active: bool,
            stage: Stage,
            decoded: Decoded,
            rs_data: u8,
            rt_data: u8
        )
        .output(alu_out: u8)
    } {
        if active && stage == Stage::Execute {
            *alu_out = if decoded.alu_compare {
                isa::compare(rs_data, rt_data)
            } else {
                isa::alu_compute(decoded.alu_op, rs_data, rt_data)
            };
        }
    }

    ProgramCounter pc {
        .input(
            active: bool,
            stage: Stage,
            decoded: Decoded,
            pc: u8,
            alu_out: u8
        )
        .output(next_pc: u8)
        nzp: u8
    } {
        if active {
            match stage {
                Stage::Execute => {
                    *next_pc = if decoded.branch && *nzp & decoded.nzp != 0 {
                        decoded.imm
                    } else {
                        pc.wrapping_add(1)
                    };
                }
                Stage::Update if decoded.nzp_write => *nzp = alu_out & 0b111,
                _ => {}
            }
        }
    }
}

/// Signals shared by every lane of a context for one cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaneDrive {
    pub active: bool,
    /// stage of the context during this cycle
    pub stage: Stage,
    pub issue: bool,
    pub pc: u8,
    pub decoded: Decoded,
}

#[derive(Debug, Clone)]
pub struct Lane {
    units: Units,
    sig: UnitOutputSignal,
}

impl Lane {
    pub fn new(block_idx: u8, block_dim: u8, thread_idx: u8) -> Self {
        let mut units = Units::default();
        let regs = &mut units.reg_file.regs;
        regs[reg_code::BLOCK_IDX as usize] = block_idx;
        regs[reg_code::BLOCK_DIM as usize] = block_dim;
        regs[reg_code::THREAD_IDX as usize] = thread_idx;
        Self {
            units,
            sig: UnitOutputSignal::default(),
        }
    }

    pub fn tick(&mut self, drive: &LaneDrive) {
        let LaneDrive {
            active,
            stage,
            issue,
            pc,
            decoded,
        } = *drive;
        let Self { units, sig } = self;

        units.reg_file.trigger(
            unit_in::RegisterFile {
                active,
                stage,
                decoded,
                alu_out: sig.alu.alu_out,
                lsu_out: sig.lsu.lsu_out,
            },
            &mut sig.reg_file,
        );
        units.lsu.trigger(
            unit_in::LoadStoreUnit {
                active,
                issue,
                stage,
                decoded,
                rs_data: sig.reg_file.rs_data,
                rt_data: sig.reg_file.rt_data,
            },
            &mut sig.lsu,
        );
        units.alu.trigger(
            unit_in::ArithmeticLogicUnit {
                active,
                stage,
                decoded,
                rs_data: sig.reg_file.rs_data,
                rt_data: sig.reg_file.rt_data,
            },
            &mut sig.alu,
        );
        units.pc.trigger(
            unit_in::ProgramCounter {
                active,
                stage,
                decoded,
                pc,
                alu_out: sig.alu.alu_out,
            },
            &mut sig.pc,
        );
    }

    pub fn lsu_busy(&self) -> bool {
        self.sig.lsu.state.is_busy()
    }

    pub fn next_pc(&self) -> u8 {
        self.sig.pc.next_pc
    }

    pub fn port(&mut self) -> &mut MemPort<u8> {
        &mut self.units.lsu.port
    }

    pub fn registers(&self) -> &[u8; REG_COUNT] {
        &self.units.reg_file.regs
    }
}
