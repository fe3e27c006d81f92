//! Instruction set of the SIMT cores.
//!
//! Every instruction is a 16-bit word. The opcode lives in the top nibble,
//! the remaining twelve bits are split into register or immediate fields:
//!
//! ```text
//! 15    12 11     8 7      4 3      0
//! | op    | rd     | rs     | rt     |
//! | op    | nzp |  | imm             |
//! ```

use anyhow::Context;

use crate::memory::ADDR_SPACE;

macro_rules! define_code {
    {
        @mod $modname:ident;
        @type $typ:ty;
        $( $cname:ident = $cval:expr; )*
    } => {
        pub mod $modname {
            $(pub const $cname : $typ = $cval; )*
            #[allow(unused)]
            pub fn name_of(code: $typ) -> &'static str {
                match code {
                    $($cname => stringify!($cname), )*
                    _ => "no name"
                }
            }
        }
    };
}

define_code! {
    @mod op_code;
    @type u8;
    NOP = 0b0000;
    BRNZP = 0b0001;
    CMP = 0b0010;
    ADD = 0b0011;
    SUB = 0b0100;
    MUL = 0b0101;
    DIV = 0b0110;
    LDR = 0b0111;
    STR = 0b1000;
    CONST = 0b1001;
    RET = 0b1111;
}

define_code! {
    @mod reg_code;
    @type u8;
    R0 = 0;
    R1 = 1;
    R2 = 2;
    R3 = 3;
    R4 = 4;
    R5 = 5;
    R6 = 6;
    R7 = 7;
    R8 = 8;
    R9 = 9;
    R10 = 10;
    R11 = 11;
    R12 = 12;
    BLOCK_IDX = 13;
    BLOCK_DIM = 14;
    THREAD_IDX = 15;
}

/// Condition bits produced by `CMP` and tested by `BRnzp`.
pub mod nzp {
    /// `rs < rt`
    pub const N: u8 = 0b100;
    /// `rs == rt`
    pub const Z: u8 = 0b010;
    /// `rs > rt`
    pub const P: u8 = 0b001;
}

/// Number of registers per thread.
pub const REG_COUNT: usize = 16;
/// Registers from this index on are seeded by the hardware and read-only.
pub const FIRST_SPECIAL_REG: u8 = reg_code::BLOCK_IDX;

/// Source of the value written back to the destination register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegInput {
    #[default]
    Arithmetic,
    Memory,
    Constant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AluOp {
    #[default]
    Add,
    Sub,
    Mul,
    Div,
}

/// Control fields of a decoded instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoded {
    pub opcode: u8,
    pub rd: u8,
    pub rs: u8,
    pub rt: u8,
    /// branch condition mask
    pub nzp: u8,
    pub imm: u8,

    pub reg_write: bool,
    pub mem_read: bool,
    pub mem_write: bool,
    pub nzp_write: bool,
    pub reg_input: RegInput,
    pub alu_op: AluOp,
    /// the ALU outputs comparison bits instead of an arithmetic result
    pub alu_compare: bool,
    /// next pc comes from `imm` when the condition holds
    pub branch: bool,
    pub ret: bool,
    /// false for unmapped opcodes
    pub valid: bool,
}

impl Decoded {
    pub fn touches_memory(&self) -> bool {
        self.mem_read || self.mem_write
    }
}

pub fn decode(word: u16) -> Decoded {
    let opcode = (word >> 12) as u8;
    let mut d = Decoded {
        opcode,
        rd: ((word >> 8) & 0xf) as u8,
        rs: ((word >> 4) & 0xf) as u8,
        rt: (word & 0xf) as u8,
        nzp: ((word >> 9) & 0b111) as u8,
        imm: (word & 0xff) as u8,
        valid: true,
        ..Default::default()
    };
    use op_code::*;
    match opcode {
        NOP => {}
        BRNZP => d.branch = true,
        CMP => {
            d.alu_compare = true;
            d.nzp_write = true;
        }
        ADD | SUB | MUL | DIV => {
            d.reg_write = true;
            d.reg_input = RegInput::Arithmetic;
            d.alu_op = match opcode {
                ADD => AluOp::Add,
                SUB => AluOp::Sub,
                MUL => AluOp::Mul,
                _ => AluOp::Div,
            };
        }
        LDR => {
            d.reg_write = true;
            d.reg_input = RegInput::Memory;
            d.mem_read = true;
        }
        STR => d.mem_write = true,
        CONST => {
            d.reg_write = true;
            d.reg_input = RegInput::Constant;
        }
        RET => d.ret = true,
        _ => d.valid = false,
    }
    d
}

/// 8-bit arithmetic. Division by zero yields zero.
pub fn alu_compute(op: AluOp, a: u8, b: u8) -> u8 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Mul => a.wrapping_mul(b),
        AluOp::Div => {
            if b == 0 {
                tracing::warn!(dividend = a, "division by zero");
                0
            } else {
                a / b
            }
        }
    }
}

/// Unsigned comparison in `nzp` encoding.
pub fn compare(a: u8, b: u8) -> u8 {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => nzp::N,
        std::cmp::Ordering::Equal => nzp::Z,
        std::cmp::Ordering::Greater => nzp::P,
    }
}

/// Register operand for display.
pub struct Reg(pub u8);

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            reg_code::BLOCK_IDX => write!(f, "%blockIdx"),
            reg_code::BLOCK_DIM => write!(f, "%blockDim"),
            reg_code::THREAD_IDX => write!(f, "%threadIdx"),
            r => write!(f, "R{}", r),
        }
    }
}

/// Disassembled view of an instruction word.
pub struct Disasm(pub u16);

impl std::fmt::Display for Disasm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = decode(self.0);
        let (rd, rs, rt) = (Reg(d.rd), Reg(d.rs), Reg(d.rt));
        use op_code::*;
        match d.opcode {
            NOP => write!(f, "NOP"),
            BRNZP => {
                write!(f, "BR")?;
                for (bit, c) in [(nzp::N, 'n'), (nzp::Z, 'z'), (nzp::P, 'p')] {
                    if d.nzp & bit != 0 {
                        write!(f, "{}", c)?;
                    }
                }
                write!(f, " #{}", d.imm)
            }
            CMP => write!(f, "CMP {}, {}", rs, rt),
            ADD | SUB | MUL | DIV => {
                let name = op_code::name_of(d.opcode);
                write!(f, "{} {}, {}, {}", name, rd, rs, rt)
            }
            LDR => write!(f, "LDR {}, {}", rd, rs),
            STR => write!(f, "STR {}, {}", rs, rt),
            CONST => write!(f, "CONST {}, #{}", rd, d.imm),
            RET => write!(f, "RET"),
            _ => write!(f, "<invalid {:#06x}>", self.0),
        }
    }
}

/// Upper bound of instructions executed by a single thread in [`simulate`].
pub const STEP_LIMIT: u64 = 1 << 16;

pub struct StandardResult {
    /// Final data memory.
    pub data: Vec<u8>,
    /// Number of instructions retired over all threads (including `RET`).
    pub n_insts: u64,
}

/// Reference interpreter: every thread of the kernel runs to completion one
/// after another, without any notion of cycles.
pub fn simulate(
    program: &[u16],
    data: &[u8],
    total_threads: usize,
    block_dim: u8,
) -> anyhow::Result<StandardResult> {
    anyhow::ensure!(block_dim > 0, "block dimension must be positive");
    anyhow::ensure!(data.len() <= ADDR_SPACE, "data does not fit in memory");
    let mut mem = data.to_vec();
    mem.resize(ADDR_SPACE, 0);
    let mut n_insts = 0;

    for tid in 0..total_threads {
        let (block, thread) = (tid / block_dim as usize, tid % block_dim as usize);
        let mut regs = [0u8; REG_COUNT];
        regs[reg_code::BLOCK_IDX as usize] = block as u8;
        regs[reg_code::BLOCK_DIM as usize] = block_dim;
        regs[reg_code::THREAD_IDX as usize] = thread as u8;
        let mut flags = 0u8;
        let mut pc = 0usize;
        let mut steps = 0u64;

        loop {
            let word = *program
                .get(pc)
                .ok_or_else(|| anyhow::anyhow!("pc {:#04x} runs past the program", pc))
                .with_context(|| format!("thread {}", tid))?;
            steps += 1;
            anyhow::ensure!(steps <= STEP_LIMIT, "thread {}: exceed step limit", tid);
            let d = decode(word);
            anyhow::ensure!(
                d.valid,
                "thread {}: invalid instruction {:#06x} at {:#04x}",
                tid,
                word,
                pc
            );
            if d.ret {
                break;
            }
            let (a, b) = (regs[d.rs as usize], regs[d.rt as usize]);
            let value = match d.reg_input {
                RegInput::Arithmetic => alu_compute(d.alu_op, a, b),
                RegInput::Memory => mem[a as usize],
                RegInput::Constant => d.imm,
            };
            if d.mem_write {
                mem[a as usize] = b;
            }
            if d.nzp_write {
                flags = compare(a, b);
            }
            if d.reg_write && d.rd < FIRST_SPECIAL_REG {
                regs[d.rd as usize] = value;
            }
            pc = if d.branch && flags & d.nzp != 0 {
                d.imm as usize
            } else {
                pc + 1
            };
        }
        n_insts += steps;
    }

    Ok(StandardResult { data: mem, n_insts })
}
