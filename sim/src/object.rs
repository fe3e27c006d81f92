//! Binary representation of assembled programs.

use std::{collections::BTreeMap, fmt::Display};

use anyhow::{ensure, Context, Result};

use crate::isa::{op_code, AluOp, Disasm};
use crate::memory::ADDR_SPACE;

pub type SymbolMap = BTreeMap<String, u8>;

/// Immediate values (can be raw number or address of label)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Imm {
    Num(u64),
    Label(String),
}

impl Imm {
    fn desymbol(&self, sym: &SymbolMap) -> Result<u8> {
        match self {
            Imm::Num(n) => {
                ensure!(*n <= u8::MAX as u64, "immediate {} does not fit in 8 bits", n);
                Ok(*n as u8)
            }
            Imm::Label(label) => sym
                .get(label)
                .copied()
                .with_context(|| format!("unknown label `{}`", label)),
        }
    }
}

/// Parsed instruction. Registers are already resolved to their index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Nop,
    Br(u8, Imm),
    Cmp(u8, u8),
    Arith(AluOp, u8, u8, u8),
    Ldr(u8, u8),
    Str(u8, u8),
    Const(u8, Imm),
    Ret,
}

/// (op, a, b, c) => op << 12 | a << 8 | b << 4 | c
macro_rules! h4 {
    ($op:expr, $a:expr, $b:expr, $c:expr) => {
        ($op as u16) << 12 | ($a as u16) << 8 | ($b as u16) << 4 | ($c as u16)
    };
}

impl Inst {
    pub fn encode(&self, sym: &SymbolMap) -> Result<u16> {
        use op_code::*;
        Ok(match self {
            Inst::Nop => h4!(NOP, 0, 0, 0),
            Inst::Br(nzp, target) => h4!(BRNZP, *nzp << 1, 0, 0) | target.desymbol(sym)? as u16,
            Inst::Cmp(rs, rt) => h4!(CMP, 0, *rs, *rt),
            Inst::Arith(op, rd, rs, rt) => {
                let code = match op {
                    AluOp::Add => ADD,
                    AluOp::Sub => SUB,
                    AluOp::Mul => MUL,
                    AluOp::Div => DIV,
                };
                h4!(code, *rd, *rs, *rt)
            }
            Inst::Ldr(rd, rs) => h4!(LDR, *rd, *rs, 0),
            Inst::Str(rs, rt) => h4!(STR, 0, *rs, *rt),
            Inst::Const(rd, imm) => h4!(CONST, *rd, 0, 0) | imm.desymbol(sym)? as u16,
            Inst::Ret => h4!(RET, 0, 0, 0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub addr: Option<u8>,
    pub inst: Option<Inst>,
    pub label: Option<String>,
    /// encoded word, filled in by the second pass
    pub word: Option<u16>,
    pub src: String,
}

impl SourceInfo {
    pub fn write_object(&mut self, obj: &mut Object) -> Result<()> {
        if let (Some(addr), Some(inst)) = (self.addr, &self.inst) {
            let word = inst.encode(&obj.symbols)?;
            debug_assert_eq!(addr as usize, obj.words.len());
            obj.words.push(word);
            self.word = Some(word);
        }
        Ok(())
    }
}

/// Assembled program: instruction words from address 0 on.
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub words: Vec<u16>,
    /// basically labels
    pub symbols: SymbolMap,
}

impl Object {
    /// Program memory image.
    pub fn init_mem(&self) -> Vec<u16> {
        let mut mem = self.words.clone();
        mem.resize(ADDR_SPACE, 0);
        mem
    }
}

/// Object with the source it was assembled from.
pub struct ObjectExt {
    pub obj: Object,
    pub source: Vec<SourceInfo>,
}

impl Display for ObjectExt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for info in &self.source {
            match (info.addr, info.word) {
                (Some(addr), Some(word)) => write!(f, "{:#04x}: {:04x}", addr, word)?,
                _ => write!(f, "{:10}", "")?,
            }
            writeln!(f, " | {}", info.src.trim_end())?;
        }
        Ok(())
    }
}

impl ObjectExt {
    /// Disassembly of the program words.
    pub fn disassemble(&self) -> String {
        self.obj
            .words
            .iter()
            .enumerate()
            .map(|(addr, w)| format!("{:#04x}: {}\n", addr, Disasm(*w)))
            .collect()
    }
}
