//! This module provides parsing utilities for the SIMT assembly.
use anyhow::{ensure, Context, Result};

use pest::{iterators::Pair, Parser};
use pest_derive::Parser;

use crate::{
    isa::{nzp, reg_code, AluOp},
    memory::ADDR_SPACE,
    object::{Imm, Inst, Object, ObjectExt, SourceInfo},
    utils::parse_literal,
};

#[derive(Parser)]
#[grammar = "asm.pest"] // relative to src
pub struct SimtAsmParser;

pub fn parse(src: &str) -> Result<pest::iterators::Pairs<'_, Rule>> {
    let main = SimtAsmParser::parse(Rule::main, src)
        .context("fail to parse assembly")?
        .next()
        .context("empty parse tree")?;
    Ok(main.into_inner())
}

#[derive(Default)]
pub struct AssembleOption {
    verbose: bool,
}

impl AssembleOption {
    pub fn set_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn parse_reg(pair: Pair<'_, Rule>) -> Result<u8> {
    let inner = pair.into_inner().next().context("missing register")?;
    match inner.as_rule() {
        Rule::reg_special => Ok(match inner.as_str() {
            "%blockIdx" => reg_code::BLOCK_IDX,
            "%blockDim" => reg_code::BLOCK_DIM,
            _ => reg_code::THREAD_IDX,
        }),
        _ => {
            let s = inner.as_str();
            let index: u8 = s[1..].parse().ok().filter(|r| *r <= 15).with_context(|| {
                format!("invalid register `{}`", s)
            })?;
            Ok(index)
        }
    }
}

fn parse_imm(pair: Pair<'_, Rule>) -> Result<Imm> {
    match pair.as_rule() {
        Rule::ident => Ok(Imm::Label(pair.as_str().to_string())),
        Rule::target => parse_imm(pair.into_inner().next().context("missing target")?),
        _ => {
            let num = pair.into_inner().next().context("missing number")?;
            let value = parse_literal(num.as_str())
                .with_context(|| format!("invalid number `{}`", num.as_str()))?;
            ensure!(value <= u8::MAX as u64, "immediate {} does not fit in 8 bits", value);
            Ok(Imm::Num(value))
        }
    }
}

fn parse_inst(pair: Pair<'_, Rule>) -> Result<Inst> {
    let rule = pair.as_rule();
    let mut it = pair.into_inner();
    macro_rules! next {
        () => {
            it.next().context("malformed instruction")?
        };
    }
    macro_rules! reg {
        () => {
            parse_reg(next!())?
        };
    }
    Ok(match rule {
        Rule::i_nop => Inst::Nop,
        Rule::i_ret => Inst::Ret,
        Rule::i_br => {
            let op = next!().as_str().to_ascii_lowercase();
            let mut cond = 0;
            for (c, bit) in [('n', nzp::N), ('z', nzp::Z), ('p', nzp::P)] {
                if op[2..].contains(c) {
                    cond |= bit;
                }
            }
            // a bare `BR` is taken whenever a comparison happened
            if cond == 0 {
                cond = nzp::N | nzp::Z | nzp::P;
            }
            Inst::Br(cond, parse_imm(next!())?)
        }
        Rule::i_cmp => Inst::Cmp(reg!(), reg!()),
        Rule::i_arith => {
            let op = match next!().as_str().to_ascii_lowercase().as_str() {
                "add" => AluOp::Add,
                "sub" => AluOp::Sub,
                "mul" => AluOp::Mul,
                _ => AluOp::Div,
            };
            Inst::Arith(op, reg!(), reg!(), reg!())
        }
        Rule::i_ldr => Inst::Ldr(reg!(), reg!()),
        Rule::i_str => Inst::Str(reg!(), reg!()),
        Rule::i_const => Inst::Const(reg!(), parse_imm(next!())?),
        _ => anyhow::bail!("unexpected rule {:?}", rule),
    })
}

/// transform assembly code to binary object code
pub fn assemble(src: &str, option: AssembleOption) -> Result<ObjectExt> {
    macro_rules! verbo {
        ($e:expr) => {
            if option.verbose {
                dbg!($e);
            }
        };
    }
    let mut src_infos = Vec::default();
    let lines = parse(src).context("fail to assemble")?;
    let mut cur_addr = 0usize;

    for line in lines {
        if line.as_rule() != Rule::line {
            continue;
        }
        let (lineno, _) = line.line_col();
        let src = line.as_str().to_string();
        let mut src_info = SourceInfo {
            addr: None,
            inst: None,
            label: None,
            word: None,
            src,
        };
        for pair in line.into_inner() {
            verbo!(&pair);
            match pair.as_rule() {
                Rule::label => {
                    let name = pair.as_str().trim_end_matches(':');
                    src_info.label = Some(name.to_string());
                }
                _ => {
                    ensure!(
                        cur_addr < ADDR_SPACE,
                        "line {}: program exceeds {} instructions",
                        lineno,
                        ADDR_SPACE
                    );
                    src_info.inst =
                        Some(parse_inst(pair).with_context(|| format!("line {}", lineno))?);
                    src_info.addr = Some(cur_addr as u8);
                    cur_addr += 1;
                }
            }
        }
        if src_info.label.is_some() && src_info.addr.is_none() {
            // a label alone on its line names the next instruction
            ensure!(
                cur_addr < ADDR_SPACE,
                "line {}: label past the end of program memory",
                lineno
            );
        }
        src_infos.push((lineno, cur_addr, src_info));
    }

    let mut obj = Object::default();
    for (lineno, addr, info) in &src_infos {
        if let Some(label) = &info.label {
            let label_addr = info.addr.unwrap_or(*addr as u8);
            let prev = obj.symbols.insert(label.clone(), label_addr);
            ensure!(prev.is_none(), "line {}: duplicate label `{}`", lineno, label);
        }
    }
    verbo!(&obj.symbols);

    let mut source = Vec::with_capacity(src_infos.len());
    for (lineno, _, mut info) in src_infos {
        info.write_object(&mut obj)
            .with_context(|| format!("line {}: `{}`", lineno, info.src.trim()))?;
        verbo!(&info);
        source.push(info);
    }

    Ok(ObjectExt { obj, source })
}
