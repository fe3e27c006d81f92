//! Cycle-level model of a small SIMT accelerator. Each core runs one thread
//! block at a time on two interleaved execution contexts, and a dispatcher
//! spreads the blocks of a kernel over the cores.

mod asm;
pub mod config;
pub mod dispatch;
mod dsl;
pub mod framework;
pub mod gpu;
pub mod isa;
pub mod memory;
mod object;
pub mod processor;
pub mod record;
mod utils;

#[cfg(test)]
mod test;

pub use asm::{assemble, AssembleOption};
pub use config::GpuConfig;
pub use gpu::Gpu;
pub use object::{Object, ObjectExt, SourceInfo};
pub use utils::{mem_diff, mem_print, parse_data};
