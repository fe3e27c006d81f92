//! This module contains utilities for verifying the cycle-level model against
//! the reference interpreter.

mod diff;

use crate::framework::GpuSim;
use crate::{Gpu, GpuConfig};

pub struct SimTester {
    config: GpuConfig,
}

impl SimTester {
    pub fn new(config: GpuConfig) -> Self {
        Self { config }
    }

    fn simulate(&self, program: &[u16], data: &[u8], threads: usize) -> anyhow::Result<Gpu> {
        let mut gpu = Gpu::new(self.config.clone(), program, data)?;
        gpu.launch(threads)?;
        gpu.run(self.config.max_cycles)?;
        Ok(gpu)
    }
}

fn make_obj(src: &str) -> anyhow::Result<crate::ObjectExt> {
    let obj = crate::assemble(src, crate::AssembleOption::default().set_verbose(false))?;

    Ok(obj)
}
