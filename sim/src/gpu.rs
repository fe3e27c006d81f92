//! Top level of the device: host interface, block dispatcher, cores and the
//! two memories, all driven by one clock.

use anyhow::ensure;

use crate::config::GpuConfig;
use crate::dispatch::{block_count, DispatchInput, Dispatcher, MAX_BLOCKS};
use crate::framework::GpuSim;
use crate::memory::Memory;
use crate::processor::sched::ContextTag;
use crate::processor::Core;
use crate::record::{Event, StageSample, Tracer};

pub struct Gpu {
    config: GpuConfig,
    /// device control register: number of threads of the kernel
    thread_count: usize,
    /// launch request held by the host
    start: bool,
    dispatcher: Dispatcher,
    cores: Vec<Core>,
    program_memory: Memory<u16>,
    data_memory: Memory<u8>,
    cycle: u64,
    tracer: Tracer,
}

impl Gpu {
    pub fn new(config: GpuConfig, program: &[u16], data: &[u8]) -> anyhow::Result<Self> {
        config.validate()?;
        let program_memory = Memory::new(
            "program",
            program,
            config.program_channels,
            config.program_interval,
        )?;
        let data_memory = Memory::new("data", data, config.data_channels, config.data_interval)?;
        Ok(Self {
            thread_count: 0,
            start: false,
            dispatcher: Dispatcher::new(config.core_count, config.threads_per_block),
            cores: (0..config.core_count)
                .map(|id| Core::new(id, config.threads_per_block))
                .collect(),
            program_memory,
            data_memory,
            cycle: 0,
            tracer: Tracer::default(),
            config,
        })
    }

    /// Write the thread count and raise the start line.
    pub fn launch(&mut self, total_threads: usize) -> anyhow::Result<()> {
        ensure!(!self.start, "a kernel is already launched, reset the device first");
        let blocks = block_count(total_threads, self.config.threads_per_block);
        ensure!(
            blocks <= MAX_BLOCKS,
            "{} threads need {} blocks, at most {} are supported",
            total_threads,
            blocks,
            MAX_BLOCKS
        );
        self.thread_count = total_threads;
        self.start = true;
        Ok(())
    }

    /// Return to the power-on state. Memory contents are kept.
    pub fn reset(&mut self) {
        self.thread_count = 0;
        self.start = false;
        self.dispatcher = Dispatcher::new(self.config.core_count, self.config.threads_per_block);
        for core in &mut self.cores {
            core.reset();
        }
        self.cycle = 0;
        self.tracer = Tracer::default();
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    pub fn data(&self) -> &[u8] {
        self.data_memory.cells()
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }
}

impl GpuSim for Gpu {
    fn step(&mut self) {
        let cycle = self.cycle;
        let core_done: Vec<bool> = self.cores.iter().map(Core::done).collect();
        let was_done = self.dispatcher.is_done();
        let (next, out) = self.dispatcher.tick(&DispatchInput {
            start: self.start,
            total_threads: self.thread_count,
            core_done: &core_done,
        });
        self.dispatcher = next;

        self.program_memory
            .service(cycle, self.cores.iter_mut().map(|core| core.program_port()));
        self.data_memory
            .service(cycle, self.cores.iter_mut().flat_map(|core| core.data_ports()));

        for (i, core) in self.cores.iter_mut().enumerate() {
            if let Some(block) = out.completed[i] {
                self.tracer.record(Event::Complete {
                    cycle,
                    core: i,
                    block_id: block.block_id,
                });
            }
            if out.reset[i] {
                core.reset();
                continue;
            }
            if let Some(block) = out.start[i].fired() {
                core.start(block);
                self.tracer.record(Event::Dispatch {
                    cycle,
                    core: i,
                    block_id: block.block_id,
                    thread_count: block.thread_count,
                });
            }
            if self.config.trace_stages {
                let sched = core.scheduler();
                self.tracer.sample(StageSample {
                    cycle,
                    core: i,
                    active: sched.active(),
                    stages: ContextTag::ALL.map(|tag| sched.context(tag).stage),
                });
            }
            core.tick();
        }

        if out.done && !was_done {
            tracing::info!(cycle, "kernel done");
            self.tracer.record(Event::KernelDone { cycle });
        }
        tracing::trace!(cycle, "\n{}", self);
        self.cycle += 1;
    }

    fn is_terminate(&self) -> bool {
        self.dispatcher.is_done()
    }

    fn cycle_count(&self) -> u64 {
        self.cycle
    }
}

impl std::fmt::Display for Gpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "cycle {:>6} | blocks {}/{}/{}",
            self.cycle,
            self.dispatcher.completed_count(),
            self.dispatcher.dispatched_count(),
            self.dispatcher.total_blocks()
        )?;
        for core in &self.cores {
            writeln!(f, "  {}", core)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE_ONE: [u16; 4] = [
        0b0101_0000_1101_1110, // MUL R0, %blockIdx, %blockDim
        0b0011_0000_0000_1111, // ADD R0, R0, %threadIdx
        0b1000_0000_0000_0000, // STR R0, R0
        0b1111_0000_0000_0000, // RET
    ];

    #[test]
    fn test_launch_guards() -> anyhow::Result<()> {
        let mut gpu = Gpu::new(GpuConfig::default(), &STORE_ONE, &[])?;
        assert!(gpu.launch(MAX_BLOCKS * 4 + 1).is_err());
        gpu.launch(8)?;
        assert!(gpu.launch(8).is_err());
        gpu.reset();
        gpu.launch(8)?;
        Ok(())
    }

    #[test]
    fn test_not_launched_never_terminates() -> anyhow::Result<()> {
        let mut gpu = Gpu::new(GpuConfig::default(), &STORE_ONE, &[])?;
        assert!(gpu.run(50).is_err());
        assert!(gpu.tracer().events().is_empty());
        Ok(())
    }

    #[test]
    fn test_zero_threads() -> anyhow::Result<()> {
        let mut gpu = Gpu::new(GpuConfig::default(), &STORE_ONE, &[])?;
        gpu.launch(0)?;
        assert_eq!(gpu.run(10)?, 1);
        assert_eq!(gpu.tracer().events(), &[Event::KernelDone { cycle: 0 }]);
        Ok(())
    }

    #[test]
    fn test_small_kernel() -> anyhow::Result<()> {
        let mut gpu = Gpu::new(GpuConfig::default(), &STORE_ONE, &[0xff; 8])?;
        gpu.launch(6)?;
        gpu.run(1000)?;
        assert_eq!(&gpu.data()[..8], &[0, 1, 2, 3, 4, 5, 0xff, 0xff]);
        assert_eq!(gpu.tracer().dispatch_order(), vec![1, 0]);
        Ok(())
    }
}
