//! Test the device by comparing the simulation result with a "ground truth".

use anyhow::Context;

use super::SimTester;
use crate::asm::tests::matmul_src;
use crate::GpuConfig;

impl SimTester {
    /// Both contexts of a core run every thread, so only kernels whose stores
    /// do not depend on memory they also write can match the reference.
    pub fn test_kernel(&self, src: &str, data: &[u8], threads: usize) -> anyhow::Result<()> {
        let a = super::make_obj(src).context("assemble")?;
        let answer = crate::isa::simulate(
            &a.obj.words,
            data,
            threads,
            self.config.threads_per_block,
        )?;
        let gpu = self.simulate(&a.obj.init_mem(), data, threads)?;

        if answer.data.as_slice() != gpu.data() {
            crate::utils::mem_diff(&answer.data, gpu.data());
            anyhow::bail!("memory mismatch under {:?}", self.config);
        }

        let dispatched = gpu.dispatcher().dispatched_count();
        let completed = gpu.dispatcher().completed_count();
        anyhow::ensure!(
            dispatched == completed && completed == gpu.dispatcher().total_blocks(),
            "blocks: {} dispatched, {} completed",
            dispatched,
            completed
        );
        Ok(())
    }
}

fn matrices(n: usize) -> Vec<u8> {
    let a = (0..n * n).map(|i| (i % 7) as u8 + 1);
    let b = (0..n * n).map(|i| (i % 5) as u8);
    let mut data = vec![0; 2 * n * n];
    for (cell, v) in data.iter_mut().zip(a.chain(b)) {
        *cell = v;
    }
    data
}

#[test]
fn test_matmul_against_reference() -> anyhow::Result<()> {
    let n = 4u8;
    let src = matmul_src(n, n * n, 2 * n * n);
    let data = matrices(n as usize);

    for core_count in [1, 2, 3] {
        for threads_per_block in [1, 3, 4, 16] {
            for data_interval in [1, 5] {
                let tester = SimTester::new(GpuConfig {
                    core_count,
                    threads_per_block,
                    data_interval,
                    data_channels: 2,
                    ..Default::default()
                });
                tester.test_kernel(&src, &data, (n * n) as usize)?;
            }
        }
    }
    Ok(())
}

#[test]
fn test_partial_last_block() -> anyhow::Result<()> {
    let src = r#"
        MUL R0, %blockIdx, %blockDim
        ADD R0, R0, %threadIdx
        CONST R1, #100
        ADD R2, R0, R1
        MUL R3, R0, R0
        STR R2, R3          ; mem[100 + i] = i * i
        RET
    "#;
    let tester = SimTester::new(GpuConfig {
        threads_per_block: 4,
        ..Default::default()
    });
    for threads in [1, 5, 11, 13] {
        tester.test_kernel(src, &[], threads)?;
    }
    Ok(())
}

#[test]
fn test_read_modify_write_runs_twice() -> anyhow::Result<()> {
    // mem[i] += 1
    let src = r#"
        MUL R0, %blockIdx, %blockDim
        ADD R0, R0, %threadIdx
        LDR R1, R0
        CONST R2, #1
        ADD R1, R1, R2
        STR R0, R1
        RET
    "#;
    let a = super::make_obj(src)?;
    let data = [10u8; 4];
    let answer = crate::isa::simulate(&a.obj.words, &data, 4, 4)?;
    assert_eq!(&answer.data[..4], &[11; 4]);

    for data_interval in [1, 5] {
        let tester = SimTester::new(GpuConfig {
            data_interval,
            ..Default::default()
        });
        let gpu = tester.simulate(&a.obj.init_mem(), &data, 4)?;
        // context B loads only after context A has stored
        assert_eq!(&gpu.data()[..4], &[12; 4], "interval {}", data_interval);
        assert!(tester.test_kernel(src, &data, 4).is_err());
    }
    Ok(())
}
