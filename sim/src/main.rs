use anyhow::{Context, Result};
use binutils::{clap, verbose};
use clap::Parser;
use simt_sim::{
    assemble, framework::GpuSim, mem_diff, mem_print, parse_data, AssembleOption, Gpu, GpuConfig,
};

/// Run a SIMT kernel on a cycle-level model of a dual-context accelerator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the kernel assembly
    input: String,

    /// Total number of threads of the kernel
    #[arg(short = 't', long)]
    threads: usize,

    /// Initial data memory: byte literals separated by commas or whitespace
    #[arg(short = 'd', long)]
    data: Option<String>,

    /// Device configuration in JSON. Fields not given keep their default.
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Number of compute cores (overrides the config file)
    #[arg(long)]
    cores: Option<usize>,

    /// Threads per block (overrides the config file)
    #[arg(long)]
    block_size: Option<u8>,

    /// Data memory service interval in cycles (overrides the config file)
    #[arg(long)]
    latency: Option<u64>,

    /// Write dispatch events and stage samples to this file as JSON
    #[arg(long)]
    trace: Option<String>,

    /// Print the whole data memory at the end instead of a diff
    #[arg(long)]
    dump: bool,

    // / Print logs during simulation
    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", &args.input))?;

    let verbose_asm = args
        .verbose
        .log_level()
        .is_some_and(|lv| lv >= verbose::Level::Trace);

    let obj = assemble(&content, AssembleOption::default().set_verbose(verbose_asm))?;

    let log_level = binutils::verbose_level_to_trace(args.verbose.log_level());
    binutils::logging_setup(log_level, None::<&std::fs::File>);

    let data = match &args.data {
        Some(path) => {
            let src = std::fs::read_to_string(path)
                .with_context(|| format!("could not read file `{}`", path))?;
            parse_data(&src)?
        }
        None => Vec::new(),
    };

    let mut config = match &args.config {
        Some(path) => GpuConfig::load(path)?,
        None => GpuConfig::default(),
    };
    if let Some(cores) = args.cores {
        config.core_count = cores;
    }
    if let Some(size) = args.block_size {
        config.threads_per_block = size;
    }
    if let Some(latency) = args.latency {
        config.data_interval = latency;
    }
    config.trace_stages |= args.trace.is_some();
    tracing::debug!(?config, "device configuration");

    let mut gpu = Gpu::new(config.clone(), &obj.obj.init_mem(), &data)?;
    gpu.launch(args.threads)?;
    let cycles = gpu.run(config.max_cycles)?;

    println!("kernel done in {} cycles", cycles);
    println!("dispatch order:   {:?}", gpu.tracer().dispatch_order());
    println!("completion order: {:?}", gpu.tracer().completion_order());
    if args.dump {
        mem_print(gpu.data());
    } else {
        mem_diff(&data, gpu.data());
    }

    if let Some(path) = &args.trace {
        std::fs::write(path, gpu.tracer().to_json()?)
            .with_context(|| format!("could not write file `{}`", path))?;
        println!("writing to file `{}`", path);
    }
    Ok(())
}
