//! nerve - periodic whole-node performance telemetry collector.
//!
//! Each tick samples running processes, attaches PMU counters to the top
//! CPU consumers, reads node-wide hardware counters over the same window,
//! optionally queries cooperating applications, and appends one binary
//! record to the output file.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use nerve::app::AppClient;
use nerve::collector::hardware::HardwareSampler;
use nerve::collector::hardware::freq::DevMsr;
use nerve::collector::pmu::PmuSampler;
use nerve::collector::procfs::ProcessCollector;
use nerve::collector::traits::RealFs;
use nerve::config::Config;
use nerve::sampler::Sampler;
use nerve::storage::RecordWriter;

/// Whole-node performance telemetry collector.
#[derive(Parser)]
#[command(name = "nerve", about = "Whole-node performance telemetry collector", version)]
struct Args {
    /// Sample interval in milliseconds.
    #[arg(short, long)]
    interval: u64,

    /// Configuration file in JSON format.
    #[arg(short, long)]
    config: PathBuf,

    /// Output file in binary format.
    #[arg(short, long)]
    output: PathBuf,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("nerve={level}").parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn sysconf(name: libc::c_int) -> u64 {
    // SAFETY: sysconf only reads system configuration.
    let value = unsafe { libc::sysconf(name) };
    value.max(0) as u64
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    info!("nerve {} starting", env!("CARGO_PKG_VERSION"));

    let sample_interval = Duration::from_micros(args.interval * 1000);
    info!(
        "config: interval={}ms, config={}, output={}",
        args.interval,
        args.config.display(),
        args.output.display()
    );

    let config = Config::load(&args.config)?;

    let num_cores = sysconf(libc::_SC_NPROCESSORS_ONLN) as usize;
    let phys_pages = sysconf(libc::_SC_PHYS_PAGES);
    let page_size = sysconf(libc::_SC_PAGESIZE);
    let self_pid = std::process::id();
    info!("{num_cores} cores online, pid {self_pid}");

    let fs = RealFs::new();
    let processes = ProcessCollector::new(fs, "/proc", phys_pages, page_size);
    let hardware = HardwareSampler::new(fs, "/proc", DevMsr::new(), num_cores);
    let pmu = PmuSampler::new(&config.events)?;
    let apps = AppClient::connect(&config.applications)?;
    let writer = RecordWriter::open(
        &args.output,
        num_cores,
        config.num_of_processes,
        pmu.num_events(),
    )?;

    // The handler only flips the flag; teardown happens on this thread
    // after the loop observes it.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to set signal handler: {e}");
    }

    let mut sampler = Sampler::new(
        processes,
        hardware,
        pmu,
        apps,
        writer,
        sample_interval,
        config.num_of_processes,
        self_pid,
    );

    info!("starting sampling loop");
    let result = (|| {
        while running.load(Ordering::SeqCst) {
            sampler.run_tick()?;
        }
        Ok(())
    })();

    sampler.shutdown();
    result.map_err(|e: nerve::sampler::SampleError| e.into())
}
