//! The per-tick orchestrator.
//!
//! A tick is strictly sequential: process snapshot, rate derivation, top-K
//! selection, per-process detail, PMU attach, the hardware pre-reads, the
//! window sleep with counters enabled, the post-reads, PMU read/teardown,
//! application sampling, record append, and finally the current/previous
//! swap. The PMU enable/disable pair brackets the same wall-clock window
//! as the IRQ/frequency/network deltas, so every per-window metric covers
//! the same interval.

use crate::app::{AppClient, AppError};
use crate::collector::hardware::freq::MsrReader;
use crate::collector::hardware::{HardwareError, HardwareSampler};
use crate::collector::pmu::{PmuError, PmuSampler};
use crate::collector::procfs::{CollectError, ProcessCollector};
use crate::collector::traits::FileSystem;
use crate::rates;
use crate::select::select_top_k;
use crate::snapshot::{ProcessList, swap_lists};
use crate::storage::RecordWriter;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Error type for a failed tick. Every variant is fatal to the collector;
/// recoverable conditions (vanished processes, unreadable counters,
/// unreachable applications) never surface here.
#[derive(Debug)]
pub enum SampleError {
    Collect(CollectError),
    Hardware(HardwareError),
    Pmu(PmuError),
    App(AppError),
    Write(io::Error),
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::Collect(e) => write!(f, "process collection failed: {e}"),
            SampleError::Hardware(e) => write!(f, "hardware sampling failed: {e}"),
            SampleError::Pmu(e) => write!(f, "PMU sampling failed: {e}"),
            SampleError::App(e) => write!(f, "application sampling failed: {e}"),
            SampleError::Write(e) => write!(f, "record write failed: {e}"),
        }
    }
}

impl std::error::Error for SampleError {}

impl From<CollectError> for SampleError {
    fn from(e: CollectError) -> Self {
        SampleError::Collect(e)
    }
}

impl From<HardwareError> for SampleError {
    fn from(e: HardwareError) -> Self {
        SampleError::Hardware(e)
    }
}

impl From<PmuError> for SampleError {
    fn from(e: PmuError) -> Self {
        SampleError::Pmu(e)
    }
}

impl From<AppError> for SampleError {
    fn from(e: AppError) -> Self {
        SampleError::App(e)
    }
}

impl From<io::Error> for SampleError {
    fn from(e: io::Error) -> Self {
        SampleError::Write(e)
    }
}

/// Drives one full sampling pipeline per [`run_tick`](Sampler::run_tick).
pub struct Sampler<F: FileSystem, M: MsrReader> {
    processes: ProcessCollector<F>,
    hardware: HardwareSampler<F, M>,
    pmu: PmuSampler,
    apps: AppClient,
    writer: RecordWriter,
    interval: Duration,
    top_k: usize,
    self_pid: u32,
    current: ProcessList,
    previous: ProcessList,
    filtered: ProcessList,
    last_tick_end: Option<Instant>,
    ticks: u64,
}

impl<F: FileSystem, M: MsrReader> Sampler<F, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        processes: ProcessCollector<F>,
        hardware: HardwareSampler<F, M>,
        pmu: PmuSampler,
        apps: AppClient,
        writer: RecordWriter,
        interval: Duration,
        top_k: usize,
        self_pid: u32,
    ) -> Self {
        Self {
            processes,
            hardware,
            pmu,
            apps,
            writer,
            interval,
            top_k,
            self_pid,
            current: ProcessList::new(),
            previous: ProcessList::new(),
            filtered: ProcessList::new(),
            last_tick_end: None,
            ticks: 0,
        }
    }

    /// Runs one tick of the pipeline.
    pub fn run_tick(&mut self) -> Result<(), SampleError> {
        // Time spent outside the pipeline since the last tick finished.
        // Recorded for observability; the window sleep is not adjusted.
        if let Some(end) = self.last_tick_end {
            debug!(drift_us = end.elapsed().as_micros() as u64, "inter-tick drift");
        }
        self.ticks += 1;

        self.processes.snapshot(&mut self.current, self.self_pid)?;
        rates::derive_rates(&mut self.current, &self.previous);

        select_top_k(&self.current, &mut self.filtered, self.top_k, self.self_pid);
        self.processes.collect_detail(&mut self.filtered)?;
        rates::derive_detail_rates(&mut self.filtered, &self.previous);

        self.pmu.open(&self.filtered)?;
        let window = self.sample_window();
        if let Err(e) = window {
            self.pmu.release();
            return Err(e);
        }
        self.pmu.read_counters();
        let disabled = self.pmu.disable();
        self.pmu.close();
        disabled?;

        for sample in self.apps.sample()? {
            info!(
                application = %sample.label,
                requests = sample.num_requests,
                tail_latency_us = sample.tail_latency_us,
                "application sample"
            );
        }

        let written = self.writer.append(
            &self.hardware.irq_info,
            &self.hardware.network_info,
            &self.hardware.frequency_info,
            &self.filtered.records,
            &self.pmu.counts,
        )?;

        info!(
            tick = self.ticks,
            processes = self.current.len(),
            filtered = self.filtered.len(),
            bytes = written,
            "sample recorded"
        );

        swap_lists(&mut self.current, &mut self.previous);
        self.last_tick_end = Some(Instant::now());
        Ok(())
    }

    /// The measurement window: hardware baseline, counters on, sleep,
    /// hardware deltas. Counters are still enabled if this fails; the
    /// caller releases them.
    fn sample_window(&mut self) -> Result<(), SampleError> {
        self.hardware.pre_window()?;
        self.pmu.enable()?;
        std::thread::sleep(self.interval);
        self.hardware.post_window()?;
        Ok(())
    }

    /// Releases everything that outlives ticks. Called once on shutdown.
    pub fn shutdown(&mut self) {
        self.pmu.release();
        self.apps.shutdown();
        info!(ticks = self.ticks, "collector stopped");
    }
}
