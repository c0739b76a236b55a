//! Hardware counter sampling over `perf_event_open`.
//!
//! One descriptor is opened per thread × event for every selected process,
//! each in its own group so the kernel is free to multiplex them on the
//! PMU. The whole set is enabled and disabled globally with
//! `prctl(PR_TASK_PERF_EVENTS_{ENABLE,DISABLE})` around the window sleep,
//! and every reading is rescaled by its enabled/running ratio to undo the
//! multiplexing.
//!
//! Descriptor lifecycle per tick:
//! closed → opened → enabled → read → disabled → closed. A failure after
//! enable still runs disable and close on everything that was opened.

pub mod events;

use crate::snapshot::ProcessList;
use events::{EventSpec, ResolveError};
use libc::{c_int, c_ulong, pid_t};
use std::io;

const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;

const ATTR_FLAG_DISABLED: u64 = 1 << 0;
const ATTR_FLAG_INHERIT: u64 = 1 << 1;

/// Bytes returned by a counter read: value, time_enabled, time_running.
const COUNTER_READ_BYTES: usize = 24;

/// `perf_event_attr`, PERF_ATTR_SIZE_VER5 layout (112 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct PerfEventAttr {
    type_id: u32,
    size: u32,
    config: u64,
    sample_period: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events: u32,
    bp_type: u32,
    config1: u64,
    config2: u64,
    branch_sample_type: u64,
    sample_regs_user: u64,
    sample_stack_user: u32,
    clock_id: i32,
    sample_regs_intr: u64,
    aux_watermark: u32,
    sample_max_stack: u16,
    reserved: u16,
}

impl PerfEventAttr {
    /// Attribute block for one configured event: created disabled, counts
    /// inherited children, and reads back enabled/running for scaling.
    fn for_event(spec: &EventSpec) -> Self {
        Self {
            type_id: spec.type_id,
            size: std::mem::size_of::<Self>() as u32,
            config: spec.config,
            config1: spec.config1,
            read_format: PERF_FORMAT_TOTAL_TIME_ENABLED | PERF_FORMAT_TOTAL_TIME_RUNNING,
            flags: ATTR_FLAG_DISABLED | ATTR_FLAG_INHERIT,
            ..Default::default()
        }
    }
}

fn perf_event_open(
    attr: &PerfEventAttr,
    pid: pid_t,
    cpu: c_int,
    group_fd: c_int,
    flags: c_ulong,
) -> io::Result<c_int> {
    // SAFETY: attr points at a properly sized, zero-padded attribute block.
    let fd = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            attr as *const PerfEventAttr,
            pid,
            cpu,
            group_fd,
            flags,
        )
    };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd as c_int)
    }
}

/// Error type for PMU failures. Vanished threads and unreadable counters
/// are not errors; everything here is fatal.
#[derive(Debug)]
pub enum PmuError {
    Resolve(ResolveError),
    Attach {
        event: String,
        tid: i32,
        source: io::Error,
    },
    Prctl(io::Error),
}

impl std::fmt::Display for PmuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PmuError::Resolve(e) => write!(f, "{e}"),
            PmuError::Attach { event, tid, source } => {
                write!(f, "cannot attach event {event} to thread {tid}: {source}")
            }
            PmuError::Prctl(e) => write!(f, "prctl failed: {e}"),
        }
    }
}

impl std::error::Error for PmuError {}

impl From<ResolveError> for PmuError {
    fn from(e: ResolveError) -> Self {
        PmuError::Resolve(e)
    }
}

/// Rescales a counter reading for PMU multiplexing:
/// `value × enabled ÷ running`, or 0 when the counter never ran.
pub fn scale_reading(value: u64, enabled: u64, running: u64) -> u64 {
    if running == 0 {
        return 0;
    }
    (value as u128 * enabled as u128 / running as u128) as u64
}

/// One open descriptor and where its scaled value accumulates.
#[derive(Debug)]
struct OpenCounter {
    slot: usize,
    event: usize,
    fd: c_int,
}

/// Per-tick PMU sampler for the filtered process list.
pub struct PmuSampler {
    events: Vec<EventSpec>,
    fds: Vec<OpenCounter>,
    /// Scaled counts per filtered-list slot and event, summed over the
    /// process's threads.
    pub counts: Vec<Vec<u64>>,
}

impl PmuSampler {
    /// Resolves every configured event name up front; an unresolvable
    /// name is a configuration error.
    pub fn new(event_names: &[String]) -> Result<Self, PmuError> {
        let events = event_names
            .iter()
            .map(|name| events::resolve(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            events,
            fds: Vec::new(),
            counts: Vec::new(),
        })
    }

    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Opens one disabled descriptor per thread × event of every process
    /// in the filtered list.
    ///
    /// A thread that exited since the task walk is skipped; any other open
    /// failure closes what was opened and is fatal.
    pub fn open(&mut self, filtered: &ProcessList) -> Result<(), PmuError> {
        debug_assert!(self.fds.is_empty(), "descriptors leaked from last tick");
        self.counts = vec![vec![0; self.events.len()]; filtered.len()];

        for (slot, counters) in filtered.counters.iter().enumerate() {
            for &tid in &counters.threads {
                for (event, spec) in self.events.iter().enumerate() {
                    let attr = PerfEventAttr::for_event(spec);
                    // cpu -1: follow the thread; group -1: own group.
                    match perf_event_open(&attr, tid as pid_t, -1, -1, 0) {
                        Ok(fd) => self.fds.push(OpenCounter { slot, event, fd }),
                        Err(e)
                            if e.raw_os_error() == Some(libc::ESRCH)
                                || e.raw_os_error() == Some(libc::ENOENT) =>
                        {
                            // Thread vanished between task walk and attach.
                            continue;
                        }
                        Err(source) => {
                            let event = spec.name.clone();
                            self.release();
                            return Err(PmuError::Attach { event, tid, source });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Starts every inherited counter of this task tree.
    pub fn enable(&self) -> Result<(), PmuError> {
        // SAFETY: plain prctl with no pointer arguments.
        let ret = unsafe { libc::prctl(libc::PR_TASK_PERF_EVENTS_ENABLE, 0, 0, 0, 0) };
        if ret == -1 {
            return Err(PmuError::Prctl(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Stops the counters again after the window.
    pub fn disable(&self) -> Result<(), PmuError> {
        // SAFETY: plain prctl with no pointer arguments.
        let ret = unsafe { libc::prctl(libc::PR_TASK_PERF_EVENTS_DISABLE, 0, 0, 0, 0) };
        if ret == -1 {
            return Err(PmuError::Prctl(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Reads and rescales every open descriptor, summing per process and
    /// event. A short or failed read (thread gone, counter unreadable)
    /// contributes zero.
    pub fn read_counters(&mut self) {
        for counter in &self.fds {
            let mut buf = [0u8; COUNTER_READ_BYTES];
            // SAFETY: buf is COUNTER_READ_BYTES long and fd is open.
            let ret = unsafe {
                libc::read(
                    counter.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    COUNTER_READ_BYTES,
                )
            };
            if ret != COUNTER_READ_BYTES as isize {
                continue;
            }

            let value = u64::from_ne_bytes(buf[0..8].try_into().unwrap());
            let enabled = u64::from_ne_bytes(buf[8..16].try_into().unwrap());
            let running = u64::from_ne_bytes(buf[16..24].try_into().unwrap());
            self.counts[counter.slot][counter.event] += scale_reading(value, enabled, running);
        }
    }

    /// Closes every descriptor opened this tick.
    pub fn close(&mut self) {
        for counter in self.fds.drain(..) {
            // SAFETY: fd came from perf_event_open and is closed once.
            unsafe { libc::close(counter.fd) };
        }
    }

    /// Cleanup path: best-effort disable, then close. Used both at the end
    /// of a normal tick and when a tick fails mid-window.
    pub fn release(&mut self) {
        if !self.fds.is_empty() {
            let _ = self.disable();
        }
        self.close();
    }
}

impl Drop for PmuSampler {
    fn drop(&mut self) {
        self.release();
    }
}
