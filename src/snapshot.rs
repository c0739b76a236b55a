//! Per-tick process data model.
//!
//! Each sample tick builds a [`ProcessList`]: two parallel arrays holding the
//! cumulative OS counters ([`ProcessCounters`], used only to derive rates
//! against the previous tick) and the derived values ([`ProcessRecord`],
//! the only per-process data that reaches the output record). Three lists
//! rotate across ticks: current, previous, and the top-K filtered subset.

/// Upper bound on processes tracked per tick.
pub const MAX_PROCESSES: usize = 512;

/// Upper bound on threads per tracked process.
pub const MAX_THREADS: usize = 64;

/// Upper bound on monitored applications.
pub const MAX_APPLICATIONS: usize = 8;

/// Upper bound on configured PMU events, including the two fixed NUMA events.
pub const MAX_EVENTS: usize = 32;

/// Cumulative OS counters for one process, as read from `/proc`.
///
/// These are raw monotonic counts; every rate in [`ProcessRecord`] is a
/// delta of these over the change in aggregate CPU time. Context-switch and
/// I/O counters are only populated for processes that survive top-K
/// filtering, so they may be zero for the rest of the list.
#[derive(Debug, Clone, Default)]
pub struct ProcessCounters {
    /// Minor page faults (field 10 of `/proc/<pid>/stat`).
    pub minflt: u64,
    /// Minor page faults of waited-for children.
    pub cminflt: u64,
    /// Major page faults.
    pub majflt: u64,
    /// Major page faults of waited-for children.
    pub cmajflt: u64,
    /// Sum of the four fault counters.
    pub total_faults: u64,
    /// User-mode jiffies.
    pub utime: u64,
    /// Kernel-mode jiffies.
    pub stime: u64,
    /// User-mode jiffies of waited-for children.
    pub cutime: u64,
    /// Kernel-mode jiffies of waited-for children.
    pub cstime: u64,
    /// Sum of the four jiffy counters.
    pub total_time: u64,
    /// Voluntary context switches (from `/proc/<pid>/status`).
    pub vctxt: u64,
    /// Non-voluntary context switches.
    pub nvctxt: u64,
    /// Bytes read from storage (from `/proc/<pid>/io`).
    pub read_bytes: u64,
    /// Bytes written to storage.
    pub write_bytes: u64,
    /// Thread ids discovered by the task walk, at most [`MAX_THREADS`].
    pub threads: Vec<i32>,
}

/// Derived per-process values exposed to the record writer.
///
/// Rates are Δcount ÷ Δaggregate-CPU-jiffies between consecutive ticks and
/// live in `[0, 1]`; the memory utilizations are fractions of physical
/// memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessRecord {
    pub pid: u32,
    /// Bit `n` set iff some thread of this process was last seen on
    /// logical CPU `n`.
    pub affinity: u64,
    pub fault_rate: f64,
    pub cpu_utilization: f64,
    pub vctxt_rate: f64,
    pub nvctxt_rate: f64,
    pub read_rate: f64,
    pub write_rate: f64,
    /// vsize ÷ (phys_pages × page_size).
    pub vmem_utilization: f64,
    /// rss_pages ÷ phys_pages.
    pub rmem_utilization: f64,
}

/// One tick's worth of processes: parallel counter/record arrays plus the
/// aggregate CPU time the rates are derived against.
///
/// Lists are preallocated once and reused; `clear` keeps the allocations.
#[derive(Debug, Clone)]
pub struct ProcessList {
    pub counters: Vec<ProcessCounters>,
    pub records: Vec<ProcessRecord>,
    /// Sum of the seven jiffy fields of the first line of `/proc/stat`.
    pub cpu_total_time: u64,
}

impl Default for ProcessList {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessList {
    /// Creates an empty list with capacity for [`MAX_PROCESSES`] entries.
    pub fn new() -> Self {
        Self {
            counters: Vec::with_capacity(MAX_PROCESSES),
            records: Vec::with_capacity(MAX_PROCESSES),
            cpu_total_time: 0,
        }
    }

    /// Number of processes in the list.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops all entries but keeps the allocations for the next tick.
    pub fn clear(&mut self) {
        self.counters.clear();
        self.records.clear();
        self.cpu_total_time = 0;
    }

    /// Appends a counter/record pair, keeping the arrays parallel.
    pub fn push(&mut self, counters: ProcessCounters, record: ProcessRecord) {
        debug_assert_eq!(self.counters.len(), self.records.len());
        self.counters.push(counters);
        self.records.push(record);
    }

    /// Copies the entry at `index` of `source` into this list.
    pub fn push_from(&mut self, source: &ProcessList, index: usize) {
        self.counters.push(source.counters[index].clone());
        self.records.push(source.records[index]);
    }
}

/// Exchanges the current and previous lists at the end of a tick.
pub fn swap_lists(current: &mut ProcessList, previous: &mut ProcessList) {
    std::mem::swap(current, previous);
}
