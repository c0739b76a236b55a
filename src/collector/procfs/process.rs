//! Per-process collection from `/proc/<pid>/`.

use crate::collector::procfs::parser::{
    ParseError, parse_cpu_total, parse_ctxt_switches, parse_io_bytes, parse_pid_stat,
    parse_task_last_cpu,
};
use crate::collector::traits::FileSystem;
use crate::snapshot::{MAX_PROCESSES, MAX_THREADS, ProcessCounters, ProcessList, ProcessRecord};
use std::io;
use std::path::Path;

/// Error type for collection failures.
///
/// `ProcessGone` is recoverable (the entity is dropped from the tick); the
/// rest terminate the collector.
#[derive(Debug)]
pub enum CollectError {
    /// Process disappeared during collection.
    ProcessGone(u32),
    /// I/O error reading `/proc` itself.
    Io(io::Error),
    /// Malformed `/proc` content.
    Parse(String),
    /// More than [`MAX_PROCESSES`] live processes observed.
    TooManyProcesses(usize),
    /// A selected process has more than [`MAX_THREADS`] threads.
    TooManyThreads(u32),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcessGone(pid) => write!(f, "process {pid} disappeared"),
            CollectError::Io(e) => write!(f, "I/O error: {e}"),
            CollectError::Parse(msg) => write!(f, "parse error: {msg}"),
            CollectError::TooManyProcesses(n) => {
                write!(f, "{n} processes exceed the limit of {MAX_PROCESSES}")
            }
            CollectError::TooManyThreads(pid) => {
                write!(f, "process {pid} has more than {MAX_THREADS} threads")
            }
        }
    }
}

impl std::error::Error for CollectError {}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

/// Collects process snapshots and per-process detail from `/proc`.
pub struct ProcessCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
    phys_pages: u64,
    page_size: u64,
}

impl<F: FileSystem> ProcessCollector<F> {
    /// Creates a new collector.
    ///
    /// `phys_pages` and `page_size` feed the memory-utilization fields and
    /// normally come from `sysconf(3)`.
    pub fn new(fs: F, proc_path: impl Into<String>, phys_pages: u64, page_size: u64) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            phys_pages,
            page_size,
        }
    }

    /// Rebuilds `list` with every live process except `self_pid`.
    ///
    /// Fills the cumulative fault/CPU counters and the memory utilizations;
    /// context switches, I/O, threads, and affinity are deferred to
    /// [`collect_detail`](Self::collect_detail) for the filtered subset.
    /// Zombies and processes that vanish mid-walk are skipped silently.
    pub fn snapshot(&self, list: &mut ProcessList, self_pid: u32) -> Result<(), CollectError> {
        list.clear();

        let stat_path = format!("{}/stat", self.proc_path);
        let stat_content = self.fs.read_to_string(Path::new(&stat_path))?;
        list.cpu_total_time = parse_cpu_total(&stat_content)?;

        let entries = self.fs.read_dir(Path::new(&self.proc_path))?;
        for entry in entries {
            let Some(pid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == self_pid {
                continue;
            }

            let path = format!("{}/{}/stat", self.proc_path, pid);
            let content = match self.fs.read_to_string(Path::new(&path)) {
                Ok(content) => content,
                // Vanished between readdir and open.
                Err(_) => continue,
            };
            let stat = parse_pid_stat(&content)?;
            if stat.state == 'Z' {
                continue;
            }

            if list.len() == MAX_PROCESSES {
                return Err(CollectError::TooManyProcesses(list.len() + 1));
            }

            let counters = ProcessCounters {
                minflt: stat.minflt,
                cminflt: stat.cminflt,
                majflt: stat.majflt,
                cmajflt: stat.cmajflt,
                total_faults: stat.minflt + stat.cminflt + stat.majflt + stat.cmajflt,
                utime: stat.utime,
                stime: stat.stime,
                cutime: stat.cutime,
                cstime: stat.cstime,
                total_time: stat.utime + stat.stime + stat.cutime + stat.cstime,
                ..Default::default()
            };

            let mem_bytes = self.phys_pages * self.page_size;
            let record = ProcessRecord {
                pid,
                vmem_utilization: if mem_bytes > 0 {
                    stat.vsize as f64 / mem_bytes as f64
                } else {
                    0.0
                },
                rmem_utilization: if self.phys_pages > 0 {
                    stat.rss as f64 / self.phys_pages as f64
                } else {
                    0.0
                },
                ..Default::default()
            };

            list.push(counters, record);
        }

        Ok(())
    }

    /// Fills context-switch and I/O counters, the thread list, and the
    /// CPU-affinity mask for every process in the (filtered) list.
    ///
    /// A process that vanished since the snapshot keeps zeroed detail; a
    /// thread that vanishes mid-walk is skipped.
    pub fn collect_detail(&self, list: &mut ProcessList) -> Result<(), CollectError> {
        for i in 0..list.len() {
            let pid = list.records[i].pid;

            let status_path = format!("{}/{}/status", self.proc_path, pid);
            if let Ok(content) = self.fs.read_to_string(Path::new(&status_path)) {
                let (vctxt, nvctxt) = parse_ctxt_switches(&content)?;
                list.counters[i].vctxt = vctxt;
                list.counters[i].nvctxt = nvctxt;
            }

            let io_path = format!("{}/{}/io", self.proc_path, pid);
            if let Ok(content) = self.fs.read_to_string(Path::new(&io_path)) {
                let (read_bytes, write_bytes) = parse_io_bytes(&content)?;
                list.counters[i].read_bytes = read_bytes;
                list.counters[i].write_bytes = write_bytes;
            }

            self.walk_tasks(pid, &mut list.counters[i], &mut list.records[i])?;
        }

        Ok(())
    }

    /// Walks `/proc/<pid>/task`, recording thread ids and ORing each
    /// thread's last-run CPU into the affinity mask.
    fn walk_tasks(
        &self,
        pid: u32,
        counters: &mut ProcessCounters,
        record: &mut ProcessRecord,
    ) -> Result<(), CollectError> {
        counters.threads.clear();
        record.affinity = 0;

        let task_path = format!("{}/{}/task", self.proc_path, pid);
        let entries = match self.fs.read_dir(Path::new(&task_path)) {
            Ok(entries) => entries,
            // The whole process vanished.
            Err(_) => return Ok(()),
        };

        for entry in entries {
            let Some(tid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<i32>().ok())
            else {
                continue;
            };

            let path = format!("{}/{}/task/{}/stat", self.proc_path, pid, tid);
            let content = match self.fs.read_to_string(Path::new(&path)) {
                Ok(content) => content,
                Err(_) => continue,
            };
            let cpu = parse_task_last_cpu(&content)?;

            if counters.threads.len() == MAX_THREADS {
                return Err(CollectError::TooManyThreads(pid));
            }
            counters.threads.push(tid);

            if cpu < u64::BITS {
                record.affinity |= 1u64 << cpu;
            }
        }

        Ok(())
    }
}
