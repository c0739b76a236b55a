//! Rate derivation between consecutive process snapshots.
//!
//! Every rate is `Δcounter ÷ Δaggregate-CPU-jiffies` across one tick. The
//! previous snapshot is indexed by an explicit PID→index map; `/proc` is
//! enumerated in `readdir` order, which guarantees nothing, so positional
//! matching against the previous list is never attempted. A PID without a
//! previous entry gets its whole cumulative count as the delta, which is
//! also what makes the very first tick work against an empty previous
//! list.

use crate::snapshot::ProcessList;
use std::collections::HashMap;

/// Builds the PID→index map for one list.
pub fn pid_index(list: &ProcessList) -> HashMap<u32, usize> {
    list.records
        .iter()
        .enumerate()
        .map(|(idx, record)| (record.pid, idx))
        .collect()
}

/// Delta that treats a counter regression (PID reuse) as zero progress.
fn delta(curr: u64, prev: u64) -> u64 {
    curr.saturating_sub(prev)
}

/// One counter delta over the jiffy delta, clamped into `[0, 1]`.
fn rate(curr: u64, prev: u64, dt: u64) -> f64 {
    if dt == 0 {
        return 0.0;
    }
    (delta(curr, prev) as f64 / dt as f64).min(1.0)
}

/// Fills the page-fault rate and CPU utilization of every record in
/// `current` against the matching entry of `previous`.
pub fn derive_rates(current: &mut ProcessList, previous: &ProcessList) {
    let prev_index = pid_index(previous);
    let dt = delta(current.cpu_total_time, previous.cpu_total_time);

    for i in 0..current.len() {
        let curr = &current.counters[i];
        let (prev_faults, prev_time) = match prev_index.get(&current.records[i].pid) {
            Some(&j) => {
                let prev = &previous.counters[j];
                (prev.total_faults, prev.total_time)
            }
            None => (0, 0),
        };

        let record = &mut current.records[i];
        record.fault_rate = rate(curr.total_faults, prev_faults, dt);
        record.cpu_utilization = rate(curr.total_time, prev_time, dt);
    }
}

/// Fills the context-switch and I/O rates of the filtered list.
///
/// Runs after detail collection, so only the filtered subset pays for it.
/// `filtered.cpu_total_time` was copied from the current snapshot when the
/// list was built.
pub fn derive_detail_rates(filtered: &mut ProcessList, previous: &ProcessList) {
    let prev_index = pid_index(previous);
    let dt = delta(filtered.cpu_total_time, previous.cpu_total_time);

    for i in 0..filtered.len() {
        let curr = &filtered.counters[i];
        let (prev_vctxt, prev_nvctxt, prev_read, prev_write) =
            match prev_index.get(&filtered.records[i].pid) {
                Some(&j) => {
                    let prev = &previous.counters[j];
                    (prev.vctxt, prev.nvctxt, prev.read_bytes, prev.write_bytes)
                }
                None => (0, 0, 0, 0),
            };

        let record = &mut filtered.records[i];
        record.vctxt_rate = rate(curr.vctxt, prev_vctxt, dt);
        record.nvctxt_rate = rate(curr.nvctxt, prev_nvctxt, dt);
        record.read_rate = rate(curr.read_bytes, prev_read, dt);
        record.write_rate = rate(curr.write_bytes, prev_write, dt);
    }
}
