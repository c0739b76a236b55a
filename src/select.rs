//! Top-K selection of the heaviest CPU consumers.

use crate::snapshot::ProcessList;

/// Rebuilds `filtered` with the `k` entries of `current` that have the
/// greatest CPU utilization, ties broken by input order.
///
/// K iterations of a linear max-scan over an index array; with N ≤ 512 and
/// small K that beats sorting the whole list. The collector's own PID is
/// excluded even if it slipped into the snapshot.
pub fn select_top_k(current: &ProcessList, filtered: &mut ProcessList, k: usize, self_pid: u32) {
    filtered.clear();
    filtered.cpu_total_time = current.cpu_total_time;

    let mut order: Vec<usize> = (0..current.len())
        .filter(|&i| current.records[i].pid != self_pid)
        .collect();

    let take = k.min(order.len());
    for front in 0..take {
        let mut best = front;
        for candidate in front + 1..order.len() {
            if current.records[order[candidate]].cpu_utilization
                > current.records[order[best]].cpu_utilization
            {
                best = candidate;
            }
        }
        order.swap(front, best);
        filtered.push_from(current, order[front]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ProcessCounters, ProcessRecord};

    fn list_with_utilizations(utilizations: &[f64]) -> ProcessList {
        let mut list = ProcessList::new();
        for (i, &cpu_utilization) in utilizations.iter().enumerate() {
            list.push(
                ProcessCounters::default(),
                ProcessRecord {
                    pid: 1000 + i as u32,
                    cpu_utilization,
                    ..Default::default()
                },
            );
        }
        list
    }

    #[test]
    fn ties_break_by_input_order() {
        let current = list_with_utilizations(&[0.1, 0.9, 0.5, 0.9, 0.2, 0.3, 0.9, 0.05]);
        let mut filtered = ProcessList::new();

        select_top_k(&current, &mut filtered, 2, 0);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.records[0].pid, 1001);
        assert_eq!(filtered.records[1].pid, 1003);
    }

    #[test]
    fn k_larger_than_list_takes_everything() {
        let current = list_with_utilizations(&[0.3, 0.1]);
        let mut filtered = ProcessList::new();

        select_top_k(&current, &mut filtered, 16, 0);

        assert_eq!(filtered.len(), 2);
        // Still ordered by utilization.
        assert_eq!(filtered.records[0].pid, 1000);
        assert_eq!(filtered.records[1].pid, 1001);
    }

    #[test]
    fn no_pid_selected_twice() {
        let current = list_with_utilizations(&[0.5, 0.4, 0.3, 0.2]);
        let mut filtered = ProcessList::new();

        select_top_k(&current, &mut filtered, 4, 0);

        let mut pids: Vec<u32> = filtered.records.iter().map(|r| r.pid).collect();
        pids.dedup();
        assert_eq!(pids.len(), 4);
    }

    #[test]
    fn own_pid_is_excluded() {
        let current = list_with_utilizations(&[0.9, 0.1]);
        let mut filtered = ProcessList::new();

        select_top_k(&current, &mut filtered, 2, 1000);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.records[0].pid, 1001);
    }

    #[test]
    fn filtered_inherits_cpu_total_time() {
        let mut current = list_with_utilizations(&[0.9]);
        current.cpu_total_time = 4242;
        let mut filtered = ProcessList::new();

        select_top_k(&current, &mut filtered, 1, 0);

        assert_eq!(filtered.cpu_total_time, 4242);
    }
}
