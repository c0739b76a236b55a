//! Append-only writer for the per-tick output record.
//!
//! Record layout, packed little-endian, one record per tick:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ irq_info        num_of_cores × i64                       │
//! │ network_info    8 × u64                                  │
//! │ frequency_info  num_of_cores × u32                       │
//! │ processes       num_of_processes × 76-byte record        │
//! │                   pid: u32, affinity: u64, 8 × f64       │
//! │ pmu_info        num_of_processes × num_of_events × u64   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are unframed: the counts are not embedded, so a reader needs
//! the same configuration (or a sidecar) to know the shape. Fewer filtered
//! processes than `num_of_processes` leaves the remaining slots zeroed,
//! keeping every record the same length.

use crate::collector::procfs::parser::NET_COUNTERS;
use crate::snapshot::ProcessRecord;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Serialized size of one per-process record.
pub const PROCESS_RECORD_BYTES: usize = 4 + 8 + 8 * 8;

/// Appends one fixed-shape binary record per tick.
pub struct RecordWriter {
    file: File,
    num_cores: usize,
    num_processes: usize,
    num_events: usize,
    buf: Vec<u8>,
}

impl RecordWriter {
    /// Opens (or creates) the output file in append mode.
    pub fn open(
        path: impl AsRef<Path>,
        num_cores: usize,
        num_processes: usize,
        num_events: usize,
    ) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = Self {
            file,
            num_cores,
            num_processes,
            num_events,
            buf: Vec::new(),
        };
        writer.buf = Vec::with_capacity(writer.record_len());
        Ok(writer)
    }

    /// Length in bytes of every record this writer emits.
    pub fn record_len(&self) -> usize {
        self.num_cores * 8
            + NET_COUNTERS * 8
            + self.num_cores * 4
            + self.num_processes * PROCESS_RECORD_BYTES
            + self.num_processes * self.num_events * 8
    }

    /// Serializes and appends one tick. `processes` and `pmu` may be
    /// shorter than `num_of_processes`; missing slots are zeroed.
    pub fn append(
        &mut self,
        irq_info: &[i64],
        network_info: &[u64; NET_COUNTERS],
        frequency_info: &[u32],
        processes: &[ProcessRecord],
        pmu_info: &[Vec<u64>],
    ) -> io::Result<usize> {
        debug_assert_eq!(irq_info.len(), self.num_cores);
        debug_assert_eq!(frequency_info.len(), self.num_cores);
        debug_assert!(processes.len() <= self.num_processes);
        debug_assert_eq!(processes.len(), pmu_info.len());

        self.buf.clear();

        for &irq in irq_info {
            self.buf.extend_from_slice(&irq.to_le_bytes());
        }
        for &counter in network_info {
            self.buf.extend_from_slice(&counter.to_le_bytes());
        }
        for &mhz in frequency_info {
            self.buf.extend_from_slice(&mhz.to_le_bytes());
        }

        let empty = ProcessRecord::default();
        for slot in 0..self.num_processes {
            let record = processes.get(slot).unwrap_or(&empty);
            encode_process(&mut self.buf, record);
        }

        for slot in 0..self.num_processes {
            for event in 0..self.num_events {
                let count = pmu_info
                    .get(slot)
                    .and_then(|events| events.get(event))
                    .copied()
                    .unwrap_or(0);
                self.buf.extend_from_slice(&count.to_le_bytes());
            }
        }

        debug_assert_eq!(self.buf.len(), self.record_len());
        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        Ok(self.buf.len())
    }
}

fn encode_process(buf: &mut Vec<u8>, record: &ProcessRecord) {
    buf.extend_from_slice(&record.pid.to_le_bytes());
    buf.extend_from_slice(&record.affinity.to_le_bytes());
    for value in [
        record.fault_rate,
        record.cpu_utilization,
        record.vctxt_rate,
        record.nvctxt_rate,
        record.read_rate,
        record.write_rate,
        record.vmem_utilization,
        record.rmem_utilization,
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(pid: u32) -> ProcessRecord {
        ProcessRecord {
            pid,
            affinity: 0b101,
            fault_rate: 0.125,
            cpu_utilization: 0.25,
            vctxt_rate: 0.01,
            nvctxt_rate: 0.02,
            read_rate: 0.03,
            write_rate: 0.04,
            vmem_utilization: 0.5,
            rmem_utilization: 0.25,
        }
    }

    #[test]
    fn record_length_is_fixed_by_configuration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = RecordWriter::open(&path, 2, 1, 3).unwrap();

        // 2×8 irq + 8×8 net + 2×4 freq + 1×76 process + 1×3×8 pmu.
        assert_eq!(writer.record_len(), 16 + 64 + 8 + 76 + 24);

        let written = writer
            .append(
                &[1, 2],
                &[0; NET_COUNTERS],
                &[2400, 2400],
                &[sample_record(42)],
                &[vec![10, 20, 30]],
            )
            .unwrap();

        assert_eq!(written, writer.record_len());
        assert_eq!(
            std::fs::read(&path).unwrap().len(),
            writer.record_len()
        );
    }

    #[test]
    fn appends_accumulate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = RecordWriter::open(&path, 1, 1, 1).unwrap();

        for _ in 0..3 {
            writer
                .append(&[0], &[0; NET_COUNTERS], &[0], &[], &[])
                .unwrap();
        }

        assert_eq!(
            std::fs::read(&path).unwrap().len(),
            3 * writer.record_len()
        );
    }

    #[test]
    fn missing_slots_are_zero_padded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = RecordWriter::open(&path, 1, 2, 1).unwrap();

        writer
            .append(
                &[0],
                &[0; NET_COUNTERS],
                &[0],
                &[sample_record(7)],
                &[vec![99]],
            )
            .unwrap();

        let data = std::fs::read(&path).unwrap();
        // Second process slot starts after irq+net+freq+first record.
        let second = 8 + 64 + 4 + PROCESS_RECORD_BYTES;
        assert!(
            data[second..second + PROCESS_RECORD_BYTES]
                .iter()
                .all(|&b| b == 0)
        );

        // First pmu slot carries the count, second is zero.
        let pmu = second + PROCESS_RECORD_BYTES;
        assert_eq!(u64::from_le_bytes(data[pmu..pmu + 8].try_into().unwrap()), 99);
        assert_eq!(
            u64::from_le_bytes(data[pmu + 8..pmu + 16].try_into().unwrap()),
            0
        );
    }

    #[test]
    fn field_order_within_a_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut writer = RecordWriter::open(&path, 1, 1, 0).unwrap();

        writer
            .append(
                &[-5],
                &[1, 2, 3, 4, 5, 6, 7, 8],
                &[3200],
                &[sample_record(42)],
                &[vec![]],
            )
            .unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(i64::from_le_bytes(data[0..8].try_into().unwrap()), -5);
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(data[72..76].try_into().unwrap()), 3200);

        let proc = 76;
        assert_eq!(
            u32::from_le_bytes(data[proc..proc + 4].try_into().unwrap()),
            42
        );
        assert_eq!(
            u64::from_le_bytes(data[proc + 4..proc + 12].try_into().unwrap()),
            0b101
        );
        assert_eq!(
            f64::from_le_bytes(data[proc + 12..proc + 20].try_into().unwrap()),
            0.125
        );
    }
}
