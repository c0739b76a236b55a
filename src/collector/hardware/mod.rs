//! Node-wide hardware counters sampled across the PMU window.
//!
//! The sampler is a value object owned by the orchestrator: `pre_window`
//! captures NIC interrupt counts, network-interface totals, and the
//! frequency baseline; `post_window` re-reads everything and leaves the
//! window deltas in `irq_info`, `network_info`, and `frequency_info`.

pub mod freq;

use crate::collector::procfs::parser::{
    NET_COUNTERS, ParseError, parse_nic_interrupts, parse_nic_totals,
};
use crate::collector::traits::FileSystem;
use freq::{FrequencyEstimator, MsrError, MsrReader};
use std::io;
use std::path::Path;

/// Error type for hardware sampling failures. All variants are fatal:
/// they mean `/proc` is unreadable, malformed, or MSR access is denied.
#[derive(Debug)]
pub enum HardwareError {
    Io(io::Error),
    Parse(String),
    Msr(MsrError),
}

impl std::fmt::Display for HardwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareError::Io(e) => write!(f, "I/O error: {e}"),
            HardwareError::Parse(msg) => write!(f, "parse error: {msg}"),
            HardwareError::Msr(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HardwareError {}

impl From<io::Error> for HardwareError {
    fn from(e: io::Error) -> Self {
        HardwareError::Io(e)
    }
}

impl From<ParseError> for HardwareError {
    fn from(e: ParseError) -> Self {
        HardwareError::Parse(e.message)
    }
}

impl From<MsrError> for HardwareError {
    fn from(e: MsrError) -> Self {
        HardwareError::Msr(e)
    }
}

/// Samples IRQ distribution, NIC totals, and CPU frequency over a window.
pub struct HardwareSampler<F: FileSystem, M: MsrReader> {
    fs: F,
    proc_path: String,
    num_cores: usize,
    freq: FrequencyEstimator<M>,
    irq_start: Vec<i64>,
    net_start: [u64; NET_COUNTERS],
    /// Δinterrupts on NIC-bound IRQ lines over the window, per core.
    pub irq_info: Vec<i64>,
    /// Δ(recv/send bytes, packets, errs, drops) summed over `eth*`.
    pub network_info: [u64; NET_COUNTERS],
    /// Per-core estimate in MHz.
    pub frequency_info: Vec<u32>,
}

impl<F: FileSystem, M: MsrReader> HardwareSampler<F, M> {
    pub fn new(fs: F, proc_path: impl Into<String>, msr: M, num_cores: usize) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            num_cores,
            freq: FrequencyEstimator::new(msr, num_cores),
            irq_start: vec![0; num_cores],
            net_start: [0; NET_COUNTERS],
            irq_info: vec![0; num_cores],
            network_info: [0; NET_COUNTERS],
            frequency_info: vec![0; num_cores],
        }
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    /// Captures the window baseline. Called right before the PMU window
    /// opens so all deltas cover the same interval.
    pub fn pre_window(&mut self) -> Result<(), HardwareError> {
        self.irq_start = self.read_irqs()?;
        self.net_start = self.read_net()?;
        self.freq.begin_window()?;
        Ok(())
    }

    /// Closes the window and computes all deltas and the frequency
    /// estimate. Called right after the window sleep.
    pub fn post_window(&mut self) -> Result<(), HardwareError> {
        let irq_end = self.read_irqs()?;
        for core in 0..self.num_cores {
            self.irq_info[core] = irq_end[core] - self.irq_start[core];
        }

        let net_end = self.read_net()?;
        for (slot, end) in net_end.iter().enumerate() {
            self.network_info[slot] = end.saturating_sub(self.net_start[slot]);
        }

        self.frequency_info = self.freq.end_window()?;
        Ok(())
    }

    fn read_irqs(&self) -> Result<Vec<i64>, HardwareError> {
        let path = format!("{}/interrupts", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        Ok(parse_nic_interrupts(&content, self.num_cores)?)
    }

    fn read_net(&self) -> Result<[u64; NET_COUNTERS], HardwareError> {
        let path = format!("{}/net/dev", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        Ok(parse_nic_totals(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use std::io;

    /// MSR stub that always reads zero, so frequencies come out zero.
    struct ZeroMsr;

    impl MsrReader for ZeroMsr {
        fn read(&self, _core: usize, _register: u64) -> io::Result<u64> {
            Ok(0)
        }
    }

    fn interrupts(counts: [i64; 4]) -> String {
        format!(
            "           CPU0       CPU1       CPU2       CPU3\n  24: {} {} {} {}   PCI-MSI  eth0\n",
            counts[0], counts[1], counts[2], counts[3]
        )
    }

    fn net_dev(rx_bytes: u64, tx_bytes: u64) -> String {
        format!(
            "Inter-|   Receive                                                |  Transmit\n \
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n\
             eth0: {rx_bytes} 10 0 0 0 0 0 0 {tx_bytes} 20 0 0 0 0 0 0\n"
        )
    }

    #[test]
    fn window_deltas_cover_interrupts_and_network() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/interrupts", interrupts([100, 200, 300, 400]));
        fs.add_file("/proc/net/dev", net_dev(1000, 5000));

        let mut sampler = HardwareSampler::new(fs.clone(), "/proc", ZeroMsr, 4);
        sampler.pre_window().unwrap();

        // Counters advance during the window.
        fs.add_file("/proc/interrupts", interrupts([150, 260, 370, 480]));
        fs.add_file("/proc/net/dev", net_dev(1500, 5100));
        sampler.fs = fs;

        sampler.post_window().unwrap();

        assert_eq!(sampler.irq_info, vec![50, 60, 70, 80]);
        assert_eq!(sampler.network_info[0], 500); // recv bytes
        assert_eq!(sampler.network_info[4], 100); // send bytes
        assert_eq!(sampler.frequency_info, vec![0, 0, 0, 0]);
    }

    #[test]
    fn first_window_from_cold_start_counts_from_zero_baseline() {
        // At startup the baseline is whatever the first pre-read observes;
        // a pre-read of zeros makes the delta equal to the raw counts.
        let mut fs = MockFs::new();
        fs.add_file("/proc/interrupts", interrupts([0, 0, 0, 0]));
        fs.add_file("/proc/net/dev", net_dev(0, 0));

        let mut sampler = HardwareSampler::new(fs.clone(), "/proc", ZeroMsr, 4);
        sampler.pre_window().unwrap();

        fs.add_file("/proc/interrupts", interrupts([100, 200, 300, 400]));
        sampler.fs = fs;
        sampler.post_window().unwrap();

        assert_eq!(sampler.irq_info, vec![100, 200, 300, 400]);
    }

    #[test]
    fn missing_proc_file_is_fatal() {
        let mut sampler = HardwareSampler::new(MockFs::new(), "/proc", ZeroMsr, 2);
        assert!(matches!(
            sampler.pre_window(),
            Err(HardwareError::Io(_))
        ));
    }
}
