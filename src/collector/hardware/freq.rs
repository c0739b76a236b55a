//! Per-core CPU frequency estimation from the TSC and fixed-function MSRs.
//!
//! The estimate over a sample window is
//! `MHz = (Δtsc / Δμs) × (Δunhalted_core / Δunhalted_ref)`:
//! the TSC gives the invariant base clock, and the ratio of unhalted core
//! cycles to unhalted reference cycles captures scaling and turbo. Reading
//! `/dev/cpu/<n>/msr` requires CAP_SYS_RAWIO.

use std::io;
use std::os::unix::fs::FileExt;
use std::time::Instant;

/// IA32_FIXED_CTR1, unhalted core cycles.
const MSR_UNHALTED_CORE: u64 = 0x030A;
/// IA32_FIXED_CTR2, unhalted reference cycles.
const MSR_UNHALTED_REF: u64 = 0x030B;

/// Frequencies above this are treated as measurement glitches and replaced
/// by the mean of the remaining cores.
const MAX_PLAUSIBLE_MHZ: f64 = 4000.0;

/// Error type for MSR access failures. These indicate missing privileges
/// or a kernel without the msr module and are not retried.
#[derive(Debug)]
pub struct MsrError {
    pub core: usize,
    pub source: io::Error,
}

impl std::fmt::Display for MsrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MSR access failed on core {}: {}", self.core, self.source)
    }
}

impl std::error::Error for MsrError {}

/// Read access to per-core model-specific registers.
pub trait MsrReader {
    fn read(&self, core: usize, register: u64) -> io::Result<u64>;
}

/// Production reader backed by `/dev/cpu/<n>/msr`.
///
/// The register number is the file offset; each read is an 8-byte pread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevMsr;

impl DevMsr {
    pub fn new() -> Self {
        Self
    }
}

impl MsrReader for DevMsr {
    fn read(&self, core: usize, register: u64) -> io::Result<u64> {
        let file = std::fs::File::open(format!("/dev/cpu/{core}/msr"))?;
        let mut buf = [0u8; 8];
        file.read_exact_at(&mut buf, register)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// Reads the time-stamp counter.
#[cfg(target_arch = "x86_64")]
fn read_tsc() -> u64 {
    // SAFETY: RDTSC has no memory effects.
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_arch = "x86")]
fn read_tsc() -> u64 {
    // SAFETY: RDTSC has no memory effects.
    unsafe { core::arch::x86::_rdtsc() }
}

#[cfg(target_arch = "powerpc64")]
fn read_tsc() -> u64 {
    let tb: u64;
    // SAFETY: MFTB only reads the time-base register.
    unsafe { core::arch::asm!("mftb {0}", out(reg) tb) };
    tb
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "powerpc64")))]
fn read_tsc() -> u64 {
    0
}

/// Counter delta across a window, assuming at most one 64-bit wraparound.
pub fn wrapping_delta(before: u64, after: u64) -> u64 {
    if after < before {
        u64::MAX - before + after + 1
    } else {
        after - before
    }
}

/// Clamps implausible estimates to a 0 sentinel, then replaces every
/// sentinel with the mean of the surviving cores. All-sentinel input
/// (or an all-zero window) stays all zero.
pub fn clamp_to_mean(raw: &[f64]) -> Vec<u32> {
    let mut mhz: Vec<u32> = raw
        .iter()
        .map(|&f| {
            if f.is_finite() && f > 0.0 && f <= MAX_PLAUSIBLE_MHZ {
                f as u32
            } else {
                0
            }
        })
        .collect();

    let live: Vec<u32> = mhz.iter().copied().filter(|&f| f != 0).collect();
    if !live.is_empty() && live.len() != mhz.len() {
        let mean = (live.iter().map(|&f| f as u64).sum::<u64>() / live.len() as u64) as u32;
        for f in mhz.iter_mut().filter(|f| **f == 0) {
            *f = mean;
        }
    }

    mhz
}

/// Window state captured by [`FrequencyEstimator::begin_window`].
#[derive(Debug, Clone)]
struct WindowStart {
    at: Instant,
    tsc: u64,
    core_cycles: Vec<u64>,
    ref_cycles: Vec<u64>,
}

/// TSC+MSR frequency estimator, one begin/end pair per sample window.
pub struct FrequencyEstimator<M: MsrReader> {
    msr: M,
    num_cores: usize,
    start: Option<WindowStart>,
}

impl<M: MsrReader> FrequencyEstimator<M> {
    pub fn new(msr: M, num_cores: usize) -> Self {
        Self {
            msr,
            num_cores,
            start: None,
        }
    }

    /// Captures the wall clock, the TSC, and both cycle MSRs on every core.
    pub fn begin_window(&mut self) -> Result<(), MsrError> {
        let mut core_cycles = Vec::with_capacity(self.num_cores);
        let mut ref_cycles = Vec::with_capacity(self.num_cores);
        for core in 0..self.num_cores {
            core_cycles.push(self.read_msr(core, MSR_UNHALTED_CORE)?);
            ref_cycles.push(self.read_msr(core, MSR_UNHALTED_REF)?);
        }

        self.start = Some(WindowStart {
            at: Instant::now(),
            tsc: read_tsc(),
            core_cycles,
            ref_cycles,
        });
        Ok(())
    }

    /// Closes the window and returns the per-core estimate in MHz.
    ///
    /// Without a matching `begin_window` the result is all zeros.
    pub fn end_window(&mut self) -> Result<Vec<u32>, MsrError> {
        let Some(start) = self.start.take() else {
            return Ok(vec![0; self.num_cores]);
        };

        let elapsed_us = start.at.elapsed().as_micros() as f64;
        let tsc_delta = wrapping_delta(start.tsc, read_tsc()) as f64;

        let mut raw = Vec::with_capacity(self.num_cores);
        for core in 0..self.num_cores {
            let core_delta =
                wrapping_delta(start.core_cycles[core], self.read_msr(core, MSR_UNHALTED_CORE)?);
            let ref_delta =
                wrapping_delta(start.ref_cycles[core], self.read_msr(core, MSR_UNHALTED_REF)?);

            if elapsed_us == 0.0 || ref_delta == 0 {
                raw.push(0.0);
            } else {
                raw.push((tsc_delta / elapsed_us) * (core_delta as f64 / ref_delta as f64));
            }
        }

        Ok(clamp_to_mean(&raw))
    }

    fn read_msr(&self, core: usize, register: u64) -> Result<u64, MsrError> {
        self.msr
            .read(core, register)
            .map_err(|source| MsrError { core, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[test]
    fn delta_without_wraparound() {
        assert_eq!(wrapping_delta(100, 350), 250);
        assert_eq!(wrapping_delta(0, 0), 0);
    }

    #[test]
    fn delta_with_wraparound() {
        // before = MAX - 10, after = 5: the counter advanced by 16.
        assert_eq!(wrapping_delta(u64::MAX - 10, 5), 16);
        assert_eq!(wrapping_delta(u64::MAX, 0), 1);
    }

    #[test]
    fn clamp_replaces_outliers_with_mean() {
        let mhz = clamp_to_mean(&[2400.0, 9000.0, 2600.0, f64::INFINITY]);
        assert_eq!(mhz, vec![2400, 2500, 2600, 2500]);
    }

    #[test]
    fn clamp_all_outliers_yields_zero() {
        assert_eq!(clamp_to_mean(&[8000.0, 9000.0]), vec![0, 0]);
        assert_eq!(clamp_to_mean(&[0.0, 0.0]), vec![0, 0]);
    }

    #[test]
    fn clamp_keeps_plausible_values() {
        assert_eq!(clamp_to_mean(&[1200.5, 3999.9]), vec![1200, 3999]);
    }

    /// MSR fixture: per-(core, register) sequence of values, one per read.
    struct ScriptedMsr {
        values: RefCell<HashMap<(usize, u64), Vec<u64>>>,
    }

    impl ScriptedMsr {
        fn new(values: &[((usize, u64), &[u64])]) -> Self {
            Self {
                values: RefCell::new(
                    values
                        .iter()
                        .map(|&(key, vals)| (key, vals.to_vec()))
                        .collect(),
                ),
            }
        }
    }

    impl MsrReader for ScriptedMsr {
        fn read(&self, core: usize, register: u64) -> io::Result<u64> {
            let mut values = self.values.borrow_mut();
            let seq = values
                .get_mut(&(core, register))
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no msr"))?;
            if seq.is_empty() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "script over"));
            }
            Ok(seq.remove(0))
        }
    }

    #[test]
    fn window_survives_ref_counter_wraparound() {
        let msr = ScriptedMsr::new(&[
            ((0, MSR_UNHALTED_CORE), &[u64::MAX - 10, 5]),
            ((0, MSR_UNHALTED_REF), &[u64::MAX - 10, 5]),
        ]);
        let mut estimator = FrequencyEstimator::new(msr, 1);

        estimator.begin_window().unwrap();
        let mhz = estimator.end_window().unwrap();

        // Core/ref deltas are both 16 so the estimate reduces to the TSC
        // rate, which is finite and non-negative on every arch.
        assert_eq!(mhz.len(), 1);
        assert!(mhz[0] <= MAX_PLAUSIBLE_MHZ as u32);
    }

    #[test]
    fn end_without_begin_is_all_zero() {
        let msr = ScriptedMsr::new(&[]);
        let mut estimator = FrequencyEstimator::new(msr, 2);
        assert_eq!(estimator.end_window().unwrap(), vec![0, 0]);
    }

    #[test]
    fn msr_failure_is_reported_with_core() {
        let msr = ScriptedMsr::new(&[((0, MSR_UNHALTED_CORE), &[1])]);
        let mut estimator = FrequencyEstimator::new(msr, 1);

        let err = estimator.begin_window().unwrap_err();
        assert_eq!(err.core, 0);
    }
}
