//! Per-tick acquisition of OS, hardware, and application statistics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Sampler                             │
//! │  ┌───────────────────┐  ┌────────────────┐  ┌─────────────┐  │
//! │  │ ProcessCollector  │  │ HardwareSampler│  │  PmuSampler │  │
//! │  │  /proc/<pid>/*    │  │  /proc/interr. │  │  perf_event │  │
//! │  │  /proc/stat       │  │  /proc/net/dev │  │  _open(2)   │  │
//! │  └─────────┬─────────┘  │  /dev/cpu/*/msr│  └─────────────┘  │
//! │            │            └───────┬────────┘                   │
//! │            └───────────┬────────┘                            │
//! │                 ┌──────▼──────┐                              │
//! │                 │  FileSystem │ (text files only)            │
//! │                 └──────┬──────┘                              │
//! └────────────────────────┼─────────────────────────────────────┘
//!              ┌───────────┴───────────┐
//!       ┌──────▼──────┐         ┌──────▼──────┐
//!       │   RealFs    │         │   MockFs    │
//!       │ (Linux)     │         │ (tests)     │
//!       └─────────────┘         └─────────────┘
//! ```
//!
//! The `FileSystem` seam covers everything line-oriented; the MSR reads
//! and the `perf_event_open`/`prctl` calls have their own narrow seams
//! (`MsrReader`, pure scaling helpers) so their arithmetic stays testable.

pub mod hardware;
pub mod mock;
pub mod pmu;
pub mod procfs;
pub mod traits;

pub use hardware::{HardwareError, HardwareSampler};
pub use mock::MockFs;
pub use pmu::{PmuError, PmuSampler};
pub use procfs::{CollectError, ParseError, ProcessCollector};
pub use traits::{FileSystem, RealFs};
