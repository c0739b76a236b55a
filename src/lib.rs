//! nerve — periodic whole-node performance telemetry collection.
//!
//! Provides:
//! - `collector` — `/proc` readers, the MSR/TSC hardware sampler, and the
//!   `perf_event_open` PMU sampler
//! - `rates` / `select` — rate derivation and top-K selection between ticks
//! - `snapshot` — the per-tick process data model
//! - `app` — TCP client for cooperating applications
//! - `storage` — fixed-shape binary record writer
//! - `config` — JSON configuration
//! - `sampler` — the tick orchestrator

pub mod app;
pub mod collector;
pub mod config;
pub mod rates;
pub mod sampler;
pub mod select;
pub mod snapshot;
pub mod storage;
