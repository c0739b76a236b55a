//! Persistence of sampled telemetry.

pub mod writer;

pub use writer::{PROCESS_RECORD_BYTES, RecordWriter};
