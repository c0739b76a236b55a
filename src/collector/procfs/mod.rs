//! Readers for the Linux `/proc` filesystem.
//!
//! Parsing is split from I/O: `parser` holds pure functions over file
//! contents, `process` walks the filesystem and applies the skip-on-vanish
//! policy for short-lived processes and threads.

pub mod parser;
pub mod process;

pub use parser::ParseError;
pub use process::{CollectError, ProcessCollector};
