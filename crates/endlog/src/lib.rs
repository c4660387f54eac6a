//! Embeddable, crash-resilient, concurrent append-only log writer.
//!
//! A volume is a directory holding a rolling set of fixed-capacity,
//! memory-mapped files. Any number of threads may append records to an
//! open [`LogHandle`] concurrently without ever blocking on each other: a
//! single atomic counter per file, updated by compare-and-swap, reserves
//! disjoint byte ranges for each writer. Files roll over automatically when
//! full, and the volume may optionally encrypt every byte it writes with
//! AES-256-CTR keyed from a password.
//!
//! ```no_run
//! let handle = endlog::LogHandle::open("/var/log/myapp", None)?;
//! handle.write(b"hello")?;
//! handle.flush()?;
//! # Ok::<(), endlog::LogError>(())
//! ```

mod cleanup;
mod config;
mod error;
mod handle;

pub use cleanup::cleanup;
pub use config::set_max_capacity;
pub use error::{code_message, LogError};
pub use handle::LogHandle;

pub use endlog_format::{CAPACITY_MAX, CAPACITY_MIN, DAILY_BUDGET, DEFAULT_CAPACITY};
