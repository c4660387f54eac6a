use std::sync::atomic::{AtomicU32, Ordering};

use endlog_format::{Footer, DEFAULT_CAPACITY};
use tracing::debug;

use crate::error::LogError;

static MAX_CAPACITY: AtomicU32 = AtomicU32::new(DEFAULT_CAPACITY);

/// Set the process-wide maximum per-file capacity, in `[1 MiB, 7 MiB]`.
///
/// This is a single process-wide global, but each [`crate::LogHandle::open`]
/// snapshots it once at open time: later calls to this function do not
/// affect handles that are already open.
pub fn set_max_capacity(n: u32) -> Result<(), LogError> {
    Footer::validate_capacity(n)?;
    MAX_CAPACITY.store(n, Ordering::Release);
    debug!(capacity = n, "updated process-wide max capacity");
    Ok(())
}

/// Snapshot the currently configured maximum capacity.
pub(crate) fn snapshot_max_capacity() -> u32 {
    MAX_CAPACITY.load(Ordering::Acquire)
}
