use std::io;

use thiserror::Error;

/// Errors raised by the mapping layer.
#[derive(Debug, Error)]
pub enum SysError {
    /// `mmap` failed.
    #[error("mmap failed: {0}")]
    Mmap(io::Error),

    /// `msync` (flush) failed.
    #[error("msync failed: {0}")]
    Msync(io::Error),
}

impl SysError {
    /// Stable integer error code for this variant, shared with the
    /// top-level error taxonomy.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            SysError::Mmap(_) => -9,
            SysError::Msync(_) => -7,
        }
    }
}
