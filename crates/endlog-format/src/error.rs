use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the file-format and directory/naming layers.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Creating a new log file failed (create-exclusive, extend, or footer write).
    #[error("failed to create log file {path}: {source}")]
    FileCreate { path: PathBuf, source: io::Error },

    /// Extending a newly created file to its configured capacity failed.
    #[error("failed to extend log file {path} to {capacity} bytes: {source}")]
    FileExtend {
        path: PathBuf,
        capacity: u32,
        source: io::Error,
    },

    /// Opening an existing log file, or validating its footer, failed.
    #[error("failed to open log file {path}: {reason}")]
    FileOpen { path: PathBuf, reason: String },

    /// A directory operation (probe, stat, remove) failed.
    #[error("directory access error at {path}: {source}")]
    DirAccess { path: PathBuf, source: io::Error },

    /// The requested capacity is outside `[CAPACITY_MIN, CAPACITY_MAX]`.
    #[error("capacity {0} is outside the allowed range [1 MiB, 7 MiB]")]
    InvalidCapacity(u32),
}

impl FormatError {
    /// Stable integer error code for this variant, shared with the
    /// top-level error taxonomy.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            FormatError::FileCreate { .. } => -5,
            FormatError::FileExtend { .. } => -8,
            FormatError::FileOpen { .. } => -6,
            FormatError::DirAccess { .. } => -13,
            FormatError::InvalidCapacity(_) => -1,
        }
    }
}
