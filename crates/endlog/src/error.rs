use std::io;

use endlog_crypto::CryptoError;
use endlog_format::FormatError;
use endlog_sys::SysError;
use thiserror::Error;

/// Errors raised by the public `endlog` API.
///
/// Every variant carries a stable integer via [`LogError::code`] matching a
/// fixed taxonomy one-to-one, so a caller that needs a C-style error code
/// (for logging, or a future FFI shim) can get it without matching on the
/// variant itself.
#[derive(Debug, Error)]
pub enum LogError {
    /// A parameter was invalid (e.g. a zero-length record, or a capacity
    /// outside `[1 MiB, 7 MiB]`).
    #[error("invalid parameter")]
    InvalidParam,

    /// The handle is not valid (reserved for future handle-table checks).
    #[error("invalid handle")]
    InvalidHandle,

    /// Memory allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// The requested log file does not exist.
    #[error("log file not found")]
    FileNotFound,

    /// The file-format or directory/naming layer failed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The mapping layer failed.
    #[error(transparent)]
    Sys(#[from] SysError),

    /// A record is larger than the active file's maximum payload and can
    /// never fit; it is dropped, not split.
    #[error("record of {len} bytes exceeds the {max} byte payload capacity of this volume")]
    FileSizeExceed { len: u32, max: u32 },

    /// A mapping was used after it should no longer be valid.
    #[error("mapping is no longer valid")]
    InvalidMmap,

    /// A directory operation (access check, enumeration) failed.
    #[error("directory access error: {0}")]
    DirAccess(io::Error),

    /// The handle has been closed; the write was rejected without touching
    /// memory.
    #[error("handle is closed")]
    HandleClosed,

    /// Rotation to a new file failed; the volume remains usable on the old
    /// file and the caller may retry on the next overflow.
    #[error("rotation to a new file failed; still appending to the previous file")]
    FileSwitch,

    /// The rotation mutex could not be acquired.
    #[error("failed to acquire the rotation mutex")]
    MutexLock,

    /// The crypto primitive failed to initialize (key derivation or salt draw).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An error the taxonomy has no dedicated code for.
    #[error("unexpected system error: {0}")]
    System(String),
}

impl LogError {
    /// Stable integer error code for this variant.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            LogError::InvalidParam => -1,
            LogError::InvalidHandle => -2,
            LogError::OutOfMemory => -3,
            LogError::FileNotFound => -4,
            LogError::Format(e) => e.code(),
            LogError::Sys(e) => e.code(),
            LogError::FileSizeExceed { .. } => -11,
            LogError::InvalidMmap => -12,
            LogError::DirAccess(_) => -13,
            LogError::HandleClosed => -14,
            LogError::FileSwitch => -15,
            LogError::MutexLock => -16,
            LogError::Crypto(e) => e.code(),
            LogError::System(_) => -100,
        }
    }
}

/// Map a stable error code to a caller-visible message without composing a
/// string at the call site: a single static lookup table.
#[must_use]
pub const fn code_message(code: i32) -> &'static str {
    match code {
        0 => "success",
        -1 => "invalid parameter",
        -2 => "invalid handle",
        -3 => "out of memory",
        -4 => "file not found",
        -5 => "file create failed",
        -6 => "file open failed",
        -7 => "file write failed",
        -8 => "file extend failed",
        -9 => "mmap failed",
        -10 => "munmap failed",
        -11 => "record exceeds file size",
        -12 => "invalid mmap",
        -13 => "directory access error",
        -14 => "handle closed",
        -15 => "file switch failed",
        -16 => "mutex lock failed",
        -17 => "crypto initialization failed",
        -100 => "system error",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_message_covers_the_stable_table() {
        assert_eq!(code_message(0), "success");
        assert_eq!(code_message(-17), "crypto initialization failed");
        assert_eq!(code_message(-12345), "unknown error");
    }

    #[test]
    fn variant_codes_match_the_taxonomy() {
        assert_eq!(LogError::InvalidParam.code(), -1);
        assert_eq!(LogError::HandleClosed.code(), -14);
        assert_eq!(LogError::FileSwitch.code(), -15);
        assert_eq!(LogError::MutexLock.code(), -16);
    }
}
