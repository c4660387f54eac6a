use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::FormatError;

/// Length in bytes of the salt region of the footer.
pub const SALT_LEN: usize = 16;
/// Total length in bytes of the fixed footer (salt + magic + capacity + used).
pub const FOOTER_LEN: usize = SALT_LEN + 4 + 4 + 4;
/// The four ASCII bytes that identify a valid log file: `"Endx"`.
pub const MAGIC: [u8; 4] = *b"Endx";

/// Smallest allowed per-file capacity: 1 MiB.
pub const CAPACITY_MIN: u32 = 1 << 20;
/// Largest allowed per-file capacity: 7 MiB.
pub const CAPACITY_MAX: u32 = 7 << 20;
/// Default per-file capacity when the caller does not configure one: 5 MiB.
pub const DEFAULT_CAPACITY: u32 = 5 << 20;

/// A decoded footer: the last `FOOTER_LEN` bytes of a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Per-volume salt. Zero for unencrypted volumes.
    pub salt: [u8; SALT_LEN],
    /// Total file size in bytes (payload region + footer).
    pub capacity: u32,
    /// High-water mark of the payload region at the moment this footer was read.
    pub used: u32,
}

impl Footer {
    /// Maximum payload bytes a file of this footer's `capacity` can hold.
    #[must_use]
    pub const fn max_payload(capacity: u32) -> u32 {
        capacity - FOOTER_LEN as u32
    }

    /// Validate that capacity falls in the allowed range and is 4-byte
    /// aligned.
    pub fn validate_capacity(capacity: u32) -> Result<(), FormatError> {
        // Capacity must be 4-byte aligned: the mapping layer places an
        // `AtomicU32` at `base + capacity - 4`, and mmap's base is always
        // page-aligned, so only a multiple of 4 keeps that word aligned.
        if (CAPACITY_MIN..=CAPACITY_MAX).contains(&capacity) && capacity % 4 == 0 {
            Ok(())
        } else {
            Err(FormatError::InvalidCapacity(capacity))
        }
    }

    /// Encode the footer's 28 bytes as `salt || magic || capacity(LE) ||
    /// used(LE)`.
    #[must_use]
    pub fn encode(&self) -> [u8; FOOTER_LEN] {
        let mut buf = [0u8; FOOTER_LEN];
        buf[0..SALT_LEN].copy_from_slice(&self.salt);
        buf[SALT_LEN..SALT_LEN + 4].copy_from_slice(&MAGIC);
        buf[SALT_LEN + 4..SALT_LEN + 8].copy_from_slice(&self.capacity.to_le_bytes());
        buf[SALT_LEN + 8..SALT_LEN + 12].copy_from_slice(&self.used.to_le_bytes());
        buf
    }

    /// Decode and validate a footer from the trailing `FOOTER_LEN` bytes of
    /// a file of size `file_size`: checks that the magic matches, the
    /// encoded capacity matches the file's actual size, and
    /// `used <= capacity - FOOTER_LEN`.
    pub fn decode(bytes: &[u8; FOOTER_LEN], file_size: u64) -> Result<Self, String> {
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[0..SALT_LEN]);
        let magic = &bytes[SALT_LEN..SALT_LEN + 4];
        if magic != MAGIC {
            return Err(format!("bad magic {magic:02x?}, expected {MAGIC:02x?}"));
        }
        let capacity = u32::from_le_bytes(bytes[SALT_LEN + 4..SALT_LEN + 8].try_into().unwrap());
        let used = u32::from_le_bytes(bytes[SALT_LEN + 8..SALT_LEN + 12].try_into().unwrap());
        if u64::from(capacity) != file_size {
            return Err(format!("capacity {capacity} does not match file size {file_size}"));
        }
        if used > Self::max_payload(capacity) {
            return Err(format!(
                "used {used} exceeds max payload {}",
                Self::max_payload(capacity)
            ));
        }
        Ok(Footer { salt, capacity, used })
    }
}

/// Atomically create a new log file at `path` with the given `capacity`,
/// extend it to full size, and write its footer (salt + magic + capacity +
/// `used = 0`). Rolls back (unlinks) the file on any failure.
pub fn create(path: &Path, capacity: u32, salt: [u8; SALT_LEN]) -> Result<File, FormatError> {
    Footer::validate_capacity(capacity)?;

    let file = OpenOptions::new()
        .write(true)
        .read(true)
        .create_new(true)
        .open(path)
        .map_err(|source| FormatError::FileCreate {
            path: path.to_path_buf(),
            source,
        })?;

    if let Err(source) = file.set_len(u64::from(capacity)) {
        let _ = fs::remove_file(path);
        return Err(FormatError::FileExtend {
            path: path.to_path_buf(),
            capacity,
            source,
        });
    }

    let footer = Footer {
        salt,
        capacity,
        used: 0,
    };
    let encoded = footer.encode();
    let result = (|| -> std::io::Result<()> {
        let mut file = &file;
        std::io::Seek::seek(
            &mut file,
            std::io::SeekFrom::Start(u64::from(capacity) - FOOTER_LEN as u64),
        )?;
        file.write_all(&encoded)?;
        file.sync_all()
    })();

    if let Err(source) = result {
        let _ = fs::remove_file(path);
        return Err(FormatError::FileCreate {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!(path = %path.display(), capacity, "created log file");
    Ok(file)
}

/// Open an existing log file and validate its footer.
///
/// Returns the open file handle (ready to be mapped) and the decoded
/// footer. Errors: `FormatError::FileOpen` for anything that fails footer
/// validation.
pub fn open_existing(path: &Path) -> Result<(File, Footer), FormatError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| FormatError::FileOpen {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })?;

    let metadata = file.metadata().map_err(|source| FormatError::FileOpen {
        path: path.to_path_buf(),
        reason: source.to_string(),
    })?;
    let size = metadata.len();
    if size < FOOTER_LEN as u64 {
        return Err(FormatError::FileOpen {
            path: path.to_path_buf(),
            reason: format!("file too small ({size} bytes) to contain a footer"),
        });
    }

    let mut tail = [0u8; FOOTER_LEN];
    {
        let mut file_ref = &file;
        std::io::Seek::seek(
            &mut file_ref,
            std::io::SeekFrom::Start(size - FOOTER_LEN as u64),
        )
        .map_err(|source| FormatError::FileOpen {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })?;
        std::io::Read::read_exact(&mut file_ref, &mut tail).map_err(|source| {
            FormatError::FileOpen {
                path: path.to_path_buf(),
                reason: source.to_string(),
            }
        })?;
    }

    let footer = Footer::decode(&tail, size).map_err(|reason| FormatError::FileOpen {
        path: path.to_path_buf(),
        reason,
    })?;

    Ok((file, footer))
}
