//! The lock-free append engine and the per-handle lifecycle operations:
//! `open`, `write`, `flush`, `close`, `export`.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use chrono::Local;
use endlog_crypto::Key;
use endlog_format::{create, file_name, next_slot, open_existing, Footer, FOOTER_LEN};
use endlog_sys::{base_of, cap_of, map, unmap, used_word, MappedFile};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::snapshot_max_capacity;
use crate::error::LogError;

/// An open log volume. Cheap to [`Clone`]: every clone shares the same
/// underlying engine state, so any number of threads may hold a clone and
/// call [`LogHandle::write`], [`LogHandle::flush`], or [`LogHandle::export`]
/// concurrently.
#[derive(Clone)]
pub struct LogHandle {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    /// Pointer to the `used` word of the active mapping. Read lock-free on
    /// every append; written only by `rotate`.
    active_tail: AtomicPtr<u8>,
    /// Single-flight rotation lock, guarding the mapping owners themselves
    /// (the hot path never touches this: it only deals in tail pointers).
    rot: Mutex<RotationState>,
    closed: AtomicBool,
    /// Snapshotted once at `open()`; later calls to `set_max_capacity` do
    /// not affect this handle.
    cap: u32,
    /// The volume's one salt, stable across every file it ever creates.
    /// Zero for unencrypted volumes.
    salt: [u8; endlog_format::SALT_LEN],
    /// `None` for unencrypted volumes.
    key: Option<Key>,
}

struct RotationState {
    current: MappedFile,
    prior: Option<MappedFile>,
}

impl LogHandle {
    /// Open (or create) today's active log file in `dir`.
    ///
    /// If `password` is `Some`, the volume is encrypted: on reuse the
    /// existing footer's salt is read back; on a fresh file a new salt is
    /// drawn from the CSPRNG and stored in the footer. The salt never
    /// changes again for the life of the volume, even across rotation onto
    /// a new file.
    pub fn open(dir: impl AsRef<Path>, password: Option<&str>) -> Result<Self, LogError> {
        let dir = dir.as_ref();
        let metadata = fs::metadata(dir).map_err(LogError::DirAccess)?;
        if !metadata.is_dir() {
            return Err(LogError::DirAccess(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "not a directory",
            )));
        }

        let cap = snapshot_max_capacity();
        let today = Local::now().date_naive();
        let latest = endlog_format::find_latest(dir, today);

        let (file, footer) = if latest >= 0 {
            let path = dir.join(file_name(today, latest as u8));
            let (file, footer) = open_existing(&path)?;
            if footer.used < Footer::max_payload(footer.capacity) {
                (file, footer)
            } else {
                Self::create_next(dir, today, cap, password)?
            }
        } else {
            Self::create_next(dir, today, cap, password)?
        };

        let key = match password {
            Some(password) => Some(Key::derive(password, &footer.salt)),
            None => None,
        };

        let mut mapped = map(&file, footer.capacity)?;
        // The descriptor does not need to outlive the mapping.
        drop(file);
        let tail = mapped.tail_ptr();

        info!(dir = %dir.display(), capacity = footer.capacity, encrypted = key.is_some(), "opened log volume");

        Ok(LogHandle {
            inner: Arc::new(Inner {
                dir: dir.to_path_buf(),
                active_tail: AtomicPtr::new(tail),
                rot: Mutex::new(RotationState {
                    current: mapped,
                    prior: None,
                }),
                closed: AtomicBool::new(false),
                cap: footer.capacity,
                salt: footer.salt,
                key,
            }),
        })
    }

    fn create_next(
        dir: &Path,
        today: chrono::NaiveDate,
        cap: u32,
        password: Option<&str>,
    ) -> Result<(std::fs::File, Footer), LogError> {
        let slot = next_slot(dir, today)?;
        let salt = match password {
            Some(_) => endlog_crypto::random_salt()?,
            None => [0u8; endlog_format::SALT_LEN],
        };
        let path = dir.join(file_name(today, slot));
        let file = create(&path, cap, salt)?;
        Ok((
            file,
            Footer {
                salt,
                capacity: cap,
                used: 0,
            },
        ))
    }

    /// Append `bytes` as one record.
    ///
    /// Lock-free on the fast path: a writer reserves `[off, off+len)` with a
    /// single compare-and-swap on the active mapping's `used` word, copies
    /// `bytes` into the reservation, and (if the volume is encrypted) XORs
    /// the reserved range with the keystream for its absolute file offset.
    pub fn write(&self, bytes: &[u8]) -> Result<(), LogError> {
        if bytes.is_empty() {
            return Err(LogError::InvalidParam);
        }
        let len = u32::try_from(bytes.len()).map_err(|_| LogError::FileSizeExceed {
            len: u32::MAX,
            max: self.inner.cap,
        })?;

        if self.inner.closed.load(Ordering::Acquire) {
            return Err(LogError::HandleClosed);
        }

        'retry: loop {
            let tail = self.inner.active_tail.load(Ordering::Acquire);
            // SAFETY: `tail` was published by `open` or `rotate` and, since
            // unmapping is deferred by exactly one generation, is still
            // live: this thread has not observed `CLOSED` yet, and a
            // mapping is only unmapped after a second rotation happens
            // after this one, which requires the `ROT` mutex this thread
            // isn't holding.
            let cap = unsafe { cap_of(tail) };
            let max_payload = cap - FOOTER_LEN as u32;
            if len > max_payload {
                return Err(LogError::FileSizeExceed { len, max: max_payload });
            }
            // SAFETY: same tail pointer, same precondition as above.
            let base = unsafe { base_of(tail, cap) };
            // SAFETY: same tail pointer; `cap` is a multiple of 4
            // (enforced by `Footer::validate_capacity`), so the `used`
            // word is properly aligned.
            let used = unsafe { used_word(tail) };

            let mut off = used.load(Ordering::Acquire);
            loop {
                if off + len > max_payload {
                    self.rotate(len)?;
                    continue 'retry;
                }
                match used.compare_exchange_weak(
                    off,
                    off + len,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        // SAFETY: this thread exclusively owns
                        // `[off, off+len)`: the CAS above succeeded, so no
                        // other writer can have reserved any byte in this
                        // range, and no reader touches payload bytes before
                        // export.
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                bytes.as_ptr(),
                                base.add(off as usize),
                                bytes.len(),
                            );
                        }
                        if let Some(key) = &self.inner.key {
                            // SAFETY: same reservation as the memcpy above;
                            // encrypting after the copy, before return,
                            // keeps "only the reserving thread touches
                            // these bytes" true for the whole operation.
                            let region = unsafe {
                                std::slice::from_raw_parts_mut(
                                    base.add(off as usize),
                                    bytes.len(),
                                )
                            };
                            endlog_crypto::process(key, u64::from(off), region);
                        }
                        return Ok(());
                    }
                    Err(actual) => off = actual,
                }
            }
        }
    }

    /// Single-flight rotation: create a new file, map it, and atomically
    /// publish it as the active mapping.
    fn rotate(&self, len: u32) -> Result<(), LogError> {
        let mut guard = self.inner.rot.lock();

        // Double-checked: another thread may have already rotated while we
        // were waiting for the lock.
        let tail = self.inner.active_tail.load(Ordering::Acquire);
        // SAFETY: see `write`'s safety comment; the same liveness argument
        // applies here.
        let cap = unsafe { cap_of(tail) };
        let max_payload = cap - FOOTER_LEN as u32;
        // SAFETY: same tail pointer.
        let used = unsafe { used_word(tail) };
        if used.load(Ordering::Acquire) + len <= max_payload {
            return Ok(());
        }

        let today = Local::now().date_naive();
        let slot = match next_slot(&self.inner.dir, today) {
            Ok(slot) => slot,
            Err(err) => {
                warn!(error = %err, "rotation failed to pick a next slot");
                return Err(LogError::FileSwitch);
            }
        };
        let path = self.inner.dir.join(file_name(today, slot));
        let file = match create(&path, self.inner.cap, self.inner.salt) {
            Ok(file) => file,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "rotation failed to create the next file");
                return Err(LogError::FileSwitch);
            }
        };
        let mut mapped = match map(&file, self.inner.cap) {
            Ok(mapped) => mapped,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "rotation failed to map the next file");
                return Err(LogError::FileSwitch);
            }
        };
        drop(file);

        let new_tail = mapped.tail_ptr();
        // Publication point: from here on, new appends snapshot the new
        // mapping's `ACTIVE` pointer.
        self.inner.active_tail.store(new_tail, Ordering::Release);

        let old_current = std::mem::replace(&mut guard.current, mapped);
        let superseded_prior = guard.prior.replace(old_current);

        if let Some(owner) = superseded_prior {
            // Safe: deferred by exactly one generation, and any writer that
            // still held this mapping's tail pointer has either finished
            // its reservation already or observed `CLOSED` first.
            unmap(owner);
        }

        info!(path = %path.display(), "rotated to a new log file");
        Ok(())
    }

    /// Request a synchronous `msync` over the active mapping.
    pub fn flush(&self) -> Result<(), LogError> {
        let guard = self.inner.rot.lock();
        guard.current.flush()?;
        Ok(())
    }

    /// Mark the handle closed, `msync` the active and prior mappings, and
    /// zero the key. Appends observed after this point are rejected with
    /// [`LogError::HandleClosed`] without touching memory.
    ///
    /// Mappings are not unmapped here: they are released when the last
    /// [`LogHandle`] clone referencing this volume is dropped. This is
    /// memory-safe by construction: `Arc`'s reference count, not caller
    /// discipline, decides when the mapping's `Drop` actually runs, so
    /// closing cannot itself race a writer into touching freed memory.
    pub fn close(&self) -> Result<(), LogError> {
        self.inner.closed.store(true, Ordering::Release);
        let guard = self.inner.rot.lock();
        guard.current.flush()?;
        if let Some(prior) = &guard.prior {
            prior.flush()?;
        }
        info!(dir = %self.inner.dir.display(), "closed log volume");
        Ok(())
    }

    /// Snapshot `[0, used)` of the active mapping into `<dir>/export.log` as
    /// a standalone, valid log file, and return its path.
    ///
    /// Writers that reserve bytes after the snapshot is taken will not
    /// appear in the export; this is by design.
    pub fn export(&self) -> Result<PathBuf, LogError> {
        let tail = self.inner.active_tail.load(Ordering::Acquire);
        // SAFETY: see `write`'s safety comment.
        let cap = unsafe { cap_of(tail) };
        let base = unsafe { base_of(tail, cap) };
        let used = unsafe { used_word(tail) }.load(Ordering::Acquire);
        // SAFETY: `[base, base+used)` is the reserved-and-written prefix of
        // the active mapping; no writer mutates already-reserved bytes, and
        // `used` is never decreased, so this range is stable to read.
        let payload = unsafe { std::slice::from_raw_parts(base, used as usize) };

        let path = self.inner.dir.join("export.log");
        let _ = fs::remove_file(&path);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| LogError::Format(endlog_format::FormatError::FileCreate {
                path: path.clone(),
                source,
            }))?;

        file.write_all(payload)
            .and_then(|()| {
                let footer = Footer {
                    salt: self.inner.salt,
                    capacity: cap,
                    used,
                };
                file.write_all(&footer.encode())
            })
            .and_then(|()| file.sync_all())
            .map_err(|source| LogError::Format(endlog_format::FormatError::FileCreate {
                path: path.clone(),
                source,
            }))?;

        debug!(path = %path.display(), used, "exported log volume snapshot");
        Ok(path)
    }
}
