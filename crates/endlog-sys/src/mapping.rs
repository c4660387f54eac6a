use std::fs::File;
use std::sync::atomic::AtomicU32;

use memmap2::MmapMut;

use crate::error::SysError;

/// An owned read-write shared mapping of one log file, plus the capacity it
/// was mapped with (so the tail pointer can be recomputed even though
/// `MmapMut` doesn't expose its length as a `u32`).
pub struct MappedFile {
    mmap: MmapMut,
    cap: u32,
}

impl MappedFile {
    /// The capacity this file was mapped with.
    #[must_use]
    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Raw pointer to the first byte of the mapping.
    pub fn base_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    /// Raw pointer to the first byte of the `used` word: the authoritative
    /// handle from which mapping base and capacity are derived. This is the
    /// only address the append engine's hot path needs to hold onto.
    pub fn tail_ptr(&mut self) -> *mut u8 {
        let cap = self.cap;
        // SAFETY: `cap >= FOOTER_LEN` is guaranteed by `Footer::validate_capacity`,
        // so `cap - 4` is in bounds of the mapping.
        unsafe { self.mmap.as_mut_ptr().add(cap as usize - 4) }
    }

    /// Request a synchronous `msync` over the whole mapping.
    pub fn flush(&self) -> Result<(), SysError> {
        self.mmap.flush().map_err(SysError::Msync)
    }

    /// Request an asynchronous `msync` over the whole mapping.
    pub fn flush_async(&self) -> Result<(), SysError> {
        self.mmap.flush_async().map_err(SysError::Msync)
    }
}

/// Map `file` read-write shared over its whole `cap`-byte size.
///
/// The file descriptor backing `file` does not need to outlive the returned
/// mapping: mappings outlive the descriptor that produced them, and the
/// caller may close `file` immediately after this returns.
pub fn map(file: &File, cap: u32) -> Result<MappedFile, SysError> {
    let mmap = unsafe { MmapMut::map_mut(file) }.map_err(SysError::Mmap)?;
    Ok(MappedFile { mmap, cap })
}

/// Read the 4-byte `capacity` field that immediately precedes the `used`
/// word at `tail` and return it.
///
/// This reverse derivation lets a writer that only atomically loaded `tail`
/// recover the file's capacity, because `capacity` is immutable for the
/// file's lifetime and always sits at `tail - 4`.
///
/// # Safety
///
/// `tail` must be a live tail pointer previously returned by
/// [`MappedFile::tail_ptr`] for a mapping that is still mapped (i.e. has not
/// passed through [`unmap`]).
pub unsafe fn cap_of(tail: *mut u8) -> u32 {
    let mut bytes = [0u8; 4];
    unsafe {
        std::ptr::copy_nonoverlapping(tail.sub(4), bytes.as_mut_ptr(), 4);
    }
    u32::from_le_bytes(bytes)
}

/// Derive the mapping's base address from its tail pointer and capacity:
/// `base_of(tail) == tail - cap + 4`.
///
/// # Safety
///
/// Same requirement as [`cap_of`]: `tail` must be a live tail pointer for a
/// mapping of size `cap`.
pub unsafe fn base_of(tail: *mut u8, cap: u32) -> *mut u8 {
    unsafe { tail.sub(cap as usize - 4) }
}

/// View the 4 bytes at `tail` as an `AtomicU32`, the authoritative `used`
/// counter that writers reserve byte ranges from via compare-and-swap.
///
/// # Safety
///
/// `tail` must be 4-byte aligned (guaranteed by `Footer::validate_capacity`
/// rejecting capacities that are not a multiple of 4) and point at a live
/// mapping's `used` word.
pub unsafe fn used_word<'a>(tail: *mut u8) -> &'a AtomicU32 {
    unsafe { &*(tail.cast::<AtomicU32>()) }
}

/// Drop `mapped`, unmapping its memory.
///
/// Exists only to give the deferred-unmap call site in the rotation
/// protocol a name to call instead of relying on an implicit `Drop`, so the
/// "this is the unmap point" intent stays visible in the engine's rotation
/// code.
pub fn unmap(mapped: MappedFile) {
    drop(mapped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use endlog_format::{create, SALT_LEN};
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    #[test]
    fn tail_ptr_derives_consistent_cap_and_base() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t-0.log");
        let cap = 1 << 20;
        let file = create(&path, cap, [0u8; SALT_LEN]).unwrap();
        let mut mapped = map(&file, cap).unwrap();

        let base = mapped.base_ptr();
        let tail = mapped.tail_ptr();

        unsafe {
            assert_eq!(cap_of(tail), cap);
            assert_eq!(base_of(tail, cap), base);

            let used = used_word(tail);
            assert_eq!(used.load(Ordering::Acquire), 0);
            used.store(42, Ordering::Release);
            assert_eq!(used.load(Ordering::Acquire), 42);
        }
    }
}
