//! The mapping layer: mapping a log file read-write shared, and the raw
//! pointer arithmetic that lets the append engine derive a mapping's base
//! address and capacity from a single atomic pointer.
//!
//! This is the one crate in the workspace where `unsafe_code` is allowed,
//! because deriving `base_of`/`cap_of` from a bare tail pointer and exposing
//! the `used` word as a live `AtomicU32` both require raw pointer casts.
//! Every unsafe function here documents the precondition the caller must
//! uphold.

mod error;
mod mapping;

pub use error::SysError;
pub use mapping::{base_of, cap_of, map, unmap, used_word, MappedFile};
