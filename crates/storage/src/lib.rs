//! # testing-secrets storage
//!
//! String-keyed, byte-valued storage used by the testing-secrets backend.
//!
//! The backend never assumes more than per-key atomicity for a single
//! [`Storage::get`] or [`Storage::put`]; a get followed by a put is not
//! transactional and concurrent writers race (last put wins).
//!
//! ## Backends
//!
//! - [`MemoryStorage`]: shared in-memory map, used by tests and the dev host
//! - [`FileStorage`]: single JSON snapshot on disk, used by the CLI host
//! - `FaultyStorage` (feature `test-util`): fault-injection wrapper
//!
//! ## Typed access
//!
//! [`get_json`] and [`put_json`] (de)serialize records with `serde_json`.
#![forbid(unsafe_code)]

mod error;
#[cfg(any(test, feature = "test-util"))]
mod faulty;
mod file;
mod memory;
mod storage;

pub use error::{StorageError, StorageResult};
#[cfg(any(test, feature = "test-util"))]
pub use faulty::{FaultyStorage, Op};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use storage::{Storage, StorageEntry, get_json, put_json};
