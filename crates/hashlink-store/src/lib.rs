//! # hashlink-store
//!
//! Hardlink deduplication engine for a directory tree.
//!
//! Every file is fingerprinted with BLAKE3 and mapped to a slot in a
//! content-addressed store. The first file with a given fingerprint is moved
//! into the slot and linked back; every later duplicate is replaced by a
//! hardlink to the slot. When the filesystem refuses another link the slot's
//! data is moved out to the path being processed ("fission") and the next
//! duplicate starts a fresh cluster.
//!
//! ## Directory Layout
//!
//! ```text
//! <store>/
//! ├── .hashlink-journal.json         # pending transition, if any
//! └── blake3/
//!     └── ab/
//!         └── cd/
//!             └── ef0123...          # remaining 60 hex chars of the digest
//! ```
//!
//! ## Threading
//!
//! [`LinkStore`] takes `&mut self` for every transition. A parallel driver
//! must shard files by fingerprint across engines with disjoint stores, or
//! funnel all transitions through one engine.

mod attrs;
pub mod collision;
mod engine;
pub mod hasher;
pub mod inventory;
mod journal;
pub mod layout;
pub mod link_strategy;
pub mod monitor;
pub mod stats;

pub use attrs::{MetadataRestoreFailure, SourceAttributes};
pub use collision::{CollisionGuard, SlotMatch, VerifyMode};
pub use engine::{FileOutcome, LinkStore, StoreOptions};
pub use hasher::ContentHasher;
pub use inventory::StoreInventory;
pub use journal::JournalEntry;
pub use layout::StoreLayout;
pub use link_strategy::{get_strategy, CappedLinkStrategy, HardLinkStrategy, LinkStrategy};
pub use monitor::{OperationMonitor, ProgressSink, ProgressSnapshot};
pub use stats::{format_bytes, LastActions, OperationStats};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Length of a BLAKE3 digest in bytes
pub const FINGERPRINT_LEN: usize = 32;

/// Content fingerprint: BLAKE3 digest of a file's full contents
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex representation (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Errors that can occur while deduplicating
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error during {op} of {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The filesystem's per-inode hardlink ceiling was reached
    #[error("Hardlink limit reached for {}", .slot.display())]
    LinkLimitExceeded { slot: PathBuf },

    /// Same fingerprint, different content
    #[error("Fingerprint collision between {} and {}", .slot.display(), .path.display())]
    FingerprintCollision { slot: PathBuf, path: PathBuf },

    #[error("Journal error: {0}")]
    Journal(#[from] serde_json::Error),
}

impl StoreError {
    /// Short, stable name of the error kind (for reports)
    pub fn kind_name(&self) -> &'static str {
        match self {
            StoreError::Io { .. } => "IOError",
            StoreError::LinkLimitExceeded { .. } => "LinkLimitExceeded",
            StoreError::FingerprintCollision { .. } => "FingerprintCollision",
            StoreError::Journal(_) => "JournalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Attach the operation and path to a bare `io::Error`.
pub(crate) trait IoResultExt<T> {
    fn at(self, op: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, op: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| StoreError::Io {
            op,
            path: path.to_path_buf(),
            source,
        })
    }
}
