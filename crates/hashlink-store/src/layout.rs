//! Fingerprint → store slot mapping.
//!
//! Layout: `blake3/ab/cd/<remaining 60 hex chars>`. Two levels of two hex
//! characters bound every directory to at most 256 entries above the leaves.

use std::path::{Component, Path, PathBuf};

use crate::{Fingerprint, FINGERPRINT_LEN};

/// Top-level directory naming the digest algorithm
pub const ALGORITHM_DIR: &str = "blake3";
/// Number of nested prefix directories
pub const PREFIX_SEGMENTS: usize = 2;
/// Hex characters per prefix directory
pub const SEGMENT_WIDTH: usize = 2;
/// File name of the transition journal at the store root
pub const JOURNAL_FILE: &str = ".hashlink-journal.json";

const HEX_LEN: usize = FINGERPRINT_LEN * 2;

#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Journal file location
    pub fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    /// Store-relative slot path for a fingerprint. Pure; never fails.
    pub fn relative_path(fingerprint: &Fingerprint) -> PathBuf {
        let hex = fingerprint.to_hex();
        let mut path = PathBuf::from(ALGORITHM_DIR);
        for i in 0..PREFIX_SEGMENTS {
            path.push(&hex[i * SEGMENT_WIDTH..(i + 1) * SEGMENT_WIDTH]);
        }
        path.push(&hex[PREFIX_SEGMENTS * SEGMENT_WIDTH..]);
        path
    }

    /// Absolute slot path for a fingerprint
    pub fn slot_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(Self::relative_path(fingerprint))
    }

    /// Inverse of [`relative_path`](Self::relative_path). Returns `None` for
    /// anything that is not a well-formed slot path.
    pub fn fingerprint_from_relative(rel: &Path) -> Option<Fingerprint> {
        let mut parts = Vec::with_capacity(PREFIX_SEGMENTS + 2);
        for component in rel.components() {
            match component {
                Component::Normal(s) => parts.push(s.to_str()?),
                _ => return None,
            }
        }
        if parts.len() != PREFIX_SEGMENTS + 2 || parts[0] != ALGORITHM_DIR {
            return None;
        }
        let prefixes = &parts[1..=PREFIX_SEGMENTS];
        if prefixes.iter().any(|p| p.len() != SEGMENT_WIDTH) {
            return None;
        }
        let rest = parts[PREFIX_SEGMENTS + 1];
        if rest.len() != HEX_LEN - PREFIX_SEGMENTS * SEGMENT_WIDTH {
            return None;
        }
        let hex: String = prefixes.iter().copied().chain(std::iter::once(rest)).collect();
        Fingerprint::from_hex(&hex)
    }

    /// Like [`fingerprint_from_relative`](Self::fingerprint_from_relative) for a path under this root.
    pub fn fingerprint_of(&self, slot: &Path) -> Option<Fingerprint> {
        slot.strip_prefix(&self.root)
            .ok()
            .and_then(Self::fingerprint_from_relative)
    }
}
