//! Single-entry transition journal.
//!
//! Written before a file's first mutation, removed once its link or fission
//! is done. A leftover entry means the previous run stopped mid-transition.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{IoResultExt, Result};

/// The transition in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Tree path being deduplicated
    pub source: PathBuf,
    /// Slot it maps to
    pub slot: PathBuf,
}

#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    enabled: bool,
}

impl Journal {
    pub(crate) fn new(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `entry` atomically (temp file + rename).
    pub(crate) fn begin(&self, entry: &JournalEntry) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let json = serde_json::to_vec(entry)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).at("write journal", &tmp)?;
        fs::rename(&tmp, &self.path).at("write journal", &self.path)
    }

    pub(crate) fn commit(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).at("clear journal", &self.path),
        }
    }

    /// Entry left behind by an interrupted run. Readable in dry-run too.
    pub(crate) fn pending(&self) -> Result<Option<JournalEntry>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).at("read journal", &self.path),
        }
    }
}
