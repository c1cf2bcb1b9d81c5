//! Read-only store inspection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::layout::StoreLayout;
use crate::link_strategy::link_count;
use crate::{IoResultExt, Result, StoreError};

/// Summary of what a store holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreInventory {
    /// Occupied slots
    pub slot_count: u64,
    /// Bytes physically held by the slots
    pub total_bytes: u64,
    /// Bytes the tree would need again without deduplication
    pub reclaimed_bytes: u64,
    /// Link count → number of slots with that count
    pub link_histogram: BTreeMap<u64, u64>,
    /// Files under the store that are not well-formed slots
    pub stray_files: Vec<PathBuf>,
    /// An interrupted transition is waiting for `recover`
    pub pending_journal: bool,
}

impl StoreInventory {
    /// Walk the store at `root`. A missing store is empty.
    pub fn scan(root: &Path) -> Result<Self> {
        let layout = StoreLayout::new(root);
        let journal = layout.journal_path();
        let mut inv = StoreInventory {
            pending_journal: journal.is_file(),
            ..Default::default()
        };
        if !root.exists() {
            return Ok(inv);
        }

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                StoreError::Io {
                    op: "scan",
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path() == journal {
                continue;
            }
            if layout.fingerprint_of(entry.path()).is_none() {
                inv.stray_files.push(entry.path().to_path_buf());
                continue;
            }

            let size = entry.metadata().map_err(std::io::Error::from).at("stat", entry.path())?.len();
            let links = link_count(entry.path()).at("stat", entry.path())?;
            inv.slot_count += 1;
            inv.total_bytes += size;
            // One name is the slot itself, one replaces the original copy.
            inv.reclaimed_bytes += size * links.saturating_sub(2);
            *inv.link_histogram.entry(links).or_insert(0) += 1;
        }
        Ok(inv)
    }
}
