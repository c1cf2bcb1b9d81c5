//! The per-file state machine.
//!
//! ```text
//!            ┌── slot empty ──► move P→slot ──┐
//! hash P ────┤                                ├──► link slot→P ──ok──► restore attrs
//!            └── slot full ─► guard ─► del P ─┘        │
//!                               │                     err
//!                          collision                   ▼
//!                          (P untouched)      fission: move slot→P
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::attrs::SourceAttributes;
use crate::collision::{CollisionGuard, SlotMatch, VerifyMode};
use crate::hasher::ContentHasher;
use crate::journal::{Journal, JournalEntry};
use crate::layout::StoreLayout;
use crate::link_strategy::{get_strategy, is_same_inode};
use crate::monitor::OperationMonitor;
use crate::stats::OperationStats;
use crate::{IoResultExt, Result, StoreError};

/// Terminal state of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// First of its content: moved into the slot and linked back
    LeaderInstalled,
    /// Replaced by a hardlink to the slot
    Linked,
    /// The slot could not take another link; its data moved to this path
    Fissioned,
    /// Same fingerprint, different content; left in place
    CollisionSkipped,
    /// Already shares the slot's inode
    AlreadyLinked,
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileOutcome::LeaderInstalled => "leader installed",
            FileOutcome::Linked => "linked",
            FileOutcome::Fissioned => "fissioned",
            FileOutcome::CollisionSkipped => "collision skipped",
            FileOutcome::AlreadyLinked => "already linked",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub verify: VerifyMode,
    pub dry_run: bool,
    /// Artificial hardlink ceiling; `None` leaves it to the filesystem
    pub max_links: Option<u64>,
}

/// Where a slot's bytes can be read from right now
#[derive(Debug, Clone)]
struct Resident {
    size: u64,
    data_path: PathBuf,
}

/// What a real run would have put on disk by now.
///
/// In dry-run nothing moves, so filled slots point at the leader's
/// untouched tree path.
#[derive(Debug, Default)]
struct DryRunOverlay {
    slots: HashMap<PathBuf, Resident>,
    dirs: HashSet<PathBuf>,
}

/// Deduplicates files into a content-addressed store.
///
/// Every transition takes `&mut self`, so one engine never runs two at
/// once. A parallel driver must give each worker its own fingerprint range
/// or route all files through a single engine.
pub struct LinkStore {
    layout: StoreLayout,
    guard: CollisionGuard,
    hasher: ContentHasher,
    monitor: OperationMonitor,
    journal: Journal,
    overlay: Option<DryRunOverlay>,
}

impl LinkStore {
    /// Open a store at `root` and replay any interrupted transition.
    pub fn open<P: AsRef<Path>>(root: P, options: StoreOptions) -> Result<Self> {
        let monitor = OperationMonitor::new(options.dry_run, get_strategy(options.max_links));
        Self::with_monitor(root, options.verify, monitor)
    }

    /// Like [`open`](Self::open) with a caller-built monitor (progress
    /// sink, custom link strategy).
    pub fn with_monitor<P: AsRef<Path>>(
        root: P,
        verify: VerifyMode,
        monitor: OperationMonitor,
    ) -> Result<Self> {
        let layout = StoreLayout::new(root);
        let dry_run = monitor.is_dry_run();
        let journal = Journal::new(layout.journal_path(), !dry_run);
        let mut store = Self {
            layout,
            guard: CollisionGuard::new(verify),
            hasher: ContentHasher::new(),
            monitor,
            journal,
            overlay: dry_run.then(DryRunOverlay::default),
        };
        store.recover()?;
        tracing::debug!(
            root = %store.layout.root().display(),
            strategy = store.monitor.strategy_name(),
            verify = ?store.guard.mode(),
            dry_run,
            "store opened"
        );
        Ok(store)
    }

    /// Interrupted transition recorded under `root`, without opening the store.
    pub fn pending(root: &Path) -> Result<Option<JournalEntry>> {
        Journal::new(StoreLayout::new(root).journal_path(), false).pending()
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn monitor(&self) -> &OperationMonitor {
        &self.monitor
    }

    pub fn stats(&self) -> &OperationStats {
        self.monitor.stats()
    }

    pub fn enter_directory(&mut self, path: &Path) {
        self.monitor.process_directory(path);
    }

    pub fn skip_directory(&mut self, path: &Path, reason: &str) {
        self.monitor.skip_directory(path, reason);
    }

    pub fn skip_file(&mut self, path: &Path, reason: &str) {
        self.monitor.skip_file(path, reason);
    }

    /// Per-file entry point for a tree walker.
    ///
    /// Errors are recorded and logged here and never stop the pass. An
    /// interrupted transition is replayed before returning.
    pub fn process(&mut self, path: &Path, depth: usize) -> Option<FileOutcome> {
        match self.process_file(path, depth) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.monitor.error(path, &err);
                if let Err(recover_err) = self.recover() {
                    let journal = self.journal.path().to_path_buf();
                    self.monitor.error(&journal, &recover_err);
                }
                None
            }
        }
    }

    /// Run one file through the state machine.
    pub fn process_file(&mut self, path: &Path, depth: usize) -> Result<FileOutcome> {
        self.monitor.process_file(path);
        let attrs = SourceAttributes::capture(path)?;
        let fingerprint = self.hasher.fingerprint(path, attrs.len, &mut self.monitor)?;
        let slot = self.layout.slot_path(&fingerprint);
        tracing::trace!(path = %path.display(), depth, %fingerprint, "fingerprint");

        let outcome = match self.resident(&slot)? {
            None => self.install_leader(path, &slot, &attrs)?,
            Some(resident) => self.link_duplicate(path, &slot, resident, &attrs)?,
        };
        tracing::debug!(path = %path.display(), %outcome, "done");
        Ok(outcome)
    }

    /// Slot empty: `path` becomes the cluster leader.
    fn install_leader(
        &mut self,
        path: &Path,
        slot: &Path,
        attrs: &SourceAttributes,
    ) -> Result<FileOutcome> {
        self.ensure_parent(slot)?;
        self.journal.begin(&JournalEntry {
            source: path.to_path_buf(),
            slot: slot.to_path_buf(),
        })?;

        self.monitor.move_file(path, slot, attrs.len)?;
        self.monitor.make_writable(slot)?;
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.slots.insert(
                slot.to_path_buf(),
                Resident {
                    size: attrs.len,
                    data_path: path.to_path_buf(),
                },
            );
        }

        let linked = self.link_or_fission(slot, path, attrs.len)?;
        self.journal.commit()?;
        let _ = self.monitor.restore_attributes(path, attrs);

        Ok(if linked {
            FileOutcome::LeaderInstalled
        } else {
            FileOutcome::Fissioned
        })
    }

    /// Slot occupied: replace `path` with a link unless the guard objects.
    fn link_duplicate(
        &mut self,
        path: &Path,
        slot: &Path,
        resident: Resident,
        attrs: &SourceAttributes,
    ) -> Result<FileOutcome> {
        if is_same_inode(path, &resident.data_path).at("stat", path)? {
            self.monitor.skip_file(path, "already linked");
            return Ok(FileOutcome::AlreadyLinked);
        }

        let verdict = self
            .guard
            .verify(path, attrs.len, &resident.data_path, resident.size)?;
        if verdict == SlotMatch::Collision {
            self.monitor.hash_collision(path, slot);
            return Ok(FileOutcome::CollisionSkipped);
        }

        self.journal.begin(&JournalEntry {
            source: path.to_path_buf(),
            slot: slot.to_path_buf(),
        })?;
        self.monitor.make_writable(path)?;
        self.monitor.delete_file(path)?;

        let linked = self.link_or_fission(slot, path, attrs.len)?;
        self.journal.commit()?;
        let _ = self.monitor.restore_attributes(path, attrs);

        Ok(if linked {
            FileOutcome::Linked
        } else {
            FileOutcome::Fissioned
        })
    }

    /// Link `slot` to `path`; on failure seal the cluster by moving the
    /// slot's data to `path`. Returns whether a link was made.
    fn link_or_fission(&mut self, slot: &Path, path: &Path, size: u64) -> Result<bool> {
        match self.monitor.link_file(slot, path, size) {
            Ok(()) => Ok(true),
            Err(err) => {
                match &err {
                    StoreError::LinkLimitExceeded { .. } => {
                        tracing::debug!(slot = %slot.display(), "cluster full, fission");
                    }
                    other => {
                        tracing::warn!(slot = %slot.display(), error = %other, "link failed, fission");
                    }
                }
                self.monitor.move_file(slot, path, size)?;
                if let Some(overlay) = self.overlay.as_mut() {
                    overlay.slots.remove(slot);
                }
                Ok(false)
            }
        }
    }

    fn resident(&self, slot: &Path) -> Result<Option<Resident>> {
        if let Some(resident) = self.overlay.as_ref().and_then(|o| o.slots.get(slot)) {
            return Ok(Some(resident.clone()));
        }
        match fs::symlink_metadata(slot) {
            Ok(meta) => Ok(Some(Resident {
                size: meta.len(),
                data_path: slot.to_path_buf(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).at("stat", slot),
        }
    }

    fn dir_exists(&self, dir: &Path) -> bool {
        dir.as_os_str().is_empty()
            || dir.is_dir()
            || self.overlay.as_ref().is_some_and(|o| o.dirs.contains(dir))
    }

    /// Create every missing ancestor of `slot`, one counted level at a time.
    fn ensure_parent(&mut self, slot: &Path) -> Result<()> {
        let mut missing = Vec::new();
        let mut cur = slot.parent();
        while let Some(dir) = cur {
            if self.dir_exists(dir) {
                break;
            }
            missing.push(dir.to_path_buf());
            cur = dir.parent();
        }
        for dir in missing.into_iter().rev() {
            self.monitor.create_directory(&dir)?;
            if let Some(overlay) = self.overlay.as_mut() {
                overlay.dirs.insert(dir);
            }
        }
        Ok(())
    }

    /// Finish a transition an earlier run left half done.
    ///
    /// If the journaled source path is gone while its slot holds data, the
    /// source is re-created from the slot (link, else copy). Returns the
    /// entry that was found. In dry-run the entry is only reported.
    pub fn recover(&mut self) -> Result<Option<JournalEntry>> {
        let Some(entry) = self.journal.pending()? else {
            return Ok(None);
        };
        if self.monitor.is_dry_run() {
            tracing::warn!(
                source = %entry.source.display(),
                "interrupted transition pending; run without --dry-run to recover"
            );
            return Ok(Some(entry));
        }

        if fs::symlink_metadata(&entry.source).is_err() {
            match fs::symlink_metadata(&entry.slot) {
                Ok(meta) => {
                    let size = meta.len();
                    if let Err(err) = self.monitor.link_file(&entry.slot, &entry.source, size) {
                        tracing::warn!(error = %err, "relink failed, copying");
                        self.monitor.copy_file(&entry.slot, &entry.source, size)?;
                    }
                    tracing::info!(source = %entry.source.display(), "restored interrupted file");
                }
                Err(_) => {
                    tracing::error!(
                        source = %entry.source.display(),
                        slot = %entry.slot.display(),
                        "interrupted transition lost both source and slot"
                    );
                }
            }
        }
        self.journal.commit()?;
        Ok(Some(entry))
    }

    /// Final progress render; hands back the counters.
    pub fn finish(mut self) -> OperationStats {
        self.monitor.finish_progress();
        self.monitor.into_stats()
    }
}
