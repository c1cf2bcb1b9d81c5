//! Operation monitor: the single gate for every filesystem mutation.
//!
//! Each method advances the counters and "last" pointers, performs the
//! mutation unless running dry, and emits a trace line. In dry-run every
//! mutation reports success without touching the disk, so a dry pass
//! counts exactly what a real pass would.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::attrs::{self, MetadataRestoreFailure, SourceAttributes};
use crate::link_strategy::{is_link_limit, link_count, LinkStrategy};
use crate::stats::{LastActions, OperationStats};
use crate::{IoResultExt, Result, StoreError};

/// Default minimum time between two progress refreshes
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Links slower than this are reported
const SLOW_LINK_THRESHOLD: Duration = Duration::from_secs(1);

/// View of the monitor handed to a [`ProgressSink`]
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot<'a> {
    pub elapsed: Duration,
    pub stats: &'a OperationStats,
    pub last: &'a LastActions,
    pub dry_run: bool,
}

/// Receives throttled progress updates
pub trait ProgressSink {
    fn render(&mut self, snapshot: &ProgressSnapshot<'_>);

    /// Called once after the last file
    fn finish(&mut self, snapshot: &ProgressSnapshot<'_>) {
        self.render(snapshot);
    }
}

pub struct OperationMonitor {
    stats: OperationStats,
    last: LastActions,
    dry_run: bool,
    started: Instant,
    strategy: Box<dyn LinkStrategy>,
    progress: Option<Box<dyn ProgressSink>>,
    interval: Duration,
    last_render: Option<Instant>,
}

impl OperationMonitor {
    pub fn new(dry_run: bool, strategy: Box<dyn LinkStrategy>) -> Self {
        Self {
            stats: OperationStats::default(),
            last: LastActions::default(),
            dry_run,
            started: Instant::now(),
            strategy,
            progress: None,
            interval: DEFAULT_PROGRESS_INTERVAL,
            last_render: None,
        }
    }

    /// Install a progress sink refreshed at most once per `interval`.
    pub fn with_progress(mut self, sink: Box<dyn ProgressSink>, interval: Duration) -> Self {
        self.progress = Some(sink);
        self.interval = interval;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    pub fn last(&self) -> &LastActions {
        &self.last
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn into_stats(self) -> OperationStats {
        self.stats
    }

    // ------------------------------------------------------------------
    // Traversal events
    // ------------------------------------------------------------------

    pub fn process_file(&mut self, path: &Path) {
        self.stats.processed_files += 1;
        self.last.file = Some(path.to_path_buf());
        tracing::trace!(path = %path.display(), "file");
        self.refresh_progress();
    }

    pub fn process_directory(&mut self, path: &Path) {
        self.stats.processed_directories += 1;
        self.last.directory = Some(path.to_path_buf());
        tracing::trace!(path = %path.display(), "folder");
        self.refresh_progress();
    }

    pub fn skip_file(&mut self, path: &Path, reason: &str) {
        self.stats.skipped_files += 1;
        tracing::trace!(path = %path.display(), reason, "skip file");
    }

    pub fn skip_directory(&mut self, path: &Path, reason: &str) {
        self.stats.skipped_directories += 1;
        tracing::trace!(path = %path.display(), reason, "skip folder");
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Record a hash. Hashing only reads, so it runs in dry-run too.
    pub fn hash_file(&mut self, path: &Path, size: u64) {
        self.stats.hashed_files += 1;
        self.stats.hashed_bytes += size;
        tracing::debug!(path = %path.display(), size, "hash");
    }

    pub fn move_file(&mut self, from: &Path, to: &Path, size: u64) -> Result<()> {
        if !self.dry_run {
            fs::rename(from, to).at("move", from)?;
        }
        self.stats.moved_files += 1;
        self.stats.moved_bytes += size;
        tracing::debug!(from = %from.display(), to = %to.display(), "move");
        Ok(())
    }

    /// Link `new_link` to the data at `existing`.
    ///
    /// The hardlink ceiling comes back as [`StoreError::LinkLimitExceeded`].
    pub fn link_file(&mut self, existing: &Path, new_link: &Path, size: u64) -> Result<()> {
        if !self.dry_run {
            let start = Instant::now();
            self.strategy
                .link_file(existing, new_link)
                .map_err(|source| {
                    if is_link_limit(&source) {
                        StoreError::LinkLimitExceeded {
                            slot: existing.to_path_buf(),
                        }
                    } else {
                        StoreError::Io {
                            op: "link",
                            path: new_link.to_path_buf(),
                            source,
                        }
                    }
                })?;
            let took = start.elapsed();
            if took >= SLOW_LINK_THRESHOLD {
                let links = link_count(existing).unwrap_or(0);
                let took_ms = took.as_millis() as u64;
                tracing::warn!(path = %new_link.display(), links, took_ms, "slow link");
            }
        }
        self.stats.linked_files += 1;
        self.stats.linked_bytes += size;
        self.last.link = Some(new_link.to_path_buf());
        tracing::debug!(from = %existing.display(), to = %new_link.display(), "link");
        Ok(())
    }

    pub fn copy_file(&mut self, from: &Path, to: &Path, size: u64) -> Result<()> {
        if !self.dry_run {
            fs::copy(from, to).at("copy", from)?;
        }
        self.stats.copied_files += 1;
        self.stats.copied_bytes += size;
        self.last.copy = Some(to.to_path_buf());
        tracing::debug!(from = %from.display(), to = %to.display(), "copy");
        Ok(())
    }

    pub fn delete_file(&mut self, path: &Path) -> Result<()> {
        if !self.dry_run {
            fs::remove_file(path).at("delete", path)?;
        }
        self.stats.deleted_files += 1;
        tracing::trace!(path = %path.display(), "delete");
        Ok(())
    }

    /// Create one directory level. A directory that appeared in the
    /// meantime is accepted but not counted.
    pub fn create_directory(&mut self, path: &Path) -> Result<()> {
        if !self.dry_run {
            match fs::create_dir(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
                    return Ok(())
                }
                Err(e) => return Err(e).at("create directory", path),
            }
        }
        self.stats.created_directories += 1;
        tracing::trace!(path = %path.display(), "create folder");
        Ok(())
    }

    pub fn make_writable(&mut self, path: &Path) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        attrs::make_writable(path).at("normalize attributes", path)
    }

    /// Best-effort metadata restore. The failure is logged here and handed
    /// back for inspection; callers never propagate it.
    pub fn restore_attributes(
        &mut self,
        path: &Path,
        attrs: &SourceAttributes,
    ) -> std::result::Result<(), MetadataRestoreFailure> {
        if self.dry_run {
            return Ok(());
        }
        attrs.restore(path).inspect_err(|failure| {
            tracing::warn!(error = %failure, "metadata not restored");
        })
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    pub fn hash_collision(&mut self, path: &Path, slot: &Path) {
        self.stats.collisions += 1;
        self.last.error = Some(format!("collision: {}", path.display()));
        tracing::error!(
            path = %path.display(),
            slot = %slot.display(),
            "fingerprint collision, file left in place"
        );
    }

    pub fn error(&mut self, path: &Path, err: &StoreError) {
        self.stats.errors += 1;
        self.last.error = Some(format!("{}: {}", path.display(), err));
        tracing::error!(path = %path.display(), kind = err.kind_name(), error = %err, "failed");
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    /// Redraw the progress sink if the refresh interval has passed.
    pub fn refresh_progress(&mut self) {
        let Some(sink) = self.progress.as_mut() else {
            return;
        };
        let now = Instant::now();
        if let Some(prev) = self.last_render {
            if now.duration_since(prev) < self.interval {
                return;
            }
        }
        self.last_render = Some(now);
        let snapshot = ProgressSnapshot {
            elapsed: self.started.elapsed(),
            stats: &self.stats,
            last: &self.last,
            dry_run: self.dry_run,
        };
        sink.render(&snapshot);
    }

    /// Final unthrottled render.
    pub fn finish_progress(&mut self) {
        if let Some(sink) = self.progress.as_mut() {
            let snapshot = ProgressSnapshot {
                elapsed: self.started.elapsed(),
                stats: &self.stats,
                last: &self.last,
                dry_run: self.dry_run,
            };
            sink.finish(&snapshot);
        }
    }
}
