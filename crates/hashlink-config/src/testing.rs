//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary tree root to be shrunk
//! - Its default sibling store root (`<tree>/../hash`, not created up front)
//! - File fixtures with controlled timestamps
//! - Whole-directory snapshots to prove a pass left the disk untouched
//!
//! # Usage
//!
//! ```ignore
//! use hashlink_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new().unwrap();
//! let a = env.create_file("a.txt", b"same").unwrap();
//! let before = env.snapshot().unwrap();
//! // ... dry-run pass ...
//! assert_eq!(before, env.snapshot().unwrap());
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use filetime::FileTime;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated tree + store pair
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Parent of both tree and store
    pub root: PathBuf,
    /// Directory tree to deduplicate
    pub tree_root: PathBuf,
    /// Store location (default sibling of the tree)
    pub store_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

/// Observable state of one directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySnapshot {
    Dir,
    File {
        content: Vec<u8>,
        mtime: FileTime,
        readonly: bool,
        mode: u32,
    },
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;

        let tree_root = root.join("tree");
        let store_root = crate::path::default_store_root(&tree_root);
        std::fs::create_dir_all(&tree_root)?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            tree_root,
            store_root,
            test_id,
        })
    }

    /// Create a test file with content under the tree root
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.tree_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a test file and pin its modification time (seconds since epoch)
    pub fn create_file_with_mtime(
        &self,
        relative_path: &str,
        content: &[u8],
        unix_secs: i64,
    ) -> anyhow::Result<PathBuf> {
        let path = self.create_file(relative_path, content)?;
        let ft = FileTime::from_unix_time(unix_secs, 0);
        filetime::set_file_mtime(&path, ft)?;
        Ok(path)
    }

    /// Create a test directory under the tree root
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.tree_root.join(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Snapshot everything below the environment root (tree and store)
    pub fn snapshot(&self) -> anyhow::Result<BTreeMap<PathBuf, EntrySnapshot>> {
        snapshot_dir(&self.root)
    }
}

/// Snapshot a directory: relative path → contents, mtime and permission bits
pub fn snapshot_dir(root: &Path) -> anyhow::Result<BTreeMap<PathBuf, EntrySnapshot>> {
    let mut entries = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(root)?.to_path_buf();
        let meta = entry.metadata()?;
        let snap = if meta.is_dir() {
            EntrySnapshot::Dir
        } else {
            EntrySnapshot::File {
                content: std::fs::read(entry.path())?,
                mtime: FileTime::from_last_modification_time(&meta),
                readonly: meta.permissions().readonly(),
                mode: permission_bits(&meta),
            }
        };
        entries.insert(rel, snap);
    }
    Ok(entries)
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &std::fs::Metadata) -> u32 {
    0
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
