//! Hardlink creation for store slots.
//!
//! # Design
//!
//! - **HardLinkStrategy**: plain `hard_link`, no copy fallback. A copy
//!   would silently defeat deduplication, so every failure is surfaced and
//!   the engine decides (fission).
//! - **CappedLinkStrategy**: refuses with the platform's "too many links"
//!   error once the target inode reaches a configured link count.
//!
//! # Usage
//!
//! ```ignore
//! use hashlink_store::link_strategy::get_strategy;
//!
//! let strategy = get_strategy(Some(1000));
//! strategy.link_file(slot, target)?;
//! ```

use std::fs;
use std::io;
use std::path::Path;

// ============================================================================
// LinkStrategy Trait
// ============================================================================

/// Creates a new directory entry `new_link` for the data at `existing`.
pub trait LinkStrategy: Send + Sync {
    /// Must not fall back to copying: the caller relies on a shared inode.
    fn link_file(&self, existing: &Path, new_link: &Path) -> io::Result<()>;

    /// Name of this strategy (for logging/debugging)
    fn name(&self) -> &'static str;
}

// ============================================================================
// Link Ceiling Detection
// ============================================================================

#[cfg(unix)]
const TOO_MANY_LINKS: i32 = libc::EMLINK;

/// ERROR_TOO_MANY_LINKS
#[cfg(windows)]
const TOO_MANY_LINKS: i32 = 1142;

#[cfg(not(any(unix, windows)))]
const TOO_MANY_LINKS: i32 = 31;

/// Error the platform returns when an inode cannot take another link
pub fn link_limit_error() -> io::Error {
    io::Error::from_raw_os_error(TOO_MANY_LINKS)
}

/// True if `err` is the hardlink-ceiling error
pub fn is_link_limit(err: &io::Error) -> bool {
    err.raw_os_error() == Some(TOO_MANY_LINKS)
}

/// Current hardlink count of `path` (1 where the platform doesn't expose it)
pub fn link_count(path: &Path) -> io::Result<u64> {
    let meta = fs::metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(meta.nlink())
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        Ok(1)
    }
}

/// True if both paths name the same inode. Always false where inode
/// identity is not available.
pub fn is_same_inode(a: &Path, b: &Path) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let ma = fs::symlink_metadata(a)?;
        let mb = fs::symlink_metadata(b)?;
        Ok(ma.dev() == mb.dev() && ma.ino() == mb.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = (a, b);
        Ok(false)
    }
}

// ============================================================================
// Implementations
// ============================================================================

/// `hard_link` with no fallback
pub struct HardLinkStrategy;

impl LinkStrategy for HardLinkStrategy {
    fn link_file(&self, existing: &Path, new_link: &Path) -> io::Result<()> {
        fs::hard_link(existing, new_link)
    }

    fn name(&self) -> &'static str {
        "hardlink"
    }
}

/// `hard_link` that refuses once `existing` already has `max_links` names.
///
/// Lets a store run below the filesystem's real ceiling, and lets tests
/// exercise fission with a handful of files.
pub struct CappedLinkStrategy {
    max_links: u64,
}

impl CappedLinkStrategy {
    pub fn new(max_links: u64) -> Self {
        Self { max_links }
    }
}

impl LinkStrategy for CappedLinkStrategy {
    fn link_file(&self, existing: &Path, new_link: &Path) -> io::Result<()> {
        if link_count(existing)? >= self.max_links {
            return Err(link_limit_error());
        }
        fs::hard_link(existing, new_link)
    }

    fn name(&self) -> &'static str {
        "hardlink-capped"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// Strategy for an optional artificial ceiling
pub fn get_strategy(max_links: Option<u64>) -> Box<dyn LinkStrategy> {
    match max_links {
        Some(max) => Box::new(CappedLinkStrategy::new(max)),
        None => Box::new(HardLinkStrategy),
    }
}

// ============================================================================
// Tests
// ============================================================================
