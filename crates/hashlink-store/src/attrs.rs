//! Source attribute capture and best-effort restore.

use std::fs::{self, Permissions};
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use thiserror::Error;

use crate::{IoResultExt, Result};

/// Metadata could not be put back on a path. Logged, never propagated.
#[derive(Error, Debug)]
#[error("failed to restore {what} on {}: {source}", .path.display())]
pub struct MetadataRestoreFailure {
    pub path: PathBuf,
    pub what: &'static str,
    #[source]
    pub source: io::Error,
}

/// What a source file looked like before it was touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttributes {
    pub len: u64,
    pub mtime: FileTime,
    pub permissions: Permissions,
}

impl SourceAttributes {
    pub fn capture(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path).at("stat", path)?;
        Ok(Self {
            len: meta.len(),
            mtime: FileTime::from_last_modification_time(&meta),
            permissions: meta.permissions(),
        })
    }

    /// Put the captured mtime and permission flags back on `path`.
    ///
    /// Permissions go last so a read-only source does not block the mtime
    /// update.
    pub fn restore(&self, path: &Path) -> std::result::Result<(), MetadataRestoreFailure> {
        filetime::set_file_mtime(path, self.mtime).map_err(|source| MetadataRestoreFailure {
            path: path.to_path_buf(),
            what: "modification time",
            source,
        })?;
        fs::set_permissions(path, self.permissions.clone()).map_err(|source| {
            MetadataRestoreFailure {
                path: path.to_path_buf(),
                what: "permissions",
                source,
            }
        })
    }
}

/// Clear flags that would block rename, unlink or later metadata edits.
pub fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::symlink_metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        if mode & 0o600 == 0o600 {
            return Ok(());
        }
        perms.set_mode(mode | 0o600);
    }
    #[cfg(not(unix))]
    {
        if !perms.readonly() {
            return Ok(());
        }
        perms.set_readonly(false);
    }
    fs::set_permissions(path, perms)
}
