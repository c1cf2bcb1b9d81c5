//! Run counters and "last touched" pointers.

use std::path::PathBuf;

use serde::Serialize;

/// Counters for one engine run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationStats {
    pub processed_files: u64,
    pub processed_directories: u64,
    pub skipped_files: u64,
    pub skipped_directories: u64,
    pub copied_files: u64,
    pub copied_bytes: u64,
    pub moved_files: u64,
    pub moved_bytes: u64,
    pub linked_files: u64,
    pub linked_bytes: u64,
    pub hashed_files: u64,
    pub hashed_bytes: u64,
    pub deleted_files: u64,
    pub created_directories: u64,
    pub collisions: u64,
    pub errors: u64,
}

impl OperationStats {
    /// Every counter with its name, in report order
    pub fn entries(&self) -> [(&'static str, u64); 16] {
        [
            ("processed_files", self.processed_files),
            ("processed_directories", self.processed_directories),
            ("skipped_files", self.skipped_files),
            ("skipped_directories", self.skipped_directories),
            ("copied_files", self.copied_files),
            ("copied_bytes", self.copied_bytes),
            ("moved_files", self.moved_files),
            ("moved_bytes", self.moved_bytes),
            ("linked_files", self.linked_files),
            ("linked_bytes", self.linked_bytes),
            ("hashed_files", self.hashed_files),
            ("hashed_bytes", self.hashed_bytes),
            ("deleted_files", self.deleted_files),
            ("created_directories", self.created_directories),
            ("collisions", self.collisions),
            ("errors", self.errors),
        ]
    }

    /// Whether a driver should report failure for this run
    pub fn has_failures(&self) -> bool {
        self.errors > 0 || self.collisions > 0
    }
}

/// Most recent path per action, for the progress block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastActions {
    pub directory: Option<PathBuf>,
    pub file: Option<PathBuf>,
    pub link: Option<PathBuf>,
    pub copy: Option<PathBuf>,
    pub error: Option<String>,
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
