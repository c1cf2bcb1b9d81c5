//! Tree traversal driving the store.

use std::path::Path;

use hashlink_config::{log_walk_debug, log_walk_warn};
use hashlink_store::LinkStore;
use walkdir::WalkDir;

/// Feed every regular file under `tree_root` to `store`.
///
/// The store directory is never entered. Symlinks and special files are
/// reported as skipped. Unreadable entries are logged and skipped.
pub fn walk(tree_root: &Path, store_root: &Path, store: &mut LinkStore) {
    let mut entries = WalkDir::new(tree_root).sort_by_file_name().into_iter();

    while let Some(entry) = entries.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(tree_root).to_path_buf();
                log_walk_warn!(
                    "Unreadable entry",
                    path = tracing::field::display(path.display()),
                    error = tracing::field::display(&err)
                );
                store.skip_file(&path, "unreadable");
                continue;
            }
        };

        let path = entry.path();
        let file_type = entry.file_type();
        if file_type.is_dir() {
            if path == store_root {
                log_walk_debug!("Skipping store", path = tracing::field::display(path.display()));
                store.skip_directory(path, "store");
                entries.skip_current_dir();
                continue;
            }
            store.enter_directory(path);
        } else if file_type.is_file() {
            store.process(path, entry.depth());
        } else if file_type.is_symlink() {
            store.skip_file(path, "symlink");
        } else {
            store.skip_file(path, "special file");
        }
    }
}
