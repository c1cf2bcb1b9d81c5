//! Path resolution for the tree being shrunk and its store.
//!
//! The store defaults to a sibling of the tree (`<tree>/../hash`) and must
//! live on the same volume, since hardlinks cannot cross filesystems.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Directory name of the default store, next to the tree root
pub const DEFAULT_STORE_DIR: &str = "hash";

/// Resolve the tree root to an absolute, symlink-free path.
pub fn resolve_tree_root(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    path.canonicalize()
        .with_context(|| format!("Failed to resolve tree root: {}", path.display()))
}

/// Default store location for a tree: `<tree>/../hash`.
///
/// A tree at the filesystem root gets `/hash`.
pub fn default_store_root(tree_root: impl AsRef<Path>) -> PathBuf {
    let tree_root = tree_root.as_ref();
    tree_root
        .parent()
        .unwrap_or(tree_root)
        .join(DEFAULT_STORE_DIR)
}

/// Pick the configured store root, or fall back to the default next to the tree.
///
/// Relative configured paths are taken relative to the current directory.
/// The result is absolute, free of `.` and `..`, and its existing prefix is
/// canonical, so it compares equal to the paths a walk of the tree yields.
pub fn resolve_store_root(tree_root: &Path, configured: Option<&Path>) -> Result<PathBuf> {
    let Some(configured) = configured else {
        return Ok(default_store_root(tree_root));
    };
    let absolute = std::path::absolute(configured)
        .with_context(|| format!("Failed to resolve store root: {}", configured.display()))?;
    Ok(canonicalize_existing_prefix(&normalize_lexically(&absolute)))
}

/// Drop `.` and fold `..` into its parent without touching the disk.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path` and re-attach the
/// part that does not exist yet.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let Some(anchor) = existing_ancestor(path) else {
        return path.to_path_buf();
    };
    match (anchor.canonicalize(), path.strip_prefix(anchor)) {
        (Ok(canonical), Ok(rest)) if rest.as_os_str().is_empty() => canonical,
        (Ok(canonical), Ok(rest)) => canonical.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Nearest existing ancestor of `path` (the path itself if it exists).
fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

/// Fail unless the tree and the store (or the closest existing parent of the
/// store, when it has not been created yet) live on the same device.
#[cfg(unix)]
pub fn ensure_same_volume(tree_root: &Path, store_root: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let tree_dev = std::fs::metadata(tree_root)
        .with_context(|| format!("Cannot stat tree root: {}", tree_root.display()))?
        .dev();
    let anchor = existing_ancestor(store_root)
        .with_context(|| format!("No existing parent for store: {}", store_root.display()))?;
    let store_dev = std::fs::metadata(anchor)
        .with_context(|| format!("Cannot stat store location: {}", anchor.display()))?
        .dev();

    if tree_dev != store_dev {
        anyhow::bail!(
            "Store '{}' is on a different filesystem than tree '{}'; hardlinks cannot cross volumes",
            store_root.display(),
            tree_root.display()
        );
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_same_volume(tree_root: &Path, store_root: &Path) -> Result<()> {
    let _ = (tree_root, existing_ancestor(store_root));
    Ok(())
}
