//! Path utilities for storage keys.

use std::path::{Component, Path, PathBuf};

/// Resolve a storage key to a path under `root`.
///
/// Returns `None` for keys that are empty, absolute, or that would escape
/// `root` through `..` components.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use channelcast_common::paths::resolve_key;
///
/// let root = Path::new("/srv/videos");
/// assert_eq!(
///     resolve_key(root, "channel_1/a.mp4"),
///     Some(root.join("channel_1/a.mp4"))
/// );
/// assert_eq!(resolve_key(root, "../etc/passwd"), None);
/// assert_eq!(resolve_key(root, "/etc/passwd"), None);
/// ```
pub fn resolve_key(root: &Path, key: &str) -> Option<PathBuf> {
    let relative = Path::new(key);
    if key.is_empty() {
        return None;
    }

    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(root.join(relative))
}
