//! Shared path validation utilities for tool implementations

use std::path::{Component, Path, PathBuf};

/// True if the path contains a `..` component
pub fn contains_traversal(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

/// Resolve a tool-supplied path against the working-directory root.
///
/// Relative paths are joined to `root`. Absolute paths are accepted only when
/// their nearest existing ancestor is writable.
pub fn resolve_workspace_path(root: &Path, path: &str) -> Result<PathBuf, String> {
    if path.trim().is_empty() {
        return Err("Path must not be empty".into());
    }
    if path.contains('\0') {
        return Err("Path contains a null byte".into());
    }

    let candidate = Path::new(path);
    if !candidate.is_absolute() {
        return Ok(root.join(candidate));
    }

    let ancestor = nearest_existing_ancestor(candidate)
        .ok_or_else(|| format!("Access denied: no existing parent for '{}'", path))?;
    let metadata = std::fs::metadata(&ancestor)
        .map_err(|e| format!("Cannot resolve path '{}': {}", path, e))?;
    if metadata.permissions().readonly() {
        return Err(format!(
            "Access denied: parent directory '{}' is not writable",
            ancestor.display()
        ));
    }

    Ok(candidate.to_path_buf())
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    let mut check = path.parent()?.to_path_buf();
    loop {
        if check.exists() {
            return Some(check);
        }
        if !check.pop() {
            return None;
        }
    }
}

/// Path relative to `root` for display, falling back to the full path
pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
