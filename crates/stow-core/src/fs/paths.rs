//! Path validation for instruction-supplied locations.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;

/// Lexically normalize a path by resolving `.` and `..` components without filesystem access.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                // Never pop past the root
                if !components.is_empty() && !matches!(components.last(), Some(Component::RootDir))
                {
                    components.pop();
                }
            }
            Component::CurDir => {}
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Reject absolute paths and `..` traversal.
pub fn ensure_relative_path(path: &Path) -> anyhow::Result<()> {
    for component in path.components() {
        match component {
            Component::ParentDir => {
                anyhow::bail!("Path traversal is not allowed: {}", path.display());
            }
            Component::Prefix(_) | Component::RootDir => {
                anyhow::bail!("Absolute paths are not allowed: {}", path.display());
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolve `path` against `root`, failing if the result escapes `root`.
///
/// Absolute paths are accepted when they already lie inside `root`, which is
/// what `${installFolder}` expansion produces.
pub fn resolve_within(root: &Path, path: &Path) -> anyhow::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let normalized = normalize_path(&joined);
    if !normalized.starts_with(normalize_path(root)) {
        anyhow::bail!(
            "Path {} resolves outside of {}",
            path.display(),
            root.display()
        );
    }
    Ok(normalized)
}

/// Remove a file or directory tree. Returns `false` when nothing was there.
pub fn remove_path_if_exists(path: &Path) -> anyhow::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read metadata: {}", path.display()));
        }
    };
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    } else {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display()))?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_resolves_parent_components() {
        let path = Path::new("/opt/app/plugins/../lib/./x.so");
        assert_eq!(normalize_path(path), PathBuf::from("/opt/app/lib/x.so"));
    }

    #[test]
    fn ensure_relative_rejects_traversal_and_absolute() {
        assert!(ensure_relative_path(Path::new("plugins/a.jar")).is_ok());
        assert!(ensure_relative_path(Path::new("../etc/passwd")).is_err());
        assert!(ensure_relative_path(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn resolve_within_accepts_nested_and_rejects_escape() {
        let root = Path::new("/opt/app");
        assert_eq!(
            resolve_within(root, Path::new("plugins")).unwrap(),
            PathBuf::from("/opt/app/plugins")
        );
        assert_eq!(
            resolve_within(root, Path::new("/opt/app/lib")).unwrap(),
            PathBuf::from("/opt/app/lib")
        );
        assert!(resolve_within(root, Path::new("../../etc")).is_err());
        assert!(resolve_within(root, Path::new("/etc")).is_err());
    }

    #[test]
    fn remove_path_handles_files_dirs_and_missing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("dir");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(remove_path_if_exists(&dir).unwrap());
        assert!(remove_path_if_exists(&file).unwrap());
        assert!(!remove_path_if_exists(&file).unwrap());
        assert!(!dir.exists());
    }
}
