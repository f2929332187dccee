//! Path utilities for manifest entries and archive member names.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Lexical path normalization without filesystem access.
///
/// Removes `.` components and resolves `..` components lexically.
/// Does not access the filesystem or resolve symlinks.
///
/// # Arguments
/// * `path` - Path to normalize
///
/// # Returns
/// Normalized path with `.` and `..` resolved lexically.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::ParentDir) | Some(Component::RootDir)
                    )
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Convert a path to POSIX-style string (forward slashes).
///
/// # Errors
/// Returns `PathError::InvalidPath` if a component is not valid UTF-8.
pub fn to_posix_path(path: &Path) -> Result<String, PathError> {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                let part: &str = part.to_str().ok_or_else(|| PathError::InvalidPath {
                    path: path.display().to_string(),
                })?;
                parts.push(part);
            }
            _ => {
                return Err(PathError::InvalidPath {
                    path: path.display().to_string(),
                })
            }
        }
    }
    Ok(parts.join("/"))
}

/// POSIX-style path of `path` relative to `root`.
///
/// # Arguments
/// * `path` - Path beneath `root`
/// * `root` - Base directory
///
/// # Errors
/// Returns error if `path` is not under `root` or is not valid UTF-8.
pub fn relative_posix_path(path: &Path, root: &Path) -> Result<String, PathError> {
    let relative: &Path = path
        .strip_prefix(root)
        .map_err(|_| PathError::PathOutsideRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        })?;
    to_posix_path(relative)
}

/// Resolve a POSIX relative path (from a manifest or archive) under a root.
///
/// Absolute paths and paths that climb out of `root` are rejected, so a
/// hostile manifest or archive cannot reach outside the destination.
///
/// # Arguments
/// * `relative` - POSIX-style relative path
/// * `root` - Directory the path must stay within
///
/// # Returns
/// The joined host path.
pub fn resolve_within_root(relative: &str, root: &Path) -> Result<PathBuf, PathError> {
    let mut result: PathBuf = root.to_path_buf();

    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(PathError::PathOutsideRoot {
                    path: relative.to_string(),
                    root: root.display().to_string(),
                })
            }
            _ => {
                if Path::new(part).is_absolute() {
                    return Err(PathError::InvalidPath {
                        path: relative.to_string(),
                    });
                }
                result.push(part);
            }
        }
    }

    if relative.starts_with('/') || !is_within_root(&result, root) {
        return Err(PathError::PathOutsideRoot {
            path: relative.to_string(),
            root: root.display().to_string(),
        });
    }

    Ok(result)
}

/// Check if a path is within a root directory (security validation).
///
/// Uses lexical comparison, does not access filesystem.
pub fn is_within_root(path: &Path, root: &Path) -> bool {
    let norm_path: PathBuf = lexical_normalize(path);
    let norm_root: PathBuf = lexical_normalize(root);
    norm_path.starts_with(&norm_root)
}

/// Whether any component of a relative path is a dot-file or dot-directory.
pub fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_normalize_resolves_dotdot() {
        let normalized: PathBuf = lexical_normalize(Path::new("/a/./b/../c"));
        assert_eq!(normalized, PathBuf::from("/a/c"));
    }

    #[test]
    fn test_to_posix_path() {
        let posix: String = to_posix_path(&PathBuf::from("a").join("b").join("c")).unwrap();
        assert_eq!(posix, "a/b/c");
    }

    #[test]
    fn test_to_posix_path_rejects_parent() {
        assert!(to_posix_path(Path::new("a/../b")).is_err());
    }

    #[test]
    fn test_relative_posix_path() {
        let root: PathBuf = PathBuf::from("/bag");
        let rel: String = relative_posix_path(&root.join("data").join("x.txt"), &root).unwrap();
        assert_eq!(rel, "data/x.txt");
        assert!(relative_posix_path(Path::new("/elsewhere/x"), &root).is_err());
    }

    #[test]
    fn test_resolve_within_root() {
        let root: &Path = Path::new("/root");
        assert_eq!(
            resolve_within_root("a//b/./c", root).unwrap(),
            PathBuf::from("/root/a/b/c")
        );
        assert!(resolve_within_root("../etc/passwd", root).is_err());
        assert!(resolve_within_root("a/../../b", root).is_err());
        assert!(resolve_within_root("/etc/passwd", root).is_err());
    }

    #[test]
    fn test_is_within_root() {
        assert!(is_within_root(
            Path::new("/project/assets/file.txt"),
            Path::new("/project")
        ));
        assert!(!is_within_root(
            Path::new("/project/../etc/passwd"),
            Path::new("/project")
        ));
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(Path::new(".git/config")));
        assert!(is_hidden(Path::new("a/.cache/b")));
        assert!(!is_hidden(Path::new("a/b.txt")));
    }
}
