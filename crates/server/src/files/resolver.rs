//! Logical path resolution inside the export root.
//!
//! Every client path is joined onto the export root and canonicalized, then
//! checked for containment. Symlinks and `..` components are resolved by the
//! operating system before the check, so neither can be used to reach a
//! location outside the root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while resolving a logical path.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The path resolves outside the export root.
    #[error("path is outside the export root: {0}")]
    OutsideRoot(String),

    /// The path is inside the export root but does not exist.
    #[error("path does not exist: {0}")]
    NotFound(String),

    /// The export root itself is unusable.
    #[error("export root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The directory tree exported to clients.
///
/// Holds the canonical form of the root, fixed at startup.
#[derive(Debug, Clone)]
pub struct ExportRoot {
    canonical: PathBuf,
}

impl ExportRoot {
    /// Open an export root, optionally creating it first.
    pub fn open(path: &Path, create_if_missing: bool) -> Result<Self, ResolveError> {
        if create_if_missing && !path.exists() {
            fs::create_dir_all(path)?;
            tracing::info!(path = %path.display(), "Created export root");
        }

        let canonical = fs::canonicalize(path)?;
        if !canonical.is_dir() {
            return Err(ResolveError::NotADirectory(canonical));
        }

        Ok(Self { canonical })
    }

    /// Canonical path of the root.
    pub fn path(&self) -> &Path {
        &self.canonical
    }

    /// Name of the root directory, used when the root itself is downloaded.
    pub fn name(&self) -> String {
        self.canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }

    /// Resolve a logical path that must already exist.
    ///
    /// The empty path resolves to the root. A missing path whose would-be
    /// location is still inside the root yields [`ResolveError::NotFound`];
    /// one that would land outside yields [`ResolveError::OutsideRoot`].
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, ResolveError> {
        let joined = self.canonical.join(logical);

        match fs::canonicalize(&joined) {
            Ok(canonical) => {
                if canonical.starts_with(&self.canonical) {
                    Ok(canonical)
                } else {
                    Err(ResolveError::OutsideRoot(logical.to_string()))
                }
            }
            Err(e) if is_missing(&e) => {
                // Distinguish "absent" from "absent and outside"
                self.resolve_for_creation(logical)?;
                Err(ResolveError::NotFound(logical.to_string()))
            }
            Err(e) => Err(ResolveError::Io(e)),
        }
    }

    /// Resolve a logical path that may not exist yet.
    ///
    /// The longest existing ancestor is canonicalized and the remaining
    /// components are appended lexically. A `..` among the remaining
    /// components is rejected because it cannot be checked against the
    /// real filesystem.
    pub fn resolve_for_creation(&self, logical: &str) -> Result<PathBuf, ResolveError> {
        let joined = self.canonical.join(logical);

        let mut base = None;
        for ancestor in joined.ancestors() {
            match fs::canonicalize(ancestor) {
                Ok(canonical) => {
                    base = Some((ancestor, canonical));
                    break;
                }
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(ResolveError::Io(e)),
            }
        }

        let (ancestor, mut resolved) =
            base.ok_or_else(|| ResolveError::OutsideRoot(logical.to_string()))?;

        let remainder = joined
            .strip_prefix(ancestor)
            .map_err(|_| ResolveError::OutsideRoot(logical.to_string()))?;

        for component in remainder.components() {
            match component {
                Component::Normal(name) => {
                    resolved.push(name);
                    // Exists but could not be canonicalized: a dangling link
                    if fs::symlink_metadata(&resolved).is_ok() {
                        return Err(ResolveError::OutsideRoot(logical.to_string()));
                    }
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ResolveError::OutsideRoot(logical.to_string()));
                }
            }
        }

        if resolved.starts_with(&self.canonical) {
            Ok(resolved)
        } else {
            Err(ResolveError::OutsideRoot(logical.to_string()))
        }
    }

    /// Resolve a logical path without following a final symlink.
    ///
    /// Used for removal, so that deleting a link never touches its target.
    /// The link's parent is canonicalized and checked like any other path.
    /// Anything that is not a symlink resolves exactly as with [`resolve`].
    ///
    /// [`resolve`]: ExportRoot::resolve
    pub fn resolve_link(&self, logical: &str) -> Result<PathBuf, ResolveError> {
        let joined = self.canonical.join(logical);

        let is_link = fs::symlink_metadata(&joined)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return self.resolve(logical);
        }

        let (Some(parent), Some(name)) = (joined.parent(), joined.file_name()) else {
            return self.resolve(logical);
        };

        let parent = fs::canonicalize(parent)?;
        if !parent.starts_with(&self.canonical) {
            return Err(ResolveError::OutsideRoot(logical.to_string()));
        }

        Ok(parent.join(name))
    }

    /// Whether a resolved path is the root itself.
    pub fn is_root(&self, resolved: &Path) -> bool {
        resolved == self.canonical
    }

    /// Path of `resolved` relative to the root, `/`-separated.
    ///
    /// Returns `None` for paths outside the root.
    pub fn relative(&self, resolved: &Path) -> Option<String> {
        let rel = resolved.strip_prefix(&self.canonical).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn create_test_root() -> (TempDir, ExportRoot) {
        let temp_dir = TempDir::new().unwrap();
        let root_dir = temp_dir.path().join("export");
        fs::create_dir_all(root_dir.join("docs/sub")).unwrap();
        fs::write(root_dir.join("docs/readme.txt"), "hello").unwrap();
        fs::write(temp_dir.path().join("secret.txt"), "secret").unwrap();
        let root = ExportRoot::open(&root_dir, false).unwrap();
        (temp_dir, root)
    }

    #[test]
    fn test_empty_path_is_root() {
        let (_temp, root) = create_test_root();
        let resolved = root.resolve("").unwrap();
        assert_eq!(resolved, root.path());
        assert!(root.is_root(&resolved));
    }

    #[test]
    fn test_resolve_nested_file() {
        let (_temp, root) = create_test_root();
        let resolved = root.resolve("docs/readme.txt").unwrap();
        assert_eq!(resolved, root.path().join("docs/readme.txt"));
    }

    #[test]
    fn test_dot_segments_inside_root_are_allowed() {
        let (_temp, root) = create_test_root();
        let resolved = root.resolve("docs/sub/../readme.txt").unwrap();
        assert_eq!(resolved, root.path().join("docs/readme.txt"));

        let resolved = root.resolve("./docs/.").unwrap();
        assert_eq!(resolved, root.path().join("docs"));
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let (_temp, root) = create_test_root();
        for path in ["..", "../secret.txt", "docs/../../secret.txt", "docs/sub/../../.."] {
            let result = root.resolve(path);
            assert!(
                matches!(result, Err(ResolveError::OutsideRoot(_))),
                "{path} should be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn test_missing_traversal_is_still_outside() {
        let (_temp, root) = create_test_root();
        let result = root.resolve("../does-not-exist");
        assert!(matches!(result, Err(ResolveError::OutsideRoot(_))));
    }

    #[test]
    fn test_absolute_path_outside_root_is_rejected() {
        let (temp, root) = create_test_root();
        let outside = temp.path().join("secret.txt");
        let result = root.resolve(outside.to_str().unwrap());
        assert!(matches!(result, Err(ResolveError::OutsideRoot(_))));
    }

    #[test]
    fn test_absolute_path_inside_root_is_accepted() {
        let (_temp, root) = create_test_root();
        let inside = root.path().join("docs");
        assert_eq!(root.resolve(inside.to_str().unwrap()).unwrap(), inside);
    }

    #[test]
    fn test_missing_path_inside_root() {
        let (_temp, root) = create_test_root();
        let result = root.resolve("missing");
        assert!(matches!(result, Err(ResolveError::NotFound(ref p)) if p == "missing"));

        // A file used as a directory is just missing
        let result = root.resolve("docs/readme.txt/inner");
        assert!(matches!(result, Err(ResolveError::NotFound(_))));
    }

    #[test]
    fn test_symlink_escape_is_rejected() {
        let (temp, root) = create_test_root();
        symlink(temp.path().join("secret.txt"), root.path().join("sneaky")).unwrap();
        symlink(temp.path(), root.path().join("sneaky_dir")).unwrap();

        assert!(matches!(root.resolve("sneaky"), Err(ResolveError::OutsideRoot(_))));
        assert!(matches!(
            root.resolve("sneaky_dir/secret.txt"),
            Err(ResolveError::OutsideRoot(_))
        ));
        assert!(matches!(
            root.resolve_for_creation("sneaky_dir/new.txt"),
            Err(ResolveError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_symlink_within_root_is_followed() {
        let (_temp, root) = create_test_root();
        symlink(root.path().join("docs"), root.path().join("alias")).unwrap();
        assert_eq!(
            root.resolve("alias/readme.txt").unwrap(),
            root.path().join("docs/readme.txt")
        );
    }

    #[test]
    fn test_resolve_for_creation() {
        let (_temp, root) = create_test_root();
        let resolved = root.resolve_for_creation("backup/2024/readme.txt").unwrap();
        assert_eq!(resolved, root.path().join("backup/2024/readme.txt"));

        let existing = root.resolve_for_creation("docs/readme.txt").unwrap();
        assert_eq!(existing, root.path().join("docs/readme.txt"));
    }

    #[test]
    fn test_resolve_for_creation_rejects_unverifiable_parent_dir() {
        let (_temp, root) = create_test_root();
        let result = root.resolve_for_creation("new/../../escape.txt");
        assert!(matches!(result, Err(ResolveError::OutsideRoot(_))));
    }

    #[test]
    fn test_resolve_for_creation_rejects_dangling_link() {
        let (temp, root) = create_test_root();
        symlink(temp.path().join("nowhere"), root.path().join("dangling")).unwrap();

        assert!(matches!(
            root.resolve_for_creation("dangling"),
            Err(ResolveError::OutsideRoot(_))
        ));
        assert!(matches!(
            root.resolve_for_creation("dangling/child"),
            Err(ResolveError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_resolve_link_does_not_follow() {
        let (temp, root) = create_test_root();
        symlink(root.path().join("docs"), root.path().join("alias")).unwrap();
        symlink(temp.path().join("secret.txt"), root.path().join("sneaky")).unwrap();
        symlink(temp.path().join("nowhere"), root.path().join("dangling")).unwrap();

        assert_eq!(root.resolve_link("alias").unwrap(), root.path().join("alias"));
        assert_eq!(root.resolve_link("sneaky").unwrap(), root.path().join("sneaky"));
        assert_eq!(
            root.resolve_link("dangling").unwrap(),
            root.path().join("dangling")
        );

        // Plain entries resolve as usual
        assert_eq!(
            root.resolve_link("docs/readme.txt").unwrap(),
            root.path().join("docs/readme.txt")
        );
        assert!(matches!(
            root.resolve_link("../secret.txt"),
            Err(ResolveError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_relative() {
        let (_temp, root) = create_test_root();
        let resolved = root.resolve("docs/readme.txt").unwrap();
        assert_eq!(root.relative(&resolved).unwrap(), "docs/readme.txt");
        assert_eq!(root.relative(root.path()).unwrap(), "");
        assert!(root.relative(Path::new("/definitely/elsewhere")).is_none());
    }

    #[test]
    fn test_open_creates_missing_root() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a/b/export");

        assert!(ExportRoot::open(&target, false).is_err());

        let root = ExportRoot::open(&target, true).unwrap();
        assert!(root.path().is_dir());
        assert_eq!(root.name(), "export");
    }

    #[test]
    fn test_open_rejects_file_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let result = ExportRoot::open(&file, false);
        assert!(matches!(result, Err(ResolveError::NotADirectory(_))));
    }
}
