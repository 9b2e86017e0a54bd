//! Filesystem operations on resolved paths.
//!
//! Every function here takes paths already produced by
//! [`ExportRoot`](super::resolver::ExportRoot), so containment has been
//! checked by the caller. Recursive walks skip symbolic links entirely;
//! a link inside the tree is never followed out of it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use protocol::{EntryKind, FileEntry};

use super::resolver::ExportRoot;

/// A file or directory as seen by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl Entry {
    /// Convert to protocol FileEntry.
    pub fn to_protocol(&self) -> FileEntry {
        FileEntry {
            name: self.name.clone(),
            kind: self.kind,
            size: match self.kind {
                EntryKind::File => Some(self.size),
                EntryKind::Directory => None,
            },
        }
    }

    fn from_metadata(name: String, metadata: &fs::Metadata) -> Self {
        if metadata.is_dir() {
            Self {
                name,
                kind: EntryKind::Directory,
                size: 0,
            }
        } else {
            Self {
                name,
                kind: EntryKind::File,
                size: metadata.len(),
            }
        }
    }
}

/// Result of listing a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listed {
    /// The path is a file.
    File(Entry),
    /// The path is a directory; these are its immediate children.
    Directory(Vec<Entry>),
}

/// File content read for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// A single file.
    File {
        /// File name.
        name: String,
        /// Raw content.
        content: Vec<u8>,
    },
    /// Every regular file under a directory.
    Directory {
        /// Directory name.
        name: String,
        /// Raw content keyed by `/`-separated path relative to the export root.
        files: BTreeMap<String, Vec<u8>>,
    },
}

/// Describe a file, or list a directory's immediate children.
///
/// Children that cannot be stat'ed, and symlinks whose target lies outside
/// the export root, are left out of the listing.
pub fn list(root: &ExportRoot, path: &Path) -> io::Result<Listed> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
        return Ok(Listed::File(Entry::from_metadata(file_name(root, path), &metadata)));
    }

    let mut results = Vec::new();
    for entry_result in fs::read_dir(path)? {
        let entry = match entry_result {
            Ok(e) => e,
            Err(_) => continue,
        };

        let is_symlink = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
        if is_symlink {
            let inside = fs::canonicalize(entry.path())
                .map(|target| target.starts_with(root.path()))
                .unwrap_or(false);
            if !inside {
                continue;
            }
        }

        let metadata = match fs::metadata(entry.path()) {
            Ok(m) => m,
            Err(_) => continue,
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        results.push(Entry::from_metadata(name, &metadata));
    }

    // Directories first, then files, both by name
    results.sort_by(|a, b| match (a.kind, b.kind) {
        (EntryKind::Directory, EntryKind::File) => std::cmp::Ordering::Less,
        (EntryKind::File, EntryKind::Directory) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    Ok(Listed::Directory(results))
}

/// Delete a file, or a directory with all of its contents.
///
/// Returns the kind of entry that was removed.
pub fn remove(path: &Path) -> io::Result<EntryKind> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
        Ok(EntryKind::Directory)
    } else {
        fs::remove_file(path)?;
        Ok(EntryKind::File)
    }
}

/// Copy a single file, replacing `destination` if it is an existing file.
///
/// Missing parent directories of `destination` are created.
pub fn copy_file(source: &Path, destination: &Path) -> io::Result<u64> {
    create_parent(destination)?;
    fs::copy(source, destination)
}

/// Recursively copy a directory tree to a destination that must not exist.
///
/// Missing parent directories of `destination` are created. Symlinks inside
/// the source tree are skipped.
pub fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    create_parent(destination)?;
    copy_dir_contents(source, destination)
}

fn copy_dir_contents(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir(destination)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = destination.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir_contents(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Read a file, or every regular file under a directory.
pub fn fetch(root: &ExportRoot, path: &Path) -> io::Result<Fetched> {
    let name = file_name(root, path);

    if !fs::metadata(path)?.is_dir() {
        return Ok(Fetched::File {
            name,
            content: fs::read(path)?,
        });
    }

    let mut files = BTreeMap::new();
    collect_files(root, path, &mut files)?;
    Ok(Fetched::Directory { name, files })
}

fn collect_files(
    root: &ExportRoot,
    dir: &Path,
    files: &mut BTreeMap<String, Vec<u8>>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            collect_files(root, &path, files)?;
        } else if file_type.is_file() {
            if let Some(key) = root.relative(&path) {
                files.insert(key, fs::read(&path)?);
            }
        }
    }

    Ok(())
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

fn file_name(root: &ExportRoot, path: &Path) -> String {
    match path.file_name() {
        Some(name) if !root.is_root(path) => name.to_string_lossy().into_owned(),
        _ => root.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn create_test_structure() -> (TempDir, ExportRoot) {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("export");
        fs::create_dir_all(dir.join("reports/sub")).unwrap();
        fs::create_dir_all(dir.join("empty")).unwrap();
        fs::write(dir.join("reports/a.txt"), "hi").unwrap();
        fs::write(dir.join("reports/sub/b.txt"), "bye").unwrap();
        fs::write(dir.join("top.bin"), [0u8, 159, 255]).unwrap();
        fs::write(temp.path().join("outside.txt"), "secret").unwrap();
        let root = ExportRoot::open(&dir, false).unwrap();
        (temp, root)
    }

    #[test]
    fn test_list_file() {
        let (_temp, root) = create_test_structure();
        let listed = list(&root, &root.path().join("reports/a.txt")).unwrap();
        assert_eq!(
            listed,
            Listed::File(Entry {
                name: "a.txt".to_string(),
                kind: EntryKind::File,
                size: 2,
            })
        );
    }

    #[test]
    fn test_list_directory_sorted_dirs_first() {
        let (_temp, root) = create_test_structure();
        let Listed::Directory(entries) = list(&root, root.path()).unwrap() else {
            panic!("expected a directory listing");
        };

        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["empty", "reports", "top.bin"]);
        assert_eq!(entries[2].kind, EntryKind::File);
        assert_eq!(entries[2].size, 3);
    }

    #[test]
    fn test_list_empty_directory() {
        let (_temp, root) = create_test_structure();
        let listed = list(&root, &root.path().join("empty")).unwrap();
        assert_eq!(listed, Listed::Directory(vec![]));
    }

    #[test]
    fn test_list_hides_escaping_symlinks() {
        let (temp, root) = create_test_structure();
        symlink(temp.path().join("outside.txt"), root.path().join("leak")).unwrap();
        symlink(root.path().join("reports"), root.path().join("alias")).unwrap();

        let Listed::Directory(entries) = list(&root, root.path()).unwrap() else {
            panic!("expected a directory listing");
        };
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(!names.contains(&"leak"));
        assert!(names.contains(&"alias"));
    }

    #[test]
    fn test_entry_to_protocol() {
        let file = Entry {
            name: "a.txt".to_string(),
            kind: EntryKind::File,
            size: 2,
        };
        assert_eq!(file.to_protocol().size, Some(2));

        let dir = Entry {
            name: "sub".to_string(),
            kind: EntryKind::Directory,
            size: 0,
        };
        assert_eq!(dir.to_protocol().size, None);
    }

    #[test]
    fn test_remove_file_and_tree() {
        let (_temp, root) = create_test_structure();

        assert_eq!(remove(&root.path().join("top.bin")).unwrap(), EntryKind::File);
        assert!(!root.path().join("top.bin").exists());

        assert_eq!(
            remove(&root.path().join("reports")).unwrap(),
            EntryKind::Directory
        );
        assert!(!root.path().join("reports").exists());
    }

    #[test]
    fn test_remove_missing() {
        let (_temp, root) = create_test_structure();
        let err = remove(&root.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_copy_file_creates_parents() {
        let (_temp, root) = create_test_structure();
        let dest = root.path().join("backup/2024/a.txt");

        copy_file(&root.path().join("reports/a.txt"), &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hi");
    }

    #[test]
    fn test_copy_file_overwrites() {
        let (_temp, root) = create_test_structure();
        let dest = root.path().join("top.bin");

        copy_file(&root.path().join("reports/a.txt"), &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hi");
    }

    #[test]
    fn test_copy_tree() {
        let (_temp, root) = create_test_structure();
        let dest = root.path().join("backup/reports");

        copy_tree(&root.path().join("reports"), &dest).unwrap();
        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"hi");
        assert_eq!(fs::read(dest.join("sub/b.txt")).unwrap(), b"bye");
    }

    #[test]
    fn test_copy_tree_skips_symlinks() {
        let (temp, root) = create_test_structure();
        symlink(
            temp.path().join("outside.txt"),
            root.path().join("reports/leak"),
        )
        .unwrap();

        let dest = root.path().join("copy");
        copy_tree(&root.path().join("reports"), &dest).unwrap();
        assert!(fs::symlink_metadata(dest.join("leak")).is_err());
        assert!(dest.join("a.txt").exists());
    }

    #[test]
    fn test_copy_tree_refuses_existing_destination() {
        let (_temp, root) = create_test_structure();
        let err = copy_tree(&root.path().join("reports"), &root.path().join("empty")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_fetch_file() {
        let (_temp, root) = create_test_structure();
        let fetched = fetch(&root, &root.path().join("top.bin")).unwrap();
        assert_eq!(
            fetched,
            Fetched::File {
                name: "top.bin".to_string(),
                content: vec![0, 159, 255],
            }
        );
    }

    #[test]
    fn test_fetch_directory_keys_are_root_relative() {
        let (_temp, root) = create_test_structure();
        let Fetched::Directory { name, files } = fetch(&root, &root.path().join("reports")).unwrap()
        else {
            panic!("expected a directory");
        };

        assert_eq!(name, "reports");
        assert_eq!(files.len(), 2);
        assert_eq!(files["reports/a.txt"], b"hi");
        assert_eq!(files["reports/sub/b.txt"], b"bye");
    }

    #[test]
    fn test_fetch_empty_directory() {
        let (_temp, root) = create_test_structure();
        let fetched = fetch(&root, &root.path().join("empty")).unwrap();
        assert_eq!(
            fetched,
            Fetched::Directory {
                name: "empty".to_string(),
                files: BTreeMap::new(),
            }
        );
    }

    #[test]
    fn test_fetch_root_uses_root_name() {
        let (_temp, root) = create_test_structure();
        let Fetched::Directory { name, files } = fetch(&root, root.path()).unwrap() else {
            panic!("expected a directory");
        };
        assert_eq!(name, "export");
        assert!(files.contains_key("top.bin"));
    }

    #[test]
    fn test_fetch_skips_symlinks() {
        let (temp, root) = create_test_structure();
        symlink(
            temp.path().join("outside.txt"),
            root.path().join("reports/leak"),
        )
        .unwrap();

        let Fetched::Directory { files, .. } = fetch(&root, &root.path().join("reports")).unwrap()
        else {
            panic!("expected a directory");
        };
        assert!(!files.contains_key("reports/leak"));
    }
}
