//! Sandboxed file operations.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::Workspace;
use crate::contain::{Access, resolve_path};
use crate::error::{WorkspaceError, WorkspaceResult};

/// Content encodings for reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    /// Text; content must be valid UTF-8.
    #[default]
    Utf8,
    /// Base64-encoded bytes.
    Base64,
    /// Raw bytes, carried base64-encoded on the wire.
    Binary,
}

/// One listing entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Workspace-relative path, forward slashes.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// File size, bytes (0 for directories).
    pub size: u64,
    /// Last modification time, when the filesystem reports one.
    pub modified_at: Option<DateTime<Utc>>,
}

/// A (possibly truncated) listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Entries, sorted by path.
    pub entries: Vec<FileEntry>,
    /// True when the traversal hit the workspace entry bound.
    pub truncated: bool,
}

/// File content as returned to the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    /// Workspace-relative path.
    pub path: String,
    /// Content, encoded per `encoding`.
    pub content: String,
    /// The encoding of `content`.
    pub encoding: FileEncoding,
    /// Decoded size, bytes.
    pub size: u64,
}

/// Enumerate files under `path`.
///
/// Entries that fail the workspace's glob policy are skipped, not
/// errors. Traversal stops at the workspace entry bound and flags the
/// result truncated.
///
/// # Errors
///
/// [`WorkspaceError::InvalidPath`] when `path` fails containment;
/// [`WorkspaceError::Io`] on filesystem failure.
pub fn list_files(
    workspace: &Workspace,
    path: &str,
    recursive: bool,
    include_directories: bool,
) -> WorkspaceResult<Listing> {
    let resolved = resolve_path(workspace, path, Access::List)?;
    let def = workspace.def();

    let mut walker = WalkDir::new(&resolved.absolute).follow_links(def.follow_symlinks);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut entries = Vec::new();
    let mut truncated = false;

    for entry in walker.into_iter().filter_map(Result::ok) {
        if entry.path() == resolved.absolute {
            continue;
        }
        if entries.len() >= def.max_entries {
            truncated = true;
            break;
        }
        if !def.follow_symlinks && entry.path_is_symlink() {
            continue;
        }

        let is_directory = entry.file_type().is_dir();
        if is_directory && !include_directories {
            continue;
        }

        let Ok(relative_path) = entry.path().strip_prefix(&resolved.absolute) else {
            continue;
        };
        let relative = join_relative(&resolved.relative, relative_path);
        if !workspace.globs_permit(&relative) {
            continue;
        }

        let metadata = entry.metadata().ok();
        entries.push(FileEntry {
            path: relative,
            is_directory,
            size: if is_directory {
                0
            } else {
                metadata.as_ref().map_or(0, std::fs::Metadata::len)
            },
            modified_at: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(Listing { entries, truncated })
}

/// Read a file.
///
/// # Errors
///
/// [`WorkspaceError::InvalidPath`] on containment or policy violation,
/// [`WorkspaceError::TooLarge`] past the size cap,
/// [`WorkspaceError::Encoding`] when utf8 was requested for binary data.
pub fn read_file(
    workspace: &Workspace,
    path: &str,
    encoding: FileEncoding,
) -> WorkspaceResult<FileContent> {
    let resolved = resolve_path(workspace, path, Access::Read)?;
    let def = workspace.def();

    let metadata = std::fs::metadata(&resolved.absolute)?;
    if !metadata.is_file() {
        return Err(WorkspaceError::InvalidPath(format!(
            "not a file: {}",
            resolved.relative
        )));
    }
    if metadata.len() > def.max_file_size {
        return Err(WorkspaceError::TooLarge {
            size: metadata.len(),
            max: def.max_file_size,
        });
    }

    let bytes = std::fs::read(&resolved.absolute)?;
    let size = bytes.len() as u64;
    let content = match encoding {
        FileEncoding::Utf8 => String::from_utf8(bytes)
            .map_err(|_| WorkspaceError::Encoding("file is not valid UTF-8".to_string()))?,
        FileEncoding::Base64 | FileEncoding::Binary => BASE64.encode(bytes),
    };

    Ok(FileContent {
        path: resolved.relative,
        content,
        encoding,
        size,
    })
}

/// Write a file atomically: the content lands in a sibling temp file that
/// is renamed into place, so a crash never leaves a truncated target.
///
/// # Errors
///
/// [`WorkspaceError::ReadOnly`], [`WorkspaceError::InvalidPath`],
/// [`WorkspaceError::TooLarge`], [`WorkspaceError::Encoding`], or
/// [`WorkspaceError::Io`].
pub fn write_file(
    workspace: &Workspace,
    path: &str,
    content: &str,
    encoding: FileEncoding,
) -> WorkspaceResult<u64> {
    let resolved = resolve_path(workspace, path, Access::Write)?;
    let def = workspace.def();

    let bytes = match encoding {
        FileEncoding::Utf8 => content.as_bytes().to_vec(),
        FileEncoding::Base64 | FileEncoding::Binary => BASE64
            .decode(content)
            .map_err(|e| WorkspaceError::Encoding(format!("invalid base64: {e}")))?,
    };
    let size = bytes.len() as u64;
    if size > def.max_file_size {
        return Err(WorkspaceError::TooLarge {
            size,
            max: def.max_file_size,
        });
    }

    let parent = resolved.absolute.parent().ok_or_else(|| {
        WorkspaceError::InvalidPath("write target has no parent directory".to_string())
    })?;
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(&bytes)?;
    temp.flush()?;
    temp.persist(&resolved.absolute)
        .map_err(|e| WorkspaceError::Io(e.error))?;

    debug!(workspace = %def.id, path = %resolved.relative, size, "Wrote file");
    Ok(size)
}

/// Existence probe.
///
/// # Errors
///
/// [`WorkspaceError::InvalidPath`] when the path fails containment; a
/// contained-but-absent path is `Ok(false)`, not an error.
pub fn path_exists(workspace: &Workspace, path: &str) -> WorkspaceResult<bool> {
    let resolved = resolve_path(workspace, path, Access::Probe)?;
    Ok(resolved.absolute.exists())
}

fn join_relative(base: &str, tail: &std::path::Path) -> String {
    let tail = tail
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if base.is_empty() {
        tail
    } else if tail.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceDef;

    fn workspace(dir: &std::path::Path) -> Workspace {
        Workspace::new(WorkspaceDef {
            root: dir.to_path_buf(),
            ..WorkspaceDef::default()
        })
    }

    #[test]
    fn test_write_read_round_trip_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());

        let written = write_file(&ws, "notes/hello.txt", "hi there", FileEncoding::Utf8).unwrap();
        assert_eq!(written, 8);

        let content = read_file(&ws, "notes/hello.txt", FileEncoding::Utf8).unwrap();
        assert_eq!(content.content, "hi there");
        assert_eq!(content.size, 8);
    }

    #[test]
    fn test_base64_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let payload = BASE64.encode([0u8, 159, 146, 150]);

        write_file(&ws, "blob.bin", &payload, FileEncoding::Base64).unwrap();
        let content = read_file(&ws, "blob.bin", FileEncoding::Base64).unwrap();
        assert_eq!(content.content, payload);

        // Reading binary data as utf8 reports an encoding error.
        assert!(matches!(
            read_file(&ws, "blob.bin", FileEncoding::Utf8).unwrap_err(),
            WorkspaceError::Encoding(_)
        ));
    }

    #[test]
    fn test_write_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        write_file(&ws, "f.txt", "first", FileEncoding::Utf8).unwrap();
        write_file(&ws, "f.txt", "second", FileEncoding::Utf8).unwrap();
        let content = read_file(&ws, "f.txt", FileEncoding::Utf8).unwrap();
        assert_eq!(content.content, "second");
        // No temp residue.
        let listing = list_files(&ws, "", false, false).unwrap();
        assert_eq!(listing.entries.len(), 1);
    }

    #[test]
    fn test_size_cap_enforced_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(WorkspaceDef {
            root: dir.path().to_path_buf(),
            max_file_size: 4,
            ..WorkspaceDef::default()
        });

        assert!(matches!(
            write_file(&ws, "big.txt", "12345", FileEncoding::Utf8).unwrap_err(),
            WorkspaceError::TooLarge { size: 5, max: 4 }
        ));

        // A file that grew past the cap out-of-band is refused on read.
        std::fs::write(dir.path().join("grown.txt"), b"123456").unwrap();
        assert!(matches!(
            read_file(&ws, "grown.txt", FileEncoding::Utf8).unwrap_err(),
            WorkspaceError::TooLarge { .. }
        ));
    }

    #[test]
    fn test_list_recursive_and_flat() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        write_file(&ws, "a.txt", "x", FileEncoding::Utf8).unwrap();
        write_file(&ws, "sub/b.txt", "y", FileEncoding::Utf8).unwrap();

        let flat = list_files(&ws, "", false, true).unwrap();
        let flat_paths: Vec<&str> = flat.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(flat_paths, vec!["a.txt", "sub"]);

        let deep = list_files(&ws, "", true, false).unwrap();
        let deep_paths: Vec<&str> = deep.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(deep_paths, vec!["a.txt", "sub/b.txt"]);
        assert!(!deep.truncated);
    }

    #[test]
    fn test_list_truncates_at_bound() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(WorkspaceDef {
            root: dir.path().to_path_buf(),
            max_entries: 3,
            ..WorkspaceDef::default()
        });
        for i in 0..10 {
            write_file(&ws, &format!("f{i}.txt"), "x", FileEncoding::Utf8).unwrap();
        }
        let listing = list_files(&ws, "", true, false).unwrap();
        assert_eq!(listing.entries.len(), 3);
        assert!(listing.truncated);
    }

    #[test]
    fn test_path_exists() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        write_file(&ws, "present.txt", "x", FileEncoding::Utf8).unwrap();

        assert!(path_exists(&ws, "present.txt").unwrap());
        assert!(!path_exists(&ws, "absent.txt").unwrap());
        // Containment violations error rather than answering.
        assert!(path_exists(&ws, "../outside").is_err());
    }

    #[test]
    fn test_read_directory_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        write_file(&ws, "sub/x.txt", "x", FileEncoding::Utf8).unwrap();
        assert!(matches!(
            read_file(&ws, "sub", FileEncoding::Utf8).unwrap_err(),
            WorkspaceError::InvalidPath(_)
        ));
    }
}
