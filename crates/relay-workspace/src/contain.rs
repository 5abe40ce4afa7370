//! The containment check.
//!
//! Every file operation funnels through [`resolve_path`]. The steps, in
//! order:
//!
//! 1. absolute request paths are rejected outright
//! 2. lexical normalization rejects any `..` that would climb past the root
//! 3. symlink policy: with `follow_symlinks = false`, any symlink in the
//!    chain rejects; otherwise symlinks are resolved
//! 4. the resolved path must sit under the canonical root at a path
//!    segment boundary (`/root-evil` never passes for root `/root`)
//! 5. allow globs (when present) then block globs apply to the relative path
//! 6. extension policy applies to file operations
//!
//! Size caps and read-only enforcement live with the operations that know
//! the byte counts.

use std::path::{Component, Path, PathBuf};

use crate::config::Workspace;
use crate::error::{WorkspaceError, WorkspaceResult};

/// What the caller intends to do with the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read an existing file.
    Read,
    /// Create or overwrite a file.
    Write,
    /// Enumerate a directory.
    List,
    /// Existence probe.
    Probe,
}

/// A resolved, policy-checked path.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Absolute on-disk path.
    pub absolute: PathBuf,
    /// Normalized workspace-relative path, forward slashes.
    pub relative: String,
}

/// Run the containment algorithm. Returns the checked absolute path.
///
/// # Errors
///
/// [`WorkspaceError::InvalidPath`] on any containment or policy
/// violation; [`WorkspaceError::ReadOnly`] for writes to a read-only
/// workspace; [`WorkspaceError::Io`] when the root itself is unusable.
pub fn resolve_path(
    workspace: &Workspace,
    requested: &str,
    access: Access,
) -> WorkspaceResult<ResolvedPath> {
    let def = workspace.def();

    if access == Access::Write && def.read_only {
        return Err(WorkspaceError::ReadOnly(def.id.clone()));
    }

    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(WorkspaceError::InvalidPath(
            "absolute paths are not permitted".to_string(),
        ));
    }

    let normalized = lexical_normalize(requested_path)?;
    let relative = normalized
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    // The root must exist and canonicalize; a dangling root is an
    // operator error, not a caller error.
    let canonical_root = def.root.canonicalize()?;
    let joined = canonical_root.join(&normalized);

    if !def.follow_symlinks {
        reject_symlinks(&canonical_root, &normalized)?;
    }

    let resolved = canonicalize_existing_prefix(&joined)?;
    if !resolved.starts_with(&canonical_root) {
        return Err(WorkspaceError::InvalidPath(
            "path resolves outside the workspace".to_string(),
        ));
    }

    if !relative.is_empty() && !workspace.globs_permit(&relative) {
        return Err(WorkspaceError::InvalidPath(format!(
            "path excluded by workspace policy: {relative}"
        )));
    }

    if matches!(access, Access::Read | Access::Write) && !workspace.extension_permitted(&relative) {
        return Err(WorkspaceError::InvalidPath(format!(
            "file extension not permitted: {relative}"
        )));
    }

    Ok(ResolvedPath {
        absolute: resolved,
        relative,
    })
}

/// Normalize a relative path lexically. `.` components drop; `..` pops a
/// previously accepted component and is rejected when nothing is left to
/// pop (that would climb out of the root).
fn lexical_normalize(path: &Path) -> WorkspaceResult<PathBuf> {
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_os_string()),
            Component::CurDir => {},
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(WorkspaceError::InvalidPath(
                        "path traverses outside the workspace".to_string(),
                    ));
                }
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::InvalidPath(
                    "absolute paths are not permitted".to_string(),
                ));
            },
        }
    }
    Ok(parts.iter().collect())
}

/// Reject if any existing component under the root is a symlink.
/// Components that do not exist yet (write targets) cannot be links.
fn reject_symlinks(root: &Path, normalized: &Path) -> WorkspaceResult<()> {
    let mut current = root.to_path_buf();
    for component in normalized.iter() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) => {
                if metadata.file_type().is_symlink() {
                    return Err(WorkspaceError::InvalidPath(format!(
                        "symlinks are not permitted: {}",
                        component.to_string_lossy()
                    )));
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => return Err(WorkspaceError::Io(e)),
        }
    }
    Ok(())
}

/// Canonicalize the deepest existing ancestor, then re-append the
/// not-yet-existing tail (write targets).
fn canonicalize_existing_prefix(path: &Path) -> WorkspaceResult<PathBuf> {
    match path.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let parent = path.parent().ok_or_else(|| {
                WorkspaceError::InvalidPath("path has no parent".to_string())
            })?;
            let tail = path.file_name().ok_or_else(|| {
                WorkspaceError::InvalidPath("path has no final component".to_string())
            })?;
            let resolved_parent = canonicalize_existing_prefix(parent)?;
            Ok(resolved_parent.join(tail))
        },
        Err(e) => Err(WorkspaceError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceDef;

    fn workspace_at(root: &Path) -> Workspace {
        Workspace::new(WorkspaceDef {
            root: root.to_path_buf(),
            ..WorkspaceDef::default()
        })
    }

    #[test]
    fn test_absolute_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_at(dir.path());
        let err = resolve_path(&ws, "/etc/passwd", Access::Read).unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidPath(_)));
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace_at(dir.path());
        for path in ["../x", "a/../../x", "../../../../etc/passwd"] {
            let err = resolve_path(&ws, path, Access::Read).unwrap_err();
            assert!(matches!(err, WorkspaceError::InvalidPath(_)), "{path} must be rejected");
        }
    }

    #[test]
    fn test_internal_dotdot_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();
        let ws = workspace_at(dir.path());
        let resolved = resolve_path(&ws, "sub/../file.txt", Access::Read).unwrap();
        assert_eq!(resolved.relative, "file.txt");
    }

    #[test]
    fn test_accepted_paths_stay_under_canonical_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"x").unwrap();
        let ws = workspace_at(dir.path());

        let resolved = resolve_path(&ws, "a/b/c.txt", Access::Read).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert!(resolved.absolute.starts_with(&root));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_rejected_when_follow_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret"),
            dir.path().join("sub/link-to-etc"),
        )
        .unwrap();

        let ws = workspace_at(dir.path());
        let err = resolve_path(&ws, "sub/link-to-etc", Access::Read).unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidPath(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected_even_when_following() {
        // follow_symlinks = true resolves the link, then the prefix check
        // catches the escape.
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"x").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret"),
            dir.path().join("link"),
        )
        .unwrap();

        let ws = Workspace::new(WorkspaceDef {
            root: dir.path().to_path_buf(),
            follow_symlinks: true,
            ..WorkspaceDef::default()
        });
        let err = resolve_path(&ws, "link", Access::Read).unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidPath(_)));
    }

    #[test]
    fn test_write_to_read_only_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(WorkspaceDef {
            root: dir.path().to_path_buf(),
            read_only: true,
            ..WorkspaceDef::default()
        });
        let err = resolve_path(&ws, "new.txt", Access::Write).unwrap_err();
        assert!(matches!(err, WorkspaceError::ReadOnly(_)));
        // Reads still pass.
        assert!(resolve_path(&ws, "new.txt", Access::Probe).is_ok());
    }

    #[test]
    fn test_write_target_may_not_exist_yet() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ws = workspace_at(dir.path());
        let resolved = resolve_path(&ws, "sub/new-file.txt", Access::Write).unwrap();
        assert_eq!(resolved.relative, "sub/new-file.txt");
    }

    #[test]
    fn test_blocked_glob_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("key.pem"), b"x").unwrap();
        let ws = Workspace::new(WorkspaceDef {
            root: dir.path().to_path_buf(),
            block: vec!["*.pem".to_string()],
            ..WorkspaceDef::default()
        });
        assert!(resolve_path(&ws, "key.pem", Access::Read).is_err());
    }

    #[test]
    fn test_extension_checked_for_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bin.d")).unwrap();
        let ws = Workspace::new(WorkspaceDef {
            root: dir.path().to_path_buf(),
            blocked_extensions: vec!["exe".to_string()],
            ..WorkspaceDef::default()
        });
        assert!(resolve_path(&ws, "tool.exe", Access::Read).is_err());
        // Listing a directory ignores extension policy.
        assert!(resolve_path(&ws, "bin.d", Access::List).is_ok());
    }
}
