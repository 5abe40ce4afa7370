//! Workspace definitions and compiled policy.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// One workspace registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceDef {
    /// Workspace id used in procedure calls.
    pub id: String,
    /// Absolute root path.
    pub root: PathBuf,
    /// Display name.
    pub name: Option<String>,
    /// Reject writes when set.
    pub read_only: bool,
    /// Path allow globs (relative, forward slashes). Empty → allow all.
    pub allow: Vec<String>,
    /// Path block globs.
    pub block: Vec<String>,
    /// Extension allow-list, no leading dot. Empty → all.
    pub allowed_extensions: Vec<String>,
    /// Extension block-list.
    pub blocked_extensions: Vec<String>,
    /// Size cap for reads and writes, bytes.
    pub max_file_size: u64,
    /// Follow symlinks during containment checks.
    pub follow_symlinks: bool,
    /// Recursive listing bound.
    pub max_entries: usize,
}

impl Default for WorkspaceDef {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            root: PathBuf::new(),
            name: None,
            read_only: false,
            allow: Vec::new(),
            block: Vec::new(),
            allowed_extensions: Vec::new(),
            blocked_extensions: Vec::new(),
            max_file_size: 10 * 1024 * 1024,
            follow_symlinks: false,
            max_entries: 10_000,
        }
    }
}

/// A workspace with its glob policy pre-compiled.
#[derive(Debug)]
pub struct Workspace {
    def: WorkspaceDef,
    allow_set: GlobSet,
    block_set: GlobSet,
}

impl Workspace {
    /// Compile a definition. Bad globs are logged and skipped (the config
    /// layer validated them already).
    #[must_use]
    pub fn new(def: WorkspaceDef) -> Self {
        let allow_set = compile_set(&def.allow);
        let block_set = compile_set(&def.block);
        Self {
            def,
            allow_set,
            block_set,
        }
    }

    /// The definition.
    #[must_use]
    pub fn def(&self) -> &WorkspaceDef {
        &self.def
    }

    /// Whether a relative path passes the allow/block globs.
    #[must_use]
    pub fn globs_permit(&self, relative: &str) -> bool {
        if self.block_set.is_match(relative) {
            return false;
        }
        if !self.def.allow.is_empty() && !self.allow_set.is_match(relative) {
            return false;
        }
        true
    }

    /// Whether a file extension passes the extension lists.
    /// Extension-less files pass unless an allow-list is present.
    #[must_use]
    pub fn extension_permitted(&self, relative: &str) -> bool {
        let extension = std::path::Path::new(relative)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension {
            Some(ext) => {
                if self
                    .def
                    .blocked_extensions
                    .iter()
                    .any(|b| b.eq_ignore_ascii_case(&ext))
                {
                    return false;
                }
                self.def.allowed_extensions.is_empty()
                    || self
                        .def
                        .allowed_extensions
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(&ext))
            },
            None => self.def.allowed_extensions.is_empty(),
        }
    }
}

fn compile_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            },
            Err(e) => warn!(pattern = %pattern, error = %e, "Failed to compile workspace glob"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build glob set; treating as empty");
        GlobSet::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(def: WorkspaceDef) -> Workspace {
        Workspace::new(def)
    }

    #[test]
    fn test_globs_block_wins() {
        let ws = workspace(WorkspaceDef {
            allow: vec!["src/**".to_string()],
            block: vec!["src/secret/**".to_string()],
            ..WorkspaceDef::default()
        });
        assert!(ws.globs_permit("src/main.rs"));
        assert!(!ws.globs_permit("src/secret/key.pem"));
        assert!(!ws.globs_permit("README.md"));
    }

    #[test]
    fn test_empty_allow_permits_everything_not_blocked() {
        let ws = workspace(WorkspaceDef::default());
        assert!(ws.globs_permit("anything/at/all.txt"));
    }

    #[test]
    fn test_extension_lists() {
        let ws = workspace(WorkspaceDef {
            allowed_extensions: vec!["md".to_string(), "txt".to_string()],
            blocked_extensions: vec!["md".to_string()],
            ..WorkspaceDef::default()
        });
        // Block beats allow.
        assert!(!ws.extension_permitted("notes.md"));
        assert!(ws.extension_permitted("notes.TXT"));
        assert!(!ws.extension_permitted("binary.exe"));
        // Allow-list present: extension-less files rejected.
        assert!(!ws.extension_permitted("Makefile"));
    }
}
