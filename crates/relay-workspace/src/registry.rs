//! Server and client workspace registries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Workspace, WorkspaceDef};
use crate::error::{WorkspaceError, WorkspaceResult};

/// Registry of server workspaces - the ones file operations target.
#[derive(Default)]
pub struct WorkspaceRegistry {
    inner: RwLock<HashMap<String, Arc<Workspace>>>,
}

impl WorkspaceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated from configuration.
    #[must_use]
    pub fn from_defs(defs: Vec<WorkspaceDef>) -> Self {
        let registry = Self::new();
        for def in defs {
            // Config validation already rejected duplicates.
            let _ = registry.register(def);
        }
        registry
    }

    /// Register a workspace. Fails on a duplicate id.
    ///
    /// # Errors
    ///
    /// [`WorkspaceError::Conflict`] when the id is taken.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn register(&self, def: WorkspaceDef) -> WorkspaceResult<()> {
        let mut guard = self.inner.write().expect("workspace registry lock poisoned");
        if guard.contains_key(&def.id) {
            return Err(WorkspaceError::Conflict(format!(
                "workspace already registered: {}",
                def.id
            )));
        }
        info!(workspace = %def.id, root = %def.root.display(), "Registered workspace");
        guard.insert(def.id.clone(), Arc::new(Workspace::new(def)));
        Ok(())
    }

    /// Remove a workspace. Returns whether one was removed.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn unregister(&self, id: &str) -> bool {
        self.inner
            .write()
            .expect("workspace registry lock poisoned")
            .remove(id)
            .is_some()
    }

    /// Fetch a workspace by id.
    ///
    /// # Errors
    ///
    /// [`WorkspaceError::UnknownWorkspace`].
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn get(&self, id: &str) -> WorkspaceResult<Arc<Workspace>> {
        self.inner
            .read()
            .expect("workspace registry lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| WorkspaceError::UnknownWorkspace(id.to_string()))
    }

    /// All registered definitions, sorted by id.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<WorkspaceDef> {
        let mut defs: Vec<WorkspaceDef> = self
            .inner
            .read()
            .expect("workspace registry lock poisoned")
            .values()
            .map(|ws| ws.def().clone())
            .collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs
    }
}

impl std::fmt::Debug for WorkspaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceRegistry").finish_non_exhaustive()
    }
}

/// A client-announced workspace root. Advisory metadata for tools; grants
/// no file access whatsoever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientWorkspace {
    /// Client-chosen id.
    pub id: String,
    /// The root URI the client announced.
    pub uri: String,
    /// Display name.
    pub name: Option<String>,
    /// When the client announced it.
    pub announced_at: DateTime<Utc>,
}

/// Registry of client workspaces.
#[derive(Default)]
pub struct ClientWorkspaceRegistry {
    inner: RwLock<HashMap<String, ClientWorkspace>>,
}

impl ClientWorkspaceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce (upsert) a client workspace.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn announce(&self, id: impl Into<String>, uri: impl Into<String>, name: Option<String>) {
        let id = id.into();
        let entry = ClientWorkspace {
            id: id.clone(),
            uri: uri.into(),
            name,
            announced_at: Utc::now(),
        };
        self.inner
            .write()
            .expect("client workspace lock poisoned")
            .insert(id, entry);
    }

    /// Remove an announcement. Returns whether one was removed.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn remove(&self, id: &str) -> bool {
        self.inner
            .write()
            .expect("client workspace lock poisoned")
            .remove(id)
            .is_some()
    }

    /// All announcements, sorted by id.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ClientWorkspace> {
        let mut entries: Vec<ClientWorkspace> = self
            .inner
            .read()
            .expect("client workspace lock poisoned")
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }
}

impl std::fmt::Debug for ClientWorkspaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientWorkspaceRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str) -> WorkspaceDef {
        WorkspaceDef {
            id: id.to_string(),
            root: std::env::temp_dir(),
            ..WorkspaceDef::default()
        }
    }

    #[test]
    fn test_register_get_unregister() {
        let registry = WorkspaceRegistry::new();
        registry.register(def("docs")).unwrap();

        assert_eq!(registry.get("docs").unwrap().def().id, "docs");
        assert!(matches!(
            registry.get("nope").unwrap_err(),
            WorkspaceError::UnknownWorkspace(_)
        ));

        assert!(registry.unregister("docs"));
        assert!(!registry.unregister("docs"));
    }

    #[test]
    fn test_duplicate_registration_conflicts() {
        let registry = WorkspaceRegistry::new();
        registry.register(def("docs")).unwrap();
        assert!(matches!(
            registry.register(def("docs")).unwrap_err(),
            WorkspaceError::Conflict(_)
        ));
    }

    #[test]
    fn test_client_registry_is_metadata_only() {
        let registry = ClientWorkspaceRegistry::new();
        registry.announce("proj", "file:///home/user/proj", Some("Project".to_string()));
        registry.announce("proj", "file:///home/user/proj2", None);

        let entries = registry.list();
        assert_eq!(entries.len(), 1);
        // Upsert took the newer announcement.
        assert_eq!(entries[0].uri, "file:///home/user/proj2");

        assert!(registry.remove("proj"));
        assert!(registry.list().is_empty());
    }
}
