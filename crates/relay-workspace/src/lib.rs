//! Relay Workspace - filesystem procedures confined to registered roots.
//!
//! Two registries exist side by side:
//!
//! - **server workspaces** grant actual file access under admin-configured
//!   roots, subject to containment, glob, extension, size, and read-only
//!   policy;
//! - **client workspaces** are remote MCP-style roots a client announces -
//!   purely advisory metadata, never file access.
//!
//! The containment check is the security boundary: relative paths only,
//! lexical `..` rejection, symlink policy, and a canonical
//! segment-boundary prefix test against the root. Writes are atomic
//! (temp file + rename) so a crash never leaves a truncated file.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod contain;
pub mod error;
pub mod fs_ops;
pub mod registry;

pub use config::{Workspace, WorkspaceDef};
pub use contain::{Access, ResolvedPath, resolve_path};
pub use error::{WorkspaceError, WorkspaceResult};
pub use fs_ops::{
    FileContent, FileEncoding, FileEntry, Listing, list_files, path_exists, read_file, write_file,
};
pub use registry::{ClientWorkspace, ClientWorkspaceRegistry, WorkspaceRegistry};
