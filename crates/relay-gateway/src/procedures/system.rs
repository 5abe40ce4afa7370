//! The `system` namespace: sandboxed filesystem procedures and workspace
//! registration.

use std::path::PathBuf;
use std::sync::Arc;

use relay_core::{GatewayResult, RequestContext};
use relay_workspace::{
    ClientWorkspace, FileContent, FileEncoding, Listing, WorkspaceDef, list_files, path_exists,
    read_file, write_file,
};
use serde::{Deserialize, Serialize};

use super::{Empty, Procedure, ProcedureRegistry, RateClass, wrap};
use crate::error::from_workspace;
use crate::state::Gateway;

pub(super) fn register(registry: &mut ProcedureRegistry) {
    registry.add(Procedure {
        name: "system.listFiles",
        description: "List files in a server workspace",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(list_files_proc),
    });
    registry.add(Procedure {
        name: "system.readFile",
        description: "Read a file from a server workspace",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(read_file_proc),
    });
    registry.add(Procedure {
        name: "system.writeFile",
        description: "Write a file into a server workspace",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(write_file_proc),
    });
    registry.add(Procedure {
        name: "system.pathExists",
        description: "Whether a path exists in a server workspace",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(path_exists_proc),
    });
    registry.add(Procedure {
        name: "system.listWorkspaces",
        description: "List registered server workspaces",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(list_workspaces),
    });
    registry.add(Procedure {
        name: "system.registerWorkspace",
        description: "Register a server workspace",
        auth_required: true,
        admin_only: true,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(register_workspace),
    });
    registry.add(Procedure {
        name: "system.unregisterWorkspace",
        description: "Remove a server workspace registration",
        auth_required: true,
        admin_only: true,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(unregister_workspace),
    });
    registry.add(Procedure {
        name: "system.registerClientWorkspace",
        description: "Announce a client workspace root (advisory)",
        auth_required: true,
        admin_only: false,
        mutation: true,
        rate_class: RateClass::Standard,
        handler: wrap(register_client_workspace),
    });
    registry.add(Procedure {
        name: "system.listClientWorkspaces",
        description: "List client-announced workspace roots",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(list_client_workspaces),
    });
}

fn default_workspace_id() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListFilesInput {
    workspace: String,
    path: String,
    recursive: bool,
    include_directories: bool,
}

impl Default for ListFilesInput {
    fn default() -> Self {
        Self {
            workspace: default_workspace_id(),
            path: String::new(),
            recursive: false,
            include_directories: false,
        }
    }
}

async fn list_files_proc(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: ListFilesInput,
) -> GatewayResult<Listing> {
    let workspace = gateway.workspaces.get(&input.workspace).map_err(from_workspace)?;
    list_files(
        &workspace,
        &input.path,
        input.recursive,
        input.include_directories,
    )
    .map_err(from_workspace)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadFileInput {
    #[serde(default = "default_workspace_id")]
    workspace: String,
    path: String,
    #[serde(default)]
    encoding: FileEncoding,
}

async fn read_file_proc(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: ReadFileInput,
) -> GatewayResult<FileContent> {
    let workspace = gateway.workspaces.get(&input.workspace).map_err(from_workspace)?;
    read_file(&workspace, &input.path, input.encoding).map_err(from_workspace)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteFileInput {
    #[serde(default = "default_workspace_id")]
    workspace: String,
    path: String,
    content: String,
    #[serde(default)]
    encoding: FileEncoding,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Written {
    path: String,
    bytes_written: u64,
}

async fn write_file_proc(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: WriteFileInput,
) -> GatewayResult<Written> {
    let workspace = gateway.workspaces.get(&input.workspace).map_err(from_workspace)?;
    let bytes_written = write_file(&workspace, &input.path, &input.content, input.encoding)
        .map_err(from_workspace)?;
    Ok(Written {
        path: input.path,
        bytes_written,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathExistsInput {
    #[serde(default = "default_workspace_id")]
    workspace: String,
    path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Exists {
    exists: bool,
}

async fn path_exists_proc(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: PathExistsInput,
) -> GatewayResult<Exists> {
    let workspace = gateway.workspaces.get(&input.workspace).map_err(from_workspace)?;
    Ok(Exists {
        exists: path_exists(&workspace, &input.path).map_err(from_workspace)?,
    })
}

async fn list_workspaces(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<Vec<WorkspaceDef>> {
    Ok(gateway.workspaces.list())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterWorkspaceInput {
    id: String,
    root: PathBuf,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    block: Vec<String>,
    #[serde(default)]
    allowed_extensions: Vec<String>,
    #[serde(default)]
    blocked_extensions: Vec<String>,
    #[serde(default)]
    max_file_size: Option<u64>,
    #[serde(default)]
    follow_symlinks: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Registered {
    registered: bool,
}

async fn register_workspace(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: RegisterWorkspaceInput,
) -> GatewayResult<Registered> {
    if !input.root.is_absolute() {
        return Err(relay_core::GatewayError::InvalidArgument(
            "workspace root must be absolute".into(),
        ));
    }
    let defaults = WorkspaceDef::default();
    gateway
        .workspaces
        .register(WorkspaceDef {
            id: input.id,
            root: input.root,
            name: input.name,
            read_only: input.read_only,
            allow: input.allow,
            block: input.block,
            allowed_extensions: input.allowed_extensions,
            blocked_extensions: input.blocked_extensions,
            max_file_size: input.max_file_size.unwrap_or(defaults.max_file_size),
            follow_symlinks: input.follow_symlinks,
            max_entries: defaults.max_entries,
        })
        .map_err(from_workspace)?;
    Ok(Registered { registered: true })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnregisterInput {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Unregistered {
    removed: bool,
}

async fn unregister_workspace(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: UnregisterInput,
) -> GatewayResult<Unregistered> {
    Ok(Unregistered {
        removed: gateway.workspaces.unregister(&input.id),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientWorkspaceInput {
    id: String,
    uri: String,
    #[serde(default)]
    name: Option<String>,
}

async fn register_client_workspace(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: ClientWorkspaceInput,
) -> GatewayResult<Registered> {
    gateway
        .client_workspaces
        .announce(input.id, input.uri, input.name);
    Ok(Registered { registered: true })
}

async fn list_client_workspaces(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<Vec<ClientWorkspace>> {
    Ok(gateway.client_workspaces.list())
}
