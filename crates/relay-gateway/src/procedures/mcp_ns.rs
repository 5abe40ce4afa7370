//! The `mcp` namespace: workspace files exposed as resources.
//!
//! Resources use `workspace://<id>/<path>` URIs. The same data backs the
//! `/mcp` wire's native `resources/*` methods.

use std::sync::Arc;

use relay_core::{GatewayError, GatewayResult, RequestContext};
use relay_workspace::{FileEncoding, list_files, read_file};
use serde::{Deserialize, Serialize};

use super::{Empty, Procedure, ProcedureRegistry, RateClass, wrap};
use crate::error::from_workspace;
use crate::state::Gateway;

pub(super) fn register(registry: &mut ProcedureRegistry) {
    registry.add(Procedure {
        name: "mcp.getResources",
        description: "List workspace files as MCP resources",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(get_resources),
    });
    registry.add(Procedure {
        name: "mcp.readResource",
        description: "Read one MCP resource by URI",
        auth_required: true,
        admin_only: false,
        mutation: false,
        rate_class: RateClass::Standard,
        handler: wrap(read_resource),
    });
}

/// One resource listing entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Resource {
    /// `workspace://<id>/<path>`.
    pub(crate) uri: String,
    /// Leaf name.
    pub(crate) name: String,
    /// Best-effort MIME type.
    pub(crate) mime_type: &'static str,
}

/// Best-effort MIME from the extension; text/plain otherwise.
fn mime_type(path: &str) -> &'static str {
    match std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "json" => "application/json",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => "text/plain",
    }
}

/// Enumerate resources across every registered workspace.
pub(crate) fn collect_resources(gateway: &Gateway) -> GatewayResult<Vec<Resource>> {
    let mut resources = Vec::new();
    for def in gateway.workspaces.list() {
        let workspace = gateway.workspaces.get(&def.id).map_err(from_workspace)?;
        let listing = list_files(&workspace, "", true, false).map_err(from_workspace)?;
        for entry in listing.entries {
            resources.push(Resource {
                uri: format!("workspace://{}/{}", def.id, entry.path),
                name: entry
                    .path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&entry.path)
                    .to_string(),
                mime_type: mime_type(&entry.path),
            });
        }
    }
    Ok(resources)
}

/// Split a `workspace://<id>/<path>` URI.
pub(crate) fn parse_resource_uri(uri: &str) -> GatewayResult<(String, String)> {
    let rest = uri.strip_prefix("workspace://").ok_or_else(|| {
        GatewayError::InvalidArgument(format!("unsupported resource URI: {uri}"))
    })?;
    let (workspace, path) = rest.split_once('/').ok_or_else(|| {
        GatewayError::InvalidArgument(format!("resource URI missing a path: {uri}"))
    })?;
    if workspace.is_empty() || path.is_empty() {
        return Err(GatewayError::InvalidArgument(format!(
            "malformed resource URI: {uri}"
        )));
    }
    Ok((workspace.to_string(), path.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceList {
    resources: Vec<Resource>,
}

async fn get_resources(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    _input: Empty,
) -> GatewayResult<ResourceList> {
    Ok(ResourceList {
        resources: collect_resources(&gateway)?,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadResourceInput {
    uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceContents {
    uri: String,
    mime_type: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadResourceOutput {
    contents: Vec<ResourceContents>,
}

async fn read_resource(
    gateway: Arc<Gateway>,
    _ctx: RequestContext,
    input: ReadResourceInput,
) -> GatewayResult<ReadResourceOutput> {
    let (workspace_id, path) = parse_resource_uri(&input.uri)?;
    let workspace = gateway.workspaces.get(&workspace_id).map_err(from_workspace)?;
    let content = read_file(&workspace, &path, FileEncoding::Utf8).map_err(from_workspace)?;
    Ok(ReadResourceOutput {
        contents: vec![ResourceContents {
            mime_type: mime_type(&path),
            uri: input.uri,
            text: content.content,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_uri() {
        let (ws, path) = parse_resource_uri("workspace://docs/guide/intro.md").unwrap();
        assert_eq!(ws, "docs");
        assert_eq!(path, "guide/intro.md");

        assert!(parse_resource_uri("file:///etc/passwd").is_err());
        assert!(parse_resource_uri("workspace://docs").is_err());
        assert!(parse_resource_uri("workspace:///x").is_err());
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type("a/b.json"), "application/json");
        assert_eq!(mime_type("a/b.rs"), "text/plain");
        assert_eq!(mime_type("README.md"), "text/markdown");
    }
}
