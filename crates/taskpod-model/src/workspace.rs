use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::{Flag, WORKSPACE_DIR, pod::VolumeSource};

/// Workspace declared by a task: a named shared storage area steps can rely
/// on, bound to a concrete volume source at run time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Where the workspace is mounted inside step containers; defaults to
    /// `/workspace/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
    /// Optional workspaces may stay unbound; `$(workspaces.NAME.bound)` then
    /// resolves to `"false"` and `.path` to `""`.
    #[serde(default, skip_serializing_if = "Flag::is_disabled")]
    pub optional: Flag,
    #[serde(default, skip_serializing_if = "Flag::is_disabled")]
    pub read_only: Flag,
}

impl WorkspaceDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Mark the workspace optional (builder-style).
    pub fn optional(mut self) -> Self {
        self.optional = Flag::enabled();
        self
    }

    /// Effective mount path inside step containers.
    pub fn mount_path_or_default(&self) -> String {
        match &self.mount_path {
            Some(path) => path.clone(),
            None => format!("{WORKSPACE_DIR}/{}", self.name),
        }
    }
}

/// Caller-supplied binding of a declared workspace to a concrete volume
/// source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceBinding {
    pub name: String,
    pub source: VolumeSource,
    /// Optional sub-path inside the bound volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

impl WorkspaceBinding {
    pub fn new(name: impl Into<String>, source: VolumeSource) -> Self {
        Self {
            name: name.into(),
            source,
            sub_path: None,
        }
    }

    /// Claim name backing this binding, or `""` when the source is not
    /// claim-backed; `$(workspaces.NAME.claim)` resolves to this value.
    pub fn claim_name(&self) -> &str {
        match &self.source {
            VolumeSource::PersistentVolumeClaim { claim_name, .. } => claim_name,
            _ => "",
        }
    }
}
