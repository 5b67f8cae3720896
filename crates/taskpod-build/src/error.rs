use thiserror::Error;

use taskpod_resolve::ResolveError;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("spec still contains unresolved placeholders: {0}")]
    Unresolved(#[from] ResolveError),

    #[error("entrypoint lookup failed for image '{image}': {reason}")]
    EntrypointLookup { image: String, reason: String },

    #[error("duplicate volume name: {0}")]
    DuplicateVolume(String),

    #[error("invalid volume name: '{0}'")]
    InvalidVolumeName(String),

    #[error("workspace '{0}' is required but not bound")]
    MissingWorkspace(String),

    #[error("workspace binding '{0}' does not match any declaration")]
    UndeclaredWorkspace(String),

    #[error("workspace '{0}' is bound more than once")]
    DuplicateWorkspaceBinding(String),

    #[error("workspace volume for '{name}' could not be materialized: {reason}")]
    WorkspaceVolume { name: String, reason: String },

    #[error("credential initialization failed: {0}")]
    Credentials(String),

    #[error("invalid task spec: {0}")]
    InvalidSpec(String),
}
