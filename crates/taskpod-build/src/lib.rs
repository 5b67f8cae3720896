//! Compilation of resolved task specs into pods.
//!
//! The input is a [`taskpod_model::TaskSpec`] that has already passed
//! through `taskpod-resolve`; the output is a [`taskpod_model::pod::Pod`]
//! whose step containers all run the entrypoint wrapper so execution order,
//! timeouts and error policy are enforced inside the pod. Assembly is pure:
//! everything cluster-shaped (image metadata, credentials, workspace
//! provisioning) enters through injected collaborator traits.

mod builder;
mod cache;
mod creds;
mod entrypoint;
mod error;
mod scripts;
mod settings;
mod sidecars;
mod volumes;
mod workspaces;

pub use builder::PodBuilder;
pub use cache::{EntrypointCache, StaticEntrypointCache};
pub use creds::{CredentialInitializer, CredentialSetup, NoCredentials};
pub use error::BuildError;
pub use settings::{BuildSettings, ResultExtraction};
pub use workspaces::{BindingVolumes, WorkspaceVolumes};
