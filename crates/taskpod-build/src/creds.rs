use taskpod_model::pod::{Volume, VolumeMount};

/// Volumes, mounts and wrapper arguments produced by credential
/// initialization for one run.
#[derive(Debug, Clone, Default)]
pub struct CredentialSetup {
    pub volumes: Vec<Volume>,
    /// Attached to every step container.
    pub mounts: Vec<VolumeMount>,
    /// Appended to every step's wrapper arguments.
    pub args: Vec<String>,
}

/// Collaborator turning a service account's annotated secrets into
/// credential volumes.
///
/// The implementation that reads cluster secrets lives in the reconciler;
/// the assembler only wires whatever this returns into the pod.
pub trait CredentialInitializer: Send + Sync {
    fn setup(&self, service_account: &str, namespace: &str) -> Result<CredentialSetup, String>;
}

/// No-op initializer used when the caller injects nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialInitializer for NoCredentials {
    fn setup(&self, _service_account: &str, _namespace: &str) -> Result<CredentialSetup, String> {
        Ok(CredentialSetup::default())
    }
}
