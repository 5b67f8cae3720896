use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::Flag;

/// Concrete storage backing a volume or a workspace binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Pod-lifetime scratch space.
    EmptyDir {},
    /// Pre-provisioned persistent claim.
    PersistentVolumeClaim {
        claim_name: String,
        #[serde(default, skip_serializing_if = "Flag::is_disabled")]
        read_only: Flag,
    },
    /// Config data projected as files.
    ConfigMap { name: String },
    /// Secret projected as files.
    Secret { secret_name: String },
    /// Claim provisioned for the pod's lifetime.
    Ephemeral {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        storage_class_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<String>,
    },
    /// Several config/secret sources merged into one directory.
    Projected {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        config_maps: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        secrets: Vec<String>,
    },
    /// Driver-backed volume.
    Csi {
        driver: String,
        #[serde(default, skip_serializing_if = "Flag::is_disabled")]
        read_only: Flag,
    },
}

impl VolumeSource {
    /// Returns the source shape as a static string.
    pub fn kind(&self) -> &'static str {
        match self {
            VolumeSource::EmptyDir {} => "emptyDir",
            VolumeSource::PersistentVolumeClaim { .. } => "persistentVolumeClaim",
            VolumeSource::ConfigMap { .. } => "configMap",
            VolumeSource::Secret { .. } => "secret",
            VolumeSource::Ephemeral { .. } => "ephemeral",
            VolumeSource::Projected { .. } => "projected",
            VolumeSource::Csi { .. } => "csi",
        }
    }
}

/// Named volume in the pod specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(flatten)]
    pub source: VolumeSource,
}

impl Volume {
    /// Pod-lifetime scratch volume, the shape every implicit volume uses.
    pub fn empty_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::EmptyDir {},
        }
    }
}

/// Mount of a named volume into a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Flag::is_disabled")]
    pub read_only: Flag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

impl VolumeMount {
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only: Flag::disabled(),
            sub_path: None,
        }
    }

    /// Mark the mount read-only (builder-style).
    pub fn read_only(mut self) -> Self {
        self.read_only = Flag::enabled();
        self
    }
}
