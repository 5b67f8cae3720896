use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::{
    Env, ResultSpec, TimeoutMs,
    error::{ModelError, ModelResult},
    pod::{SecurityContext, VolumeMount},
};

/// Policy applied when a step's real command exits non-zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub enum OnError {
    /// Record the failure and skip every downstream step.
    #[default]
    StopAndFail,
    /// Record the failure and let downstream steps run.
    Continue,
}

impl OnError {
    /// Stable string form used in wrapper arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnError::StopAndFail => "stopAndFail",
            OnError::Continue => "continue",
        }
    }
}

impl FromStr for OnError {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim() {
            "stopAndFail" | "" => Ok(OnError::StopAndFail),
            "continue" => Ok(OnError::Continue),
            other => Err(ModelError::UnknownOnError(other.to_string())),
        }
    }
}

/// One ordered unit of work in a task, implemented as one container.
///
/// Every string field may carry `$(…)` placeholders until the resolver has
/// run. A step declares either `command`/`args`, or an inline `script` the
/// assembler materializes into a file, or neither, in which case the default
/// command is looked up from the image metadata cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Env::is_empty")]
    pub env: Env,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Inline script; mutually exclusive with `command` at validation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Results this step alone produces, distinct from task-level results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ResultSpec>,
    /// Per-step limit enforced by the entrypoint wrapper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<TimeoutMs>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
}

impl Step {
    /// Create a named step running the given image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the command (builder-style).
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the args (builder-style).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set an inline script (builder-style).
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}

/// Defaults merged into every step of a task, step fields winning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct StepTemplate {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Env::is_empty")]
    pub env: Env,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl StepTemplate {
    /// Fold template defaults into a step; step-level fields win.
    ///
    /// `env` merges key-wise, `volume_mounts` merge by mount name; scalar and
    /// list fields are taken from the template only when the step leaves them
    /// empty.
    pub fn merged_into(&self, step: &Step) -> Step {
        let mut out = step.clone();
        if out.image.is_empty() {
            out.image = self.image.clone();
        }
        if out.command.is_empty() && out.script.is_none() {
            out.command = self.command.clone();
        }
        if out.args.is_empty() {
            out.args = self.args.clone();
        }
        if out.working_dir.is_none() {
            out.working_dir = self.working_dir.clone();
        }
        out.env = self.env.merged_under(&step.env);

        let mut mounts = self.volume_mounts.clone();
        mounts.retain(|m| !step.volume_mounts.iter().any(|s| s.name == m.name));
        mounts.extend(step.volume_mounts.iter().cloned());
        out.volume_mounts = mounts;

        out
    }
}

/// A container running alongside steps for the run's duration.
///
/// Sidecars are never sequenced by the entrypoint protocol; depending on
/// cluster support the assembler places them either as restartable init
/// containers or after the step containers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Env::is_empty")]
    pub env: Env,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
}

impl Sidecar {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }
}
