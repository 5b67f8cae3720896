//! Step states and the terminal record, the protocol's only wire format.

use std::{
    collections::BTreeMap,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EntrypointError;

/// Lifecycle of one wrapped step.
///
/// `Waiting` and `Running` only ever exist in memory; every state written to
/// an out-file is terminal. `Skipped` and `Cancelled` are derived terminals:
/// a step enters them without its real command ever starting (or finishing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepState {
    Waiting,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
    Cancelled,
}

impl StepState {
    /// Stable string form used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Waiting => "waiting",
            StepState::Running => "running",
            StepState::Succeeded => "succeeded",
            StepState::Failed => "failed",
            StepState::TimedOut => "timedOut",
            StepState::Skipped => "skipped",
            StepState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Waiting | StepState::Running)
    }
}

/// What a step writes to its out-file when it finishes, and what its
/// successor reads to decide whether to run.
///
/// Serialized as camelCase JSON; this shape is the cross-version contract
/// between wrapper binaries sharing a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRecord {
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set when the step failed but its error policy lets the line proceed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tolerated: bool,
    /// Epoch seconds; zero when the step never started.
    #[serde(default)]
    pub started_at: u64,
    #[serde(default)]
    pub finished_at: u64,
    /// Extracted result values, name to content.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, String>,
}

impl TerminalRecord {
    /// A record for a step that never ran.
    pub fn unstarted(state: StepState, reason: impl Into<String>) -> Self {
        Self {
            state,
            exit_code: None,
            reason: Some(reason.into()),
            tolerated: false,
            started_at: 0,
            finished_at: epoch_secs(),
            results: BTreeMap::new(),
        }
    }

    /// Whether the successor may execute after observing this record.
    pub fn should_continue(&self) -> bool {
        self.state == StepState::Succeeded || self.tolerated
    }

    /// Read a record from an out-file.
    pub async fn read(path: &Path) -> Result<Self, EntrypointError> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|source| EntrypointError::Record {
            path: path.display().to_string(),
            source,
        })
    }

    /// Write the record atomically: temp file in the same directory, then
    /// rename, so a polling reader never observes a partial record.
    pub async fn write(&self, path: &Path) -> Result<(), EntrypointError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let bytes = serde_json::to_vec(self).map_err(|source| EntrypointError::Record {
            path: path.display().to_string(),
            source,
        })?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Seconds since the epoch; clock skew degrades to zero rather than erroring.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
