use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "schema")]
use schemars::JsonSchema;

/// Read-only facts about the current run, supplied by the reconciliation
/// loop that invokes the compiler.
///
/// `$(context.…)` placeholders resolve from this struct; fields that are
/// unavailable resolve to the empty string rather than erroring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    /// Name of the task definition, if the run references a named task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// Name of this run.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    /// Current retry attempt: 0 on the first try, incremented by the
    /// reconciler each time it re-invokes the compiler.
    #[serde(default)]
    pub retry_count: u32,
}

impl RunContext {
    /// Context for a named run in a namespace.
    pub fn new(run_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Set the task name (builder-style).
    pub fn with_task_name(mut self, name: impl Into<String>) -> Self {
        self.task_name = Some(name.into());
        self
    }

    /// Set the retry attempt (builder-style).
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }
}
