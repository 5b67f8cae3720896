//! Execution of one wrapped step: wait, spawn, enforce, record.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use taskpod_model::{
    ARG_ENTRYPOINT, ARG_HERMETIC, ARG_ON_ERROR, ARG_POST_FILE, ARG_RESULTS, ARG_SEPARATOR,
    ARG_STEP_INDEX, ARG_STEP_NAME, ARG_STEP_RESULTS, ARG_TIMEOUT_MS, ARG_WAIT_FILE, Flag, OnError,
    RESULTS_DIR, TimeoutMs, step_results_dir,
};

use crate::{
    error::EntrypointError,
    state::{StepState, TerminalRecord, epoch_secs},
    waiter::{WaitOutcome, wait_for_record},
};

/// Everything one wrapper invocation needs, parsed from the container
/// argument contract the assembler emits.
#[derive(Debug, Clone)]
pub struct StepRunConfig {
    pub step_name: String,
    pub step_index: usize,
    /// Predecessor's out-file; `None` for step 0.
    pub wait_file: Option<PathBuf>,
    /// Own out-file.
    pub post_file: PathBuf,
    pub on_error: OnError,
    pub timeout_ms: Option<TimeoutMs>,
    pub hermetic: Flag,
    /// Real command and its arguments, taken from after the separator.
    pub command: String,
    pub args: Vec<String>,
    /// Task-level result names to extract after a successful run.
    pub task_results: Vec<String>,
    pub results_dir: PathBuf,
    /// Step-local result names, read from the step's own results directory.
    pub step_results: Vec<String>,
    pub step_results_dir: PathBuf,
}

impl StepRunConfig {
    /// Parse the wrapper argument contract.
    ///
    /// The argument vector is exactly what the assembler put on the step
    /// container: sequencing flags, then `-entrypoint CMD -- ARGS…`.
    pub fn from_wrapper_args(args: &[String]) -> Result<Self, EntrypointError> {
        let mut wait_file = None;
        let mut post_file = None;
        let mut step_index = None;
        let mut step_name = None;
        let mut on_error = OnError::default();
        let mut timeout_ms = None;
        let mut hermetic = Flag::disabled();
        let mut task_results = Vec::new();
        let mut step_results = Vec::new();
        let mut command = None;
        let mut real_args = Vec::new();

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            i += 1;
            match flag {
                f if f == ARG_WAIT_FILE => wait_file = Some(PathBuf::from(take(args, &mut i, f)?)),
                f if f == ARG_POST_FILE => post_file = Some(PathBuf::from(take(args, &mut i, f)?)),
                f if f == ARG_STEP_INDEX => {
                    let raw = take(args, &mut i, f)?;
                    step_index = Some(raw.parse::<usize>().map_err(|_| {
                        EntrypointError::InvalidArgs(format!("bad step index '{raw}'"))
                    })?);
                }
                f if f == ARG_STEP_NAME => step_name = Some(take(args, &mut i, f)?.to_string()),
                f if f == ARG_ON_ERROR => {
                    let raw = take(args, &mut i, f)?;
                    on_error = raw
                        .parse()
                        .map_err(|e| EntrypointError::InvalidArgs(format!("{e}")))?;
                }
                f if f == ARG_TIMEOUT_MS => {
                    let raw = take(args, &mut i, f)?;
                    timeout_ms = Some(raw.parse::<TimeoutMs>().map_err(|_| {
                        EntrypointError::InvalidArgs(format!("bad timeout '{raw}'"))
                    })?);
                }
                f if f == ARG_RESULTS => task_results = split_names(take(args, &mut i, f)?),
                f if f == ARG_STEP_RESULTS => step_results = split_names(take(args, &mut i, f)?),
                f if f == ARG_HERMETIC => hermetic = Flag::enabled(),
                f if f == ARG_ENTRYPOINT => {
                    command = Some(take(args, &mut i, f)?.to_string());
                    match args.get(i).map(String::as_str) {
                        Some(s) if s == ARG_SEPARATOR => {
                            real_args = args[i + 1..].to_vec();
                            i = args.len();
                        }
                        None => {}
                        Some(other) => {
                            return Err(EntrypointError::InvalidArgs(format!(
                                "expected '{ARG_SEPARATOR}', got '{other}'"
                            )));
                        }
                    }
                }
                other => {
                    return Err(EntrypointError::InvalidArgs(format!(
                        "unknown flag '{other}'"
                    )));
                }
            }
        }

        let step_name = step_name
            .ok_or_else(|| EntrypointError::InvalidArgs("missing step name".into()))?;
        let config = Self {
            step_results_dir: PathBuf::from(step_results_dir(&step_name)),
            step_name,
            step_index: step_index
                .ok_or_else(|| EntrypointError::InvalidArgs("missing step index".into()))?,
            wait_file,
            post_file: post_file
                .ok_or_else(|| EntrypointError::InvalidArgs("missing post file".into()))?,
            on_error,
            timeout_ms,
            hermetic,
            command: command
                .ok_or_else(|| EntrypointError::InvalidArgs("missing entrypoint".into()))?,
            args: real_args,
            task_results,
            results_dir: PathBuf::from(RESULTS_DIR),
            step_results,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rules: `command` is not empty or whitespace-only.
    pub fn validate(&self) -> Result<(), EntrypointError> {
        if self.command.trim().is_empty() {
            return Err(EntrypointError::InvalidArgs("step command is empty".into()));
        }
        Ok(())
    }

    /// Redirect result extraction to a different directory (builder-style).
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    /// Redirect step-local result extraction (builder-style).
    pub fn with_step_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.step_results_dir = dir.into();
        self
    }
}

fn take<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, EntrypointError> {
    let value = args
        .get(*i)
        .ok_or_else(|| EntrypointError::InvalidArgs(format!("flag '{flag}' missing a value")))?;
    *i += 1;
    Ok(value)
}

fn split_names(csv: &str) -> Vec<String> {
    csv.split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runs one step under the sequencing protocol and writes its terminal
/// record. The returned record is the same one written to the out-file.
pub struct StepRunner {
    config: StepRunConfig,
}

impl StepRunner {
    pub fn new(config: StepRunConfig) -> Result<Self, EntrypointError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[instrument(skip_all, fields(step = %self.config.step_name, index = self.config.step_index))]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<TerminalRecord, EntrypointError> {
        // block on the predecessor, unless this is step 0
        if let Some(wait_file) = &self.config.wait_file {
            match wait_for_record(wait_file, cancel).await? {
                WaitOutcome::Cancelled => {
                    debug!("cancelled while waiting");
                    return self
                        .finish(TerminalRecord::unstarted(
                            StepState::Cancelled,
                            "cancelled while waiting",
                        ))
                        .await;
                }
                WaitOutcome::Ready(prev) => {
                    if !prev.should_continue() {
                        debug!(prev = prev.state.as_str(), "skipping after predecessor");
                        return self
                            .finish(TerminalRecord::unstarted(
                                StepState::Skipped,
                                format!("predecessor finished {}", prev.state.as_str()),
                            ))
                            .await;
                    }
                }
            }
        }

        let started_at = epoch_secs();
        trace!(command = %self.config.command, args = ?self.config.args, "spawning step command");
        let mut child = match Command::new(&self.config.command)
            .args(&self.config.args)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let mut record =
                    TerminalRecord::unstarted(StepState::Failed, format!("spawn failed: {e}"));
                record.started_at = started_at;
                return self.finish(record).await;
            }
        };

        let timeout = async {
            match self.config.timeout_ms {
                Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout);

        let tolerated = self.config.on_error == OnError::Continue;
        let mut record = tokio::select! {
            res = child.wait() => {
                let status = match res {
                    Ok(status) => status,
                    // the record must land even when the wait itself fails,
                    // or the successor blocks forever
                    Err(e) => {
                        let mut record = TerminalRecord::unstarted(
                            StepState::Failed,
                            format!("wait failed: {e}"),
                        );
                        record.started_at = started_at;
                        return self.finish(record).await;
                    }
                };
                match status.code() {
                    Some(0) => {
                        let mut record = TerminalRecord::unstarted(StepState::Succeeded, "exit 0");
                        record.exit_code = Some(0);
                        record.results = self.extract_results().await;
                        record
                    }
                    Some(code) => {
                        let mut record = TerminalRecord::unstarted(
                            StepState::Failed,
                            format!("exit {code}"),
                        );
                        record.exit_code = Some(code);
                        record.tolerated = tolerated;
                        record
                    }
                    None => {
                        let mut record = TerminalRecord::unstarted(
                            StepState::Failed,
                            "terminated by signal",
                        );
                        record.tolerated = tolerated;
                        record
                    }
                }
            }
            _ = &mut timeout => {
                debug!("timeout elapsed; killing step command");
                if let Err(e) = child.kill().await {
                    debug!("failed to kill step command: {e}");
                }
                let mut record = TerminalRecord::unstarted(StepState::TimedOut, "timeout elapsed");
                record.tolerated = tolerated;
                record
            }
            _ = cancel.cancelled() => {
                debug!("cancellation requested; killing step command");
                if let Err(e) = child.kill().await {
                    debug!("failed to kill step command: {e}");
                }
                TerminalRecord::unstarted(StepState::Cancelled, "cancelled while running")
            }
        };
        record.started_at = started_at;
        self.finish(record).await
    }

    async fn finish(&self, record: TerminalRecord) -> Result<TerminalRecord, EntrypointError> {
        record.write(&self.config.post_file).await?;
        debug!(state = record.state.as_str(), "terminal record written");
        Ok(record)
    }

    /// Collect declared result files; absent files are simply not emitted.
    async fn extract_results(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        read_results(&self.config.task_results, &self.config.results_dir, &mut out).await;
        read_results(
            &self.config.step_results,
            &self.config.step_results_dir,
            &mut out,
        )
        .await;
        out
    }
}

async fn read_results(names: &[String], dir: &Path, out: &mut BTreeMap<String, String>) {
    for name in names {
        if let Ok(value) = tokio::fs::read_to_string(dir.join(name)).await {
            out.insert(name.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StepRunConfig, StepRunner};
    use crate::{error::EntrypointError, state::StepState};
    use taskpod_model::OnError;
    use tokio_util::sync::CancellationToken;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_the_full_wrapper_contract() {
        let config = StepRunConfig::from_wrapper_args(&args(&[
            "-wait_file", "/taskpod/run/0/out",
            "-post_file", "/taskpod/run/1/out",
            "-step_index", "1",
            "-step_name", "test",
            "-on_error", "continue",
            "-timeout_ms", "60000",
            "-results", "summary,url",
            "-step_results", "digest",
            "-hermetic",
            "-entrypoint", "go",
            "--", "test", "./...",
        ]))
        .unwrap();

        assert_eq!(config.step_index, 1);
        assert_eq!(config.step_name, "test");
        assert_eq!(config.wait_file.as_deref().unwrap().to_str(), Some("/taskpod/run/0/out"));
        assert_eq!(config.on_error, OnError::Continue);
        assert_eq!(config.timeout_ms, Some(60_000));
        assert_eq!(config.task_results, vec!["summary", "url"]);
        assert_eq!(config.step_results, vec!["digest"]);
        assert!(config.hermetic.is_enabled());
        assert_eq!(config.command, "go");
        assert_eq!(config.args, vec!["test", "./..."]);
        assert_eq!(
            config.step_results_dir.to_str(),
            Some("/taskpod/steps/test/results")
        );
    }

    #[test]
    fn step_zero_needs_no_wait_file() {
        let config = StepRunConfig::from_wrapper_args(&args(&[
            "-post_file", "/taskpod/run/0/out",
            "-step_index", "0",
            "-step_name", "build",
            "-on_error", "stopAndFail",
            "-entrypoint", "make",
        ]))
        .unwrap();
        assert!(config.wait_file.is_none());
        assert!(config.args.is_empty());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = StepRunConfig::from_wrapper_args(&args(&[
            "-post_file", "/out",
            "-step_index", "0",
            "-step_name", "s",
            "-bogus", "x",
            "-entrypoint", "ls",
        ]))
        .unwrap_err();
        assert!(matches!(err, EntrypointError::InvalidArgs(_)));
    }

    #[test]
    fn missing_entrypoint_is_rejected() {
        let err = StepRunConfig::from_wrapper_args(&args(&[
            "-post_file", "/out",
            "-step_index", "0",
            "-step_name", "s",
        ]))
        .unwrap_err();
        assert!(matches!(err, EntrypointError::InvalidArgs(_)));
    }

    fn shell_config(dir: &std::path::Path, script: &str) -> StepRunConfig {
        StepRunConfig::from_wrapper_args(&args(&[
            "-post_file",
            dir.join("out").to_str().unwrap(),
            "-step_index", "0",
            "-step_name", "s",
            "-entrypoint", "/bin/sh",
            "--", "-c", script,
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn successful_run_records_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_config(dir.path(), "exit 0");
        let record = StepRunner::new(config)
            .unwrap()
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.state, StepState::Succeeded);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.should_continue());
    }

    #[tokio::test]
    async fn failure_is_tolerated_only_under_continue() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = shell_config(dir.path(), "exit 3");
        let record = StepRunner::new(config.clone())
            .unwrap()
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.state, StepState::Failed);
        assert_eq!(record.exit_code, Some(3));
        assert!(!record.should_continue());

        config.on_error = OnError::Continue;
        let record = StepRunner::new(config)
            .unwrap()
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert!(record.tolerated);
        assert!(record.should_continue());
    }

    #[tokio::test]
    async fn infrastructure_failure_still_writes_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = StepRunConfig::from_wrapper_args(&args(&[
            "-post_file", out.to_str().unwrap(),
            "-step_index", "0",
            "-step_name", "s",
            "-entrypoint", "/does/not/exist",
        ]))
        .unwrap();

        let record = StepRunner::new(config)
            .unwrap()
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.state, StepState::Failed);
        assert!(!record.should_continue());

        // the successor reads this file; it must exist even though the
        // step command never ran
        let written = crate::state::TerminalRecord::read(&out).await.unwrap();
        assert_eq!(written.state, StepState::Failed);
    }

    #[tokio::test]
    async fn successful_run_extracts_declared_results() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        std::fs::create_dir_all(&results_dir).unwrap();
        std::fs::write(results_dir.join("summary"), "ok").unwrap();

        let mut config = shell_config(dir.path(), "exit 0")
            .with_results_dir(&results_dir);
        config.task_results = vec!["summary".into(), "absent".into()];

        let record = StepRunner::new(config)
            .unwrap()
            .run(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.results.get("summary").map(String::as_str), Some("ok"));
        assert!(!record.results.contains_key("absent"));
    }
}
