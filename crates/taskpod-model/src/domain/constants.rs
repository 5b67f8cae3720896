//! Well-known paths and label keys shared by the resolver, the assembler and
//! the entrypoint wrapper.
//!
//! Keeping them here avoids scattering magic strings throughout the codebase:
//! every mount path the assembler wires and every path the wrapper reads at
//! runtime comes from this module.

/// Shared scratch directory mounted into every step, and the default parent
/// for workspace mount paths.
pub const WORKSPACE_DIR: &str = "/workspace";

/// Writable home directory shared by all steps.
pub const HOME_DIR: &str = "/taskpod/home";

/// Directory where task-level result files are written.
pub const RESULTS_DIR: &str = "/taskpod/results";

/// Read-only directory exposing per-step metadata (results, exit codes) to
/// other steps.
pub const STEPS_DIR: &str = "/taskpod/steps";

/// Shared directory for produced artifacts.
pub const ARTIFACTS_DIR: &str = "/taskpod/artifacts";

/// Directory the `place-scripts` init container materializes inline scripts
/// into.
pub const SCRIPTS_DIR: &str = "/taskpod/scripts";

/// Directory the `prepare` init container copies the entrypoint wrapper into.
pub const BIN_DIR: &str = "/taskpod/bin";

/// Absolute path of the entrypoint wrapper inside every step container.
pub const ENTRYPOINT_BIN: &str = "/taskpod/bin/entrypoint";

/// Parent directory of the per-step run-state volumes. Step `i` owns
/// `/taskpod/run/<i>` read-write and sees every other index read-only.
pub const RUN_DIR: &str = "/taskpod/run";

/// Mount path of the credentials volume; `$(credentials.path)` resolves to
/// this value.
pub const CREDENTIALS_DIR: &str = "/taskpod/creds";

/// Name of the terminal-record file inside a step's run-state directory.
pub const RUN_OUT_FILE: &str = "out";

/// Wrapper argument: file to block on before running (predecessor's
/// terminal record). Absent for step 0.
pub const ARG_WAIT_FILE: &str = "-wait_file";

/// Wrapper argument: file to write this step's terminal record to.
pub const ARG_POST_FILE: &str = "-post_file";

/// Wrapper argument: ordinal index of the step.
pub const ARG_STEP_INDEX: &str = "-step_index";

/// Wrapper argument: step name, used to locate the step's results
/// directory.
pub const ARG_STEP_NAME: &str = "-step_name";

/// Wrapper argument: on-error policy (`stopAndFail` or `continue`).
pub const ARG_ON_ERROR: &str = "-on_error";

/// Wrapper argument: per-step timeout in milliseconds.
pub const ARG_TIMEOUT_MS: &str = "-timeout_ms";

/// Wrapper argument: comma-joined task-level result names to extract.
pub const ARG_RESULTS: &str = "-results";

/// Wrapper argument: comma-joined step-level result names to extract.
pub const ARG_STEP_RESULTS: &str = "-step_results";

/// Wrapper flag: run the real command hermetically.
pub const ARG_HERMETIC: &str = "-hermetic";

/// Wrapper argument introducing the real command; everything after the
/// following `--` separator is the real argument list.
pub const ARG_ENTRYPOINT: &str = "-entrypoint";

/// Separator between wrapper flags and the real arguments.
pub const ARG_SEPARATOR: &str = "--";

/// Pod label carrying the task name.
pub const LABEL_TASK_NAME: &str = "taskpod.dev/task";

/// Pod label carrying the run name.
pub const LABEL_RUN_NAME: &str = "taskpod.dev/run";

/// Run-state directory owned by the step at `index`.
pub fn run_state_dir(index: usize) -> String {
    format!("{RUN_DIR}/{index}")
}

/// Terminal-record file the step at `index` writes when it finishes.
pub fn run_out_file(index: usize) -> String {
    format!("{RUN_DIR}/{index}/{RUN_OUT_FILE}")
}

/// Write target for a task-level result; `$(results.NAME.path)` resolves to
/// this value.
pub fn task_result_path(name: &str) -> String {
    format!("{RESULTS_DIR}/{name}")
}

/// Directory holding the per-step results of the named step, readable by
/// every other step through [`STEPS_DIR`].
pub fn step_results_dir(step_name: &str) -> String {
    format!("{STEPS_DIR}/{step_name}/results")
}

/// Pod volume name backing the named workspace; `$(workspaces.NAME.volume)`
/// resolves to this value and the assembler wires the volume under it.
pub fn workspace_volume_name(workspace: &str) -> String {
    format!("ws-{workspace}")
}
