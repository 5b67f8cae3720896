//! Step command rewriting: every step container runs the entrypoint wrapper
//! binary, which receives the real command after a `--` separator together
//! with the sequencing flags defined in `taskpod-model`.

use taskpod_model::{
    ARG_ENTRYPOINT, ARG_HERMETIC, ARG_ON_ERROR, ARG_POST_FILE, ARG_RESULTS, ARG_SEPARATOR,
    ARG_STEP_INDEX, ARG_STEP_NAME, ARG_STEP_RESULTS, ARG_TIMEOUT_MS, ARG_WAIT_FILE, BIN_DIR,
    ENTRYPOINT_BIN, Flag, ResultSpec, STEPS_DIR, Step, run_out_file,
    pod::{Container, VolumeMount},
};

use crate::volumes::{BIN_VOLUME, STEPS_VOLUME};

/// Wrapper arguments for the step at `index`.
///
/// Layout: sequencing flags first, credential-initializer args verbatim,
/// then `-entrypoint CMD -- ARGS…` with the step's real invocation. The
/// step's declared command must be non-empty by the time this runs (script
/// materialization and entrypoint lookup have already happened).
pub(crate) fn wrapper_args(
    index: usize,
    step: &Step,
    task_results: &[ResultSpec],
    credential_args: &[String],
    hermetic: Flag,
) -> Vec<String> {
    let mut args = Vec::new();
    if index > 0 {
        args.push(ARG_WAIT_FILE.to_string());
        args.push(run_out_file(index - 1));
    }
    args.push(ARG_POST_FILE.to_string());
    args.push(run_out_file(index));
    args.push(ARG_STEP_INDEX.to_string());
    args.push(index.to_string());
    args.push(ARG_STEP_NAME.to_string());
    args.push(step.name.clone());
    args.push(ARG_ON_ERROR.to_string());
    args.push(step.on_error.as_str().to_string());
    if let Some(timeout_ms) = step.timeout_ms {
        args.push(ARG_TIMEOUT_MS.to_string());
        args.push(timeout_ms.to_string());
    }
    // the last step extracts task-level results
    if !task_results.is_empty() {
        args.push(ARG_RESULTS.to_string());
        args.push(join_names(task_results));
    }
    if !step.results.is_empty() {
        args.push(ARG_STEP_RESULTS.to_string());
        args.push(join_names(&step.results));
    }
    if hermetic.is_enabled() {
        args.push(ARG_HERMETIC.to_string());
    }
    args.extend(credential_args.iter().cloned());

    args.push(ARG_ENTRYPOINT.to_string());
    args.push(step.command[0].clone());
    args.push(ARG_SEPARATOR.to_string());
    args.extend(step.command[1..].iter().cloned());
    args.extend(step.args.iter().cloned());
    args
}

fn join_names(results: &[ResultSpec]) -> String {
    results
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// The `prepare` init container: copies the wrapper binary into the shared
/// bin volume and creates the per-step metadata directories.
pub(crate) fn prepare_container(entrypoint_image: &str, step_names: &[String]) -> Container {
    let mut c = Container::new("prepare", entrypoint_image);
    c.command = vec![
        "/entrypoint".to_string(),
        "init".to_string(),
        ENTRYPOINT_BIN.to_string(),
    ];
    c.args = step_names.to_vec();
    c.volume_mounts = vec![
        VolumeMount::new(BIN_VOLUME, BIN_DIR),
        VolumeMount::new(STEPS_VOLUME, STEPS_DIR),
    ];
    c
}
