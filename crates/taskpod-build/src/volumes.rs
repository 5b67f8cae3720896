//! Implicit and run-state volume wiring.
//!
//! Every step shares the workspace/home/results/steps/artifacts volumes and
//! gets one run-state volume per step index: its own read-write, every other
//! read-only. The read-only view is what lets a wrapper observe its
//! predecessor's terminal record.

use std::collections::HashSet;

use taskpod_model::{
    ARTIFACTS_DIR, BIN_DIR, HOME_DIR, RESULTS_DIR, SCRIPTS_DIR, STEPS_DIR, WORKSPACE_DIR,
    run_state_dir,
    pod::{Volume, VolumeMount},
};

use crate::error::BuildError;

pub(crate) const WORKSPACE_VOLUME: &str = "taskpod-internal-workspace";
pub(crate) const HOME_VOLUME: &str = "taskpod-internal-home";
pub(crate) const RESULTS_VOLUME: &str = "taskpod-internal-results";
pub(crate) const STEPS_VOLUME: &str = "taskpod-internal-steps";
pub(crate) const ARTIFACTS_VOLUME: &str = "taskpod-internal-artifacts";
pub(crate) const BIN_VOLUME: &str = "taskpod-internal-bin";
pub(crate) const SCRIPTS_VOLUME: &str = "taskpod-internal-scripts";

/// Name of the run-state volume owned by step `index`.
pub(crate) fn run_volume_name(index: usize) -> String {
    format!("taskpod-internal-run-{index}")
}

/// One empty-dir run-state volume per step.
pub(crate) fn run_volumes(step_count: usize) -> Vec<Volume> {
    (0..step_count).map(|i| Volume::empty_dir(run_volume_name(i))).collect()
}

/// Run-state mount matrix for the step at `own`: its own volume read-write,
/// every other read-only.
pub(crate) fn run_mounts(own: usize, step_count: usize) -> Vec<VolumeMount> {
    (0..step_count)
        .map(|i| {
            let mount = VolumeMount::new(run_volume_name(i), run_state_dir(i));
            if i == own { mount } else { mount.read_only() }
        })
        .collect()
}

/// The always-present shared volumes.
pub(crate) fn implicit_volumes(has_scripts: bool) -> Vec<Volume> {
    let mut volumes = vec![
        Volume::empty_dir(WORKSPACE_VOLUME),
        Volume::empty_dir(HOME_VOLUME),
        Volume::empty_dir(RESULTS_VOLUME),
        Volume::empty_dir(STEPS_VOLUME),
        Volume::empty_dir(ARTIFACTS_VOLUME),
        Volume::empty_dir(BIN_VOLUME),
    ];
    if has_scripts {
        volumes.push(Volume::empty_dir(SCRIPTS_VOLUME));
    }
    volumes
}

/// Shared mounts attached to the step at `step_name`.
///
/// The steps directory is read-only except for the step's own sub-path, so
/// cross-step lookups cannot clobber another step's records.
pub(crate) fn step_implicit_mounts(step_name: &str, has_scripts: bool) -> Vec<VolumeMount> {
    let mut mounts = vec![
        VolumeMount::new(WORKSPACE_VOLUME, WORKSPACE_DIR),
        VolumeMount::new(HOME_VOLUME, HOME_DIR),
        VolumeMount::new(RESULTS_VOLUME, RESULTS_DIR),
        VolumeMount::new(STEPS_VOLUME, STEPS_DIR).read_only(),
        {
            let mut own = VolumeMount::new(STEPS_VOLUME, format!("{STEPS_DIR}/{step_name}"));
            own.sub_path = Some(step_name.to_string());
            own
        },
        VolumeMount::new(ARTIFACTS_VOLUME, ARTIFACTS_DIR),
        VolumeMount::new(BIN_VOLUME, BIN_DIR).read_only(),
    ];
    if has_scripts {
        mounts.push(VolumeMount::new(SCRIPTS_VOLUME, SCRIPTS_DIR).read_only());
    }
    mounts
}

/// Shared mounts attached to init containers so they see the same
/// workspace, results and artifacts trees the steps do. The steps tree is
/// read-only: init containers observe records, they never write them.
pub(crate) fn init_implicit_mounts() -> Vec<VolumeMount> {
    vec![
        VolumeMount::new(WORKSPACE_VOLUME, WORKSPACE_DIR),
        VolumeMount::new(HOME_VOLUME, HOME_DIR),
        VolumeMount::new(RESULTS_VOLUME, RESULTS_DIR),
        VolumeMount::new(STEPS_VOLUME, STEPS_DIR).read_only(),
        VolumeMount::new(ARTIFACTS_VOLUME, ARTIFACTS_DIR),
    ]
}

// RFC 1123 label, same rule the API server applies to volume names.
fn is_valid_volume_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// Reject invalid and duplicate volume names across implicit, task-declared,
/// workspace, credential and template volumes.
pub(crate) fn ensure_unique(volumes: &[Volume]) -> Result<(), BuildError> {
    let mut seen = HashSet::new();
    for v in volumes {
        if !is_valid_volume_name(&v.name) {
            return Err(BuildError::InvalidVolumeName(v.name.clone()));
        }
        if !seen.insert(v.name.as_str()) {
            return Err(BuildError::DuplicateVolume(v.name.clone()));
        }
    }
    Ok(())
}
