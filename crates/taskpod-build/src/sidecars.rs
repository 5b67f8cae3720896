//! Sidecar placement and the results-extraction sidecar.

use taskpod_model::{
    RESULTS_DIR, RUN_DIR, STEPS_DIR, Sidecar, Step,
    pod::{Container, ContainerRestartPolicy, VolumeMount},
};

use crate::volumes::{RESULTS_VOLUME, STEPS_VOLUME, run_mounts};

/// Convert a sidecar spec into a plain container.
///
/// When `native` is set the container goes into the init list with an
/// always-restart policy: the cluster starts it before the steps and
/// supervises it independently. Otherwise it is appended after the step
/// containers and the wrapper protocol keeps the pod alive while it runs.
pub(crate) fn sidecar_container(sidecar: &Sidecar, native: bool) -> Container {
    let mut c = Container::new(format!("sidecar-{}", sidecar.name), sidecar.image.clone());
    c.command = sidecar.command.clone();
    c.args = sidecar.args.clone();
    c.env = sidecar.env.clone();
    c.working_dir = sidecar.working_dir.clone();
    c.security_context = sidecar.security_context.clone();
    c.volume_mounts = sidecar.volume_mounts.clone();
    if native {
        c.restart_policy = Some(ContainerRestartPolicy::Always);
    }
    c
}

/// The `sidecar-log-results` container: tails every step's declared result
/// files from the shared run-state volumes and emits them as structured
/// lines for external capture.
pub(crate) fn results_sidecar(entrypoint_image: &str, steps: &[Step]) -> Container {
    let mut c = Container::new("sidecar-log-results", entrypoint_image);
    c.command = vec![
        "/entrypoint".to_string(),
        "sidecar-logs".to_string(),
        RUN_DIR.to_string(),
    ];
    // one "<step>=<result,…>" argument per step that declares results
    c.args = steps
        .iter()
        .filter(|s| !s.results.is_empty())
        .map(|s| {
            let names: Vec<&str> = s.results.iter().map(|r| r.name.as_str()).collect();
            format!("{}={}", s.name, names.join(","))
        })
        .collect();
    // read-only view of every run-state volume plus the result directories
    c.volume_mounts = run_mounts(usize::MAX, steps.len());
    c.volume_mounts
        .push(VolumeMount::new(STEPS_VOLUME, STEPS_DIR).read_only());
    c.volume_mounts
        .push(VolumeMount::new(RESULTS_VOLUME, RESULTS_DIR).read_only());
    c
}

/// Whether any step declares a result the sidecar would need to tail.
pub(crate) fn any_step_results(steps: &[Step]) -> bool {
    steps.iter().any(|s| !s.results.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{any_step_results, results_sidecar, sidecar_container};
    use taskpod_model::{ResultSpec, Sidecar, Step, pod::ContainerRestartPolicy};

    #[test]
    fn native_placement_sets_restart_policy() {
        let sc = Sidecar::new("db", "redis");
        assert_eq!(
            sidecar_container(&sc, true).restart_policy,
            Some(ContainerRestartPolicy::Always)
        );
        assert_eq!(sidecar_container(&sc, false).restart_policy, None);
    }

    #[test]
    fn container_name_is_prefixed() {
        let sc = Sidecar::new("db", "redis");
        assert_eq!(sidecar_container(&sc, false).name, "sidecar-db");
    }

    #[test]
    fn results_sidecar_tails_declaring_steps_only() {
        let mut with = Step::new("build", "golang");
        with.results = vec![ResultSpec::new("digest"), ResultSpec::new("size")];
        let without = Step::new("lint", "golang");
        let steps = vec![with, without];

        assert!(any_step_results(&steps));
        let c = results_sidecar("taskpod/entrypoint:latest", &steps);
        assert_eq!(c.args, vec!["build=digest,size"]);
        // every run volume mounted read-only
        assert_eq!(
            c.volume_mounts
                .iter()
                .filter(|m| m.name.starts_with("taskpod-internal-run-"))
                .count(),
            2
        );
        assert!(c.volume_mounts.iter().all(|m| m.read_only.is_enabled()));
    }
}
