//! Pod assembly.
//!
//! `PodBuilder` turns a fully resolved task spec into a submittable pod in a
//! fixed sequence of phases: template merge, workspace wiring, script
//! materialization, entrypoint lookup, credential setup, step wrapping, init
//! and sidecar placement, volume assembly, deadline derivation, and finally
//! the caller's pod-template overrides. The phase order is load-bearing:
//! overrides come last so they can never displace an implicit mount, and
//! script materialization precedes entrypoint lookup so script steps never
//! hit the image cache.

use std::sync::Arc;

use tracing::{debug, instrument};

use taskpod_model::{
    ENTRYPOINT_BIN, HOME_DIR, LABEL_RUN_NAME, LABEL_TASK_NAME, RunContext, SCRIPTS_DIR, TaskSpec,
    WorkspaceBinding,
    pod::{Container, Pod, PodSpec, Volume, VolumeMount},
};
use taskpod_resolve::{validate_no_unresolved, validate_template_no_unresolved};

use crate::{
    cache::{EntrypointCache, StaticEntrypointCache},
    creds::{CredentialInitializer, CredentialSetup, NoCredentials},
    entrypoint::{prepare_container, wrapper_args},
    error::BuildError,
    scripts,
    settings::{BuildSettings, ResultExtraction},
    sidecars::{any_step_results, results_sidecar, sidecar_container},
    volumes::{
        SCRIPTS_VOLUME, ensure_unique, implicit_volumes, init_implicit_mounts, run_mounts,
        run_volumes, step_implicit_mounts,
    },
    workspaces::{BindingVolumes, WorkspaceVolumes, materialize_all, validate_bindings},
};

/// Deadline factor applied to the run timeout: the pod-level deadline is a
/// backstop behind wrapper-enforced timeouts, so it must comfortably exceed
/// them.
fn deadline_seconds(timeout_ms: Option<u64>) -> i64 {
    match timeout_ms {
        Some(ms) => {
            let padded = ms.saturating_mul(3) / 2;
            padded.div_ceil(1000).min(i64::MAX as u64) as i64
        }
        None => i64::MAX,
    }
}

/// Compiles resolved task specs into pods.
///
/// The cluster-facing collaborators are injected so the assembly itself
/// stays pure and testable: the image cache, the credential initializer and
/// the workspace materializer all have in-memory defaults.
#[derive(Clone)]
pub struct PodBuilder {
    entrypoints: Arc<dyn EntrypointCache>,
    credentials: Arc<dyn CredentialInitializer>,
    workspaces: Arc<dyn WorkspaceVolumes>,
}

impl Default for PodBuilder {
    fn default() -> Self {
        Self {
            entrypoints: Arc::new(StaticEntrypointCache::new()),
            credentials: Arc::new(NoCredentials),
            workspaces: Arc::new(BindingVolumes),
        }
    }
}

impl PodBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the image-metadata cache (builder-style).
    pub fn with_entrypoint_cache(mut self, cache: Arc<dyn EntrypointCache>) -> Self {
        self.entrypoints = cache;
        self
    }

    /// Replace the credential initializer (builder-style).
    pub fn with_credentials(mut self, creds: Arc<dyn CredentialInitializer>) -> Self {
        self.credentials = creds;
        self
    }

    /// Replace the workspace-volume materializer (builder-style).
    pub fn with_workspace_volumes(mut self, ws: Arc<dyn WorkspaceVolumes>) -> Self {
        self.workspaces = ws;
        self
    }

    /// Compile a resolved spec into a pod.
    ///
    /// `spec` must already have passed through the resolver; any surviving
    /// placeholder is rejected up front rather than leaking into container
    /// arguments.
    #[instrument(skip_all, fields(run = %context.run_name, steps = spec.steps.len()))]
    pub fn build(
        &self,
        spec: &TaskSpec,
        bindings: &[WorkspaceBinding],
        context: &RunContext,
        settings: &BuildSettings,
    ) -> Result<Pod, BuildError> {
        validate_no_unresolved(spec)?;
        validate_template_no_unresolved(&settings.pod_template)?;
        if spec.steps.is_empty() {
            return Err(BuildError::InvalidSpec("task declares no steps".into()));
        }

        // 1. fold the step template into every step
        let mut steps: Vec<_> = match &spec.step_template {
            Some(template) => spec.steps.iter().map(|s| template.merged_into(s)).collect(),
            None => spec.steps.clone(),
        };
        let mut sidecars = spec.sidecars.clone();

        // 2. workspaces
        validate_bindings(spec, bindings)?;
        let (ws_volumes, ws_mounts) = materialize_all(spec, bindings, self.workspaces.as_ref())?;

        // 3. inline scripts become files placed by an init container
        let script_payload = scripts::materialize(&mut steps, &mut sidecars);
        let has_scripts = script_payload.is_some();

        // 4. steps that still have no command fall back to image metadata
        for step in &mut steps {
            if step.command.is_empty() {
                let command = self.entrypoints.lookup(&step.image).map_err(|reason| {
                    BuildError::EntrypointLookup {
                        image: step.image.clone(),
                        reason,
                    }
                })?;
                if command.is_empty() {
                    return Err(BuildError::EntrypointLookup {
                        image: step.image.clone(),
                        reason: "image metadata declares no default command".into(),
                    });
                }
                step.command = command;
            }
        }

        // 5. credentials
        let creds = match &settings.service_account {
            Some(sa) => self
                .credentials
                .setup(sa, &context.namespace)
                .map_err(BuildError::Credentials)?,
            None => CredentialSetup::default(),
        };

        // 6. wrap every step in the entrypoint protocol
        let step_count = steps.len();
        let mut containers = Vec::with_capacity(step_count + sidecars.len());
        for (i, step) in steps.iter().enumerate() {
            let task_results = if i + 1 == step_count {
                spec.results.as_slice()
            } else {
                &[]
            };
            let mut c = Container::new(format!("step-{}", step.name), step.image.clone());
            c.command = vec![ENTRYPOINT_BIN.to_string()];
            c.args = wrapper_args(i, step, task_results, &creds.args, settings.hermetic);
            c.env = step.env.clone();
            if c.env.get("HOME").is_none() {
                c.env.push("HOME", HOME_DIR);
            }
            c.working_dir = step.working_dir.clone();
            c.security_context = step.security_context.clone();
            c.volume_mounts = step.volume_mounts.clone();
            c.volume_mounts
                .extend(step_implicit_mounts(&step.name, has_scripts));
            c.volume_mounts.extend(run_mounts(i, step_count));
            c.volume_mounts.extend(ws_mounts.iter().cloned());
            c.volume_mounts.extend(creds.mounts.iter().cloned());
            containers.push(c);
        }

        // 7. init containers: prepare, scripts, native sidecars
        let step_names: Vec<String> = steps.iter().map(|s| s.name.clone()).collect();
        let mut init_containers = vec![prepare_container(&settings.entrypoint_image, &step_names)];
        if let Some(payload) = script_payload {
            let place = scripts::place_scripts_container(&settings.shell_image, payload)
                .mount(VolumeMount::new(SCRIPTS_VOLUME, SCRIPTS_DIR));
            init_containers.push(place);
        }
        let native = settings.native_sidecar_support.is_enabled();
        for sidecar in &sidecars {
            let c = sidecar_container(sidecar, native);
            if native {
                init_containers.push(c);
            } else {
                containers.push(c);
            }
        }
        for c in &mut init_containers {
            for mount in init_implicit_mounts() {
                // keep any purpose-specific mount (prepare writes bin/steps)
                if !c.mounts_volume(&mount.name) {
                    c.volume_mounts.push(mount);
                }
            }
        }
        if settings.result_extraction == ResultExtraction::SidecarLogs
            && (any_step_results(&steps) || !spec.results.is_empty())
        {
            containers.push(results_sidecar(&settings.entrypoint_image, &steps));
        }

        // 8. volumes, overrides last so a template collision is an error
        let mut volumes: Vec<Volume> = implicit_volumes(has_scripts);
        volumes.extend(run_volumes(step_count));
        volumes.extend(spec.volumes.iter().cloned());
        volumes.extend(ws_volumes);
        volumes.extend(creds.volumes);
        volumes.extend(settings.pod_template.volumes.iter().cloned());
        ensure_unique(&volumes)?;

        let mut pod_spec = PodSpec {
            init_containers,
            containers,
            volumes,
            restart_policy: "Never".to_string(),
            active_deadline_seconds: deadline_seconds(settings.timeout_ms),
            service_account_name: settings.service_account.clone(),
            ..Default::default()
        };
        apply_template(&mut pod_spec, settings);

        let mut pod = Pod {
            name: pod_name(context),
            namespace: context.namespace.clone(),
            spec: pod_spec,
            ..Default::default()
        };
        pod.labels.insert(LABEL_RUN_NAME, &context.run_name);
        if let Some(task) = &context.task_name {
            pod.labels.insert(LABEL_TASK_NAME, task);
        }

        debug!(
            pod = %pod.name,
            init = pod.spec.init_containers.len(),
            containers = pod.spec.containers.len(),
            volumes = pod.spec.volumes.len(),
            "assembled pod"
        );
        Ok(pod)
    }
}

/// Pod names are stable per attempt so the reconciler can find its pod and
/// distinguish retries.
fn pod_name(context: &RunContext) -> String {
    if context.retry_count > 0 {
        format!("{}-pod-retry{}", context.run_name, context.retry_count)
    } else {
        format!("{}-pod", context.run_name)
    }
}

fn apply_template(spec: &mut PodSpec, settings: &BuildSettings) {
    let tpl = &settings.pod_template;
    if tpl.is_empty() {
        return;
    }
    spec.node_selector = tpl.node_selector.clone();
    spec.tolerations = tpl.tolerations.clone();
    spec.affinity = tpl.affinity.clone();
    spec.security_context = tpl.security_context.clone();
    spec.dns_policy = tpl.dns_policy.clone();
    spec.scheduler_name = tpl.scheduler_name.clone();
    spec.priority_class_name = tpl.priority_class_name.clone();
    spec.host_network = tpl.host_network;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{PodBuilder, deadline_seconds, pod_name};
    use crate::{
        cache::StaticEntrypointCache,
        error::BuildError,
        settings::BuildSettings,
    };
    use taskpod_model::{
        ResultSpec, RunContext, Step, StepTemplate, TaskSpec, WorkspaceBinding,
        WorkspaceDeclaration,
        pod::{PodTemplate, Volume, VolumeSource},
    };

    fn two_step_spec() -> TaskSpec {
        TaskSpec {
            steps: vec![
                Step::new("build", "golang").with_command(["go", "build"]),
                Step::new("test", "golang").with_command(["go", "test"]),
            ],
            ..Default::default()
        }
    }

    fn ctx() -> RunContext {
        RunContext::new("demo-run", "default").with_task_name("demo")
    }

    #[test]
    fn pod_carries_prepare_init_and_wrapped_steps() {
        let pod = PodBuilder::new()
            .build(&two_step_spec(), &[], &ctx(), &BuildSettings::default())
            .unwrap();

        assert_eq!(pod.name, "demo-run-pod");
        assert_eq!(pod.namespace, "default");
        let prepare = pod.init_container("prepare").unwrap();
        assert!(prepare.mounts_volume("taskpod-internal-workspace"));
        assert!(prepare.mounts_volume_rw("taskpod-internal-artifacts"));
        // prepare's own read-write steps mount must survive the shared wiring
        assert!(prepare.mounts_volume_rw("taskpod-internal-steps"));
        let build = pod.container("step-build").unwrap();
        assert_eq!(build.command, vec!["/taskpod/bin/entrypoint"]);
        assert!(build.args.contains(&"-post_file".to_string()));
        assert_eq!(build.env.get("HOME"), Some("/taskpod/home"));
        assert_eq!(pod.spec.restart_policy, "Never");
        assert_eq!(pod.labels.get("taskpod.dev/run"), Some("demo-run"));
        assert_eq!(pod.labels.get("taskpod.dev/task"), Some("demo"));
    }

    #[test]
    fn run_state_matrix_own_rw_others_ro() {
        let pod = PodBuilder::new()
            .build(&two_step_spec(), &[], &ctx(), &BuildSettings::default())
            .unwrap();

        let build = pod.container("step-build").unwrap();
        assert!(build.mounts_volume_rw("taskpod-internal-run-0"));
        assert!(build.mounts_volume("taskpod-internal-run-1"));
        assert!(!build.mounts_volume_rw("taskpod-internal-run-1"));

        let test = pod.container("step-test").unwrap();
        assert!(test.mounts_volume_rw("taskpod-internal-run-1"));
        assert!(!test.mounts_volume_rw("taskpod-internal-run-0"));
        assert!(pod.volume("taskpod-internal-run-0").is_some());
        assert!(pod.volume("taskpod-internal-run-1").is_some());
    }

    #[test]
    fn only_last_step_extracts_task_results() {
        let mut spec = two_step_spec();
        spec.results = vec![ResultSpec::new("summary")];
        let pod = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap();

        let first = pod.container("step-build").unwrap();
        assert!(!first.args.contains(&"-results".to_string()));
        let last = pod.container("step-test").unwrap();
        let at = last.args.iter().position(|a| a == "-results").unwrap();
        assert_eq!(last.args[at + 1], "summary");
    }

    #[test]
    fn script_step_gets_place_scripts_init() {
        let mut spec = two_step_spec();
        spec.steps[0] = Step::new("build", "bash").with_script("#!/bin/bash\nmake\n");
        let pod = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap();

        let place = pod.init_container("place-scripts").unwrap();
        assert!(place.mounts_volume_rw("taskpod-internal-scripts"));
        let build = pod.container("step-build").unwrap();
        let at = build.args.iter().position(|a| a == "-entrypoint").unwrap();
        assert_eq!(build.args[at + 1], "/taskpod/scripts/script-0");
        assert!(build.mounts_volume("taskpod-internal-scripts"));
    }

    #[test]
    fn commandless_step_uses_the_image_cache() {
        let mut spec = two_step_spec();
        spec.steps[1] = Step::new("test", "golang");

        let err = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::EntrypointLookup { .. }));

        let mut cache = StaticEntrypointCache::new();
        cache.insert("golang", ["/usr/local/go/bin/go"]);
        let pod = PodBuilder::new()
            .with_entrypoint_cache(Arc::new(cache))
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap();
        let test = pod.container("step-test").unwrap();
        let at = test.args.iter().position(|a| a == "-entrypoint").unwrap();
        assert_eq!(test.args[at + 1], "/usr/local/go/bin/go");
    }

    #[test]
    fn sidecar_placement_tracks_cluster_support() {
        let mut spec = two_step_spec();
        spec.sidecars = vec![taskpod_model::Sidecar::new("db", "redis")];

        let emulated = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap();
        assert!(emulated.container("sidecar-db").is_some());
        assert!(emulated.init_container("sidecar-db").is_none());

        let native = PodBuilder::new()
            .build(
                &spec,
                &[],
                &ctx(),
                &BuildSettings::default().with_native_sidecars(),
            )
            .unwrap();
        assert!(native.container("sidecar-db").is_none());
        let sc = native.init_container("sidecar-db").unwrap();
        assert!(sc.restart_policy.is_some());
        assert!(sc.mounts_volume("taskpod-internal-workspace"));
    }

    #[test]
    fn init_containers_share_the_implicit_volumes() {
        let mut spec = two_step_spec();
        spec.steps[0] = Step::new("build", "bash").with_script("#!/bin/bash\nmake\n");
        let pod = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap();

        for name in ["prepare", "place-scripts"] {
            let c = pod.init_container(name).unwrap();
            assert!(c.mounts_volume("taskpod-internal-workspace"), "{name}");
            assert!(c.mounts_volume("taskpod-internal-results"), "{name}");
            assert!(c.mounts_volume("taskpod-internal-steps"), "{name}");
        }
        // place-scripts keeps its read-write scripts mount
        let place = pod.init_container("place-scripts").unwrap();
        assert!(place.mounts_volume_rw("taskpod-internal-scripts"));
    }

    #[test]
    fn sidecar_log_extraction_adds_results_sidecar() {
        let mut spec = two_step_spec();
        spec.results = vec![ResultSpec::new("summary")];
        let pod = PodBuilder::new()
            .build(
                &spec,
                &[],
                &ctx(),
                &BuildSettings::default().with_sidecar_log_results(),
            )
            .unwrap();
        assert!(pod.container("sidecar-log-results").is_some());

        let without = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap();
        assert!(without.container("sidecar-log-results").is_none());
    }

    #[test]
    fn bound_workspace_mounts_into_every_step() {
        let mut spec = two_step_spec();
        spec.workspaces = vec![WorkspaceDeclaration::new("src")];
        let bindings = vec![WorkspaceBinding::new(
            "src",
            VolumeSource::PersistentVolumeClaim {
                claim_name: "src-pvc".into(),
                read_only: Default::default(),
            },
        )];

        let pod = PodBuilder::new()
            .build(&spec, &bindings, &ctx(), &BuildSettings::default())
            .unwrap();
        assert!(pod.volume("ws-src").is_some());
        for name in ["step-build", "step-test"] {
            let c = pod.container(name).unwrap();
            assert!(c.volume_mounts.iter().any(|m| m.mount_path == "/workspace/src"));
        }
    }

    #[test]
    fn template_volume_collision_is_an_error() {
        let settings = BuildSettings {
            pod_template: PodTemplate {
                volumes: vec![Volume::empty_dir("taskpod-internal-home")],
                ..Default::default()
            },
            ..Default::default()
        };
        let err = PodBuilder::new()
            .build(&two_step_spec(), &[], &ctx(), &settings)
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateVolume(name) if name == "taskpod-internal-home"));
    }

    #[test]
    fn template_with_unresolved_placeholder_is_rejected() {
        let mut tpl = PodTemplate::default();
        tpl.node_selector.insert("pool".into(), "$(params.pool)".into());
        let settings = BuildSettings {
            pod_template: tpl,
            ..Default::default()
        };
        let err = PodBuilder::new()
            .build(&two_step_spec(), &[], &ctx(), &settings)
            .unwrap_err();
        assert!(matches!(err, BuildError::Unresolved(_)));
    }

    #[test]
    fn template_volume_with_invalid_name_is_rejected() {
        let settings = BuildSettings {
            pod_template: PodTemplate {
                volumes: vec![Volume::empty_dir("Not_A_Label")],
                ..Default::default()
            },
            ..Default::default()
        };
        let err = PodBuilder::new()
            .build(&two_step_spec(), &[], &ctx(), &settings)
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidVolumeName(name) if name == "Not_A_Label"));
    }

    #[test]
    fn template_scheduling_fields_land_on_the_pod() {
        let mut tpl = PodTemplate::default();
        tpl.node_selector.insert("disktype".into(), "ssd".into());
        tpl.scheduler_name = Some("custom".into());
        let settings = BuildSettings {
            pod_template: tpl,
            ..Default::default()
        };

        let pod = PodBuilder::new()
            .build(&two_step_spec(), &[], &ctx(), &settings)
            .unwrap();
        assert_eq!(pod.spec.node_selector.get("disktype").map(String::as_str), Some("ssd"));
        assert_eq!(pod.spec.scheduler_name.as_deref(), Some("custom"));
    }

    #[test]
    fn step_template_merges_before_wrapping() {
        let mut spec = two_step_spec();
        spec.step_template = Some(StepTemplate {
            working_dir: Some("/workspace/src".into()),
            ..Default::default()
        });
        let pod = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap();
        assert_eq!(
            pod.container("step-build").unwrap().working_dir.as_deref(),
            Some("/workspace/src")
        );
    }

    #[test]
    fn deadline_is_padded_timeout_or_unbounded() {
        assert_eq!(deadline_seconds(None), i64::MAX);
        // 10 min padded by half is 15 min
        assert_eq!(deadline_seconds(Some(600_000)), 900);
        // sub-second remainders round up
        assert_eq!(deadline_seconds(Some(1_000)), 2);
    }

    #[test]
    fn retries_get_their_own_pod_name() {
        assert_eq!(pod_name(&ctx()), "demo-run-pod");
        assert_eq!(pod_name(&ctx().with_retry_count(2)), "demo-run-pod-retry2");
    }

    #[test]
    fn empty_spec_is_rejected() {
        let err = PodBuilder::new()
            .build(&TaskSpec::default(), &[], &ctx(), &BuildSettings::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidSpec(_)));
    }

    #[test]
    fn unresolved_placeholder_is_rejected() {
        let spec = TaskSpec {
            steps: vec![Step::new("build", "golang").with_command(["$(params.tool)"])],
            ..Default::default()
        };
        let err = PodBuilder::new()
            .build(&spec, &[], &ctx(), &BuildSettings::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::Unresolved(_)));
    }
}
