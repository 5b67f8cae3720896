//! Generic walk over every substitution-eligible string field of a task
//! spec.
//!
//! Both validation and application are visitors over the same walk, so a
//! field is substitution-eligible exactly when it is registered here once.

use taskpod_model::{
    Sidecar, Step, StepTemplate, TaskSpec,
    pod::{PodTemplate, Volume, VolumeMount, VolumeSource},
};

/// Visitor over string-valued fields.
///
/// `list` is distinct from `string` because list elements may be replaced by
/// several elements (array splat); scalar fields never splice.
pub(crate) trait FieldVisitor {
    fn string(&mut self, s: &mut String);
    fn list(&mut self, items: &mut Vec<String>);
}

fn visit_mounts(mounts: &mut [VolumeMount], v: &mut impl FieldVisitor) {
    for m in mounts {
        v.string(&mut m.name);
        v.string(&mut m.mount_path);
        if let Some(sub) = m.sub_path.as_mut() {
            v.string(sub);
        }
    }
}

pub(crate) fn walk_step(step: &mut Step, v: &mut impl FieldVisitor) {
    v.string(&mut step.image);
    v.list(&mut step.command);
    v.list(&mut step.args);
    if let Some(script) = step.script.as_mut() {
        v.string(script);
    }
    if let Some(dir) = step.working_dir.as_mut() {
        v.string(dir);
    }
    for kv in step.env.iter_mut() {
        v.string(kv.value_mut());
    }
    visit_mounts(&mut step.volume_mounts, v);
}

pub(crate) fn walk_sidecar(sidecar: &mut Sidecar, v: &mut impl FieldVisitor) {
    v.string(&mut sidecar.image);
    v.list(&mut sidecar.command);
    v.list(&mut sidecar.args);
    if let Some(script) = sidecar.script.as_mut() {
        v.string(script);
    }
    if let Some(dir) = sidecar.working_dir.as_mut() {
        v.string(dir);
    }
    for kv in sidecar.env.iter_mut() {
        v.string(kv.value_mut());
    }
    visit_mounts(&mut sidecar.volume_mounts, v);
}

pub(crate) fn walk_step_template(template: &mut StepTemplate, v: &mut impl FieldVisitor) {
    v.string(&mut template.image);
    v.list(&mut template.command);
    v.list(&mut template.args);
    if let Some(dir) = template.working_dir.as_mut() {
        v.string(dir);
    }
    for kv in template.env.iter_mut() {
        v.string(kv.value_mut());
    }
    visit_mounts(&mut template.volume_mounts, v);
}

pub(crate) fn walk_volume(volume: &mut Volume, v: &mut impl FieldVisitor) {
    v.string(&mut volume.name);
    match &mut volume.source {
        VolumeSource::EmptyDir {} => {}
        VolumeSource::PersistentVolumeClaim { claim_name, .. } => v.string(claim_name),
        VolumeSource::ConfigMap { name } => v.string(name),
        VolumeSource::Secret { secret_name } => v.string(secret_name),
        VolumeSource::Ephemeral {
            storage_class_name, ..
        } => {
            if let Some(class) = storage_class_name.as_mut() {
                v.string(class);
            }
        }
        VolumeSource::Projected {
            config_maps,
            secrets,
        } => {
            for name in config_maps.iter_mut().chain(secrets.iter_mut()) {
                v.string(name);
            }
        }
        VolumeSource::Csi { driver, .. } => v.string(driver),
    }
}

/// Walk caller-supplied pod-level overrides.
///
/// Affinity is an opaque passthrough and is deliberately not visited.
pub(crate) fn walk_pod_template(template: &mut PodTemplate, v: &mut impl FieldVisitor) {
    for value in template.node_selector.values_mut() {
        v.string(value);
    }
    for toleration in &mut template.tolerations {
        for field in [
            toleration.key.as_mut(),
            toleration.operator.as_mut(),
            toleration.value.as_mut(),
            toleration.effect.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            v.string(field);
        }
    }
    if let Some(policy) = template.dns_policy.as_mut() {
        v.string(policy);
    }
    if let Some(name) = template.scheduler_name.as_mut() {
        v.string(name);
    }
    if let Some(name) = template.priority_class_name.as_mut() {
        v.string(name);
    }
    for volume in &mut template.volumes {
        walk_volume(volume, v);
    }
}

/// Walk the parts of the spec that are not step-scoped.
///
/// Steps are walked separately by the caller because `step.results.…`
/// references resolve against the owning step.
pub(crate) fn walk_shared(spec: &mut TaskSpec, v: &mut impl FieldVisitor) {
    for ws in &mut spec.workspaces {
        if let Some(path) = ws.mount_path.as_mut() {
            v.string(path);
        }
    }
    if let Some(template) = spec.step_template.as_mut() {
        walk_step_template(template, v);
    }
    for sidecar in &mut spec.sidecars {
        walk_sidecar(sidecar, v);
    }
    for volume in &mut spec.volumes {
        walk_volume(volume, v);
    }
}
