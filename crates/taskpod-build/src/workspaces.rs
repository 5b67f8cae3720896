use std::collections::HashSet;

use taskpod_model::{
    TaskSpec, WorkspaceBinding, workspace_volume_name,
    pod::{Volume, VolumeMount},
};

use crate::error::BuildError;

/// Collaborator turning a workspace binding into a concrete pod volume.
pub trait WorkspaceVolumes: Send + Sync {
    fn materialize(&self, binding: &WorkspaceBinding) -> Result<Volume, String>;
}

/// Default materializer: the binding's volume source verbatim, named after
/// the declaration.
#[derive(Debug, Default, Clone, Copy)]
pub struct BindingVolumes;

impl WorkspaceVolumes for BindingVolumes {
    fn materialize(&self, binding: &WorkspaceBinding) -> Result<Volume, String> {
        Ok(Volume {
            name: workspace_volume_name(&binding.name),
            source: binding.source.clone(),
        })
    }
}

/// Check bindings against declarations: no double binding, nothing bound
/// that is not declared, nothing required left unbound.
pub(crate) fn validate_bindings(
    spec: &TaskSpec,
    bindings: &[WorkspaceBinding],
) -> Result<(), BuildError> {
    let mut seen = HashSet::new();
    for binding in bindings {
        if !seen.insert(binding.name.as_str()) {
            return Err(BuildError::DuplicateWorkspaceBinding(binding.name.clone()));
        }
        if spec.workspace(&binding.name).is_none() {
            return Err(BuildError::UndeclaredWorkspace(binding.name.clone()));
        }
    }
    for decl in &spec.workspaces {
        if decl.optional.is_disabled() && !seen.contains(decl.name.as_str()) {
            return Err(BuildError::MissingWorkspace(decl.name.clone()));
        }
    }
    Ok(())
}

/// Volumes and per-step mounts for every bound workspace.
pub(crate) fn materialize_all(
    spec: &TaskSpec,
    bindings: &[WorkspaceBinding],
    materializer: &dyn WorkspaceVolumes,
) -> Result<(Vec<Volume>, Vec<VolumeMount>), BuildError> {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    for binding in bindings {
        // validate_bindings ran first; the declaration exists
        let Some(decl) = spec.workspace(&binding.name) else {
            continue;
        };
        let volume =
            materializer
                .materialize(binding)
                .map_err(|reason| BuildError::WorkspaceVolume {
                    name: binding.name.clone(),
                    reason,
                })?;
        let mut mount = VolumeMount::new(volume.name.clone(), decl.mount_path_or_default());
        if decl.read_only.is_enabled() {
            mount = mount.read_only();
        }
        mount.sub_path = binding.sub_path.clone();
        volumes.push(volume);
        mounts.push(mount);
    }
    Ok((volumes, mounts))
}

#[cfg(test)]
mod tests {
    use super::{BindingVolumes, materialize_all, validate_bindings};
    use crate::error::BuildError;
    use taskpod_model::{
        Flag, TaskSpec, WorkspaceBinding, WorkspaceDeclaration, pod::VolumeSource,
    };

    fn spec_with(decls: Vec<WorkspaceDeclaration>) -> TaskSpec {
        TaskSpec {
            workspaces: decls,
            ..Default::default()
        }
    }

    fn bind(name: &str) -> WorkspaceBinding {
        WorkspaceBinding::new(name, VolumeSource::EmptyDir {})
    }

    #[test]
    fn unbound_required_workspace_is_an_error() {
        let spec = spec_with(vec![WorkspaceDeclaration::new("src")]);
        let err = validate_bindings(&spec, &[]).unwrap_err();
        assert!(matches!(err, BuildError::MissingWorkspace(name) if name == "src"));
    }

    #[test]
    fn unbound_optional_workspace_is_fine() {
        let spec = spec_with(vec![WorkspaceDeclaration::new("cache").optional()]);
        assert!(validate_bindings(&spec, &[]).is_ok());
    }

    #[test]
    fn double_binding_is_an_error() {
        let spec = spec_with(vec![WorkspaceDeclaration::new("src")]);
        let err = validate_bindings(&spec, &[bind("src"), bind("src")]).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateWorkspaceBinding(_)));
    }

    #[test]
    fn binding_without_declaration_is_an_error() {
        let spec = spec_with(vec![]);
        let err = validate_bindings(&spec, &[bind("stray")]).unwrap_err();
        assert!(matches!(err, BuildError::UndeclaredWorkspace(_)));
    }

    #[test]
    fn materialized_mount_honors_declaration() {
        let mut decl = WorkspaceDeclaration::new("src");
        decl.read_only = Flag::enabled();
        let spec = spec_with(vec![decl]);

        let (volumes, mounts) =
            materialize_all(&spec, &[bind("src")], &BindingVolumes).unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "ws-src");
        assert_eq!(mounts[0].mount_path, "/workspace/src");
        assert!(mounts[0].read_only.is_enabled());
    }
}
