use serde::{Deserialize, Serialize};

#[cfg(feature = "schema")]
use schemars::JsonSchema;

use crate::{
    ParamSpec, ResultSpec, Sidecar, Step, StepTemplate, WorkspaceDeclaration, pod::Volume,
};

/// Declarative specification of a task: ordered steps plus everything they
/// declare (parameters, workspaces, results, extra volumes).
///
/// A `TaskSpec` passes through two pure transformations: the resolver
/// replaces every `$(…)` placeholder, then the assembler compiles the
/// resolved spec into a pod. The spec itself never touches the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Ordered steps; execution order is list order.
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_template: Option<StepTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<Sidecar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspaceDeclaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ResultSpec>,
    /// Extra volumes the task declares explicitly, attached verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl TaskSpec {
    /// Find a declared parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Find a declared workspace by name.
    pub fn workspace(&self, name: &str) -> Option<&WorkspaceDeclaration> {
        self.workspaces.iter().find(|w| w.name == name)
    }

    /// Find a step by name.
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::TaskSpec;
    use crate::{ParamSpec, Step};

    #[test]
    fn lookup_helpers_find_declared_entries() {
        let spec = TaskSpec {
            steps: vec![Step::new("build", "golang")],
            params: vec![ParamSpec::new("greeting")],
            ..Default::default()
        };

        assert!(spec.param("greeting").is_some());
        assert!(spec.param("missing").is_none());
        assert!(spec.step("build").is_some());
    }

    #[test]
    fn serde_camel_case_wire_form() {
        let spec = TaskSpec {
            step_template: Some(Default::default()),
            ..Default::default()
        };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("stepTemplate"));
    }
}
