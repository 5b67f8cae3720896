//! Replacement tables built from the run's bindings.
//!
//! Each substitution domain (params, workspaces, results, context,
//! credentials) contributes keyed entries; applying a table is then a single
//! scan over every string field. Array-valued entries live in a separate map
//! because they splice into list fields instead of substituting text.

use std::collections::HashMap;

use taskpod_model::{
    CREDENTIALS_DIR, Param, ParamValue, RunContext, TaskSpec, WorkspaceBinding,
    step_results_dir, task_result_path, workspace_volume_name,
};

use crate::error::ResolveError;

/// Shape of a declared parameter, kept for precise error reporting when a
/// reference does not match any table key.
#[derive(Debug, Clone)]
enum ParamShape {
    String,
    Array(usize),
    Object,
}

/// All replacements for one run.
#[derive(Debug, Default)]
pub(crate) struct ReplacementTable {
    strings: HashMap<String, String>,
    arrays: HashMap<String, Vec<String>>,
    /// `step.results.NAME.path` entries, valid only inside the owning step.
    step_local: HashMap<String, HashMap<String, String>>,
    shapes: HashMap<String, ParamShape>,
}

/// Key variants a name can be addressed by: dotted, double- and
/// single-quoted bracket form.
fn key_variants(domain: &str, name: &str, suffix: &str) -> [String; 3] {
    [
        format!("{domain}.{name}{suffix}"),
        format!("{domain}[\"{name}\"]{suffix}"),
        format!("{domain}['{name}']{suffix}"),
    ]
}

impl ReplacementTable {
    /// Build the table for a run.
    ///
    /// Collects every binding problem (missing param value with no default)
    /// instead of stopping at the first; the caller folds the collected
    /// errors into one aggregate.
    pub(crate) fn build(
        spec: &TaskSpec,
        params: &[Param],
        workspaces: &[WorkspaceBinding],
        context: &RunContext,
        errors: &mut Vec<ResolveError>,
    ) -> Self {
        let mut table = ReplacementTable::default();
        table.add_params(spec, params, errors);
        table.add_context(context);
        // after params and context so declared mount paths can reference them
        table.add_workspaces(spec, workspaces);
        table.add_results(spec);
        table
            .strings
            .insert("credentials.path".to_string(), CREDENTIALS_DIR.to_string());
        table
    }

    fn insert_string(&mut self, domain: &str, name: &str, suffix: &str, value: &str) {
        for key in key_variants(domain, name, suffix) {
            self.strings.insert(key, value.to_string());
        }
    }

    fn add_params(&mut self, spec: &TaskSpec, params: &[Param], errors: &mut Vec<ResolveError>) {
        for decl in &spec.params {
            let bound = params.iter().find(|p| p.name == decl.name).map(|p| &p.value);
            let value = match bound.or(decl.default.as_ref()) {
                Some(v) => v,
                None => {
                    errors.push(ResolveError::MissingParam(decl.name.clone()));
                    continue;
                }
            };
            match value {
                ParamValue::String(s) => {
                    self.insert_string("params", &decl.name, "", s);
                    self.shapes.insert(decl.name.clone(), ParamShape::String);
                }
                ParamValue::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        self.insert_string("params", &decl.name, &format!("[{i}]"), item);
                    }
                    for key in key_variants("params", &decl.name, "[*]") {
                        self.arrays.insert(key, items.clone());
                    }
                    self.shapes
                        .insert(decl.name.clone(), ParamShape::Array(items.len()));
                }
                ParamValue::Object(map) => {
                    for (key, item) in map {
                        self.insert_string("params", &decl.name, &format!(".{key}"), item);
                    }
                    self.shapes.insert(decl.name.clone(), ParamShape::Object);
                }
            }
        }
    }

    fn add_workspaces(&mut self, spec: &TaskSpec, workspaces: &[WorkspaceBinding]) {
        for decl in &spec.workspaces {
            let binding = workspaces.iter().find(|b| b.name == decl.name);
            let (bound, path) = match binding {
                // declared mount paths may carry params or context
                // placeholders; those entries are already in the table, so
                // the `.path` value is final
                Some(_) => ("true", self.substitute(&decl.mount_path_or_default(), None)),
                // unbound: bound="false", path="" instead of erroring; the
                // assembler rejects unbound non-optional declarations
                None => ("false", String::new()),
            };
            self.insert_string("workspaces", &decl.name, ".bound", bound);
            self.insert_string("workspaces", &decl.name, ".path", &path);
            self.insert_string(
                "workspaces",
                &decl.name,
                ".volume",
                &workspace_volume_name(&decl.name),
            );
            let claim = binding.map(|b| b.claim_name()).unwrap_or("");
            self.insert_string("workspaces", &decl.name, ".claim", claim);
        }
    }

    fn add_results(&mut self, spec: &TaskSpec) {
        for result in &spec.results {
            self.insert_string("results", &result.name, ".path", &task_result_path(&result.name));
        }
        for step in &spec.steps {
            for result in &step.results {
                let path = format!("{}/{}", step_results_dir(&step.name), result.name);
                self.insert_string(
                    &format!("steps.{}.results", step.name),
                    &result.name,
                    ".path",
                    &path,
                );
                let local = self.step_local.entry(step.name.clone()).or_default();
                for key in key_variants("results", &result.name, ".path") {
                    local.insert(format!("step.{key}"), path.clone());
                }
            }
        }
    }

    fn add_context(&mut self, context: &RunContext) {
        let task_name = context.task_name.clone().unwrap_or_default();
        let uid = context.uid.map(|u| u.to_string()).unwrap_or_default();
        self.strings
            .insert("context.task.name".to_string(), task_name);
        self.strings.insert(
            "context.task.retry-count".to_string(),
            context.retry_count.to_string(),
        );
        self.strings
            .insert("context.taskRun.name".to_string(), context.run_name.clone());
        self.strings.insert(
            "context.taskRun.namespace".to_string(),
            context.namespace.clone(),
        );
        self.strings.insert("context.taskRun.uid".to_string(), uid);
    }

    /// Look up a string replacement, checking step-local entries first when
    /// resolving inside the named step.
    pub(crate) fn lookup_string(&self, expr: &str, step: Option<&str>) -> Option<&str> {
        if let Some(step) = step
            && let Some(local) = self.step_local.get(step)
            && let Some(v) = local.get(expr)
        {
            return Some(v);
        }
        self.strings.get(expr).map(String::as_str)
    }

    /// Look up an array (splat) replacement.
    pub(crate) fn lookup_array(&self, expr: &str) -> Option<&[String]> {
        self.arrays.get(expr).map(Vec::as_slice)
    }

    /// Replace every known `$(…)` expression in `s`. Expressions with no
    /// table entry are copied verbatim (e.g. shell command substitution),
    /// which is what keeps resolution idempotent.
    pub(crate) fn substitute(&self, s: &str, step: Option<&str>) -> String {
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(pos) = rest.find("$(") {
            out.push_str(&rest[..pos]);
            let body = &rest[pos + 2..];
            let mut depth = 1usize;
            let mut close = None;
            for (i, b) in body.bytes().enumerate() {
                match b {
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            match close {
                Some(end) => {
                    let inner = &body[..end];
                    match self.lookup_string(inner, step) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[pos..pos + 2 + end + 1]),
                    }
                    rest = &body[end + 1..];
                }
                None => {
                    out.push_str(&rest[pos..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Classify a reference that matched no table key into the most precise
    /// error available.
    pub(crate) fn classify_unknown(&self, expr: &str) -> ResolveError {
        if let Some(rest) = expr.strip_prefix("params.")
            && let Some(open) = rest.find('[')
            && rest.ends_with(']')
        {
            let name = &rest[..open];
            let idx = &rest[open + 1..rest.len() - 1];
            if let (Some(ParamShape::Array(len)), Ok(index)) =
                (self.shapes.get(name), idx.parse::<usize>())
            {
                return ResolveError::IndexOutOfRange {
                    name: name.to_string(),
                    index,
                    len: *len,
                };
            }
        }
        if let Some(rest) = expr.strip_prefix("params.")
            && let Some((name, key)) = rest.split_once('.')
            && matches!(self.shapes.get(name), Some(ParamShape::Object))
        {
            return ResolveError::UnknownObjectKey {
                name: name.to_string(),
                key: key.to_string(),
            };
        }
        ResolveError::UnknownVariable(expr.to_string())
    }
}
