//! Variable resolver: replaces every `$(…)` placeholder in a task spec.
//!
//! Pure and total: the input spec is never mutated, every substitution
//! domain (params, workspaces, results, context, credentials) is applied
//! across the whole tree in one pass, and all problems are reported together
//! as one aggregated error. Resolving an already-resolved spec is a no-op.

mod error;
pub use error::ResolveError;

mod expr;
mod table;
mod walk;

use tracing::{debug, instrument, trace};

use taskpod_model::{Param, RunContext, TaskSpec, WorkspaceBinding, pod::PodTemplate};

use crate::expr::{extract_expressions, is_substitution_domain, strip_exact};
use crate::table::ReplacementTable;
use crate::walk::{FieldVisitor, walk_pod_template, walk_shared, walk_step};

/// Applies table replacements in place. Runs only after validation, so any
/// expression it cannot look up is foreign (e.g. shell substitution) and is
/// left untouched.
struct Apply<'a> {
    table: &'a ReplacementTable,
    step: Option<&'a str>,
}

impl Apply<'_> {
    fn substituted(&self, s: &str) -> String {
        self.table.substitute(s, self.step)
    }
}

impl FieldVisitor for Apply<'_> {
    fn string(&mut self, s: &mut String) {
        let replaced = self.substituted(s);
        if replaced != *s {
            *s = replaced;
        }
    }

    fn list(&mut self, items: &mut Vec<String>) {
        let mut out = Vec::with_capacity(items.len());
        for item in items.iter() {
            if let Some(inner) = strip_exact(item)
                && let Some(elements) = self.table.lookup_array(inner)
            {
                // splat: one placeholder element becomes N elements in place
                out.extend(elements.iter().cloned());
                continue;
            }
            out.push(self.substituted(item));
        }
        *items = out;
    }
}

/// Collects every reference problem without mutating anything.
struct Validate<'a> {
    table: &'a ReplacementTable,
    step: Option<&'a str>,
    errors: &'a mut Vec<ResolveError>,
}

impl Validate<'_> {
    fn check(&mut self, s: &str, splat_allowed: bool) {
        let exprs = match extract_expressions(s) {
            Ok(exprs) => exprs,
            Err(e) => {
                self.errors.push(e);
                return;
            }
        };
        for expr in exprs {
            if !is_substitution_domain(&expr) {
                continue;
            }
            if self.table.lookup_string(&expr, self.step).is_some() {
                continue;
            }
            if self.table.lookup_array(&expr).is_some() {
                if !(splat_allowed && strip_exact(s) == Some(expr.as_str())) {
                    self.errors.push(ResolveError::MisplacedSplat(expr));
                }
                continue;
            }
            self.errors.push(self.table.classify_unknown(&expr));
        }
    }
}

impl FieldVisitor for Validate<'_> {
    fn string(&mut self, s: &mut String) {
        self.check(s, false);
    }

    fn list(&mut self, items: &mut Vec<String>) {
        for item in items.iter() {
            self.check(item, true);
        }
    }
}

fn dedup(errors: Vec<ResolveError>) -> Vec<ResolveError> {
    let mut out: Vec<ResolveError> = Vec::with_capacity(errors.len());
    for e in errors {
        if !out.contains(&e) {
            out.push(e);
        }
    }
    out
}

/// Resolve every placeholder in `spec` against the run's bindings.
///
/// Parameter defaults declared on the spec apply when no binding is
/// supplied. Returns the fully resolved tree, or one aggregated
/// [`ResolveError`]; the input is never partially mutated.
#[instrument(level = "debug", skip_all, fields(run = %context.run_name, steps = spec.steps.len()))]
pub fn resolve(
    spec: &TaskSpec,
    params: &[Param],
    workspaces: &[WorkspaceBinding],
    context: &RunContext,
) -> Result<TaskSpec, ResolveError> {
    let mut errors = Vec::new();
    let table = ReplacementTable::build(spec, params, workspaces, context, &mut errors);

    let mut resolved = spec.clone();

    for step in &mut resolved.steps {
        let name = step.name.clone();
        let mut validate = Validate {
            table: &table,
            step: Some(&name),
            errors: &mut errors,
        };
        walk_step(step, &mut validate);
    }
    {
        let mut validate = Validate {
            table: &table,
            step: None,
            errors: &mut errors,
        };
        walk_shared(&mut resolved, &mut validate);
    }

    if let Some(err) = ResolveError::from_collected(dedup(errors)) {
        debug!(error = %err, "resolution failed");
        return Err(err);
    }

    for step in &mut resolved.steps {
        let name = step.name.clone();
        let mut apply = Apply {
            table: &table,
            step: Some(&name),
        };
        walk_step(step, &mut apply);
    }
    {
        let mut apply = Apply {
            table: &table,
            step: None,
        };
        walk_shared(&mut resolved, &mut apply);
    }

    trace!("spec fully resolved");
    Ok(resolved)
}

/// Resolve placeholders in caller-supplied pod-level overrides.
///
/// Pod templates never reference step-local results, so the whole template
/// resolves against the shared table. Affinity passes through untouched.
pub fn resolve_pod_template(
    template: &PodTemplate,
    spec: &TaskSpec,
    params: &[Param],
    workspaces: &[WorkspaceBinding],
    context: &RunContext,
) -> Result<PodTemplate, ResolveError> {
    let mut errors = Vec::new();
    let table = ReplacementTable::build(spec, params, workspaces, context, &mut errors);

    let mut resolved = template.clone();
    {
        let mut validate = Validate {
            table: &table,
            step: None,
            errors: &mut errors,
        };
        walk_pod_template(&mut resolved, &mut validate);
    }
    if let Some(err) = ResolveError::from_collected(dedup(errors)) {
        debug!(error = %err, "pod template resolution failed");
        return Err(err);
    }

    let mut apply = Apply {
        table: &table,
        step: None,
    };
    walk_pod_template(&mut resolved, &mut apply);
    Ok(resolved)
}

/// Flags leftover substitution-domain placeholders.
struct Leftover<'a>(&'a mut Vec<ResolveError>);

impl Leftover<'_> {
    fn check(&mut self, s: &str) {
        if let Ok(exprs) = extract_expressions(s) {
            for expr in exprs {
                if is_substitution_domain(&expr) {
                    self.0.push(ResolveError::UnknownVariable(expr));
                }
            }
        }
    }
}

impl FieldVisitor for Leftover<'_> {
    fn string(&mut self, s: &mut String) {
        self.check(s);
    }
    fn list(&mut self, items: &mut Vec<String>) {
        for item in items.iter() {
            self.check(item);
        }
    }
}

/// Assert that no placeholder addressing a substitution domain remains.
///
/// Used by the assembler as a precondition and by tests to check resolution
/// totality.
pub fn validate_no_unresolved(spec: &TaskSpec) -> Result<(), ResolveError> {
    let mut errors = Vec::new();
    let mut scratch = spec.clone();

    for step in &mut scratch.steps {
        let mut visitor = Leftover(&mut errors);
        walk_step(step, &mut visitor);
    }
    let mut visitor = Leftover(&mut errors);
    walk_shared(&mut scratch, &mut visitor);

    match ResolveError::from_collected(dedup(errors)) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Assert that no substitution-domain placeholder remains in a pod template.
pub fn validate_template_no_unresolved(template: &PodTemplate) -> Result<(), ResolveError> {
    let mut errors = Vec::new();
    let mut scratch = template.clone();

    let mut visitor = Leftover(&mut errors);
    walk_pod_template(&mut scratch, &mut visitor);

    match ResolveError::from_collected(dedup(errors)) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
