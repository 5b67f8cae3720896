//! Inline-script materialization.
//!
//! Steps and sidecars may carry an inline `script` instead of a command. A
//! single `place-scripts` init container writes each script into the shared
//! scripts volume via a shell heredoc before anything else starts; the
//! owning container's command becomes the generated file path.

use taskpod_model::{SCRIPTS_DIR, Sidecar, Step, pod::Container};

const SHEBANG_FALLBACK: &str = "#!/bin/sh\nset -e\n";
const HEREDOC_MARKER: &str = "_eof_taskpod_";

/// Path of the generated file for the `n`-th script in the pod.
fn script_path(n: usize) -> String {
    format!("{SCRIPTS_DIR}/script-{n}")
}

/// Heredoc end marker guaranteed not to occur inside `content`.
fn heredoc_marker(content: &str) -> String {
    let mut marker = HEREDOC_MARKER.to_string();
    let mut i = 0usize;
    while content.contains(&marker) {
        marker = format!("{HEREDOC_MARKER}{i}_");
        i += 1;
    }
    marker
}

fn placement_snippet(path: &str, content: &str) -> String {
    let content = if content.starts_with("#!") {
        content.to_string()
    } else {
        format!("{SHEBANG_FALLBACK}{content}")
    };
    let marker = heredoc_marker(&content);
    let newline = if content.ends_with('\n') { "" } else { "\n" };
    format!(
        "scriptfile=\"{path}\"\n\
         touch ${{scriptfile}} && chmod +x ${{scriptfile}}\n\
         cat > ${{scriptfile}} << '{marker}'\n\
         {content}{newline}{marker}\n"
    )
}

/// Rewrite script-bearing steps and sidecars to execute their generated
/// file, and return the shell payload the `place-scripts` init container
/// runs. `None` when nothing declares a script.
pub(crate) fn materialize(steps: &mut [Step], sidecars: &mut [Sidecar]) -> Option<String> {
    let mut payload = String::new();
    let mut n = 0usize;

    for step in steps.iter_mut() {
        if let Some(script) = step.script.take() {
            let path = script_path(n);
            payload.push_str(&placement_snippet(&path, &script));
            step.command = vec![path];
            n += 1;
        }
    }
    for sidecar in sidecars.iter_mut() {
        if let Some(script) = sidecar.script.take() {
            let path = script_path(n);
            payload.push_str(&placement_snippet(&path, &script));
            sidecar.command = vec![path];
            n += 1;
        }
    }

    (n > 0).then_some(payload)
}

/// The init container that writes all generated scripts.
pub(crate) fn place_scripts_container(shell_image: &str, payload: String) -> Container {
    let mut c = Container::new("place-scripts", shell_image);
    c.command = vec!["sh".to_string(), "-c".to_string(), payload];
    c
}
