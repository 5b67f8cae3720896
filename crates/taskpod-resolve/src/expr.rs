//! Scanning for `$(…)` placeholder expressions inside string fields.
//!
//! The grammar is deliberately small: a placeholder opens with `$(`, closes
//! with the matching `)`, and nesting is balanced. Everything between the
//! parentheses is the expression text handed to the replacement table.

use crate::error::ResolveError;

/// Extract the inner text of every `$(…)` expression in `s`, left to right.
///
/// An opening `$(` without a matching close yields [`ResolveError::Unterminated`];
/// callers collect rather than abort, so all findings for the field are
/// returned alongside the error.
pub(crate) fn extract_expressions(s: &str) -> Result<Vec<String>, ResolveError> {
    let bytes = s.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'(' {
            let start = i + 2;
            let mut depth = 1usize;
            let mut j = start;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth != 0 {
                return Err(ResolveError::Unterminated(s.to_string()));
            }
            found.push(s[start..j - 1].to_string());
            i = j;
        } else {
            i += 1;
        }
    }
    Ok(found)
}

/// Returns the inner expression when `s` is exactly one `$(…)` placeholder
/// and nothing else.
pub(crate) fn strip_exact(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("$(")?.strip_suffix(')')?;
    // reject "$(a) and $(b)" which also starts and ends like a placeholder
    let mut depth = 1i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(inner)
}

/// First dot-separated segment of an expression, e.g. `params` in
/// `params.greeting` or `params["greeting"]`.
pub(crate) fn domain(expr: &str) -> &str {
    let end = expr
        .find(|c| c == '.' || c == '[')
        .unwrap_or(expr.len());
    &expr[..end]
}

/// Whether the expression addresses one of the substitution domains this
/// resolver owns. Anything else is left untouched (e.g. shell `$(…)`
/// command substitution inside scripts).
pub(crate) fn is_substitution_domain(expr: &str) -> bool {
    matches!(
        domain(expr),
        "params" | "workspaces" | "results" | "steps" | "step" | "context" | "credentials"
    )
}
