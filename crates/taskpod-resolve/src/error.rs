use thiserror::Error;

fn format_aggregate(errors: &[ResolveError]) -> String {
    let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} resolution error(s): {}", errors.len(), msgs.join("; "))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown variable: $({0})")]
    UnknownVariable(String),

    #[error("missing value for param '{0}': no binding and no default")]
    MissingParam(String),

    #[error("param '{name}' index {index} out of range (array has {len} elements)")]
    IndexOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("param '{name}' has no key '{key}'")]
    UnknownObjectKey { name: String, key: String },

    #[error("array splat $({0}) must be an entire element of a list field")]
    MisplacedSplat(String),

    #[error("unterminated $( in '{0}'")]
    Unterminated(String),

    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<ResolveError>),
}

impl ResolveError {
    /// Collapse a list of collected errors into a single error value.
    ///
    /// One error is returned as itself; several become [`ResolveError::Aggregate`].
    pub(crate) fn from_collected(mut errors: Vec<ResolveError>) -> Option<ResolveError> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(ResolveError::Aggregate(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ResolveError;

    #[test]
    fn from_collected_passes_single_error_through() {
        let collected = vec![ResolveError::MissingParam("greeting".into())];
        let err = ResolveError::from_collected(collected).unwrap();
        assert!(matches!(err, ResolveError::MissingParam(_)));
    }

    #[test]
    fn from_collected_aggregates_several() {
        let collected = vec![
            ResolveError::MissingParam("a".into()),
            ResolveError::UnknownVariable("params.b".into()),
        ];
        let err = ResolveError::from_collected(collected).unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("2 resolution error(s)"));
        assert!(msg.contains("'a'"));
        assert!(msg.contains("params.b"));
    }

    #[test]
    fn from_collected_empty_is_none() {
        assert!(ResolveError::from_collected(Vec::new()).is_none());
    }
}
