use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown on-error policy: {0}")]
    UnknownOnError(String),

    #[error("param '{name}' expects a {expected} value, got {actual}")]
    ParamTypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
