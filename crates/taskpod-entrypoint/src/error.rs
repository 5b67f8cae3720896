use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntrypointError {
    #[error("invalid wrapper arguments: {0}")]
    InvalidArgs(String),

    #[error("malformed terminal record at {path}: {source}")]
    Record {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
