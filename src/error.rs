use thiserror::Error;

/// Crate-wide error type. Variants are split along the lines §7 of the
/// design draws between error kinds, so callers can match on them to
/// decide retry-vs-terminal behavior without string matching.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid Agent spec: {0}")]
    Validation(String),

    #[error("unmet precondition: {0}")]
    Precondition(String),

    #[error("Agent resource has no namespace set")]
    MissingNamespace,
}

impl Error {
    /// Terminal errors transition the Agent to `Failed` rather than being
    /// retried by the work queue (spec §7: validation and precondition
    /// errors are not transient).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Precondition(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
