use pkg_state::StoreError;

/// Why a dependent resource could not be created.
#[derive(Debug, thiserror::Error)]
pub enum DependentError {
    /// The owner's spec cannot be turned into a valid payload. Retrying
    /// without a spec change will fail the same way.
    #[error("invalid owner configuration: {0}")]
    Config(String),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DependentError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, DependentError::Store(e) if e.is_already_exists())
    }
}
