use crate::providers::ProviderError;

/// Error returned by every inspector operation.
///
/// Resource-absent conditions never reach this type: they are recovered
/// into empty results. What remains is a substrate failure, a cancelled
/// call, or an argument the caller asked to have validated.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl InspectError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InspectError::Cancelled)
    }

    /// True when the failure is a resource-absent condition of the substrate.
    pub fn is_not_found(&self) -> bool {
        matches!(self, InspectError::Provider(e) if e.is_not_found())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, InspectError::Provider(e) if e.is_retryable())
    }
}
