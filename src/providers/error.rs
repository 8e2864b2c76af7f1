use std::fmt;

/// Store adapter error with an absent/unavailable classification.
///
/// Adapters return this error type for every substrate call. The inspector
/// uses `kind` to decide whether a failure is a resource-absent condition
/// (recovered locally as an empty result) or a genuine substrate failure
/// (surfaced to the caller).
///
/// # Error Classification
///
/// **NotFound**: table, queue, container, or blob does not exist.
///
/// **Unavailable**: service busy, connection timeouts, network failures.
/// These are `retryable`, but the inspector never retries on its own.
///
/// **Unauthorized**: rejected credentials or missing permissions.
///
/// **Other**: malformed responses, undecodable snapshot rows.
///
/// # Example Usage
///
/// ```rust
/// use taskhub_inspect::providers::ProviderError;
///
/// let missing = ProviderError::not_found("query_segment", "table OrdersHistory does not exist");
/// assert!(missing.is_not_found());
///
/// let busy = ProviderError::retryable("list_queues", "server busy");
/// assert!(busy.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Operation that failed (e.g., "query_segment", "list_queues")
    pub operation: String,
    /// Human-readable error message
    pub message: String,
    pub kind: ProviderErrorKind,
    /// Whether the substrate reported the failure as transient
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    NotFound,
    Unavailable,
    Unauthorized,
    Other,
}

impl ProviderError {
    fn new(operation: impl Into<String>, message: impl Into<String>, kind: ProviderErrorKind) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            kind,
            retryable: kind == ProviderErrorKind::Unavailable,
        }
    }

    /// The table, queue, container, or blob is absent.
    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, message, ProviderErrorKind::NotFound)
    }

    /// Transient substrate failure: throttling, timeouts, dropped connections.
    pub fn retryable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, message, ProviderErrorKind::Unavailable)
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, message, ProviderErrorKind::Other)
    }

    pub fn unauthorized(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, message, ProviderErrorKind::Unauthorized)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Bare messages from adapters are transient failures of an unnamed call.
impl From<String> for ProviderError {
    fn from(message: String) -> Self {
        Self::retryable("unknown", message)
    }
}

impl From<&str> for ProviderError {
    fn from(message: &str) -> Self {
        Self::from(message.to_string())
    }
}

/// Recovers resource-absent failures as empty values.
pub trait NotFoundExt<T> {
    /// Maps a `NotFound` failure to `T::default()`; other results pass through.
    fn default_if_not_found(self) -> Result<T, ProviderError>;
}

impl<T: Default> NotFoundExt<T> for Result<T, ProviderError> {
    fn default_if_not_found(self) -> Result<T, ProviderError> {
        match self {
            Err(e) if e.is_not_found() => {
                tracing::debug!(operation = %e.operation, message = %e.message, "resource absent");
                Ok(T::default())
            }
            other => other,
        }
    }
}
