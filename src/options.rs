/// Configuration options for the [`Inspector`](crate::Inspector).
#[derive(Debug, Clone)]
pub struct InspectorOptions {
    /// Segment size requested from the record store per scan call.
    /// Stores may return fewer records; they never return more.
    /// Default: 1000
    pub page_size: usize,

    /// Upper bound on concurrent history fetches when correlating failures
    /// across many failed instances.
    /// Default: 8
    pub max_concurrent_history_fetches: usize,

    /// Limit applied to instance listings when the caller passes none.
    /// Default: 100
    pub default_list_limit: usize,

    /// Limit applied to history reads when the caller passes none.
    /// `None` returns the full log.
    pub default_history_limit: Option<usize>,

    /// Reject unparsable `created_after`/`created_before` filters instead of
    /// dropping them with a warning.
    /// Default: false
    pub strict_time_filters: bool,
}

impl Default for InspectorOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_concurrent_history_fetches: 8,
            default_list_limit: 100,
            default_history_limit: None,
            strict_time_filters: false,
        }
    }
}
