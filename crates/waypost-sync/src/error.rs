//! Error types for waypost-sync.

/// Result type for waypost-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in waypost-sync.
///
/// The coordinator folds every variant into a cycle outcome: delivery
/// variants become `Retry`, everything else becomes `Failure`. Nothing
/// propagates past `accept_fix` or `run_cycle` as a raised fault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] waypost_store::Error),

    /// Collector not reachable (connect failure, DNS, timeout).
    #[error("Collector not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Collector answered with a negative acknowledgement.
    #[error("Collector rejected request: HTTP {status}")]
    Rejected { status: u16 },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid collector URL.
    #[error("Invalid collector URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Whether this is a recoverable delivery fault.
    ///
    /// Delivery faults are not distinguished further by policy; "network
    /// down" and "server rejected" both come back as a retryable cycle.
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            Error::NotReachable { .. } | Error::Rejected { .. } | Error::Request(_)
        )
    }
}
