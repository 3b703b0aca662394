use thiserror::Error;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt {column} value in row {id}: {reason}")]
    Corrupt {
        column: &'static str,
        id: i64,
        reason: String,
    },
}

/// Failure taxonomy for task execution.
///
/// Every variant is terminal for the round (and hence the task) that raised
/// it; there are no automatic retries. The queue worker maps whatever reaches
/// it onto the task's FAILED state.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No resolvable provider, no base URL, no determinable model.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Upstream returned a non-2xx response. Status and body are preserved
    /// for operator debugging.
    #[error("provider error (HTTP {status}): {body}")]
    Provider { status: u16, body: String },

    /// Transport-level failure: DNS, connect, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// Anything unclassified; logged in detail, surfaced generically.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<StoreError> for ExecutionError {
    fn from(err: StoreError) -> Self {
        ExecutionError::Unexpected(err.to_string())
    }
}

impl ExecutionError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExecutionError::Network(format!("request timed out: {err}"))
        } else {
            ExecutionError::Network(err.to_string())
        }
    }
}
