//! Error types shared by the store adapters and the aggregator

/// Failure reported by a hot or cold store adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not be reached (connection lost, fault switch, shutdown)
    Unavailable(String),
    /// Key holds a value of the other kind (set vs counter)
    WrongType(String),
    /// Record must be created before it can be modified
    NotFound(String),
    /// Counter increment would exceed `i64::MAX`; the stored value is unchanged
    Overflow(String),
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {}", e),
            StoreError::WrongType(key) => {
                write!(f, "WRONGTYPE operation against key {} holding the wrong kind of value", key)
            }
            StoreError::NotFound(key) => write!(f, "Record not found: {}", key),
            StoreError::Overflow(key) => write!(f, "Counter overflow on {}", key),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned by `Aggregator::ingest` and `Aggregator::query`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    /// Timestamp is not a non-negative integer number of seconds
    InvalidTimestamp(String),
    /// Event fields other than the timestamp are malformed
    InvalidEvent(String),
    HotStoreUnavailable(String),
    ColdStoreUnavailable(String),
    Internal(String),
}

impl AnalyticsError {
    /// True for errors caused by the request itself (never retried)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnalyticsError::InvalidTimestamp(_) | AnalyticsError::InvalidEvent(_)
        )
    }
}

impl std::fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyticsError::InvalidTimestamp(e) => write!(f, "Invalid timestamp: {}", e),
            AnalyticsError::InvalidEvent(e) => write!(f, "Invalid event: {}", e),
            AnalyticsError::HotStoreUnavailable(e) => write!(f, "Hot store unavailable: {}", e),
            AnalyticsError::ColdStoreUnavailable(e) => write!(f, "Cold store unavailable: {}", e),
            AnalyticsError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for AnalyticsError {}
