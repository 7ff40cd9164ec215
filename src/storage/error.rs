//! Error types for storage operations

use std::fmt;

use crate::MetricType;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while folding metrics into storage or reading them back
#[derive(Debug)]
pub enum StorageError {
    /// The payload field required by the metric type (or the id) is absent
    MissingField { id: String, field: &'static str },

    /// A payload field that belongs to the other metric type is set
    UnexpectedField { id: String, field: &'static str },

    /// The metric type is neither gauge nor counter
    UnsupportedType(String),

    /// Adding the delta would leave the `i64` range
    CounterOverflow { id: String, total: i64, delta: i64 },

    /// Point lookup miss
    MetricNotFound { kind: MetricType, id: String },

    /// Connection-class database failure that survived the retry budget
    Transient(String),

    /// Database connection could not be established
    ConnectionFailed(String),

    /// Database query failed (not retriable)
    QueryFailed(String),

    /// Schema creation failed
    MigrationFailed(String),

    /// The operation did not finish within its deadline
    Timeout(&'static str),

    /// Snapshot serialization/deserialization error
    SerializationError(String),

    /// A stored value could not be parsed back into its numeric type
    CorruptedValue { id: String, value: String },

    /// I/O error (snapshot file access, etc.)
    IoError(std::io::Error),
}

impl StorageError {
    /// Whether the failure is worth retrying against the same backend
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }

    /// Whether the failure was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StorageError::MissingField { .. }
                | StorageError::UnexpectedField { .. }
                | StorageError::UnsupportedType(_)
                | StorageError::CounterOverflow { .. }
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::MissingField { id, field } if id.is_empty() => {
                write!(f, "missing field: {}", field)
            }
            StorageError::MissingField { id, field } => {
                write!(f, "missing field '{}' for metric {}", field, id)
            }
            StorageError::UnexpectedField { id, field } => {
                write!(f, "unexpected field '{}' for metric {}", field, id)
            }
            StorageError::UnsupportedType(kind) => {
                write!(f, "not supported metric type: {}", kind)
            }
            StorageError::CounterOverflow { id, total, delta } => write!(
                f,
                "counter {} overflows: {} + {} is out of range",
                id, total, delta
            ),
            StorageError::MetricNotFound { kind, id } => {
                write!(f, "metric not found: {} {}", kind, id)
            }
            StorageError::Transient(msg) => {
                write!(f, "storage temporarily unavailable: {}", msg)
            }
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to storage backend: {}", msg)
            }
            StorageError::QueryFailed(msg) => write!(f, "storage query failed: {}", msg),
            StorageError::MigrationFailed(msg) => write!(f, "database migration failed: {}", msg),
            StorageError::Timeout(op) => write!(f, "storage operation timed out: {}", op),
            StorageError::SerializationError(msg) => {
                write!(f, "metric serialization error: {}", msg)
            }
            StorageError::CorruptedValue { id, value } => {
                write!(f, "stored value {:?} of metric {} is corrupted", value, id)
            }
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// SQLSTATE codes of connection-class failures that are worth retrying
#[cfg(feature = "storage-postgres")]
const TRANSIENT_SQLSTATES: &[&str] = &[
    "08000", // connection_exception
    "08003", // connection_does_not_exist
    "08006", // connection_failure
    "08001", // sqlclient_unable_to_establish_sqlconnection
    "08004", // sqlserver_rejected_establishment_of_sqlconnection
    "08007", // transaction_resolution_unknown
    "08P01", // protocol_violation
];

/// Whether a SQLSTATE code belongs to the retriable connection class
#[cfg(feature = "storage-postgres")]
pub fn is_transient_sqlstate(code: &str) -> bool {
    TRANSIENT_SQLSTATES.contains(&code)
}

#[cfg(feature = "storage-postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) if is_transient_sqlstate(&code) => {
                    StorageError::Transient(db_err.to_string())
                }
                _ => StorageError::QueryFailed(db_err.to_string()),
            },
            sqlx::Error::Io(io_err) => StorageError::Transient(io_err.to_string()),
            sqlx::Error::PoolTimedOut => {
                StorageError::Transient("timed out acquiring a pooled connection".to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}
