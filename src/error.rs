use mongodb::error::ErrorKind;

/// Result alias used by every store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// Everything a measurement store can fail with.
///
/// A negative write acknowledgement is not an error: `insert` reports it as
/// `None` and `delete` as `false`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document store cannot be reached.
    #[error("cannot reach measurement store: {0}")]
    Connection(String),

    /// No measurement has the requested id.
    #[error("measurement not found: {0}")]
    NotFound(String),

    /// A query criterion could not be coerced to the type it needs.
    #[error("malformed criteria `{field}`: {reason}")]
    MalformedCriteria { field: String, reason: String },

    /// A record was refused at insert because it could not be read back.
    #[error("invalid measurement `{field}`: {reason}")]
    InvalidRecord { field: String, reason: String },

    /// Any other driver failure, tagged with the operation that hit it.
    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// A record could not be encoded for storage or decoded on the way out.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn malformed(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedCriteria {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_record(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidRecord {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Classify a driver error: unreachable servers become `Connection`,
    /// everything else is a `Database` error for `operation`.
    pub fn from_driver(operation: &'static str, err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
                Self::Connection(err.to_string())
            }
            _ => Self::Database {
                operation,
                message: err.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedCriteria { .. })
    }
}
