//! Connector error types.
//!
//! `RemoteError` is what the RFC client reports. `RfcError` is what the
//! connector reports to its callers: every remote failure is wrapped exactly
//! once in a variant naming the phase that failed.

use thiserror::Error;

pub type RfcResult<T> = Result<T, RfcError>;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RfcError {
    #[error("Failed reading parameters from connection string: {0}")]
    ConnectionString(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to open connection: {0}")]
    Connection(#[source] RemoteError),

    #[error("Failed to start session: {0}")]
    Session(#[source] RemoteError),

    #[error("Failed to create function: {source}")]
    FunctionResolution {
        function: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to populate function input structure: {source}")]
    Population {
        function: String,
        #[source]
        source: RemoteError,
    },

    #[error("Invoking function failed: {source}")]
    Invocation {
        function: String,
        #[source]
        source: RemoteError,
    },

    #[error("Failed to read return values: {source}")]
    ResultExtraction {
        function: String,
        #[source]
        source: RemoteError,
    },

    #[error("Query parameter length should not exceed {max_len} characters, cannot split '{token}'")]
    FilterTooLong { max_len: usize, token: String },

    #[error("Delimiter should be single character, got {0:?}")]
    InvalidDelimiter(String),

    #[error("Repository operation failed: {0}")]
    Repository(#[source] RemoteError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Task execution failed: {0}")]
    Task(String),
}

impl RfcError {
    /// Name of the function module the failure belongs to, if any.
    pub fn function(&self) -> Option<&str> {
        match self {
            RfcError::FunctionResolution { function, .. }
            | RfcError::Population { function, .. }
            | RfcError::Invocation { function, .. }
            | RfcError::ResultExtraction { function, .. } => Some(function),
            _ => None,
        }
    }
}

/// Failure reported by the RFC client library or the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network or protocol level failure.
    #[error("communication failure: {0}")]
    Communication(String),

    #[error("logon failed: {0}")]
    Logon(String),

    /// Exception raised by the function module itself, identified by its key.
    #[error("{key}")]
    Abap { key: String, message: Option<String> },

    /// A field, structure, table or parameter name the remote schema does not know.
    #[error("element {0} of container metadata unknown")]
    UnknownElement(String),

    #[error("cannot convert value for {element}: {message}")]
    Conversion { element: String, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    System(String),
}

impl RemoteError {
    pub fn abap(key: impl Into<String>) -> Self {
        RemoteError::Abap {
            key: key.into(),
            message: None,
        }
    }
}
