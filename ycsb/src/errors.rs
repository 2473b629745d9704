use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic, WriteExecutor};

/// Error kinds for binding operations.
///
/// Each kind names one category of failure so callers can decide whether a
/// failure is fatal (configuration), recoverable by a later `init`
/// (connection), or a per-operation backend problem.
///
/// # Examples
///
/// ```rust,ignore
/// use ycsb::errors::{ErrorKind, YcsbError, YcsbResult};
///
/// fn example() -> YcsbResult<()> {
///     Err(YcsbError::new("Invalid writeConcern: 'fast'", ErrorKind::InvalidConfiguration))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Configuration Errors - fatal for the whole run
    /// A configuration property is missing, unparsable or outside its accepted values
    InvalidConfiguration,

    // Connection Errors - the binding is left uninitialized
    /// A connection to an endpoint could not be established
    ConnectionError,
    /// An operation was attempted before a successful `init`
    NotInitialized,
    /// The endpoint has already been closed
    StoreAlreadyClosed,

    // Operation Errors - mapped to a non-zero status by the binding
    /// Error reported by the storage backend
    BackendError,
    /// A document with the same key already exists
    DuplicateKey,
    /// The backend does not understand the requested query shape
    UnsupportedOperation,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidConfiguration => write!(f, "Invalid configuration"),
            ErrorKind::ConnectionError => write!(f, "Connection error"),
            ErrorKind::NotInitialized => write!(f, "Not initialized"),
            ErrorKind::StoreAlreadyClosed => write!(f, "Store already closed"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::DuplicateKey => write!(f, "Duplicate key"),
            ErrorKind::UnsupportedOperation => write!(f, "Unsupported operation"),
        }
    }
}

/// Error type shared by the workload contract and its bindings.
///
/// `YcsbError` carries a message, a kind and an optional cause. The
/// backtrace is captured unresolved and only symbolized when the error is
/// debug-printed, so failed operations in a hot benchmark loop stay cheap.
#[derive(Clone)]
pub struct YcsbError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<YcsbError>>,
    backtrace: Atomic<Backtrace>,
}

impl YcsbError {
    /// Creates a new `YcsbError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        YcsbError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `YcsbError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: YcsbError) -> Self {
        YcsbError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&YcsbError> {
        self.cause.as_deref()
    }
}

impl Display for YcsbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for YcsbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => {
                let trace = self.backtrace.write_with(|bt| {
                    bt.resolve();
                    format!("{:?}", bt)
                });
                write!(f, "{}\n{}", self.message, trace)
            }
        }
    }
}

impl Error for YcsbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// `YcsbResult<T>` is shorthand for `Result<T, YcsbError>`.
pub type YcsbResult<T> = Result<T, YcsbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ycsb_error_new_creates_error() {
        let error = YcsbError::new("An error occurred", ErrorKind::BackendError);
        assert_eq!(error.message, "An error occurred");
        assert_eq!(error.error_kind, ErrorKind::BackendError);
        assert!(error.cause.is_none());
    }

    #[test]
    fn ycsb_error_new_with_cause_creates_error() {
        let cause = YcsbError::new("connection refused", ErrorKind::ConnectionError);
        let error = YcsbError::new_with_cause(
            "Could not open endpoint",
            ErrorKind::ConnectionError,
            cause,
        );
        assert_eq!(error.message(), "Could not open endpoint");
        assert_eq!(error.cause().map(|c| c.message()), Some("connection refused"));
        assert!(error.source().is_some());
    }

    #[test]
    fn ycsb_error_display_is_message_only() {
        let error = YcsbError::new("Nothing updated", ErrorKind::BackendError);
        assert_eq!(error.to_string(), "Nothing updated");
    }

    #[test]
    fn ycsb_error_debug_includes_cause_chain() {
        let cause = YcsbError::new("socket closed", ErrorKind::ConnectionError);
        let error = YcsbError::new_with_cause("insert failed", ErrorKind::BackendError, cause);
        let debug = format!("{:?}", error);
        assert!(debug.starts_with("insert failed"));
        assert!(debug.contains("Caused by: socket closed"));
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidConfiguration.to_string(), "Invalid configuration");
        assert_eq!(ErrorKind::StoreAlreadyClosed.to_string(), "Store already closed");
    }
}
