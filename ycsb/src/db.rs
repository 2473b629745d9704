use crate::errors::YcsbResult;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// Field name to raw byte value mapping of one record.
pub type FieldMap = HashMap<String, Vec<u8>>;

/// Subset of field names an operation should return.
pub type FieldSet = HashSet<String>;

/// Outcome of a workload operation.
///
/// The harness only distinguishes success from failure, so the numeric
/// code is `0` for [`Status::Ok`] and non-zero otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    #[inline]
    pub fn code(&self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

/// A database binding driven by the benchmark harness.
///
/// The harness creates one instance per worker thread, calls [`Db::init`]
/// once before the first operation and [`Db::cleanup`] once after the last.
/// Instances may share connections behind the scenes; each instance is only
/// ever used from its own thread.
///
/// `init` and `cleanup` report failures as errors. An `init` error is fatal
/// for the run. Per-operation failures are reported through [`Status`] so the
/// harness can count them without aborting.
pub trait Db: Send {
    /// Initializes any state for this binding instance.
    fn init(&mut self) -> YcsbResult<()>;

    /// Releases any state held by this binding instance.
    fn cleanup(&mut self) -> YcsbResult<()>;

    /// Reads the record stored under `key`, restricted to `fields` when given.
    fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&FieldSet>,
        result: &mut FieldMap,
    ) -> Status;

    /// Reads up to `record_count` records in key order starting at `start_key`.
    fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<FieldMap>,
    ) -> Status;

    /// Overwrites the given fields of the record stored under `key`.
    fn update(&mut self, table: &str, key: &str, values: &FieldMap) -> Status;

    /// Stores a new record under `key`.
    fn insert(&mut self, table: &str, key: &str, values: &FieldMap) -> Status;

    /// Removes the record stored under `key`.
    fn delete(&mut self, table: &str, key: &str) -> Status;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_ne!(Status::Error.code(), 0);
        assert!(Status::Ok.is_ok());
        assert!(!Status::Error.is_ok());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Ok.to_string(), "OK");
        assert_eq!(Status::Error.to_string(), "ERROR");
    }
}
