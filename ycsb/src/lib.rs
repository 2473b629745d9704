//! # ycsb - workload contract for benchmark bindings
//!
//! The load-driving harness talks to every database through the [`Db`]
//! trait: five record operations (insert, read, update, delete, scan) over a
//! generic record model of table name, string key and field to byte-value
//! map, plus `init`/`cleanup` hooks around a worker's lifetime.
//!
//! ## Module Organization
//!
//! - [`db`] - the [`Db`] trait, [`Status`] and the record types
//! - [`properties`] - the string-valued configuration bag handed to bindings
//! - [`errors`] - error types and result definitions
//! - [`common`] - small shared-state helpers used by bindings

pub mod common;
pub mod db;
pub mod errors;
pub mod properties;

pub use db::{Db, FieldMap, FieldSet, Status};
pub use errors::{ErrorKind, YcsbError, YcsbResult};
pub use properties::Properties;
