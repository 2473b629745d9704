//! # ycsb_mongodb - MongoDB binding for the YCSB workload contract
//!
//! Implements [`ycsb::Db`] on top of the MongoDB driver's blocking API.
//! Records are stored as one document per key, `{_id: key, field: binary,
//! ...}`, in a collection named after the workload table.
//!
//! ## Configuration
//!
//! | key | default | meaning |
//! |-----|---------|---------|
//! | `mongodb.url` | `localhost:27017` | pipe-separated connection strings, at least one |
//! | `mongodb.database` | `ycsb` | database holding the tables |
//! | `mongodb.writeConcern` | `acknowledged` | see [`WriteConcernLevel`] |
//! | `mongodb.readPreference` | `primary` | see [`ReadPreferenceMode`] |
//! | `batchsize` | `1` | inserts buffered per bulk write |
//! | `compressibility` | `1` | payload compressibility factor |
//! | `threadcount` | `100` | driver pool size per endpoint |
//!
//! A `memory://name` connection string selects an in-process endpoint
//! instead of a server.
//!
//! ## Module Organization
//!
//! - [`client`] - [`MongoDbClient`], the per-worker binding
//! - [`connection`] - shared endpoints and the reference-counted registry
//! - [`config`] - property parsing and validation
//! - [`endpoint`] - the seam between the binding and a document store
//! - [`mongo`] - the driver-backed endpoint
//! - [`memory`] - the in-process endpoint
//! - [`query`] - filter, projection and update documents
//! - [`compressibility`] - payload shaping

pub mod client;
pub mod compressibility;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod memory;
pub mod mongo;
pub mod query;

pub use client::MongoDbClient;
pub use mongodb::bson;
pub use compressibility::apply_compressibility;
pub use config::{MongoConfig, MongoConfigBuilder, ReadPreferenceMode, WriteConcernLevel};
pub use connection::{ConnectionRegistry, ConnectionSet, Connector};
pub use endpoint::{Endpoint, UpdateOutcome};
pub use memory::InMemoryEndpoint;
pub use mongo::MongoEndpoint;
