use crate::config::MongoConfig;
use crate::connection::{ConnectionRegistry, ConnectionSet};
use crate::endpoint::UpdateOutcome;
use crate::query::{
    ascending_by_id, fill_field_map, id_filter, projection, range_filter, record_document,
    set_update, FindRequest,
};
use mongodb::bson::Document;
use std::collections::HashMap;
use std::sync::Arc;
use ycsb::{Db, ErrorKind, FieldMap, FieldSet, Properties, Status, YcsbError, YcsbResult};

/// MongoDB binding for one benchmark worker.
///
/// Every worker thread owns its own client; clients bound to the same
/// [`ConnectionRegistry`] share one configuration and one set of endpoints,
/// and each operation is sent to the next endpoint in round-robin order.
///
/// ```rust,ignore
/// let props = Properties::new()
///     .with("mongodb.url", "mongodb://db1:27017|mongodb://db2:27017")
///     .with("mongodb.writeConcern", "majority");
/// let mut client = MongoDbClient::new(props);
/// client.init()?;
/// let status = client.insert("usertable", "user1", &values);
/// client.cleanup()?;
/// ```
///
/// With `batchsize` above one, inserts are buffered per table and written
/// with one unordered bulk insert each time a buffer fills up; whatever is
/// still buffered is written by [`Db::cleanup`].
pub struct MongoDbClient {
    registry: ConnectionRegistry,
    properties: Properties,
    config: Option<MongoConfig>,
    connections: Option<Arc<ConnectionSet>>,
    batches: HashMap<String, Vec<Document>>,
    insert_count: u64,
    registered: bool,
}

impl MongoDbClient {
    /// Creates a client bound to the process-wide registry.
    pub fn new(properties: Properties) -> MongoDbClient {
        MongoDbClient::with_registry(ConnectionRegistry::global(), properties)
    }

    pub fn with_registry(registry: ConnectionRegistry, properties: Properties) -> MongoDbClient {
        MongoDbClient {
            registry,
            properties,
            config: None,
            connections: None,
            batches: HashMap::new(),
            insert_count: 0,
            registered: false,
        }
    }

    /// Documents stored by this client since the last failed insert.
    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }

    pub fn is_initialized(&self) -> bool {
        self.connections.is_some()
    }

    /// Inserts currently buffered for `table`.
    pub fn pending_inserts(&self, table: &str) -> usize {
        self.batches.get(table).map_or(0, Vec::len)
    }

    fn bound(&self) -> YcsbResult<(MongoConfig, Arc<ConnectionSet>)> {
        match (&self.config, &self.connections) {
            (Some(config), Some(connections)) => Ok((config.clone(), connections.clone())),
            _ => Err(YcsbError::new(
                "MongoDB client is not initialized",
                ErrorKind::NotInitialized,
            )),
        }
    }

    fn flush(&mut self, connections: &ConnectionSet, table: &str, documents: Vec<Document>) -> Status {
        let expected = documents.len() as u64;
        match connections.next().insert_many(table, documents) {
            Ok(inserted) if inserted == expected => {
                self.insert_count += inserted;
                Status::Ok
            }
            Ok(inserted) => {
                log::error!(
                    "Couldn't insert batch into {}: {} of {} documents stored",
                    table,
                    inserted,
                    expected
                );
                self.insert_count = 0;
                Status::Error
            }
            Err(err) => {
                log::error!("Couldn't insert batch of {} documents into {}: {}", expected, table, err);
                self.insert_count = 0;
                Status::Error
            }
        }
    }

    fn flush_pending(&mut self) -> YcsbResult<()> {
        if self.batches.values().all(Vec::is_empty) {
            return Ok(());
        }
        let (_, connections) = self.bound()?;

        let mut failed = Vec::new();
        let batches = std::mem::take(&mut self.batches);
        for (table, documents) in batches {
            if documents.is_empty() {
                continue;
            }
            if self.flush(&connections, &table, documents) != Status::Ok {
                failed.push(table);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(YcsbError::new(
                &format!("Could not flush pending inserts for {}", failed.join(", ")),
                ErrorKind::BackendError,
            ))
        }
    }

    fn unregister(&mut self) {
        self.config = None;
        self.connections = None;
        if self.registered {
            self.registered = false;
            self.registry.release();
        }
    }
}

impl Db for MongoDbClient {
    /// Binds the client to the registry's shared connections.
    ///
    /// A bad write concern, read preference or numeric option fails with
    /// [`ErrorKind::InvalidConfiguration`]. A connection failure is only
    /// logged: `init` succeeds, every operation reports [`Status::Error`] and
    /// calling `init` again retries.
    fn init(&mut self) -> YcsbResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if self.registered {
            self.unregister();
        }

        self.registered = true;
        match self.registry.acquire(&self.properties) {
            Ok((config, connections)) => {
                self.config = Some(config);
                self.connections = Some(connections);
                Ok(())
            }
            Err(err) if err.kind() == &ErrorKind::InvalidConfiguration => {
                log::error!("{}", err);
                Err(err)
            }
            Err(err) => {
                log::error!("Could not initialize MongoDB connection pool for Loader: {}", err);
                Ok(())
            }
        }
    }

    fn cleanup(&mut self) -> YcsbResult<()> {
        let flushed = self.flush_pending();
        self.unregister();
        flushed
    }

    fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&FieldSet>,
        _result: &mut FieldMap,
    ) -> Status {
        let (_, connections) = match self.bound() {
            Ok(bound) => bound,
            Err(err) => {
                log::error!("Could not read key {}: {}", key, err);
                return Status::Error;
            }
        };

        let request = FindRequest::new(id_filter(key)).projection(fields.map(projection));
        match connections.next().find_one(table, request) {
            // the found document is not copied into the result map
            Ok(Some(_)) => Status::Ok,
            Ok(None) => {
                log::error!("No results returned for key {}", key);
                Status::Error
            }
            Err(err) => {
                log::error!("Could not read key {}: {}", key, err);
                Status::Error
            }
        }
    }

    fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<FieldMap>,
    ) -> Status {
        let (_, connections) = match self.bound() {
            Ok(bound) => bound,
            Err(err) => {
                log::error!("Could not scan from key {}: {}", start_key, err);
                return Status::Error;
            }
        };
        if record_count == 0 {
            return Status::Ok;
        }

        let limit = i64::try_from(record_count).unwrap_or(i64::MAX);
        let request = FindRequest::new(range_filter(start_key))
            .projection(fields.map(projection))
            .sort(ascending_by_id())
            .limit(limit);

        match connections.next().find(table, request) {
            Ok(documents) if documents.is_empty() => {
                log::error!("Nothing found in scan for key {}", start_key);
                Status::Error
            }
            Ok(documents) => {
                result.reserve(documents.len());
                for document in &documents {
                    let mut record = FieldMap::new();
                    fill_field_map(&mut record, document);
                    result.push(record);
                }
                Status::Ok
            }
            Err(err) => {
                log::error!("Could not scan from key {}: {}", start_key, err);
                Status::Error
            }
        }
    }

    /// Sets the given fields on an existing record.
    ///
    /// An update that modifies nothing fails. A driver error is logged and
    /// reported as [`Status::Ok`].
    fn update(&mut self, table: &str, key: &str, values: &FieldMap) -> Status {
        let (config, connections) = match self.bound() {
            Ok(bound) => bound,
            Err(err) => {
                log::error!("Could not update key {}: {}", key, err);
                return Status::Error;
            }
        };

        let update = set_update(values, config.compressibility());
        match connections.next().update_one(table, id_filter(key), update) {
            Ok(outcome) if outcome.modified > 0 => Status::Ok,
            Ok(outcome) => {
                log::error!("Nothing updated for key {}: {}", key, unmodified_reason(outcome));
                Status::Error
            }
            Err(err) => {
                log::warn!("Update of key {} failed: {}", key, err);
                Status::Ok
            }
        }
    }

    fn insert(&mut self, table: &str, key: &str, values: &FieldMap) -> Status {
        let (config, connections) = match self.bound() {
            Ok(bound) => bound,
            Err(err) => {
                log::error!("Couldn't insert key {}: {}", key, err);
                return Status::Error;
            }
        };

        let document = record_document(key, values, config.compressibility());
        if config.batch_size() <= 1 {
            return match connections.next().insert_one(table, document) {
                Ok(()) => {
                    self.insert_count += 1;
                    Status::Ok
                }
                Err(err) => {
                    log::error!("Couldn't insert key {}: {}", key, err);
                    self.insert_count = 0;
                    Status::Error
                }
            };
        }

        let batch = self.batches.entry(table.to_string()).or_default();
        batch.push(document);
        if batch.len() < config.batch_size() {
            return Status::Ok;
        }
        let documents = std::mem::take(batch);
        self.flush(&connections, table, documents)
    }

    /// Deletes one record. Deleting a missing key succeeds.
    fn delete(&mut self, table: &str, key: &str) -> Status {
        let (_, connections) = match self.bound() {
            Ok(bound) => bound,
            Err(err) => {
                log::error!("Could not delete key {}: {}", key, err);
                return Status::Error;
            }
        };

        match connections.next().delete_one(table, id_filter(key)) {
            Ok(_) => Status::Ok,
            Err(err) => {
                log::error!("Could not delete key {}: {}", key, err);
                Status::Error
            }
        }
    }
}

fn unmodified_reason(outcome: UpdateOutcome) -> &'static str {
    if outcome.matched == 0 {
        "no record with this key"
    } else {
        "values already current"
    }
}

impl Drop for MongoDbClient {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        // still bound here; unregister drops the connections
        if let Err(err) = self.flush_pending() {
            log::warn!("Dropping MongoDB client with unflushed inserts: {}", err);
        }
        self.unregister();
    }
}
