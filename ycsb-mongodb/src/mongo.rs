use crate::config::MongoConfig;
use crate::endpoint::{Endpoint, UpdateOutcome};
use crate::query::FindRequest;
use mongodb::bson::Document;
use mongodb::error::{Error as DriverError, ErrorKind as DriverErrorKind};
use mongodb::options::{
    ClientOptions, FindOneOptions, FindOptions, InsertManyOptions, ServerAddress,
};
use mongodb::sync::{Client, ClientSession, Collection, Database};
use parking_lot::Mutex;
use ycsb::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use ycsb::{ErrorKind, YcsbError, YcsbResult};

pub const MONGODB_SCHEME: &str = "mongodb://";
pub const MONGODB_SRV_SCHEME: &str = "mongodb+srv://";

struct Handles {
    client: Client,
    database: Database,
}

/// Endpoint backed by the MongoDB driver's blocking client.
///
/// Each endpoint owns one driver client (and therefore one connection pool
/// sized by `threadcount`) plus the handle of the configured database.
///
/// Inserts, reads and updates run inside causally consistent sessions.
/// Sessions are pooled per endpoint: an operation checks one out, runs, and
/// puts it back, so concurrent workers never share a session. Deletes and
/// range finds run without an explicit session.
pub struct MongoEndpoint {
    address: String,
    handles: Atomic<Option<Handles>>,
    sessions: Mutex<Vec<ClientSession>>,
}

impl MongoEndpoint {
    /// Opens a client for one connection string.
    ///
    /// `mongodb://` and `mongodb+srv://` strings are parsed as URIs whose own
    /// options win over the binding configuration; anything else is taken as
    /// a bare `host[:port]`. The first session is started eagerly so an
    /// unreachable deployment fails here rather than on the first operation.
    pub fn connect(url: &str, config: &MongoConfig) -> YcsbResult<MongoEndpoint> {
        let mut options = client_options(url)?;
        config.apply_to(&mut options);

        let client = Client::with_options(options).map_err(to_ycsb_error)?;
        let database = client.database(config.database());
        let session = start_session(&client)?;
        log::info!("mongo connection created with {}", url);

        Ok(MongoEndpoint {
            address: url.to_string(),
            handles: atomic(Some(Handles { client, database })),
            sessions: Mutex::new(vec![session]),
        })
    }

    fn collection(&self, name: &str) -> YcsbResult<Collection<Document>> {
        self.handles
            .read_with(|handles| {
                handles
                    .as_ref()
                    .map(|handles| handles.database.collection::<Document>(name))
            })
            .ok_or_else(|| self.closed_error())
    }

    fn checkout_session(&self) -> YcsbResult<ClientSession> {
        if let Some(session) = self.sessions.lock().pop() {
            return Ok(session);
        }
        let client = self
            .handles
            .read_with(|handles| handles.as_ref().map(|handles| handles.client.clone()))
            .ok_or_else(|| self.closed_error())?;
        start_session(&client)
    }

    fn checkin_session(&self, session: ClientSession) {
        if self.handles.read_with(Option::is_some) {
            self.sessions.lock().push(session);
        }
    }

    fn with_session<R>(
        &self,
        collection: &str,
        op: impl FnOnce(&Collection<Document>, &mut ClientSession) -> mongodb::error::Result<R>,
    ) -> YcsbResult<R> {
        let collection = self.collection(collection)?;
        let mut session = self.checkout_session()?;
        let result = op(&collection, &mut session);
        self.checkin_session(session);
        result.map_err(to_ycsb_error)
    }

    fn closed_error(&self) -> YcsbError {
        YcsbError::new(
            &format!("Endpoint {} is closed", self.address),
            ErrorKind::StoreAlreadyClosed,
        )
    }
}

impl Endpoint for MongoEndpoint {
    fn address(&self) -> &str {
        &self.address
    }

    fn insert_one(&self, collection: &str, document: Document) -> YcsbResult<()> {
        self.with_session(collection, |collection, session| {
            collection.insert_one(document).session(session).run()
        })?;
        Ok(())
    }

    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> YcsbResult<u64> {
        let mut options = InsertManyOptions::default();
        options.ordered = Some(false);
        let result = self.with_session(collection, |collection, session| {
            collection
                .insert_many(documents)
                .with_options(options)
                .session(session)
                .run()
        })?;
        Ok(result.inserted_ids.len() as u64)
    }

    fn find_one(&self, collection: &str, request: FindRequest) -> YcsbResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.projection = request.projection;
        options.sort = request.sort;
        let filter = request.filter;
        self.with_session(collection, |collection, session| {
            collection
                .find_one(filter)
                .with_options(options)
                .session(session)
                .run()
        })
    }

    fn find(&self, collection: &str, request: FindRequest) -> YcsbResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.projection = request.projection;
        options.sort = request.sort;
        options.limit = request.limit;

        let cursor = self
            .collection(collection)?
            .find(request.filter)
            .with_options(options)
            .run()
            .map_err(to_ycsb_error)?;
        cursor
            .collect::<mongodb::error::Result<Vec<Document>>>()
            .map_err(to_ycsb_error)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> YcsbResult<UpdateOutcome> {
        let result = self.with_session(collection, |collection, session| {
            collection.update_one(filter, update).session(session).run()
        })?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    fn delete_one(&self, collection: &str, filter: Document) -> YcsbResult<u64> {
        let result = self
            .collection(collection)?
            .delete_one(filter)
            .run()
            .map_err(to_ycsb_error)?;
        Ok(result.deleted_count)
    }

    fn close(&self) -> YcsbResult<()> {
        // sessions go back to the driver before the client is released
        self.sessions.lock().clear();
        let handles = self.handles.write_with(Option::take);
        if handles.is_some() {
            log::debug!("mongo connection closed for {}", self.address);
        }
        drop(handles);
        Ok(())
    }
}

fn client_options(url: &str) -> YcsbResult<ClientOptions> {
    if url.starts_with(MONGODB_SCHEME) || url.starts_with(MONGODB_SRV_SCHEME) {
        ClientOptions::parse(url).run().map_err(to_ycsb_error)
    } else {
        let address = ServerAddress::parse(url).map_err(to_ycsb_error)?;
        Ok(ClientOptions::builder().hosts(vec![address]).build())
    }
}

fn start_session(client: &Client) -> YcsbResult<ClientSession> {
    client
        .start_session()
        .causal_consistency(true)
        .run()
        .map_err(to_ycsb_error)
}

/// Maps a driver error onto the binding's error kinds.
///
/// Server selection, DNS and socket failures become
/// [`ErrorKind::ConnectionError`]; malformed connection strings become
/// [`ErrorKind::InvalidConfiguration`]; duplicate `_id` writes become
/// [`ErrorKind::DuplicateKey`]; everything else is a backend error.
pub(crate) fn to_ycsb_error(error: DriverError) -> YcsbError {
    let error_msg = error.to_string();
    let error_kind = match error.kind.as_ref() {
        DriverErrorKind::ServerSelection { .. }
        | DriverErrorKind::DnsResolve { .. }
        | DriverErrorKind::Io(_) => ErrorKind::ConnectionError,
        DriverErrorKind::InvalidArgument { .. } => ErrorKind::InvalidConfiguration,
        _ if error_msg.contains("E11000") => ErrorKind::DuplicateKey,
        _ => ErrorKind::BackendError,
    };
    YcsbError::new(&format!("MongoDB Error: {}", error_msg), error_kind)
}
