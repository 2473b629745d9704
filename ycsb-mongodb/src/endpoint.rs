use crate::query::FindRequest;
use mongodb::bson::Document;
use ycsb::YcsbResult;

/// Counts reported by a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// One configured document-store endpoint.
///
/// The binding builds every filter, projection and update document itself
/// and hands them to an endpoint, which only executes them against its
/// server. [`crate::MongoEndpoint`] talks to a MongoDB deployment;
/// [`crate::InMemoryEndpoint`] keeps documents in process.
///
/// Endpoints are shared by every worker thread, so all methods take `&self`.
/// After [`Endpoint::close`] every call fails.
pub trait Endpoint: Send + Sync {
    /// The connection string this endpoint was opened with.
    fn address(&self) -> &str;

    fn insert_one(&self, collection: &str, document: Document) -> YcsbResult<()>;

    /// Inserts `documents` without stopping at the first failure, returning
    /// how many were stored.
    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> YcsbResult<u64>;

    fn find_one(&self, collection: &str, request: FindRequest) -> YcsbResult<Option<Document>>;

    fn find(&self, collection: &str, request: FindRequest) -> YcsbResult<Vec<Document>>;

    fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> YcsbResult<UpdateOutcome>;

    /// Deletes the first document matching `filter`, returning the deleted count.
    fn delete_one(&self, collection: &str, filter: Document) -> YcsbResult<u64>;

    fn close(&self) -> YcsbResult<()>;
}
