use crate::endpoint::{Endpoint, UpdateOutcome};
use crate::query::{FindRequest, ID_FIELD};
use dashmap::DashMap;
use mongodb::bson::{Bson, Document};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use ycsb::{ErrorKind, YcsbError, YcsbResult};

/// Connection-string scheme that selects an [`InMemoryEndpoint`].
pub const MEMORY_SCHEME: &str = "memory://";

/// Failures of the in-process query evaluator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),
    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),
    #[error("Unsupported sort: {0}")]
    UnsupportedSort(String),
    #[error("Unsupported update: {0}")]
    UnsupportedUpdate(String),
    #[error("Document has no string _id")]
    MissingId,
    #[error("E11000 duplicate key error collection: {collection} dup key: {{ _id: \"{key}\" }}")]
    DuplicateKey { collection: String, key: String },
}

impl From<QueryError> for YcsbError {
    fn from(err: QueryError) -> Self {
        let kind = match &err {
            QueryError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            QueryError::MissingId => ErrorKind::BackendError,
            _ => ErrorKind::UnsupportedOperation,
        };
        YcsbError::new(&err.to_string(), kind)
    }
}

enum IdMatch {
    Any,
    Equal(String),
    AtLeast(String),
}

impl IdMatch {
    fn parse(filter: &Document) -> Result<IdMatch, QueryError> {
        if filter.is_empty() {
            return Ok(IdMatch::Any);
        }
        if filter.len() == 1 {
            match filter.get(ID_FIELD) {
                Some(Bson::String(key)) => return Ok(IdMatch::Equal(key.clone())),
                Some(Bson::Document(range)) if range.len() == 1 => {
                    if let Some(Bson::String(start)) = range.get("$gte") {
                        return Ok(IdMatch::AtLeast(start.clone()));
                    }
                }
                _ => {}
            }
        }
        Err(QueryError::UnsupportedFilter(filter.to_string()))
    }
}

/// Document store endpoint that lives inside the process.
///
/// Selected with a `memory://<name>` connection string. It evaluates exactly
/// the query shapes the binding issues: `{}`, `{_id: key}` and
/// `{_id: {$gte: key}}` filters, inclusion projections, `_id` sorts and
/// `$set` updates. Anything else fails with
/// [`ErrorKind::UnsupportedOperation`], so a binding change that starts
/// issuing new shapes is caught by the tests instead of silently matching
/// nothing. Collections keep documents ordered by `_id`.
///
/// Like the server, an update that sets every field to its current value
/// matches one document but modifies none.
pub struct InMemoryEndpoint {
    address: String,
    collections: DashMap<String, BTreeMap<String, Document>>,
    operations: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryEndpoint {
    pub fn new(address: impl Into<String>) -> InMemoryEndpoint {
        InMemoryEndpoint {
            address: address.into(),
            collections: DashMap::new(),
            operations: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of operations issued against this endpoint so far.
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of documents stored in `collection`.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|documents| documents.len())
            .unwrap_or(0)
    }

    /// The stored document with `_id == key`, bypassing operation counting.
    pub fn document(&self, collection: &str, key: &str) -> Option<Document> {
        self.collections
            .get(collection)
            .and_then(|documents| documents.get(key).cloned())
    }

    fn begin(&self) -> YcsbResult<()> {
        if self.is_closed() {
            return Err(YcsbError::new(
                &format!("Endpoint {} is closed", self.address),
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        self.operations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn store(&self, collection: &str, document: Document) -> Result<(), QueryError> {
        let key = match document.get(ID_FIELD) {
            Some(Bson::String(key)) => key.clone(),
            _ => return Err(QueryError::MissingId),
        };
        let mut documents = self.collections.entry(collection.to_string()).or_default();
        if documents.contains_key(&key) {
            return Err(QueryError::DuplicateKey {
                collection: collection.to_string(),
                key,
            });
        }
        documents.insert(key, document);
        Ok(())
    }

    fn select(&self, collection: &str, request: &FindRequest) -> Result<Vec<Document>, QueryError> {
        let id_match = IdMatch::parse(&request.filter)?;
        let descending = match &request.sort {
            None => false,
            Some(sort) => sort_direction(sort)?,
        };
        if let Some(projection) = &request.projection {
            validate_projection(projection)?;
        }

        let documents = match self.collections.get(collection) {
            Some(documents) => documents,
            None => return Ok(Vec::new()),
        };

        let matched: Box<dyn Iterator<Item = &Document> + '_> = match &id_match {
            IdMatch::Any => Box::new(documents.values()),
            IdMatch::Equal(key) => Box::new(documents.get(key).into_iter()),
            IdMatch::AtLeast(start) => Box::new(documents.range(start.clone()..).map(|(_, d)| d)),
        };
        let ordered: Vec<&Document> = if descending {
            matched.collect::<Vec<_>>().into_iter().rev().collect()
        } else {
            matched.collect()
        };

        let limit = match request.limit {
            Some(limit) if limit != 0 => limit.unsigned_abs() as usize,
            _ => usize::MAX,
        };

        Ok(ordered
            .into_iter()
            .take(limit)
            .map(|document| match &request.projection {
                Some(projection) => project(document, projection),
                None => document.clone(),
            })
            .collect())
    }
}

impl Endpoint for InMemoryEndpoint {
    fn address(&self) -> &str {
        &self.address
    }

    fn insert_one(&self, collection: &str, document: Document) -> YcsbResult<()> {
        self.begin()?;
        Ok(self.store(collection, document)?)
    }

    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> YcsbResult<u64> {
        self.begin()?;
        let mut inserted = 0;
        let mut first_error = None;
        for document in documents {
            match self.store(collection, document) {
                Ok(()) => inserted += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            None => Ok(inserted),
            Some(err) => Err(err.into()),
        }
    }

    fn find_one(&self, collection: &str, request: FindRequest) -> YcsbResult<Option<Document>> {
        self.begin()?;
        let request = request.limit(1);
        Ok(self.select(collection, &request)?.into_iter().next())
    }

    fn find(&self, collection: &str, request: FindRequest) -> YcsbResult<Vec<Document>> {
        self.begin()?;
        Ok(self.select(collection, &request)?)
    }

    fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> YcsbResult<UpdateOutcome> {
        self.begin()?;
        let key = match IdMatch::parse(&filter)? {
            IdMatch::Equal(key) => key,
            _ => return Err(QueryError::UnsupportedFilter(filter.to_string()).into()),
        };
        let fields = set_fields(&update)?;

        let mut documents = match self.collections.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(UpdateOutcome::default()),
        };
        let document = match documents.get_mut(&key) {
            Some(document) => document,
            None => return Ok(UpdateOutcome::default()),
        };

        let mut changed = false;
        for (name, value) in fields {
            if document.get(name) != Some(value) {
                document.insert(name.clone(), value.clone());
                changed = true;
            }
        }
        Ok(UpdateOutcome {
            matched: 1,
            modified: u64::from(changed),
        })
    }

    fn delete_one(&self, collection: &str, filter: Document) -> YcsbResult<u64> {
        self.begin()?;
        let key = match IdMatch::parse(&filter)? {
            IdMatch::Equal(key) => key,
            _ => return Err(QueryError::UnsupportedFilter(filter.to_string()).into()),
        };
        let removed = self
            .collections
            .get_mut(collection)
            .and_then(|mut documents| documents.remove(&key));
        Ok(u64::from(removed.is_some()))
    }

    fn close(&self) -> YcsbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

fn sort_direction(sort: &Document) -> Result<bool, QueryError> {
    if sort.len() == 1 {
        match sort.get(ID_FIELD) {
            Some(Bson::Int32(1)) | Some(Bson::Int64(1)) => return Ok(false),
            Some(Bson::Int32(-1)) | Some(Bson::Int64(-1)) => return Ok(true),
            _ => {}
        }
    }
    Err(QueryError::UnsupportedSort(sort.to_string()))
}

fn validate_projection(projection: &Document) -> Result<(), QueryError> {
    let inclusion_only = projection.values().all(|value| {
        matches!(
            value,
            Bson::Int32(1) | Bson::Int64(1) | Bson::Boolean(true)
        )
    });
    if inclusion_only {
        Ok(())
    } else {
        Err(QueryError::UnsupportedProjection(projection.to_string()))
    }
}

// An empty projection selects the whole document.
fn project(document: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return document.clone();
    }
    document
        .iter()
        .filter(|(name, _)| name.as_str() == ID_FIELD || projection.contains_key(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn set_fields(update: &Document) -> Result<&Document, QueryError> {
    if update.len() == 1 {
        if let Ok(fields) = update.get_document("$set") {
            if !fields.contains_key(ID_FIELD) {
                return Ok(fields);
            }
        }
    }
    Err(QueryError::UnsupportedUpdate(update.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ascending_by_id, binary, id_filter, range_filter};
    use mongodb::bson::doc;

    fn record(key: &str, value: &[u8]) -> Document {
        let mut document = doc! { "_id": key };
        document.insert("field0", binary(value.to_vec()));
        document.insert("field1", binary(value.to_vec()));
        document
    }

    fn endpoint_with(keys: &[&str]) -> InMemoryEndpoint {
        let endpoint = InMemoryEndpoint::new("memory://test");
        for key in keys {
            endpoint.insert_one("usertable", record(key, b"v")).unwrap();
        }
        endpoint
    }

    #[test]
    fn test_insert_and_find_one() {
        let endpoint = endpoint_with(&["user1"]);
        let found = endpoint
            .find_one("usertable", FindRequest::new(id_filter("user1")))
            .unwrap();
        assert_eq!(found, Some(record("user1", b"v")));
        assert_eq!(endpoint.document_count("usertable"), 1);
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let endpoint = endpoint_with(&["user1"]);
        let err = endpoint
            .insert_one("usertable", record("user1", b"w"))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateKey);
        assert!(err.message().contains("E11000"));
    }

    #[test]
    fn test_insert_without_string_id_fails() {
        let endpoint = InMemoryEndpoint::new("memory://test");
        let err = endpoint.insert_one("t", doc! { "_id": 5 }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BackendError);
    }

    #[test]
    fn test_insert_many_continues_after_duplicate() {
        let endpoint = endpoint_with(&["b"]);
        let batch = vec![record("a", b"1"), record("b", b"2"), record("c", b"3")];
        let err = endpoint.insert_many("usertable", batch).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateKey);
        assert_eq!(endpoint.document_count("usertable"), 3);
        assert!(endpoint.document("usertable", "c").is_some());
    }

    #[test]
    fn test_projection_keeps_id_and_requested_fields() {
        let endpoint = endpoint_with(&["user1"]);
        let request = FindRequest::new(id_filter("user1")).projection(Some(doc! { "field1": 1 }));
        let found = endpoint.find_one("usertable", request).unwrap().unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["_id", "field1"]);
    }

    #[test]
    fn test_empty_projection_returns_whole_document() {
        let endpoint = endpoint_with(&["user1", "user2"]);
        let request = FindRequest::new(id_filter("user1")).projection(Some(Document::new()));
        let found = endpoint.find_one("usertable", request).unwrap();
        assert_eq!(found, Some(record("user1", b"v")));

        let request = FindRequest::new(range_filter("user1"))
            .sort(ascending_by_id())
            .projection(Some(Document::new()));
        let rows = endpoint.find("usertable", request).unwrap();
        assert_eq!(rows, vec![record("user1", b"v"), record("user2", b"v")]);
    }

    #[test]
    fn test_exclusion_projection_is_unsupported() {
        let endpoint = endpoint_with(&["user1"]);
        let request = FindRequest::new(id_filter("user1")).projection(Some(doc! { "field1": 0 }));
        let err = endpoint.find_one("usertable", request).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_range_find_is_ordered_and_limited() {
        let endpoint = endpoint_with(&["user5", "user1", "user3", "user2", "user4"]);
        let request = FindRequest::new(range_filter("user2"))
            .sort(ascending_by_id())
            .limit(3);
        let keys: Vec<String> = endpoint
            .find("usertable", request)
            .unwrap()
            .iter()
            .map(|d| d.get_str("_id").unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["user2", "user3", "user4"]);
    }

    #[test]
    fn test_descending_sort() {
        let endpoint = endpoint_with(&["a", "b", "c"]);
        let request = FindRequest::new(doc! {}).sort(doc! { "_id": -1 }).limit(2);
        let keys: Vec<String> = endpoint
            .find("usertable", request)
            .unwrap()
            .iter()
            .map(|d| d.get_str("_id").unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["c", "b"]);
    }

    #[test]
    fn test_unknown_filter_is_unsupported() {
        let endpoint = endpoint_with(&["a"]);
        let err = endpoint
            .find("usertable", FindRequest::new(doc! { "field0": "x" }))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_find_in_missing_collection_is_empty() {
        let endpoint = InMemoryEndpoint::new("memory://test");
        let found = endpoint
            .find("nothing", FindRequest::new(range_filter("")))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_update_counts_modified() {
        let endpoint = endpoint_with(&["user1"]);
        let mut set = Document::new();
        set.insert("field0", binary(b"new".to_vec()));
        let outcome = endpoint
            .update_one("usertable", id_filter("user1"), doc! { "$set": set.clone() })
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

        // same value again: matched but unchanged
        let outcome = endpoint
            .update_one("usertable", id_filter("user1"), doc! { "$set": set })
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 0 });
    }

    #[test]
    fn test_update_missing_key_matches_nothing() {
        let endpoint = endpoint_with(&["user1"]);
        let outcome = endpoint
            .update_one("usertable", id_filter("nope"), doc! { "$set": { "a": 1 } })
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
    }

    #[test]
    fn test_update_without_set_is_unsupported() {
        let endpoint = endpoint_with(&["user1"]);
        let err = endpoint
            .update_one("usertable", id_filter("user1"), doc! { "$inc": { "a": 1 } })
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_delete_one() {
        let endpoint = endpoint_with(&["user1"]);
        assert_eq!(endpoint.delete_one("usertable", id_filter("user1")).unwrap(), 1);
        assert_eq!(endpoint.delete_one("usertable", id_filter("user1")).unwrap(), 0);
        assert_eq!(endpoint.delete_one("other", id_filter("user1")).unwrap(), 0);
    }

    #[test]
    fn test_closed_endpoint_rejects_operations() {
        let endpoint = endpoint_with(&["user1"]);
        endpoint.close().unwrap();
        assert!(endpoint.is_closed());
        let err = endpoint
            .find_one("usertable", FindRequest::new(id_filter("user1")))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreAlreadyClosed);
    }

    #[test]
    fn test_operations_are_counted() {
        let endpoint = endpoint_with(&["a", "b"]);
        assert_eq!(endpoint.operations(), 2);
        let _ = endpoint.delete_one("usertable", id_filter("a"));
        assert_eq!(endpoint.operations(), 3);
        assert_eq!(endpoint.address(), "memory://test");
    }
}
