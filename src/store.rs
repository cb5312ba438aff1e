//! Document store collaborator.
//!
//! The encrypted index and the query engine only talk to storage through
//! [`DocumentStore`]. Documents are JSON objects keyed by a numeric `_id`;
//! every stored document also carries a `_version` counter maintained by the
//! store, which updates can use for compare-and-set.
pub mod memory;

pub use self::memory::MemoryStore;

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type Document = Map<String, Value>;
pub type DocId = u64;

pub const ID_FIELD: &str = "_id";
pub const VERSION_FIELD: &str = "_version";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: DocId },
    #[error("document {id} already exists in {collection}")]
    DuplicateId { collection: String, id: DocId },
    #[error("write conflict on {collection}/{id}: expected version {expected}, found {actual}")]
    WriteConflict {
        collection: String,
        id: DocId,
        expected: u64,
        actual: u64,
    },
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Errors that a retry from fresh state may resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::WriteConflict { .. } | StoreError::DuplicateId { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Partial failure of a multi-document write.
///
/// `written` pairs each successfully stored input position with its id;
/// `failures` lists every position that was not stored and why.
#[derive(Debug, Error)]
pub struct BulkWriteError {
    pub written: Vec<(usize, DocId)>,
    pub failures: Vec<(usize, StoreError)>,
}

impl fmt::Display for BulkWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} documents failed to write",
            self.failures.len(),
            self.failures.len() + self.written.len()
        )?;
        if let Some((position, err)) = self.failures.first() {
            write!(f, " (first at position {}: {})", position, err)?;
        }
        Ok(())
    }
}

/// Equality filter over dotted field paths. All conditions must hold.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(path, value)
    }

    pub fn and(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    /// Missing fields compare equal to `null`.
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(path, value)| get_path(doc, path).unwrap_or(&Value::Null) == value)
    }
}

/// Single-document modification.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    /// Dotted paths to overwrite. Intermediate objects are created as needed.
    pub set: Vec<(String, Value)>,
    /// Values appended to array fields unless already present.
    pub add_to_set: Vec<(String, Value)>,
    /// Fails with [`StoreError::WriteConflict`] unless the stored version matches.
    pub expected_version: Option<u64>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    pub fn add_to_set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_to_set.push((path.into(), value.into()));
        self
    }

    pub fn expect_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add_to_set.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    Insert(Document),
    Update { id: DocId, patch: Patch },
}

pub trait DocumentStore: Send + Sync {
    /// Allocates a fresh id. Inserting a document with an explicit `_id`
    /// must move the allocator past that id.
    fn next_id(&self, collection: &str) -> StoreResult<DocId>;

    /// Stores `doc`, using its `_id` if present and allocating one otherwise.
    fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<DocId>;

    /// Stores each document independently. Failures do not stop the batch.
    fn insert_many(&self, collection: &str, docs: Vec<Document>)
        -> Result<Vec<DocId>, BulkWriteError>;

    /// Documents for the ids that exist, in the order given. With a
    /// projection only the listed paths (and `_id`, `_version`) are returned.
    fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocId],
        projection: Option<&[String]>,
    ) -> StoreResult<Vec<Document>>;

    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    fn find_all(&self, collection: &str, projection: Option<&[String]>)
        -> StoreResult<Vec<Document>>;

    fn update_by_id(&self, collection: &str, id: DocId, patch: &Patch) -> StoreResult<()>;

    /// Applies every operation or none of them. Returns the ids of inserted
    /// documents in order.
    fn write_batch(&self, collection: &str, ops: Vec<WriteOp>) -> StoreResult<Vec<DocId>>;

    fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    fn list_collections(&self) -> StoreResult<Vec<String>>;
}

macro_rules! forward_store {
    ($($ty:ty),*) => {$(
        impl<T: DocumentStore + ?Sized> DocumentStore for $ty {
            fn next_id(&self, collection: &str) -> StoreResult<DocId> {
                (**self).next_id(collection)
            }

            fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<DocId> {
                (**self).insert_one(collection, doc)
            }

            fn insert_many(
                &self,
                collection: &str,
                docs: Vec<Document>,
            ) -> Result<Vec<DocId>, BulkWriteError> {
                (**self).insert_many(collection, docs)
            }

            fn find_by_ids(
                &self,
                collection: &str,
                ids: &[DocId],
                projection: Option<&[String]>,
            ) -> StoreResult<Vec<Document>> {
                (**self).find_by_ids(collection, ids, projection)
            }

            fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
                (**self).find_one(collection, filter)
            }

            fn find_all(
                &self,
                collection: &str,
                projection: Option<&[String]>,
            ) -> StoreResult<Vec<Document>> {
                (**self).find_all(collection, projection)
            }

            fn update_by_id(&self, collection: &str, id: DocId, patch: &Patch) -> StoreResult<()> {
                (**self).update_by_id(collection, id, patch)
            }

            fn write_batch(&self, collection: &str, ops: Vec<WriteOp>) -> StoreResult<Vec<DocId>> {
                (**self).write_batch(collection, ops)
            }

            fn drop_collection(&self, collection: &str) -> StoreResult<()> {
                (**self).drop_collection(collection)
            }

            fn list_collections(&self) -> StoreResult<Vec<String>> {
                (**self).list_collections()
            }
        }
    )*};
}

forward_store!(&T, Arc<T>);

/// Reads the value at a dotted path.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate objects.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts
        .pop()
        .ok_or_else(|| StoreError::InvalidDocument("empty field path".into()))?;
    let mut current = doc;
    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            StoreError::InvalidDocument(format!("{} in {} is not an object", part, path))
        })?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Reads `_id` from a document.
pub fn doc_id(doc: &Document) -> Option<DocId> {
    doc.get(ID_FIELD).and_then(Value::as_u64)
}
