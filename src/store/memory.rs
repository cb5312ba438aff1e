//! In-memory document store (for tests and the demo)

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::debug;

use crate::store::{
    get_path, set_path, BulkWriteError, DocId, Document, DocumentStore, Filter, Patch,
    StoreError, StoreResult, WriteOp, ID_FIELD, VERSION_FIELD,
};

#[derive(Debug, Default)]
struct Collection {
    docs: BTreeMap<DocId, Document>,
    next_id: DocId,
}

impl Collection {
    fn allocate(&mut self) -> DocId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert(&mut self, name: &str, mut doc: Document) -> StoreResult<DocId> {
        let docs = &self.docs;
        let id = assign_id(name, &mut doc, &mut self.next_id, |id| docs.contains_key(&id))?;
        self.docs.insert(id, doc);
        Ok(id)
    }

    fn update(&mut self, name: &str, id: DocId, patch: &Patch) -> StoreResult<()> {
        let doc = self.docs.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            collection: name.to_string(),
            id,
        })?;
        apply_patch(name, id, doc, patch)
    }
}

/// Picks the document id (explicit `_id` or the next free one) and stamps
/// the initial version.
fn assign_id(
    name: &str,
    doc: &mut Document,
    next_id: &mut DocId,
    exists: impl Fn(DocId) -> bool,
) -> StoreResult<DocId> {
    let id = match doc.get(ID_FIELD) {
        None => {
            let mut id = *next_id;
            while exists(id) {
                id += 1;
            }
            id
        }
        Some(value) => value.as_u64().ok_or_else(|| {
            StoreError::InvalidDocument(format!("{} must be an unsigned integer", ID_FIELD))
        })?,
    };
    if exists(id) {
        return Err(StoreError::DuplicateId {
            collection: name.to_string(),
            id,
        });
    }
    *next_id = (*next_id).max(id + 1);
    doc.insert(ID_FIELD.to_string(), Value::from(id));
    doc.insert(VERSION_FIELD.to_string(), Value::from(0u64));
    Ok(id)
}

/// Applies `patch` to `doc`, leaving it untouched on failure.
fn apply_patch(name: &str, id: DocId, doc: &mut Document, patch: &Patch) -> StoreResult<()> {
    let version = doc.get(VERSION_FIELD).and_then(Value::as_u64).unwrap_or(0);
    if let Some(expected) = patch.expected_version {
        if expected != version {
            return Err(StoreError::WriteConflict {
                collection: name.to_string(),
                id,
                expected,
                actual: version,
            });
        }
    }

    let mut updated = doc.clone();
    for (path, value) in &patch.set {
        if path == ID_FIELD || path == VERSION_FIELD {
            return Err(StoreError::InvalidDocument(format!("{} cannot be set", path)));
        }
        set_path(&mut updated, path, value.clone())?;
    }
    for (path, value) in &patch.add_to_set {
        let mut items = match get_path(&updated, path) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(StoreError::InvalidDocument(format!(
                    "{} is not an array",
                    path
                )))
            }
        };
        if !items.contains(value) {
            items.push(value.clone());
        }
        set_path(&mut updated, path, Value::Array(items))?;
    }
    updated.insert(VERSION_FIELD.to_string(), Value::from(version + 1));
    *doc = updated;
    Ok(())
}

fn project(doc: &Document, projection: Option<&[String]>) -> Document {
    match projection {
        None => doc.clone(),
        Some(paths) => {
            let mut out = Document::new();
            for key in [ID_FIELD, VERSION_FIELD] {
                if let Some(v) = doc.get(key) {
                    out.insert(key.to_string(), v.clone());
                }
            }
            for path in paths {
                if let Some(v) = get_path(doc, path) {
                    // Paths were validated when the document was written
                    let _ = set_path(&mut out, path, v.clone());
                }
            }
            out
        }
    }
}

/// Thread-safe via `RwLock`. Not persistent: data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> StoreResult<usize> {
        Ok(self.read()?.get(collection).map_or(0, |c| c.docs.len()))
    }

    pub fn is_empty(&self, collection: &str) -> StoreResult<bool> {
        Ok(self.len(collection)? == 0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryStore {
    fn next_id(&self, collection: &str) -> StoreResult<DocId> {
        Ok(self
            .write()?
            .entry(collection.to_string())
            .or_default()
            .allocate())
    }

    fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<DocId> {
        self.write()?
            .entry(collection.to_string())
            .or_default()
            .insert(collection, doc)
    }

    fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<Vec<DocId>, BulkWriteError> {
        let mut guard = match self.write() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(BulkWriteError {
                    written: Vec::new(),
                    failures: (0..docs.len())
                        .map(|i| (i, StoreError::Backend("store lock poisoned".into())))
                        .collect(),
                })
            }
        };
        let coll = guard.entry(collection.to_string()).or_default();

        let mut written = Vec::with_capacity(docs.len());
        let mut failures = Vec::new();
        for (position, doc) in docs.into_iter().enumerate() {
            match coll.insert(collection, doc) {
                Ok(id) => written.push((position, id)),
                Err(e) => failures.push((position, e)),
            }
        }

        if failures.is_empty() {
            Ok(written.into_iter().map(|(_, id)| id).collect())
        } else {
            debug!(collection, failed = failures.len(), "partial bulk write");
            Err(BulkWriteError { written, failures })
        }
    }

    fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocId],
        projection: Option<&[String]>,
    ) -> StoreResult<Vec<Document>> {
        let guard = self.read()?;
        let coll = match guard.get(collection) {
            Some(coll) => coll,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| coll.docs.get(id))
            .map(|doc| project(doc, projection))
            .collect())
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        Ok(self.read()?.get(collection).and_then(|coll| {
            coll.docs
                .values()
                .find(|doc| filter.matches(doc))
                .cloned()
        }))
    }

    fn find_all(
        &self,
        collection: &str,
        projection: Option<&[String]>,
    ) -> StoreResult<Vec<Document>> {
        Ok(self.read()?.get(collection).map_or_else(Vec::new, |coll| {
            coll.docs
                .values()
                .map(|doc| project(doc, projection))
                .collect()
        }))
    }

    fn update_by_id(&self, collection: &str, id: DocId, patch: &Patch) -> StoreResult<()> {
        let mut guard = self.write()?;
        let coll = guard
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        coll.update(collection, id, patch)
    }

    fn write_batch(&self, collection: &str, ops: Vec<WriteOp>) -> StoreResult<Vec<DocId>> {
        let mut guard = self.write()?;
        let coll = guard.entry(collection.to_string()).or_default();

        // Stage touched documents so a failing op leaves the collection untouched
        let mut next_id = coll.next_id;
        let mut staged: BTreeMap<DocId, Document> = BTreeMap::new();
        let mut inserted = Vec::new();
        for op in ops {
            match op {
                WriteOp::Insert(mut doc) => {
                    let id = assign_id(collection, &mut doc, &mut next_id, |id| {
                        coll.docs.contains_key(&id) || staged.contains_key(&id)
                    })?;
                    staged.insert(id, doc);
                    inserted.push(id);
                }
                WriteOp::Update { id, patch } => {
                    if !staged.contains_key(&id) {
                        let current = coll.docs.get(&id).cloned().ok_or_else(|| {
                            StoreError::NotFound {
                                collection: collection.to_string(),
                                id,
                            }
                        })?;
                        staged.insert(id, current);
                    }
                    if let Some(doc) = staged.get_mut(&id) {
                        apply_patch(collection, id, doc, &patch)?;
                    }
                }
            }
        }

        coll.next_id = next_id;
        coll.docs.extend(staged);
        Ok(inserted)
    }

    fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.write()?.remove(collection);
        Ok(())
    }

    fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
