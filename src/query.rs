//! Server side of the encrypted document store.
//!
//! [`EncryptedCollection`] never holds private keys. It resolves conditions
//! through the encrypted index, fetches documents by id and applies
//! homomorphic updates with the additive public key only.
use crate::cancel::{CancelToken, Interrupted};
use crate::cipher::{PaillierCiphertext, PaillierPublicKey};
use crate::client::{EncryptedDocument, IndexEntry, Role};
use crate::index::{self, EncryptedIndex, IndexError, InsertOutcome, Relation};
use crate::ore::{OreCiphertext, OreLeft};
use crate::store::{get_path, DocId, Document, DocumentStore, Patch, VERSION_FIELD};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    /// Homomorphic addition of an encrypted delta.
    Inc,
    /// Homomorphic subtraction of an encrypted delta.
    Dec,
    /// Replacement with fresh ciphertexts.
    Set,
}

impl FromStr for UpdateOperator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "$inc" => Ok(UpdateOperator::Inc),
            "$dec" => Ok(UpdateOperator::Dec),
            "$set" => Ok(UpdateOperator::Set),
            other => Err(Error::UnsupportedOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Equal(OreLeft),
    Greater(OreLeft),
    Less(OreLeft),
    /// Inclusive on both ends.
    Range(OreLeft, OreLeft),
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub attribute: String,
    pub predicate: Predicate,
}

impl Condition {
    pub fn new(attribute: &str, predicate: Predicate) -> Self {
        Self {
            attribute: attribute.to_string(),
            predicate,
        }
    }
}

/// Documents an update applies to.
#[derive(Debug, Clone)]
pub enum Selection {
    All,
    Ids(BTreeSet<DocId>),
    /// Conjunction of index conditions.
    Where(Vec<Condition>),
}

/// Stored documents that are missing from one attribute's index.
#[derive(Debug)]
pub struct Unindexed {
    pub attribute: String,
    pub positions: Vec<usize>,
    pub error: Error,
}

/// Outcome of a multi-document insertion, by input position.
#[derive(Debug, Default)]
pub struct BulkInsertReport {
    pub stored: Vec<(usize, DocId)>,
    pub failed: Vec<(usize, Error)>,
    pub unindexed: Vec<Unindexed>,
}

impl BulkInsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unindexed.is_empty()
    }

    pub fn absorb(&mut self, other: BulkInsertReport) {
        self.stored.extend(other.stored);
        self.failed.extend(other.failed);
        self.unindexed.extend(other.unindexed);
    }

    /// Records stored documents whose index entries were given up on.
    pub fn abandon(&mut self, pending: Vec<PendingEntry>, reason: Interrupted) {
        let mut by_attribute: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for p in pending {
            by_attribute.entry(p.entry.attribute).or_default().push(p.position);
        }
        for (attribute, mut positions) in by_attribute {
            positions.sort_unstable();
            positions.dedup();
            self.unindexed.push(Unindexed {
                attribute,
                positions,
                error: Error::Interrupted(reason),
            });
        }
    }

    /// The cancellation that kept entries out of the index, if any.
    pub fn interruption(&self) -> Option<Interrupted> {
        self.unindexed.iter().find_map(|u| match &u.error {
            Error::Interrupted(reason) | Error::Index(IndexError::Interrupted(reason)) => {
                Some(*reason)
            }
            _ => None,
        })
    }
}

/// Index entry of a stored document that still has to reach its tree.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub position: usize,
    pub doc: DocId,
    pub entry: IndexEntry,
}

#[derive(Debug, Clone)]
pub struct EncryptedCollection<S> {
    index: EncryptedIndex<S>,
    additive: Option<PaillierPublicKey>,
    retries: u32,
}

impl<S: DocumentStore> EncryptedCollection<S> {
    pub fn new(store: S, name: &str) -> Self {
        Self {
            index: EncryptedIndex::new(store, name),
            additive: None,
            retries: 3,
        }
    }

    /// Enables `$inc` and `$dec`.
    pub fn with_additive_key(mut self, key: PaillierPublicKey) -> Self {
        self.additive = Some(key);
        self
    }

    /// Write-conflict retries for index insertions and updates.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.index = self.index.with_retries(retries);
        self.retries = retries;
        self
    }

    pub fn name(&self) -> &str {
        self.index.name()
    }

    pub fn index(&self) -> &EncryptedIndex<S> {
        &self.index
    }

    pub fn store(&self) -> &S {
        self.index.store()
    }

    /// Stores one document and adds it to the index of every indexed field.
    /// Once the body is stored, an indexing failure is reported as
    /// [`Error::NotIndexed`] carrying the new id.
    pub fn insert(&self, doc: EncryptedDocument, cancel: &CancelToken) -> Result<DocId> {
        let id = self.store().insert_one(self.name(), doc.body)?;
        for entry in &doc.index_entries {
            self.index
                .insert(&entry.attribute, &entry.ciphertext, id, cancel)
                .map_err(|source| Error::NotIndexed {
                    id,
                    attribute: entry.attribute.clone(),
                    source,
                })?;
        }
        Ok(id)
    }

    /// Stores documents and indexes them, building each attribute's tree in
    /// one pass when it does not exist yet. Failures are reported per input
    /// position instead of aborting.
    pub fn insert_many(
        &self,
        docs: Vec<EncryptedDocument>,
        cancel: &CancelToken,
    ) -> BulkInsertReport {
        let mut report = BulkInsertReport::default();
        let pending = self.write_documents(docs.into_iter().enumerate().collect(), &mut report);
        self.build_indexes(pending, cancel, &mut report);
        report
    }

    /// Stores documents without indexing them. Each document comes with the
    /// input position it is reported under.
    pub fn write_documents(
        &self,
        docs: Vec<(usize, EncryptedDocument)>,
        report: &mut BulkInsertReport,
    ) -> Vec<PendingEntry> {
        let mut positions = Vec::with_capacity(docs.len());
        let mut bodies = Vec::with_capacity(docs.len());
        let mut entries = Vec::with_capacity(docs.len());
        for (position, doc) in docs {
            positions.push(position);
            bodies.push(doc.body);
            entries.push(Some(doc.index_entries));
        }

        let written: Vec<(usize, DocId)> = match self.store().insert_many(self.name(), bodies) {
            Ok(ids) => ids.into_iter().enumerate().collect(),
            Err(e) => {
                warn!(collection = self.name(), error = %e, "partial bulk write");
                report.failed.extend(
                    e.failures
                        .into_iter()
                        .map(|(i, err)| (positions.get(i).copied().unwrap_or(i), Error::Store(err))),
                );
                e.written
            }
        };

        let mut pending = Vec::new();
        for (i, doc) in written {
            let position = positions.get(i).copied().unwrap_or(i);
            report.stored.push((position, doc));
            let index_entries = entries.get_mut(i).and_then(Option::take);
            pending.extend(index_entries.into_iter().flatten().map(|entry| PendingEntry {
                position,
                doc,
                entry,
            }));
        }
        pending
    }

    /// Adds pending entries to their trees, sorted by plaintext per
    /// attribute. A missing tree is bulk built, an existing one grows one
    /// insertion at a time.
    pub fn build_indexes(
        &self,
        pending: Vec<PendingEntry>,
        cancel: &CancelToken,
        report: &mut BulkInsertReport,
    ) {
        let mut by_attribute: BTreeMap<String, Vec<PendingEntry>> = BTreeMap::new();
        for p in pending {
            by_attribute.entry(p.entry.attribute.clone()).or_default().push(p);
        }

        for (attribute, mut entries) in by_attribute {
            entries.sort_by_key(|p| p.entry.plaintext);
            let positions = || entries.iter().map(|p| p.position).collect::<Vec<_>>();

            let exists = match self.index.root(&attribute) {
                Ok(root) => root.is_some(),
                Err(e) => {
                    report.unindexed.push(Unindexed {
                        positions: positions(),
                        attribute,
                        error: e.into(),
                    });
                    continue;
                }
            };

            if !exists {
                let input: Vec<(OreCiphertext, DocId)> = entries
                    .iter()
                    .map(|p| (p.entry.ciphertext.clone(), p.doc))
                    .collect();
                match self.index.bulk_build(&attribute, &input, cancel) {
                    Ok(built) => {
                        debug!(attribute = %attribute, nodes = built.nodes, "index built");
                        continue;
                    }
                    // Another writer created the tree first, fall through.
                    Err(IndexError::AlreadyBuilt(_)) => {}
                    Err(IndexError::Store(e)) if e.is_conflict() => {}
                    Err(e) => {
                        report.unindexed.push(Unindexed {
                            positions: positions(),
                            attribute,
                            error: e.into(),
                        });
                        continue;
                    }
                }
            }

            let mut appended = 0usize;
            for p in &entries {
                match self.index.insert(&attribute, &p.entry.ciphertext, p.doc, cancel) {
                    Ok(InsertOutcome::Appended(_)) => appended += 1,
                    Ok(_) => {}
                    Err(e) => report.unindexed.push(Unindexed {
                        attribute: attribute.clone(),
                        positions: vec![p.position],
                        error: e.into(),
                    }),
                }
            }
            debug!(attribute = %attribute, entries = entries.len(), appended, "index extended");
        }
    }

    /// Documents whose `attribute` stands in `relation` to the token.
    pub fn find(
        &self,
        attribute: &str,
        token: &OreLeft,
        relation: Relation,
        projection: Option<&[String]>,
        cancel: &CancelToken,
    ) -> Result<Vec<Document>> {
        let ids = self.index.search(attribute, token, relation, cancel)?;
        self.fetch(&ids, projection)
    }

    pub fn find_range(
        &self,
        attribute: &str,
        low: &OreLeft,
        high: &OreLeft,
        projection: Option<&[String]>,
        cancel: &CancelToken,
    ) -> Result<Vec<Document>> {
        let ids = self.index.search_range(attribute, low, high, cancel)?;
        self.fetch(&ids, projection)
    }

    /// Every document of the collection.
    pub fn find_all(&self, projection: Option<&[String]>) -> Result<Vec<Document>> {
        Ok(self.store().find_all(self.name(), projection)?)
    }

    pub fn find_ids(&self, condition: &Condition, cancel: &CancelToken) -> Result<BTreeSet<DocId>> {
        let attribute = condition.attribute.as_str();
        let ids = match &condition.predicate {
            Predicate::Equal(t) => self.index.search(attribute, t, Relation::Equal, cancel)?,
            Predicate::Greater(t) => self.index.search(attribute, t, Relation::Greater, cancel)?,
            Predicate::Less(t) => self.index.search(attribute, t, Relation::Less, cancel)?,
            Predicate::Range(low, high) => self.index.search_range(attribute, low, high, cancel)?,
        };
        Ok(ids)
    }

    /// Ids satisfying every condition. Each condition is evaluated on its
    /// own and the results intersected.
    pub fn find_nested_ids(
        &self,
        conditions: &[Condition],
        cancel: &CancelToken,
    ) -> Result<BTreeSet<DocId>> {
        let sets = conditions
            .iter()
            .map(|c| self.find_ids(c, cancel))
            .collect::<Result<Vec<_>>>()?;
        Ok(index::intersect(sets)?)
    }

    #[instrument(level = "debug", skip_all, fields(collection = self.name(), conditions = conditions.len()))]
    pub fn find_nested(
        &self,
        conditions: &[Condition],
        projection: Option<&[String]>,
        cancel: &CancelToken,
    ) -> Result<Vec<Document>> {
        let ids = self.find_nested_ids(conditions, cancel)?;
        self.fetch(&ids, projection)
    }

    /// Applies an update produced by [`crate::client::Client::encrypt_update`]
    /// to the selected documents and returns how many were modified.
    ///
    /// `$inc` and `$dec` combine the stored additive ciphertext with the
    /// encrypted delta; neither value is ever decrypted. `$set` replaces the
    /// whole ciphertext bundle of a field and is refused for indexed fields.
    #[instrument(level = "debug", skip_all, fields(collection = self.name()))]
    pub fn update(
        &self,
        selection: &Selection,
        update: &Document,
        cancel: &CancelToken,
    ) -> Result<usize> {
        let mut operations = Vec::with_capacity(update.len());
        for (op, body) in update {
            let operator: UpdateOperator = op.parse()?;
            let fields = body.as_object().ok_or_else(|| Error::UnsupportedValue {
                field: op.clone(),
                reason: "operator body must be an object".into(),
            })?;
            if operator != UpdateOperator::Set && self.additive.is_none() {
                return Err(Error::MissingKey(Role::Additive));
            }
            operations.push((operator, fields));
        }

        let ids: Vec<DocId> = match selection {
            Selection::All => self
                .find_all(Some(&[] as &[String]))?
                .iter()
                .filter_map(crate::store::doc_id)
                .collect(),
            Selection::Ids(ids) => ids.iter().copied().collect(),
            Selection::Where(conditions) => {
                self.find_nested_ids(conditions, cancel)?.into_iter().collect()
            }
        };

        let mut modified = 0;
        for id in ids {
            cancel.check()?;
            let mut attempt = 0;
            loop {
                let Some(doc) = self.store().find_by_ids(self.name(), &[id], None)?.pop() else {
                    break;
                };
                let patch = self.update_patch(&doc, &operations)?;
                match self.store().update_by_id(self.name(), id, &patch) {
                    Ok(()) => {
                        modified += 1;
                        break;
                    }
                    Err(e) if e.is_conflict() && attempt < self.retries => {
                        attempt += 1;
                        warn!(id, attempt, "update conflict, retrying");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        info!(modified, "update applied");
        Ok(modified)
    }

    fn update_patch(
        &self,
        doc: &Document,
        operations: &[(UpdateOperator, &Document)],
    ) -> Result<Patch> {
        let version = doc.get(VERSION_FIELD).and_then(Value::as_u64).unwrap_or(0);
        let mut patch = Patch::new().expect_version(version);
        for (operator, fields) in operations {
            for (path, bundle) in fields.iter() {
                match operator {
                    UpdateOperator::Set => {
                        let indexed = get_path(doc, path)
                            .and_then(|stored| stored.get(Role::Index.as_str()))
                            .is_some();
                        if indexed {
                            return Err(Error::IndexedFieldUpdate(path.clone()));
                        }
                        patch = patch.set(path.clone(), bundle.clone());
                    }
                    UpdateOperator::Inc | UpdateOperator::Dec => {
                        let key = self
                            .additive
                            .as_ref()
                            .ok_or(Error::MissingKey(Role::Additive))?;
                        let target = format!("{}.{}", path, Role::Additive);
                        let delta = additive_ciphertext(
                            path,
                            bundle.get(Role::Additive.as_str()),
                            "update has no additive ciphertext",
                        )?;
                        let stored = additive_ciphertext(
                            path,
                            get_path(doc, &target),
                            "document has no additive ciphertext",
                        )?;
                        let delta = match operator {
                            UpdateOperator::Dec => key.negate(&delta)?,
                            _ => delta,
                        };
                        let combined = key.combine(&stored, &delta)?;
                        patch = patch.set(target, combined.to_string());
                    }
                }
            }
        }
        Ok(patch)
    }

    fn fetch(&self, ids: &BTreeSet<DocId>, projection: Option<&[String]>) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<DocId> = ids.iter().copied().collect();
        Ok(self.store().find_by_ids(self.name(), &ids, projection)?)
    }

    /// Drops the documents and every attribute index.
    pub fn drop(&self) -> Result<()> {
        self.index.drop_all()?;
        self.store().drop_collection(self.name())?;
        info!(collection = self.name(), "dropped");
        Ok(())
    }
}

fn additive_ciphertext(path: &str, raw: Option<&Value>, missing: &str) -> Result<PaillierCiphertext> {
    let raw = raw.ok_or_else(|| Error::UnsupportedValue {
        field: path.to_string(),
        reason: missing.to_string(),
    })?;
    Ok(serde_json::from_value(raw.clone())?)
}
