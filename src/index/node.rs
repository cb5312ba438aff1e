use crate::index::{IndexError, IndexResult};
use crate::ore::OreRight;
use crate::store::{doc_id, DocId, Document, DocumentStore, Patch, StoreError, WriteOp, VERSION_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub type NodeId = u64;

/// One distinct plaintext of an attribute. Only the right ORE ciphertext is
/// kept; there is no plaintext link between the node and its documents
/// beyond the `references` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: NodeId,
    #[serde(rename = "_version", default, skip_serializing)]
    pub version: u64,
    pub attribute: String,
    pub ct_right: OreRight,
    pub parent: Option<NodeId>,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    /// Subtree height, a leaf has height 1.
    pub height: u32,
    pub references: BTreeSet<DocId>,
}

impl Node {
    pub fn leaf(id: NodeId, attribute: &str, ct_right: OreRight, doc: DocId) -> Self {
        Self {
            id,
            version: 0,
            attribute: attribute.to_string(),
            ct_right,
            parent: None,
            left: None,
            right: None,
            height: 1,
            references: BTreeSet::from([doc]),
        }
    }

    pub fn from_document(doc: Document) -> IndexResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    pub fn to_document(&self) -> IndexResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            _ => Err(IndexError::Invariant("node did not serialize to an object".into())),
        }
    }

    pub fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub fn set_child(&mut self, side: Side, child: Option<NodeId>) {
        match side {
            Side::Left => self.left = child,
            Side::Right => self.right = child,
        }
    }

    /// Link fields rewritten by rotations and height updates.
    fn structure_patch(&self) -> Patch {
        Patch::new()
            .set("parent", self.parent)
            .set("left", self.left)
            .set("right", self.right)
            .set("height", self.height)
            .expect_version(self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Reads a batch of nodes. A requested id that is not stored means a link
/// points nowhere, which is reported as corruption.
pub(crate) fn fetch_nodes<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    ids: &[NodeId],
) -> IndexResult<Vec<Node>> {
    let docs = store.find_by_ids(collection, ids, None)?;
    if docs.len() != ids.len() {
        return Err(IndexError::Invariant(format!(
            "{} of {} linked nodes are missing from {}",
            ids.len() - docs.len(),
            ids.len(),
            collection
        )));
    }
    docs.into_iter().map(Node::from_document).collect()
}

/// Copy-on-read view of the nodes touched by one insertion.
///
/// Nodes are read at most once per attempt. Every node read is written back
/// in a single batch guarded by the version it was read at, so any concurrent
/// change to a node this attempt looked at fails the whole batch.
pub(crate) struct NodeCache<'a, S: ?Sized> {
    store: &'a S,
    collection: &'a str,
    nodes: BTreeMap<NodeId, Node>,
    created: BTreeSet<NodeId>,
}

impl<'a, S: DocumentStore + ?Sized> NodeCache<'a, S> {
    pub fn new(store: &'a S, collection: &'a str) -> Self {
        Self {
            store,
            collection,
            nodes: BTreeMap::new(),
            created: BTreeSet::new(),
        }
    }

    pub fn collection(&self) -> &'a str {
        self.collection
    }

    /// Adds a node read elsewhere, keeping the version it was read at.
    pub fn seed(&mut self, node: Node) {
        self.nodes.entry(node.id).or_insert(node);
    }

    pub fn get(&mut self, id: NodeId) -> IndexResult<&Node> {
        self.get_mut(id).map(|node| &*node)
    }

    pub fn get_mut(&mut self, id: NodeId) -> IndexResult<&mut Node> {
        if !self.nodes.contains_key(&id) {
            let node = fetch_nodes(self.store, self.collection, &[id])?
                .pop()
                .ok_or_else(|| IndexError::Invariant(format!("node {} is missing", id)))?;
            self.nodes.insert(id, node);
        }
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| IndexError::Invariant(format!("node {} is missing", id)))
    }

    pub fn height(&mut self, id: Option<NodeId>) -> IndexResult<u32> {
        match id {
            Some(id) => Ok(self.get(id)?.height),
            None => Ok(0),
        }
    }

    pub fn create(&mut self, node: Node) {
        self.created.insert(node.id);
        self.nodes.insert(node.id, node);
    }

    /// Classifies a broken link met while working on the cache. Nodes are
    /// read one at a time, so a link that does not match may come from two
    /// snapshots taken around a concurrent write. If any read node has moved
    /// on since, the error is that conflict; otherwise the stored tree itself
    /// is broken.
    pub fn inconsistency(&self, message: String) -> IndexError {
        let read: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !self.created.contains(id))
            .copied()
            .collect();
        let stored = match self.store.find_by_ids(self.collection, &read, None) {
            Ok(stored) => stored,
            Err(e) => return IndexError::Store(e),
        };
        for doc in &stored {
            let id = doc_id(doc);
            let actual = doc.get(VERSION_FIELD).and_then(Value::as_u64).unwrap_or(0);
            let cached = id.and_then(|id| self.nodes.get(&id));
            if let (Some(id), Some(node)) = (id, cached) {
                if node.version != actual {
                    return IndexError::Store(StoreError::WriteConflict {
                        collection: self.collection.to_string(),
                        id,
                        expected: node.version,
                        actual,
                    });
                }
            }
        }
        IndexError::Invariant(message)
    }

    pub fn into_ops(self) -> IndexResult<Vec<WriteOp>> {
        let mut ops = Vec::with_capacity(self.nodes.len());
        for (id, node) in &self.nodes {
            if self.created.contains(id) {
                ops.push(WriteOp::Insert(node.to_document()?));
            } else {
                ops.push(WriteOp::Update {
                    id: *id,
                    patch: node.structure_patch(),
                });
            }
        }
        Ok(ops)
    }
}
