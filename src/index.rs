//! Encrypted order-preserving index.
//!
//! Each indexed attribute has an AVL tree stored as flat records in its own
//! collection, `<name>.index.<attribute>`. A node holds one right ORE
//! ciphertext and the ids of the documents carrying that value. The tree is
//! built and searched purely through ORE comparisons, so the store never
//! learns a plaintext.
pub mod bulk;
pub mod node;
pub mod search;
pub mod tree;

pub use self::bulk::BuildReport;
pub use self::node::{Node, NodeId};
pub use self::tree::InsertOutcome;

use crate::cancel::Interrupted;
use crate::ore::OreError;
use crate::store::{DocId, DocumentStore, Filter, StoreError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index invariant violated: {0}")]
    Invariant(String),
    #[error("bulk input is not sorted at position {position}")]
    UnsortedInput { position: usize },
    #[error("attribute {0} is already indexed")]
    AlreadyBuilt(String),
    #[error("cannot intersect an empty list of conditions")]
    EmptyQuery,
    #[error(transparent)]
    Ore(#[from] OreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("malformed index node: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    Greater,
    Less,
}

/// Index over all attributes of one document collection.
#[derive(Debug, Clone)]
pub struct EncryptedIndex<S> {
    store: S,
    name: String,
    retries: u32,
}

impl<S: DocumentStore> EncryptedIndex<S> {
    pub fn new(store: S, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
            retries: 3,
        }
    }

    /// Number of times an insertion is restarted after a write conflict.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection_for(&self, attribute: &str) -> String {
        format!("{}.index.{}", self.name, attribute)
    }

    /// Attributes that currently have a tree.
    pub fn attributes(&self) -> IndexResult<Vec<String>> {
        let prefix = format!("{}.index.", self.name);
        Ok(self
            .store
            .list_collections()?
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    pub fn root(&self, attribute: &str) -> IndexResult<Option<Node>> {
        self.root_in(&self.collection_for(attribute))
    }

    pub(crate) fn root_in(&self, collection: &str) -> IndexResult<Option<Node>> {
        self.store
            .find_one(collection, &Filter::eq("parent", Value::Null))?
            .map(Node::from_document)
            .transpose()
    }

    pub(crate) fn node_in(&self, collection: &str, id: NodeId) -> IndexResult<Node> {
        node::fetch_nodes(&self.store, collection, &[id])?
            .pop()
            .ok_or_else(|| IndexError::Invariant(format!("node {} is missing", id)))
    }

    /// Every node of the attribute's tree, in id order.
    pub fn nodes(&self, attribute: &str) -> IndexResult<Vec<Node>> {
        self.store
            .find_all(&self.collection_for(attribute), None)?
            .into_iter()
            .map(Node::from_document)
            .collect()
    }

    /// Checks the structure of the attribute's tree: a single root,
    /// symmetric parent and child links, non-empty references, exact heights
    /// and the AVL balance bound. Value order cannot be checked without the
    /// key.
    pub fn check_invariants(&self, attribute: &str) -> IndexResult<()> {
        let nodes: BTreeMap<NodeId, Node> = self
            .nodes(attribute)?
            .into_iter()
            .map(|n| (n.id, n))
            .collect();
        let fail = |msg: String| Err(IndexError::Invariant(format!("{}: {}", attribute, msg)));

        let roots = nodes.values().filter(|n| n.parent.is_none()).count();
        if !nodes.is_empty() && roots != 1 {
            return fail(format!("{} roots", roots));
        }

        let height = |id: Option<NodeId>| id.and_then(|id| nodes.get(&id)).map_or(0, |n| n.height);
        for node in nodes.values() {
            if node.references.is_empty() {
                return fail(format!("node {} has no references", node.id));
            }
            for child in [node.left, node.right].into_iter().flatten() {
                match nodes.get(&child) {
                    Some(c) if c.parent == Some(node.id) => {}
                    Some(_) => return fail(format!("node {} does not point back to {}", child, node.id)),
                    None => return fail(format!("node {} links missing node {}", node.id, child)),
                }
            }
            if let Some(parent) = node.parent {
                let linked = nodes
                    .get(&parent)
                    .map_or(false, |p| p.left == Some(node.id) || p.right == Some(node.id));
                if !linked {
                    return fail(format!("parent {} does not link node {}", parent, node.id));
                }
            }
            let (hl, hr) = (height(node.left), height(node.right));
            if node.height != 1 + hl.max(hr) {
                return fail(format!(
                    "node {} has height {}, expected {}",
                    node.id,
                    node.height,
                    1 + hl.max(hr)
                ));
            }
            if hl.abs_diff(hr) > 1 {
                return fail(format!("node {} is unbalanced ({} vs {})", node.id, hl, hr));
            }
        }
        Ok(())
    }

    pub fn drop_attribute(&self, attribute: &str) -> IndexResult<()> {
        Ok(self.store.drop_collection(&self.collection_for(attribute))?)
    }

    /// Drops the trees of every attribute.
    pub fn drop_all(&self) -> IndexResult<()> {
        for attribute in self.attributes()? {
            self.drop_attribute(&attribute)?;
        }
        Ok(())
    }
}

/// Ids present in every set. An empty list is an error rather than a match
/// of everything.
pub fn intersect(sets: Vec<BTreeSet<DocId>>) -> IndexResult<BTreeSet<DocId>> {
    let mut sets = sets.into_iter();
    let first = sets.next().ok_or(IndexError::EmptyQuery)?;
    Ok(sets.fold(first, |acc, set| acc.intersection(&set).copied().collect()))
}
