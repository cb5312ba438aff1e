//! Incremental insertion with AVL rebalancing.
//!
//! Rotations only rewrite link and height fields; ciphertexts never move
//! between nodes.
use crate::cancel::CancelToken;
use crate::index::node::{Node, NodeCache, NodeId, Side};
use crate::index::{EncryptedIndex, IndexError, IndexResult};
use crate::ore::OreCiphertext;
use crate::store::{DocId, DocumentStore, Patch, WriteOp};
use std::cmp::Ordering;
use tracing::{debug, instrument, warn};

/// What an insertion did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The attribute had no tree yet.
    CreatedRoot(NodeId),
    /// A new leaf was attached and `rotations` rotations restored balance.
    CreatedLeaf { node: NodeId, rotations: usize },
    /// The value was already present; the id joined the node's references.
    Appended(NodeId),
}

impl InsertOutcome {
    pub fn node(&self) -> NodeId {
        match *self {
            InsertOutcome::CreatedRoot(node)
            | InsertOutcome::CreatedLeaf { node, .. }
            | InsertOutcome::Appended(node) => node,
        }
    }
}

impl<S: DocumentStore> EncryptedIndex<S> {
    /// Inserts `doc` under the value encrypted in `ciphertext`.
    ///
    /// The walk compares the value's left token against each stored right
    /// ciphertext. All changes of one insertion are written in one atomic,
    /// version-guarded batch; on a write conflict the insertion restarts from
    /// the root, at most `retries` more times.
    #[instrument(level = "debug", skip(self, ciphertext, cancel), fields(collection = %self.name))]
    pub fn insert(
        &self,
        attribute: &str,
        ciphertext: &OreCiphertext,
        doc: DocId,
        cancel: &CancelToken,
    ) -> IndexResult<InsertOutcome> {
        let collection = self.collection_for(attribute);
        let mut attempt = 0;
        loop {
            cancel.check()?;
            match self.try_insert(&collection, attribute, ciphertext, doc, cancel) {
                Err(IndexError::Store(e)) if e.is_conflict() && attempt < self.retries => {
                    attempt += 1;
                    warn!(attribute, attempt, error = %e, "index write conflict, retrying");
                }
                result => return result,
            }
        }
    }

    fn try_insert(
        &self,
        collection: &str,
        attribute: &str,
        ciphertext: &OreCiphertext,
        doc: DocId,
        cancel: &CancelToken,
    ) -> IndexResult<InsertOutcome> {
        let root = match self.root_in(collection)? {
            Some(root) => root,
            None => {
                // Every tree's first node has id 0, so two racing creators
                // collide on the id instead of producing two roots.
                let node = Node::leaf(0, attribute, ciphertext.right.clone(), doc);
                self.store
                    .write_batch(collection, vec![WriteOp::Insert(node.to_document()?)])?;
                debug!(attribute, "created root");
                return Ok(InsertOutcome::CreatedRoot(0));
            }
        };

        self.insert_from(collection, attribute, ciphertext, doc, root, cancel)
    }

    /// Inserts below `root`, a snapshot of the tree's root. The snapshot is
    /// written back at the version it was read at, so a root that has been
    /// demoted or relinked since aborts the batch.
    pub(crate) fn insert_from(
        &self,
        collection: &str,
        attribute: &str,
        ciphertext: &OreCiphertext,
        doc: DocId,
        root: Node,
        cancel: &CancelToken,
    ) -> IndexResult<InsertOutcome> {
        let mut cache = NodeCache::new(&self.store, collection);
        let start = root.id;
        cache.seed(root);
        let outcome = match self.attach(&mut cache, attribute, ciphertext, doc, start, cancel) {
            Err(IndexError::Invariant(message)) => return Err(cache.inconsistency(message)),
            result => result?,
        };
        if let InsertOutcome::CreatedLeaf { .. } = outcome {
            self.store.write_batch(collection, cache.into_ops()?)?;
        }
        Ok(outcome)
    }

    /// Walks down from `start` and either appends to the node holding the
    /// value or links a new leaf into the cache and rebalances.
    fn attach(
        &self,
        cache: &mut NodeCache<'_, S>,
        attribute: &str,
        ciphertext: &OreCiphertext,
        doc: DocId,
        start: NodeId,
        cancel: &CancelToken,
    ) -> IndexResult<InsertOutcome> {
        let collection = cache.collection();
        let mut current = start;
        let mut iterations = 0usize;
        let (parent, side) = loop {
            cancel.check()?;
            iterations += 1;
            let node = cache.get(current)?;
            let side = match ciphertext.left.compare(&node.ct_right)? {
                Ordering::Equal => {
                    let patch = Patch::new().add_to_set("references", doc);
                    self.store.update_by_id(collection, current, &patch)?;
                    debug!(attribute, iterations, "appended to existing node");
                    return Ok(InsertOutcome::Appended(current));
                }
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };
            match node.child(side) {
                Some(child) => current = child,
                None => break (current, side),
            }
        };

        let id = self.store.next_id(collection)?;
        let mut leaf = Node::leaf(id, attribute, ciphertext.right.clone(), doc);
        leaf.parent = Some(parent);
        cache.create(leaf);
        cache.get_mut(parent)?.set_child(side, Some(id));

        let rotations = retrace(cache, parent)?;
        debug!(attribute, iterations, rotations, "attached leaf");
        Ok(InsertOutcome::CreatedLeaf { node: id, rotations })
    }
}

fn balance_of<S: DocumentStore + ?Sized>(
    cache: &mut NodeCache<'_, S>,
    id: NodeId,
) -> IndexResult<i64> {
    let (left, right) = {
        let node = cache.get(id)?;
        (node.left, node.right)
    };
    Ok(cache.height(left)? as i64 - cache.height(right)? as i64)
}

fn update_height<S: DocumentStore + ?Sized>(
    cache: &mut NodeCache<'_, S>,
    id: NodeId,
) -> IndexResult<()> {
    let (left, right, old) = {
        let node = cache.get(id)?;
        (node.left, node.right, node.height)
    };
    let height = 1 + cache.height(left)?.max(cache.height(right)?);
    if height != old {
        cache.get_mut(id)?.height = height;
    }
    Ok(())
}

/// Walks from `start` to the root fixing heights and rotating unbalanced
/// nodes. Returns the number of single rotations performed.
fn retrace<S: DocumentStore + ?Sized>(
    cache: &mut NodeCache<'_, S>,
    start: NodeId,
) -> IndexResult<usize> {
    let mut rotations = 0;
    let mut current = Some(start);
    while let Some(id) = current {
        update_height(cache, id)?;
        let top = if balance_of(cache, id)?.abs() > 1 {
            let (top, n) = rebalance(cache, id)?;
            rotations += n;
            top
        } else {
            id
        };
        current = cache.get(top)?.parent;
    }
    Ok(rotations)
}

/// Restores balance at `id` with a single or double rotation. Returns the
/// new subtree root and the number of rotations.
pub(crate) fn rebalance<S: DocumentStore + ?Sized>(
    cache: &mut NodeCache<'_, S>,
    id: NodeId,
) -> IndexResult<(NodeId, usize)> {
    let balance = balance_of(cache, id)?;
    let heavy = match balance {
        b if b > 1 => Side::Left,
        b if b < -1 => Side::Right,
        _ => {
            return Err(IndexError::Invariant(format!(
                "node {} is balanced ({}) and cannot be rotated",
                id, balance
            )))
        }
    };

    let child = cache.get(id)?.child(heavy).ok_or_else(|| {
        IndexError::Invariant(format!("node {} is {:?} heavy without a child there", id, heavy))
    })?;
    let child_balance = balance_of(cache, child)?;
    let inner_heavy = match heavy {
        Side::Left => child_balance < 0,
        Side::Right => child_balance > 0,
    };

    let mut rotations = 1;
    if inner_heavy {
        rotate(cache, child, heavy)?;
        rotations += 1;
    }
    let top = rotate(cache, id, heavy.opposite())?;
    debug!(node = id, rotations, "rebalanced");
    Ok((top, rotations))
}

/// Rotates the subtree at `id` towards `direction` and returns its new root.
/// Rotating right lifts the left child and vice versa.
pub(crate) fn rotate<S: DocumentStore + ?Sized>(
    cache: &mut NodeCache<'_, S>,
    id: NodeId,
    direction: Side,
) -> IndexResult<NodeId> {
    let lifted_side = direction.opposite();
    let (pivot, parent) = {
        let node = cache.get(id)?;
        let pivot = node.child(lifted_side).ok_or_else(|| {
            IndexError::Invariant(format!(
                "cannot rotate node {} {:?}: no {:?} child",
                id, direction, lifted_side
            ))
        })?;
        (pivot, node.parent)
    };
    let inner = cache.get(pivot)?.child(direction);

    {
        let node = cache.get_mut(id)?;
        node.set_child(lifted_side, inner);
        node.parent = Some(pivot);
    }
    if let Some(inner) = inner {
        cache.get_mut(inner)?.parent = Some(id);
    }
    {
        let node = cache.get_mut(pivot)?;
        node.set_child(direction, Some(id));
        node.parent = parent;
    }
    if let Some(parent) = parent {
        let node = cache.get_mut(parent)?;
        if node.left == Some(id) {
            node.left = Some(pivot);
        } else if node.right == Some(id) {
            node.right = Some(pivot);
        } else {
            return Err(IndexError::Invariant(format!(
                "node {} does not link back to child {}",
                parent, id
            )));
        }
    }

    update_height(cache, id)?;
    update_height(cache, pivot)?;
    Ok(pivot)
}
