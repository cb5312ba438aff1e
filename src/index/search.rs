use crate::cancel::CancelToken;
use crate::index::node::{fetch_nodes, Node, NodeId};
use crate::index::{EncryptedIndex, IndexResult, Relation};
use crate::ore::OreLeft;
use crate::store::{DocId, DocumentStore};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, instrument};

impl<S: DocumentStore> EncryptedIndex<S> {
    /// Ids of documents whose value stands in `relation` to the value behind
    /// `token`. Inequalities are strict.
    ///
    /// Walks a single root-to-leaf path. For an inequality, every node found
    /// on the wanted side contributes its references and its whole far
    /// subtree, and the walk continues toward the bound.
    #[instrument(level = "debug", skip(self, token, cancel), fields(collection = %self.name))]
    pub fn search(
        &self,
        attribute: &str,
        token: &OreLeft,
        relation: Relation,
        cancel: &CancelToken,
    ) -> IndexResult<BTreeSet<DocId>> {
        let collection = self.collection_for(attribute);
        let mut found = BTreeSet::new();
        let mut current = self.root_in(&collection)?;
        let mut iterations = 0usize;

        while let Some(node) = current {
            cancel.check()?;
            iterations += 1;
            // Ordering of the searched value relative to this node
            let ordering = token.compare(&node.ct_right)?;
            let next = match (relation, ordering) {
                (Relation::Equal, Ordering::Equal) => {
                    found.extend(&node.references);
                    None
                }
                (Relation::Equal, Ordering::Less) => node.left,
                (Relation::Equal, Ordering::Greater) => node.right,

                (Relation::Greater, Ordering::Less) => {
                    found.extend(&node.references);
                    self.collect_subtree(&collection, node.right, &mut found, cancel)?;
                    node.left
                }
                (Relation::Greater, Ordering::Equal) => {
                    self.collect_subtree(&collection, node.right, &mut found, cancel)?;
                    None
                }
                (Relation::Greater, Ordering::Greater) => node.right,

                (Relation::Less, Ordering::Greater) => {
                    found.extend(&node.references);
                    self.collect_subtree(&collection, node.left, &mut found, cancel)?;
                    node.right
                }
                (Relation::Less, Ordering::Equal) => {
                    self.collect_subtree(&collection, node.left, &mut found, cancel)?;
                    None
                }
                (Relation::Less, Ordering::Less) => node.left,
            };
            current = match next {
                Some(id) => Some(self.node_in(&collection, id)?),
                None => None,
            };
        }

        debug!(attribute, ?relation, iterations, matches = found.len(), "search finished");
        Ok(found)
    }

    /// Ids of documents with values in `[low, high]`, both ends inclusive.
    #[instrument(level = "debug", skip(self, low, high, cancel), fields(collection = %self.name))]
    pub fn search_range(
        &self,
        attribute: &str,
        low: &OreLeft,
        high: &OreLeft,
        cancel: &CancelToken,
    ) -> IndexResult<BTreeSet<DocId>> {
        let collection = self.collection_for(attribute);
        let mut found = BTreeSet::new();
        let mut frontier: Vec<Node> = self.root_in(&collection)?.into_iter().collect();
        let mut visited = HashSet::new();

        while !frontier.is_empty() {
            cancel.check()?;
            let mut next = Vec::new();
            for node in frontier.drain(..) {
                if !visited.insert(node.id) {
                    continue;
                }
                let low_ord = low.compare(&node.ct_right)?;
                let high_ord = high.compare(&node.ct_right)?;
                if low_ord != Ordering::Greater && high_ord != Ordering::Less {
                    found.extend(&node.references);
                }
                if low_ord == Ordering::Less {
                    next.extend(node.left);
                }
                if high_ord == Ordering::Greater {
                    next.extend(node.right);
                }
            }
            next.retain(|id| !visited.contains(id));
            if !next.is_empty() {
                frontier = fetch_nodes(&self.store, &collection, &next)?;
            }
        }

        debug!(attribute, visited = visited.len(), matches = found.len(), "range search finished");
        Ok(found)
    }

    /// Adds the references of every node under `start`, level by level.
    fn collect_subtree(
        &self,
        collection: &str,
        start: Option<NodeId>,
        found: &mut BTreeSet<DocId>,
        cancel: &CancelToken,
    ) -> IndexResult<()> {
        let mut frontier: Vec<NodeId> = start.into_iter().collect();
        let mut visited = HashSet::new();
        while !frontier.is_empty() {
            cancel.check()?;
            frontier.retain(|id| visited.insert(*id));
            let mut next = Vec::new();
            for node in fetch_nodes(&self.store, collection, &frontier)? {
                found.extend(&node.references);
                next.extend(node.left);
                next.extend(node.right);
            }
            frontier = next;
        }
        Ok(())
    }
}
