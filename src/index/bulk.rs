//! Balanced construction from client-sorted input.
use crate::cancel::CancelToken;
use crate::index::node::{Node, NodeId};
use crate::index::{EncryptedIndex, IndexError, IndexResult};
use crate::ore::OreCiphertext;
use crate::store::{DocId, DocumentStore, WriteOp};
use std::cmp::Ordering;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    /// Distinct values, one node each.
    pub nodes: usize,
    pub references: usize,
    pub height: u32,
}

struct Group<'a> {
    ciphertext: &'a OreCiphertext,
    references: Vec<DocId>,
}

impl<S: DocumentStore> EncryptedIndex<S> {
    /// Builds the tree for `attribute` in one pass.
    ///
    /// `entries` must be sorted by plaintext; the store cannot sort them.
    /// Equal neighbours (by ORE comparison) collapse into one node. Node ids
    /// follow the sorted order starting at 0 and the whole tree is written in
    /// one batch.
    #[instrument(level = "debug", skip(self, entries, cancel), fields(collection = %self.name, entries = entries.len()))]
    pub fn bulk_build(
        &self,
        attribute: &str,
        entries: &[(OreCiphertext, DocId)],
        cancel: &CancelToken,
    ) -> IndexResult<BuildReport> {
        let collection = self.collection_for(attribute);
        if self.root_in(&collection)?.is_some() {
            return Err(IndexError::AlreadyBuilt(attribute.to_string()));
        }

        let groups = group_sorted(entries, cancel)?;
        if groups.is_empty() {
            return Ok(BuildReport {
                nodes: 0,
                references: 0,
                height: 0,
            });
        }

        let mut nodes: Vec<Node> = groups
            .iter()
            .enumerate()
            .map(|(i, group)| Node {
                id: i as NodeId,
                version: 0,
                attribute: attribute.to_string(),
                ct_right: group.ciphertext.right.clone(),
                parent: None,
                left: None,
                right: None,
                height: 1,
                references: group.references.iter().copied().collect(),
            })
            .collect();
        let last = nodes.len() - 1;
        let (_, height) = link(&mut nodes, 0, last, None);

        let ops = nodes
            .iter()
            .map(|node| node.to_document().map(WriteOp::Insert))
            .collect::<IndexResult<Vec<_>>>()?;
        cancel.check()?;
        self.store.write_batch(&collection, ops)?;

        let report = BuildReport {
            nodes: nodes.len(),
            references: entries.len(),
            height,
        };
        info!(attribute, nodes = report.nodes, height, "bulk built index");
        Ok(report)
    }
}

fn group_sorted<'a>(
    entries: &'a [(OreCiphertext, DocId)],
    cancel: &CancelToken,
) -> IndexResult<Vec<Group<'a>>> {
    let mut groups: Vec<Group<'a>> = Vec::new();
    for (position, (ciphertext, doc)) in entries.iter().enumerate() {
        if position % 1024 == 0 {
            cancel.check()?;
        }
        if let Some(last) = groups.last_mut() {
            match ciphertext.left.compare(&last.ciphertext.right)? {
                Ordering::Equal => {
                    last.references.push(*doc);
                    continue;
                }
                Ordering::Less => return Err(IndexError::UnsortedInput { position }),
                Ordering::Greater => {}
            }
        }
        groups.push(Group {
            ciphertext,
            references: vec![*doc],
        });
    }
    Ok(groups)
}

/// Links `nodes[lo..=hi]` into a balanced subtree rooted at the midpoint.
/// Returns the subtree root and its height.
fn link(nodes: &mut [Node], lo: usize, hi: usize, parent: Option<NodeId>) -> (NodeId, u32) {
    let mid = lo + (hi - lo) / 2;
    let id = nodes[mid].id;
    let (left, left_height) = if mid > lo {
        let (child, h) = link(nodes, lo, mid - 1, Some(id));
        (Some(child), h)
    } else {
        (None, 0)
    };
    let (right, right_height) = if mid < hi {
        let (child, h) = link(nodes, mid + 1, hi, Some(id));
        (Some(child), h)
    } else {
        (None, 0)
    };

    let node = &mut nodes[mid];
    node.parent = parent;
    node.left = left;
    node.right = right;
    node.height = 1 + left_height.max(right_height);
    (id, node.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ore::{OreCipher, OreKey, OreParams};
    use crate::store::MemoryStore;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::collections::BTreeSet;

    fn entries(values: &[u64]) -> Vec<(OreCiphertext, DocId)> {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let ore = OreCipher::init(&OreKey::generate(&mut rng), OreParams::default()).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (ore.encrypt(*v, &mut rng).unwrap(), i as DocId))
            .collect()
    }

    #[test]
    fn groups_duplicates() {
        let index = EncryptedIndex::new(MemoryStore::new(), "got");
        let report = index
            .bulk_build("age", &entries(&[12, 16, 35, 35, 40]), &CancelToken::new())
            .unwrap();
        assert_eq!(report.nodes, 4);
        assert_eq!(report.references, 5);
        assert_eq!(report.height, 3);

        let nodes = index.nodes("age").unwrap();
        assert_eq!(nodes[2].references, BTreeSet::from([2, 3]));
        index.check_invariants("age").unwrap();
    }

    #[test]
    fn midpoint_layout() {
        let index = EncryptedIndex::new(MemoryStore::new(), "got");
        index
            .bulk_build("age", &entries(&[1, 2, 3, 4, 5, 6, 7]), &CancelToken::new())
            .unwrap();
        let root = index.root("age").unwrap().unwrap();
        assert_eq!((root.id, root.left, root.right, root.height), (3, Some(1), Some(5), 3));
    }

    #[test]
    fn rejects_unsorted() {
        let index = EncryptedIndex::new(MemoryStore::new(), "got");
        assert!(matches!(
            index.bulk_build("age", &entries(&[1, 5, 3]), &CancelToken::new()),
            Err(IndexError::UnsortedInput { position: 2 })
        ));
        assert!(index.root("age").unwrap().is_none());
    }

    #[test]
    fn refuses_existing_tree() {
        let index = EncryptedIndex::new(MemoryStore::new(), "got");
        let input = entries(&[1, 2]);
        index.bulk_build("age", &input, &CancelToken::new()).unwrap();
        assert!(matches!(
            index.bulk_build("age", &input, &CancelToken::new()),
            Err(IndexError::AlreadyBuilt(_))
        ));
    }

    #[test]
    fn empty_input_builds_nothing() {
        let index = EncryptedIndex::new(MemoryStore::new(), "got");
        let report = index.bulk_build("age", &[], &CancelToken::new()).unwrap();
        assert_eq!(report.nodes, 0);
        assert!(index.nodes("age").unwrap().is_empty());
    }
}
