//! Incremental shard-of-trees Merkle accumulator
//!
//! Leaves fill tree 0 left to right; once a tree holds `2^depth` leaves the
//! next insert opens the following tree at index 0. Global leaf numbering is
//! `tree * 2^depth + index`.
//!
//! Structural mutations are single-writer: the write guard owns the Poseidon
//! instance and is taken with `try_lock`, so a concurrent insert fails fast
//! with [`PoiError::AccumulatorBusy`] instead of queueing behind the writer.
//! Reads (proofs, roots) never take the write guard.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use poi_core::hash::{normalize_hex, zero_values, MerkleHasher};
use poi_core::{Chain, MerkleProof, PoiError, Result};
use poi_store::{DocumentStore, LeafPosition, MerklerootDb, MerkletreeDb, StoredMerkleroot};
use tokio::sync::Mutex;

/// Depth of every production tree.
pub const TREE_DEPTH: usize = 16;

/// Global leaf index of `(tree, index)` for a tree of `depth`.
pub fn global_leaf_index(depth: usize, tree: u32, index: u32) -> u64 {
    (u64::from(tree) << depth) + u64::from(index)
}

/// Result of an insert that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafInsert {
    /// Leaf written; the new root of its tree
    Inserted {
        /// Root after the insert
        root: String,
    },
    /// Same leaf was already at that position
    AlreadyApplied,
}

type NodeId = (u32, u8, u32);

/// Accumulator for one scope (a list, or the txid ledger) on one chain.
pub struct Accumulator {
    label: String,
    chain: Chain,
    depth: usize,
    zeros: Vec<String>,
    nodes: MerkletreeDb,
    roots: MerklerootDb,
    cache: RwLock<HashMap<NodeId, String>>,
    tree_lengths: RwLock<Vec<u64>>,
    writer: Mutex<MerkleHasher>,
}

impl std::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator")
            .field("label", &self.label)
            .field("chain", &self.chain)
            .field("depth", &self.depth)
            .field("tree_lengths", &*self.tree_lengths.read())
            .finish_non_exhaustive()
    }
}

impl Accumulator {
    /// Open the accumulator of `scope` and inflate its tree lengths from the store.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        chain: Chain,
        scope: &str,
        depth: usize,
    ) -> Result<Self> {
        if depth == 0 || depth > TREE_DEPTH {
            return Err(PoiError::config(format!("tree depth must be 1..={TREE_DEPTH}")));
        }
        let accumulator = Self {
            label: scope.to_string(),
            chain,
            depth,
            zeros: zero_values(depth)?,
            nodes: MerkletreeDb::new(store.clone(), chain, scope),
            roots: MerklerootDb::new(store, chain, scope),
            cache: RwLock::new(HashMap::new()),
            tree_lengths: RwLock::new(Vec::new()),
            writer: Mutex::new(MerkleHasher::new()?),
        };
        accumulator.inflate().await?;
        Ok(accumulator)
    }

    /// Scope label used in logs and busy errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Tree depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Leaves per tree.
    pub fn tree_capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Zero constants `Z[0..=depth]`.
    pub fn zeros(&self) -> &[String] {
        &self.zeros
    }

    /// Global leaf index of `(tree, index)`.
    pub fn get_global_index(&self, tree: u32, index: u32) -> u64 {
        global_leaf_index(self.depth, tree, index)
    }

    fn position_of_global(&self, global: u64) -> Result<(u32, u32)> {
        let tree = u32::try_from(global >> self.depth)
            .map_err(|_| PoiError::ordering(format!("leaf index {global} out of range")))?;
        // Masked to `depth` bits, always fits
        let index = (global & (self.tree_capacity() - 1)) as u32;
        Ok((tree, index))
    }

    /// Rebuild the tree-length cache from the store and drop cached nodes.
    pub async fn inflate(&self) -> Result<()> {
        let mut lengths = Vec::new();
        if let Some(latest) = self.nodes.latest_tree().await? {
            for tree in 0..=latest {
                lengths.push(self.nodes.leaf_count(tree).await?);
            }
        }
        while lengths.last() == Some(&0) {
            lengths.pop();
        }
        tracing::debug!(scope = %self.label, chain = %self.chain, trees = lengths.len(), "inflated accumulator");
        *self.tree_lengths.write() = lengths;
        self.cache.write().clear();
        Ok(())
    }

    /// Next free `(tree, index)`.
    pub fn next_position(&self) -> (u32, u32) {
        let lengths = self.tree_lengths.read();
        match lengths.last() {
            None => (0, 0),
            Some(&len) => {
                let tree = (lengths.len() - 1) as u32;
                if len >= self.tree_capacity() {
                    (tree + 1, 0)
                } else {
                    (tree, len as u32)
                }
            }
        }
    }

    /// Total number of leaves across all trees.
    pub fn leaf_count(&self) -> u64 {
        let (tree, index) = self.next_position();
        self.get_global_index(tree, index)
    }

    /// Index of the tree currently being filled (or last filled).
    pub fn latest_tree(&self) -> u32 {
        let lengths = self.tree_lengths.read();
        lengths.len().saturating_sub(1) as u32
    }

    async fn node(&self, tree: u32, level: u8, index: u32) -> Result<Option<String>> {
        let cached = self.cache.read().get(&(tree, level, index)).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let stored = self.nodes.get_node(tree, level, index).await?;
        if let Some(hash) = &stored {
            self.cache.write().insert((tree, level, index), hash.clone());
        }
        Ok(stored)
    }

    async fn node_or_zero(&self, tree: u32, level: u8, index: u32) -> Result<String> {
        Ok(self
            .node(tree, level, index)
            .await?
            .unwrap_or_else(|| self.zeros[level as usize].clone()))
    }

    /// Root of `tree`; an empty tree's root is `Z[depth]`.
    pub async fn root(&self, tree: u32) -> Result<String> {
        self.node_or_zero(tree, self.depth as u8, 0).await
    }

    /// Root of the latest tree.
    pub async fn latest_root(&self) -> Result<String> {
        self.root(self.latest_tree()).await
    }

    /// Leaf at a global index, if present.
    pub async fn leaf_at(&self, global: u64) -> Result<Option<String>> {
        let (tree, index) = self.position_of_global(global)?;
        self.node(tree, 0, index).await
    }

    /// Position of a commitment, if it is a leaf.
    pub async fn position_of(&self, commitment: &str) -> Result<Option<LeafPosition>> {
        Ok(self.nodes.leaf_position(&normalize_hex(commitment)).await?)
    }

    /// Whether a commitment is a leaf.
    pub async fn contains(&self, commitment: &str) -> Result<bool> {
        Ok(self.position_of(commitment).await?.is_some())
    }

    /// Whether `root` was ever a root of this accumulator.
    pub async fn has_historical_root(&self, root: &str) -> Result<bool> {
        Ok(self.roots.contains(&normalize_hex(root)).await?)
    }

    /// Root recorded after the leaf at `global` was inserted.
    pub async fn root_at(&self, global: u64) -> Result<Option<String>> {
        Ok(self.roots.root_at(global).await?.map(|root| root.root_hash))
    }

    /// Insert `commitment` at `global_leaf_index`.
    ///
    /// Replaying a leaf already at that position is a no-op. Any other
    /// position mismatch, a zero or duplicate leaf, or a concurrent writer is
    /// an ordering error. When `expected_root` is given the new root must
    /// match it; nothing is written otherwise.
    pub async fn insert_leaf(
        &self,
        global_leaf_index: u64,
        commitment: &str,
        expected_root: Option<&str>,
    ) -> Result<LeafInsert> {
        let mut hasher = self
            .writer
            .try_lock()
            .map_err(|_| PoiError::busy(self.label.clone()))?;

        let leaf = normalize_hex(commitment);
        if leaf == self.zeros[0] {
            return Err(PoiError::ordering(format!("{}: zero leaf rejected", self.label)));
        }

        let (tree, index) = self.next_position();
        let expected_global = self.get_global_index(tree, index);
        if global_leaf_index < expected_global {
            return match self.leaf_at(global_leaf_index).await? {
                Some(existing) if existing == leaf => Ok(LeafInsert::AlreadyApplied),
                _ => Err(PoiError::ordering(format!(
                    "{}: leaf {global_leaf_index} already holds a different commitment",
                    self.label
                ))),
            };
        }
        if global_leaf_index > expected_global {
            return Err(PoiError::ordering(format!(
                "{}: expected leaf index {expected_global}, got {global_leaf_index}",
                self.label
            )));
        }

        if expected_global > 0 {
            match self.leaf_at(expected_global - 1).await? {
                Some(previous) if previous == leaf => {
                    return Err(PoiError::ordering(format!(
                        "{}: leaf repeats previous leaf",
                        self.label
                    )));
                }
                Some(previous) if previous == self.zeros[0] => {
                    return Err(PoiError::ordering(format!(
                        "{}: previous leaf is the zero value",
                        self.label
                    )));
                }
                _ => {}
            }
        }
        if self.contains(&leaf).await? {
            return Err(PoiError::ordering(format!(
                "{}: duplicate leaf {leaf}",
                self.label
            )));
        }

        // Compute the path first so a root mismatch leaves the store untouched
        let mut path = Vec::with_capacity(self.depth);
        let mut current = leaf.clone();
        let mut position = index;
        for level in 0..self.depth {
            let sibling = self.node_or_zero(tree, level as u8, position ^ 1).await?;
            current = if position % 2 == 0 {
                hasher.hash_left_right(&current, &sibling)?
            } else {
                hasher.hash_left_right(&sibling, &current)?
            };
            position /= 2;
            path.push(((level + 1) as u8, position, current.clone()));
        }
        let root = current;

        if let Some(expected) = expected_root {
            if normalize_hex(expected) != root {
                return Err(PoiError::validation(format!(
                    "{}: merkleroot mismatch at leaf {global_leaf_index}: expected {expected}, computed {root}",
                    self.label
                )));
            }
        }

        if !self.nodes.insert_leaf(tree, index, &leaf).await? {
            return Err(PoiError::ordering(format!(
                "{}: leaf slot {global_leaf_index} already written",
                self.label
            )));
        }
        self.cache.write().insert((tree, 0, index), leaf);
        for (level, position, hash) in &path {
            self.nodes.upsert_node(tree, *level, *position, hash).await?;
            self.cache.write().insert((tree, *level, *position), hash.clone());
        }
        self.roots
            .insert(&StoredMerkleroot {
                tree,
                root_hash: root.clone(),
                global_leaf_index,
            })
            .await?;

        {
            let mut lengths = self.tree_lengths.write();
            let slot = tree as usize;
            if lengths.len() <= slot {
                lengths.resize(slot + 1, 0);
            }
            lengths[slot] = u64::from(index) + 1;
        }

        tracing::trace!(scope = %self.label, chain = %self.chain, tree, index, "inserted leaf");
        Ok(LeafInsert::Inserted { root })
    }

    /// Inclusion proof for `(tree, index)`.
    pub async fn get_merkle_proof(&self, tree: u32, index: u32) -> Result<MerkleProof> {
        let leaf = self.node(tree, 0, index).await?.ok_or_else(|| {
            PoiError::validation(format!("{}: no leaf at tree {tree} index {index}", self.label))
        })?;
        let mut elements = Vec::with_capacity(self.depth);
        for level in 0..self.depth {
            let sibling = (index >> level) ^ 1;
            elements.push(self.node_or_zero(tree, level as u8, sibling).await?);
        }
        Ok(MerkleProof {
            leaf,
            elements,
            indices: normalize_hex(&format!("{index:x}")),
            root: self.root(tree).await?,
        })
    }

    /// Inclusion proof for a commitment.
    pub async fn get_merkle_proof_from_commitment(&self, commitment: &str) -> Result<MerkleProof> {
        let position = self.position_of(commitment).await?.ok_or_else(|| {
            PoiError::validation(format!("{}: commitment {commitment} not found", self.label))
        })?;
        self.get_merkle_proof(position.tree, position.index).await
    }

    /// Recompute every internal node of `tree` from its stored leaves.
    pub async fn rebuild_tree(&self, tree: u32) -> Result<String> {
        let mut hasher = self
            .writer
            .try_lock()
            .map_err(|_| PoiError::busy(self.label.clone()))?;
        self.rebuild_locked(&mut hasher, tree).await
    }

    async fn rebuild_locked(&self, hasher: &mut MerkleHasher, tree: u32) -> Result<String> {
        let leaves = self.nodes.leaves(tree).await?;
        for (expected, leaf) in leaves.iter().enumerate() {
            if leaf.index as usize != expected {
                return Err(PoiError::internal(format!(
                    "{}: tree {tree} has a gap at leaf {expected}",
                    self.label
                )));
            }
        }
        self.nodes.delete_internal_nodes(tree).await?;
        self.cache.write().retain(|(t, _, _), _| *t != tree);

        let mut level_nodes: Vec<String> = leaves.into_iter().map(|leaf| leaf.node_hash).collect();
        let leaf_count = level_nodes.len() as u64;
        for level in 0..self.depth {
            let zero = &self.zeros[level];
            let mut next = Vec::with_capacity(level_nodes.len().div_ceil(2));
            for pair in level_nodes.chunks(2) {
                let right = pair.get(1).unwrap_or(zero);
                next.push(hasher.hash_left_right(&pair[0], right)?);
            }
            for (position, hash) in next.iter().enumerate() {
                self.nodes
                    .upsert_node(tree, (level + 1) as u8, position as u32, hash)
                    .await?;
            }
            level_nodes = next;
        }

        {
            let mut lengths = self.tree_lengths.write();
            let slot = tree as usize;
            if lengths.len() <= slot {
                lengths.resize(slot + 1, 0);
            }
            lengths[slot] = leaf_count;
            while lengths.last() == Some(&0) {
                lengths.pop();
            }
        }

        let root = level_nodes
            .into_iter()
            .next()
            .unwrap_or_else(|| self.zeros[self.depth].clone());
        tracing::info!(scope = %self.label, chain = %self.chain, tree, leaves = leaf_count, "rebuilt tree");
        Ok(root)
    }

    /// Drop every leaf at global index `length` and above, keeping `length` leaves.
    pub async fn truncate(&self, length: u64) -> Result<()> {
        let mut hasher = self
            .writer
            .try_lock()
            .map_err(|_| PoiError::busy(self.label.clone()))?;
        let current = self.leaf_count();
        if length >= current {
            return Ok(());
        }
        let (keep_tree, keep_index) = self.position_of_global(length)?;
        let last_tree = self.latest_tree();
        for tree in (keep_tree + 1)..=last_tree {
            self.nodes.delete_tree(tree).await?;
        }
        self.nodes.delete_leaves_from(keep_tree, keep_index).await?;
        self.roots.delete_from(length).await?;
        self.cache.write().clear();
        {
            let mut lengths = self.tree_lengths.write();
            lengths.truncate(keep_tree as usize + 1);
        }
        self.rebuild_locked(&mut hasher, keep_tree).await?;
        tracing::warn!(scope = %self.label, chain = %self.chain, from = current, to = length, "truncated accumulator");
        Ok(())
    }

    /// Remove every node and root.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self
            .writer
            .try_lock()
            .map_err(|_| PoiError::busy(self.label.clone()))?;
        self.nodes.clear().await?;
        self.roots.clear().await?;
        self.cache.write().clear();
        self.tree_lengths.write().clear();
        tracing::warn!(scope = %self.label, chain = %self.chain, "cleared accumulator");
        Ok(())
    }
}

/// Fold `proof.elements` into `proof.leaf` and compare with `proof.root`.
///
/// Malformed proofs (bad hex, too many levels) verify as `false`.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    fold_proof(proof).map_or(false, |root| root == normalize_hex(&proof.root))
}

fn fold_proof(proof: &MerkleProof) -> Result<String> {
    let trimmed = proof.indices.trim_start_matches("0x").trim_start_matches('0');
    let indices = if trimmed.is_empty() {
        0
    } else {
        u64::from_str_radix(trimmed, 16)
            .map_err(|e| PoiError::validation(format!("invalid proof indices: {e}")))?
    };
    if proof.elements.len() < 64 && indices >> proof.elements.len() != 0 {
        return Err(PoiError::validation("proof indices exceed proof depth"));
    }
    let mut hasher = MerkleHasher::new()?;
    let mut current = normalize_hex(&proof.leaf);
    for (level, element) in proof.elements.iter().enumerate() {
        current = if (indices >> level) & 1 == 0 {
            hasher.hash_left_right(&current, element)?
        } else {
            hasher.hash_left_right(element, &current)?
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_core::testing::test_chain;
    use poi_store::MemoryDocumentStore;
    use proptest::prelude::*;

    async fn accumulator(depth: usize) -> Accumulator {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        Accumulator::open(store, test_chain(), "list", depth).await.unwrap()
    }

    async fn insert_all(acc: &Accumulator, leaves: &[&str]) {
        for (i, leaf) in leaves.iter().enumerate() {
            acc.insert_leaf(i as u64, leaf, None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_empty_tree_root_is_top_zero() {
        let acc = accumulator(TREE_DEPTH).await;
        assert_eq!(acc.zeros().len(), TREE_DEPTH + 1);
        assert_eq!(acc.latest_root().await.unwrap(), acc.zeros()[TREE_DEPTH]);
        assert_eq!(acc.next_position(), (0, 0));
    }

    #[tokio::test]
    async fn test_proof_for_leaf_10_folds_to_root() {
        let acc = accumulator(TREE_DEPTH).await;
        insert_all(&acc, &["02", "04", "08", "10", "20", "40"]).await;

        let proof = acc.get_merkle_proof(0, 3).await.unwrap();
        assert_eq!(proof.leaf, normalize_hex("10"));
        assert_eq!(proof.elements.len(), TREE_DEPTH);
        assert_eq!(proof.root, acc.latest_root().await.unwrap());
        assert!(verify_proof(&proof));

        let from_commitment = acc.get_merkle_proof_from_commitment("0x10").await.unwrap();
        assert_eq!(from_commitment, proof);

        let mut bad_leaf = proof.clone();
        bad_leaf.leaf = normalize_hex("11");
        assert!(!verify_proof(&bad_leaf));

        for i in 0..proof.elements.len() {
            let mut bad_element = proof.clone();
            bad_element.elements[i] = normalize_hex("99");
            assert!(!verify_proof(&bad_element), "element {i} tamper accepted");
        }
    }

    #[tokio::test]
    async fn test_replay_is_noop_and_gaps_are_rejected() {
        let acc = accumulator(4).await;
        insert_all(&acc, &["01", "02"]).await;
        let root = acc.latest_root().await.unwrap();

        assert_eq!(
            acc.insert_leaf(1, "02", None).await.unwrap(),
            LeafInsert::AlreadyApplied
        );
        assert!(acc.insert_leaf(1, "03", None).await.unwrap_err().is_ordering());
        assert!(acc.insert_leaf(5, "03", None).await.unwrap_err().is_ordering());
        assert_eq!(acc.latest_root().await.unwrap(), root);
        assert_eq!(acc.leaf_count(), 2);
    }

    #[tokio::test]
    async fn test_corruption_guards() {
        let acc = accumulator(4).await;
        insert_all(&acc, &["01"]).await;
        let zero = acc.zeros()[0].clone();
        assert!(acc.insert_leaf(1, &zero, None).await.unwrap_err().is_ordering());
        assert!(acc.insert_leaf(1, "01", None).await.unwrap_err().is_ordering());
        acc.insert_leaf(1, "02", None).await.unwrap();
        assert!(acc.insert_leaf(2, "01", None).await.unwrap_err().is_ordering());
    }

    #[tokio::test]
    async fn test_expected_root_mismatch_writes_nothing() {
        let acc = accumulator(4).await;
        let err = acc
            .insert_leaf(0, "01", Some("1234"))
            .await
            .unwrap_err();
        assert!(matches!(err, PoiError::Validation { .. }));
        assert_eq!(acc.leaf_count(), 0);

        let reference = accumulator(4).await;
        let LeafInsert::Inserted { root } = reference.insert_leaf(0, "01", None).await.unwrap() else {
            panic!("expected insert");
        };
        acc.insert_leaf(0, "01", Some(&root)).await.unwrap();
        assert!(acc.has_historical_root(&root).await.unwrap());
        assert_eq!(acc.root_at(0).await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn test_busy_writer_fails_fast() {
        let acc = accumulator(4).await;
        let _guard = acc.writer.try_lock().unwrap();
        let err = acc.insert_leaf(0, "01", None).await.unwrap_err();
        assert!(matches!(err, PoiError::AccumulatorBusy { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_rollover_opens_next_tree() {
        let acc = accumulator(2).await;
        insert_all(&acc, &["01", "02", "03", "04"]).await;
        assert_eq!(acc.next_position(), (1, 0));

        acc.insert_leaf(4, "05", None).await.unwrap();
        assert_eq!(acc.latest_tree(), 1);
        assert_eq!(
            acc.position_of("05").await.unwrap(),
            Some(LeafPosition { tree: 1, index: 0 })
        );
        assert_eq!(acc.get_global_index(1, 0), 4);
        assert!(verify_proof(&acc.get_merkle_proof(0, 3).await.unwrap()));
        assert!(verify_proof(&acc.get_merkle_proof(1, 0).await.unwrap()));
    }

    #[tokio::test]
    #[ignore = "inserts a full production-depth tree"]
    async fn test_rollover_at_production_depth() {
        let acc = accumulator(TREE_DEPTH).await;
        let capacity = acc.tree_capacity();
        for global in 0..=capacity {
            acc.insert_leaf(global, &format!("{:x}", global + 1), None)
                .await
                .unwrap();
        }
        assert_eq!(acc.leaf_count(), 65_537);
        assert_eq!(acc.latest_tree(), 1);
        assert_eq!(acc.get_global_index(1, 0), 65_536);
        let last = format!("{:x}", capacity + 1);
        assert_eq!(
            acc.position_of(&last).await.unwrap(),
            Some(LeafPosition { tree: 1, index: 0 })
        );
        assert!(verify_proof(&acc.get_merkle_proof(1, 0).await.unwrap()));
        assert!(verify_proof(&acc.get_merkle_proof(0, 65_535).await.unwrap()));
    }

    #[test]
    fn test_global_index_at_production_depth() {
        assert_eq!(global_leaf_index(TREE_DEPTH, 1, 0), 65_536);
        assert_eq!(global_leaf_index(TREE_DEPTH, 2, 5), 131_077);
    }

    #[tokio::test]
    async fn test_rebuild_and_inflate_reproduce_state() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let acc = Accumulator::open(store.clone(), test_chain(), "list", 3).await.unwrap();
        insert_all(&acc, &["01", "02", "03", "04", "05"]).await;
        let root = acc.latest_root().await.unwrap();

        assert_eq!(acc.rebuild_tree(0).await.unwrap(), root);

        let reopened = Accumulator::open(store, test_chain(), "list", 3).await.unwrap();
        assert_eq!(reopened.leaf_count(), 5);
        assert_eq!(reopened.latest_root().await.unwrap(), root);
        reopened.insert_leaf(5, "06", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_truncate_restores_earlier_root() {
        let acc = accumulator(2).await;
        insert_all(&acc, &["01", "02", "03"]).await;
        let root_at_3 = acc.latest_root().await.unwrap();
        insert_all_from(&acc, 3, &["04", "05", "06"]).await;

        acc.truncate(3).await.unwrap();
        assert_eq!(acc.leaf_count(), 3);
        assert_eq!(acc.latest_tree(), 0);
        assert_eq!(acc.latest_root().await.unwrap(), root_at_3);
        assert!(!acc.contains("05").await.unwrap());
        assert_eq!(acc.root_at(4).await.unwrap(), None);

        insert_all_from(&acc, 3, &["04"]).await;
        assert!(verify_proof(&acc.get_merkle_proof(0, 3).await.unwrap()));
    }

    async fn insert_all_from(acc: &Accumulator, start: u64, leaves: &[&str]) {
        for (i, leaf) in leaves.iter().enumerate() {
            acc.insert_leaf(start + i as u64, leaf, None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_clear() {
        let acc = accumulator(2).await;
        insert_all(&acc, &["01", "02"]).await;
        acc.clear().await.unwrap();
        assert_eq!(acc.leaf_count(), 0);
        assert!(!acc.contains("01").await.unwrap());
        assert_eq!(acc.latest_root().await.unwrap(), acc.zeros()[2]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_every_leaf_proves_and_roots_replay(values in prop::collection::hash_set(1u64..u64::MAX, 1..12)) {
            let leaves: Vec<String> = values.iter().map(|v| format!("{v:x}")).collect();
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let first = accumulator(3).await;
                let second = accumulator(3).await;
                for (i, leaf) in leaves.iter().enumerate() {
                    first.insert_leaf(i as u64, leaf, None).await.unwrap();
                    second.insert_leaf(i as u64, leaf, None).await.unwrap();
                }
                for i in 0..leaves.len() as u64 {
                    let (tree, index) = first.position_of_global(i).unwrap();
                    let proof = first.get_merkle_proof(tree, index).await.unwrap();
                    prop_assert!(verify_proof(&proof));
                }
                prop_assert_eq!(first.latest_root().await.unwrap(), second.latest_root().await.unwrap());
                Ok(())
            })?;
        }
    }
}
