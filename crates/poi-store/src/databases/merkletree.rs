//! Merkle tree nodes and historical roots
//!
//! One tree family per scope (a list key, or the txid ledger). Level-0 nodes
//! are insert-only; internal nodes are upserted on every re-hash.

use std::sync::Arc;

use poi_core::Chain;
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::store::{DocumentStore, KeyRange, StoreResult};

/// Persisted tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMerkleNode {
    /// Tree number
    pub tree: u32,
    /// Level, 0 for leaves
    pub level: u8,
    /// Index within the level
    pub index: u32,
    /// Node hash
    pub node_hash: String,
}

/// Position of a leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafPosition {
    /// Tree number
    pub tree: u32,
    /// Leaf index within the tree
    pub index: u32,
}

/// Root recorded after an accumulator mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMerkleroot {
    /// Tree the root belongs to
    pub tree: u32,
    /// Root hash
    pub root_hash: String,
    /// Global index of the leaf whose insertion produced this root
    pub global_leaf_index: u64,
}

fn node_key(tree: u32, level: u8, index: u32) -> String {
    format!("{tree:05}/{level:02}/{index:05}")
}

fn tree_prefix(tree: u32) -> String {
    format!("{tree:05}/")
}

fn level_prefix(tree: u32, level: u8) -> String {
    format!("{tree:05}/{level:02}/")
}

/// Node storage of one accumulator.
#[derive(Debug, Clone)]
pub struct MerkletreeDb {
    nodes: Collection<StoredMerkleNode>,
    leaf_positions: Collection<LeafPosition>,
}

impl MerkletreeDb {
    /// Open the tree family `scope` for `chain`.
    pub fn new(store: Arc<dyn DocumentStore>, chain: Chain, scope: &str) -> Self {
        Self {
            nodes: Collection::new(store.clone(), chain, &format!("merkletree/{scope}")),
            leaf_positions: Collection::new(store, chain, &format!("merkletree-leaves/{scope}")),
        }
    }

    /// Insert a leaf. Returns `false` if the leaf slot is already written.
    pub async fn insert_leaf(&self, tree: u32, index: u32, leaf: &str) -> StoreResult<bool> {
        let node = StoredMerkleNode {
            tree,
            level: 0,
            index,
            node_hash: leaf.to_string(),
        };
        if !self
            .nodes
            .insert_idempotent(&node_key(tree, 0, index), &node)
            .await?
        {
            return Ok(false);
        }
        self.leaf_positions
            .insert_idempotent(leaf, &LeafPosition { tree, index })
            .await?;
        Ok(true)
    }

    /// Write an internal node.
    pub async fn upsert_node(&self, tree: u32, level: u8, index: u32, node_hash: &str) -> StoreResult<()> {
        let node = StoredMerkleNode {
            tree,
            level,
            index,
            node_hash: node_hash.to_string(),
        };
        self.nodes.upsert(&node_key(tree, level, index), &node).await
    }

    /// Node hash, if written.
    pub async fn get_node(&self, tree: u32, level: u8, index: u32) -> StoreResult<Option<String>> {
        Ok(self
            .nodes
            .get(&node_key(tree, level, index))
            .await?
            .map(|node| node.node_hash))
    }

    /// Position of a leaf value.
    pub async fn leaf_position(&self, leaf: &str) -> StoreResult<Option<LeafPosition>> {
        self.leaf_positions.get(leaf).await
    }

    /// Number of leaves in `tree`.
    pub async fn leaf_count(&self, tree: u32) -> StoreResult<u64> {
        self.nodes.count(&KeyRange::prefix(level_prefix(tree, 0))).await
    }

    /// Highest tree with any node written.
    pub async fn latest_tree(&self) -> StoreResult<Option<u32>> {
        Ok(self.nodes.last("").await?.map(|node| node.tree))
    }

    /// Leaves of `tree` in index order.
    pub async fn leaves(&self, tree: u32) -> StoreResult<Vec<StoredMerkleNode>> {
        self.nodes.values(&KeyRange::prefix(level_prefix(tree, 0))).await
    }

    /// Remove internal nodes of `tree` (level 1 and above).
    pub async fn delete_internal_nodes(&self, tree: u32) -> StoreResult<u64> {
        let range = KeyRange::prefix(tree_prefix(tree)).between(level_prefix(tree, 1), format!("{tree:05}0"));
        self.nodes.delete_range(&range).await
    }

    /// Remove leaves of `tree` at `from_index` and above.
    pub async fn delete_leaves_from(&self, tree: u32, from_index: u32) -> StoreResult<u64> {
        let range = KeyRange::prefix(level_prefix(tree, 0))
            .between(node_key(tree, 0, from_index), level_prefix(tree, 1));
        let doomed = self.nodes.values(&range).await?;
        for leaf in &doomed {
            self.leaf_positions.delete(&leaf.node_hash).await?;
        }
        self.nodes.delete_range(&range).await
    }

    /// Remove every node of `tree`.
    pub async fn delete_tree(&self, tree: u32) -> StoreResult<u64> {
        let removed = self.delete_leaves_from(tree, 0).await?;
        Ok(removed + self.delete_internal_nodes(tree).await?)
    }

    /// Remove every node of every tree.
    pub async fn clear(&self) -> StoreResult<u64> {
        self.leaf_positions.delete_range(&KeyRange::default()).await?;
        self.nodes.delete_range(&KeyRange::default()).await
    }
}

fn root_index_key(global_leaf_index: u64) -> String {
    format!("{global_leaf_index:020}")
}

/// Historical roots of one accumulator, by hash and by leaf index.
#[derive(Debug, Clone)]
pub struct MerklerootDb {
    by_hash: Collection<StoredMerkleroot>,
    by_index: Collection<StoredMerkleroot>,
}

impl MerklerootDb {
    /// Open the root history of `scope` for `chain`.
    pub fn new(store: Arc<dyn DocumentStore>, chain: Chain, scope: &str) -> Self {
        Self {
            by_hash: Collection::new(store.clone(), chain, &format!("merkleroots/{scope}")),
            by_index: Collection::new(store, chain, &format!("merkleroots-by-index/{scope}")),
        }
    }

    /// Record a root.
    pub async fn insert(&self, root: &StoredMerkleroot) -> StoreResult<()> {
        self.by_index
            .upsert(&root_index_key(root.global_leaf_index), root)
            .await?;
        self.by_hash.insert_idempotent(&root.root_hash, root).await?;
        Ok(())
    }

    /// Whether `root_hash` was ever a root.
    pub async fn contains(&self, root_hash: &str) -> StoreResult<bool> {
        self.by_hash.contains(root_hash).await
    }

    /// Root recorded after inserting the leaf at `global_leaf_index`.
    pub async fn root_at(&self, global_leaf_index: u64) -> StoreResult<Option<StoredMerkleroot>> {
        self.by_index.get(&root_index_key(global_leaf_index)).await
    }

    /// Most recent root.
    pub async fn latest(&self) -> StoreResult<Option<StoredMerkleroot>> {
        self.by_index.last("").await
    }

    /// Drop roots produced at `from_index` and above.
    pub async fn delete_from(&self, from_index: u64) -> StoreResult<u64> {
        // u64::MAX is never a leaf index
        let range = KeyRange::default().between(root_index_key(from_index), root_index_key(u64::MAX));
        let doomed = self.by_index.values(&range).await?;
        for root in &doomed {
            self.by_hash.delete(&root.root_hash).await?;
        }
        self.by_index.delete_range(&range).await
    }

    /// Drop the entire history.
    pub async fn clear(&self) -> StoreResult<u64> {
        self.by_hash.delete_range(&KeyRange::default()).await?;
        self.by_index.delete_range(&KeyRange::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use poi_core::testing::test_chain;

    fn dbs() -> (MerkletreeDb, MerklerootDb) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        (
            MerkletreeDb::new(store.clone(), test_chain(), "aa"),
            MerklerootDb::new(store, test_chain(), "aa"),
        )
    }

    #[tokio::test]
    async fn test_leaves_are_insert_only() {
        let (nodes, _) = dbs();
        assert!(nodes.insert_leaf(0, 0, "01").await.unwrap());
        assert!(!nodes.insert_leaf(0, 0, "02").await.unwrap());
        assert_eq!(nodes.get_node(0, 0, 0).await.unwrap().as_deref(), Some("01"));
        assert_eq!(
            nodes.leaf_position("01").await.unwrap(),
            Some(LeafPosition { tree: 0, index: 0 })
        );
        assert_eq!(nodes.leaf_position("02").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counts_and_deletes_by_tree() {
        let (nodes, _) = dbs();
        for i in 0..4 {
            nodes.insert_leaf(0, i, &format!("0{i}")).await.unwrap();
        }
        nodes.upsert_node(0, 1, 0, "ab").await.unwrap();
        nodes.upsert_node(0, 1, 0, "cd").await.unwrap();
        nodes.insert_leaf(1, 0, "10").await.unwrap();

        assert_eq!(nodes.leaf_count(0).await.unwrap(), 4);
        assert_eq!(nodes.latest_tree().await.unwrap(), Some(1));
        assert_eq!(nodes.get_node(0, 1, 0).await.unwrap().as_deref(), Some("cd"));

        assert_eq!(nodes.delete_leaves_from(0, 2).await.unwrap(), 2);
        assert_eq!(nodes.leaf_count(0).await.unwrap(), 2);
        assert_eq!(nodes.leaf_position("03").await.unwrap(), None);

        assert_eq!(nodes.delete_internal_nodes(0).await.unwrap(), 1);
        assert_eq!(nodes.get_node(0, 1, 0).await.unwrap(), None);
        assert_eq!(nodes.leaf_count(0).await.unwrap(), 2);

        nodes.delete_tree(1).await.unwrap();
        assert_eq!(nodes.latest_tree().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_root_history() {
        let (_, roots) = dbs();
        for i in 0..5u64 {
            roots
                .insert(&StoredMerkleroot {
                    tree: 0,
                    root_hash: format!("r{i}"),
                    global_leaf_index: i,
                })
                .await
                .unwrap();
        }
        assert!(roots.contains("r3").await.unwrap());
        assert_eq!(roots.root_at(2).await.unwrap().unwrap().root_hash, "r2");
        assert_eq!(roots.latest().await.unwrap().unwrap().global_leaf_index, 4);

        assert_eq!(roots.delete_from(3).await.unwrap(), 2);
        assert!(!roots.contains("r3").await.unwrap());
        assert_eq!(roots.latest().await.unwrap().unwrap().root_hash, "r2");
    }
}
