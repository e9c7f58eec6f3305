//! Binary hash trees over 256-bit digests.
//!
//! One builder serves both trees the mining layer cares about: the block's
//! transaction tree (whose root lands in the header and keys the template
//! cache) and the auxiliary-chain tree whose root is committed inside a
//! merged-mined coinbase.
//!
//! # Layout
//!
//! Nodes are stored level by level, leaves first, root last:
//!
//! ```text
//!            [6]              level 2 (len 1)
//!         /       \
//!      [4]         [5]        level 1 (len 2)
//!     /   \       /   \
//!   [0]   [1]   [2]  ([2])    level 0 (len 3)
//! ```
//!
//! A level with an odd number of nodes pairs its last node with itself.

use std::marker::PhantomData;

use bitcoin::hashes::{Hash, HashEngine, sha256d};
use thiserror::Error;

/// A 256-bit node digest.
pub type Digest = sha256d::Hash;

/// Errors from building trees or extracting branches.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("merkle tree needs at least one leaf")]
    NoLeaves,

    #[error("leaf index {index} out of range for {leaves} leaves")]
    IndexOutOfRange { index: usize, leaves: usize },
}

/// Hash function combining two child digests into their parent.
pub trait PairHasher {
    fn hash_pair(left: &Digest, right: &Digest) -> Digest;
}

/// Double SHA-256 over `left || right`, the chain's block-hash function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoubleSha256;

impl PairHasher for DoubleSha256 {
    fn hash_pair(left: &Digest, right: &Digest) -> Digest {
        let mut engine = sha256d::Hash::engine();
        engine.input(left.as_byte_array());
        engine.input(right.as_byte_array());
        sha256d::Hash::from_engine(engine)
    }
}

/// A fully materialized merkle tree.
///
/// Construction is a pure function of the leaves; building twice from the
/// same input yields identical trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree<H = DoubleSha256> {
    /// Every node in level order, leaves first and the root last.
    nodes: Vec<Digest>,
    leaf_count: usize,
    hasher: PhantomData<H>,
}

impl<H: PairHasher> MerkleTree<H> {
    /// Build a tree from an ordered, non-empty sequence of leaves.
    pub fn from_leaves(leaves: impl IntoIterator<Item = Digest>) -> Result<Self, MerkleError> {
        let nodes: Vec<Digest> = leaves.into_iter().collect();
        if nodes.is_empty() {
            return Err(MerkleError::NoLeaves);
        }
        Ok(Self::build(nodes))
    }

    /// Build a tree whose first leaf is `first`, followed by `rest`.
    ///
    /// Infallible counterpart of [`from_leaves`](Self::from_leaves) for
    /// callers that always have at least one leaf, like a block's coinbase.
    pub fn from_first(first: Digest, rest: impl IntoIterator<Item = Digest>) -> Self {
        Self::build(std::iter::once(first).chain(rest).collect())
    }

    fn build(mut nodes: Vec<Digest>) -> Self {
        let leaf_count = nodes.len();
        let mut level_start = 0;
        let mut level_len = leaf_count;
        while level_len > 1 {
            for i in (0..level_len).step_by(2) {
                let right = (i + 1).min(level_len - 1);
                let parent = H::hash_pair(&nodes[level_start + i], &nodes[level_start + right]);
                nodes.push(parent);
            }
            level_start += level_len;
            level_len = level_len.div_ceil(2);
        }

        Self {
            nodes,
            leaf_count,
            hasher: PhantomData,
        }
    }

    /// The root digest. A single-leaf tree's root is the leaf itself.
    pub fn root(&self) -> Digest {
        // from_leaves rejects empty input, so there is always a last node
        self.nodes[self.nodes.len() - 1]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.nodes[..self.leaf_count]
    }

    /// All nodes in level order.
    pub fn nodes(&self) -> &[Digest] {
        &self.nodes
    }

    /// Iterate over levels from the leaves up to the root.
    pub fn levels(&self) -> Levels<'_> {
        Levels {
            nodes: &self.nodes,
            start: 0,
            len: self.leaf_count,
        }
    }

    /// Extract the sibling path proving leaf `index` belongs to the root.
    ///
    /// Each step records the level's size so a verifier can tell a
    /// self-paired last node apart from a regular pair.
    pub fn branch_for(&self, index: usize) -> Result<MerkleBranch, MerkleError> {
        if index >= self.leaf_count {
            return Err(MerkleError::IndexOutOfRange {
                index,
                leaves: self.leaf_count,
            });
        }

        let mut steps = Vec::new();
        let mut position = index;
        for level in self.levels() {
            if level.len() == 1 {
                break;
            }
            let sibling = (position ^ 1).min(level.len() - 1);
            steps.push(BranchStep {
                sibling: level[sibling],
                level_len: Some(level.len()),
            });
            position >>= 1;
        }

        Ok(MerkleBranch {
            index: index as u32,
            steps,
        })
    }
}

/// Iterator over the levels of a [`MerkleTree`].
pub struct Levels<'a> {
    nodes: &'a [Digest],
    start: usize,
    len: usize,
}

impl<'a> Iterator for Levels<'a> {
    type Item = &'a [Digest];

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }
        let level = &self.nodes[self.start..self.start + self.len];
        self.start += self.len;
        self.len = if self.len == 1 { 0 } else { self.len.div_ceil(2) };
        Some(level)
    }
}

/// One level of a branch: the sibling digest and, when known, how many
/// nodes the level holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchStep {
    pub sibling: Digest,

    /// Size of the level this sibling was taken from.
    ///
    /// `None` for branches received over the wire, which only carry the
    /// sibling digests.
    pub level_len: Option<usize>,
}

/// Sibling path from a leaf to the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleBranch {
    index: u32,
    steps: Vec<BranchStep>,
}

impl MerkleBranch {
    /// Rebuild a branch from bare sibling digests (as carried on the wire).
    pub fn from_siblings(index: u32, siblings: impl IntoIterator<Item = Digest>) -> Self {
        Self {
            index,
            steps: siblings
                .into_iter()
                .map(|sibling| BranchStep {
                    sibling,
                    level_len: None,
                })
                .collect(),
        }
    }

    /// Position of the proven leaf.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn steps(&self) -> &[BranchStep] {
        &self.steps
    }

    pub fn siblings(&self) -> impl ExactSizeIterator<Item = Digest> + '_ {
        self.steps.iter().map(|step| step.sibling)
    }

    /// Number of levels above the leaf.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Recompute the root from `leaf` with the chain's block-hash function.
    pub fn root_from(&self, leaf: Digest) -> Digest {
        self.root_with::<DoubleSha256>(leaf)
    }

    /// Recompute the root from `leaf` with an explicit hasher.
    pub fn root_with<H: PairHasher>(&self, leaf: Digest) -> Digest {
        let mut node = leaf;
        let mut position = self.index;
        for step in &self.steps {
            node = if position & 1 == 1 {
                H::hash_pair(&step.sibling, &node)
            } else {
                H::hash_pair(&node, &step.sibling)
            };
            position >>= 1;
        }
        node
    }

    /// Check that `leaf` climbs to `root`.
    ///
    /// Where level sizes are known, the last node of an odd level must have
    /// been paired with itself.
    pub fn verify(&self, leaf: Digest, root: Digest) -> bool {
        let mut node = leaf;
        let mut position = self.index as usize;
        for step in &self.steps {
            if let Some(len) = step.level_len {
                if position >= len {
                    return false;
                }
                if len % 2 == 1 && position == len - 1 && step.sibling != node {
                    return false;
                }
            }
            node = if position & 1 == 1 {
                DoubleSha256::hash_pair(&step.sibling, &node)
            } else {
                DoubleSha256::hash_pair(&node, &step.sibling)
            };
            position >>= 1;
        }
        node == root
    }
}
