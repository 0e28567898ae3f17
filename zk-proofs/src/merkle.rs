//! Fixed-depth Poseidon Merkle tree over repository commitments.
//!
//! The tree always has `2^MERKLE_DEPTH` leaves; unused slots are zero. Fixed depth keeps the
//! membership gadget (and therefore the verifying key) independent of how many repositories
//! a subject contributed to.

use ark_bn254::Fr;
use ark_std::Zero;

use crate::constants::MERKLE_DEPTH;
use crate::hash::hash_pair;

/// Authentication path for one leaf.
///
/// `path_indices[i] == 0` means the running node is the left child at level `i`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MerklePath {
    pub path_elements: [Fr; MERKLE_DEPTH],
    pub path_indices: [u8; MERKLE_DEPTH],
}

impl MerklePath {
    /// Recompute the root reached by hashing `leaf` up this path.
    pub fn compute_root(&self, leaf: Fr) -> Fr {
        self.path_elements
            .iter()
            .zip(self.path_indices.iter())
            .fold(leaf, |node, (sibling, index)| {
                if *index == 0 {
                    hash_pair(node, *sibling)
                } else {
                    hash_pair(*sibling, node)
                }
            })
    }
}

#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `levels[0]` are the (padded) leaves, `levels[MERKLE_DEPTH]` holds the root.
    levels: Vec<Vec<Fr>>,
    len: usize,
}

impl MerkleTree {
    pub const CAPACITY: usize = 1 << MERKLE_DEPTH;

    /// Build a tree from up to [`Self::CAPACITY`] leaves. Returns `None` if there are more.
    pub fn new(leaves: &[Fr]) -> Option<Self> {
        if leaves.len() > Self::CAPACITY {
            return None;
        }

        let mut level = vec![Fr::zero(); Self::CAPACITY];
        level[..leaves.len()].copy_from_slice(leaves);

        let mut levels = Vec::with_capacity(MERKLE_DEPTH + 1);
        levels.push(level);
        for depth in 0..MERKLE_DEPTH {
            let next: Vec<Fr> = levels[depth]
                .chunks(2)
                .map(|pair| hash_pair(pair[0], pair[1]))
                .collect();
            levels.push(next);
        }

        Some(Self { levels, len: leaves.len() })
    }

    pub fn root(&self) -> Fr {
        self.levels[MERKLE_DEPTH][0]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn leaf(&self, index: usize) -> Option<Fr> {
        (index < self.len).then(|| self.levels[0][index])
    }

    /// Authentication path for the leaf at `index`, or `None` if the slot is unused.
    pub fn path(&self, index: usize) -> Option<MerklePath> {
        if index >= self.len {
            return None;
        }

        let mut path_elements = [Fr::zero(); MERKLE_DEPTH];
        let mut path_indices = [0u8; MERKLE_DEPTH];
        let mut position = index;
        for depth in 0..MERKLE_DEPTH {
            path_elements[depth] = self.levels[depth][position ^ 1];
            path_indices[depth] = (position & 1) as u8;
            position >>= 1;
        }

        Some(MerklePath { path_elements, path_indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u64) -> Vec<Fr> {
        (1..=n).map(Fr::from).collect()
    }

    #[test]
    fn every_path_recomputes_the_root() {
        let tree = MerkleTree::new(&leaves(5)).unwrap();
        for i in 0..5 {
            let path = tree.path(i).unwrap();
            assert_eq!(path.compute_root(tree.leaf(i).unwrap()), tree.root());
        }
        assert!(tree.path(5).is_none());
    }

    #[test]
    fn root_depends_on_every_leaf() {
        let a = MerkleTree::new(&leaves(4)).unwrap();
        let mut changed = leaves(4);
        changed[3] = Fr::from(99u64);
        let b = MerkleTree::new(&changed).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn rejects_overfull_tree() {
        let too_many = vec![Fr::from(1u64); MerkleTree::CAPACITY + 1];
        assert!(MerkleTree::new(&too_many).is_none());
    }
}
