/*!
Merkle integration (§2 component 8, §4.3 step 6, §4.5 step 4).

The Merkle-proof library itself is out of scope (§1): this module only does the narrow folding
the phase engine needs — combining children's subtree roots with a local leaf into one combined
root, and composing per-child proofs so a child can learn how its own leaves sit under the
overall root it never otherwise sees.

Leaf hashing uses SHA-256 (via the `sha2` crate already pulled in for the [`crate::suite::Suite`]
challenge hash), kept as a distinct domain from the Schnorr challenge hash in [`crate::suite`].
*/

use sha2::{Digest, Sha256};

/// A single client-submitted leaf, already hashed to a fixed-size digest.
pub type Leaf = [u8; 32];

/// A Merkle root: either a single leaf's hash or the fold of a subtree.
pub type MerkleRoot = [u8; 32];

/// Hashes raw leaf bytes (e.g. a client request) into a [`Leaf`].
pub fn hash_leaf(data: &[u8]) -> Leaf {
    let mut hasher = Sha256::new();
    hasher.update(b"treecosi-leaf");
    hasher.update(data);
    hasher.finalize().into()
}

fn combine_pair(left: &MerkleRoot, right: &MerkleRoot) -> MerkleRoot {
    let mut hasher = Sha256::new();
    hasher.update(b"treecosi-node");
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// One step of a Merkle inclusion proof: the sibling hash, and whether the path element being
/// proven sits to that sibling's left (`true`) or right (`false`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProofStep {
    pub sibling: MerkleRoot,
    pub is_left: bool,
}

/// An inclusion proof that a given leaf is part of a combined root, as produced by
/// [`build_root`] and consumed by [`verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Proof {
    pub steps: Vec<ProofStep>,
}

impl Proof {
    /// Composes this proof (covering a subtree root) with the further steps needed to reach the
    /// overall root a parent computed, per §4.5 step 4 ("each child its subtree-specific Merkle
    /// proof composed with the parent proof").
    pub fn composed_with(&self, parent_steps: &[ProofStep]) -> Proof {
        let mut steps = self.steps.clone();
        steps.extend_from_slice(parent_steps);
        Proof { steps }
    }
}

/// Builds the combined root over `children_roots` (in a stable, caller-supplied order) plus this
/// node's own `local_leaf`, and returns the root together with a proof for each input
/// (children first, in order, then the local leaf if present) and, separately, the proof steps a
/// child would need appended to its own subtree proof to reach this combined root.
///
/// Mirrors a standard pairwise Merkle fold; an empty `children_roots` with a present
/// `local_leaf` degenerates to that leaf being the root with an empty proof.
pub fn build_root(children_roots: &[MerkleRoot], local_leaf: Option<Leaf>) -> (MerkleRoot, Vec<Proof>) {
    let mut level: Vec<MerkleRoot> = children_roots.to_vec();
    if let Some(leaf) = local_leaf {
        level.push(leaf);
    }

    if level.is_empty() {
        return ([0u8; 32], Vec::new());
    }
    if level.len() == 1 {
        return (level[0], vec![Proof::default()]);
    }

    let mut levels = vec![level.clone()];
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                next.push(combine_pair(&pair[0], &pair[1]));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
        levels.push(level.clone());
    }
    let root = level[0];

    let proofs = (0..levels[0].len())
        .map(|leaf_index| proof_for(&levels, leaf_index))
        .collect();
    (root, proofs)
}

fn proof_for(levels: &[Vec<MerkleRoot>], leaf_index: usize) -> Proof {
    let mut steps = Vec::new();
    let mut index = leaf_index;
    for level in levels.iter().take(levels.len() - 1) {
        let is_right = index % 2 == 1;
        let sibling_index = if is_right { index - 1 } else { index + 1 };
        if let Some(&sibling) = level.get(sibling_index) {
            steps.push(ProofStep {
                sibling,
                is_left: is_right,
            });
        }
        index /= 2;
    }
    Proof { steps }
}

/// Verifies that `leaf` is included under `root` via `proof`.
pub fn verify(leaf: &Leaf, proof: &Proof, root: &MerkleRoot) -> bool {
    let mut current = *leaf;
    for step in &proof.steps {
        current = if step.is_left {
            combine_pair(&step.sibling, &current)
        } else {
            combine_pair(&current, &step.sibling)
        };
    }
    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_is_its_own_root() {
        let leaf = hash_leaf(b"only-leaf");
        let (root, proofs) = build_root(&[], Some(leaf));
        assert_eq!(root, leaf);
        assert_eq!(proofs.len(), 1);
        assert!(verify(&leaf, &proofs[0], &root));
    }

    #[test]
    fn two_children_fold_with_local_leaf() {
        let child_a = hash_leaf(b"subtree-a");
        let child_b = hash_leaf(b"subtree-b");
        let local = hash_leaf(b"local-request");
        let (root, proofs) = build_root(&[child_a, child_b], Some(local));
        assert_eq!(proofs.len(), 3);
        assert!(verify(&child_a, &proofs[0], &root));
        assert!(verify(&child_b, &proofs[1], &root));
        assert!(verify(&local, &proofs[2], &root));
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let child_a = hash_leaf(b"subtree-a");
        let child_b = hash_leaf(b"subtree-b");
        let (root, proofs) = build_root(&[child_a, child_b], None);
        let wrong = hash_leaf(b"not-subtree-a");
        assert!(!verify(&wrong, &proofs[0], &root));
    }

    #[test]
    fn composed_proof_reaches_overall_root() {
        let leaf_x = hash_leaf(b"grandchild-x");
        let leaf_y = hash_leaf(b"grandchild-y");
        let (subtree_root, sub_proofs) = build_root(&[leaf_x, leaf_y], None);

        let sibling_subtree = hash_leaf(b"other-subtree");
        let (overall_root, top_proofs) = build_root(&[subtree_root, sibling_subtree], None);

        let composed = sub_proofs[0].composed_with(&top_proofs[0].steps);
        assert!(verify(&leaf_x, &composed, &overall_root));
    }
}
