//! Merkle inclusion proofs.

use serde::{Deserialize, Serialize};

use super::types::{digest_hex, Hash256};

/// Which side of the running digest a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingSide {
    Left,
    Right,
}

/// One step of a proof path: the sibling digest and its declared side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    #[serde(with = "digest_hex")]
    pub sibling: Hash256,
    pub side: SiblingSide,
}

/// Inclusion proof for a single leaf, ordered from leaf level to root.
///
/// A proof is meaningful only paired with the batch descriptor it claims to
/// belong to; verification binds it to exactly one (leaf digest, root) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf in the batch's tree
    pub leaf_index: u64,

    /// Sibling digests from leaf to root
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Build a proof from a leaf index and bottom-up sibling digests,
    /// deriving each sibling's side from the index bits.
    pub fn from_siblings(leaf_index: u64, siblings: Vec<Hash256>) -> Self {
        let path = siblings
            .into_iter()
            .enumerate()
            .map(|(level, sibling)| {
                let side = if (leaf_index >> level) & 1 == 0 {
                    SiblingSide::Right
                } else {
                    SiblingSide::Left
                };
                ProofStep { sibling, side }
            })
            .collect();
        Self { leaf_index, path }
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}
