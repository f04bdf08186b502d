//! Merkle inclusion proof verification.
//!
//! This is the trust-critical primitive: it must never report success for a
//! proof whose recomputed root differs from the expected root in any single
//! bit, and it must treat malformed input as a verification failure rather
//! than a crash.

use crate::domain::{Hash256, MerkleProof, SiblingSide};

use super::hash::node_digest;

/// Upper bound on proof depth. A tree of 2^64 leaves is unreachable; anything
/// deeper is malformed input.
pub const MAX_PROOF_DEPTH: usize = 64;

/// Constant-structure digest comparison: length is fixed by the type, every
/// byte is examined, and no position information leaks through an early exit.
#[inline]
fn digest_eq(a: &Hash256, b: &Hash256) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify that `leaf` is included under `expected_root` via `proof`.
///
/// Walks the path from leaf to root, combining the running digest with each
/// sibling on its declared side, and compares the result to `expected_root`.
///
/// Returns `false` (never panics) when:
/// - the path is deeper than [`MAX_PROOF_DEPTH`];
/// - `leaf_index` is not addressable within `path.len()` bits (this covers
///   the empty path with a nonzero index);
/// - a step's declared side contradicts the bit of `leaf_index` at that
///   depth;
/// - the recomputed root differs from `expected_root` in any bit.
pub fn verify_inclusion(leaf: &Hash256, proof: &MerkleProof, expected_root: &Hash256) -> bool {
    let depth = proof.path.len();
    if depth > MAX_PROOF_DEPTH {
        return false;
    }
    if depth < 64 && (proof.leaf_index >> depth) != 0 {
        return false;
    }

    let mut current = *leaf;
    for (level, step) in proof.path.iter().enumerate() {
        let current_is_left = (proof.leaf_index >> level) & 1 == 0;
        let declared_ok = match step.side {
            SiblingSide::Right => current_is_left,
            SiblingSide::Left => !current_is_left,
        };
        if !declared_ok {
            return false;
        }
        current = match step.side {
            SiblingSide::Left => node_digest(&step.sibling, &current),
            SiblingSide::Right => node_digest(&current, &step.sibling),
        };
    }

    digest_eq(&current, expected_root)
}
