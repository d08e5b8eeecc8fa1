//! Binary Merkle tree construction, inclusion proofs, and verification.
//!
//! Trees are built over an ordered list of leaf digests. When a level has an
//! odd number of nodes the last node is duplicated, applied recursively at
//! every level until a single root remains. A single-leaf tree's root is the
//! leaf itself, with no self-combination.
//!
//! [`verify`] is standalone: it needs only one leaf hash, its sibling path,
//! and the expected root, so a holder of a single ticket proof can check
//! inclusion without the original leaf list.

use farelock_core::{
    combine,
    models::{Position, ProofStep},
    Digest, HashScheme,
};

use crate::error::{CryptoError, Result};

/// Builds the Merkle root over an ordered, non-empty list of leaves.
pub fn build(leaves: &[Digest], scheme: HashScheme) -> Result<Digest> {
    if leaves.is_empty() {
        return Err(CryptoError::EmptyTree);
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Duplicate the last node to make the level even.
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| combine(&pair[0], &pair[1], scheme))
            .collect();
    }
    Ok(level[0])
}

/// Produces the sibling path for the leaf at `index`, leaf to root.
///
/// Each step records the sibling digest and whether it sits to the left or
/// right of the node being folded upward. Replaying the path with
/// [`verify`] against the leaf reconstructs the root.
pub fn prove(leaves: &[Digest], index: usize, scheme: HashScheme) -> Result<Vec<ProofStep>> {
    if leaves.is_empty() {
        return Err(CryptoError::EmptyTree);
    }
    if index >= leaves.len() {
        return Err(CryptoError::IndexOutOfRange { index, len: leaves.len() });
    }

    let mut path = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }

        let sibling_index = position ^ 1;
        let side = if position % 2 == 0 { Position::Right } else { Position::Left };
        path.push(ProofStep { sibling: level[sibling_index], position: side });

        level = level
            .chunks_exact(2)
            .map(|pair| combine(&pair[0], &pair[1], scheme))
            .collect();
        position /= 2;
    }

    Ok(path)
}

/// Replays a proof against a leaf hash and compares the result to `root`.
///
/// Fails closed: any mismatch at any step, or a path that resolves to a
/// different digest, returns `false`. Never panics or errors on malformed
/// proofs, since an invalid proof is an expected outcome for a verifier.
pub fn verify(leaf: Digest, path: &[ProofStep], root: Digest, scheme: HashScheme) -> bool {
    let mut current = leaf;
    for step in path {
        current = match step.position {
            Position::Left => combine(&step.sibling, &current, scheme),
            Position::Right => combine(&current, &step.sibling, scheme),
        };
    }
    current == root
}

#[cfg(test)]
mod tests {
    use farelock_core::sha256;

    use super::*;

    fn leaves(n: usize) -> Vec<Digest> {
        (0..n).map(|i| sha256(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let leaf = sha256(b"only");
        let root = build(&[leaf], HashScheme::Single).unwrap();
        assert_eq!(root, leaf, "single-leaf tree must not self-combine");

        let path = prove(&[leaf], 0, HashScheme::Single).unwrap();
        assert!(path.is_empty());
        assert!(verify(leaf, &path, root, HashScheme::Single));
    }

    #[test]
    fn two_leaf_root_is_pair_combination() {
        let l = leaves(2);
        let root = build(&l, HashScheme::Single).unwrap();
        assert_eq!(root, farelock_core::combine(&l[0], &l[1], HashScheme::Single));
    }

    #[test]
    fn odd_count_pads_by_duplicating_last_leaf() {
        let l = leaves(3);
        let root = build(&l, HashScheme::Single).unwrap();

        // Manual construction: [a, b, c] -> [a, b, c, c] -> [ab, cc] -> root.
        let ab = farelock_core::combine(&l[0], &l[1], HashScheme::Single);
        let cc = farelock_core::combine(&l[2], &l[2], HashScheme::Single);
        let expected = farelock_core::combine(&ab, &cc, HashScheme::Single);
        assert_eq!(root, expected);
    }

    #[test]
    fn every_leaf_of_odd_tree_proves_against_root() {
        let l = leaves(3);
        let root = build(&l, HashScheme::Single).unwrap();

        for (i, leaf) in l.iter().enumerate() {
            let path = prove(&l, i, HashScheme::Single).unwrap();
            assert!(
                verify(*leaf, &path, root, HashScheme::Single),
                "leaf {i} must verify against the padded root"
            );
        }
    }

    #[test]
    fn proofs_verify_for_a_range_of_sizes() {
        for n in 1..=33 {
            let l = leaves(n);
            let root = build(&l, HashScheme::Single).unwrap();
            for i in 0..n {
                let path = prove(&l, i, HashScheme::Single).unwrap();
                assert!(
                    verify(l[i], &path, root, HashScheme::Single),
                    "leaf {i} of {n} must verify"
                );
            }
        }
    }

    #[test]
    fn flipped_proof_byte_fails_verification() {
        let l = leaves(8);
        let root = build(&l, HashScheme::Single).unwrap();
        let mut path = prove(&l, 3, HashScheme::Single).unwrap();

        path[1].sibling.0[0] ^= 0x01;
        assert!(!verify(l[3], &path, root, HashScheme::Single));
    }

    #[test]
    fn swapped_position_fails_verification() {
        let l = leaves(4);
        let root = build(&l, HashScheme::Single).unwrap();
        let mut path = prove(&l, 0, HashScheme::Single).unwrap();

        path[0].position = Position::Left;
        assert!(!verify(l[0], &path, root, HashScheme::Single));
    }

    #[test]
    fn wrong_leaf_fails_verification() {
        let l = leaves(5);
        let root = build(&l, HashScheme::Single).unwrap();
        let path = prove(&l, 2, HashScheme::Single).unwrap();

        assert!(!verify(l[3], &path, root, HashScheme::Single));
        assert!(!verify(sha256(b"forged"), &path, root, HashScheme::Single));
    }

    #[test]
    fn truncated_proof_fails_closed() {
        let l = leaves(8);
        let root = build(&l, HashScheme::Single).unwrap();
        let path = prove(&l, 0, HashScheme::Single).unwrap();

        assert!(!verify(l[0], &path[..path.len() - 1], root, HashScheme::Single));
        assert!(!verify(l[0], &[], root, HashScheme::Single));
    }

    #[test]
    fn leaf_order_defines_the_root() {
        let l = leaves(4);
        let mut reordered = l.clone();
        reordered.swap(0, 3);

        assert_ne!(
            build(&l, HashScheme::Single).unwrap(),
            build(&reordered, HashScheme::Single).unwrap(),
            "re-sorting leaves must change the root"
        );
    }

    #[test]
    fn double_scheme_builds_a_different_root() {
        let l = leaves(4);
        assert_ne!(
            build(&l, HashScheme::Single).unwrap(),
            build(&l, HashScheme::Double).unwrap()
        );

        // Proofs built under the double scheme verify under it.
        let root = build(&l, HashScheme::Double).unwrap();
        let path = prove(&l, 1, HashScheme::Double).unwrap();
        assert!(verify(l[1], &path, root, HashScheme::Double));
        assert!(!verify(l[1], &path, root, HashScheme::Single));
    }

    #[test]
    fn empty_tree_and_bad_index_are_errors() {
        assert!(matches!(build(&[], HashScheme::Single), Err(CryptoError::EmptyTree)));
        let l = leaves(2);
        assert!(matches!(
            prove(&l, 2, HashScheme::Single),
            Err(CryptoError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }
}
