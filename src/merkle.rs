//! Binary SHA-256 Merkle tree over 32-byte leaves.
//!
//! Leaves are raw digests sorted ascending by byte order; internal nodes are
//! `SHA256(left || right)`; a level with an odd node count duplicates its
//! last node. A single leaf is its own root. This is the root format the
//! timestamp oracle expects, and the format record Merkles use over their
//! file digests.

use cairn_types::Digest;
use sha2::Digest as _;
use sha2::Sha256;

/// Compute the Merkle root of a set of digests.
///
/// The input is copied and sorted; callers may pass digests in any order.
/// Returns `None` for an empty input — there is nothing to anchor.
pub fn merkle_root(digests: &[Digest]) -> Option<Digest> {
    if digests.is_empty() {
        return None;
    }

    let mut level: Vec<Digest> = digests.to_vec();
    level.sort();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }

        level = level
            .chunks_exact(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                hasher.update(pair[0].as_bytes());
                hasher.update(pair[1].as_bytes());
                Digest(hasher.finalize().into())
            })
            .collect();
    }

    Some(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(byte: u8) -> Digest {
        Digest([byte; 32])
    }

    fn hash_pair(a: &Digest, b: &Digest) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(a.as_bytes());
        hasher.update(b.as_bytes());
        Digest(hasher.finalize().into())
    }

    #[test]
    fn empty_has_no_root() {
        assert_eq!(merkle_root(&[]), None);
    }

    #[test]
    fn single_leaf_is_root() {
        let d = digest(0x11);
        assert_eq!(merkle_root(&[d]), Some(d));
    }

    #[test]
    fn two_leaves() {
        let a = digest(0x01);
        let b = digest(0x02);
        assert_eq!(merkle_root(&[a, b]), Some(hash_pair(&a, &b)));
    }

    #[test]
    fn order_does_not_matter() {
        let a = digest(0x01);
        let b = digest(0x02);
        let c = digest(0x03);
        assert_eq!(merkle_root(&[a, b, c]), merkle_root(&[c, a, b]));
        assert_eq!(merkle_root(&[b, c, a]), merkle_root(&[a, c, b]));
    }

    #[test]
    fn odd_count_duplicates_last() {
        let a = digest(0x01);
        let b = digest(0x02);
        let c = digest(0x03);

        // Level 0 sorted: [a, b, c] -> [a, b, c, c]
        let ab = hash_pair(&a, &b);
        let cc = hash_pair(&c, &c);
        let expected = hash_pair(&ab, &cc);
        assert_eq!(merkle_root(&[a, b, c]), Some(expected));
    }

    #[test]
    fn root_changes_with_content() {
        let base = merkle_root(&[digest(1), digest(2)]);
        let other = merkle_root(&[digest(1), digest(3)]);
        assert_ne!(base, other);
    }
}
