//! Property-based tests: Merkle root laws and serde round-trips for every
//! persisted type.

use cairn::merkle::merkle_root;
use cairn_types::Anchor;
use cairn_types::AnchorReceipt;
use cairn_types::Digest;
use cairn_types::LastAnchor;
use cairn_types::MetadataStream;
use cairn_types::Record;
use cairn_types::RecordFile;
use cairn_types::RecordMetadata;
use cairn_types::RecordStatus;
use cairn_types::Token;
use cairn_types::UnconfirmedAnchors;
use proptest::prelude::*;

// Test data generators

fn digest32() -> impl Strategy<Value = Digest> {
    any::<[u8; 32]>().prop_map(Digest)
}

fn digests(max: usize) -> impl Strategy<Value = Vec<Digest>> {
    prop::collection::vec(digest32(), 1..=max)
}

fn filename() -> impl Strategy<Value = String> {
    "[a-z0-9_.-]{1,24}"
}

fn record_file() -> impl Strategy<Value = RecordFile> {
    (filename(), prop::collection::vec(any::<u8>(), 0..256)).prop_map(|(name, payload)| {
        RecordFile::new(name, "text/plain; charset=utf-8", payload)
    })
}

fn metadata_stream() -> impl Strategy<Value = MetadataStream> {
    (0u64..32, "[ -~]{0,64}").prop_map(|(id, payload)| MetadataStream { id, payload })
}

fn record() -> impl Strategy<Value = Record> {
    (
        any::<[u8; 32]>(),
        prop::collection::vec(record_file(), 1..4),
        prop::collection::vec(metadata_stream(), 0..4),
        0i64..2_000_000_000,
    )
        .prop_map(|(token, files, streams, timestamp)| {
            let digests: Vec<Digest> = files.iter().map(|f| f.digest).collect();
            Record {
                meta: RecordMetadata {
                    token: Token(token),
                    merkle: merkle_root(&digests).unwrap(),
                    status: RecordStatus::Unvetted,
                    timestamp,
                },
                streams,
                files,
            }
        })
}

fn anchor() -> impl Strategy<Value = Anchor> {
    (
        digests(8),
        0i64..2_000_000_000,
        prop::option::of(("[a-f0-9]{16}", 0i64..2_000_000_000)),
    )
        .prop_map(|(digests, time, receipt)| {
            let messages = digests.iter().map(|d| format!("vet {d}")).collect();
            let mut anchor = Anchor::unverified(digests, messages, time);
            if let Some((transaction, chain_timestamp)) = receipt {
                anchor.confirm(AnchorReceipt {
                    transaction,
                    chain_timestamp,
                });
            }
            anchor
        })
}

proptest! {
    /// The root ignores input order.
    #[test]
    fn merkle_root_is_order_independent(mut leaves in digests(16)) {
        let forward = merkle_root(&leaves);
        leaves.reverse();
        prop_assert_eq!(forward, merkle_root(&leaves));
    }

    /// The root is total over non-empty inputs and 32 bytes wide.
    #[test]
    fn merkle_root_is_defined(leaves in digests(16)) {
        prop_assert!(merkle_root(&leaves).is_some());
    }

    /// A single leaf is its own root.
    #[test]
    fn merkle_single_leaf(leaf in digest32()) {
        prop_assert_eq!(merkle_root(&[leaf]), Some(leaf));
    }

    /// The same leaves always produce the same root.
    #[test]
    fn merkle_root_deterministic(leaves in digests(8)) {
        prop_assert_eq!(merkle_root(&leaves), merkle_root(&leaves.clone()));
    }

    /// Record serialize -> deserialize is identity.
    #[test]
    fn record_round_trips(record in record()) {
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(record, back);
    }

    /// Anchor serialize -> deserialize is identity.
    #[test]
    fn anchor_round_trips(anchor in anchor()) {
        let json = serde_json::to_string(&anchor).unwrap();
        let back: Anchor = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(anchor, back);
    }

    /// LastAnchor serialize -> deserialize is identity.
    #[test]
    fn last_anchor_round_trips(last in digest32(), merkle in digest32(), time in 0i64..2_000_000_000) {
        let la = LastAnchor { last, time, merkle };
        let json = serde_json::to_string(&la).unwrap();
        let back: LastAnchor = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(la, back);
    }

    /// UnconfirmedAnchors serialize -> deserialize is identity.
    #[test]
    fn unconfirmed_round_trips(roots in prop::collection::vec(digest32(), 0..8)) {
        let ua = UnconfirmedAnchors { roots };
        let json = serde_json::to_string(&ua).unwrap();
        let back: UnconfirmedAnchors = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(ua, back);
    }

    /// Tokens survive the hex boundary encoding.
    #[test]
    fn token_hex_round_trips(bytes in any::<[u8; 32]>()) {
        let token = Token(bytes);
        let hex = token.to_hex();
        prop_assert_eq!(hex.len(), 64);
        prop_assert_eq!(Token::from_hex(&hex).unwrap(), token);
    }
}
