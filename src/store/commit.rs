//! Commit digest computation and the journal entry format.

use cairn_types::Digest;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest as _;
use sha2::Sha256;

/// Digest of all zeroes: the parent of the first commit on a branch, and
/// the tree digest of marker commits that touch no record.
pub const ZERO_DIGEST: Digest = Digest([0u8; 32]);

/// One line of the append-only journal.
///
/// The journal append is the commit point: a record tree write that never
/// reaches the journal is not part of history and is overwritten by the
/// next successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Commit digest, 64-char lower-hex.
    pub hash: String,

    /// Parent commit digest, 64-char lower-hex; all zeroes for the first
    /// commit on a branch.
    pub parent: String,

    /// Commit time, seconds since epoch.
    pub time: i64,

    /// Message lines; never empty.
    pub message: Vec<String>,

    /// Digest of the committed record sidecar; all zeroes for marker
    /// commits.
    pub tree: String,
}

/// Compute a commit digest.
///
/// The digest covers the parent digest, the commit time, the message lines,
/// and the tree digest, so identical content at a different point in history
/// hashes differently and the journal chain is tamper-evident.
pub fn commit_digest(parent: &Digest, time: i64, message: &[String], tree: &Digest) -> Digest {
    let mut message_hasher = Sha256::new();
    for line in message {
        message_hasher.update(line.as_bytes());
        message_hasher.update(b"\n");
    }
    let message_digest: [u8; 32] = message_hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update(time.to_be_bytes());
    hasher.update(message_digest);
    hasher.update(tree.as_bytes());
    Digest(hasher.finalize().into())
}
