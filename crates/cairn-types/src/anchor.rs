//! Anchor and commit types.
//!
//! An anchor is a batch of commit digests together with their Merkle root,
//! periodically submitted to an external timestamp oracle. Anchors are born
//! unverified when dropped into the commit log and mature to verified once
//! the oracle confirms the root on chain. Everything here is derivable from
//! the commit log alone; these types are the parsed views.

use serde::Deserialize;
use serde::Serialize;

use crate::record::Digest;

/// Discriminates anchor maturity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorType {
    /// Dropped into the log, confirmation outstanding.
    Unverified,

    /// Confirmed by the timestamp oracle.
    Verified,
}

/// Oracle confirmation data, present once an anchor is verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Transaction that committed the root on chain.
    pub transaction: String,

    /// Time the root was confirmed on chain, seconds since epoch.
    pub chain_timestamp: i64,
}

/// A batch of commit digests anchored under one Merkle root.
///
/// `digests` and `messages` are parallel: `messages[i]` is the one-line
/// commit message for `digests[i]`. The batch is identified by the Merkle
/// root over the byte-sorted digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Maturity of this anchor.
    pub kind: AnchorType,

    /// Commit digests covered by this anchor, newest first.
    pub digests: Vec<Digest>,

    /// One-line commit messages, parallel to `digests`.
    pub messages: Vec<String>,

    /// Time the anchor was dropped, seconds since epoch.
    pub time: i64,

    /// Confirmation data; `Some` exactly when `kind` is `Verified`.
    pub receipt: Option<AnchorReceipt>,
}

impl Anchor {
    /// Create an unverified anchor over parallel digest/message slices.
    pub fn unverified(digests: Vec<Digest>, messages: Vec<String>, time: i64) -> Self {
        debug_assert_eq!(digests.len(), messages.len());
        Self {
            kind: AnchorType::Unverified,
            digests,
            messages,
            time,
            receipt: None,
        }
    }

    /// Mark the anchor verified with the given receipt.
    pub fn confirm(&mut self, receipt: AnchorReceipt) {
        self.kind = AnchorType::Verified;
        self.receipt = Some(receipt);
    }
}

/// Pointer to the most recent anchor drop. Defines the boundary of
/// "unanchored" commits for the next batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastAnchor {
    /// Newest commit digest covered by the anchor.
    pub last: Digest,

    /// Time the anchor commit was made, seconds since epoch.
    pub time: i64,

    /// Merkle root identifying the anchor.
    pub merkle: Digest,
}

/// Merkle roots of anchors with outstanding oracle confirmations, in
/// anchor-commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnconfirmedAnchors {
    /// Outstanding roots, oldest anchor first.
    pub roots: Vec<Digest>,
}

/// A commit in the append-only log.
///
/// The message is a non-empty sequence of lines. Two shapes carry meaning
/// for the anchor engine: messages whose first line is `anchor <merkle-hex>`
/// (an anchor drop) and messages whose first line is `anchor confirmation`.
/// All other commits are opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Commit digest, 64-char lower-hex.
    pub hash: String,

    /// Commit time, seconds since epoch.
    pub time: i64,

    /// Message lines; never empty.
    pub message: Vec<String>,
}

impl Commit {
    /// First message line, the one-line summary.
    pub fn summary(&self) -> &str {
        self.message.first().map(String::as_str).unwrap_or("")
    }

    /// Parse the commit hash as a raw digest.
    pub fn digest(&self) -> Option<Digest> {
        Digest::from_hex(&self.hash).ok()
    }
}
