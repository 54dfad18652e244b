//! Anchor index: derived views over the vetted commit log.
//!
//! The log is the single source of truth for anchor state. Scanning it
//! yields the anchor set, the confirmation set, the most recent anchor
//! (`LastAnchor`), and the outstanding roots (`UnconfirmedAnchors`) — no
//! side database, so a restart reconstructs the exact same views.

use std::collections::HashMap;

use cairn_types::Anchor;
use cairn_types::AnchorReceipt;
use cairn_types::Commit;
use cairn_types::Digest;
use cairn_types::LastAnchor;
use cairn_types::UnconfirmedAnchors;

use crate::anchor::parse_anchor_body;
use crate::anchor::parse_anchor_root;
use crate::anchor::parse_confirmation;
use crate::store::StoreError;
use crate::store::StoreResult;

/// Derived anchor state for one branch of the log.
pub struct AnchorIndex {
    /// Anchors in drop order, oldest first, with maturity resolved against
    /// the confirmation commits.
    anchors: Vec<Anchor>,

    /// The most recent anchor drop, if any.
    last_anchor: Option<LastAnchor>,
}

impl AnchorIndex {
    /// Derive the index from a log in newest-first order (as returned by
    /// `CommitLogStore::log`).
    pub fn derive(log: &[Commit]) -> StoreResult<Self> {
        let mut receipts: HashMap<Digest, AnchorReceipt> = HashMap::new();
        for commit in log {
            if let Some((root, receipt)) = parse_confirmation(commit) {
                receipts.insert(root, receipt);
            }
        }

        // Walk oldest-first so anchors come out in drop order.
        let mut anchors = Vec::new();
        for commit in log.iter().rev() {
            let Some(root) = parse_anchor_root(commit) else {
                continue;
            };
            let pairs = parse_anchor_body(commit);
            if pairs.is_empty() {
                return Err(StoreError::Corrupt {
                    reason: format!("anchor commit {} has an empty batch", commit.hash),
                });
            }
            let (digests, messages) = pairs.into_iter().unzip();
            let mut anchor = Anchor::unverified(digests, messages, commit.time);
            if let Some(receipt) = receipts.get(&root) {
                anchor.confirm(receipt.clone());
            }
            anchors.push((root, anchor));
        }

        // LastAnchor points at the most recent drop; its `last` digest is
        // the first body line, the newest commit covered by the batch.
        let last_anchor = anchors.last().map(|(root, anchor)| LastAnchor {
            last: anchor.digests[0],
            time: anchor.time,
            merkle: *root,
        });

        Ok(Self {
            anchors: anchors.into_iter().map(|(_, anchor)| anchor).collect(),
            last_anchor,
        })
    }

    /// All anchors, oldest first.
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// The most recent anchor drop, or `None` before the first anchor.
    pub fn last_anchor(&self) -> Option<&LastAnchor> {
        self.last_anchor.as_ref()
    }

    /// Roots of anchors whose confirmation is still outstanding, in drop
    /// order.
    pub fn unconfirmed(&self) -> UnconfirmedAnchors {
        UnconfirmedAnchors {
            roots: self
                .anchors
                .iter()
                .filter(|anchor| anchor.receipt.is_none())
                .map(|anchor| {
                    crate::merkle::merkle_root(&anchor.digests)
                        .expect("anchors are never empty")
                })
                .collect(),
        }
    }
}
