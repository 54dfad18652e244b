//! Anchoring: batching vetted commits under Merkle roots and checkpointing
//! them with the external timestamp oracle.
//!
//! The commit log itself encodes all anchor state through two marker
//! message shapes:
//!
//! ```text
//! anchor <merkle-hex>              anchor drop; body lines are
//!                                  "<digest-hex> <one-line message>" pairs
//! anchor confirmation              oracle confirmation; body line is
//!                                  "<merkle-hex> <tx-id> <chain-time>"
//! ```
//!
//! A blank line separates the marker line from the body. Everything else in
//! the log is opaque to the anchor machinery.

pub mod engine;
pub mod index;
pub mod oracle;

use cairn_types::AnchorReceipt;
use cairn_types::Commit;
use cairn_types::Digest;

/// Marker word opening an anchor-drop commit message.
pub const MARKER_ANCHOR: &str = "anchor";

/// Marker line opening an anchor-confirmation commit message.
pub const MARKER_ANCHOR_CONFIRMATION: &str = "anchor confirmation";

/// Build the message lines for an anchor-drop commit.
///
/// `pairs` are `(commit digest, one-line message)` in log order, newest
/// first; the first body line is the newest digest covered by the anchor.
pub fn anchor_message(root: &Digest, pairs: &[(Digest, String)]) -> Vec<String> {
    let mut lines = Vec::with_capacity(pairs.len() + 2);
    lines.push(format!("{MARKER_ANCHOR} {}", root.to_hex()));
    lines.push(String::new());
    for (digest, message) in pairs {
        lines.push(format!("{} {}", digest.to_hex(), message));
    }
    lines
}

/// Build the message lines for an anchor-confirmation commit.
pub fn confirmation_message(root: &Digest, receipt: &AnchorReceipt) -> Vec<String> {
    vec![
        MARKER_ANCHOR_CONFIRMATION.to_string(),
        String::new(),
        format!(
            "{} {} {}",
            root.to_hex(),
            receipt.transaction,
            receipt.chain_timestamp
        ),
    ]
}

/// If the commit is an anchor drop, return its Merkle root.
///
/// The first line must be exactly `anchor <hex>` (modulo leading
/// whitespace); `anchor confirmation` does not match.
pub fn parse_anchor_root(commit: &Commit) -> Option<Digest> {
    let mut words = commit.summary().split_whitespace();
    if words.next() != Some(MARKER_ANCHOR) {
        return None;
    }
    let root = words.next()?;
    if root == "confirmation" || words.next().is_some() {
        return None;
    }
    Digest::from_hex(root).ok()
}

/// If the commit is an anchor confirmation, return the confirmed root and
/// its receipt, parsed from the body line after the blank separator.
pub fn parse_confirmation(commit: &Commit) -> Option<(Digest, AnchorReceipt)> {
    if commit.summary().trim() != MARKER_ANCHOR_CONFIRMATION {
        return None;
    }
    let body = commit.message.get(2)?;
    let mut words = body.split_whitespace();
    let root = Digest::from_hex(words.next()?).ok()?;
    let transaction = words.next()?.to_string();
    let chain_timestamp: i64 = words.next()?.parse().ok()?;
    Some((root, AnchorReceipt {
        transaction,
        chain_timestamp,
    }))
}

/// Parse the `(digest, message)` pairs from an anchor-drop commit body.
pub fn parse_anchor_body(commit: &Commit) -> Vec<(Digest, String)> {
    let mut pairs = Vec::new();
    for line in commit.message.iter().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let Some((digest_hex, message)) = line.split_once(' ') else {
            continue;
        };
        if let Ok(digest) = Digest::from_hex(digest_hex) {
            pairs.push((digest, message.to_string()));
        }
    }
    pairs
}

/// Whether the commit is an anchor drop or an anchor confirmation. These
/// commits are never themselves anchored.
pub fn is_marker(commit: &Commit) -> bool {
    parse_anchor_root(commit).is_some() || commit.summary().trim() == MARKER_ANCHOR_CONFIRMATION
}
