//! Timestamp oracle contract.
//!
//! The oracle is an external collaborator that commits Merkle roots to a
//! blockchain and reports confirmations. `timestamp` is idempotent —
//! resubmitting a known root is acknowledged as a duplicate — and a
//! confirmation stays observable long after it first becomes available, so
//! polling may lag without losing data.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cairn_types::AnchorReceipt;
use cairn_types::Digest;
use thiserror::Error;

/// Transport-level oracle failure. Never surfaced to record service
/// callers; the anchor engine logs it and retries.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle could not be reached or answered with an error.
    #[error("timestamp oracle unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },
}

/// Acknowledgement for a root submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitAck {
    /// The root was accepted for timestamping.
    Accepted,

    /// The root was already known; submission is idempotent.
    Duplicate,
}

/// Per-root verification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    /// Submitted but not yet committed on chain.
    Pending,

    /// Committed on chain.
    Confirmed(AnchorReceipt),

    /// The oracle has never seen this root; it needs resubmission.
    NotFound,
}

/// One entry of a verification reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReply {
    /// The root this entry answers for.
    pub root: Digest,

    /// Its status.
    pub status: VerifyStatus,
}

/// The timestamp oracle seam.
#[async_trait]
pub trait TimestampOracle: Send + Sync {
    /// Submit a Merkle root for timestamping. Idempotent.
    async fn timestamp(&self, root: Digest) -> Result<SubmitAck, OracleError>;

    /// Query confirmation status for a batch of roots.
    async fn verify(&self, roots: &[Digest]) -> Result<Vec<VerifyReply>, OracleError>;
}

#[derive(Default)]
struct OracleState {
    /// Roots submitted so far, mapped to their receipt once confirmed.
    roots: HashMap<Digest, Option<AnchorReceipt>>,

    /// Submission order, for deterministic confirmation sweeps.
    order: Vec<Digest>,

    /// When false, every call fails as unavailable.
    available: bool,

    /// Monotonic counter for generated transaction ids.
    next_tx: u64,
}

/// In-process oracle with controllable confirmations.
///
/// Backs the integration tests and local operation: submissions are held
/// pending until `confirm` or `confirm_all` releases them.
pub struct InProcessOracle {
    state: Mutex<OracleState>,
}

impl InProcessOracle {
    /// New oracle, available, with nothing submitted.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OracleState {
                available: true,
                ..OracleState::default()
            }),
        }
    }

    /// Toggle availability; while unavailable every call errors, which is
    /// how tests exercise the engine's retry path.
    pub fn set_available(&self, available: bool) {
        self.state.lock().expect("oracle mutex poisoned").available = available;
    }

    /// Roots submitted so far, in submission order.
    pub fn submissions(&self) -> Vec<Digest> {
        self.state.lock().expect("oracle mutex poisoned").order.clone()
    }

    /// Confirm a specific root at the given chain time. Returns false when
    /// the root was never submitted.
    pub fn confirm(&self, root: &Digest, chain_timestamp: i64) -> bool {
        let mut state = self.state.lock().expect("oracle mutex poisoned");
        let Some(slot) = state.roots.get(root) else {
            return false;
        };
        if slot.is_some() {
            return true;
        }
        state.next_tx += 1;
        let receipt = AnchorReceipt {
            transaction: format!("tx{:08x}", state.next_tx),
            chain_timestamp,
        };
        state.roots.insert(*root, Some(receipt));
        true
    }

    /// Confirm every pending root at the given chain time. Returns how many
    /// were confirmed.
    pub fn confirm_all(&self, chain_timestamp: i64) -> usize {
        let mut state = self.state.lock().expect("oracle mutex poisoned");
        let pending: Vec<Digest> = state
            .order
            .iter()
            .filter(|root| matches!(state.roots.get(*root), Some(None)))
            .copied()
            .collect();
        for root in &pending {
            state.next_tx += 1;
            let receipt = AnchorReceipt {
                transaction: format!("tx{:08x}", state.next_tx),
                chain_timestamp,
            };
            state.roots.insert(*root, Some(receipt));
        }
        pending.len()
    }
}

#[async_trait]
impl TimestampOracle for InProcessOracle {
    async fn timestamp(&self, root: Digest) -> Result<SubmitAck, OracleError> {
        let mut state = self.state.lock().expect("oracle mutex poisoned");
        if !state.available {
            return Err(OracleError::Unavailable {
                reason: "oracle marked unavailable".to_string(),
            });
        }
        if state.roots.contains_key(&root) {
            return Ok(SubmitAck::Duplicate);
        }
        state.roots.insert(root, None);
        state.order.push(root);
        Ok(SubmitAck::Accepted)
    }

    async fn verify(&self, roots: &[Digest]) -> Result<Vec<VerifyReply>, OracleError> {
        let state = self.state.lock().expect("oracle mutex poisoned");
        if !state.available {
            return Err(OracleError::Unavailable {
                reason: "oracle marked unavailable".to_string(),
            });
        }
        Ok(roots
            .iter()
            .map(|root| {
                let status = match state.roots.get(root) {
                    Some(Some(receipt)) => VerifyStatus::Confirmed(receipt.clone()),
                    Some(None) => VerifyStatus::Pending,
                    None => VerifyStatus::NotFound,
                };
                VerifyReply {
                    root: *root,
                    status,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(byte: u8) -> Digest {
        Digest([byte; 32])
    }

    #[tokio::test]
    async fn submission_is_idempotent() {
        let oracle = InProcessOracle::new();
        assert_eq!(
            oracle.timestamp(digest(1)).await.unwrap(),
            SubmitAck::Accepted
        );
        assert_eq!(
            oracle.timestamp(digest(1)).await.unwrap(),
            SubmitAck::Duplicate
        );
        assert_eq!(oracle.submissions(), vec![digest(1)]);
    }

    #[tokio::test]
    async fn verify_tracks_lifecycle() {
        let oracle = InProcessOracle::new();
        oracle.timestamp(digest(1)).await.unwrap();

        let replies = oracle.verify(&[digest(1), digest(2)]).await.unwrap();
        assert_eq!(replies[0].status, VerifyStatus::Pending);
        assert_eq!(replies[1].status, VerifyStatus::NotFound);

        assert!(oracle.confirm(&digest(1), 500));
        let replies = oracle.verify(&[digest(1)]).await.unwrap();
        match &replies[0].status {
            VerifyStatus::Confirmed(receipt) => {
                assert_eq!(receipt.chain_timestamp, 500);
                assert!(!receipt.transaction.is_empty());
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unavailable_oracle_errors() {
        let oracle = InProcessOracle::new();
        oracle.set_available(false);
        assert!(oracle.timestamp(digest(1)).await.is_err());
        assert!(oracle.verify(&[digest(1)]).await.is_err());

        oracle.set_available(true);
        assert!(oracle.timestamp(digest(1)).await.is_ok());
    }

    #[tokio::test]
    async fn confirm_all_releases_pending() {
        let oracle = InProcessOracle::new();
        oracle.timestamp(digest(1)).await.unwrap();
        oracle.timestamp(digest(2)).await.unwrap();
        assert_eq!(oracle.confirm_all(900), 2);
        assert_eq!(oracle.confirm_all(901), 0);
    }
}
