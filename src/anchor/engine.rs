//! Anchor engine: background batching and confirmation.
//!
//! Two periodic duties, run from one worker task:
//!
//! - **Drop**: when unanchored commits exist on the vetted branch, batch
//!   them under a Merkle root, write the anchor commit, and submit the root
//!   to the timestamp oracle.
//! - **Confirm**: poll the oracle for outstanding roots and write a
//!   confirmation commit for each one that landed on chain.
//!
//! The writer lock is never held across oracle I/O: each cycle reads state
//! under the lock, releases it, talks to the oracle with a deadline, then
//! reacquires the lock to apply results. Oracle failures are swallowed and
//! retried with exponential backoff; submission is at-least-once and the
//! oracle deduplicates.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use cairn_types::Digest;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio::time::interval;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::anchor::anchor_message;
use crate::anchor::confirmation_message;
use crate::anchor::index::AnchorIndex;
use crate::anchor::is_marker;
use crate::anchor::oracle::TimestampOracle;
use crate::anchor::oracle::VerifyStatus;
use crate::config::AnchorConfig;
use crate::merkle::merkle_root;
use crate::service::SharedState;
use crate::store::Branch;
use crate::store::StoreResult;
use crate::time::Clock;

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorStats {
    /// Anchor commits written.
    pub dropped: u64,

    /// Roots acknowledged by the oracle.
    pub submitted: u64,

    /// Confirmation commits written.
    pub confirmed: u64,

    /// Oracle calls that failed or timed out.
    pub oracle_failures: u64,
}

/// Per-root retry state.
struct Backoff {
    failures: u32,
    not_before: Instant,
}

/// The anchor engine. Construct once, then either drive the cycles
/// directly (tests) or `spawn` the worker task (the daemon).
pub struct AnchorEngine {
    state: SharedState,
    oracle: Arc<dyn TimestampOracle>,
    cfg: AnchorConfig,
    clock: Arc<dyn Clock>,

    /// Roots the oracle has acknowledged; not resubmitted unless the
    /// oracle later reports them unknown.
    submitted: Mutex<HashSet<Digest>>,

    /// Submission backoff per root.
    backoff: Mutex<HashMap<Digest, Backoff>>,

    /// Verification backoff, shared across all roots since `verify` is one
    /// batched call.
    verify_backoff: Mutex<Option<Backoff>>,

    stats: Mutex<AnchorStats>,
}

impl AnchorEngine {
    /// New engine over the shared service state.
    pub fn new(
        state: SharedState,
        oracle: Arc<dyn TimestampOracle>,
        cfg: AnchorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            oracle,
            cfg,
            clock,
            submitted: Mutex::new(HashSet::new()),
            backoff: Mutex::new(HashMap::new()),
            verify_backoff: Mutex::new(None),
            stats: Mutex::new(AnchorStats::default()),
        }
    }

    /// Spawn the worker task. It runs until the token is cancelled, then
    /// drains pending submissions best-effort and exits.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Current counters.
    pub fn stats(&self) -> AnchorStats {
        *self.stats.lock().expect("stats mutex poisoned")
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut drop_tick = interval(self.cfg.drop_interval);
        let mut confirm_tick = interval(self.cfg.confirm_interval);
        drop_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        confirm_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            drop_interval_secs = self.cfg.drop_interval.as_secs(),
            confirm_interval_secs = self.cfg.confirm_interval.as_secs(),
            "anchor engine started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Drain: make sure every outstanding root has been
                    // offered to the oracle at least once before exiting.
                    self.submit_pending(true).await;
                    info!("anchor engine stopped");
                    return;
                }
                _ = drop_tick.tick() => {
                    if let Err(err) = self.drop_anchor().await {
                        warn!(%err, "anchor drop failed, will retry");
                    }
                    self.submit_pending(false).await;
                }
                _ = confirm_tick.tick() => {
                    self.poll_confirmations().await;
                }
            }
        }
    }

    /// Batch every unanchored vetted commit under a Merkle root and write
    /// the anchor commit. No-op when there is nothing to anchor.
    ///
    /// Returns the root of the anchor that was dropped, if any.
    pub async fn drop_anchor(&self) -> StoreResult<Option<Digest>> {
        let state = self.state.write().await;

        let log = state.store.log(Branch::Vetted)?;
        let index = AnchorIndex::derive(&log)?;
        let boundary = index.last_anchor().map(|la| la.last.to_hex());

        // Walk newest -> oldest: collect ordinary commits until we reach
        // the newest digest covered by the previous anchor.
        let mut pairs: Vec<(Digest, String)> = Vec::new();
        for commit in &log {
            if Some(&commit.hash) == boundary.as_ref() {
                break;
            }
            if is_marker(commit) {
                continue;
            }
            let Some(digest) = commit.digest() else {
                warn!(hash = %commit.hash, "skipping commit with unparseable hash");
                continue;
            };
            pairs.push((digest, commit.summary().to_string()));
        }

        if pairs.is_empty() {
            debug!("no unanchored commits, skipping anchor drop");
            return Ok(None);
        }

        let digests: Vec<Digest> = pairs.iter().map(|(d, _)| *d).collect();
        let root = merkle_root(&digests).expect("batch is non-empty");
        let message = anchor_message(&root, &pairs);
        state
            .store
            .commit_marker(Branch::Vetted, message, self.clock.now())?;
        drop(state);

        self.stats.lock().expect("stats mutex poisoned").dropped += 1;
        info!(root = %root, commits = pairs.len(), "anchor dropped");
        Ok(Some(root))
    }

    /// Submit every unconfirmed root the oracle has not acknowledged yet.
    /// With `ignore_backoff` (shutdown drain), failed roots are offered one
    /// final time regardless of their retry schedule.
    pub async fn submit_pending(&self, ignore_backoff: bool) {
        let roots = match self.unconfirmed_roots().await {
            Ok(roots) => roots,
            Err(err) => {
                warn!(%err, "could not derive unconfirmed anchors");
                return;
            }
        };

        for root in roots {
            if self.submitted.lock().expect("submitted mutex poisoned").contains(&root) {
                continue;
            }
            if !ignore_backoff && !self.submission_due(&root) {
                continue;
            }

            match timeout(self.cfg.oracle_deadline, self.oracle.timestamp(root)).await {
                Ok(Ok(ack)) => {
                    debug!(%root, ?ack, "root submitted to oracle");
                    self.submitted
                        .lock()
                        .expect("submitted mutex poisoned")
                        .insert(root);
                    self.backoff
                        .lock()
                        .expect("backoff mutex poisoned")
                        .remove(&root);
                    self.stats.lock().expect("stats mutex poisoned").submitted += 1;
                }
                Ok(Err(err)) => {
                    warn!(%root, %err, "oracle rejected submission, backing off");
                    self.record_submit_failure(&root);
                }
                Err(_) => {
                    warn!(%root, "oracle submission deadline exceeded, backing off");
                    self.record_submit_failure(&root);
                }
            }
        }
    }

    /// Poll the oracle for outstanding roots and commit confirmations.
    ///
    /// Returns how many confirmation commits were written.
    pub async fn poll_confirmations(&self) -> usize {
        let roots = match self.unconfirmed_roots().await {
            Ok(roots) => roots,
            Err(err) => {
                warn!(%err, "could not derive unconfirmed anchors");
                return 0;
            }
        };
        if roots.is_empty() {
            return 0;
        }

        if !self.verify_due() {
            return 0;
        }

        let replies = match timeout(self.cfg.oracle_deadline, self.oracle.verify(&roots)).await {
            Ok(Ok(replies)) => replies,
            Ok(Err(err)) => {
                warn!(%err, "oracle verify failed, backing off");
                self.record_verify_failure();
                return 0;
            }
            Err(_) => {
                warn!("oracle verify deadline exceeded, backing off");
                self.record_verify_failure();
                return 0;
            }
        };
        *self.verify_backoff.lock().expect("verify mutex poisoned") = None;

        let mut confirmed = 0;
        for reply in replies {
            match reply.status {
                VerifyStatus::Confirmed(receipt) => {
                    match self.commit_confirmation(&reply.root, receipt).await {
                        Ok(true) => confirmed += 1,
                        Ok(false) => {}
                        Err(err) => {
                            warn!(root = %reply.root, %err, "could not commit confirmation");
                        }
                    }
                }
                VerifyStatus::Pending => {
                    debug!(root = %reply.root, "anchor still pending on chain");
                }
                VerifyStatus::NotFound => {
                    // The oracle lost or never saw the root; resubmit.
                    warn!(root = %reply.root, "oracle does not know root, scheduling resubmission");
                    self.submitted
                        .lock()
                        .expect("submitted mutex poisoned")
                        .remove(&reply.root);
                }
            }
        }
        confirmed
    }

    /// Write the confirmation commit for a root, unless a concurrent cycle
    /// already did. Returns whether a commit was written.
    async fn commit_confirmation(
        &self,
        root: &Digest,
        receipt: cairn_types::AnchorReceipt,
    ) -> StoreResult<bool> {
        let state = self.state.write().await;

        // Re-derive under the lock: the root must still be outstanding.
        let log = state.store.log(Branch::Vetted)?;
        let index = AnchorIndex::derive(&log)?;
        if !index.unconfirmed().roots.contains(root) {
            return Ok(false);
        }

        let message = confirmation_message(root, &receipt);
        state
            .store
            .commit_marker(Branch::Vetted, message, self.clock.now())?;
        drop(state);

        self.stats.lock().expect("stats mutex poisoned").confirmed += 1;
        info!(
            %root,
            transaction = %receipt.transaction,
            chain_timestamp = receipt.chain_timestamp,
            "anchor confirmed"
        );
        Ok(true)
    }

    async fn unconfirmed_roots(&self) -> StoreResult<Vec<Digest>> {
        let state = self.state.read().await;
        let log = state.store.log(Branch::Vetted)?;
        let index = AnchorIndex::derive(&log)?;
        Ok(index.unconfirmed().roots)
    }

    fn submission_due(&self, root: &Digest) -> bool {
        let backoff = self.backoff.lock().expect("backoff mutex poisoned");
        match backoff.get(root) {
            Some(entry) => Instant::now() >= entry.not_before,
            None => true,
        }
    }

    fn record_submit_failure(&self, root: &Digest) {
        self.stats
            .lock()
            .expect("stats mutex poisoned")
            .oracle_failures += 1;
        let mut backoff = self.backoff.lock().expect("backoff mutex poisoned");
        let failures = backoff.get(root).map(|b| b.failures).unwrap_or(0) + 1;
        backoff.insert(*root, Backoff {
            failures,
            not_before: Instant::now() + backoff_delay(&self.cfg, failures),
        });
    }

    fn verify_due(&self) -> bool {
        let backoff = self.verify_backoff.lock().expect("verify mutex poisoned");
        match backoff.as_ref() {
            Some(entry) => Instant::now() >= entry.not_before,
            None => true,
        }
    }

    fn record_verify_failure(&self) {
        self.stats
            .lock()
            .expect("stats mutex poisoned")
            .oracle_failures += 1;
        let mut backoff = self.verify_backoff.lock().expect("verify mutex poisoned");
        let failures = backoff.as_ref().map(|b| b.failures).unwrap_or(0) + 1;
        *backoff = Some(Backoff {
            failures,
            not_before: Instant::now() + backoff_delay(&self.cfg, failures),
        });
    }
}

/// Exponential backoff: `base * 2^(failures-1)`, capped at the configured
/// ceiling.
fn backoff_delay(cfg: &AnchorConfig, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    let delay = cfg.backoff_base.saturating_mul(1u32 << shift);
    delay.min(cfg.backoff_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnchorConfig;

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = AnchorConfig {
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(1800),
            ..AnchorConfig::default()
        };
        assert_eq!(backoff_delay(&cfg, 1), Duration::from_secs(30));
        assert_eq!(backoff_delay(&cfg, 2), Duration::from_secs(60));
        assert_eq!(backoff_delay(&cfg, 3), Duration::from_secs(120));
        assert_eq!(backoff_delay(&cfg, 10), Duration::from_secs(1800));
        assert_eq!(backoff_delay(&cfg, 60), Duration::from_secs(1800));
    }
}
