//! Referendum tabulator.
//!
//! A referendum is a time-bounded, one-vote-per-identity poll that can
//! overturn administrative censorship. The registry holds every referendum
//! ever opened, keyed by token; a token gets at most one referendum over
//! the record's lifetime, so entries are never removed or reopened.
//!
//! Expiry is computed from the wall clock at every inspection — there is no
//! background timer — so no vote can slip in after the end time regardless
//! of scheduling.

use std::collections::HashMap;
use std::sync::Mutex;

use cairn_types::RecordError;
use cairn_types::RecordResult;
use cairn_types::RecordStatus;
use cairn_types::Token;
use tracing::info;

/// A vote cast in a referendum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Overturn the censorship.
    Approve,

    /// Uphold the censorship.
    NotApprove,

    /// Counts toward neither side. Recorded for the caller who opened the
    /// referendum so they cannot also vote.
    Null,
}

/// Tally of a finished referendum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// Approve votes.
    pub approve: usize,

    /// Not-approve votes.
    pub not_approve: usize,
}

impl Tally {
    /// The status the record moves to: approval must strictly exceed
    /// disapproval to overturn censorship; ties censor.
    pub fn final_status(&self) -> RecordStatus {
        if self.approve > self.not_approve {
            RecordStatus::VettedFinal
        } else {
            RecordStatus::CensoredFinal
        }
    }
}

/// A single referendum.
#[derive(Debug, Clone)]
pub struct Referendum {
    /// Token of the record under referendum, hex.
    pub token: String,

    /// When the referendum opened, seconds since epoch.
    pub start_time: i64,

    /// When voting closes; `start_time + vote_period`.
    pub end_time: i64,

    /// Whether voting is still open. Refreshed against the clock on every
    /// inspection.
    pub active: bool,

    /// Whether the result has been tabulated and applied to the record.
    pub executed: bool,

    /// Votes by identity (voter public key, hex).
    pub votes: HashMap<String, Vote>,
}

impl Referendum {
    /// Refresh `active` against the clock and return it. Once executed, a
    /// referendum is permanently inactive.
    fn check_active(&mut self, now: i64) -> bool {
        if self.executed || now >= self.end_time {
            self.active = false;
        }
        self.active
    }

    /// Count the votes. Null votes count toward neither side.
    fn tally(&self) -> Tally {
        let mut tally = Tally {
            approve: 0,
            not_approve: 0,
        };
        for vote in self.votes.values() {
            match vote {
                Vote::Approve => tally.approve += 1,
                Vote::NotApprove => tally.not_approve += 1,
                Vote::Null => {}
            }
        }
        tally
    }
}

/// Outcome of a results call.
#[derive(Debug, Clone, Copy)]
pub struct ReferendumOutcome {
    /// The final tally.
    pub tally: Tally,

    /// The terminal status the tally selects.
    pub status: RecordStatus,

    /// True until `mark_executed` confirms the result was applied. The
    /// caller persists the tally, drives the record transition, and only
    /// then marks the referendum executed, so a failed commit leaves the
    /// tabulation on offer.
    pub newly_executed: bool,
}

/// Process-wide referendum registry.
///
/// All access goes through this mutex-guarded map; nothing relies on
/// ambient concurrency safety of the container.
#[derive(Default)]
pub struct ReferendumRegistry {
    referendums: Mutex<HashMap<String, Referendum>>,
}

impl ReferendumRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a referendum for a censored record.
    ///
    /// The caller is seeded with a null vote: they opened the poll, so they
    /// do not also get to vote in it. Fails with `ReferendumClosed` when a
    /// referendum already exists for the token — a token votes at most once
    /// over the record's lifetime.
    pub fn create(
        &self,
        caller: &str,
        token: &Token,
        now: i64,
        vote_period_secs: i64,
    ) -> RecordResult<()> {
        let key = token.to_hex();
        let mut referendums = self.referendums.lock().expect("registry mutex poisoned");
        if referendums.contains_key(&key) {
            return Err(RecordError::ReferendumClosed);
        }

        let mut votes = HashMap::new();
        votes.insert(caller.to_string(), Vote::Null);
        referendums.insert(key.clone(), Referendum {
            token: key,
            start_time: now,
            end_time: now + vote_period_secs,
            active: true,
            executed: false,
            votes,
        });
        info!(%token, caller, "referendum opened");
        Ok(())
    }

    /// Cast a vote.
    ///
    /// Rejects `ReferendumClosed` once the vote period has ended and
    /// `AlreadyVoted` for repeat identities. Signature validation happened
    /// upstream at the transport layer.
    pub fn cast_vote(
        &self,
        token: &Token,
        identity: &str,
        vote: Vote,
        now: i64,
    ) -> RecordResult<()> {
        let mut referendums = self.referendums.lock().expect("registry mutex poisoned");
        let referendum = referendums
            .get_mut(&token.to_hex())
            .ok_or(RecordError::ReferendumNotFound)?;

        if !referendum.check_active(now) {
            return Err(RecordError::ReferendumClosed);
        }
        if referendum.votes.contains_key(identity) {
            return Err(RecordError::AlreadyVoted);
        }
        referendum.votes.insert(identity.to_string(), vote);
        Ok(())
    }

    /// Tabulate a referendum.
    ///
    /// Rejects `ReferendumActive` while the vote period is running. The
    /// tabulation itself mutates nothing: `newly_executed` stays true until
    /// the caller confirms the applied transition with `mark_executed`, so
    /// a tabulation whose commit failed is offered again on the next call.
    pub fn results(&self, token: &Token, now: i64) -> RecordResult<ReferendumOutcome> {
        let mut referendums = self.referendums.lock().expect("registry mutex poisoned");
        let referendum = referendums
            .get_mut(&token.to_hex())
            .ok_or(RecordError::ReferendumNotFound)?;

        if referendum.check_active(now) {
            return Err(RecordError::ReferendumActive);
        }

        let tally = referendum.tally();
        Ok(ReferendumOutcome {
            tally,
            status: tally.final_status(),
            newly_executed: !referendum.executed,
        })
    }

    /// Record that a tabulated result has been applied to the record.
    /// Called after the terminal transition commits; from then on `results`
    /// reports `newly_executed = false`.
    pub fn mark_executed(&self, token: &Token) {
        let mut referendums = self.referendums.lock().expect("registry mutex poisoned");
        if let Some(referendum) = referendums.get_mut(&token.to_hex()) {
            let tally = referendum.tally();
            referendum.executed = true;
            referendum.active = false;
            info!(
                %token,
                approve = tally.approve,
                not_approve = tally.not_approve,
                status = %tally.final_status(),
                "referendum executed"
            );
        }
    }

    /// Whether a referendum exists for the token.
    pub fn exists(&self, token: &Token) -> bool {
        self.referendums
            .lock()
            .expect("registry mutex poisoned")
            .contains_key(&token.to_hex())
    }
}
