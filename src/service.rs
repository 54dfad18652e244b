//! Record service facade.
//!
//! The narrow API the transport layer consumes. Every call validates its
//! inputs, takes the writer lock when it mutates, applies the state machine,
//! writes to the commit log store, and updates the catalog. Readers share
//! the lock; mutations are exclusive.
//!
//! Failure semantics: content and state-machine errors surface to the caller
//! verbatim; store failures abort the mutation and surface as an internal
//! error with a correlation id; mutations during shutdown fail fast with
//! `Shutdown`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use cairn_types::CensorshipRecord;
use cairn_types::ContentError;
use cairn_types::ContentErrorCode;
use cairn_types::Digest;
use cairn_types::MetadataStream;
use cairn_types::Record;
use cairn_types::RecordError;
use cairn_types::RecordFile;
use cairn_types::RecordMetadata;
use cairn_types::RecordResult;
use cairn_types::RecordStatus;
use cairn_types::Token;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::catalog::RecordCatalog;
use crate::config::PolicyConfig;
use crate::constants::INDEX_FILENAME;
use crate::constants::MAX_TITLE_LENGTH;
use crate::constants::MD_STREAM_VOTES_AGAINST;
use crate::constants::MD_STREAM_VOTES_FOR;
use crate::constants::MIN_TITLE_LENGTH;
use crate::identity::Identity;
use crate::merkle::merkle_root;
use crate::referendum::ReferendumRegistry;
use crate::referendum::Vote;
use crate::rsm::validate_transition;
use crate::store::Branch;
use crate::store::CommitLogStore;
use crate::store::StoreError;
use crate::time::Clock;

/// Store and catalog under the writer lock. The anchor engine shares this
/// state with the facade.
pub struct ServiceState {
    /// The authoritative commit log.
    pub store: CommitLogStore,

    /// Derived per-branch index.
    pub catalog: RecordCatalog,
}

/// Shared handle to the locked service state.
pub type SharedState = Arc<RwLock<ServiceState>>;

/// Reply to a referendum results call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferendumResults {
    /// Approve votes.
    pub votes_for: usize,

    /// Not-approve votes.
    pub votes_against: usize,

    /// The record's (terminal) status after tabulation.
    pub status: RecordStatus,
}

/// The record service.
pub struct RecordService {
    state: SharedState,
    identity: Arc<Identity>,
    referendums: ReferendumRegistry,
    clock: Arc<dyn Clock>,
    policy: PolicyConfig,
    shutdown: AtomicBool,
}

impl RecordService {
    /// Open the service over a store rooted at `data_dir`, replaying the
    /// inventory into the catalog.
    pub fn open(
        data_dir: &Path,
        policy: PolicyConfig,
        identity: Arc<Identity>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let store = CommitLogStore::open(data_dir)?;
        let catalog = RecordCatalog::load_inventory(&store)?;
        Ok(Self {
            state: Arc::new(RwLock::new(ServiceState { store, catalog })),
            identity,
            referendums: ReferendumRegistry::new(),
            clock,
            policy,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Handle to the locked state, shared with the anchor engine.
    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// The store's public signing key, 64-char hex.
    pub fn public_key(&self) -> String {
        self.identity.public_key_hex()
    }

    /// Stop accepting mutations. In-flight mutations complete; new ones
    /// fail with `Shutdown`.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!("record service shutting down, rejecting new mutations");
    }

    fn guard_shutdown(&self) -> RecordResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            Err(RecordError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Wrap a store failure as an opaque internal error. The correlation id
    /// lands in both the log line and the caller's error.
    fn internal(&self, context: &str, err: StoreError) -> RecordError {
        let correlation = self.clock.now();
        error!(correlation, context, %err, "internal store failure");
        RecordError::Internal { correlation }
    }

    /// Sign the censorship record for a record header.
    pub fn censorship(&self, meta: &RecordMetadata) -> CensorshipRecord {
        self.identity.censor_signature(meta)
    }

    /// Submit a new record.
    ///
    /// Validates content, assigns a fresh token unique across both
    /// branches, computes the Merkle root over the file digests, and
    /// commits to the unvetted branch with status `Unvetted`.
    pub async fn new_record(
        &self,
        streams: Vec<MetadataStream>,
        files: Vec<RecordFile>,
    ) -> RecordResult<RecordMetadata> {
        self.guard_shutdown()?;
        self.validate_content(&streams, &files)?;

        let now = self.clock.now();
        let mut state = self.state.write().await;

        let token = Self::fresh_token(&state.catalog);
        let digests: Vec<Digest> = files.iter().map(|f| f.digest).collect();
        let merkle = merkle_root(&digests).expect("content validation requires files");

        let mut record = Record {
            meta: RecordMetadata {
                token,
                merkle,
                status: RecordStatus::Unvetted,
                timestamp: now,
            },
            streams,
            files,
        };
        record.files.sort_by(|a, b| a.name.cmp(&b.name));
        record.streams.sort_by_key(|s| s.id);

        state
            .store
            .commit_record(
                Branch::Unvetted,
                &record,
                vec![format!("new {token}")],
                now,
            )
            .map_err(|e| self.internal("new record", e))?;

        let meta = record.meta.clone();
        state.catalog.put(Branch::Unvetted, record);
        info!(%token, "new record accepted");
        Ok(meta)
    }

    /// Update an unvetted record: add/delete files, append/overwrite
    /// metadata streams. The record moves to `IterationUnvetted`; an update
    /// that changes nothing fails with `NoChanges`.
    pub async fn update_unvetted(
        &self,
        token: &Token,
        md_append: Vec<MetadataStream>,
        md_overwrite: Vec<MetadataStream>,
        files_add: Vec<RecordFile>,
        files_del: Vec<String>,
    ) -> RecordResult<RecordMetadata> {
        self.guard_shutdown()?;

        let now = self.clock.now();
        let mut state = self.state.write().await;

        let current = state
            .catalog
            .get(Branch::Unvetted, token)
            .ok_or(RecordError::RecordNotFound)?;
        validate_transition(current.meta.status, RecordStatus::IterationUnvetted)?;

        let mut updated = current.clone();

        // Deletions are by filename and idempotent; additions replace any
        // existing file of the same name.
        updated.files.retain(|f| !files_del.contains(&f.name));
        for file in files_add {
            updated.files.retain(|f| f.name != file.name);
            updated.files.push(file);
        }
        updated.files.sort_by(|a, b| a.name.cmp(&b.name));

        apply_metadata(&mut updated.streams, &md_append, &md_overwrite);

        self.validate_content(&updated.streams, &updated.files)?;
        if updated.content_eq(current) {
            return Err(RecordError::NoChanges);
        }

        // The Merkle root is a function of the file digests only; metadata
        // edits leave it unchanged.
        let digests: Vec<Digest> = updated.files.iter().map(|f| f.digest).collect();
        updated.meta.merkle = merkle_root(&digests).expect("content validation requires files");
        updated.meta.status = RecordStatus::IterationUnvetted;
        updated.meta.timestamp = now;

        state
            .store
            .commit_record(
                Branch::Unvetted,
                &updated,
                vec![format!("update {token}")],
                now,
            )
            .map_err(|e| self.internal("update unvetted", e))?;

        let meta = updated.meta.clone();
        state.catalog.put(Branch::Unvetted, updated);
        info!(%token, "unvetted record updated");
        Ok(meta)
    }

    /// Fetch a record from the unvetted branch.
    pub async fn get_unvetted(&self, token: &Token) -> RecordResult<Record> {
        self.get_record(Branch::Unvetted, token).await
    }

    /// Fetch a record from the vetted branch.
    pub async fn get_vetted(&self, token: &Token) -> RecordResult<Record> {
        self.get_record(Branch::Vetted, token).await
    }

    async fn get_record(&self, branch: Branch, token: &Token) -> RecordResult<Record> {
        let state = self.state.read().await;
        let record = state
            .catalog
            .get(branch, token)
            .ok_or(RecordError::RecordNotFound)?
            .clone();
        drop(state);

        // Double check record bits before they leave the store: file
        // digests, the Merkle root, and the censorship signature.
        if let Err(reason) = verify_record_bits(&record) {
            let correlation = self.clock.now();
            error!(correlation, %token, reason, "record corruption detected on read");
            return Err(RecordError::Internal { correlation });
        }
        let censorship = self.identity.censor_signature(&record.meta);
        if !matches!(
            Identity::verify_censorship(&self.identity.public_key_hex(), &censorship),
            Ok(true)
        ) {
            let correlation = self.clock.now();
            error!(correlation, %token, "record signature verification failed on read");
            return Err(RecordError::Internal { correlation });
        }
        Ok(record)
    }

    /// Enumerate the most recent `vetted_count` vetted and `branches_count`
    /// unvetted records, newest first. A count of zero means all. File
    /// payloads are stripped unless `include_files` is set.
    pub async fn inventory(
        &self,
        vetted_count: usize,
        branches_count: usize,
        include_files: bool,
    ) -> RecordResult<(Vec<Record>, Vec<Record>)> {
        let state = self.state.read().await;
        let take = |records: Vec<&Record>, count: usize| -> Vec<Record> {
            let limit = if count == 0 { records.len() } else { count };
            records
                .into_iter()
                .take(limit)
                .map(|r| {
                    if include_files {
                        r.clone()
                    } else {
                        r.without_payloads()
                    }
                })
                .collect()
        };
        let vetted = take(state.catalog.by_branch(Branch::Vetted), vetted_count);
        let unvetted = take(state.catalog.by_branch(Branch::Unvetted), branches_count);
        Ok((vetted, unvetted))
    }

    /// Change the status of an unvetted record, optionally applying
    /// metadata changes in the same commit. Vetting migrates the record to
    /// the vetted branch, where the migration commit is subject to
    /// anchoring.
    pub async fn set_unvetted_status(
        &self,
        token: &Token,
        status: RecordStatus,
        md_append: Vec<MetadataStream>,
        md_overwrite: Vec<MetadataStream>,
    ) -> RecordResult<RecordStatus> {
        self.guard_shutdown()?;
        let mut state = self.state.write().await;
        self.apply_status(&mut state, token, status, md_append, md_overwrite)
    }

    /// Status change with the writer lock already held.
    fn apply_status(
        &self,
        state: &mut ServiceState,
        token: &Token,
        status: RecordStatus,
        md_append: Vec<MetadataStream>,
        md_overwrite: Vec<MetadataStream>,
    ) -> RecordResult<RecordStatus> {
        let now = self.clock.now();
        let current = state
            .catalog
            .get(Branch::Unvetted, token)
            .ok_or(RecordError::RecordNotFound)?;
        let from = current.meta.status;
        validate_transition(from, status)?;

        let mut updated = current.clone();
        apply_metadata(&mut updated.streams, &md_append, &md_overwrite);
        updated.meta.status = status;
        updated.meta.timestamp = now;

        let message = vec![format!("{} {token}", status.as_str())];
        if status == RecordStatus::Vetted {
            state
                .store
                .copy_branch(token, Branch::Unvetted, Branch::Vetted)
                .map_err(|e| self.internal("vet migration", e))?;
            state
                .store
                .commit_record(Branch::Vetted, &updated, message, now)
                .map_err(|e| self.internal("vet commit", e))?;
            state.catalog.move_record(token, Branch::Unvetted, Branch::Vetted);
            state.catalog.put(Branch::Vetted, updated);
        } else {
            state
                .store
                .commit_record(Branch::Unvetted, &updated, message, now)
                .map_err(|e| self.internal("status commit", e))?;
            state.catalog.put(Branch::Unvetted, updated);
        }

        info!(%token, %from, to = %status, "record status changed");
        Ok(status)
    }

    /// Metadata-only mutation on a vetted record. Files and the Merkle root
    /// are never touched; a no-op fails with `NoChanges`.
    pub async fn update_vetted_metadata(
        &self,
        token: &Token,
        md_append: Vec<MetadataStream>,
        md_overwrite: Vec<MetadataStream>,
    ) -> RecordResult<()> {
        self.guard_shutdown()?;

        let now = self.clock.now();
        let mut state = self.state.write().await;

        let current = state
            .catalog
            .get(Branch::Vetted, token)
            .ok_or(RecordError::RecordNotFound)?;
        validate_transition(current.meta.status, RecordStatus::Vetted)?;

        let mut updated = current.clone();
        apply_metadata(&mut updated.streams, &md_append, &md_overwrite);
        if updated.content_eq(current) {
            return Err(RecordError::NoChanges);
        }
        updated.meta.timestamp = now;

        state
            .store
            .commit_record(
                Branch::Vetted,
                &updated,
                vec![format!("metadata {token}")],
                now,
            )
            .map_err(|e| self.internal("vetted metadata", e))?;
        state.catalog.put(Branch::Vetted, updated);
        info!(%token, "vetted metadata updated");
        Ok(())
    }

    /// Open a referendum against a censored record. The caller's identity
    /// is recorded with a null vote, which blocks them from voting without
    /// counting toward either side.
    pub async fn call_referendum(&self, caller: &str, token: &Token) -> RecordResult<RecordStatus> {
        self.guard_shutdown()?;
        let mut state = self.state.write().await;

        let current = state
            .catalog
            .get(Branch::Unvetted, token)
            .ok_or(RecordError::RecordNotFound)?;
        validate_transition(current.meta.status, RecordStatus::Referendum)?;
        if self.referendums.exists(token) {
            return Err(RecordError::ReferendumClosed);
        }

        // Commit the transition first: a failed commit must leave no
        // registry entry behind, or retries would be refused forever.
        self.apply_status(&mut state, token, RecordStatus::Referendum, vec![], vec![])?;
        self.referendums.create(
            caller,
            token,
            self.clock.now(),
            self.policy.vote_period_secs,
        )?;
        Ok(RecordStatus::Referendum)
    }

    /// Cast a vote in an open referendum. Signature validation happened
    /// upstream at the transport layer.
    pub async fn cast_vote(&self, token: &Token, identity: &str, vote: Vote) -> RecordResult<()> {
        self.guard_shutdown()?;
        self.referendums
            .cast_vote(token, identity, vote, self.clock.now())
    }

    /// Tabulate a referendum after its vote period ends.
    ///
    /// The first successful call persists the tallies as metadata streams
    /// on the record and drives it to its terminal status; later calls
    /// (including after a restart) return the persisted tallies without
    /// re-running the transition.
    pub async fn referendum_results(&self, token: &Token) -> RecordResult<ReferendumResults> {
        let record = self.get_unvetted(token).await?;

        // Already executed and persisted: answer from the record itself.
        if record.meta.status.is_terminal() {
            if let Some(results) = persisted_results(&record) {
                return Ok(results);
            }
            warn!(%token, "terminal record is missing persisted tallies");
        }

        // The first tabulation mutates the record, so it is refused during
        // shutdown.
        self.guard_shutdown()?;
        let outcome = self.referendums.results(token, self.clock.now())?;

        if outcome.newly_executed {
            let tallies = vec![
                MetadataStream {
                    id: MD_STREAM_VOTES_FOR,
                    payload: outcome.tally.approve.to_string(),
                },
                MetadataStream {
                    id: MD_STREAM_VOTES_AGAINST,
                    payload: outcome.tally.not_approve.to_string(),
                },
            ];
            let mut state = self.state.write().await;

            // A concurrent call may have applied the transition between
            // tabulating and taking the lock.
            let already_final = state
                .catalog
                .get(Branch::Unvetted, token)
                .is_some_and(|r| r.meta.status.is_terminal());
            if !already_final {
                self.apply_status(&mut state, token, outcome.status, vec![], tallies)?;
                // Only a committed transition retires the tabulation; on a
                // store failure above, the next call tabulates again.
                self.referendums.mark_executed(token);
            }
        }

        Ok(ReferendumResults {
            votes_for: outcome.tally.approve,
            votes_against: outcome.tally.not_approve,
            status: outcome.status,
        })
    }

    /// Draw a fresh token, unique across both branches.
    fn fresh_token(catalog: &RecordCatalog) -> Token {
        let mut rng = rand::rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let token = Token(bytes);
            if !catalog.contains(&token) {
                return token;
            }
        }
    }

    /// Validate record content against policy.
    fn validate_content(
        &self,
        streams: &[MetadataStream],
        files: &[RecordFile],
    ) -> Result<(), ContentError> {
        if files.is_empty() {
            return Err(ContentError::new(ContentErrorCode::NoFiles));
        }
        if files.len() > self.policy.max_files {
            return Err(ContentError::with_context(
                ContentErrorCode::FileCountExceeded,
                vec![files.len().to_string()],
            ));
        }

        let mut seen = HashSet::new();
        for file in files {
            if file.name.is_empty() || file.name.contains('/') || file.name.contains("..") {
                return Err(ContentError::with_context(
                    ContentErrorCode::InvalidFilename,
                    vec![file.name.clone()],
                ));
            }
            if !seen.insert(file.name.as_str()) {
                return Err(ContentError::with_context(
                    ContentErrorCode::DuplicateFilename,
                    vec![file.name.clone()],
                ));
            }
            if file.mime.is_empty() || !file.mime.contains('/') {
                return Err(ContentError::with_context(
                    ContentErrorCode::InvalidMime,
                    vec![file.mime.clone()],
                ));
            }
            if !self.policy.valid_mimes.iter().any(|m| m == &file.mime) {
                return Err(ContentError::with_context(
                    ContentErrorCode::UnsupportedMime,
                    vec![file.mime.clone()],
                ));
            }
            if file.payload.len() > self.policy.max_file_size {
                return Err(ContentError::with_context(
                    ContentErrorCode::FileSizeExceeded,
                    vec![file.name.clone()],
                ));
            }
            if !file.digest_matches() {
                return Err(ContentError::with_context(
                    ContentErrorCode::InvalidFileDigest,
                    vec![file.name.clone()],
                ));
            }
        }

        let index = files
            .iter()
            .find(|f| f.name == INDEX_FILENAME)
            .ok_or_else(|| ContentError::new(ContentErrorCode::MissingIndexFile))?;
        validate_title(index)?;

        let mut ids = HashSet::new();
        for stream in streams {
            if !ids.insert(stream.id) {
                return Err(ContentError::with_context(
                    ContentErrorCode::DuplicateMetadataId,
                    vec![stream.id.to_string()],
                ));
            }
        }

        Ok(())
    }
}

/// Append and overwrite metadata streams in place, keeping the set sorted
/// by ID. Appends concatenate onto an existing stream's payload (creating
/// the stream when absent); overwrites replace the payload wholesale.
fn apply_metadata(
    streams: &mut Vec<MetadataStream>,
    append: &[MetadataStream],
    overwrite: &[MetadataStream],
) {
    for md in append {
        match streams.iter_mut().find(|s| s.id == md.id) {
            Some(existing) => existing.payload.push_str(&md.payload),
            None => streams.push(md.clone()),
        }
    }
    for md in overwrite {
        match streams.iter_mut().find(|s| s.id == md.id) {
            Some(existing) => existing.payload = md.payload.clone(),
            None => streams.push(md.clone()),
        }
    }
    streams.sort_by_key(|s| s.id);
}

/// The title is the first line of the index file: UTF-8, printable, and
/// within the configured length bounds.
fn validate_title(index: &RecordFile) -> Result<(), ContentError> {
    let text = std::str::from_utf8(&index.payload).map_err(|_| {
        ContentError::with_context(ContentErrorCode::InvalidTitle, vec![
            "index file is not utf-8".to_string(),
        ])
    })?;
    let title = text.lines().next().unwrap_or("").trim_start_matches('#').trim();
    if title.len() < MIN_TITLE_LENGTH || title.len() > MAX_TITLE_LENGTH {
        return Err(ContentError::with_context(
            ContentErrorCode::InvalidTitle,
            vec![title.to_string()],
        ));
    }
    if title.chars().any(|c| c.is_control()) {
        return Err(ContentError::with_context(
            ContentErrorCode::InvalidTitle,
            vec![title.to_string()],
        ));
    }
    Ok(())
}

/// Recompute file digests and the Merkle root for a record about to leave
/// the store. Returns the failure reason on corruption.
fn verify_record_bits(record: &Record) -> Result<(), &'static str> {
    for file in &record.files {
        if !file.digest_matches() {
            return Err("file payload does not match its digest");
        }
    }
    let digests: Vec<Digest> = record.files.iter().map(|f| f.digest).collect();
    match merkle_root(&digests) {
        Some(root) if root == record.meta.merkle => Ok(()),
        Some(_) => Err("merkle root does not match file digests"),
        None => Err("record has no files"),
    }
}

/// Read previously persisted referendum tallies off a terminal record.
fn persisted_results(record: &Record) -> Option<ReferendumResults> {
    let votes_for = record
        .stream(MD_STREAM_VOTES_FOR)?
        .payload
        .parse()
        .ok()?;
    let votes_against = record
        .stream(MD_STREAM_VOTES_AGAINST)?
        .payload
        .parse()
        .ok()?;
    Some(ReferendumResults {
        votes_for,
        votes_against,
        status: record.meta.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_metadata_appends_and_overwrites() {
        let mut streams = vec![MetadataStream {
            id: 1,
            payload: "abc".into(),
        }];
        apply_metadata(
            &mut streams,
            &[
                MetadataStream {
                    id: 1,
                    payload: "def".into(),
                },
                MetadataStream {
                    id: 3,
                    payload: "new".into(),
                },
            ],
            &[MetadataStream {
                id: 2,
                payload: "ow".into(),
            }],
        );
        assert_eq!(streams.len(), 3);
        assert_eq!(streams[0].payload, "abcdef");
        assert_eq!(streams[1].payload, "ow");
        assert_eq!(streams[2].payload, "new");

        // Overwrite replaces wholesale.
        apply_metadata(
            &mut streams,
            &[],
            &[MetadataStream {
                id: 1,
                payload: "reset".into(),
            }],
        );
        assert_eq!(streams[0].payload, "reset");
    }

    #[test]
    fn title_validation() {
        let ok = RecordFile::new(
            INDEX_FILENAME,
            "text/markdown; charset=utf-8",
            b"# A perfectly fine title\nbody".to_vec(),
        );
        assert!(validate_title(&ok).is_ok());

        let too_short = RecordFile::new(
            INDEX_FILENAME,
            "text/markdown; charset=utf-8",
            b"ab\nbody".to_vec(),
        );
        assert!(validate_title(&too_short).is_err());

        let too_long = RecordFile::new(
            INDEX_FILENAME,
            "text/markdown; charset=utf-8",
            format!("{}\n", "x".repeat(MAX_TITLE_LENGTH + 1)).into_bytes(),
        );
        assert!(validate_title(&too_long).is_err());

        let not_utf8 = RecordFile::new(
            INDEX_FILENAME,
            "text/markdown; charset=utf-8",
            vec![0xff, 0xfe, 0xfd],
        );
        assert!(validate_title(&not_utf8).is_err());
    }

    #[test]
    fn verify_record_bits_detects_corruption() {
        let file = RecordFile::new(INDEX_FILENAME, "text/plain; charset=utf-8", b"body".to_vec());
        let digests = vec![file.digest];
        let mut record = Record {
            meta: RecordMetadata {
                token: Token([1; 32]),
                merkle: merkle_root(&digests).unwrap(),
                status: RecordStatus::Unvetted,
                timestamp: 0,
            },
            streams: vec![],
            files: vec![file],
        };
        assert!(verify_record_bits(&record).is_ok());

        record.meta.merkle = Digest([0; 32]);
        assert!(verify_record_bits(&record).is_err());
    }
}
