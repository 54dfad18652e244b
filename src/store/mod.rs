//! Commit log store: an append-only, content-addressed record store with
//! two branches, `unvetted` and `vetted`.
//!
//! On-disk layout, per branch:
//!
//! ```text
//! <root>/<branch>/journal                  append-only commit journal (JSON lines)
//! <root>/<branch>/records/<token-hex>/
//!     record.json                          sidecar: header, streams, file manifest
//!     payload/<filename>                   raw file contents
//! ```
//!
//! The journal is authoritative: the append is the commit point, and every
//! entry's digest chains over its parent, so history is tamper-evident and
//! re-derivable. Record trees hold the current state of each record and are
//! what the inventory loader replays on startup.
//!
//! The store itself is synchronous and unsynchronized; callers serialize
//! mutations through the service writer lock.

pub mod commit;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use cairn_types::Commit;
use cairn_types::Digest;
use cairn_types::Record;
use cairn_types::Token;
use thiserror::Error;
use tracing::debug;

use crate::store::commit::JournalEntry;
use crate::store::commit::ZERO_DIGEST;
use crate::store::commit::commit_digest;

/// A logical branch of the commit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// Records not yet published.
    Unvetted,

    /// Publicly published records; the branch that gets anchored.
    Vetted,
}

impl Branch {
    /// Directory name under the store root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Unvetted => "unvetted",
            Branch::Vetted => "vetted",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the commit log store. These never reach clients directly;
/// the service maps them to `RecordNotFound` or an internal error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record tree exists for the token on the branch.
    #[error("record not found in store")]
    NotFound,

    /// Filesystem failure.
    #[error("store i/o failure at {path}: {source}")]
    Io {
        /// Path the operation touched.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The on-disk state does not parse or verify.
    #[error("corrupt store: {reason}")]
    Corrupt {
        /// What failed to parse or verify.
        reason: String,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Filesystem-backed commit log store.
pub struct CommitLogStore {
    root: PathBuf,
}

impl CommitLogStore {
    /// Open a store at `root`, creating branch directories and empty
    /// journals as needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for branch in [Branch::Unvetted, Branch::Vetted] {
            let records = root.join(branch.as_str()).join("records");
            fs::create_dir_all(&records).map_err(|e| io_err(&records, e))?;

            let journal = root.join(branch.as_str()).join("journal");
            if !journal.exists() {
                fs::File::create(&journal).map_err(|e| io_err(&journal, e))?;
            }
        }
        debug!(root = %root.display(), "commit log store opened");
        Ok(Self { root })
    }

    fn journal_path(&self, branch: Branch) -> PathBuf {
        self.root.join(branch.as_str()).join("journal")
    }

    fn record_dir(&self, branch: Branch, token: &Token) -> PathBuf {
        self.root
            .join(branch.as_str())
            .join("records")
            .join(token.to_hex())
    }

    /// Commit a record's current state to a branch.
    ///
    /// Writes the record tree (payload files in lexicographic name order,
    /// then the sidecar), then appends the journal entry. Returns the new
    /// commit.
    pub fn commit_record(
        &self,
        branch: Branch,
        record: &Record,
        message: Vec<String>,
        time: i64,
    ) -> StoreResult<Commit> {
        let tree_digest = self.write_record_tree(branch, record)?;
        self.append_commit(branch, message, time, tree_digest)
    }

    /// Commit a marker (a commit that touches no record tree), such as an
    /// anchor drop or an anchor confirmation.
    pub fn commit_marker(
        &self,
        branch: Branch,
        message: Vec<String>,
        time: i64,
    ) -> StoreResult<Commit> {
        self.append_commit(branch, message, time, ZERO_DIGEST)
    }

    /// Return the branch's commits, newest first.
    pub fn log(&self, branch: Branch) -> StoreResult<Vec<Commit>> {
        let mut commits: Vec<Commit> = self
            .read_journal(branch)?
            .into_iter()
            .map(|entry| Commit {
                hash: entry.hash,
                time: entry.time,
                message: entry.message,
            })
            .collect();
        commits.reverse();
        Ok(commits)
    }

    /// Reconstruct a record from its current tree, verifying every payload
    /// against the manifest digest.
    pub fn read_record(&self, branch: Branch, token: &Token) -> StoreResult<Record> {
        let dir = self.record_dir(branch, token);
        let sidecar_path = dir.join("record.json");
        if !sidecar_path.exists() {
            return Err(StoreError::NotFound);
        }

        let sidecar = fs::read(&sidecar_path).map_err(|e| io_err(&sidecar_path, e))?;
        let mut record: Record =
            serde_json::from_slice(&sidecar).map_err(|e| StoreError::Corrupt {
                reason: format!("sidecar for {token} does not parse: {e}"),
            })?;

        for file in &mut record.files {
            let payload_path = dir.join("payload").join(&file.name);
            file.payload = fs::read(&payload_path).map_err(|e| io_err(&payload_path, e))?;
            if !file.digest_matches() {
                return Err(StoreError::Corrupt {
                    reason: format!("payload digest mismatch for {token}:{}", file.name),
                });
            }
        }

        Ok(record)
    }

    /// Whether a record tree exists on the branch.
    pub fn has_record(&self, branch: Branch, token: &Token) -> bool {
        self.record_dir(branch, token).join("record.json").exists()
    }

    /// Migrate a record tree between branches. Used on vet; the source tree
    /// is removed so a token lives on one branch at a time.
    pub fn copy_branch(&self, token: &Token, src: Branch, dst: Branch) -> StoreResult<()> {
        let src_dir = self.record_dir(src, token);
        let dst_dir = self.record_dir(dst, token);
        if !src_dir.exists() {
            return Err(StoreError::NotFound);
        }
        if dst_dir.exists() {
            fs::remove_dir_all(&dst_dir).map_err(|e| io_err(&dst_dir, e))?;
        }
        fs::rename(&src_dir, &dst_dir).map_err(|e| io_err(&src_dir, e))?;
        debug!(%token, %src, %dst, "record migrated between branches");
        Ok(())
    }

    /// List the tokens with a record tree on the branch.
    pub fn list_tokens(&self, branch: Branch) -> StoreResult<Vec<Token>> {
        let records = self.root.join(branch.as_str()).join("records");
        let mut tokens = Vec::new();
        let entries = fs::read_dir(&records).map_err(|e| io_err(&records, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&records, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            match Token::from_hex(&name) {
                Ok(token) => tokens.push(token),
                Err(_) => {
                    return Err(StoreError::Corrupt {
                        reason: format!("unexpected entry in records dir: {name}"),
                    });
                }
            }
        }
        tokens.sort();
        Ok(tokens)
    }

    /// Write a record tree: payload files in lexicographic name order, then
    /// the sidecar. Returns the sidecar digest (the commit's tree digest).
    fn write_record_tree(&self, branch: Branch, record: &Record) -> StoreResult<Digest> {
        let dir = self.record_dir(branch, &record.meta.token);
        let payload_dir = dir.join("payload");

        // Replace the tree wholesale so deleted files do not linger.
        if payload_dir.exists() {
            fs::remove_dir_all(&payload_dir).map_err(|e| io_err(&payload_dir, e))?;
        }
        fs::create_dir_all(&payload_dir).map_err(|e| io_err(&payload_dir, e))?;

        // Canonical ordering: sidecar entries and on-disk writes are both
        // lexicographic by filename, streams sorted by ID.
        let mut canonical = record.clone();
        canonical.files.sort_by(|a, b| a.name.cmp(&b.name));
        canonical.streams.sort_by_key(|s| s.id);

        for file in &canonical.files {
            let path = payload_dir.join(&file.name);
            fs::write(&path, &file.payload).map_err(|e| io_err(&path, e))?;
        }

        let sidecar = serde_json::to_vec_pretty(&canonical.without_payloads()).map_err(|e| {
            StoreError::Corrupt {
                reason: format!("sidecar for {} does not serialize: {e}", record.meta.token),
            }
        })?;
        let sidecar_path = dir.join("record.json");
        fs::write(&sidecar_path, &sidecar).map_err(|e| io_err(&sidecar_path, e))?;

        Ok(Digest::of(&sidecar))
    }

    fn append_commit(
        &self,
        branch: Branch,
        message: Vec<String>,
        time: i64,
        tree: Digest,
    ) -> StoreResult<Commit> {
        debug_assert!(!message.is_empty(), "commit message must be non-empty");

        let parent = self.head(branch)?;
        let hash = commit_digest(&parent, time, &message, &tree);

        let entry = JournalEntry {
            hash: hash.to_hex(),
            parent: parent.to_hex(),
            time,
            message: message.clone(),
            tree: tree.to_hex(),
        };
        let mut line = serde_json::to_vec(&entry).map_err(|e| StoreError::Corrupt {
            reason: format!("journal entry does not serialize: {e}"),
        })?;
        line.push(b'\n');

        let journal = self.journal_path(branch);
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&journal)
            .map_err(|e| io_err(&journal, e))?;
        file.write_all(&line).map_err(|e| io_err(&journal, e))?;

        debug!(%branch, hash = %entry.hash, summary = %message[0], "commit appended");
        Ok(Commit {
            hash: entry.hash,
            time,
            message,
        })
    }

    /// Digest of the branch head, or all zeroes for an empty branch.
    fn head(&self, branch: Branch) -> StoreResult<Digest> {
        let entries = self.read_journal(branch)?;
        match entries.last() {
            Some(entry) => Digest::from_hex(&entry.hash).map_err(|_| StoreError::Corrupt {
                reason: format!("journal head is not a digest: {}", entry.hash),
            }),
            None => Ok(ZERO_DIGEST),
        }
    }

    fn read_journal(&self, branch: Branch) -> StoreResult<Vec<JournalEntry>> {
        let journal = self.journal_path(branch);
        let raw = fs::read_to_string(&journal).map_err(|e| io_err(&journal, e))?;
        let mut entries = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let entry: JournalEntry =
                serde_json::from_str(line).map_err(|e| StoreError::Corrupt {
                    reason: format!("journal line does not parse: {e}"),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::MetadataStream;
    use cairn_types::RecordFile;
    use cairn_types::RecordMetadata;
    use cairn_types::RecordStatus;

    use crate::merkle::merkle_root;

    fn test_record(token_byte: u8) -> Record {
        let files = vec![
            RecordFile::new("index.md", "text/plain; charset=utf-8", b"# title\nbody".to_vec()),
            RecordFile::new("data.txt", "text/plain; charset=utf-8", b"payload".to_vec()),
        ];
        let digests: Vec<Digest> = files.iter().map(|f| f.digest).collect();
        Record {
            meta: RecordMetadata {
                token: Token([token_byte; 32]),
                merkle: merkle_root(&digests).unwrap(),
                status: RecordStatus::Unvetted,
                timestamp: 1_000,
            },
            streams: vec![MetadataStream {
                id: 1,
                payload: "{}".to_string(),
            }],
            files,
        }
    }

    #[test]
    fn commit_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitLogStore::open(dir.path()).unwrap();

        let record = test_record(1);
        store
            .commit_record(
                Branch::Unvetted,
                &record,
                vec![format!("new {}", record.meta.token)],
                1_000,
            )
            .unwrap();

        let mut read = store.read_record(Branch::Unvetted, &record.meta.token).unwrap();
        // The stored tree is canonical: files sorted by name.
        read.files.sort_by(|a, b| a.name.cmp(&b.name));
        let mut expected = record.clone();
        expected.files.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(read, expected);
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitLogStore::open(dir.path()).unwrap();
        let err = store
            .read_record(Branch::Unvetted, &Token([9; 32]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn log_is_newest_first_and_chained() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitLogStore::open(dir.path()).unwrap();

        let record = test_record(1);
        store
            .commit_record(Branch::Unvetted, &record, vec!["first".into()], 100)
            .unwrap();
        store
            .commit_record(Branch::Unvetted, &record, vec!["second".into()], 200)
            .unwrap();

        let log = store.log(Branch::Unvetted).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].summary(), "second");
        assert_eq!(log[1].summary(), "first");
        assert_ne!(log[0].hash, log[1].hash);
    }

    #[test]
    fn branches_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitLogStore::open(dir.path()).unwrap();

        let record = test_record(1);
        store
            .commit_record(Branch::Unvetted, &record, vec!["unvetted commit".into()], 100)
            .unwrap();

        assert!(store.log(Branch::Vetted).unwrap().is_empty());
        assert!(!store.has_record(Branch::Vetted, &record.meta.token));
    }

    #[test]
    fn copy_branch_moves_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitLogStore::open(dir.path()).unwrap();

        let record = test_record(3);
        store
            .commit_record(Branch::Unvetted, &record, vec!["new".into()], 100)
            .unwrap();

        store
            .copy_branch(&record.meta.token, Branch::Unvetted, Branch::Vetted)
            .unwrap();
        assert!(!store.has_record(Branch::Unvetted, &record.meta.token));
        assert!(store.has_record(Branch::Vetted, &record.meta.token));

        let read = store.read_record(Branch::Vetted, &record.meta.token).unwrap();
        assert_eq!(read.meta.token, record.meta.token);
    }

    #[test]
    fn update_drops_deleted_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitLogStore::open(dir.path()).unwrap();

        let mut record = test_record(4);
        store
            .commit_record(Branch::Unvetted, &record, vec!["new".into()], 100)
            .unwrap();

        // Delete data.txt and recommit.
        record.files.retain(|f| f.name == "index.md");
        let digests: Vec<Digest> = record.files.iter().map(|f| f.digest).collect();
        record.meta.merkle = merkle_root(&digests).unwrap();
        store
            .commit_record(Branch::Unvetted, &record, vec!["update".into()], 200)
            .unwrap();

        let read = store.read_record(Branch::Unvetted, &record.meta.token).unwrap();
        assert_eq!(read.files.len(), 1);
        assert_eq!(read.files[0].name, "index.md");
    }

    #[test]
    fn tampered_payload_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitLogStore::open(dir.path()).unwrap();

        let record = test_record(5);
        store
            .commit_record(Branch::Unvetted, &record, vec!["new".into()], 100)
            .unwrap();

        let payload = dir
            .path()
            .join("unvetted")
            .join("records")
            .join(record.meta.token.to_hex())
            .join("payload")
            .join("index.md");
        fs::write(&payload, b"tampered").unwrap();

        let err = store
            .read_record(Branch::Unvetted, &record.meta.token)
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
