//! In-memory record catalog.
//!
//! A derived view over the commit log store: per-branch token lookup plus
//! enumeration ordered by timestamp descending (ties broken by token
//! ascending). The store is authoritative; the catalog is rebuilt from it
//! on startup and kept current by the service under the writer lock.

use std::collections::HashMap;

use cairn_types::Record;
use cairn_types::Token;
use tracing::info;

use crate::store::Branch;
use crate::store::CommitLogStore;
use crate::store::StoreResult;

/// Per-branch index of records.
#[derive(Default)]
pub struct RecordCatalog {
    unvetted: HashMap<Token, Record>,
    vetted: HashMap<Token, Record>,
}

impl RecordCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the catalog by replaying every record tree in the store.
    pub fn load_inventory(store: &CommitLogStore) -> StoreResult<Self> {
        let mut catalog = Self::new();
        for branch in [Branch::Unvetted, Branch::Vetted] {
            for token in store.list_tokens(branch)? {
                let record = store.read_record(branch, &token)?;
                catalog.put(branch, record);
            }
        }
        info!(
            unvetted = catalog.unvetted.len(),
            vetted = catalog.vetted.len(),
            "inventory loaded"
        );
        Ok(catalog)
    }

    fn branch_map(&self, branch: Branch) -> &HashMap<Token, Record> {
        match branch {
            Branch::Unvetted => &self.unvetted,
            Branch::Vetted => &self.vetted,
        }
    }

    fn branch_map_mut(&mut self, branch: Branch) -> &mut HashMap<Token, Record> {
        match branch {
            Branch::Unvetted => &mut self.unvetted,
            Branch::Vetted => &mut self.vetted,
        }
    }

    /// Look up a record on a branch.
    pub fn get(&self, branch: Branch, token: &Token) -> Option<&Record> {
        self.branch_map(branch).get(token)
    }

    /// Whether the token exists on either branch. Used to keep fresh tokens
    /// unique across the whole store.
    pub fn contains(&self, token: &Token) -> bool {
        self.unvetted.contains_key(token) || self.vetted.contains_key(token)
    }

    /// Insert or replace a record on a branch.
    pub fn put(&mut self, branch: Branch, record: Record) {
        self.branch_map_mut(branch).insert(record.meta.token, record);
    }

    /// Move a record between branches. Returns false when the token is not
    /// present on the source branch.
    pub fn move_record(&mut self, token: &Token, src: Branch, dst: Branch) -> bool {
        match self.branch_map_mut(src).remove(token) {
            Some(record) => {
                self.branch_map_mut(dst).insert(*token, record);
                true
            }
            None => false,
        }
    }

    /// Enumerate a branch ordered by timestamp descending, ties broken by
    /// token ascending.
    pub fn by_branch(&self, branch: Branch) -> Vec<&Record> {
        let mut records: Vec<&Record> = self.branch_map(branch).values().collect();
        records.sort_by(|a, b| {
            b.meta
                .timestamp
                .cmp(&a.meta.timestamp)
                .then_with(|| a.meta.token.cmp(&b.meta.token))
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Digest;
    use cairn_types::RecordMetadata;
    use cairn_types::RecordStatus;

    fn record(token_byte: u8, timestamp: i64) -> Record {
        Record {
            meta: RecordMetadata {
                token: Token([token_byte; 32]),
                merkle: Digest([0; 32]),
                status: RecordStatus::Unvetted,
                timestamp,
            },
            streams: vec![],
            files: vec![],
        }
    }

    #[test]
    fn ordering_is_timestamp_desc_token_asc() {
        let mut catalog = RecordCatalog::new();
        catalog.put(Branch::Unvetted, record(3, 100));
        catalog.put(Branch::Unvetted, record(1, 200));
        catalog.put(Branch::Unvetted, record(2, 200));

        let ordered = catalog.by_branch(Branch::Unvetted);
        let tokens: Vec<u8> = ordered.iter().map(|r| r.meta.token.0[0]).collect();
        // 200s first (token tiebreak ascending), then the 100.
        assert_eq!(tokens, vec![1, 2, 3]);
    }

    #[test]
    fn move_between_branches() {
        let mut catalog = RecordCatalog::new();
        let r = record(1, 10);
        let token = r.meta.token;
        catalog.put(Branch::Unvetted, r);

        assert!(catalog.move_record(&token, Branch::Unvetted, Branch::Vetted));
        assert!(catalog.get(Branch::Unvetted, &token).is_none());
        assert!(catalog.get(Branch::Vetted, &token).is_some());
        assert!(catalog.contains(&token));

        // Second move from the now-empty source fails.
        assert!(!catalog.move_record(&token, Branch::Unvetted, Branch::Vetted));
    }
}
