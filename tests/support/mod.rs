//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use cairn::anchor::engine::AnchorEngine;
use cairn::anchor::oracle::InProcessOracle;
use cairn::config::AnchorConfig;
use cairn::config::PolicyConfig;
use cairn::identity::Identity;
use cairn::service::RecordService;
use cairn::time::Clock;
use cairn::time::ManualClock;
use cairn_types::MetadataStream;
use cairn_types::RecordFile;
use cairn_types::Token;
use tempfile::TempDir;

/// Fixed epoch for deterministic timestamps.
pub const START_TIME: i64 = 1_700_000_000;

/// Vote period used by every test harness.
pub const VOTE_PERIOD: i64 = 1_000;

/// A service with a manual clock, an in-process oracle, and an anchor
/// engine, over a temp-dir store.
pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub identity: Arc<Identity>,
    pub service: Arc<RecordService>,
    pub oracle: Arc<InProcessOracle>,
    pub engine: AnchorEngine,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let clock = Arc::new(ManualClock::new(START_TIME));
        let identity = Arc::new(Identity::generate());
        let policy = PolicyConfig {
            vote_period_secs: VOTE_PERIOD,
            ..PolicyConfig::default()
        };
        let service = Arc::new(
            RecordService::open(
                dir.path(),
                policy,
                Arc::clone(&identity),
                clock.clone() as Arc<dyn Clock>,
            )
            .expect("open service"),
        );
        let oracle = Arc::new(InProcessOracle::new());
        let engine = AnchorEngine::new(
            service.shared_state(),
            oracle.clone(),
            AnchorConfig::default(),
            clock.clone() as Arc<dyn Clock>,
        );
        Self {
            dir,
            clock,
            identity,
            service,
            oracle,
            engine,
        }
    }

    /// Reopen the service over the same on-disk state, as a process restart
    /// would.
    pub fn reopen_service(&self) -> RecordService {
        let policy = PolicyConfig {
            vote_period_secs: VOTE_PERIOD,
            ..PolicyConfig::default()
        };
        RecordService::open(
            self.dir.path(),
            policy,
            Arc::clone(&self.identity),
            self.clock.clone() as Arc<dyn Clock>,
        )
        .expect("reopen service")
    }

    /// Submit a minimal valid record and return its token.
    pub async fn submit(&self, title: &str) -> Token {
        let meta = self
            .service
            .new_record(vec![], vec![index_file(title, "body text")])
            .await
            .expect("new record");
        meta.token
    }
}

/// A valid `index.md` file with the given title line.
pub fn index_file(title: &str, body: &str) -> RecordFile {
    RecordFile::new(
        "index.md",
        "text/markdown; charset=utf-8",
        format!("{title}\n{body}").into_bytes(),
    )
}

/// A plain-text attachment.
pub fn text_file(name: &str, content: &str) -> RecordFile {
    RecordFile::new(name, "text/plain; charset=utf-8", content.as_bytes().to_vec())
}

/// A metadata stream.
pub fn stream(id: u64, payload: &str) -> MetadataStream {
    MetadataStream {
        id,
        payload: payload.to_string(),
    }
}
