//! Store-wide policy and engine bounds.
//!
//! Each constant has explicit bounds to prevent unbounded resource
//! allocation; configuration may tighten but not remove them.

use std::time::Duration;

/// Maximum number of files a record may carry.
///
/// Bounded so a single record cannot balloon a commit or an inventory
/// reply.
pub const MAX_RECORD_FILES: usize = 100;

/// Maximum size of a single file payload in bytes (512 KiB).
pub const MAX_FILE_SIZE: usize = 512 * 1024;

/// Filename of the mandatory index file.
pub const INDEX_FILENAME: &str = "index.md";

/// Minimum title length (first line of the index file).
pub const MIN_TITLE_LENGTH: usize = 3;

/// Maximum title length.
pub const MAX_TITLE_LENGTH: usize = 80;

/// MIME types accepted for record files unless overridden in config.
pub const DEFAULT_VALID_MIMES: &[&str] = &[
    "text/plain; charset=utf-8",
    "text/markdown; charset=utf-8",
];

/// Metadata stream ID holding the approve tally after a referendum.
pub const MD_STREAM_VOTES_FOR: u64 = 14;

/// Metadata stream ID holding the not-approve tally after a referendum.
pub const MD_STREAM_VOTES_AGAINST: u64 = 15;

/// Default referendum vote period.
pub const DEFAULT_VOTE_PERIOD_SECS: i64 = 7 * 24 * 60 * 60;

/// Default interval between anchor drop attempts.
pub const DEFAULT_ANCHOR_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default interval between confirmation polls.
pub const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Deadline on every oracle call. Bounded so a hung oracle cannot wedge the
/// engine; the work is retried on the next tick.
pub const ORACLE_DEADLINE: Duration = Duration::from_secs(30);

/// Base delay for the engine's exponential backoff after an oracle failure.
pub const ORACLE_BACKOFF_BASE: Duration = Duration::from_secs(30);

/// Backoff ceiling. Retries never space out further than this.
pub const ORACLE_BACKOFF_MAX: Duration = Duration::from_secs(30 * 60);
