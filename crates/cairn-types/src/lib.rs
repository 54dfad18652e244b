//! Shared domain types for the cairn record store.
//!
//! This crate holds the types that cross component boundaries — records and
//! their files, anchors, commits, and the error taxonomy — so that consumers
//! of the record service do not have to depend on the storage engine itself.

pub mod anchor;
pub mod errors;
pub mod record;

pub use anchor::Anchor;
pub use anchor::AnchorReceipt;
pub use anchor::AnchorType;
pub use anchor::Commit;
pub use anchor::LastAnchor;
pub use anchor::UnconfirmedAnchors;
pub use errors::ContentError;
pub use errors::ContentErrorCode;
pub use errors::RecordError;
pub use errors::RecordResult;
pub use record::CensorshipRecord;
pub use record::Digest;
pub use record::MetadataStream;
pub use record::Record;
pub use record::RecordFile;
pub use record::RecordMetadata;
pub use record::RecordStatus;
pub use record::Token;
pub use record::DIGEST_SIZE;
pub use record::TOKEN_SIZE;
