//! Record types.
//!
//! A record is the unit of content in the store: an ordered set of files, a
//! set of metadata streams, and a header carrying the censorship token, the
//! Merkle root over the file digests, the lifecycle status, and the timestamp
//! of the last status-changing commit.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use sha2::Digest as _;
use sha2::Sha256;

use crate::errors::RecordError;

/// Size of a censorship token in bytes.
pub const TOKEN_SIZE: usize = 32;

/// Size of a SHA-256 digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// A 32-byte SHA-256 digest, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; DIGEST_SIZE]);

impl Digest {
    /// Compute the SHA-256 digest of a byte slice.
    pub fn of(payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Digest(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Lower-hex encoding (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character lower-hex digest.
    pub fn from_hex(s: &str) -> Result<Self, RecordError> {
        let bytes = hex::decode(s).map_err(|_| RecordError::InvalidToken {
            reason: format!("not a hex digest: {s:?}"),
        })?;
        let arr: [u8; DIGEST_SIZE] = bytes.try_into().map_err(|_| RecordError::InvalidToken {
            reason: format!("digest must be {DIGEST_SIZE} bytes"),
        })?;
        Ok(Digest(arr))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A censorship token: 32 random bytes identifying a record, stable for the
/// record's lifetime. Hex-encoded (64 characters) on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub [u8; TOKEN_SIZE]);

impl Token {
    /// Raw token bytes.
    pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }

    /// Lower-hex encoding (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character lower-hex token.
    pub fn from_hex(s: &str) -> Result<Self, RecordError> {
        if s.len() != TOKEN_SIZE * 2 {
            return Err(RecordError::InvalidToken {
                reason: format!("token must be {} hex characters", TOKEN_SIZE * 2),
            });
        }
        let bytes = hex::decode(s).map_err(|_| RecordError::InvalidToken {
            reason: format!("not a hex token: {s:?}"),
        })?;
        let arr: [u8; TOKEN_SIZE] = bytes.try_into().map_err(|_| RecordError::InvalidToken {
            reason: format!("token must be {TOKEN_SIZE} bytes"),
        })?;
        Ok(Token(arr))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.to_hex())
    }
}

impl FromStr for Token {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::from_hex(s)
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Token::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a record.
///
/// Transitions between statuses are enforced by the record state machine;
/// `VettedFinal` and `CensoredFinal` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Zero value; never stored.
    Invalid,

    /// Freshly submitted, not yet reviewed.
    Unvetted,

    /// Unvetted with further edits applied.
    IterationUnvetted,

    /// Published on the vetted branch.
    Vetted,

    /// Censored by an administrator.
    Censored,

    /// A referendum to overturn censorship is in progress.
    Referendum,

    /// Referendum approved the record; immutable.
    VettedFinal,

    /// Referendum upheld censorship; immutable.
    CensoredFinal,
}

impl RecordStatus {
    /// Whether the status accepts no further status-changing operations.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::VettedFinal | RecordStatus::CensoredFinal)
    }

    /// Stable lowercase name, used in commit messages and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Invalid => "invalid",
            RecordStatus::Unvetted => "unvetted",
            RecordStatus::IterationUnvetted => "iteration-unvetted",
            RecordStatus::Vetted => "vetted",
            RecordStatus::Censored => "censored",
            RecordStatus::Referendum => "referendum",
            RecordStatus::VettedFinal => "vetted-final",
            RecordStatus::CensoredFinal => "censored-final",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file within a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFile {
    /// Filename, unique within the record.
    pub name: String,

    /// MIME type of the payload.
    pub mime: String,

    /// SHA-256 digest of the payload.
    pub digest: Digest,

    /// Raw file content.
    pub payload: Vec<u8>,
}

impl RecordFile {
    /// Create a file, computing the digest from the payload.
    pub fn new(name: impl Into<String>, mime: impl Into<String>, payload: Vec<u8>) -> Self {
        let digest = Digest::of(&payload);
        Self {
            name: name.into(),
            mime: mime.into(),
            digest,
            payload,
        }
    }

    /// Recompute the payload digest and compare against the stored one.
    pub fn digest_matches(&self) -> bool {
        Digest::of(&self.payload) == self.digest
    }
}

/// An opaque metadata stream attached to a record, keyed by a small integer
/// ID unique within the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStream {
    /// Stream identifier, unique per record.
    pub id: u64,

    /// Opaque UTF-8 payload.
    pub payload: String,
}

/// Record header: the status-bearing part of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Censorship token.
    pub token: Token,

    /// Merkle root over the sorted file digests. A function of the file set
    /// only; metadata-only updates never change it.
    pub merkle: Digest,

    /// Lifecycle status.
    pub status: RecordStatus,

    /// Seconds since epoch of the last status-changing commit.
    pub timestamp: i64,
}

/// A full record: header, metadata streams, and files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record header.
    pub meta: RecordMetadata,

    /// Metadata streams, sorted by ID.
    pub streams: Vec<MetadataStream>,

    /// Files, sorted by name.
    pub files: Vec<RecordFile>,
}

impl Record {
    /// Look up a metadata stream by ID.
    pub fn stream(&self, id: u64) -> Option<&MetadataStream> {
        self.streams.iter().find(|s| s.id == id)
    }

    /// Look up a file by name.
    pub fn file(&self, name: &str) -> Option<&RecordFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Whether two records carry identical content (files and metadata
    /// streams). Header fields are ignored: an update that changes neither
    /// files nor streams is a no-op even though it would bump the timestamp.
    pub fn content_eq(&self, other: &Record) -> bool {
        self.files == other.files && self.streams == other.streams
    }

    /// Return a copy with file payloads stripped (names, MIMEs, and digests
    /// are kept). Used by inventory listings that exclude file content.
    pub fn without_payloads(&self) -> Record {
        let mut copy = self.clone();
        for file in &mut copy.files {
            file.payload = Vec::new();
        }
        copy
    }
}

/// The censorship record returned to submitters: non-repudiable evidence
/// that the store accepted a record with the given content.
///
/// The signature is ed25519 over `merkle || token` (raw bytes) with the
/// store's signing identity; all fields are lower-hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensorshipRecord {
    /// Record token, 64-char hex.
    pub token: String,

    /// Merkle root of the record's files, 64-char hex.
    pub merkle: String,

    /// Signature over `merkle || token`, 128-char hex.
    pub signature: String,
}
