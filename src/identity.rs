//! Signing identity.
//!
//! The store signs every censorship record with a long-lived ed25519 key:
//! the signature over `merkle || token` is the submitter's non-repudiable
//! proof that the store accepted the record with exactly that content. The
//! identity is generated on first run, persisted to disk, and read-only
//! after load.

use std::fs;
use std::path::Path;

use cairn_types::CensorshipRecord;
use cairn_types::Digest;
use cairn_types::RecordMetadata;
use cairn_types::Token;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier;
use ed25519_dalek::VerifyingKey;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Identity load/store failure.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity file could not be read or written.
    #[error("identity i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The identity file does not parse or carries a bad key.
    #[error("identity file invalid: {reason}")]
    Invalid {
        /// What was wrong.
        reason: String,
    },
}

/// On-disk identity format: hex-encoded key material.
#[derive(Serialize, Deserialize)]
struct IdentityFile {
    public_key: String,
    secret_key: String,
}

/// The store's ed25519 signing identity.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a fresh identity from the OS random source.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Load an identity from disk.
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let raw = fs::read(path)?;
        let file: IdentityFile =
            serde_json::from_slice(&raw).map_err(|e| IdentityError::Invalid {
                reason: format!("does not parse: {e}"),
            })?;
        let seed = hex::decode(&file.secret_key).map_err(|e| IdentityError::Invalid {
            reason: format!("secret key is not hex: {e}"),
        })?;
        let seed: [u8; 32] = seed.try_into().map_err(|_| IdentityError::Invalid {
            reason: "secret key must be 32 bytes".to_string(),
        })?;
        let identity = Self {
            signing_key: SigningKey::from_bytes(&seed),
        };
        if identity.public_key_hex() != file.public_key {
            return Err(IdentityError::Invalid {
                reason: "public key does not match secret key".to_string(),
            });
        }
        Ok(identity)
    }

    /// Persist the identity to disk.
    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        let file = IdentityFile {
            public_key: self.public_key_hex(),
            secret_key: hex::encode(self.signing_key.to_bytes()),
        };
        let raw = serde_json::to_vec_pretty(&file).map_err(|e| IdentityError::Invalid {
            reason: format!("does not serialize: {e}"),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, raw)?;
        Ok(())
    }

    /// Load the identity at `path`, generating and persisting a fresh one
    /// if the file does not exist yet.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            Identity::load(path)
        } else {
            info!(path = %path.display(), "generating signing identity");
            let identity = Identity::generate();
            identity.save(path)?;
            Ok(identity)
        }
    }

    /// Public key, 64-char lower-hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Sign `merkle || token` and assemble the censorship record for a
    /// record header.
    pub fn censor_signature(&self, meta: &RecordMetadata) -> CensorshipRecord {
        let mut message = Vec::with_capacity(64);
        message.extend_from_slice(meta.merkle.as_bytes());
        message.extend_from_slice(meta.token.as_bytes());
        let signature = self.signing_key.sign(&message);
        CensorshipRecord {
            token: meta.token.to_hex(),
            merkle: meta.merkle.to_hex(),
            signature: hex::encode(signature.to_bytes()),
        }
    }

    /// Verify a censorship record against a public key. Used to double
    /// check record bits before they leave the store.
    pub fn verify_censorship(
        public_key_hex: &str,
        record: &CensorshipRecord,
    ) -> Result<bool, IdentityError> {
        let key_bytes = hex::decode(public_key_hex).map_err(|e| IdentityError::Invalid {
            reason: format!("public key is not hex: {e}"),
        })?;
        let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| IdentityError::Invalid {
            reason: "public key must be 32 bytes".to_string(),
        })?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|e| IdentityError::Invalid {
            reason: format!("public key invalid: {e}"),
        })?;

        let merkle = Digest::from_hex(&record.merkle).map_err(|_| IdentityError::Invalid {
            reason: "merkle is not a hex digest".to_string(),
        })?;
        let token = Token::from_hex(&record.token).map_err(|_| IdentityError::Invalid {
            reason: "token is not a hex token".to_string(),
        })?;
        let sig_bytes = hex::decode(&record.signature).map_err(|e| IdentityError::Invalid {
            reason: format!("signature is not hex: {e}"),
        })?;
        let sig_bytes: [u8; 64] = sig_bytes.try_into().map_err(|_| IdentityError::Invalid {
            reason: "signature must be 64 bytes".to_string(),
        })?;
        let signature = Signature::from_bytes(&sig_bytes);

        let mut message = Vec::with_capacity(64);
        message.extend_from_slice(merkle.as_bytes());
        message.extend_from_slice(token.as_bytes());
        Ok(key.verify(&message, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::RecordStatus;

    fn meta() -> RecordMetadata {
        RecordMetadata {
            token: Token([7; 32]),
            merkle: Digest([8; 32]),
            status: RecordStatus::Unvetted,
            timestamp: 0,
        }
    }

    #[test]
    fn sign_and_verify() {
        let identity = Identity::generate();
        let censorship = identity.censor_signature(&meta());

        assert_eq!(censorship.token.len(), 64);
        assert_eq!(censorship.merkle.len(), 64);
        assert_eq!(censorship.signature.len(), 128);
        assert!(
            Identity::verify_censorship(&identity.public_key_hex(), &censorship).unwrap()
        );
    }

    #[test]
    fn verify_rejects_tampering() {
        let identity = Identity::generate();
        let mut censorship = identity.censor_signature(&meta());
        censorship.merkle = Digest([9; 32]).to_hex();
        assert!(
            !Identity::verify_censorship(&identity.public_key_hex(), &censorship).unwrap()
        );
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let identity = Identity::generate();
        identity.save(&path).unwrap();

        let loaded = Identity::load(&path).unwrap();
        assert_eq!(loaded.public_key_hex(), identity.public_key_hex());
    }

    #[test]
    fn load_or_generate_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let first = Identity::load_or_generate(&path).unwrap();
        let second = Identity::load_or_generate(&path).unwrap();
        assert_eq!(first.public_key_hex(), second.public_key_hex());
    }
}
