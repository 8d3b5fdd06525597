//! Identity management using Ed25519

use std::fs;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use hive_core::{HiveError, HiveResult, PeerId};

/// Identity keypair for a node
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    peer_id: PeerId,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create identity from existing signing key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let peer_id = derive_peer_id(&verifying_key);
        Identity {
            signing_key,
            verifying_key,
            peer_id,
        }
    }

    /// Load the hex-encoded key at `path`, or generate one and write it there
    pub fn load_or_generate(path: &Path) -> HiveResult<Self> {
        if path.exists() {
            let text = fs::read_to_string(path)?;
            let bytes = hex::decode(text.trim())
                .map_err(|e| HiveError::Config(format!("{}: {e}", path.display())))?;
            let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                HiveError::Config(format!("{}: expected a 32-byte key", path.display()))
            })?;
            let identity = Identity::from_bytes(&bytes);
            tracing::debug!(peer = %identity.peer_id.short(), "loaded identity");
            return Ok(identity);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let identity = Identity::generate();
        fs::write(path, hex::encode(identity.signing_key_bytes()))?;
        tracing::info!(peer = %identity.peer_id.short(), path = %path.display(), "generated new identity");
        Ok(identity)
    }

    /// Get the signing key bytes (secret)
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Get the verifying key bytes (public)
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the peer ID (hash of public key)
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Public half of this identity
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            verifying_key: self.verifying_key,
            peer_id: self.peer_id,
        }
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = Signature::from_bytes(signature);
        self.verifying_key.verify(message, &sig).is_ok()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

/// PeerId = SHA-256 of the verifying key
pub fn derive_peer_id(verifying_key: &VerifyingKey) -> PeerId {
    let hash = Sha256::digest(verifying_key.as_bytes());
    PeerId::from_bytes(hash.into())
}

/// Public identity for verification only
#[derive(Clone)]
pub struct PublicIdentity {
    verifying_key: VerifyingKey,
    peer_id: PeerId,
}

impl PublicIdentity {
    /// Create from verifying key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes).ok()?;
        let peer_id = derive_peer_id(&verifying_key);
        Some(PublicIdentity {
            verifying_key,
            peer_id,
        })
    }

    /// Create from the hex form carried in signature messages
    pub fn from_hex(hex_key: &str) -> Option<Self> {
        let bytes: [u8; 32] = hex::decode(hex_key).ok()?.try_into().ok()?;
        Self::from_bytes(&bytes)
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Verify a signature
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = Signature::from_bytes(signature);
        self.verifying_key.verify(message, &sig).is_ok()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl std::fmt::Debug for PublicIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicIdentity")
            .field("peer_id", &self.peer_id)
            .finish()
    }
}
