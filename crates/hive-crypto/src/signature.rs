//! Detached message signatures
//!
//! A signature covers the content hash of a serialized message. The index
//! remembers verified signatures so a fact received from a peer can be
//! forwarded with its original signature during rebroadcast.

use std::collections::{BTreeMap, HashMap, HashSet};

use sha2::{Digest, Sha256};

use hive_core::{ContentHash, HiveError, HiveResult, Message, PeerId, Timestamp};
use hive_wire::serialize_message;

use crate::{Identity, PublicIdentity};

/// SHA-256 of arbitrary bytes, as lowercase hex
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    ContentHash::new(hex::encode(Sha256::digest(bytes)))
}

/// Content hash of a message's canonical encoding
pub fn message_hash(message: &Message) -> HiveResult<ContentHash> {
    Ok(content_hash(serialize_message(message)?.as_bytes()))
}

/// Produce the detached `Signature` message for `message`
pub fn sign_message(identity: &Identity, message: &Message) -> HiveResult<Message> {
    let hash = message_hash(message)?;
    let signature = identity.sign(hash.as_str().as_bytes());
    Ok(Message::Signature {
        content_hash: hash,
        signer: identity.peer_id(),
        public_key: identity.public().to_hex(),
        signature: hex::encode(signature),
    })
}

/// Check a `Signature` message: the key must hash to the signer and the
/// ed25519 signature must cover the content hash.
pub fn verify_signature(signature: &Message) -> HiveResult<()> {
    let Message::Signature {
        content_hash,
        signer,
        public_key,
        signature,
    } = signature
    else {
        return Err(HiveError::ProcessFailure(format!(
            "expected a signature, got {}",
            signature.kind()
        )));
    };

    let public = PublicIdentity::from_hex(public_key).ok_or(HiveError::InvalidSignature)?;
    if public.peer_id() != *signer {
        return Err(HiveError::InvalidSignature);
    }
    let bytes: [u8; 64] = hex::decode(signature)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or(HiveError::InvalidSignature)?;
    if !public.verify(content_hash.as_str().as_bytes(), &bytes) {
        return Err(HiveError::InvalidSignature);
    }
    Ok(())
}

#[derive(Clone, Debug)]
struct SignatureRecord {
    public_key: String,
    signature: String,
    received: Timestamp,
}

/// `content hash -> {signer -> signature}`
#[derive(Debug, Default)]
pub struct SignatureIndex {
    entries: HashMap<ContentHash, BTreeMap<PeerId, SignatureRecord>>,
}

impl SignatureIndex {
    pub fn new() -> Self {
        SignatureIndex::default()
    }

    /// Verify and record a signature. Returns the signer.
    ///
    /// A record identical to one already held is only refreshed; it was
    /// verified when first inserted.
    pub fn insert(&mut self, message: &Message, now: Timestamp) -> HiveResult<PeerId> {
        let Message::Signature {
            content_hash,
            signer,
            public_key,
            signature,
        } = message
        else {
            return Err(HiveError::InvalidSignature);
        };

        if let Some(record) = self
            .entries
            .get_mut(content_hash)
            .and_then(|signers| signers.get_mut(signer))
        {
            if record.public_key == *public_key && record.signature == *signature {
                record.received = record.received.max(now);
                return Ok(*signer);
            }
        }

        verify_signature(message)?;

        self.entries.entry(content_hash.clone()).or_default().insert(
            *signer,
            SignatureRecord {
                public_key: public_key.clone(),
                signature: signature.clone(),
                received: now,
            },
        );
        Ok(*signer)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.get(hash).is_some_and(|s| !s.is_empty())
    }

    /// First signer (lowest peer id) of a hash
    pub fn signer(&self, hash: &ContentHash) -> Option<PeerId> {
        self.entries.get(hash)?.keys().next().copied()
    }

    pub fn signers(&self, hash: &ContentHash) -> Vec<PeerId> {
        self.entries
            .get(hash)
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Rebuild a `Signature` message for a hash, preferring `signer`
    pub fn signature_for(&self, hash: &ContentHash, signer: Option<PeerId>) -> Option<Message> {
        let signers = self.entries.get(hash)?;
        let (peer, record) = signer
            .and_then(|p| signers.get_key_value(&p))
            .or_else(|| signers.iter().next())?;
        Some(Message::Signature {
            content_hash: hash.clone(),
            signer: *peer,
            public_key: record.public_key.clone(),
            signature: record.signature.clone(),
        })
    }

    /// Drop hashes outside `keep` whose newest signature is older than `cutoff`
    pub fn prune(&mut self, keep: &HashSet<ContentHash>, cutoff: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|hash, signers| {
            keep.contains(hash) || signers.values().any(|r| r.received >= cutoff)
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{BucketPath, Validity};

    fn fact() -> Message {
        Message::propose(
            BucketPath::parse("files").unwrap(),
            "QmHash",
            Validity::unbounded(Timestamp(10)),
        )
    }

    #[test]
    fn test_sign_and_verify_message() {
        let identity = Identity::generate();
        let signature = sign_message(&identity, &fact()).unwrap();
        verify_signature(&signature).unwrap();

        match &signature {
            Message::Signature {
                content_hash,
                signer,
                ..
            } => {
                assert_eq!(*signer, identity.peer_id());
                assert_eq!(*content_hash, message_hash(&fact()).unwrap());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_forged_signer_rejected() {
        let identity = Identity::generate();
        let mut signature = sign_message(&identity, &fact()).unwrap();
        if let Message::Signature { signer, .. } = &mut signature {
            *signer = PeerId::from_bytes([9; 32]);
        }
        assert!(matches!(
            verify_signature(&signature),
            Err(HiveError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let identity = Identity::generate();
        let mut signature = sign_message(&identity, &fact()).unwrap();
        if let Message::Signature { content_hash, .. } = &mut signature {
            *content_hash = ContentHash::new("0000");
        }
        assert!(verify_signature(&signature).is_err());
    }

    #[test]
    fn test_index_insert_lookup_prune() {
        let a = Identity::generate();
        let b = Identity::generate();
        let hash = message_hash(&fact()).unwrap();
        let mut index = SignatureIndex::new();

        index.insert(&sign_message(&a, &fact()).unwrap(), Timestamp(100)).unwrap();
        index.insert(&sign_message(&b, &fact()).unwrap(), Timestamp(100)).unwrap();
        assert!(index.contains(&hash));
        assert_eq!(index.signers(&hash).len(), 2);

        let rebuilt = index.signature_for(&hash, Some(b.peer_id())).unwrap();
        verify_signature(&rebuilt).unwrap();
        assert!(matches!(rebuilt, Message::Signature { signer, .. } if signer == b.peer_id()));

        assert_eq!(index.prune(&HashSet::new(), Timestamp(50)), 0);
        assert_eq!(index.prune(&HashSet::from([hash.clone()]), Timestamp(500)), 0);
        assert_eq!(index.prune(&HashSet::new(), Timestamp(500)), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_index_repeat_refreshes_without_replacing() {
        let a = Identity::generate();
        let hash = message_hash(&fact()).unwrap();
        let signature = sign_message(&a, &fact()).unwrap();
        let mut index = SignatureIndex::new();

        index.insert(&signature, Timestamp(100)).unwrap();
        assert_eq!(index.insert(&signature, Timestamp(600)).unwrap(), a.peer_id());
        assert_eq!(index.signers(&hash), vec![a.peer_id()]);
        // The repeat counts as a fresh sighting
        assert_eq!(index.prune(&HashSet::new(), Timestamp(500)), 0);

        // Same signer, different bytes: still verified, and rejected
        let mut forged = signature.clone();
        if let Message::Signature { signature, .. } = &mut forged {
            *signature = "00".repeat(64);
        }
        assert!(matches!(
            index.insert(&forged, Timestamp(700)),
            Err(HiveError::InvalidSignature)
        ));
        assert_eq!(index.signature_for(&hash, None), Some(signature));
    }

    #[test]
    fn test_index_rejects_invalid() {
        let mut index = SignatureIndex::new();
        let bogus = Message::Signature {
            content_hash: ContentHash::new("x"),
            signer: PeerId::ZERO,
            public_key: "zz".into(),
            signature: "00".into(),
        };
        assert!(index.insert(&bogus, Timestamp(1)).is_err());
        assert!(index.is_empty());
    }
}
