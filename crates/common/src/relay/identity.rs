//! Ephemeral signing identities
//!
//! Every send or chat session mints a fresh keypair, so records cannot be
//! linked across sessions by author. Signing follows NIP-01 (BIP-340 Schnorr
//! over secp256k1) so public relays accept the records.

use std::fmt;

use nostr::{EventBuilder, Keys, Kind, Tag, Timestamp};

use super::record::{Record, RecordDraft, TEXT_NOTE_KIND};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to sign record: {0}")]
    Sign(String),
    #[error("failed to encode signed record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A signing keypair
#[derive(Clone)]
pub struct Identity {
    keys: Keys,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self {
            keys: Keys::generate(),
        }
    }

    /// Hex encoded x-only public key, as it appears in `Record::pubkey`
    pub fn public_key(&self) -> String {
        self.keys.public_key().to_hex()
    }

    /// Sign `draft` as a text note created now
    pub fn sign(&self, draft: RecordDraft) -> Result<Record, IdentityError> {
        self.sign_at(draft, super::record::unix_now())
    }

    /// Sign `draft` with an explicit creation timestamp
    pub fn sign_at(&self, draft: RecordDraft, created_at: u64) -> Result<Record, IdentityError> {
        let event = EventBuilder::new(Kind::from(TEXT_NOTE_KIND), draft.content)
            .tag(Tag::hashtag(draft.topic.as_str()))
            .custom_created_at(Timestamp::from(created_at))
            .sign_with_keys(&self.keys)
            .map_err(|e| IdentityError::Sign(e.to_string()))?;

        // the event's wire form is the record's serde form
        let record = serde_json::from_value(serde_json::to_value(&event)?)?;
        Ok(record)
    }
}
