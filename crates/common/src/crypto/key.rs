//! Conversation key derivation
//!
//! Both parties of a conversation hold the same short ID and the same shared
//! salt. Hashing the two together yields the symmetric key; hashing the key
//! once more yields the public topic tag relays index the conversation by.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Size of a conversation key in bytes (256 bits, AES-256)
pub const KEY_SIZE: usize = 32;

/// A 256-bit symmetric key derived from a conversation ID and the shared salt
///
/// Derivation is `SHA-256(id || secret)`, so the same pair always produces the
/// same key on every machine.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversationKey([u8; KEY_SIZE]);

// keep key material out of logs
impl fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConversationKey(..)")
    }
}

impl Deref for ConversationKey {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for ConversationKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        ConversationKey(bytes)
    }
}

impl ConversationKey {
    /// Derive the key for `id` under the shared `secret`
    pub fn derive(id: &str, secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(secret.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Get a reference to the key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// The public tag for this key
    pub fn topic(&self) -> TopicTag {
        TopicTag::from_key(self)
    }
}

/// Public, network-visible identifier of a conversation
///
/// Hex encoding of `SHA-256(key)`. Published in plaintext on every record, it
/// reveals neither the key nor the conversation ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicTag(String);

impl TopicTag {
    pub fn from_key(key: &ConversationKey) -> Self {
        Self(hex::encode(Sha256::digest(key.bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TopicTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key and topic for one conversation, computed once per operation
#[derive(Debug, Clone)]
pub struct Conversation {
    key: ConversationKey,
    topic: TopicTag,
}

impl Conversation {
    pub fn new(id: &str, secret: &str) -> Self {
        let key = ConversationKey::derive(id, secret);
        let topic = key.topic();
        Self { key, topic }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn topic(&self) -> &TopicTag {
        &self.topic
    }
}
