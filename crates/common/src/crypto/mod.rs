//! Cryptographic primitives for Pulse
//!
//! - **Key derivation**: `SHA-256(id || secret)` gives a 256-bit conversation key
//! - **Topic tags**: `hex(SHA-256(key))`, the public label relays filter on
//! - **Envelopes**: AES-256-GCM with a random 96-bit nonce, hex encoded
//!
//! Anyone who knows the conversation ID and the shared salt can read and write
//! the conversation. Relays only ever see the topic tag and ciphertext.

mod envelope;
mod key;

pub use envelope::{open, open_text, seal, seal_text, EnvelopeError, NONCE_SIZE, TAG_SIZE};
pub use key::{Conversation, ConversationKey, TopicTag, KEY_SIZE};
