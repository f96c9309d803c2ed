/**
 * Envelope cryptography.
 *  - Conversation key and topic tag derivation
 *  - AES-GCM sealing and opening of messages
 */
pub mod crypto;
/**
 * Relay fan-out: the relay client seam, a Nostr
 *  websocket client, an in-memory relay network
 *  and the coordinator that runs fetch, publish
 *  and listen against every relay at once.
 */
pub mod relay;
/**
 * Per-relay telemetry for verbose output.
 */
pub mod status;
/**
 * Retrieve, send, listen and chat, composed
 *  from the coordinator and the envelope.
 */
pub mod session;
pub mod config;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::{Conversation, ConversationKey, EnvelopeError, TopicTag};
    pub use crate::relay::{
        Identity, MemoryRelayNetwork, NostrRelayClient, PublishReport, Record, RelayClient,
        RelayCoordinator, RelayEndpoint, Timing,
    };
    pub use crate::session::{ChatSession, Messenger, SessionError};
    pub use crate::status::StatusTracker;
    pub use crate::version::build_info;
}
