//! Relay fan-out
//!
//! [`RelayClient`] is the seam to the broadcast network: one implementation
//! speaks Nostr over websockets ([`NostrRelayClient`]), the other keeps
//! everything in memory ([`MemoryRelayNetwork`]). [`RelayCoordinator`] runs
//! fetch, publish and listen against every configured relay at once.

mod cancel;
mod client;
mod coordinator;
mod identity;
pub mod memory;
mod record;
mod websocket;
mod worker;

pub use cancel::{CancelScope, CancelToken};
pub use client::{RecordStream, RelayClient, RelayConnection, RelayError, SeenSet};
pub use coordinator::{
    CoordinatorError, ListenHandle, PublishReport, RelayCoordinator, Timing,
    DEFAULT_FETCH_WAIT, DEFAULT_PUBLISH_TIMEOUT, DEFAULT_QUERY_DEADLINE,
};
pub use identity::{Identity, IdentityError};
pub use memory::MemoryRelayNetwork;
pub use record::{
    unix_now, EndpointError, Record, RecordDraft, RecordFilter, RelayEndpoint, TEXT_NOTE_KIND,
    TOPIC_TAG_NAME,
};
pub use websocket::{NostrConnection, NostrRelayClient, DEFAULT_CONNECT_TIMEOUT};
pub use worker::WorkerExit;
