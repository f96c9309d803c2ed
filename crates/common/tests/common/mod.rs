//! Shared test utilities for relay integration tests
#![allow(dead_code)]

use common::crypto::{seal_text, Conversation};
use common::relay::{
    unix_now, Identity, MemoryRelayNetwork, Record, RecordDraft, RelayCoordinator, RelayEndpoint,
    Timing,
};
use common::session::Messenger;

pub const SECRET: &str = "test-secret";
pub const HISTORY_LIMIT: usize = 5;

/// `count` relay endpoints, `wss://relay{i}.test`
pub fn endpoints(count: usize) -> Vec<RelayEndpoint> {
    (0..count)
        .map(|i| format!("wss://relay{}.test", i).parse().unwrap())
        .collect()
}

/// A memory network with `count` healthy relays
pub fn setup_network(count: usize) -> (MemoryRelayNetwork, Vec<RelayEndpoint>) {
    let endpoints = endpoints(count);
    let network = MemoryRelayNetwork::with_relays(&endpoints);
    (network, endpoints)
}

pub fn coordinator(
    network: &MemoryRelayNetwork,
    endpoints: &[RelayEndpoint],
) -> RelayCoordinator<MemoryRelayNetwork> {
    RelayCoordinator::new(network.clone(), endpoints.to_vec(), Timing::default())
}

pub fn messenger(
    network: &MemoryRelayNetwork,
    endpoints: &[RelayEndpoint],
) -> Messenger<MemoryRelayNetwork> {
    Messenger::new(coordinator(network, endpoints), SECRET, HISTORY_LIMIT)
}

pub fn conversation(id: &str) -> Conversation {
    Conversation::new(id, SECRET)
}

/// A record carrying `message` sealed for `id`
pub fn sealed_record(identity: &Identity, id: &str, message: &str, created_at: u64) -> Record {
    let conversation = conversation(id);
    identity
        .sign_at(
            RecordDraft {
                topic: conversation.topic().clone(),
                content: seal_text(message, conversation.key()).unwrap(),
            },
            created_at,
        )
        .unwrap()
}

/// A record tagged for `id` whose content is `content` as given
pub fn raw_record(id: &str, content: &str, created_at: u64) -> Record {
    Identity::generate()
        .sign_at(
            RecordDraft {
                topic: conversation(id).topic().clone(),
                content: content.to_string(),
            },
            created_at,
        )
        .unwrap()
}

/// A timestamp live listeners started now will accept
pub fn soon() -> u64 {
    unix_now() + 60
}
