use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::cancel::CancelToken;
use super::client::{RecordStream, RelayClient, RelayConnection, RelayError};
use super::record::{Record, RecordFilter, RelayEndpoint};

const LIVE_CAPACITY: usize = 256;

/// In-memory relay fan
///
/// Every relay stores what is published to it and broadcasts new records to
/// live subscribers. Relays can be made unreachable, slow or hostile to
/// publishes, and records can be scheduled to arrive later on the tokio
/// clock, so tests can run against a paused runtime.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelayNetwork {
    inner: Arc<Mutex<HashMap<RelayEndpoint, MemoryRelay>>>,
}

#[derive(Debug)]
struct MemoryRelay {
    /// Stored records, in the order they were accepted
    records: Vec<Record>,
    live: broadcast::Sender<Record>,
    reachable: bool,
    connect_delay: Duration,
    publish_delay: Duration,
    reject_publish: Option<String>,
}

impl Default for MemoryRelay {
    fn default() -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            records: Vec::new(),
            live,
            reachable: true,
            connect_delay: Duration::ZERO,
            publish_delay: Duration::ZERO,
            reject_publish: None,
        }
    }
}

impl MemoryRelay {
    /// Store `record` unless already present, broadcasting it if new
    fn accept(&mut self, record: Record) -> bool {
        if self.records.iter().any(|r| r.id == record.id) {
            return false;
        }
        self.records.push(record.clone());
        // no live subscribers is fine
        let _ = self.live.send(record);
        true
    }
}

impl MemoryRelayNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network with one healthy relay per endpoint
    pub fn with_relays<'a>(endpoints: impl IntoIterator<Item = &'a RelayEndpoint>) -> Self {
        let network = Self::new();
        for endpoint in endpoints {
            network.add_relay(endpoint);
        }
        network
    }

    /// Add a healthy relay. Existing relays are left untouched.
    pub fn add_relay(&self, endpoint: &RelayEndpoint) {
        self.inner.lock().entry(endpoint.clone()).or_default();
    }

    fn with_relay<T>(&self, endpoint: &RelayEndpoint, f: impl FnOnce(&mut MemoryRelay) -> T) -> T {
        let mut inner = self.inner.lock();
        f(inner.entry(endpoint.clone()).or_default())
    }

    /// Refuse (or accept again) connections to `endpoint`
    pub fn set_unreachable(&self, endpoint: &RelayEndpoint, unreachable: bool) {
        self.with_relay(endpoint, |relay| relay.reachable = !unreachable);
    }

    pub fn set_connect_delay(&self, endpoint: &RelayEndpoint, delay: Duration) {
        self.with_relay(endpoint, |relay| relay.connect_delay = delay);
    }

    /// Delay before a publish to `endpoint` is acknowledged
    pub fn set_publish_delay(&self, endpoint: &RelayEndpoint, delay: Duration) {
        self.with_relay(endpoint, |relay| relay.publish_delay = delay);
    }

    /// Reject every publish to `endpoint` with `reason`
    pub fn reject_publishes(&self, endpoint: &RelayEndpoint, reason: &str) {
        self.with_relay(endpoint, |relay| {
            relay.reject_publish = Some(reason.to_string())
        });
    }

    /// Accept `record` on `endpoint` as if another client had published it
    pub fn inject(&self, endpoint: &RelayEndpoint, record: Record) -> bool {
        self.with_relay(endpoint, |relay| relay.accept(record))
    }

    /// Inject `record` into `endpoint` after `delay` has passed
    pub fn deliver_after(&self, endpoint: &RelayEndpoint, record: Record, delay: Duration) {
        let network = self.clone();
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            network.inject(&endpoint, record);
        });
    }

    /// Records stored on `endpoint`, in acceptance order
    pub fn records(&self, endpoint: &RelayEndpoint) -> Vec<Record> {
        self.inner
            .lock()
            .get(endpoint)
            .map(|relay| relay.records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelayClient for MemoryRelayNetwork {
    type Connection = MemoryConnection;

    async fn connect(
        &self,
        endpoint: &RelayEndpoint,
        cancel: &CancelToken,
    ) -> Result<MemoryConnection, RelayError> {
        let delay = self
            .inner
            .lock()
            .get(endpoint)
            .map(|relay| relay.connect_delay)
            .ok_or_else(|| RelayError::Connect(format!("unknown relay {}", endpoint)))?;

        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let reachable = self
            .inner
            .lock()
            .get(endpoint)
            .map(|relay| relay.reachable)
            .unwrap_or(false);
        if !reachable {
            return Err(RelayError::Connect("connection refused".to_string()));
        }

        Ok(MemoryConnection {
            network: self.clone(),
            endpoint: endpoint.clone(),
        })
    }
}

/// Connection to one relay of a [`MemoryRelayNetwork`]
#[derive(Debug)]
pub struct MemoryConnection {
    network: MemoryRelayNetwork,
    endpoint: RelayEndpoint,
}

#[async_trait]
impl RelayConnection for MemoryConnection {
    async fn subscribe(self, filter: RecordFilter) -> Result<RecordStream, RelayError> {
        let inner = self.network.inner.lock();
        let relay = inner.get(&self.endpoint).ok_or(RelayError::Closed)?;

        let mut stored: Vec<Record> = relay
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            // keep the `limit` most recently accepted
            let skip = stored.len().saturating_sub(limit);
            stored.drain(..skip);
            return Ok(futures::stream::iter(stored).boxed());
        }

        // subscribe before releasing the lock so nothing slips between
        // the stored snapshot and the live feed
        let rx = relay.live.subscribe();
        drop(inner);

        let live = futures::stream::unfold((rx, filter), |(mut rx, filter)| async move {
            loop {
                match rx.recv().await {
                    Ok(record) if filter.matches(&record) => return Some((record, (rx, filter))),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(futures::stream::iter(stored).chain(live).boxed())
    }

    async fn publish(&mut self, record: &Record) -> Result<(), RelayError> {
        let delay = self
            .network
            .inner
            .lock()
            .get(&self.endpoint)
            .map(|relay| relay.publish_delay)
            .ok_or(RelayError::Closed)?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.network.inner.lock();
        let relay = inner.get_mut(&self.endpoint).ok_or(RelayError::Closed)?;
        if let Some(reason) = &relay.reject_publish {
            return Err(RelayError::Publish(reason.clone()));
        }
        relay.accept(record.clone());
        Ok(())
    }

    async fn close(self) {}
}
