use std::collections::HashSet;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;

use super::cancel::CancelToken;
use super::record::{Record, RecordFilter, RelayEndpoint};

/// Lazy, possibly endless sequence of records from one subscription
pub type RecordStream = Pin<Box<dyn Stream<Item = Record> + Send>>;

/// Per-relay failures. Never fatal to a fan-out operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish rejected: {0}")]
    Publish(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed")]
    Closed,
    #[error("cancelled")]
    Cancelled,
}

/// Capability to open connections to relays
///
/// Implementations must honour the cancel token while connecting; the
/// coordinator races every call against it as well, so a slow
/// implementation is abandoned rather than awaited.
#[async_trait]
pub trait RelayClient: Send + Sync + Debug + Clone + 'static {
    type Connection: RelayConnection;

    async fn connect(
        &self,
        endpoint: &RelayEndpoint,
        cancel: &CancelToken,
    ) -> Result<Self::Connection, RelayError>;
}

/// An open connection to one relay
///
/// A connection serves a single subscription or any number of publishes.
/// Subscribing consumes it; dropping the returned stream closes it.
#[async_trait]
pub trait RelayConnection: Send + Sized + 'static {
    async fn subscribe(self, filter: RecordFilter) -> Result<RecordStream, RelayError>;

    async fn publish(&mut self, record: &Record) -> Result<(), RelayError>;

    async fn close(self);
}

/// Record IDs already delivered within one operation or session
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as seen, returning `true` if it was not seen before
    pub fn insert(&self, id: &str) -> bool {
        self.inner.lock().insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
