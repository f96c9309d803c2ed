//! Fetch, publish and listen fanned out over every configured relay.
//!
//! Each operation spawns one worker per endpoint. Workers share a cancel
//! scope and report into the caller's [`StatusTracker`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::crypto::TopicTag;
use crate::status::{RelayStatus, StatusTracker, REASON_TIMEOUT};

use super::cancel::CancelScope;
use super::client::{RelayClient, SeenSet};
use super::record::{unix_now, Record, RecordFilter, RelayEndpoint};
use super::worker::{Flow, PublishWorker, SubscribeWorker, WorkerExit};

pub const DEFAULT_FETCH_WAIT: Duration = Duration::from_millis(500);
pub const DEFAULT_QUERY_DEADLINE: Duration = Duration::from_secs(5);
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

const REASON_NO_RECORDS: &str = "no stored records";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("no message received")]
    NoMessage,
}

/// Time limits for fan-out operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long a fetch worker waits for records once subscribed
    pub fetch_wait: Duration,
    /// Overall limit on a fetch worker, connect included
    pub query_deadline: Duration,
    /// Overall limit on a publish worker, connect included
    pub publish_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            fetch_wait: DEFAULT_FETCH_WAIT,
            query_deadline: DEFAULT_QUERY_DEADLINE,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// Outcome of a publish across all relays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub attempted: usize,
    pub succeeded: usize,
}

impl PublishReport {
    /// At least one relay accepted the record
    pub fn is_delivered(&self) -> bool {
        self.succeeded > 0
    }
}

/// Handle to a running continuous listen
///
/// Dropping the handle cancels every worker.
#[derive(Debug)]
pub struct ListenHandle {
    scope: CancelScope,
    workers: Vec<JoinHandle<WorkerExit>>,
}

impl ListenHandle {
    /// Number of workers still running
    pub fn active(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Cancel every worker and wait for them to unwind
    pub async fn stop(mut self) {
        self.scope.cancel();
        for worker in std::mem::take(&mut self.workers) {
            let _ = worker.await;
        }
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

/// Fans publish and subscribe operations out to every configured relay
///
/// Each operation spawns one worker per endpoint, all sharing a single
/// cancellation scope. Per-relay failures are logged and recorded on the
/// tracker, never returned.
#[derive(Debug, Clone)]
pub struct RelayCoordinator<C: RelayClient> {
    client: C,
    endpoints: Arc<Vec<RelayEndpoint>>,
    timing: Timing,
}

impl<C: RelayClient> RelayCoordinator<C> {
    pub fn new(client: C, endpoints: Vec<RelayEndpoint>, timing: Timing) -> Self {
        Self {
            client,
            endpoints: Arc::new(endpoints),
            timing,
        }
    }

    pub fn endpoints(&self) -> &[RelayEndpoint] {
        &self.endpoints
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Query stored records for `topic`, at most `cap` per relay
    ///
    /// Returns every distinct record that arrived, oldest first. Records with
    /// equal timestamps keep arrival order.
    pub async fn fetch(&self, topic: &TopicTag, cap: usize, tracker: &StatusTracker) -> Vec<Record> {
        let scope = CancelScope::new();
        let filter = RecordFilter::history(topic.clone(), cap);
        let deadline = Instant::now() + self.timing.query_deadline;
        let collected: Arc<Mutex<Vec<Record>>> = Arc::default();

        let workers: Vec<_> = self
            .endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                tracker.register(&endpoint);
                let worker = SubscribeWorker {
                    client: self.client.clone(),
                    endpoint: endpoint.clone(),
                    filter: filter.clone(),
                    cancel: scope.token(),
                    deadline: Some(deadline),
                    wait: Some(self.timing.fetch_wait),
                };
                let collected = collected.clone();
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let mut received = 0usize;
                    let exit = worker
                        .run(|record| {
                            if received == 0 {
                                tracker.update(&endpoint, RelayStatus::Success, None);
                            }
                            received += 1;
                            collected.lock().push(record);
                            Flow::Continue
                        })
                        .await;

                    match (&exit, received) {
                        (WorkerExit::Failed(reason), _) => {
                            tracing::debug!("fetch from {} failed: {}", endpoint, reason);
                            tracker.update(&endpoint, RelayStatus::Error, Some(reason.as_str()));
                        }
                        (WorkerExit::Finished, 0) => {
                            tracker.update(&endpoint, RelayStatus::Success, Some(REASON_NO_RECORDS));
                        }
                        (_, 0) => tracker.update(&endpoint, RelayStatus::Cancelled, None),
                        _ => {}
                    }
                    received
                })
            })
            .collect();

        let results = join_all(workers).await;
        tracker.finalize();

        let responded = results
            .iter()
            .filter(|r| matches!(r, Ok(received) if *received > 0))
            .count();
        for result in results.iter().filter_map(|r| r.as_ref().err()) {
            tracing::warn!("fetch worker panicked: {}", result);
        }

        let arrived = std::mem::take(&mut *collected.lock());
        let seen = SeenSet::new();
        let mut records: Vec<Record> = arrived.into_iter().filter(|r| seen.insert(&r.id)).collect();
        // stable, so equal timestamps keep arrival order
        records.sort_by_key(|r| r.created_at);

        tracing::info!(
            "Fetched {} records from {}/{} relays",
            records.len(),
            responded,
            self.endpoints.len()
        );
        records
    }

    /// Publish `record` to every relay
    ///
    /// Always completes; per-relay outcomes are on the report and tracker.
    pub async fn publish(&self, record: &Record, tracker: &StatusTracker) -> PublishReport {
        let scope = CancelScope::new();
        let deadline = Instant::now() + self.timing.publish_timeout;
        let record = Arc::new(record.clone());

        let workers: Vec<_> = self
            .endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                tracker.register(&endpoint);
                let worker = PublishWorker {
                    client: self.client.clone(),
                    endpoint: endpoint.clone(),
                    cancel: scope.token(),
                    deadline: Some(deadline),
                };
                let record = record.clone();
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    let exit = worker.run(&record).await;
                    match &exit {
                        WorkerExit::Finished => {
                            tracing::debug!("published {} to {}", record.id, endpoint);
                            tracker.update(&endpoint, RelayStatus::Success, None);
                        }
                        WorkerExit::Failed(reason) => {
                            tracing::warn!("failed to publish to {}: {}", endpoint, reason);
                            tracker.update(&endpoint, RelayStatus::Error, Some(reason.as_str()));
                        }
                        WorkerExit::Expired => {
                            tracing::warn!("publish to {} timed out", endpoint);
                            tracker.update(&endpoint, RelayStatus::Error, Some(REASON_TIMEOUT));
                        }
                        WorkerExit::Cancelled => {
                            tracker.update(&endpoint, RelayStatus::Cancelled, None);
                        }
                    }
                    exit == WorkerExit::Finished
                })
            })
            .collect();

        let results = join_all(workers).await;
        tracker.finalize();

        let report = PublishReport {
            attempted: self.endpoints.len(),
            succeeded: results.iter().filter(|r| matches!(r, Ok(true))).count(),
        };
        tracing::info!(
            "Published {} to {}/{} relays",
            record.id,
            report.succeeded,
            report.attempted
        );
        report
    }

    /// Wait for the first new record on `topic` that `accept` turns into a value
    ///
    /// Only records created from now on are considered. Records by
    /// `exclude_author` are skipped, as are records `accept` rejects. A
    /// `timeout` of `None` or zero waits until a record arrives or every
    /// relay has dropped out.
    pub async fn listen_once<T, F>(
        &self,
        topic: &TopicTag,
        timeout: Option<Duration>,
        exclude_author: Option<&str>,
        accept: F,
        tracker: &StatusTracker,
    ) -> Result<T, CoordinatorError>
    where
        T: Send + 'static,
        F: Fn(&Record) -> Option<T> + Send + Sync + 'static,
    {
        let scope = CancelScope::new();
        let filter = RecordFilter::live(topic.clone(), unix_now());
        let deadline = timeout
            .filter(|t| !t.is_zero())
            .map(|t| Instant::now() + t);
        let seen = SeenSet::new();
        let accept = Arc::new(accept);
        let exclude_author: Option<Arc<str>> = exclude_author.map(Arc::from);
        let (tx, rx) = flume::unbounded();

        let workers: Vec<_> = self
            .endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                tracker.register(&endpoint);
                let worker = SubscribeWorker {
                    client: self.client.clone(),
                    endpoint: endpoint.clone(),
                    filter: filter.clone(),
                    cancel: scope.token(),
                    deadline,
                    wait: None,
                };
                let seen = seen.clone();
                let accept = accept.clone();
                let exclude_author = exclude_author.clone();
                let tracker = tracker.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut delivered = false;
                    let exit = worker
                        .run(|record| {
                            if exclude_author
                                .as_deref()
                                .is_some_and(|author| record.is_authored_by(author))
                            {
                                return Flow::Continue;
                            }
                            if !seen.insert(&record.id) {
                                return Flow::Continue;
                            }
                            match (*accept)(&record) {
                                Some(value) => {
                                    tracker.update(&endpoint, RelayStatus::Success, None);
                                    delivered = tx.send(value).is_ok();
                                    Flow::Stop
                                }
                                None => {
                                    tracing::debug!("skipping record {} from {}", record.id, endpoint);
                                    Flow::Continue
                                }
                            }
                        })
                        .await;

                    if !delivered {
                        match exit {
                            WorkerExit::Failed(reason) => {
                                tracing::debug!("listen on {} failed: {}", endpoint, reason);
                                tracker.update(&endpoint, RelayStatus::Error, Some(reason.as_str()));
                            }
                            _ => tracker.update(&endpoint, RelayStatus::Cancelled, None),
                        }
                    }
                })
            })
            .collect();
        // workers hold the only senders: the channel closes once all are gone
        drop(tx);

        let result = rx.recv_async().await.map_err(|_| CoordinatorError::NoMessage);

        scope.cancel();
        join_all(workers).await;
        tracker.finalize();

        match &result {
            Ok(_) => tracing::info!("Received a message on {}", topic),
            Err(_) => tracing::info!("No message received on {}", topic),
        }
        result
    }

    /// Deliver every new record on `topic` to `on_record` until the handle
    /// is stopped or dropped
    ///
    /// `seen` is shared with the caller so records it marks (its own sends)
    /// are never delivered. Records by `exclude_author` are skipped.
    pub fn listen_continuous<F>(
        &self,
        topic: &TopicTag,
        seen: SeenSet,
        exclude_author: Option<String>,
        on_record: F,
    ) -> ListenHandle
    where
        F: Fn(Record) + Send + Sync + 'static,
    {
        let scope = CancelScope::new();
        let filter = RecordFilter::live(topic.clone(), unix_now());
        let on_record = Arc::new(on_record);
        let exclude_author: Option<Arc<str>> = exclude_author.map(Arc::from);

        let workers = self
            .endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                let worker = SubscribeWorker {
                    client: self.client.clone(),
                    endpoint: endpoint.clone(),
                    filter: filter.clone(),
                    cancel: scope.token(),
                    deadline: None,
                    wait: None,
                };
                let seen = seen.clone();
                let on_record = on_record.clone();
                let exclude_author = exclude_author.clone();
                tokio::spawn(async move {
                    let exit = worker
                        .run(|record| {
                            let own = exclude_author
                                .as_deref()
                                .is_some_and(|author| record.is_authored_by(author));
                            if !own && seen.insert(&record.id) {
                                (*on_record)(record);
                            }
                            Flow::Continue
                        })
                        .await;
                    match &exit {
                        WorkerExit::Failed(reason) => {
                            tracing::warn!("listening on {} failed: {}", endpoint, reason)
                        }
                        other => tracing::debug!("stopped listening on {}: {:?}", endpoint, other),
                    }
                    exit
                })
            })
            .collect();

        tracing::info!("Listening on {} relays", self.endpoints.len());
        ListenHandle { scope, workers }
    }
}
