//! Per-relay workers
//!
//! Every worker runs `Connecting -> Waiting -> Done(exit)`. Each step races
//! the pending relay call against cancellation and a deadline, and the
//! worker moves on with whichever fires first.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;

use super::cancel::CancelToken;
use super::client::{RecordStream, RelayClient, RelayConnection, RelayError};
use super::record::{Record, RecordFilter, RelayEndpoint};

/// How a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Stream ended, handler stopped it, or publish acknowledged
    Finished,
    /// Wait or deadline elapsed
    Expired,
    Cancelled,
    Failed(String),
}

pub(crate) enum Race<T> {
    Ready(T),
    Expired,
    Cancelled,
}

/// Race `step` against `cancel` and an optional deadline
///
/// Cancellation wins ties, then a ready step, then expiry.
pub(crate) async fn race<F: Future>(
    step: F,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> Race<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Race::Cancelled,
        output = step => Race::Ready(output),
        _ = expire(deadline) => Race::Expired,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Whether a subscription worker keeps waiting after a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

enum SubscribeState {
    Connecting,
    Waiting {
        stream: RecordStream,
        until: Option<Instant>,
    },
    Done(WorkerExit),
}

/// Connects, subscribes and hands every record to a handler
pub(crate) struct SubscribeWorker<C: RelayClient> {
    pub client: C,
    pub endpoint: RelayEndpoint,
    pub filter: RecordFilter,
    pub cancel: CancelToken,
    /// Covers connect and wait
    pub deadline: Option<Instant>,
    /// Longest wait once subscribed
    pub wait: Option<Duration>,
}

impl<C: RelayClient> SubscribeWorker<C> {
    pub async fn run<F>(self, mut on_record: F) -> WorkerExit
    where
        F: FnMut(Record) -> Flow + Send,
    {
        let mut state = SubscribeState::Connecting;
        loop {
            state = match state {
                SubscribeState::Connecting => self.open().await,
                SubscribeState::Waiting { mut stream, until } => {
                    match race(stream.next(), &self.cancel, until).await {
                        Race::Ready(Some(record)) => match on_record(record) {
                            Flow::Continue => SubscribeState::Waiting { stream, until },
                            Flow::Stop => SubscribeState::Done(WorkerExit::Finished),
                        },
                        Race::Ready(None) => SubscribeState::Done(WorkerExit::Finished),
                        Race::Expired => SubscribeState::Done(WorkerExit::Expired),
                        Race::Cancelled => SubscribeState::Done(WorkerExit::Cancelled),
                    }
                }
                SubscribeState::Done(exit) => {
                    tracing::trace!("subscription worker for {} done: {:?}", self.endpoint, exit);
                    return exit;
                }
            };
        }
    }

    async fn open(&self) -> SubscribeState {
        let filter = self.filter.clone();
        let open = async {
            match self.client.connect(&self.endpoint, &self.cancel).await {
                Ok(connection) => connection.subscribe(filter).await,
                Err(e) => Err(e),
            }
        };

        match race(open, &self.cancel, self.deadline).await {
            Race::Ready(Ok(stream)) => SubscribeState::Waiting {
                stream,
                until: earliest(self.deadline, self.wait.map(|w| Instant::now() + w)),
            },
            Race::Ready(Err(RelayError::Cancelled)) | Race::Cancelled => {
                SubscribeState::Done(WorkerExit::Cancelled)
            }
            Race::Ready(Err(e)) => SubscribeState::Done(WorkerExit::Failed(e.to_string())),
            Race::Expired => SubscribeState::Done(WorkerExit::Expired),
        }
    }
}

enum PublishState<T> {
    Connecting,
    Waiting(T),
    Done(WorkerExit),
}

/// Connects and publishes one record, waiting for the relay's acknowledgement
pub(crate) struct PublishWorker<C: RelayClient> {
    pub client: C,
    pub endpoint: RelayEndpoint,
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl<C: RelayClient> PublishWorker<C> {
    pub async fn run(self, record: &Record) -> WorkerExit {
        let mut state = PublishState::Connecting;
        loop {
            state = match state {
                PublishState::Connecting => {
                    let connect = self.client.connect(&self.endpoint, &self.cancel);
                    match race(connect, &self.cancel, self.deadline).await {
                        Race::Ready(Ok(connection)) => PublishState::Waiting(connection),
                        Race::Ready(Err(RelayError::Cancelled)) | Race::Cancelled => {
                            PublishState::Done(WorkerExit::Cancelled)
                        }
                        Race::Ready(Err(e)) => PublishState::Done(WorkerExit::Failed(e.to_string())),
                        Race::Expired => PublishState::Done(WorkerExit::Expired),
                    }
                }
                PublishState::Waiting(mut connection) => {
                    match race(connection.publish(record), &self.cancel, self.deadline).await {
                        Race::Ready(result) => {
                            connection.close().await;
                            match result {
                                Ok(()) => PublishState::Done(WorkerExit::Finished),
                                Err(e) => PublishState::Done(WorkerExit::Failed(e.to_string())),
                            }
                        }
                        Race::Expired => PublishState::Done(WorkerExit::Expired),
                        Race::Cancelled => PublishState::Done(WorkerExit::Cancelled),
                    }
                }
                PublishState::Done(exit) => {
                    tracing::trace!("publish worker for {} done: {:?}", self.endpoint, exit);
                    return exit;
                }
            };
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Conversation;
    use crate::relay::cancel::CancelScope;
    use crate::relay::memory::MemoryRelayNetwork;

    fn endpoint(name: &str) -> RelayEndpoint {
        format!("wss://{}.test", name).parse().unwrap()
    }

    fn record(id: &str, topic: &str, created_at: u64) -> Record {
        Record {
            id: id.to_string(),
            pubkey: "pk".to_string(),
            created_at,
            kind: 1,
            tags: vec![vec!["t".to_string(), topic.to_string()]],
            content: String::new(),
            sig: String::new(),
        }
    }

    fn subscribe_worker(
        network: &MemoryRelayNetwork,
        endpoint: &RelayEndpoint,
        filter: RecordFilter,
        cancel: CancelToken,
    ) -> SubscribeWorker<MemoryRelayNetwork> {
        SubscribeWorker {
            client: network.clone(),
            endpoint: endpoint.clone(),
            filter,
            cancel,
            deadline: None,
            wait: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_subscription_finishes() {
        let topic = Conversation::new("id1", "salt").topic().clone();
        let a = endpoint("a");
        let network = MemoryRelayNetwork::with_relays([&a]);
        network.inject(&a, record("r1", topic.as_str(), 1));
        network.inject(&a, record("r2", topic.as_str(), 2));

        let scope = CancelScope::new();
        let mut got = Vec::new();
        let exit = subscribe_worker(&network, &a, RecordFilter::history(topic, 5), scope.token())
            .run(|r| {
                got.push(r.id);
                Flow::Continue
            })
            .await;

        assert_eq!(exit, WorkerExit::Finished);
        assert_eq!(got, ["r1", "r2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_expires_live_subscription() {
        let topic = Conversation::new("id1", "salt").topic().clone();
        let a = endpoint("a");
        let network = MemoryRelayNetwork::with_relays([&a]);

        let scope = CancelScope::new();
        let mut worker = subscribe_worker(&network, &a, RecordFilter::live(topic, 0), scope.token());
        worker.wait = Some(Duration::from_millis(500));

        let start = Instant::now();
        let exit = worker.run(|_| Flow::Continue).await;
        assert_eq!(exit, WorkerExit::Expired);
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_slow_connect() {
        let topic = Conversation::new("id1", "salt").topic().clone();
        let a = endpoint("a");
        let network = MemoryRelayNetwork::with_relays([&a]);
        network.set_connect_delay(&a, Duration::from_secs(10));

        let scope = CancelScope::new();
        let mut worker = subscribe_worker(&network, &a, RecordFilter::live(topic, 0), scope.token());
        worker.deadline = Some(Instant::now() + Duration::from_secs(5));
        worker.wait = Some(Duration::from_millis(500));

        assert_eq!(worker.run(|_| Flow::Continue).await, WorkerExit::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_exits_immediately() {
        let topic = Conversation::new("id1", "salt").topic().clone();
        let a = endpoint("a");
        let network = MemoryRelayNetwork::with_relays([&a]);
        network.set_unreachable(&a, true);

        let scope = CancelScope::new();
        let start = Instant::now();
        let mut worker = subscribe_worker(&network, &a, RecordFilter::live(topic, 0), scope.token());
        worker.deadline = Some(Instant::now() + Duration::from_secs(5));

        let exit = worker.run(|_| Flow::Continue).await;
        assert_eq!(exit, WorkerExit::Failed("connect failed: connection refused".to_string()));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_cancel() {
        let topic = Conversation::new("id1", "salt").topic().clone();
        let a = endpoint("a");
        let network = MemoryRelayNetwork::with_relays([&a]);
        network.inject(&a, record("r1", topic.as_str(), 1));
        network.inject(&a, record("r2", topic.as_str(), 2));

        let scope = CancelScope::new();
        let mut count = 0;
        let exit = subscribe_worker(&network, &a, RecordFilter::live(topic.clone(), 0), scope.token())
            .run(|_| {
                count += 1;
                Flow::Stop
            })
            .await;
        assert_eq!(exit, WorkerExit::Finished);
        assert_eq!(count, 1);

        let worker = subscribe_worker(&network, &a, RecordFilter::live(topic, 100), scope.token());
        let handle = tokio::spawn(worker.run(|_| Flow::Continue));
        tokio::time::sleep(Duration::from_secs(1)).await;
        scope.cancel();
        assert_eq!(handle.await.unwrap(), WorkerExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_worker_outcomes() {
        let a = endpoint("a");
        let b = endpoint("b");
        let c = endpoint("c");
        let network = MemoryRelayNetwork::with_relays([&a, &b, &c]);
        network.reject_publishes(&b, "blocked");
        network.set_publish_delay(&c, Duration::from_secs(30));

        let scope = CancelScope::new();
        let r = record("r1", "topic", 1);
        let worker = |endpoint: &RelayEndpoint| PublishWorker {
            client: network.clone(),
            endpoint: endpoint.clone(),
            cancel: scope.token(),
            deadline: Some(Instant::now() + Duration::from_secs(5)),
        };

        assert_eq!(worker(&a).run(&r).await, WorkerExit::Finished);
        assert_eq!(
            worker(&b).run(&r).await,
            WorkerExit::Failed("publish rejected: blocked".to_string())
        );
        assert_eq!(worker(&c).run(&r).await, WorkerExit::Expired);
        assert_eq!(network.records(&a).len(), 1);
        assert!(network.records(&c).is_empty());
    }
}
