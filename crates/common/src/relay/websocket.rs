//! Nostr relay client over websockets (NIP-01)
//!
//! Frames are built and parsed with the `nostr` crate's `ClientMessage` and
//! `RelayMessage`. Records cross the seam as their NIP-01 JSON form.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use nostr::{ClientMessage, Event, Filter, JsonUtil, Kind, RelayMessage, SubscriptionId, Timestamp};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::cancel::CancelToken;
use super::client::{RecordStream, RelayClient, RelayConnection, RelayError};
use super::record::{Record, RecordFilter, RelayEndpoint};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay client speaking NIP-01 to real relays
#[derive(Debug, Clone)]
pub struct NostrRelayClient {
    connect_timeout: Duration,
}

impl Default for NostrRelayClient {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl NostrRelayClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl RelayClient for NostrRelayClient {
    type Connection = NostrConnection;

    async fn connect(
        &self,
        endpoint: &RelayEndpoint,
        cancel: &CancelToken,
    ) -> Result<NostrConnection, RelayError> {
        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(endpoint.as_str()));
        tokio::select! {
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            result = handshake => match result {
                Err(_) => Err(RelayError::Connect(format!(
                    "timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))),
                Ok(Err(e)) => Err(RelayError::Connect(e.to_string())),
                Ok(Ok((socket, _response))) => {
                    tracing::trace!("connected to {}", endpoint);
                    Ok(NostrConnection {
                        endpoint: endpoint.clone(),
                        socket,
                    })
                }
            },
        }
    }
}

/// An open websocket to one relay
pub struct NostrConnection {
    endpoint: RelayEndpoint,
    socket: Socket,
}

#[async_trait]
impl RelayConnection for NostrConnection {
    async fn subscribe(mut self, filter: RecordFilter) -> Result<RecordStream, RelayError> {
        let subscription_id = SubscriptionId::new(Uuid::new_v4().simple().to_string());
        self.socket
            .send(Message::Text(request_frame(&subscription_id, &filter)))
            .await
            .map_err(|e| RelayError::Protocol(e.to_string()))?;

        let bounded = filter.is_bounded();
        let endpoint = self.endpoint;

        let stream = futures::stream::unfold(self.socket, move |mut socket| {
            let subscription_id = subscription_id.clone();
            let endpoint = endpoint.clone();
            async move {
                loop {
                    let text = match socket.next().await {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => return None,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::debug!("socket error from {}: {}", endpoint, e);
                            return None;
                        }
                    };

                    match subscription_frame(&text, &subscription_id, bounded, &endpoint) {
                        Frame::Record(record) => return Some((record, socket)),
                        Frame::End => {
                            let _ = socket.close(None).await;
                            return None;
                        }
                        Frame::Skip => {}
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn publish(&mut self, record: &Record) -> Result<(), RelayError> {
        self.socket
            .send(Message::Text(event_frame(record)?))
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))?;

        // wait for the relay's verdict on this record
        loop {
            let text = match self.socket.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => return Err(RelayError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(RelayError::Publish(e.to_string())),
            };

            if let Some(verdict) = publish_verdict(&text, &record.id, &self.endpoint) {
                return verdict;
            }
        }
    }

    async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}

/// What one inbound frame means for an open subscription
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    Record(Record),
    End,
    Skip,
}

pub(crate) fn subscription_frame(
    text: &str,
    subscription_id: &SubscriptionId,
    bounded: bool,
    endpoint: &RelayEndpoint,
) -> Frame {
    let message = match RelayMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("ignoring frame from {}: {}", endpoint, e);
            return Frame::Skip;
        }
    };

    match message {
        RelayMessage::Event {
            subscription_id: id,
            event,
        } if id == *subscription_id => match to_record(&event) {
            Ok(record) => Frame::Record(record),
            Err(e) => {
                tracing::debug!("dropping event from {}: {}", endpoint, e);
                Frame::Skip
            }
        },
        RelayMessage::EndOfStoredEvents(id) if bounded && id == *subscription_id => Frame::End,
        RelayMessage::Closed {
            subscription_id: id,
            message,
        } if id == *subscription_id => {
            tracing::debug!("{} closed subscription: {}", endpoint, message);
            Frame::End
        }
        other => {
            tracing::trace!("{} sent {:?}", endpoint, other);
            Frame::Skip
        }
    }
}

/// The relay's answer to our publish of `record_id`, if this frame is one
pub(crate) fn publish_verdict(
    text: &str,
    record_id: &str,
    endpoint: &RelayEndpoint,
) -> Option<Result<(), RelayError>> {
    match RelayMessage::from_json(text) {
        Ok(RelayMessage::Ok {
            event_id,
            status,
            message,
        }) if event_id.to_hex() == record_id => Some(if status {
            Ok(())
        } else {
            Err(RelayError::Publish(message.to_string()))
        }),
        Ok(other) => {
            tracing::trace!("{} sent {:?}", endpoint, other);
            None
        }
        Err(e) => {
            tracing::debug!("ignoring frame from {}: {}", endpoint, e);
            None
        }
    }
}

pub(crate) fn request_frame(subscription_id: &SubscriptionId, filter: &RecordFilter) -> String {
    let mut nostr_filter = Filter::new()
        .kind(Kind::from(filter.kind))
        .hashtag(filter.topic.as_str());
    if let Some(since) = filter.since {
        nostr_filter = nostr_filter.since(Timestamp::from(since));
    }
    if let Some(limit) = filter.limit {
        nostr_filter = nostr_filter.limit(limit);
    }
    ClientMessage::req(subscription_id.clone(), nostr_filter).as_json()
}

pub(crate) fn event_frame(record: &Record) -> Result<String, RelayError> {
    let event: Event = serde_json::to_value(record)
        .and_then(serde_json::from_value)
        .map_err(|e| RelayError::Protocol(e.to_string()))?;
    Ok(ClientMessage::event(event).as_json())
}

/// Verified relay event as a record
fn to_record(event: &Event) -> Result<Record, RelayError> {
    event
        .verify()
        .map_err(|e| RelayError::Protocol(e.to_string()))?;
    serde_json::to_value(event)
        .and_then(serde_json::from_value)
        .map_err(|e| RelayError::Protocol(e.to_string()))
}
