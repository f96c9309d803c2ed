//! User-facing flows: retrieve, send, listen and chat
//!
//! Each flow derives the conversation from the ID, then runs one or more
//! coordinator operations and decrypts what comes back.

use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

use crate::config::Config;
use crate::crypto::{open_text, seal_text, Conversation, ConversationKey, EnvelopeError};
use crate::relay::{
    CoordinatorError, Identity, IdentityError, ListenHandle, NostrRelayClient, PublishReport,
    Record, RecordDraft, RelayClient, RelayCoordinator, SeenSet,
};
use crate::status::StatusTracker;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no messages found for this id")]
    NotFound,
    #[error("no message received")]
    NoMessage,
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

impl From<CoordinatorError> for SessionError {
    fn from(error: CoordinatorError) -> Self {
        match error {
            CoordinatorError::NoMessage => SessionError::NoMessage,
        }
    }
}

/// Runs the message flows over a fixed relay set and secret
#[derive(Debug, Clone)]
pub struct Messenger<C: RelayClient> {
    coordinator: RelayCoordinator<C>,
    secret: String,
    history_limit: usize,
}

impl Messenger<NostrRelayClient> {
    /// Messenger over real relays, as configured
    pub fn from_config(config: &Config) -> Self {
        let client = NostrRelayClient::new(config.timing.connect_timeout());
        let coordinator =
            RelayCoordinator::new(client, config.relays.clone(), config.timing.timing());
        Self::new(coordinator, &config.user_secret, config.history_limit)
    }
}

impl<C: RelayClient> Messenger<C> {
    pub fn new(coordinator: RelayCoordinator<C>, secret: &str, history_limit: usize) -> Self {
        Self {
            coordinator,
            secret: secret.to_string(),
            history_limit,
        }
    }

    pub fn coordinator(&self) -> &RelayCoordinator<C> {
        &self.coordinator
    }

    pub fn conversation(&self, id: &str) -> Conversation {
        Conversation::new(id, &self.secret)
    }

    /// Decrypted plaintext of the newest stored message for `id`
    pub async fn retrieve(&self, id: &str, tracker: &StatusTracker) -> Result<String, SessionError> {
        let conversation = self.conversation(id);
        let records = self
            .coordinator
            .fetch(conversation.topic(), self.history_limit, tracker)
            .await;
        let newest = records.last().ok_or(SessionError::NotFound)?;
        Ok(open_text(&newest.content, conversation.key())?)
    }

    /// Encrypt `message` and publish it under a fresh identity
    ///
    /// Succeeds even if no relay took the record; check the report.
    pub async fn send(
        &self,
        id: &str,
        message: &str,
        tracker: &StatusTracker,
    ) -> Result<PublishReport, SessionError> {
        let conversation = self.conversation(id);
        let record = seal_record(&Identity::generate(), &conversation, message)?;
        Ok(self.coordinator.publish(&record, tracker).await)
    }

    /// Wait for the next message sent to `id`
    ///
    /// `None` waits forever.
    pub async fn listen(
        &self,
        id: &str,
        timeout: Option<Duration>,
        tracker: &StatusTracker,
    ) -> Result<String, SessionError> {
        let conversation = self.conversation(id);
        let key = conversation.key().clone();
        let message = self
            .coordinator
            .listen_once(
                conversation.topic(),
                timeout,
                None,
                move |record| open_text(&record.content, &key).ok(),
                tracker,
            )
            .await?;
        Ok(message)
    }

    /// Join the conversation `id` as `username`
    ///
    /// Reads the backlog once, then follows new messages until the session
    /// is closed or dropped.
    pub async fn chat(&self, id: &str, username: &str) -> ChatSession<C> {
        let conversation = self.conversation(id);
        let identity = Identity::generate();
        let seen = SeenSet::new();

        let history = self
            .coordinator
            .fetch(conversation.topic(), self.history_limit, &StatusTracker::disabled())
            .await;
        let backlog = history
            .iter()
            .filter(|record| seen.insert(&record.id))
            .filter_map(|record| decrypt(record, conversation.key()))
            .collect();

        let (tx, incoming) = flume::unbounded();
        let key = conversation.key().clone();
        let listener = self.coordinator.listen_continuous(
            conversation.topic(),
            seen.clone(),
            Some(identity.public_key()),
            move |record| {
                if let Some(message) = decrypt(&record, &key) {
                    let _ = tx.send(message);
                }
            },
        );

        ChatSession {
            coordinator: self.coordinator.clone(),
            conversation,
            identity,
            username: username.to_string(),
            seen,
            backlog,
            incoming,
            listener,
        }
    }
}

/// A live chat in one conversation
///
/// Holds an ephemeral identity for the whole session. Incoming messages
/// never include this session's own sends.
#[derive(Debug)]
pub struct ChatSession<C: RelayClient> {
    coordinator: RelayCoordinator<C>,
    conversation: Conversation,
    identity: Identity,
    username: String,
    seen: SeenSet,
    backlog: Vec<String>,
    incoming: flume::Receiver<String>,
    listener: ListenHandle,
}

impl<C: RelayClient> ChatSession<C> {
    /// Stored messages at join time, oldest first
    pub fn backlog(&self) -> &[String] {
        &self.backlog
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Next message from another participant. `None` once the listener
    /// has stopped.
    pub async fn next_message(&self) -> Option<String> {
        self.incoming.recv_async().await.ok()
    }

    /// Format, encrypt and publish one line, returning the formatted line
    pub async fn send_line(
        &self,
        text: &str,
        tracker: &StatusTracker,
    ) -> Result<(String, PublishReport), SessionError> {
        let line = format_line(&Local::now(), &self.username, text);
        let record = seal_record(&self.identity, &self.conversation, &line)?;
        // relays echo our own record back
        self.seen.insert(&record.id);
        let report = self.coordinator.publish(&record, tracker).await;
        Ok((line, report))
    }

    /// Stop listening and wait for every relay worker to finish
    pub async fn close(self) {
        self.listener.stop().await;
    }
}

/// `[HH:MM] username: text`
pub fn format_line<Tz>(at: &DateTime<Tz>, username: &str, text: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("[{}] {}: {}", at.format("%H:%M"), username, text)
}

fn seal_record(
    identity: &Identity,
    conversation: &Conversation,
    message: &str,
) -> Result<Record, SessionError> {
    let draft = RecordDraft {
        topic: conversation.topic().clone(),
        content: seal_text(message, conversation.key())?,
    };
    Ok(identity.sign(draft)?)
}

fn decrypt(record: &Record, key: &ConversationKey) -> Option<String> {
    match open_text(&record.content, key) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!("skipping record {}: {}", record.id, e);
            None
        }
    }
}
