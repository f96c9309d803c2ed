use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::crypto::TopicTag;

/// NIP-01 kind for short text notes, the only kind Pulse reads or writes
pub const TEXT_NOTE_KIND: u16 = 1;

/// Tag name carrying the conversation topic
pub const TOPIC_TAG_NAME: &str = "t";

/// Network address of a single relay
///
/// Must be a `ws://` or `wss://` URL. The address is kept exactly as
/// configured so telemetry shows what the operator wrote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelayEndpoint {
    raw: String,
    url: Url,
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid relay url '{0}': {1}")]
    Invalid(String, url::ParseError),
    #[error("unsupported relay scheme '{0}', expected ws or wss")]
    Scheme(String),
}

impl RelayEndpoint {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl FromStr for RelayEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let url = Url::parse(s).map_err(|e| EndpointError::Invalid(s.to_string(), e))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self {
                raw: s.to_string(),
                url,
            }),
            other => Err(EndpointError::Scheme(other.to_string())),
        }
    }
}

impl TryFrom<String> for RelayEndpoint {
    type Error = EndpointError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelayEndpoint> for String {
    fn from(endpoint: RelayEndpoint) -> Self {
        endpoint.raw
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A signed record as carried by relays
///
/// Field layout follows NIP-01 so records serialize straight onto the wire.
/// The coordinator never mutates records, it only filters, sorts and hands
/// them on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Record {
    /// The first `t` tag value, if any
    pub fn topic(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(TOPIC_TAG_NAME))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    pub fn is_authored_by(&self, pubkey: &str) -> bool {
        self.pubkey == pubkey
    }
}

/// Unsigned record contents, turned into a [`Record`] by an identity
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub topic: TopicTag,
    pub content: String,
}

/// Subscription filter scoped to one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub topic: TopicTag,
    pub kind: u16,
    /// Only records created at or after this unix timestamp
    pub since: Option<u64>,
    /// Cap on stored records returned. Bounded queries end once the
    /// relay has sent everything it has stored.
    pub limit: Option<usize>,
}

impl RecordFilter {
    /// Query stored history, newest `limit` records
    pub fn history(topic: TopicTag, limit: usize) -> Self {
        Self {
            topic,
            kind: TEXT_NOTE_KIND,
            since: None,
            limit: Some(limit),
        }
    }

    /// Follow new records created at or after `since`
    pub fn live(topic: TopicTag, since: u64) -> Self {
        Self {
            topic,
            kind: TEXT_NOTE_KIND,
            since: Some(since),
            limit: None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.limit.is_some()
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.kind == self.kind
            && record.topic() == Some(self.topic.as_str())
            && self.since.map_or(true, |since| record.created_at >= since)
    }
}

/// Seconds since the unix epoch, the timestamp unit records carry
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Conversation;

    fn record(topic: &str, created_at: u64) -> Record {
        Record {
            id: "id".to_string(),
            pubkey: "pk".to_string(),
            created_at,
            kind: TEXT_NOTE_KIND,
            tags: vec![vec!["t".to_string(), topic.to_string()]],
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn test_endpoint_parsing() {
        let endpoint: RelayEndpoint = " wss://relay.damus.io ".parse().unwrap();
        assert_eq!(endpoint.as_str(), "wss://relay.damus.io");
        assert_eq!(endpoint.url().host_str(), Some("relay.damus.io"));

        assert!("ws://localhost:7777".parse::<RelayEndpoint>().is_ok());
        assert!(matches!(
            "https://relay.damus.io".parse::<RelayEndpoint>(),
            Err(EndpointError::Scheme(_))
        ));
        assert!(matches!(
            "not a url".parse::<RelayEndpoint>(),
            Err(EndpointError::Invalid(_, _))
        ));
    }

    #[test]
    fn test_endpoint_serde_as_string() {
        let endpoint: RelayEndpoint = "wss://nos.lol".parse().unwrap();
        let json = serde_json::to_string(&endpoint).unwrap();
        assert_eq!(json, "\"wss://nos.lol\"");
        let back: RelayEndpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, endpoint);
        assert!(serde_json::from_str::<RelayEndpoint>("\"ftp://x\"").is_err());
    }

    #[test]
    fn test_record_topic() {
        let mut r = record("abc", 0);
        assert_eq!(r.topic(), Some("abc"));
        r.tags.insert(0, vec!["p".to_string(), "someone".to_string()]);
        assert_eq!(r.topic(), Some("abc"));
        r.tags.clear();
        assert_eq!(r.topic(), None);
    }

    #[test]
    fn test_filter_matching() {
        let conversation = Conversation::new("id1", "salt");
        let topic = conversation.topic().clone();

        let live = RecordFilter::live(topic.clone(), 100);
        assert!(live.matches(&record(topic.as_str(), 100)));
        assert!(!live.matches(&record(topic.as_str(), 99)));
        assert!(!live.matches(&record("other", 150)));
        assert!(!live.is_bounded());

        let history = RecordFilter::history(topic.clone(), 5);
        assert!(history.matches(&record(topic.as_str(), 1)));
        assert!(history.is_bounded());

        let mut wrong_kind = record(topic.as_str(), 1);
        wrong_kind.kind = 7;
        assert!(!history.matches(&wrong_kind));
    }
}
