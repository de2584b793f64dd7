//! # Messages
//!
//! Raw broker messages, the kind tag carried in their headers, and the
//! classifier that splits a batch by kind.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Header carrying the kind tag.
pub const MESSAGE_TYPE_HEADER: &str = "messageType";

/// Kind of payload carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Contest,
    Proposition,
    PropositionChanged,
    OptionChanged,
    VariantChanged,
    OutcomeChanged,
    Market,
    MarketPriceChanged,
    OutcomeResult,
}

impl MessageKind {
    /// Order in which kinds are applied inside one batch. Snapshots come
    /// first because they establish the base the changes merge into.
    pub const PROCESSING_ORDER: [MessageKind; 9] = [
        MessageKind::Contest,
        MessageKind::Proposition,
        MessageKind::Market,
        MessageKind::PropositionChanged,
        MessageKind::OptionChanged,
        MessageKind::VariantChanged,
        MessageKind::OutcomeChanged,
        MessageKind::OutcomeResult,
        MessageKind::MarketPriceChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Contest => "Contest",
            MessageKind::Proposition => "Proposition",
            MessageKind::PropositionChanged => "PropositionChanged",
            MessageKind::OptionChanged => "OptionChanged",
            MessageKind::VariantChanged => "VariantChanged",
            MessageKind::OutcomeChanged => "OutcomeChanged",
            MessageKind::Market => "Market",
            MessageKind::MarketPriceChanged => "MarketPriceChanged",
            MessageKind::OutcomeResult => "OutcomeResult",
        }
    }

    /// Whether the kind is a full snapshot rather than a delta.
    pub fn is_snapshot(self) -> bool {
        matches!(
            self,
            MessageKind::Contest | MessageKind::Proposition | MessageKind::Market
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag value that names no known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::PROCESSING_ORDER
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// One message as delivered by the broker. Immutable once delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Correlation key, the contest key for offer traffic.
    pub key: Option<String>,
    pub value: Vec<u8>,
    pub headers: HashMap<String, Vec<u8>>,
    pub partition: i32,
    pub offset: i64,
}

impl RawMessage {
    /// Build a message tagged with `kind`.
    pub fn tagged(
        kind: MessageKind,
        key: impl Into<String>,
        value: Vec<u8>,
        partition: i32,
        offset: i64,
    ) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            MESSAGE_TYPE_HEADER.to_string(),
            kind.as_str().as_bytes().to_vec(),
        );
        Self {
            key: Some(key.into()),
            value,
            headers,
            partition,
            offset,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|raw| std::str::from_utf8(raw).ok())
    }

    /// Raw kind tag, if the header is present and valid UTF-8.
    pub fn kind_tag(&self) -> Option<&str> {
        self.header(MESSAGE_TYPE_HEADER)
    }
}

/// Ordered messages from one partition, committed as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub topic: String,
    pub partition: i32,
    pub messages: Vec<RawMessage>,
}

impl Batch {
    pub fn new(topic: impl Into<String>, partition: i32, messages: Vec<RawMessage>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            messages,
        }
    }

    pub fn last_offset(&self) -> Option<i64> {
        self.messages.iter().map(|m| m.offset).max()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Messages of one batch split by kind, arrival order kept in each list.
#[derive(Debug, Default)]
pub struct Classified<'a> {
    by_kind: HashMap<MessageKind, Vec<&'a RawMessage>>,
    /// Messages without a usable kind tag; dropped.
    pub untagged: usize,
    /// Tag values naming no known kind, with the offset they came from.
    pub unrecognized: Vec<(String, i64)>,
}

impl<'a> Classified<'a> {
    pub fn of_kind(&self, kind: MessageKind) -> &[&'a RawMessage] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.of_kind(kind).len()
    }
}

/// Partition `messages` by their kind tag.
pub fn classify(messages: &[RawMessage]) -> Classified<'_> {
    let mut classified = Classified::default();
    for message in messages {
        let Some(tag) = message.kind_tag() else {
            warn!(
                offset = message.offset,
                key = message.key.as_deref().unwrap_or_default(),
                "dropping message without messageType header"
            );
            classified.untagged += 1;
            continue;
        };
        match tag.parse::<MessageKind>() {
            Ok(kind) => classified.by_kind.entry(kind).or_default().push(message),
            Err(UnknownKind(tag)) => classified.unrecognized.push((tag, message.offset)),
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageKind, offset: i64) -> RawMessage {
        RawMessage::tagged(kind, "c1", b"{}".to_vec(), 0, offset)
    }

    #[test]
    fn kind_round_trips_through_tag() {
        for kind in MessageKind::PROCESSING_ORDER {
            assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(kind));
        }
        assert_eq!(
            "Settlement".parse::<MessageKind>(),
            Err(UnknownKind("Settlement".to_string()))
        );
    }

    #[test]
    fn classify_keeps_arrival_order_per_kind() {
        let messages = vec![
            message(MessageKind::OptionChanged, 10),
            message(MessageKind::Contest, 11),
            message(MessageKind::OptionChanged, 12),
            message(MessageKind::OptionChanged, 13),
        ];
        let classified = classify(&messages);
        let offsets: Vec<i64> = classified
            .of_kind(MessageKind::OptionChanged)
            .iter()
            .map(|m| m.offset)
            .collect();
        assert_eq!(offsets, vec![10, 12, 13]);
        assert_eq!(classified.count(MessageKind::Contest), 1);
        assert_eq!(classified.count(MessageKind::Market), 0);
    }

    #[test]
    fn untagged_messages_are_dropped_not_fatal() {
        let mut bare = message(MessageKind::Contest, 1);
        bare.headers.clear();
        let mut garbled = message(MessageKind::Contest, 2);
        garbled
            .headers
            .insert(MESSAGE_TYPE_HEADER.to_string(), vec![0xff, 0xfe]);

        let messages = vec![bare, garbled, message(MessageKind::Contest, 3)];
        let classified = classify(&messages);
        assert_eq!(classified.untagged, 2);
        assert_eq!(classified.count(MessageKind::Contest), 1);
        assert!(classified.unrecognized.is_empty());
    }

    #[test]
    fn unknown_tags_are_reported() {
        let mut odd = message(MessageKind::Contest, 7);
        odd.headers
            .insert(MESSAGE_TYPE_HEADER.to_string(), b"RelatedContests".to_vec());
        let messages = vec![odd];
        let classified = classify(&messages);
        assert_eq!(
            classified.unrecognized,
            vec![("RelatedContests".to_string(), 7)]
        );
    }

    #[test]
    fn last_offset_is_highest_offset() {
        let batch = Batch::new(
            "offers",
            0,
            vec![message(MessageKind::Contest, 4), message(MessageKind::Contest, 9)],
        );
        assert_eq!(batch.last_offset(), Some(9));
        assert_eq!(Batch::new("offers", 0, vec![]).last_offset(), None);
    }
}
