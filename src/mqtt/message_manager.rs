use super::config::{DeviceTopics, TopicKind};
use crate::media::{BatchError, MediaBatch};
use crate::pairing::{PairClaim, PairingError};
use chrono::NaiveDateTime;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid pairing message: {0}")]
    Pair(#[from] PairingError),

    #[error("invalid media batch: {0}")]
    Batch(#[from] BatchError),

    #[error("invalid image index '{0}'")]
    Index(String),

    #[error("payload is not valid UTF-8")]
    Encoding,
}

#[derive(Clone, PartialEq, Eq)]
pub struct MqttMessage {
    topic: String,
    content: String,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(40).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl fmt::Debug for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl MqttMessage {
    pub fn from_topic(topic: String, content: String) -> Self {
        MqttMessage {
            topic,
            content,
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn from_publish(topic: &str, payload: &[u8]) -> Result<Self, TransportError> {
        let content = std::str::from_utf8(payload).map_err(|_| TransportError::Encoding)?;
        Ok(Self::from_topic(topic.to_string(), content.to_string()))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Inbound traffic translated into receiver events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    PairClaim(PairClaim),
    MediaBatch(MediaBatch),
    ShowIndex(i64),
}

/// Maps a message on one of the device topics to an [`Inbound`] event.
///
/// Returns `Ok(None)` for topics that carry nothing for the receiver, such as its own
/// pairing acknowledgements echoed back by the broker.
pub fn dispatch(topics: &DeviceTopics, msg: &MqttMessage) -> Result<Option<Inbound>, TransportError> {
    let Some(kind) = topics.classify(msg.topic()) else {
        debug!("Ignoring message on unknown topic {}", msg.topic());
        return Ok(None);
    };

    match kind {
        TopicKind::Pair => Ok(Some(Inbound::PairClaim(PairClaim::parse(msg.content())?))),
        TopicKind::Images => Ok(Some(Inbound::MediaBatch(MediaBatch::parse(msg.content())?))),
        TopicKind::Image => {
            let raw = msg.content().trim();
            raw.parse::<i64>()
                .map(|index| Some(Inbound::ShowIndex(index)))
                .map_err(|_| TransportError::Index(raw.to_string()))
        }
        TopicKind::PairResponse => {
            debug!("Ignoring own pairing acknowledgement");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> DeviceTopics {
        DeviceTopics::for_serial("tv", "TV_1")
    }

    fn msg(topic: &str, content: &str) -> MqttMessage {
        MqttMessage::from_topic(topic.to_string(), content.to_string())
    }

    #[test]
    fn pair_topic_yields_claim() {
        let event = dispatch(
            &topics(),
            &msg("tv/TV_1/pair", r#"{"action":"pair","pairingCode":"ABC123"}"#),
        )
        .unwrap();

        match event {
            Some(Inbound::PairClaim(claim)) => assert_eq!(claim.pairing_code, "ABC123"),
            other => panic!("expected claim, got {:?}", other),
        }
    }

    #[test]
    fn image_topic_parses_plain_index() {
        let event = dispatch(&topics(), &msg("tv/TV_1/image", " 2\n")).unwrap();
        assert_eq!(event, Some(Inbound::ShowIndex(2)));

        assert!(matches!(
            dispatch(&topics(), &msg("tv/TV_1/image", "two")),
            Err(TransportError::Index(raw)) if raw == "two"
        ));
    }

    #[test]
    fn malformed_batch_is_an_error() {
        assert!(matches!(
            dispatch(&topics(), &msg("tv/TV_1/images", "{oops")),
            Err(TransportError::Batch(BatchError::Json(_)))
        ));
    }

    #[test]
    fn own_acks_and_foreign_topics_are_ignored() {
        assert_eq!(
            dispatch(&topics(), &msg("tv/TV_1/pair_response", "{}")).unwrap(),
            None
        );
        assert_eq!(dispatch(&topics(), &msg("tv/TV_2/pair", "{}")).unwrap(), None);
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        assert!(matches!(
            MqttMessage::from_publish("tv/TV_1/image", &[0xff, 0xfe]),
            Err(TransportError::Encoding)
        ));
    }
}
