//! Topic codec.
//!
//! A message on the wire is `<topic> '|' <payload>`. The topic is everything
//! before the *first* separator; the payload is the rest and may contain more
//! separators. Topics are therefore checked when encoding, never when
//! decoding.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::error::{Error, Result};

/// Byte that separates the topic from the payload.
pub const SEPARATOR: u8 = b'|';

/// A decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
}

impl Message {
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.topic, self.payload_lossy())
    }
}

/// Checks that `topic` can be framed: non-empty and free of the separator.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(Error::InvalidTopic {
            topic: topic.to_string(),
            reason: "topic is empty",
        });
    }
    if topic.as_bytes().contains(&SEPARATOR) {
        return Err(Error::InvalidTopic {
            topic: topic.to_string(),
            reason: "topic contains the '|' separator",
        });
    }
    Ok(())
}

/// Encodes `topic|payload`.
pub fn encode(topic: &str, payload: impl AsRef<[u8]>) -> Result<Bytes> {
    validate_topic(topic)?;
    let payload = payload.as_ref();
    let mut buf = BytesMut::with_capacity(topic.len() + 1 + payload.len());
    buf.put_slice(topic.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Returns the topic of an encoded message without copying the payload.
pub fn decode_topic(bytes: &[u8]) -> Result<&str> {
    let split = bytes
        .iter()
        .position(|b| *b == SEPARATOR)
        .ok_or(Error::MalformedMessage("no '|' separator"))?;
    std::str::from_utf8(&bytes[..split]).map_err(|_| Error::MalformedMessage("topic is not UTF-8"))
}

/// Splits an encoded message at the first separator.
pub fn decode(bytes: &Bytes) -> Result<Message> {
    let topic = decode_topic(bytes)?.to_string();
    let payload = bytes.slice(topic.len() + 1..);
    Ok(Message { topic, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_joins_topic_and_payload() {
        let encoded = encode("Weather", "Message for Weather").unwrap();
        assert_eq!(&encoded[..], b"Weather|Message for Weather");
    }

    #[test]
    fn decode_splits_at_first_separator_only() {
        let msg = decode(&Bytes::from_static(b"Finance|a|b||c")).unwrap();
        assert_eq!(msg.topic, "Finance");
        assert_eq!(&msg.payload[..], b"a|b||c");
    }

    #[test]
    fn round_trip_keeps_separators_in_payload() {
        for (topic, payload) in [("A", ""), ("Technology", "x|y"), ("t", "|")] {
            let msg = decode(&encode(topic, payload).unwrap()).unwrap();
            assert_eq!(msg.topic, topic);
            assert_eq!(&msg.payload[..], payload.as_bytes());
        }
    }

    #[test]
    fn encode_rejects_separator_in_topic() {
        let err = encode("a|b", "payload").unwrap_err();
        assert!(matches!(err, Error::InvalidTopic { ref topic, .. } if topic == "a|b"));
    }

    #[test]
    fn encode_rejects_empty_topic() {
        assert!(matches!(encode("", "x"), Err(Error::InvalidTopic { .. })));
    }

    #[test]
    fn decode_without_separator_is_malformed() {
        let err = decode(&Bytes::from_static(b"no separator here")).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
    }

    #[test]
    fn empty_topic_decodes_as_empty_string() {
        let msg = decode(&Bytes::from_static(b"|payload")).unwrap();
        assert_eq!(msg.topic, "");
    }

    #[test]
    fn display_is_human_readable() {
        let msg = decode(&encode("A", "Message for A").unwrap()).unwrap();
        assert_eq!(msg.to_string(), "A|Message for A");
    }
}
