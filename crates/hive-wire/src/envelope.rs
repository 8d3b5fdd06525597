//! JSON wire envelope used by the broadcast transports
//!
//! `{"maddr_from": "...", "maddr_to": "...", "contents": "<message line>"}`

use serde::{Deserialize, Serialize};

use hive_core::{Address, Envelope, HiveError, HiveResult};

use crate::{interpret_message, serialize_message};

/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Envelope as it appears on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub maddr_from: String,
    pub maddr_to: String,
    pub contents: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl WireEnvelope {
    pub fn from_envelope(envelope: &Envelope) -> HiveResult<Self> {
        Ok(WireEnvelope {
            maddr_from: envelope.from.to_string(),
            maddr_to: envelope.to.to_string(),
            contents: serialize_message(&envelope.contents)?,
            comment: envelope.comment.clone(),
        })
    }

    /// Any malformed part is reported as `CouldNotReadEnvelope`
    pub fn into_envelope(self) -> HiveResult<Envelope> {
        let from = Address::parse(&self.maddr_from)
            .map_err(|e| HiveError::CouldNotReadEnvelope(format!("maddr_from: {e}")))?;
        let to = Address::parse(&self.maddr_to)
            .map_err(|e| HiveError::CouldNotReadEnvelope(format!("maddr_to: {e}")))?;
        let contents = interpret_message(&self.contents)
            .map_err(|e| HiveError::CouldNotReadEnvelope(e.to_string()))?;
        Ok(Envelope {
            from,
            to,
            contents,
            comment: self.comment,
        })
    }
}

/// Encode an envelope as one JSON document (no trailing newline)
pub fn encode_envelope(envelope: &Envelope) -> HiveResult<Vec<u8>> {
    let wire = WireEnvelope::from_envelope(envelope)?;
    serde_json::to_vec(&wire).map_err(|e| HiveError::CouldNotReadEnvelope(e.to_string()))
}

/// Encode an envelope for a datagram, refusing oversize payloads
pub fn encode_datagram(envelope: &Envelope) -> HiveResult<Vec<u8>> {
    let bytes = encode_envelope(envelope)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(HiveError::TransportError(format!(
            "envelope too large: {} > {}",
            bytes.len(),
            MAX_DATAGRAM_SIZE
        )));
    }
    Ok(bytes)
}

/// Decode one JSON envelope
pub fn decode_envelope(bytes: &[u8]) -> HiveResult<Envelope> {
    let wire: WireEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| HiveError::CouldNotReadEnvelope(e.to_string()))?;
    wire.into_envelope()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::Message;

    fn ping() -> Envelope {
        Envelope::new(
            Address::parse("/swarm/abc/brain").unwrap(),
            Address::any_brain(),
            Message::Ping,
        )
    }

    #[test]
    fn test_envelope_json_shape() {
        let bytes = encode_envelope(&ping()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["maddr_from"], "/swarm/abc/brain");
        assert_eq!(value["maddr_to"], "/swarm/*/brain");
        assert!(value["contents"].as_str().unwrap().contains("\"kind\":\"ping\""));
        assert!(value.get("comment").is_none());
    }

    #[test]
    fn test_envelope_roundtrip_with_comment() {
        let env = ping().with_comment("bootstrap");
        let decoded = decode_envelope(&encode_datagram(&env).unwrap()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_malformed_datagrams() {
        assert!(matches!(
            decode_envelope(b"\x00\x01garbage"),
            Err(HiveError::CouldNotReadEnvelope(_))
        ));
        let bad_contents = br#"{"maddr_from":"/a","maddr_to":"/b","contents":"nope"}"#;
        assert!(matches!(
            decode_envelope(bad_contents),
            Err(HiveError::CouldNotReadEnvelope(_))
        ));
        let bad_address = br#"{"maddr_from":"a","maddr_to":"/b","contents":"{}"}"#;
        assert!(matches!(
            decode_envelope(bad_address),
            Err(HiveError::CouldNotReadEnvelope(_))
        ));
    }
}
