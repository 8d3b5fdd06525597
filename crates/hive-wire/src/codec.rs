//! Message codec
//!
//! A message is one line of JSON: `{"kind":..., ..., "v":1}`. Object keys
//! are emitted in sorted order, so the same message always produces the same
//! bytes and therefore the same content hash on every node.

use serde_json::Value;

use hive_core::{HiveError, HiveResult, Message};

/// Current encoding version
pub const WIRE_VERSION: u64 = 1;

/// Version field name
const VERSION_KEY: &str = "v";

/// Serialize a message into its canonical single-line form
pub fn serialize_message(message: &Message) -> HiveResult<String> {
    let mut value = serde_json::to_value(message)
        .map_err(|e| HiveError::CouldNotInterpret(format!("serialize: {e}")))?;
    let Some(object) = value.as_object_mut() else {
        return Err(HiveError::CouldNotInterpret(
            "message did not serialize to an object".into(),
        ));
    };
    object.insert(VERSION_KEY.to_string(), Value::from(WIRE_VERSION));
    serde_json::to_string(&value).map_err(|e| HiveError::CouldNotInterpret(format!("serialize: {e}")))
}

/// Parse a serialized message
pub fn interpret_message(raw: &str) -> HiveResult<Message> {
    let mut value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| HiveError::CouldNotInterpret(format!("{e}: {}", truncate(raw))))?;

    let Some(object) = value.as_object_mut() else {
        return Err(HiveError::CouldNotInterpret(format!(
            "not an object: {}",
            truncate(raw)
        )));
    };

    match object.remove(VERSION_KEY).and_then(|v| v.as_u64()) {
        Some(WIRE_VERSION) => {}
        Some(other) => {
            return Err(HiveError::CouldNotInterpret(format!(
                "unsupported version {other}"
            )))
        }
        None => {
            return Err(HiveError::CouldNotInterpret(format!(
                "missing version: {}",
                truncate(raw)
            )))
        }
    }

    serde_json::from_value(value)
        .map_err(|e| HiveError::CouldNotInterpret(format!("{e}: {}", truncate(raw))))
}

/// Serialize messages one per line
pub fn serialize_lines<'a, I>(messages: I) -> HiveResult<String>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut out = String::new();
    for message in messages {
        out.push_str(&serialize_message(message)?);
        out.push('\n');
    }
    Ok(out)
}

/// Parse newline-delimited messages, skipping blank lines.
/// Each line is interpreted independently so one bad line does not
/// poison the rest.
pub fn interpret_lines(text: &str) -> Vec<HiveResult<Message>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(interpret_message)
        .collect()
}

fn truncate(raw: &str) -> &str {
    match raw.char_indices().nth(80) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{BucketPath, ContentHash, PeerId, Timestamp, Validity};
    use proptest::prelude::*;

    fn sample_propose() -> Message {
        Message::propose(
            BucketPath::parse("peer/abc/addresses").unwrap(),
            "udp://10.0.0.1:4880",
            Validity::new(Timestamp(1_000), Some(Timestamp(2_000))),
        )
    }

    #[test]
    fn test_serialize_is_single_line_and_versioned() {
        let line = serialize_message(&sample_propose()).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"v\":1"));
        assert!(line.contains("\"kind\":\"propose\""));
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let a = serialize_message(&Message::command("share").with_param("z", "1").with_param("a", "2"))
            .unwrap();
        let b = serialize_message(&Message::command("share").with_param("a", "2").with_param("z", "1"))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_roundtrip_control_messages() {
        for msg in [
            Message::Ping,
            Message::Pong,
            Message::Request {
                patterns: vec!["files".into(), "peer/**".into()],
            },
            Message::command("quit"),
            Message::Signature {
                content_hash: ContentHash::new("abc"),
                signer: PeerId::from_bytes([7; 32]),
                public_key: "00".repeat(32),
                signature: "11".repeat(64),
            },
        ] {
            let line = serialize_message(&msg).unwrap();
            assert_eq!(interpret_message(&line).unwrap(), msg);
        }
    }

    #[test]
    fn test_interpret_rejects_malformed() {
        assert!(matches!(
            interpret_message("not json"),
            Err(HiveError::CouldNotInterpret(_))
        ));
        assert!(matches!(
            interpret_message("[1,2,3]"),
            Err(HiveError::CouldNotInterpret(_))
        ));
        assert!(matches!(
            interpret_message(r#"{"kind":"ping"}"#),
            Err(HiveError::CouldNotInterpret(_))
        ));
        assert!(matches!(
            interpret_message(r#"{"kind":"ping","v":2}"#),
            Err(HiveError::CouldNotInterpret(_))
        ));
        assert!(matches!(
            interpret_message(r#"{"kind":"teleport","v":1}"#),
            Err(HiveError::CouldNotInterpret(_))
        ));
    }

    #[test]
    fn test_unknown_bucket_is_not_an_error() {
        let raw = r#"{"bucket":["never","seen"],"kind":"propose","v":1,"validity":{"end":null,"start":0},"value":"x"}"#;
        let msg = interpret_message(raw).unwrap();
        assert_eq!(msg.fact().unwrap().0.to_string(), "never/seen");
    }

    #[test]
    fn test_lines_skip_blank_and_isolate_errors() {
        let text = format!(
            "{}\n\ngarbage\n{}\n",
            serialize_message(&Message::Ping).unwrap(),
            serialize_message(&sample_propose()).unwrap()
        );
        let parsed = interpret_lines(&text);
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        assert!(parsed[1].is_err());
        assert_eq!(parsed[2].as_ref().unwrap(), &sample_propose());
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    fn validity() -> impl Strategy<Value = Validity> {
        (0i64..1 << 40, proptest::option::of(0i64..1 << 40))
            .prop_map(|(start, end)| Validity::new(Timestamp(start), end.map(Timestamp)))
    }

    fn fact() -> impl Strategy<Value = Message> {
        (
            proptest::collection::vec(segment(), 1..4),
            ".{0,24}",
            validity(),
            any::<bool>(),
        )
            .prop_map(|(path, value, validity, propose)| {
                let bucket = BucketPath::new(path);
                if propose {
                    Message::propose(bucket, value, validity)
                } else {
                    Message::dismiss(bucket, value, validity)
                }
            })
    }

    proptest! {
        #[test]
        fn prop_fact_roundtrip(msg in fact()) {
            let line = serialize_message(&msg).unwrap();
            prop_assert!(!line.contains('\n'));
            prop_assert_eq!(interpret_message(&line).unwrap(), msg);
        }
    }
}
