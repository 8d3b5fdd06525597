//! Message definitions
//!
//! Messages are the only thing that crosses a worker boundary. Propose and
//! Dismiss carry replicated facts; every other kind is control traffic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, ContentHash, HiveError, HiveResult, PeerId, Validity};

/// Path of a node in the bucket tree, e.g. `peer/<id>/addresses`.
/// Segments are literal; wildcards only exist in request patterns.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketPath(Vec<String>);

impl BucketPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BucketPath(segments.into_iter().map(Into::into).collect())
    }

    /// Parse `a/b/c`
    pub fn parse(s: &str) -> HiveResult<Self> {
        let segments: Vec<String> = s.split('/').map(str::to_string).collect();
        let path = BucketPath(segments);
        path.validate()?;
        Ok(path)
    }

    /// Non-empty, and no segment is empty or contains `/`
    pub fn validate(&self) -> HiveResult<()> {
        if self.0.is_empty() {
            return Err(HiveError::ProcessFailure("empty bucket path".into()));
        }
        if let Some(bad) = self.0.iter().find(|s| s.is_empty() || s.contains('/')) {
            return Err(HiveError::ProcessFailure(format!(
                "invalid bucket segment {bad:?} in {self}"
            )));
        }
        Ok(())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn child(&self, segment: impl Into<String>) -> BucketPath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        BucketPath(segments)
    }

    /// Glob match: `*` is one segment, `**` is any number of segments
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        let pattern: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        glob(&pattern, &self.0)
    }
}

fn glob(pattern: &[&str], path: &[String]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|i| glob(rest, &path[i..])),
        Some((segment, rest)) => match path.split_first() {
            Some((head, tail)) => (*segment == "*" || *segment == head) && glob(rest, tail),
            None => false,
        },
    }
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl fmt::Debug for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bucket({self})")
    }
}

/// Message kind, for logging and dispatch tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    Pong,
    Request,
    Command,
    Propose,
    Dismiss,
    Signature,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Request => "request",
            MessageKind::Command => "command",
            MessageKind::Propose => "propose",
            MessageKind::Dismiss => "dismiss",
            MessageKind::Signature => "signature",
        };
        f.write_str(name)
    }
}

/// A swarm message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Ping,
    Pong,
    /// Ask for every live entry whose bucket path matches one of the globs
    Request { patterns: Vec<String> },
    Command {
        name: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
    /// Assert a fact for a validity window
    Propose {
        bucket: BucketPath,
        value: String,
        validity: Validity,
    },
    /// Retract a fact for a validity window
    Dismiss {
        bucket: BucketPath,
        value: String,
        validity: Validity,
    },
    /// Detached signature over the content hash of another message
    Signature {
        content_hash: ContentHash,
        signer: PeerId,
        public_key: String,
        signature: String,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping => MessageKind::Ping,
            Message::Pong => MessageKind::Pong,
            Message::Request { .. } => MessageKind::Request,
            Message::Command { .. } => MessageKind::Command,
            Message::Propose { .. } => MessageKind::Propose,
            Message::Dismiss { .. } => MessageKind::Dismiss,
            Message::Signature { .. } => MessageKind::Signature,
        }
    }

    pub fn propose(bucket: BucketPath, value: impl Into<String>, validity: Validity) -> Self {
        Message::Propose {
            bucket,
            value: value.into(),
            validity,
        }
    }

    pub fn dismiss(bucket: BucketPath, value: impl Into<String>, validity: Validity) -> Self {
        Message::Dismiss {
            bucket,
            value: value.into(),
            validity,
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Message::Command {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Message::Command { params, .. } = &mut self {
            params.insert(key.into(), value.into());
        }
        self
    }

    /// Propose and Dismiss carry replicated facts
    pub fn is_fact(&self) -> bool {
        matches!(self, Message::Propose { .. } | Message::Dismiss { .. })
    }

    /// `(bucket, value, validity)` of a Propose or Dismiss
    pub fn fact(&self) -> Option<(&BucketPath, &str, &Validity)> {
        match self {
            Message::Propose {
                bucket,
                value,
                validity,
            }
            | Message::Dismiss {
                bucket,
                value,
                validity,
            } => Some((bucket, value.as_str(), validity)),
            _ => None,
        }
    }
}

/// Routing envelope
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: Address,
    pub to: Address,
    pub contents: Message,
    pub comment: Option<String>,
}

impl Envelope {
    pub fn new(from: Address, to: Address, contents: Message) -> Self {
        Envelope {
            from,
            to,
            contents,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// A reply travels back to whoever sent this envelope
    pub fn reply(&self, from: Address, contents: Message) -> Envelope {
        Envelope::new(from, self.from.clone(), contents)
    }
}
