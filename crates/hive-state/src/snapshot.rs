//! Append-only snapshot of applied facts
//!
//! One wire-encoded message per line. A fact's signature line precedes it,
//! so replaying the file through `BucketStore::process` rebuilds the same
//! store, signers included.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use hive_core::{HiveResult, Message};
use hive_wire::{interpret_lines, serialize_message};

use crate::BucketStore;

pub const SNAPSHOT_FILE: &str = "buckets.log";

/// Replay statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub ignored: usize,
    pub malformed: usize,
}

pub struct Snapshot {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl Snapshot {
    /// Open (creating if needed) `<dir>/buckets.log` for appending
    pub fn open(dir: &Path) -> HiveResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);
        let writer = Some(Self::append_writer(&path)?);
        Ok(Snapshot { path, writer })
    }

    fn append_writer(path: &Path) -> HiveResult<BufWriter<File>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every decodable message in the file, in order
    pub fn read_all(&self) -> HiveResult<(Vec<Message>, usize)> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let mut messages = Vec::new();
        let mut malformed = 0;
        for result in interpret_lines(&text) {
            match result {
                Ok(message) => messages.push(message),
                Err(e) => {
                    malformed += 1;
                    tracing::warn!(path = %self.path.display(), error = %e, "skipping snapshot line");
                }
            }
        }
        Ok((messages, malformed))
    }

    /// Feed the file through the store
    pub fn replay(&self, store: &mut BucketStore) -> HiveResult<ReplayStats> {
        let (messages, malformed) = self.read_all()?;
        let mut stats = ReplayStats {
            malformed,
            ..ReplayStats::default()
        };
        for message in &messages {
            match store.process(message) {
                Ok(true) => stats.applied += 1,
                Ok(false) => stats.ignored += 1,
                Err(e) => {
                    stats.malformed += 1;
                    tracing::debug!(error = %e, "snapshot message rejected");
                }
            }
        }
        tracing::info!(
            path = %self.path.display(),
            applied = stats.applied,
            ignored = stats.ignored,
            malformed = stats.malformed,
            "snapshot replayed"
        );
        Ok(stats)
    }

    pub fn append(&mut self, message: &Message) -> HiveResult<()> {
        let line = serialize_message(message)?;
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> HiveResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Rewrite the file to hold exactly `messages`
    pub fn compact(&mut self, messages: &[Message]) -> HiveResult<()> {
        self.flush()?;
        let tmp = self.path.with_extension("log.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for message in messages {
                out.write_all(serialize_message(message)?.as_bytes())?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        self.writer = None;
        fs::rename(&tmp, &self.path)?;
        self.writer = Some(Self::append_writer(&self.path)?);
        tracing::debug!(path = %self.path.display(), lines = messages.len(), "snapshot compacted");
        Ok(())
    }

    pub fn close(&mut self) -> HiveResult<()> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }
}
