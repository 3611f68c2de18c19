//! Append-only JSONL transcripts.
//!
//! Each session gets a `<session_id>.jsonl` file under the sessions
//! directory; every message is one JSON line. An in-memory write-through
//! cache avoids re-reading from disk every turn.
//!
//! Sequence numbers are assigned here, under the cache write lock, so
//! they are gapless and strictly increasing per session even when many
//! tasks append concurrently. A message is only visible (and its number
//! only consumed) after the disk write succeeds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use parlor_domain::chat::Role;
use parlor_domain::error::{Error, Result};
use parlor_domain::trace::TraceEvent;

/// A persisted transcript message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Strictly increasing from 1 within a session, no gaps, never reused.
    pub sequence: u64,
    pub token_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Rough token estimate used when the provider reports no usage.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

/// Append-only transcript store with a write-through cache.
pub struct TranscriptStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<MessageRecord>>>,
}

impl TranscriptStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let base_dir = state_path.join("sessions");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Append one message, assigning the next sequence number.
    pub fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        token_count: u32,
        metadata: Option<serde_json::Value>,
    ) -> Result<MessageRecord> {
        let mut cache = self.cache.write();
        let lines = match cache.entry(session_id.to_owned()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let loaded = read_jsonl_file(&self.path_for(session_id), session_id)?;
                e.insert(loaded)
            }
        };

        let record = MessageRecord {
            message_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            role,
            content: content.to_owned(),
            sequence: lines.len() as u64 + 1,
            token_count,
            metadata,
            created_at: Utc::now(),
        };

        // Disk first — the cache (and the sequence number) only advance
        // if the write succeeds.
        self.write_line(session_id, &record)?;
        lines.push(record.clone());

        TraceEvent::TranscriptAppend {
            session_id: session_id.to_owned(),
            role: role.as_str().to_owned(),
            sequence: record.sequence,
        }
        .emit();

        Ok(record)
    }

    /// Read the full transcript in sequence order.
    pub fn read(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        {
            let cache = self.cache.read();
            if let Some(lines) = cache.get(session_id) {
                return Ok(lines.clone());
            }
        }

        let lines = read_jsonl_file(&self.path_for(session_id), session_id)?;
        self.cache
            .write()
            .insert(session_id.to_owned(), lines.clone());
        Ok(lines)
    }

    /// Read a page of the transcript.
    pub fn read_page(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let all = self.read(session_id)?;
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    /// The most recent `window` messages, oldest first, for generation
    /// history. Truncation keeps the most recent messages.
    pub fn recent(&self, session_id: &str, window: usize) -> Result<Vec<MessageRecord>> {
        let all = self.read(session_id)?;
        let skip = all.len().saturating_sub(window);
        Ok(all.into_iter().skip(skip).collect())
    }

    pub fn count(&self, session_id: &str) -> Result<usize> {
        Ok(self.read(session_id)?.len())
    }

    /// Delete all messages for a session. Returns how many were removed.
    ///
    /// A subsequent append restarts numbering at 1. Sequence numbers
    /// identify positions within one transcript; wiping the transcript
    /// of a still-live session deliberately starts a fresh series
    /// rather than continuing the deleted one.
    pub fn clear(&self, session_id: &str) -> Result<usize> {
        let removed = {
            let mut cache = self.cache.write();
            match cache.remove(session_id) {
                Some(lines) => lines.len(),
                None => read_jsonl_file(&self.path_for(session_id), session_id)?.len(),
            }
        };

        let path = self.path_for(session_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(Error::Io)?;
        }

        TraceEvent::SessionCleared {
            session_id: session_id.to_owned(),
            messages_deleted: removed,
        }
        .emit();

        Ok(removed)
    }

    // ── Private helpers ───────────────────────────────────────────

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.jsonl"))
    }

    fn write_line(&self, session_id: &str, record: &MessageRecord) -> Result<()> {
        use std::io::Write;
        let mut buf = serde_json::to_string(record).map_err(Error::Json)?;
        buf.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(session_id))
            .map_err(Error::Io)?;
        file.write_all(buf.as_bytes()).map_err(Error::Io)
    }
}

fn read_jsonl_file(path: &Path, session_id: &str) -> Result<Vec<MessageRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut lines = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MessageRecord>(line) {
            Ok(rec) => lines.push(rec),
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    line = i + 1,
                    error = %e,
                    "skipping unparseable transcript line"
                );
            }
        }
    }
    Ok(lines)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (TranscriptStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn sequences_are_gapless_from_one() {
        let (store, _dir) = store();
        for i in 0..5 {
            let rec = store
                .append("s1", Role::User, &format!("msg {i}"), 0, None)
                .unwrap();
            assert_eq!(rec.sequence, i + 1);
        }

        let all = store.read("s1").unwrap();
        let seqs: Vec<u64> = all.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn round_trip_preserves_order_and_content() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TranscriptStore::new(dir.path()).unwrap();
            store.append("s1", Role::User, "hello", 2, None).unwrap();
            store
                .append("s1", Role::Assistant, "hi there", 3, None)
                .unwrap();
        }

        // Fresh store: forces the disk read path.
        let store = TranscriptStore::new(dir.path()).unwrap();
        let all = store.read("s1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "hello");
        assert_eq!(all[0].sequence, 1);
        assert_eq!(all[1].content, "hi there");
        assert_eq!(all[1].sequence, 2);
        assert_eq!(all[1].role, Role::Assistant);
    }

    #[test]
    fn recent_keeps_most_recent_window() {
        let (store, _dir) = store();
        for i in 0..6 {
            store
                .append("s1", Role::User, &format!("m{i}"), 0, None)
                .unwrap();
        }
        let recent = store.recent("s1", 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[2].content, "m5");
    }

    #[test]
    fn clear_removes_messages_and_file() {
        let (store, dir) = store();
        store.append("s1", Role::User, "a", 0, None).unwrap();
        store.append("s1", Role::User, "b", 0, None).unwrap();

        let removed = store.clear("s1").unwrap();
        assert_eq!(removed, 2);
        assert!(store.read("s1").unwrap().is_empty());
        assert!(!dir.path().join("sessions/s1.jsonl").exists());

        // A wipe starts a fresh sequence series: the next message is 1
        // again, even when the session itself lives on.
        let rec = store.append("s1", Role::User, "fresh", 0, None).unwrap();
        assert_eq!(rec.sequence, 1);
    }

    #[test]
    fn metadata_survives_round_trip() {
        let (store, _dir) = store();
        let meta = serde_json::json!({ "human_agent_id": "h1" });
        store
            .append("s1", Role::HumanAgent, "hi", 1, Some(meta))
            .unwrap();

        store.clear_cache_for_test();
        let all = store.read("s1").unwrap();
        assert_eq!(all[0].metadata.as_ref().unwrap()["human_agent_id"], "h1");
    }

    #[test]
    fn estimate_tokens_is_quarter_length() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("12345678"), 2);
    }

    impl TranscriptStore {
        fn clear_cache_for_test(&self) {
            self.cache.write().clear();
        }
    }
}
