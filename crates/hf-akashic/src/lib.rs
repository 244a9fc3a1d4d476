//! The Akashic Record: a durable, append-only, hash-chained per-stream
//! event log on disk (spec.md §4.2). Single-writer-per-stream, lock-free
//! reads, sealed-once events.

use chrono::{DateTime, Utc};
use hf_core::{Event, EventId, SealedEvent, StreamId};
use hf_error::HiveForgeError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::Instant;

const EVENTS_FILE: &str = "events.jsonl";
/// Fsync after this many buffered appends even if the time budget hasn't
/// elapsed (spec.md §4.2 "fsync batched up to 50ms or 32 events").
const FSYNC_EVERY_N: u32 = 32;
/// Fsync after this much time has passed since the first buffered append,
/// even if fewer than `FSYNC_EVERY_N` have accumulated.
const FSYNC_MAX_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Default, Clone)]
struct StreamTail {
    last_hash: Option<String>,
    last_id: Option<EventId>,
    last_event: Option<SealedEvent>,
    loaded: bool,
    pending_since_fsync: u32,
    pending_since: Option<Instant>,
}

/// A verification report for a stream's hash chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub ok: bool,
    pub first_failure_index: Option<usize>,
}

pub struct Akashic {
    root: PathBuf,
    streams: Mutex<HashMap<String, Arc<Mutex<StreamTail>>>>,
}

impl Akashic {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Akashic {
            root: root.into(),
            streams: Mutex::new(HashMap::new()),
        }
    }

    fn stream_dir(&self, stream_id: &StreamId) -> PathBuf {
        self.root.join(stream_id.as_str())
    }

    fn events_path(&self, stream_id: &StreamId) -> PathBuf {
        self.stream_dir(stream_id).join(EVENTS_FILE)
    }

    async fn tail_lock(&self, stream_id: &StreamId) -> Arc<Mutex<StreamTail>> {
        let mut streams = self.streams.lock().await;
        streams
            .entry(stream_id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(StreamTail::default())))
            .clone()
    }

    /// Loads the tail cache from disk the first time a stream is touched in
    /// this process's lifetime. Tolerates a single unterminated trailing
    /// line (writer-in-progress) by skipping it, per spec.md §9.
    async fn ensure_loaded(&self, stream_id: &StreamId, tail: &mut StreamTail) -> Result<(), HiveForgeError> {
        if tail.loaded {
            return Ok(());
        }
        let path = self.events_path(stream_id);
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let mut last: Option<SealedEvent> = None;
                for line in content.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match SealedEvent::from_jsonl(line) {
                        Ok(ev) => last = Some(ev),
                        Err(_) => break, // unterminated/corrupt tail line: stop, treat as not-yet-written
                    }
                }
                if let Some(ev) = last {
                    tail.last_hash = Some(ev.hash.clone());
                    tail.last_id = Some(ev.event.id);
                    tail.last_event = Some(ev);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(HiveForgeError::transient_io(format!("reading {path:?}: {e}"))),
        }
        tail.loaded = true;
        Ok(())
    }

    /// Appends `event` to `stream_id`, sealing it against the current tail.
    pub async fn append(&self, stream_id: &StreamId, event: Event) -> Result<SealedEvent, HiveForgeError> {
        let lock = self.tail_lock(stream_id).await;
        let mut tail = lock.lock().await;
        self.ensure_loaded(stream_id, &mut tail).await?;

        let dir = self.stream_dir(stream_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| HiveForgeError::transient_io(format!("creating stream dir {dir:?}: {e}")))?;

        let sealed = event.seal(tail.last_hash.clone());
        let line = sealed
            .to_jsonl()
            .map_err(|e| HiveForgeError::internal(format!("serializing event: {e}")))?;

        let path = self.events_path(stream_id);
        // Full-line append: build the exact bytes (including trailing \n)
        // up front and write them in one call so a short write never leaves
        // a partial line on disk.
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                // Invalidate the cache: we don't know the true on-disk state.
                tail.loaded = false;
                HiveForgeError::transient_io(format!("opening {path:?}: {e}"))
            })?;
        if let Err(e) = file.write_all(&bytes).await {
            tail.loaded = false;
            return Err(HiveForgeError::transient_io(format!("writing {path:?}: {e}")));
        }
        if let Err(e) = file.flush().await {
            tail.loaded = false;
            return Err(HiveForgeError::transient_io(format!("flushing {path:?}: {e}")));
        }

        tail.pending_since_fsync += 1;
        let deadline_elapsed = tail.pending_since.is_some_and(|since| since.elapsed() >= FSYNC_MAX_DELAY);
        if tail.pending_since_fsync >= FSYNC_EVERY_N || deadline_elapsed {
            if let Err(e) = file.sync_all().await {
                tail.loaded = false;
                return Err(HiveForgeError::transient_io(format!("fsyncing {path:?}: {e}")));
            }
            tail.pending_since_fsync = 0;
            tail.pending_since = None;
        } else if tail.pending_since.is_none() {
            tail.pending_since = Some(Instant::now());
        }

        tail.last_hash = Some(sealed.hash.clone());
        tail.last_id = Some(sealed.event.id);
        tail.last_event = Some(sealed.clone());

        tracing::debug!(stream = %stream_id, event_id = %sealed.event.id, "appended event");
        Ok(sealed)
    }

    /// Streams events in insertion order, optionally filtered by
    /// `timestamp >= since`. Never blocks on writers: tolerates an
    /// unterminated trailing line by stopping before it.
    pub async fn replay(
        &self,
        stream_id: &StreamId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SealedEvent>, HiveForgeError> {
        let path = self.events_path(stream_id);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HiveForgeError::transient_io(format!("reading {path:?}: {e}"))),
        };

        let mut out = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event = match SealedEvent::from_jsonl(line) {
                Ok(ev) => ev,
                Err(_) => break,
            };
            if let Some(since) = since {
                if event.event.timestamp < since {
                    continue;
                }
            }
            out.push(event);
        }
        Ok(out)
    }

    /// O(1) via the tail cache; loads it first if this is the first touch.
    pub async fn get_last_event(&self, stream_id: &StreamId) -> Result<Option<SealedEvent>, HiveForgeError> {
        let lock = self.tail_lock(stream_id).await;
        let mut tail = lock.lock().await;
        self.ensure_loaded(stream_id, &mut tail).await?;
        Ok(tail.last_event.clone())
    }

    /// Linear scan; admin-tool operation, not on any hot path.
    pub async fn count_events(&self, stream_id: &StreamId) -> Result<usize, HiveForgeError> {
        Ok(self.replay(stream_id, None).await?.len())
    }

    /// Verifies every event's own hash and the prev_hash chain between
    /// adjacent events (spec.md I2, I3).
    pub async fn verify_chain(&self, stream_id: &StreamId) -> Result<ChainVerification, HiveForgeError> {
        let events = self.replay(stream_id, None).await?;
        let mut prev: Option<&SealedEvent> = None;
        for (i, event) in events.iter().enumerate() {
            if !event.verify_own_hash() {
                return Ok(ChainVerification {
                    ok: false,
                    first_failure_index: Some(i),
                });
            }
            if let Some(p) = prev {
                if event.event.prev_hash.as_deref() != Some(p.hash.as_str()) {
                    return Ok(ChainVerification {
                        ok: false,
                        first_failure_index: Some(i),
                    });
                }
            } else if event.event.prev_hash.is_some() {
                return Ok(ChainVerification {
                    ok: false,
                    first_failure_index: Some(i),
                });
            }
            prev = Some(event);
        }
        Ok(ChainVerification {
            ok: true,
            first_failure_index: None,
        })
    }

    /// Enumerates stream directories that contain an events file.
    pub async fn list_streams(&self) -> Result<Vec<String>, HiveForgeError> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(HiveForgeError::transient_io(format!("listing {:?}: {e}", self.root))),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HiveForgeError::transient_io(format!("reading dir entry: {e}")))?
        {
            let path = entry.path();
            if path.join(EVENTS_FILE).is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Copies the stream's events file byte-for-byte to `dest`.
    pub async fn export_stream(&self, stream_id: &StreamId, dest: &Path) -> Result<usize, HiveForgeError> {
        let src_path = self.events_path(stream_id);
        let mut src = File::open(&src_path)
            .await
            .map_err(|e| HiveForgeError::not_found("stream", format!("{stream_id} ({e})")))?;
        let mut buf = Vec::new();
        src.read_to_end(&mut buf)
            .await
            .map_err(|e| HiveForgeError::transient_io(format!("reading {src_path:?}: {e}")))?;
        let count = buf.iter().filter(|&&b| b == b'\n').count();
        fs::write(dest, &buf)
            .await
            .map_err(|e| HiveForgeError::transient_io(format!("writing {dest:?}: {e}")))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hf_core::{new_event, EventType};
    use tempfile::tempdir;

    fn stream(id: &str) -> StreamId {
        StreamId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn append_and_replay_round_trip() {
        let dir = tempdir().unwrap();
        let ar = Akashic::new(dir.path());
        let s = stream("run-01");

        let e1 = new_event(EventType::RunStarted, "system", serde_json::json!({"goal":"x"}));
        let sealed1 = ar.append(&s, e1).await.unwrap();
        assert!(sealed1.event.prev_hash.is_none());

        let e2 = new_event(EventType::TaskCreated, "queen:c1", serde_json::json!({"title":"t"}));
        let sealed2 = ar.append(&s, e2).await.unwrap();
        assert_eq!(sealed2.event.prev_hash.as_deref(), Some(sealed1.hash.as_str()));

        let events = ar.replay(&s, None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].hash, sealed1.hash);
    }

    #[tokio::test]
    async fn verify_chain_detects_tamper() {
        let dir = tempdir().unwrap();
        let ar = Akashic::new(dir.path());
        let s = stream("run-tamper");

        for i in 0..3 {
            let e = new_event(
                EventType::Heartbeat,
                "system",
                serde_json::json!({"i": i}),
            );
            ar.append(&s, e).await.unwrap();
        }

        let report = ar.verify_chain(&s).await.unwrap();
        assert!(report.ok);

        // Mutate the second event's prev_hash on disk directly.
        let path = ar.events_path(&s);
        let content = fs::read_to_string(&path).await.unwrap();
        let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
        let mut v: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        v["prev_hash"] = serde_json::Value::String("tampered0000".to_string());
        lines[1] = v.to_string();
        fs::write(&path, lines.join("\n") + "\n").await.unwrap();

        let ar2 = Akashic::new(dir.path());
        let report2 = ar2.verify_chain(&s).await.unwrap();
        assert!(!report2.ok);
        assert_eq!(report2.first_failure_index, Some(1));
    }

    #[tokio::test]
    async fn get_last_event_is_cached() {
        let dir = tempdir().unwrap();
        let ar = Akashic::new(dir.path());
        let s = stream("run-last");
        assert!(ar.get_last_event(&s).await.unwrap().is_none());
        let e = new_event(EventType::RunStarted, "system", serde_json::json!({}));
        let sealed = ar.append(&s, e).await.unwrap();
        let last = ar.get_last_event(&s).await.unwrap().unwrap();
        assert_eq!(last.hash, sealed.hash);
    }

    #[tokio::test]
    async fn list_streams_only_returns_dirs_with_events_file() {
        let dir = tempdir().unwrap();
        let ar = Akashic::new(dir.path());
        ar.append(
            &stream("a"),
            new_event(EventType::Heartbeat, "system", serde_json::json!({})),
        )
        .await
        .unwrap();
        fs::create_dir_all(dir.path().join("empty-dir")).await.unwrap();

        let streams = ar.list_streams().await.unwrap();
        assert_eq!(streams, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn fsync_time_budget_triggers_before_batch_size() {
        let dir = tempdir().unwrap();
        let ar = Akashic::new(dir.path());
        let s = stream("run-fsync-time");

        ar.append(&s, new_event(EventType::Heartbeat, "system", serde_json::json!({}))).await.unwrap();
        {
            let lock = ar.tail_lock(&s).await;
            let tail = lock.lock().await;
            assert_eq!(tail.pending_since_fsync, 1);
            assert!(tail.pending_since.is_some());
        }

        tokio::time::sleep(FSYNC_MAX_DELAY + Duration::from_millis(10)).await;
        ar.append(&s, new_event(EventType::Heartbeat, "system", serde_json::json!({}))).await.unwrap();
        {
            let lock = ar.tail_lock(&s).await;
            let tail = lock.lock().await;
            assert_eq!(tail.pending_since_fsync, 0, "time budget should fsync on the second append even though fewer than FSYNC_EVERY_N have buffered");
            assert!(tail.pending_since.is_none());
        }
    }

    #[tokio::test]
    async fn export_stream_copies_bytes() {
        let dir = tempdir().unwrap();
        let ar = Akashic::new(dir.path());
        let s = stream("run-export");
        ar.append(&s, new_event(EventType::Heartbeat, "system", serde_json::json!({})))
            .await
            .unwrap();
        let dest = dir.path().join("exported.jsonl");
        let count = ar.export_stream(&s, &dest).await.unwrap();
        assert_eq!(count, 1);
        assert!(dest.exists());
    }
}
