//! A sink that appends a one-line human-readable record per event to a
//! plain-text activity log file. The simplest possible sink, useful for
//! tailing a Run's progress without replaying the Akashic Record.

use crate::Sink;
use async_trait::async_trait;
use hf_core::SealedEvent;
use hf_error::HiveForgeError;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub struct ActivityLogSink {
    path: PathBuf,
    last_applied_event_id: Option<String>,
    synced_event_ids: HashSet<String>,
}

impl ActivityLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ActivityLogSink {
            path: path.into(),
            last_applied_event_id: None,
            synced_event_ids: HashSet::new(),
        }
    }
}

#[async_trait]
impl Sink for ActivityLogSink {
    async fn apply(&mut self, event: &SealedEvent) -> Result<(), HiveForgeError> {
        let id = event.event.id.to_string();
        if self.synced_event_ids.contains(&id) {
            return Ok(());
        }

        let line = format!(
            "{} {} run={} {}\n",
            event.event.timestamp.to_rfc3339(),
            event.event.event_type.as_str(),
            event.event.run_id.as_deref().unwrap_or("-"),
            event.event.payload,
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| HiveForgeError::transient_io(format!("opening {:?}: {e}", self.path)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| HiveForgeError::transient_io(format!("writing {:?}: {e}", self.path)))?;

        self.synced_event_ids.insert(id.clone());
        self.last_applied_event_id = Some(id);
        Ok(())
    }

    fn last_applied_event_id(&self) -> Option<String> {
        self.last_applied_event_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hf_core::{new_event, EventType};

    #[tokio::test]
    async fn appends_one_line_per_event() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("activity.log");
        let mut sink = ActivityLogSink::new(&path);

        let event = new_event(EventType::RunStarted, "scheduler", serde_json::json!({})).seal(None);
        sink.apply(&event).await.unwrap();
        sink.apply(&event).await.unwrap(); // re-apply is a no-op

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("run.started"));
        assert_eq!(sink.last_applied_event_id(), Some(event.event.id.to_string()));
    }
}
