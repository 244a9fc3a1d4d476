//! Events: immutable records, canonical hashing, seal-once semantics.

use crate::canon::canonicalize;
use crate::event_type::EventType;
use crate::id::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An event prior to sealing. `prev_hash` may be pre-populated by a caller
/// that already knows the chain tail; normally it is left `None` and filled
/// in by [`seal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub actor: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub parents: Vec<EventId>,
    #[serde(default)]
    pub prev_hash: Option<String>,
}

/// A sealed, frozen event: `hash` has been computed and the event may never
/// be modified. This is the only form ever written to the Akashic Record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub hash: String,
}

/// Builds a fresh, unsealed event: assigns a new ID and the current
/// timestamp, leaves `prev_hash`/`hash` unset (spec.md §4.1).
pub fn new_event(event_type: EventType, actor: impl Into<String>, payload: serde_json::Value) -> Event {
    Event {
        id: EventId::new(),
        event_type,
        timestamp: Utc::now(),
        run_id: None,
        task_id: None,
        actor: actor.into(),
        payload,
        parents: Vec::new(),
        prev_hash: None,
    }
}

impl Event {
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_parents(mut self, parents: Vec<EventId>) -> Self {
        self.parents = parents;
        self
    }

    /// Computes the hash this event would have if sealed right now with the
    /// given `prev_hash`, without mutating or freezing anything.
    fn compute_hash(&self, prev_hash: Option<&str>) -> String {
        let mut with_prev = self.clone();
        with_prev.prev_hash = prev_hash.map(|s| s.to_string());
        let value = serde_json::to_value(&with_prev).expect("Event always serializes");
        let canonical = canonicalize(&value);
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }

    /// Seals the event exactly once at the append boundary: fills
    /// `prev_hash`, computes `hash`, and freezes the result.
    pub fn seal(mut self, prev_hash: Option<String>) -> SealedEvent {
        let hash = self.compute_hash(prev_hash.as_deref());
        self.prev_hash = prev_hash;
        SealedEvent { event: self, hash }
    }
}

impl SealedEvent {
    /// Recomputes the hash from the event's own content and compares
    /// against the stored `hash` (spec.md I3).
    pub fn verify_own_hash(&self) -> bool {
        self.event.compute_hash(self.event.prev_hash.as_deref()) == self.hash
    }

    pub fn to_jsonl(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_jsonl(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
