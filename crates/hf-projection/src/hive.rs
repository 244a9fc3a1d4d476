//! HiveProjection: mirrors Hive/Colony lifecycles, aggregating colony
//! states into the hive's own state (spec.md §4.3).

use hf_core::{EventType, SealedEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HiveState {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColonyLifecycle {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColonyEntry {
    pub name: String,
    pub state: ColonyLifecycle,
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiveProjection {
    pub name: Option<String>,
    pub state: HiveState,
    pub colonies: BTreeMap<String, ColonyEntry>,
    pub event_count: u64,
    pub errors: Vec<String>,
}

impl Default for HiveProjection {
    fn default() -> Self {
        HiveProjection {
            name: None,
            state: HiveState::Active,
            colonies: BTreeMap::new(),
            event_count: 0,
            errors: Vec::new(),
        }
    }
}

impl HiveProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(events: &[SealedEvent]) -> Self {
        let mut p = Self::new();
        for e in events {
            p.apply(e);
        }
        p
    }

    pub fn apply(&mut self, sealed: &SealedEvent) {
        self.event_count += 1;
        let e = &sealed.event;
        match &e.event_type {
            EventType::HiveCreated => {
                self.name = e
                    .payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                self.state = HiveState::Active;
            }
            EventType::HiveClosed => {
                self.state = HiveState::Closed;
            }
            EventType::ColonyCreated => {
                let Some(id) = colony_id(e) else {
                    self.errors.push("colony.created missing colony_id".into());
                    return;
                };
                let name = e
                    .payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.colonies.insert(
                    id,
                    ColonyEntry {
                        name,
                        state: ColonyLifecycle::Pending,
                        forced: false,
                    },
                );
            }
            EventType::ColonyStarted => self.with_colony(e, |c| c.state = ColonyLifecycle::Running),
            EventType::ColonyCompleted => self.with_colony(e, |c| {
                c.state = ColonyLifecycle::Completed;
                c.forced = e
                    .payload
                    .get("forced")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
            }),
            EventType::ColonyFailed => self.with_colony(e, |c| c.state = ColonyLifecycle::Failed),
            _ => {}
        }
    }

    fn with_colony(&mut self, e: &hf_core::Event, f: impl FnOnce(&mut ColonyEntry)) {
        let Some(id) = colony_id(e) else {
            self.errors.push(format!("{} missing colony_id", e.event_type));
            return;
        };
        match self.colonies.get_mut(&id) {
            Some(c) => f(c),
            None => self.errors.push(format!("{} for unknown colony {id}", e.event_type)),
        }
    }
}

fn colony_id(e: &hf_core::Event) -> Option<String> {
    e.payload
        .get("colony_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
