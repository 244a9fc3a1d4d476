//! Hive/Colony lifecycle (spec.md §4.9(a)): create, list, get, close.
//! Closing a Hive soft-terminates its active Colonies by emitting
//! `colony.completed` with `forced=true` rather than failing them.

use crate::swarming::ColonyTemplate;
use hf_error::HiveForgeError;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiveState {
    Active,
    Closed,
}

#[derive(Debug, Clone)]
pub struct HiveRecord {
    pub id: String,
    pub name: String,
    pub state: HiveState,
    pub colonies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColonyState {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ColonyRecord {
    pub id: String,
    pub hive_id: String,
    pub name: String,
    pub state: ColonyState,
    pub template: ColonyTemplate,
}

/// A soft-terminate marker produced when a Hive close forces its active
/// Colonies to completion rather than leaving them running.
#[derive(Debug, Clone)]
pub struct ForcedCompletion {
    pub colony_id: String,
}

#[derive(Default)]
pub struct HiveRegistry {
    hives: Mutex<BTreeMap<String, HiveRecord>>,
    colonies: Mutex<BTreeMap<String, ColonyRecord>>,
}

impl HiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_hive(&self, id: impl Into<String>, name: impl Into<String>) -> HiveRecord {
        let record = HiveRecord {
            id: id.into(),
            name: name.into(),
            state: HiveState::Active,
            colonies: Vec::new(),
        };
        self.hives.lock().await.insert(record.id.clone(), record.clone());
        record
    }

    pub async fn get_hive(&self, id: &str) -> Option<HiveRecord> {
        self.hives.lock().await.get(id).cloned()
    }

    pub async fn list_hives(&self) -> Vec<HiveRecord> {
        self.hives.lock().await.values().cloned().collect()
    }

    pub async fn create_colony(
        &self,
        hive_id: &str,
        colony_id: impl Into<String>,
        name: impl Into<String>,
        template: ColonyTemplate,
    ) -> Result<ColonyRecord, HiveForgeError> {
        let mut hives = self.hives.lock().await;
        let hive = hives
            .get_mut(hive_id)
            .ok_or_else(|| HiveForgeError::not_found("hive", hive_id))?;
        if hive.state == HiveState::Closed {
            return Err(HiveForgeError::validation(format!(
                "cannot create colony on closed hive {hive_id}"
            )));
        }
        let colony = ColonyRecord {
            id: colony_id.into(),
            hive_id: hive_id.to_string(),
            name: name.into(),
            state: ColonyState::Pending,
            template,
        };
        hive.colonies.push(colony.id.clone());
        self.colonies.lock().await.insert(colony.id.clone(), colony.clone());
        Ok(colony)
    }

    pub async fn get_colony(&self, id: &str) -> Option<ColonyRecord> {
        self.colonies.lock().await.get(id).cloned()
    }

    pub async fn set_colony_state(&self, id: &str, state: ColonyState) {
        if let Some(colony) = self.colonies.lock().await.get_mut(id) {
            colony.state = state;
        }
    }

    /// Closes a Hive and soft-terminates every Colony not already in a
    /// terminal state. Returns the forced completions so the caller can
    /// append `colony.completed{forced=true}` for each.
    pub async fn close_hive(&self, id: &str) -> Result<Vec<ForcedCompletion>, HiveForgeError> {
        let colony_ids = {
            let mut hives = self.hives.lock().await;
            let hive = hives
                .get_mut(id)
                .ok_or_else(|| HiveForgeError::not_found("hive", id))?;
            hive.state = HiveState::Closed;
            hive.colonies.clone()
        };

        let mut forced = Vec::new();
        let mut colonies = self.colonies.lock().await;
        for colony_id in colony_ids {
            if let Some(colony) = colonies.get_mut(&colony_id) {
                if !matches!(colony.state, ColonyState::Completed | ColonyState::Failed) {
                    colony.state = ColonyState::Completed;
                    forced.push(ForcedCompletion { colony_id });
                }
            }
        }
        Ok(forced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_hive_force_completes_active_colonies() {
        let registry = HiveRegistry::new();
        registry.create_hive("h1", "test hive").await;
        registry.create_colony("h1", "c1", "colony one", ColonyTemplate::BALANCED).await.unwrap();
        registry.set_colony_state("c1", ColonyState::Running).await;

        let forced = registry.close_hive("h1").await.unwrap();
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].colony_id, "c1");

        let colony = registry.get_colony("c1").await.unwrap();
        assert_eq!(colony.state, ColonyState::Completed);
        let hive = registry.get_hive("h1").await.unwrap();
        assert_eq!(hive.state, HiveState::Closed);
    }

    #[tokio::test]
    async fn close_hive_leaves_already_terminal_colonies_alone() {
        let registry = HiveRegistry::new();
        registry.create_hive("h1", "test").await;
        registry.create_colony("h1", "c1", "colony", ColonyTemplate::BALANCED).await.unwrap();
        registry.set_colony_state("c1", ColonyState::Failed).await;

        let forced = registry.close_hive("h1").await.unwrap();
        assert!(forced.is_empty());
    }

    #[tokio::test]
    async fn cannot_create_colony_on_closed_hive() {
        let registry = HiveRegistry::new();
        registry.create_hive("h1", "test").await;
        registry.close_hive("h1").await.unwrap();
        let result = registry.create_colony("h1", "c1", "colony", ColonyTemplate::BALANCED).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn closing_unknown_hive_is_not_found() {
        let registry = HiveRegistry::new();
        let result = registry.close_hive("missing").await;
        assert!(result.is_err());
    }
}
