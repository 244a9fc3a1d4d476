//! Escalation manager: Beekeepers raise Escalations to a Queen when they
//! can't proceed on their own. Tracks active escalations plus a resolved
//! history.

use hf_core::EventId;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationType {
    BeekeeperConfusion,
    BeekeeperTimeout,
    ContextLoss,
    InstructionConflict,
    ResourceConcern,
    CriticalDecision,
    Blocked,
    SecurityConcern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EscalationSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStatus {
    Pending,
    Acknowledged,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone)]
pub struct Escalation {
    pub id: String,
    pub colony_id: String,
    pub queen_bee_id: String,
    pub escalation_type: EscalationType,
    pub severity: EscalationSeverity,
    pub status: EscalationStatus,
    pub title: String,
    pub description: String,
    pub context: Value,
    pub suggested_actions: Vec<String>,
    pub resolution: Option<String>,
}

#[derive(Default)]
pub struct EscalationManager {
    active: Mutex<HashMap<String, Escalation>>,
    history: Mutex<Vec<Escalation>>,
}

impl EscalationManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_escalation(
        &self,
        colony_id: &str,
        queen_bee_id: &str,
        escalation_type: EscalationType,
        severity: EscalationSeverity,
        title: &str,
        description: &str,
        context: Value,
        suggested_actions: Vec<String>,
    ) -> Escalation {
        let escalation = Escalation {
            id: EventId::new().to_string(),
            colony_id: colony_id.to_string(),
            queen_bee_id: queen_bee_id.to_string(),
            escalation_type,
            severity,
            status: EscalationStatus::Pending,
            title: title.to_string(),
            description: description.to_string(),
            context,
            suggested_actions,
            resolution: None,
        };
        self.active.lock().await.insert(escalation.id.clone(), escalation.clone());
        escalation
    }

    pub async fn acknowledge(&self, id: &str) -> bool {
        let mut active = self.active.lock().await;
        let Some(escalation) = active.get_mut(id) else { return false };
        if escalation.status != EscalationStatus::Pending {
            return false;
        }
        escalation.status = EscalationStatus::Acknowledged;
        true
    }

    pub async fn resolve(&self, id: &str, resolution: &str) -> bool {
        let mut active = self.active.lock().await;
        let Some(mut escalation) = active.remove(id) else { return false };
        escalation.status = EscalationStatus::Resolved;
        escalation.resolution = Some(resolution.to_string());
        self.history.lock().await.push(escalation);
        true
    }

    pub async fn dismiss(&self, id: &str, reason: &str) -> bool {
        let mut active = self.active.lock().await;
        let Some(mut escalation) = active.remove(id) else { return false };
        escalation.status = EscalationStatus::Dismissed;
        escalation.resolution = Some(reason.to_string());
        self.history.lock().await.push(escalation);
        true
    }

    pub async fn get_escalation(&self, id: &str) -> Option<Escalation> {
        self.active.lock().await.get(id).cloned()
    }

    pub async fn get_pending_escalations(&self) -> Vec<Escalation> {
        self.active
            .lock()
            .await
            .values()
            .filter(|e| e.status == EscalationStatus::Pending)
            .cloned()
            .collect()
    }

    pub async fn get_escalations_by_colony(&self, colony_id: &str) -> Vec<Escalation> {
        self.active
            .lock()
            .await
            .values()
            .filter(|e| e.colony_id == colony_id)
            .cloned()
            .collect()
    }

    pub async fn get_escalations_by_severity(&self, severity: EscalationSeverity) -> Vec<Escalation> {
        self.active
            .lock()
            .await
            .values()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }

    pub async fn get_history(&self, limit: usize, colony_id: Option<&str>) -> Vec<Escalation> {
        let history = self.history.lock().await;
        history
            .iter()
            .rev()
            .filter(|e| colony_id.is_none_or(|c| e.colony_id == c))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn get_critical_count(&self) -> usize {
        self.active
            .lock()
            .await
            .values()
            .filter(|e| e.severity == EscalationSeverity::Critical && e.status == EscalationStatus::Pending)
            .count()
    }
}
