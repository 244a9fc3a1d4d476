//! The four message shapes exchanged between bee roles, one per
//! direction (spec.md §4.7).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    BeekeeperToQueen,
    QueenToBeekeeper,
    QueenToWorker,
    WorkerToQueen,
    /// Reserved: currently always rejected as "unsupported".
    GuardResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OpinionRequest {
    pub colony_id: String,
    pub question: String,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OpinionResponse {
    pub colony_id: String,
    pub answer: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskAssignment {
    pub task_id: String,
    pub colony_id: String,
    pub instructions: String,
    #[serde(default)]
    pub tools_allowed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskResult {
    pub task_id: String,
    pub colony_id: String,
    pub success: bool,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub evidence: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub direction: MessageDirection,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn ok(direction: MessageDirection) -> Self {
        ValidationResult {
            valid: true,
            direction,
            errors: Vec::new(),
        }
    }

    pub fn rejected(direction: MessageDirection, errors: Vec<FieldError>) -> Self {
        ValidationResult {
            valid: false,
            direction,
            errors,
        }
    }
}
