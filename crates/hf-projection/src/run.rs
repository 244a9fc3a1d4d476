//! RunProjection: deterministic fold of a Run's event stream into its
//! current state (spec.md §4.3).

use chrono::{DateTime, Utc};
use hf_core::{EventType, SealedEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProjection {
    pub title: String,
    pub state: TaskState,
    pub assignee: Option<String>,
    pub progress: u32,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementState {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementProjection {
    pub state: RequirementState,
    pub decided_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProjection {
    pub state: RunState,
    pub goal: Option<String>,
    pub tasks: BTreeMap<String, TaskProjection>,
    pub requirements: BTreeMap<String, RequirementProjection>,
    pub event_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Illegal transitions observed during the fold. The AR is truth; this
    /// projection surfaces anomalies instead of crashing (spec.md §4.3).
    pub errors: Vec<String>,
}

impl Default for RunProjection {
    fn default() -> Self {
        RunProjection {
            state: RunState::Pending,
            goal: None,
            tasks: BTreeMap::new(),
            requirements: BTreeMap::new(),
            event_count: 0,
            started_at: None,
            completed_at: None,
            errors: Vec::new(),
        }
    }
}

impl RunProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a full event stream into a fresh projection. Deterministic:
    /// replaying the same events always yields an equivalent state.
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
            EventType::RunStarted => {
                if self.state != RunState::Pending {
                    self.errors.push(format!(
                        "run.started observed from illegal state {:?}",
                        self.state
                    ));
                }
                self.state = RunState::Running;
                self.started_at = Some(e.timestamp);
                if let Some(goal) = e.payload.get("goal").and_then(|v| v.as_str()) {
                    self.goal = Some(goal.to_string());
                }
            }
            EventType::RunCompleted => {
                if self.state != RunState::Running {
                    self.errors.push("run.completed only legal from running".to_string());
                } else {
                    self.state = RunState::Completed;
                    self.completed_at = Some(e.timestamp);
                }
            }
            EventType::RunFailed => {
                if self.state != RunState::Running {
                    self.errors.push("run.failed only legal from running".to_string());
                } else {
                    self.state = RunState::Failed;
                    self.completed_at = Some(e.timestamp);
                }
            }
            EventType::RunAborted => {
                if matches!(self.state, RunState::Completed | RunState::Failed | RunState::Aborted) {
                    self.errors.push("run.aborted only legal from a non-terminal state".to_string());
                } else {
                    self.state = RunState::Aborted;
                    self.completed_at = Some(e.timestamp);
                }
            }
            EventType::TaskCreated => {
                let Some(task_id) = e.task_id.clone() else {
                    self.errors.push("task.created missing task_id".to_string());
                    return;
                };
                let title = e
                    .payload
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.tasks.insert(
                    task_id,
                    TaskProjection {
                        title,
                        state: TaskState::Pending,
                        assignee: None,
                        progress: 0,
                        error_message: None,
                    },
                );
            }
            EventType::TaskAssigned => {
                self.with_task(e, |t| {
                    t.state = TaskState::InProgress;
                    t.assignee = e
                        .payload
                        .get("assignee")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                });
            }
            EventType::TaskProgressed => {
                self.with_task(e, |t| {
                    if let Some(p) = e.payload.get("progress").and_then(|v| v.as_u64()) {
                        t.progress = p as u32;
                    }
                });
            }
            EventType::TaskCompleted => {
                self.with_task(e, |t| {
                    t.state = TaskState::Completed;
                    t.progress = 100;
                });
            }
            EventType::TaskFailed => {
                self.with_task(e, |t| {
                    t.state = TaskState::Failed;
                    t.error_message = e
                        .payload
                        .get("error_message")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                });
            }
            EventType::TaskBlocked => {
                self.with_task(e, |t| {
                    t.state = TaskState::Blocked;
                });
            }
            EventType::TaskUnblocked => {
                self.with_task(e, |t| {
                    t.state = TaskState::Pending;
                });
            }
            EventType::RequirementCreated => {
                if let Some(id) = req_id(e) {
                    self.requirements.insert(
                        id,
                        RequirementProjection {
                            state: RequirementState::Pending,
                            decided_by: None,
                        },
                    );
                }
            }
            EventType::RequirementApproved => {
                self.with_requirement(e, RequirementState::Approved);
            }
            EventType::RequirementRejected => {
                self.with_requirement(e, RequirementState::Rejected);
            }
            _ => {}
        }
    }

    fn with_task(&mut self, e: &hf_core::Event, f: impl FnOnce(&mut TaskProjection)) {
        let Some(task_id) = &e.task_id else {
            self.errors.push(format!("{} missing task_id", e.event_type));
            return;
        };
        match self.tasks.get_mut(task_id) {
            Some(t) => f(t),
            None => self
                .errors
                .push(format!("{} for unknown task {task_id}", e.event_type)),
        }
    }

    fn with_requirement(&mut self, e: &hf_core::Event, new_state: RequirementState) {
        let Some(id) = req_id(e) else {
            self.errors.push(format!("{} missing requirement_id", e.event_type));
            return;
        };
        let decided_by = e
            .payload
            .get("decided_by")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        match self.requirements.get_mut(&id) {
            Some(r) => {
                r.state = new_state;
                r.decided_by = decided_by;
            }
            None => self
                .errors
                .push(format!("{} for unknown requirement {id}", e.event_type)),
        }
    }
}

fn req_id(e: &hf_core::Event) -> Option<String> {
    e.payload
        .get("requirement_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
