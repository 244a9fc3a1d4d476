//! ColonyProgressTracker: derives Colony terminal state from Run results
//! (spec.md §4.3, §4.9(d)). Subscribes to `run.started / run.completed /
//! run.failed`.

use hf_core::{EventType, SealedEvent};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColonyState {
    Unknown,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColonyTransition {
    Completed(String),
    Failed(String),
}

#[derive(Debug, Default)]
struct ColonyProgress {
    state: ColonyState,
    expected_runs: HashSet<String>,
    completed_runs: HashSet<String>,
}

impl Default for ColonyState {
    fn default() -> Self {
        ColonyState::Unknown
    }
}

/// Tracks, per colony, which runs it owns and whether they've all completed.
/// A colony transitions to `Failed` on the first `run.failed`; to
/// `Completed` only once every *registered* run has reported
/// `run.completed`.
#[derive(Debug, Default)]
pub struct ColonyProgressTracker {
    colonies: HashMap<String, ColonyProgress>,
}

impl ColonyProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers that `run_id` belongs to `colony_id`. Must be called
    /// before (or at) the run's `run.started` for roll-up to be exact;
    /// the scheduler calls this at Run-creation time.
    pub fn register_run(&mut self, colony_id: &str, run_id: &str) {
        let entry = self.colonies.entry(colony_id.to_string()).or_default();
        entry.expected_runs.insert(run_id.to_string());
        if entry.state == ColonyState::Unknown {
            entry.state = ColonyState::Running;
        }
    }

    pub fn state_of(&self, colony_id: &str) -> ColonyState {
        self.colonies
            .get(colony_id)
            .map(|c| c.state)
            .unwrap_or(ColonyState::Unknown)
    }

    /// Folds one event. Null `run_id`/`colony_id` are ignored defensively
    /// per spec.md §4.9(d).
    pub fn apply(&mut self, sealed: &SealedEvent) -> Option<ColonyTransition> {
        let e = &sealed.event;
        let run_id = e.run_id.as_deref()?;
        let colony_id = colony_id_of(run_id, &self.colonies)?;

        match &e.event_type {
            EventType::RunFailed => {
                let progress = self.colonies.get_mut(&colony_id)?;
                if progress.state == ColonyState::Failed {
                    return None;
                }
                progress.state = ColonyState::Failed;
                Some(ColonyTransition::Failed(colony_id))
            }
            EventType::RunCompleted => {
                let progress = self.colonies.get_mut(&colony_id)?;
                if progress.state == ColonyState::Completed || progress.state == ColonyState::Failed {
                    return None;
                }
                progress.completed_runs.insert(run_id.to_string());
                if progress.completed_runs.is_superset(&progress.expected_runs) {
                    progress.state = ColonyState::Completed;
                    Some(ColonyTransition::Completed(colony_id))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

fn colony_id_of(run_id: &str, colonies: &HashMap<String, ColonyProgress>) -> Option<String> {
    colonies
        .iter()
        .find(|(_, p)| p.expected_runs.contains(run_id))
        .map(|(id, _)| id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hf_core::new_event;

    fn seal(e: hf_core::Event) -> SealedEvent {
        e.seal(None)
    }

    #[test]
    fn completes_once_after_both_runs_complete() {
        let mut tracker = ColonyProgressTracker::new();
        tracker.register_run("C1", "R1");
        tracker.register_run("C1", "R2");

        let r1_completed = seal(new_event(EventType::RunCompleted, "system", serde_json::json!({})).with_run_id("R1"));
        let r2_completed = seal(new_event(EventType::RunCompleted, "system", serde_json::json!({})).with_run_id("R2"));

        assert_eq!(tracker.apply(&r1_completed), None);
        assert_eq!(
            tracker.apply(&r2_completed),
            Some(ColonyTransition::Completed("C1".to_string()))
        );
        // Re-applying is a no-op, not a repeat transition.
        assert_eq!(tracker.apply(&r2_completed), None);
        assert_eq!(tracker.state_of("C1"), ColonyState::Completed);
    }

    #[test]
    fn any_failed_run_fails_the_colony() {
        let mut tracker = ColonyProgressTracker::new();
        tracker.register_run("C1", "R1");
        tracker.register_run("C1", "R2");

        let r1_failed = seal(new_event(EventType::RunFailed, "system", serde_json::json!({})).with_run_id("R1"));
        assert_eq!(
            tracker.apply(&r1_failed),
            Some(ColonyTransition::Failed("C1".to_string()))
        );
        assert_eq!(tracker.state_of("C1"), ColonyState::Failed);
    }

    #[test]
    fn null_run_id_is_ignored_defensively() {
        let mut tracker = ColonyProgressTracker::new();
        let orphan = seal(new_event(EventType::RunCompleted, "system", serde_json::json!({})));
        assert_eq!(tracker.apply(&orphan), None);
    }
}
