//! The Scheduler: the only component that writes lifecycle events. Wires
//! together the Hive/Colony hierarchy, per-Run task dispatch, the Silence
//! Watchdog, colony progress roll-up, and emergency stop so a caller
//! drives one Run at a time through a single entry point (spec.md §4.9).

use crate::dispatch::{TaskContext, TaskGraph};
use crate::emergency::{EmergencyStopCoordinator, Scope};
use crate::hierarchy::{ColonyRecord, ColonyState, HiveRecord, HiveRegistry};
use crate::swarming::{SwarmingEngine, SwarmingFeatures};
use crate::watchdog::SilenceWatchdog;
use hf_agent::CancellationToken;
use hf_akashic::Akashic;
use hf_core::{new_event, EventType, SealedEvent, StreamId};
use hf_error::HiveForgeError;
use hf_lineage::{resolve_parents, walk_lineage, LineageGraph};
use hf_projection::{ColonyProgressTracker, ColonyTransition};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

struct RunEntry {
    colony_id: String,
    goal: String,
    graph: TaskGraph,
}

/// A Run's terminal outcome, or `Running` if none of the terminal event
/// types has appeared in its stream yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        }
    }
}

/// A read-only view of a Run's current state, reconstructed by replaying
/// its stream rather than tracked separately (the stream is always the
/// source of truth, including after a daemon restart).
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub run_id: String,
    pub colony_id: String,
    pub goal: String,
    pub status: RunStatus,
}

/// Owns the hierarchy and drives Runs through their lifecycle. AR remains
/// the canonical state; this struct's in-memory maps are working state
/// rebuilt from replay on restart (not done here; left to the daemon's
/// startup routine).
pub struct Scheduler {
    akashic: Arc<Akashic>,
    pub hives: HiveRegistry,
    pub watchdog: Arc<SilenceWatchdog>,
    pub emergency: Arc<EmergencyStopCoordinator>,
    runs: Mutex<HashMap<String, RunEntry>>,
    colony_progress: Mutex<ColonyProgressTracker>,
}

impl Scheduler {
    pub fn new(akashic: Arc<Akashic>) -> Self {
        Scheduler {
            akashic,
            hives: HiveRegistry::new(),
            watchdog: Arc::new(SilenceWatchdog::with_default_threshold()),
            emergency: Arc::new(EmergencyStopCoordinator::new()),
            runs: Mutex::new(HashMap::new()),
            colony_progress: Mutex::new(ColonyProgressTracker::new()),
        }
    }

    /// Appends one lifecycle event, auto-resolving `parents` against the
    /// stream's own history (spec.md §4.4) unless the caller already set
    /// them.
    async fn emit(
        &self,
        stream_key: &str,
        run_id: Option<&str>,
        event_type: EventType,
        payload: Value,
    ) -> Result<(), HiveForgeError> {
        self.emit_with_task(stream_key, run_id, None, event_type, payload).await
    }

    async fn emit_with_task(
        &self,
        stream_key: &str,
        run_id: Option<&str>,
        task_id: Option<&str>,
        event_type: EventType,
        payload: Value,
    ) -> Result<(), HiveForgeError> {
        let stream_id = StreamId::parse(stream_key)?;
        let mut event = new_event(event_type, "scheduler", payload);
        if let Some(run_id) = run_id {
            event = event.with_run_id(run_id.to_string());
            self.watchdog.touch(run_id).await;
        }
        if let Some(task_id) = task_id {
            event = event.with_task_id(task_id.to_string());
        }
        let prior = self.akashic.replay(&stream_id, None).await?;
        let parents = resolve_parents(&event, &prior);
        event = event.with_parents(parents);
        self.akashic.append(&stream_id, event).await?;
        Ok(())
    }

    /// Creates a Hive and emits `hive.created`.
    pub async fn create_hive(&self, hive_id: &str, name: &str) -> Result<HiveRecord, HiveForgeError> {
        let record = self.hives.create_hive(hive_id, name).await;
        self.emit(hive_id, None, EventType::HiveCreated, json!({"name": name})).await?;
        Ok(record)
    }

    /// Creates a Colony under `hive_id`, auto-selects its worker-pool
    /// template from `features` (defaulting to mid-range values, which
    /// selects Balanced) via `SwarmingEngine`, and emits `colony.created`.
    pub async fn create_colony(
        &self,
        hive_id: &str,
        colony_id: &str,
        name: &str,
        goal: Option<&str>,
        features: Option<SwarmingFeatures>,
    ) -> Result<ColonyRecord, HiveForgeError> {
        let template = SwarmingEngine::select_template(features.unwrap_or_default());
        let record = self.hives.create_colony(hive_id, colony_id, name, template).await?;
        self.emit(
            colony_id,
            None,
            EventType::ColonyCreated,
            json!({"hive_id": hive_id, "name": name, "goal": goal, "template": template.name.as_str()}),
        )
        .await?;
        Ok(record)
    }

    /// Transitions a Colony to `Running` and emits `colony.started`.
    pub async fn start_colony(&self, colony_id: &str) -> Result<(), HiveForgeError> {
        self.hives.get_colony(colony_id).await.ok_or_else(|| HiveForgeError::not_found("colony", colony_id))?;
        self.hives.set_colony_state(colony_id, ColonyState::Running).await;
        self.emit(colony_id, None, EventType::ColonyStarted, json!({})).await
    }

    /// Marks a Colony `Completed` directly (no Run roll-up involved) and
    /// emits `colony.completed`.
    pub async fn complete_colony(&self, colony_id: &str) -> Result<(), HiveForgeError> {
        self.hives.get_colony(colony_id).await.ok_or_else(|| HiveForgeError::not_found("colony", colony_id))?;
        self.hives.set_colony_state(colony_id, ColonyState::Completed).await;
        self.emit(colony_id, None, EventType::ColonyCompleted, json!({"forced": false})).await
    }

    /// Starts a Run under `colony_id` with the given goal and task set
    /// (`id, goal, depends_on`). Registers it with the watchdog, the
    /// colony progress tracker, and the emergency-stop coordinator, then
    /// emits `run.started` followed by one `task.created` per initial task.
    pub async fn start_run(
        &self,
        run_id: &str,
        colony_id: &str,
        hive_id: Option<&str>,
        goal: &str,
        tasks: Vec<(String, String, Vec<String>)>,
    ) -> Result<(), HiveForgeError> {
        let task_ids: Vec<String> = tasks.iter().map(|(id, _, _)| id.clone()).collect();
        let graph = TaskGraph::new(tasks);
        self.runs.lock().await.insert(
            run_id.to_string(),
            RunEntry { colony_id: colony_id.to_string(), goal: goal.to_string(), graph },
        );
        self.watchdog.register_run(run_id).await;
        self.colony_progress.lock().await.register_run(colony_id, run_id);
        self.emergency
            .register_run(run_id, Some(colony_id.to_string()), hive_id.map(str::to_string), CancellationToken::new())
            .await;
        self.emit(run_id, Some(run_id), EventType::RunStarted, json!({"colony_id": colony_id, "goal": goal})).await?;
        for task_id in task_ids {
            self.emit_with_task(run_id, Some(run_id), Some(&task_id), EventType::TaskCreated, json!({"task_id": task_id}))
                .await?;
        }
        Ok(())
    }

    /// Adds a task to a Run already in flight (`POST /runs/{id}/tasks`) and
    /// emits `task.created`.
    pub async fn add_task(
        &self,
        run_id: &str,
        task_id: &str,
        title: &str,
        depends_on: Vec<String>,
    ) -> Result<(), HiveForgeError> {
        {
            let mut runs = self.runs.lock().await;
            let entry = runs.get_mut(run_id).ok_or_else(|| HiveForgeError::not_found("run", run_id))?;
            entry.graph.add_task(task_id.to_string(), title.to_string(), depends_on);
        }
        self.emit_with_task(run_id, Some(run_id), Some(task_id), EventType::TaskCreated, json!({"task_id": task_id}))
            .await
    }

    pub async fn next_ready_task(&self, run_id: &str) -> Option<String> {
        let mut runs = self.runs.lock().await;
        runs.get_mut(run_id)?.graph.next_ready()
    }

    pub async fn task_context(&self, run_id: &str, task_id: &str) -> Option<TaskContext> {
        let runs = self.runs.lock().await;
        let entry = runs.get(run_id)?;
        Some(entry.graph.build_context(task_id, run_id, &entry.goal))
    }

    pub async fn complete_task(
        &self,
        run_id: &str,
        task_id: &str,
        output: String,
        artifacts: Vec<String>,
    ) -> Result<(), HiveForgeError> {
        {
            let mut runs = self.runs.lock().await;
            if let Some(entry) = runs.get_mut(run_id) {
                entry.graph.complete_task(task_id, output.clone(), artifacts);
            }
        }
        self.emit_with_task(
            run_id,
            Some(run_id),
            Some(task_id),
            EventType::TaskCompleted,
            json!({"task_id": task_id, "output": output}),
        )
        .await
    }

    pub async fn fail_task(&self, run_id: &str, task_id: &str, reason: &str) -> Result<(), HiveForgeError> {
        let blocked = {
            let mut runs = self.runs.lock().await;
            match runs.get_mut(run_id) {
                Some(entry) => entry.graph.fail_task(task_id),
                None => Vec::new(),
            }
        };
        self.emit_with_task(
            run_id,
            Some(run_id),
            Some(task_id),
            EventType::TaskFailed,
            json!({"task_id": task_id, "reason": reason}),
        )
        .await?;
        for blocked_id in blocked {
            self.emit_with_task(
                run_id,
                Some(run_id),
                Some(&blocked_id),
                EventType::TaskBlocked,
                json!({"task_id": blocked_id}),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn run_is_done(&self, run_id: &str) -> bool {
        self.runs.lock().await.get(run_id).map(|e| e.graph.is_done()).unwrap_or(true)
    }

    pub async fn complete_run(&self, run_id: &str) -> Result<(), HiveForgeError> {
        self.emit(run_id, Some(run_id), EventType::RunCompleted, json!({})).await?;
        self.roll_up_colony(run_id).await?;
        self.retire_run(run_id).await;
        Ok(())
    }

    pub async fn fail_run(&self, run_id: &str, reason: &str) -> Result<(), HiveForgeError> {
        self.emit(run_id, Some(run_id), EventType::RunFailed, json!({"reason": reason})).await?;
        self.roll_up_colony(run_id).await?;
        self.retire_run(run_id).await;
        Ok(())
    }

    /// Drops a Run's working state once it reaches a terminal outcome, so
    /// the watchdog and emergency-stop coordinator stop tracking it.
    async fn retire_run(&self, run_id: &str) {
        self.runs.lock().await.remove(run_id);
        self.watchdog.unregister_run(run_id).await;
        self.emergency.unregister_run(run_id).await;
    }

    async fn roll_up_colony(&self, run_id: &str) -> Result<(), HiveForgeError> {
        let colony_id = match self.runs.lock().await.get(run_id) {
            Some(entry) => entry.colony_id.clone(),
            None => return Ok(()),
        };
        let sealed = match self.akashic.get_last_event(&StreamId::parse(run_id)?).await? {
            Some(s) => s,
            None => return Ok(()),
        };
        let transition = self.colony_progress.lock().await.apply(&sealed);
        match transition {
            Some(ColonyTransition::Completed(id)) => {
                self.hives.set_colony_state(&id, crate::hierarchy::ColonyState::Completed).await;
                self.emit(&colony_id, None, EventType::ColonyCompleted, json!({"colony_id": id})).await
            }
            Some(ColonyTransition::Failed(id)) => {
                self.hives.set_colony_state(&id, crate::hierarchy::ColonyState::Failed).await;
                self.emit(&colony_id, None, EventType::ColonyFailed, json!({"colony_id": id})).await
            }
            None => Ok(()),
        }
    }

    /// Broadcasts `emergency_stop` over `scope`: emits
    /// `system.emergency_stop` on every hit Run, cancels its Agent
    /// Runners (via the registered `CancellationToken`), drops its
    /// undispatched tasks, and drives its projection to `aborted` via a
    /// terminal `run.aborted` event.
    pub async fn emergency_stop(&self, scope: Scope, reason: &str) -> Result<Vec<String>, HiveForgeError> {
        let hit_runs = self.emergency.stop(&scope).await;
        for run_id in &hit_runs {
            self.emit(run_id, Some(run_id), EventType::EmergencyStop, json!({"reason": reason})).await?;
            // Undispatched tasks are simply dropped: remove the run so no
            // further next_ready_task calls can dispatch from it.
            self.runs.lock().await.remove(run_id);
            self.emit(run_id, Some(run_id), EventType::RunAborted, json!({"reason": reason})).await?;
            self.watchdog.unregister_run(run_id).await;
            // Already removed from `emergency` by `stop()` itself? No —
            // `stop()` only cancels tokens, it doesn't unregister, so a
            // second emergency_stop call on the same scope would be a
            // harmless no-op rather than re-hitting this run.
            self.emergency.unregister_run(run_id).await;
        }
        Ok(hit_runs)
    }

    /// Replays a stream's events verbatim, for `GET /runs/{id}/events`.
    pub async fn events(&self, stream_key: &str) -> Result<Vec<SealedEvent>, HiveForgeError> {
        self.akashic.replay(&StreamId::parse(stream_key)?, None).await
    }

    /// Walks the parent graph of one event within a stream, for
    /// `GET /runs/{id}/events/{eid}/lineage`.
    pub async fn lineage(
        &self,
        stream_key: &str,
        event_id: &str,
        max_depth: usize,
    ) -> Result<LineageGraph, HiveForgeError> {
        let root = event_id
            .parse()
            .map_err(|_| HiveForgeError::validation(format!("invalid event id {event_id:?}")))?;
        let events = self.akashic.replay(&StreamId::parse(stream_key)?, None).await?;
        Ok(walk_lineage(root, &events, max_depth))
    }

    /// Reconstructs a Run's status for `GET /runs/{id}` by replaying its
    /// stream and looking for a terminal event; returns `None` if the
    /// stream has no `run.started` event at all.
    pub async fn run_snapshot(&self, run_id: &str) -> Result<Option<RunSnapshot>, HiveForgeError> {
        let events = self.akashic.replay(&StreamId::parse(run_id)?, None).await?;
        let Some(started) = events.iter().find(|e| e.event.event_type == EventType::RunStarted) else {
            return Ok(None);
        };
        let colony_id = started.event.payload.get("colony_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let goal = started.event.payload.get("goal").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let status = if events.iter().any(|e| e.event.event_type == EventType::RunAborted) {
            RunStatus::Aborted
        } else if events.iter().any(|e| e.event.event_type == EventType::RunFailed) {
            RunStatus::Failed
        } else if events.iter().any(|e| e.event.event_type == EventType::RunCompleted) {
            RunStatus::Completed
        } else {
            RunStatus::Running
        };
        Ok(Some(RunSnapshot { run_id: run_id.to_string(), colony_id, goal, status }))
    }

    pub async fn close_hive(&self, hive_id: &str) -> Result<(), HiveForgeError> {
        let forced = self.hives.close_hive(hive_id).await?;
        for completion in forced {
            self.emit(
                &completion.colony_id,
                None,
                EventType::ColonyCompleted,
                json!({"colony_id": completion.colony_id, "forced": true}),
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarming::ColonyTemplate;
    use tempfile::TempDir;

    async fn scheduler() -> (Scheduler, TempDir) {
        let dir = TempDir::new().unwrap();
        let akashic = Arc::new(Akashic::new(dir.path()));
        (Scheduler::new(akashic), dir)
    }

    #[tokio::test]
    async fn run_lifecycle_emits_started_then_completed() {
        let (scheduler, _dir) = scheduler().await;
        scheduler.hives.create_hive("h1", "hive").await;
        scheduler.hives.create_colony("h1", "c1", "colony", ColonyTemplate::BALANCED).await.unwrap();
        scheduler
            .start_run("r1", "c1", Some("h1"), "do the thing", vec![("t1".to_string(), "step".to_string(), vec![])])
            .await
            .unwrap();

        let task = scheduler.next_ready_task("r1").await.unwrap();
        assert_eq!(task, "t1");
        let ctx = scheduler.task_context("r1", "t1").await.unwrap();
        assert_eq!(ctx.original_goal, "do the thing");

        scheduler.complete_task("r1", "t1", "done".to_string(), vec![]).await.unwrap();
        assert!(scheduler.run_is_done("r1").await);
        scheduler.complete_run("r1").await.unwrap();

        let colony = scheduler.hives.get_colony("c1").await.unwrap();
        assert_eq!(colony.state, crate::hierarchy::ColonyState::Completed);

        let tail = scheduler.events("r1").await.unwrap();
        let types: Vec<_> = tail.iter().map(|e| e.event.event_type.as_str().to_string()).collect();
        assert_eq!(types, vec!["run.started", "task.created", "task.completed", "run.completed"]);
    }

    #[tokio::test]
    async fn create_hive_and_colony_emit_lifecycle_events() {
        let (scheduler, _dir) = scheduler().await;
        scheduler.create_hive("h1", "hive one").await.unwrap();
        scheduler.create_colony("h1", "c1", "colony one", Some("ship it"), None).await.unwrap();
        scheduler.start_colony("c1").await.unwrap();
        scheduler.complete_colony("c1").await.unwrap();

        assert_eq!(scheduler.events("h1").await.unwrap()[0].event.event_type.as_str(), "hive.created");
        let colony_tail = scheduler.events("c1").await.unwrap();
        let types: Vec<_> = colony_tail.iter().map(|e| e.event.event_type.as_str().to_string()).collect();
        assert_eq!(types, vec!["colony.created", "colony.started", "colony.completed"]);

        let colony = scheduler.hives.get_colony("c1").await.unwrap();
        assert_eq!(colony.state, crate::hierarchy::ColonyState::Completed);
    }

    #[tokio::test]
    async fn add_task_extends_a_running_run_and_is_dispatchable() {
        let (scheduler, _dir) = scheduler().await;
        scheduler.hives.create_hive("h1", "hive").await;
        scheduler.hives.create_colony("h1", "c1", "colony", ColonyTemplate::BALANCED).await.unwrap();
        scheduler.start_run("r1", "c1", Some("h1"), "goal", vec![]).await.unwrap();

        scheduler.add_task("r1", "t1", "first step", vec![]).await.unwrap();
        assert_eq!(scheduler.next_ready_task("r1").await, Some("t1".to_string()));

        let err = scheduler.add_task("missing-run", "t2", "x", vec![]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn lineage_walks_back_to_run_started() {
        let (scheduler, _dir) = scheduler().await;
        scheduler.hives.create_hive("h1", "hive").await;
        scheduler.hives.create_colony("h1", "c1", "colony", ColonyTemplate::BALANCED).await.unwrap();
        scheduler
            .start_run("r1", "c1", Some("h1"), "goal", vec![("t1".to_string(), "step".to_string(), vec![])])
            .await
            .unwrap();

        let tail = scheduler.events("r1").await.unwrap();
        let task_created = tail.iter().find(|e| e.event.event_type.as_str() == "task.created").unwrap();

        let graph = scheduler.lineage("r1", &task_created.event.id.to_string(), 10).await.unwrap();
        assert_eq!(graph.nodes.len(), 2); // task.created + its parent run.started
        assert!(!graph.truncated);
    }

    #[tokio::test]
    async fn emergency_stop_aborts_the_run_and_cancels_its_token() {
        let (scheduler, _dir) = scheduler().await;
        scheduler.hives.create_hive("h1", "hive").await;
        scheduler.hives.create_colony("h1", "c1", "colony", ColonyTemplate::BALANCED).await.unwrap();
        scheduler
            .start_run("r1", "c1", Some("h1"), "goal", vec![("t1".to_string(), "step".to_string(), vec![])])
            .await
            .unwrap();

        let hit = scheduler.emergency_stop(Scope::Run("r1".to_string()), "operator request").await.unwrap();
        assert_eq!(hit, vec!["r1".to_string()]);

        let tail = scheduler.akashic.replay(&StreamId::parse("r1").unwrap(), None).await.unwrap();
        let types: Vec<_> = tail.iter().map(|e| e.event.event_type.as_str().to_string()).collect();
        assert!(types.contains(&"system.emergency_stop".to_string()));
        assert!(types.ends_with(&["run.aborted".to_string()]));
    }

    #[tokio::test]
    async fn closing_hive_force_completes_and_emits_event() {
        let (scheduler, _dir) = scheduler().await;
        scheduler.hives.create_hive("h1", "hive").await;
        scheduler.hives.create_colony("h1", "c1", "colony", ColonyTemplate::BALANCED).await.unwrap();
        scheduler.hives.set_colony_state("c1", crate::hierarchy::ColonyState::Running).await;

        scheduler.close_hive("h1").await.unwrap();
        let colony = scheduler.hives.get_colony("c1").await.unwrap();
        assert_eq!(colony.state, crate::hierarchy::ColonyState::Completed);

        let tail = scheduler.akashic.replay(&StreamId::parse("c1").unwrap(), None).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event.event_type.as_str(), "colony.completed");
    }
}
