//! Emergency stop (spec.md §4.9(e)): a broadcast cancellation over a
//! scope. Cancels every registered Run's `CancellationToken` under the
//! scope and reports which Runs were hit so the caller can emit
//! `system.emergency_stop` / `run.aborted` into the Akashic Record.

use hf_agent::CancellationToken;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Scope {
    Run(String),
    Colony(String),
    Hive(String),
    Global,
}

struct RegisteredRun {
    colony_id: Option<String>,
    hive_id: Option<String>,
    cancellation: CancellationToken,
}

#[derive(Default)]
pub struct EmergencyStopCoordinator {
    runs: Mutex<HashMap<String, RegisteredRun>>,
}

impl EmergencyStopCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_run(
        &self,
        run_id: &str,
        colony_id: Option<String>,
        hive_id: Option<String>,
        cancellation: CancellationToken,
    ) {
        self.runs.lock().await.insert(
            run_id.to_string(),
            RegisteredRun { colony_id, hive_id, cancellation },
        );
    }

    pub async fn unregister_run(&self, run_id: &str) {
        self.runs.lock().await.remove(run_id);
    }

    fn matches(run: &RegisteredRun, run_id: &str, scope: &Scope) -> bool {
        match scope {
            Scope::Run(id) => run_id == id,
            Scope::Colony(id) => run.colony_id.as_deref() == Some(id.as_str()),
            Scope::Hive(id) => run.hive_id.as_deref() == Some(id.as_str()),
            Scope::Global => true,
        }
    }

    /// Cancels every Run under `scope` and returns the run ids that were
    /// cancelled, for the caller to drive each one's projection to
    /// `aborted`. Already-unregistered (completed/aborted) Runs are
    /// silently skipped.
    pub async fn stop(&self, scope: &Scope) -> Vec<String> {
        let runs = self.runs.lock().await;
        let mut hit = Vec::new();
        for (run_id, run) in runs.iter() {
            if Self::matches(run, run_id, scope) {
                run.cancellation.cancel();
                hit.push(run_id.clone());
            }
        }
        hit
    }
}
