//! Worker process management (spec.md §4.9(g)): start/stop/restart with a
//! bounded per-worker restart count, plus a fleet-level restart budget
//! added during the Rust port (SPEC_FULL.md §9 open question decision) so
//! a crash-looping fleet can't retry without limit even when each
//! individual worker is still under its own cap.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering::Relaxed};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Stopped,
    Running,
    Crashed,
}

#[async_trait]
pub trait WorkerProcess: Send + Sync {
    async fn start(&self) -> Result<(), String>;
    async fn health_check(&self) -> Result<(), String>;
    async fn stop(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub max_restarts_per_worker: u32,
    /// Open-question decision: caps the whole fleet's crash-restart rate
    /// independently of any one worker's own budget.
    pub max_fleet_restarts_per_minute: u32,
    pub auto_restart: bool,
    pub health_check_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfig {
            max_restarts_per_worker: 3,
            max_fleet_restarts_per_minute: 10,
            auto_restart: true,
            health_check_interval: Duration::from_secs(10),
        }
    }
}

struct WorkerEntry {
    restarts: AtomicU32,
    status: WorkerStatus,
}

/// Tracks fleet-wide restarts in a rolling minute window.
struct FleetRestartWindow {
    window_start: Instant,
    count: u32,
}

pub struct WorkerSupervisor {
    config: WorkerPoolConfig,
    workers: Mutex<HashMap<String, WorkerEntry>>,
    fleet_window: Mutex<FleetRestartWindow>,
}

impl WorkerSupervisor {
    pub fn new(config: WorkerPoolConfig) -> Self {
        WorkerSupervisor {
            config,
            workers: Mutex::new(HashMap::new()),
            fleet_window: Mutex::new(FleetRestartWindow {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    pub async fn start_worker(&self, id: &str, process: &dyn WorkerProcess) -> Result<(), String> {
        process.start().await?;
        self.workers.lock().await.insert(
            id.to_string(),
            WorkerEntry {
                restarts: AtomicU32::new(0),
                status: WorkerStatus::Running,
            },
        );
        Ok(())
    }

    pub async fn stop_worker(&self, id: &str, process: &dyn WorkerProcess) -> Result<(), String> {
        process.stop().await?;
        if let Some(entry) = self.workers.lock().await.get_mut(id) {
            entry.status = WorkerStatus::Stopped;
        }
        Ok(())
    }

    async fn fleet_budget_available(&self) -> bool {
        let mut window = self.fleet_window.lock().await;
        if window.window_start.elapsed() >= Duration::from_secs(60) {
            window.window_start = Instant::now();
            window.count = 0;
        }
        window.count < self.config.max_fleet_restarts_per_minute
    }

    async fn record_fleet_restart(&self) {
        let mut window = self.fleet_window.lock().await;
        window.count += 1;
    }

    /// Called when a worker's health check fails. Restarts it if
    /// `auto_restart` is on, the per-worker budget isn't exhausted, and
    /// the fleet-level budget has room this minute.
    pub async fn handle_crash(&self, id: &str, process: &dyn WorkerProcess) -> Result<bool, String> {
        if !self.config.auto_restart {
            self.mark_crashed(id).await;
            return Ok(false);
        }

        let restarts_used = {
            let workers = self.workers.lock().await;
            workers.get(id).map(|e| e.restarts.load(Relaxed)).unwrap_or(0)
        };
        if restarts_used >= self.config.max_restarts_per_worker {
            self.mark_crashed(id).await;
            return Ok(false);
        }
        if !self.fleet_budget_available().await {
            self.mark_crashed(id).await;
            return Ok(false);
        }

        process.start().await?;
        self.record_fleet_restart().await;
        let mut workers = self.workers.lock().await;
        let entry = workers.entry(id.to_string()).or_insert_with(|| WorkerEntry {
            restarts: AtomicU32::new(0),
            status: WorkerStatus::Stopped,
        });
        entry.restarts.fetch_add(1, Relaxed);
        entry.status = WorkerStatus::Running;
        Ok(true)
    }

    async fn mark_crashed(&self, id: &str) {
        if let Some(entry) = self.workers.lock().await.get_mut(id) {
            entry.status = WorkerStatus::Crashed;
        } else {
            self.workers.lock().await.insert(
                id.to_string(),
                WorkerEntry {
                    restarts: AtomicU32::new(0),
                    status: WorkerStatus::Crashed,
                },
            );
        }
    }

    pub async fn status_of(&self, id: &str) -> Option<WorkerStatus> {
        self.workers.lock().await.get(id).map(|e| e.status)
    }

    pub async fn restarts_of(&self, id: &str) -> u32 {
        self.workers
            .lock()
            .await
            .get(id)
            .map(|e| e.restarts.load(Relaxed))
            .unwrap_or(0)
    }
}
