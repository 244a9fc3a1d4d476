//! Deterministic projections: folds of event streams into current-state
//! views (spec.md §4.3). No projection consults wall-clock time or external
//! I/O; replaying the same events always yields an equivalent state.

pub mod colony;
pub mod hive;
pub mod run;

pub use colony::{ColonyProgressTracker, ColonyState, ColonyTransition};
pub use hive::{ColonyEntry, ColonyLifecycle, HiveProjection, HiveState};
pub use run::{RequirementProjection, RequirementState, RunProjection, RunState, TaskProjection, TaskState};
