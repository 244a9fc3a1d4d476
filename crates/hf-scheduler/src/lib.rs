//! Scheduler / Orchestrator (spec.md §4.9): owns the Hive/Colony/Run/Task
//! hierarchy and is the only component that writes lifecycle events into
//! the Akashic Record. Sub-mechanisms live in their own modules and are
//! composed by [`Scheduler`].

pub mod conference;
pub mod dispatch;
pub mod emergency;
pub mod escalation;
pub mod hierarchy;
pub mod messenger;
pub mod orchestrator;
pub mod swarming;
pub mod watchdog;
pub mod workerpool;

pub use conference::{ConferenceAgenda, ConferenceManager, ConferenceSession, ConferenceStatus, VoteSummary, VoteType};
pub use dispatch::{PredecessorResult, TaskContext, TaskGraph, TaskState};
pub use emergency::{EmergencyStopCoordinator, Scope};
pub use escalation::{Escalation, EscalationManager, EscalationSeverity, EscalationStatus, EscalationType};
pub use hierarchy::{ColonyRecord, ColonyState, ForcedCompletion, HiveRecord, HiveRegistry, HiveState};
pub use messenger::{InterColonyMessenger, MailboxMessage, Priority, ResourceLockTable};
pub use orchestrator::{RunSnapshot, RunStatus, Scheduler};
pub use swarming::{ColonyTemplate, SwarmingEngine, SwarmingFeatures, TemplateName};
pub use watchdog::SilenceWatchdog;
pub use workerpool::{WorkerPoolConfig, WorkerProcess, WorkerStatus, WorkerSupervisor};
