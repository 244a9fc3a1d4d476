//! The closed event-type catalogue. Unknown types on replay are preserved
//! as `EventType::Opaque` rather than rejected (spec.md §4.1 forward
//! compatibility rule).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! event_types {
    ($($variant:ident => $wire:literal),+ $(,)?) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum EventType {
            $($variant,)+
            /// Any type string not in the closed set. Forward-compatible:
            /// preserved verbatim, ignored by projections.
            Opaque(String),
        }

        impl EventType {
            pub fn as_str(&self) -> &str {
                match self {
                    $(EventType::$variant => $wire,)+
                    EventType::Opaque(s) => s.as_str(),
                }
            }

            fn from_wire(s: &str) -> EventType {
                match s {
                    $($wire => EventType::$variant,)+
                    other => EventType::Opaque(other.to_string()),
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, EventType::Opaque(_))
            }
        }
    };
}

event_types! {
    // Run
    RunStarted => "run.started",
    RunCompleted => "run.completed",
    RunFailed => "run.failed",
    RunAborted => "run.aborted",
    // Task
    TaskCreated => "task.created",
    TaskAssigned => "task.assigned",
    TaskProgressed => "task.progressed",
    TaskCompleted => "task.completed",
    TaskFailed => "task.failed",
    TaskBlocked => "task.blocked",
    TaskUnblocked => "task.unblocked",
    // Requirement
    RequirementCreated => "requirement.created",
    RequirementApproved => "requirement.approved",
    RequirementRejected => "requirement.rejected",
    // Hive / Colony
    HiveCreated => "hive.created",
    HiveClosed => "hive.closed",
    ColonyCreated => "colony.created",
    ColonyStarted => "colony.started",
    ColonyCompleted => "colony.completed",
    ColonyFailed => "colony.failed",
    // Decision
    DecisionRecorded => "decision.recorded",
    DecisionApplied => "decision.applied",
    // Waggle Dance
    WaggleDanceValidated => "waggle_dance.validated",
    WaggleDanceViolation => "waggle_dance.violation",
    // Conference / messenger / escalation
    ConferenceStarted => "conference.started",
    ConferenceOpinionCollected => "conference.opinion_collected",
    ConferenceConcluded => "conference.concluded",
    ConferenceCancelled => "conference.cancelled",
    MessengerSent => "messenger.sent",
    MessengerDelivered => "messenger.delivered",
    MessengerDeadlockDetected => "messenger.deadlock_detected",
    QueenEscalation => "queen.escalation",
    BeekeeperFeedback => "beekeeper.feedback",
    // LLM
    LlmRequest => "llm.request",
    LlmResponse => "llm.response",
    // Operation / approval
    OperationTimeout => "operation.timeout",
    OperationFailed => "operation.failed",
    ApprovalRequested => "approval.requested",
    ApprovalGranted => "approval.granted",
    ApprovalDenied => "approval.denied",
    // System
    Heartbeat => "system.heartbeat",
    Error => "system.error",
    SilenceDetected => "system.silence_detected",
    EmergencyStop => "system.emergency_stop",
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(EventType::from_wire(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_type_round_trips() {
        let t = EventType::RunStarted;
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"run.started\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn unknown_type_preserved_as_opaque() {
        let back: EventType = serde_json::from_str("\"future.thing\"").unwrap();
        assert_eq!(back, EventType::Opaque("future.thing".to_string()));
        assert!(!back.is_known());
    }
}
