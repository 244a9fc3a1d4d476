pub mod models;
pub mod validate;

pub use models::{
    FieldError, MessageDirection, OpinionRequest, OpinionResponse, TaskAssignment, TaskResult,
    ValidationResult,
};
pub use validate::validate;

use hf_core::EventType;
use serde_json::{json, Value};

/// Picks the event type and payload a caller should append to the Akashic
/// Record for a given validation outcome (spec.md §4.7: "emits either
/// `waggle_dance.validated` or `waggle_dance.violation`").
pub fn validation_event(result: &ValidationResult) -> (EventType, Value) {
    let payload = json!({
        "direction": result.direction,
        "valid": result.valid,
        "errors": result.errors,
    });
    if result.valid {
        (EventType::WaggleDanceValidated, payload)
    } else {
        (EventType::WaggleDanceViolation, payload)
    }
}
