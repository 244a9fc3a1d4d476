//! Stateless validation middleware: each message is checked against the
//! schema fixed by its [`MessageDirection`] (spec.md §4.7). Validation
//! never halts the sender — a rejected message still produces a
//! `ValidationResult` the caller records as evidence.

use crate::models::{FieldError, MessageDirection, ValidationResult};
use serde_json::Value;

fn require_string(data: &Value, field: &str, errors: &mut Vec<FieldError>) {
    match data.get(field) {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::String(_)) => errors.push(FieldError {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        }),
        Some(_) => errors.push(FieldError {
            field: field.to_string(),
            message: "must be a string".to_string(),
        }),
        None => errors.push(FieldError {
            field: field.to_string(),
            message: "field required".to_string(),
        }),
    }
}

fn require_bool(data: &Value, field: &str, errors: &mut Vec<FieldError>) {
    match data.get(field) {
        Some(Value::Bool(_)) => {}
        Some(_) => errors.push(FieldError {
            field: field.to_string(),
            message: "must be a boolean".to_string(),
        }),
        None => errors.push(FieldError {
            field: field.to_string(),
            message: "field required".to_string(),
        }),
    }
}

fn optional_string_array(data: &Value, field: &str, errors: &mut Vec<FieldError>) {
    match data.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            if !items.iter().all(|v| v.is_string()) {
                errors.push(FieldError {
                    field: field.to_string(),
                    message: "all elements must be strings".to_string(),
                });
            }
        }
        Some(_) => errors.push(FieldError {
            field: field.to_string(),
            message: "must be an array of strings".to_string(),
        }),
    }
}

fn validate_opinion_request(data: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require_string(data, "colony_id", &mut errors);
    require_string(data, "question", &mut errors);
    errors
}

fn validate_opinion_response(data: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require_string(data, "colony_id", &mut errors);
    require_string(data, "answer", &mut errors);
    match data.get("confidence").and_then(Value::as_f64) {
        Some(c) if (0.0..=1.0).contains(&c) => {}
        Some(_) => errors.push(FieldError {
            field: "confidence".to_string(),
            message: "must be between 0.0 and 1.0".to_string(),
        }),
        None => errors.push(FieldError {
            field: "confidence".to_string(),
            message: "field required".to_string(),
        }),
    }
    errors
}

fn validate_task_assignment(data: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require_string(data, "task_id", &mut errors);
    require_string(data, "colony_id", &mut errors);
    require_string(data, "instructions", &mut errors);
    optional_string_array(data, "tools_allowed", &mut errors);
    errors
}

fn validate_task_result(data: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require_string(data, "task_id", &mut errors);
    require_string(data, "colony_id", &mut errors);
    require_bool(data, "success", &mut errors);
    require_string(data, "evidence", &mut errors);
    optional_string_array(data, "artifacts", &mut errors);
    errors
}

/// Validates `data` against the schema fixed by `direction`.
pub fn validate(direction: MessageDirection, data: &Value) -> ValidationResult {
    let errors = match direction {
        MessageDirection::BeekeeperToQueen => validate_opinion_request(data),
        MessageDirection::QueenToBeekeeper => validate_opinion_response(data),
        MessageDirection::QueenToWorker => validate_task_assignment(data),
        MessageDirection::WorkerToQueen => validate_task_result(data),
        MessageDirection::GuardResult => {
            return ValidationResult::rejected(
                direction,
                vec![FieldError {
                    field: "direction".to_string(),
                    message: "unsupported message direction".to_string(),
                }],
            );
        }
    };

    if errors.is_empty() {
        ValidationResult::ok(direction)
    } else {
        ValidationResult::rejected(direction, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opinion_request_accepts_minimal_payload() {
        let data = json!({"colony_id": "c1", "question": "proceed?"});
        let result = validate(MessageDirection::BeekeeperToQueen, &data);
        assert!(result.valid);
    }

    #[test]
    fn opinion_response_rejects_out_of_range_confidence() {
        let data = json!({"colony_id": "c1", "answer": "yes", "confidence": 1.5});
        let result = validate(MessageDirection::QueenToBeekeeper, &data);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "confidence");
    }

    #[test]
    fn task_assignment_requires_instructions() {
        let data = json!({"task_id": "t1", "colony_id": "c1"});
        let result = validate(MessageDirection::QueenToWorker, &data);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.field == "instructions"));
    }

    #[test]
    fn task_result_allows_missing_optional_error_message() {
        let data = json!({
            "task_id": "t1",
            "colony_id": "c1",
            "success": true,
            "evidence": "ran tests",
            "artifacts": ["report.txt"],
        });
        let result = validate(MessageDirection::WorkerToQueen, &data);
        assert!(result.valid);
    }

    #[test]
    fn guard_result_is_always_rejected() {
        let result = validate(MessageDirection::GuardResult, &json!({}));
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "direction");
    }

    #[test]
    fn wrong_type_reports_field_error() {
        let data = json!({"colony_id": "c1", "question": 5});
        let result = validate(MessageDirection::BeekeeperToQueen, &data);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.field == "question"));
    }
}
