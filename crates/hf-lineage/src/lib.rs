//! Lineage Resolver: computes `parents` for an outbound event when the
//! caller did not supply one explicitly (spec.md §4.4). Explicit `parents`
//! always win; unknown-parent cases yield `[]` rather than failing.

use hf_core::{Event, EventId, EventType, SealedEvent};
use serde::Serialize;

/// Resolves `parents` for `event` against `prior_events` (same-stream
/// history, in append order). If `event.parents` is already non-empty it is
/// returned unchanged.
pub fn resolve_parents(event: &Event, prior_events: &[SealedEvent]) -> Vec<EventId> {
    if !event.parents.is_empty() {
        return event.parents.clone();
    }

    match &event.event_type {
        EventType::RunStarted => Vec::new(),

        EventType::RunCompleted => {
            let mut completed: Vec<&SealedEvent> = prior_events
                .iter()
                .filter(|e| {
                    matches!(e.event.event_type, EventType::TaskCompleted)
                        && e.event.run_id == event.run_id
                })
                .collect();
            completed.sort_by_key(|e| e.event.id);
            completed.into_iter().map(|e| e.event.id).collect()
        }

        EventType::TaskCreated => prior_events
            .iter()
            .filter(|e| {
                matches!(e.event.event_type, EventType::RunStarted) && e.event.run_id == event.run_id
            })
            .map(|e| e.event.id)
            .collect(),

        EventType::TaskAssigned
        | EventType::TaskProgressed
        | EventType::TaskCompleted
        | EventType::TaskFailed => prior_events
            .iter()
            .filter(|e| {
                matches!(e.event.event_type, EventType::TaskCreated) && e.event.task_id == event.task_id
            })
            .map(|e| e.event.id)
            .collect(),

        EventType::DecisionApplied => {
            let decision_id = event.payload.get("decision_id").and_then(|v| v.as_str());
            match decision_id {
                Some(id) => prior_events
                    .iter()
                    .filter(|e| {
                        matches!(e.event.event_type, EventType::DecisionRecorded)
                            && e.event.payload.get("decision_id").and_then(|v| v.as_str()) == Some(id)
                    })
                    .map(|e| e.event.id)
                    .collect(),
                None => Vec::new(),
            }
        }

        _ => Vec::new(),
    }
}

/// A node in the breadth-first lineage walk: the event's own ID, its
/// direct parents, bounded by `max_depth` to avoid pathological chains
/// (spec.md §9 "Parent graphs are DAGs, not trees").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageGraph {
    pub root: EventId,
    /// (event_id, parents) pairs in BFS discovery order.
    pub nodes: Vec<(EventId, Vec<EventId>)>,
    pub truncated: bool,
}

/// Walks the parent graph of `root` breadth-first over `events` (indexed by
/// ID), bounding traversal to `max_depth` hops.
pub fn walk_lineage(root: EventId, events: &[SealedEvent], max_depth: usize) -> LineageGraph {
    use std::collections::{HashSet, VecDeque};

    let by_id: std::collections::HashMap<EventId, &SealedEvent> =
        events.iter().map(|e| (e.event.id, e)).collect();

    let mut visited: HashSet<EventId> = HashSet::new();
    let mut queue: VecDeque<(EventId, usize)> = VecDeque::new();
    let mut nodes = Vec::new();
    let mut truncated = false;

    visited.insert(root);
    queue.push_back((root, 0));

    while let Some((id, depth)) = queue.pop_front() {
        let parents = by_id
            .get(&id)
            .map(|e| e.event.parents.clone())
            .unwrap_or_default();
        nodes.push((id, parents.clone()));

        if depth >= max_depth {
            if !parents.is_empty() {
                truncated = true;
            }
            continue;
        }
        for parent in parents {
            if visited.insert(parent) {
                queue.push_back((parent, depth + 1));
            }
        }
    }

    LineageGraph {
        root,
        nodes,
        truncated,
    }
}
