//! Task planning and dispatch over a dependency graph (spec.md §4.9(c)).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredecessorResult {
    pub goal: String,
    pub output: String,
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub original_goal: String,
    pub run_id: String,
    pub current_task: String,
    pub predecessor_results: HashMap<String, PredecessorResult>,
}

#[derive(Debug, Clone)]
struct TaskNode {
    goal: String,
    depends_on: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Pending,
    Blocked,
    Completed,
    Failed,
}

/// Tracks a goal's dependency graph and drives which tasks become ready
/// as predecessors complete or fail.
pub struct TaskGraph {
    nodes: HashMap<String, TaskNode>,
    dependents: HashMap<String, Vec<String>>,
    ready: VecDeque<String>,
    pending: HashSet<String>,
    blocked: HashSet<String>,
    completed: HashMap<String, PredecessorResult>,
    failed: HashSet<String>,
}

impl TaskGraph {
    /// `tasks` is `(task_id, goal, depends_on)`.
    pub fn new(tasks: Vec<(String, String, Vec<String>)>) -> Self {
        let mut nodes = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for (id, goal, depends_on) in &tasks {
            for dep in depends_on {
                dependents.entry(dep.clone()).or_default().push(id.clone());
            }
            nodes.insert(
                id.clone(),
                TaskNode {
                    goal: goal.clone(),
                    depends_on: depends_on.iter().cloned().collect(),
                },
            );
        }

        let mut ready = VecDeque::new();
        let mut pending = HashSet::new();
        for (id, node) in &nodes {
            if node.depends_on.is_empty() {
                ready.push_back(id.clone());
            } else {
                pending.insert(id.clone());
            }
        }

        TaskGraph {
            nodes,
            dependents,
            ready,
            pending,
            blocked: HashSet::new(),
            completed: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    pub fn state_of(&self, task_id: &str) -> Option<TaskState> {
        if self.completed.contains_key(task_id) {
            Some(TaskState::Completed)
        } else if self.failed.contains(task_id) {
            Some(TaskState::Failed)
        } else if self.blocked.contains(task_id) {
            Some(TaskState::Blocked)
        } else if self.pending.contains(task_id) {
            Some(TaskState::Pending)
        } else if self.ready.contains(&task_id.to_string()) {
            Some(TaskState::Ready)
        } else {
            None
        }
    }

    /// Pops the next ready task id, if any.
    pub fn next_ready(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    pub fn is_done(&self) -> bool {
        self.ready.is_empty() && self.pending.is_empty()
    }

    pub fn build_context(&self, task_id: &str, run_id: &str, original_goal: &str) -> TaskContext {
        let node = &self.nodes[task_id];
        let predecessor_results = node
            .depends_on
            .iter()
            .filter_map(|dep| self.completed.get(dep).map(|r| (dep.clone(), r.clone())))
            .collect();
        TaskContext {
            original_goal: original_goal.to_string(),
            run_id: run_id.to_string(),
            current_task: task_id.to_string(),
            predecessor_results,
        }
    }

    /// Marks `task_id` completed and promotes any dependents whose
    /// remaining dependencies are now all satisfied.
    pub fn complete_task(&mut self, task_id: &str, output: String, artifacts: Vec<String>) {
        let goal = self.nodes.get(task_id).map(|n| n.goal.clone()).unwrap_or_default();
        self.completed.insert(
            task_id.to_string(),
            PredecessorResult { goal, output, artifacts },
        );
        let Some(dependents) = self.dependents.get(task_id).cloned() else {
            return;
        };
        for dependent in dependents {
            if !self.pending.contains(&dependent) {
                continue;
            }
            let satisfied = self.nodes[&dependent]
                .depends_on
                .iter()
                .all(|dep| self.completed.contains_key(dep));
            if satisfied {
                self.pending.remove(&dependent);
                self.ready.push_back(dependent);
            }
        }
    }

    /// Adds a task to a graph already in flight (spec.md §6 `POST
    /// /runs/{id}/tasks`): becomes ready immediately if every dependency is
    /// already completed, pending otherwise.
    pub fn add_task(&mut self, task_id: String, goal: String, depends_on: Vec<String>) {
        for dep in &depends_on {
            self.dependents.entry(dep.clone()).or_default().push(task_id.clone());
        }
        let ready_now = depends_on.iter().all(|dep| self.completed.contains_key(dep));
        self.nodes.insert(
            task_id.clone(),
            TaskNode { goal, depends_on: depends_on.into_iter().collect() },
        );
        if ready_now {
            self.ready.push_back(task_id);
        } else {
            self.pending.insert(task_id);
        }
    }

    /// Marks `task_id` failed, and every transitive dependent `blocked`
    /// (not `pending`) since their dependency can never complete. Returns
    /// the ids newly marked `blocked`, so the caller can emit one
    /// `task.blocked` event per id.
    pub fn fail_task(&mut self, task_id: &str) -> Vec<String> {
        self.failed.insert(task_id.to_string());
        let mut newly_blocked = Vec::new();
        let mut queue = VecDeque::new();
        if let Some(direct) = self.dependents.get(task_id).cloned() {
            queue.extend(direct);
        }
        while let Some(dependent) = queue.pop_front() {
            if self.blocked.contains(&dependent) {
                continue;
            }
            self.pending.remove(&dependent);
            self.blocked.insert(dependent.clone());
            newly_blocked.push(dependent.clone());
            if let Some(next) = self.dependents.get(&dependent).cloned() {
                queue.extend(next);
            }
        }
        newly_blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> TaskGraph {
        TaskGraph::new(vec![
            ("a".to_string(), "do a".to_string(), vec![]),
            ("b".to_string(), "do b".to_string(), vec!["a".to_string()]),
            ("c".to_string(), "do c".to_string(), vec!["b".to_string()]),
        ])
    }

    #[test]
    fn root_tasks_start_ready() {
        let graph = linear_graph();
        assert_eq!(graph.state_of("a"), Some(TaskState::Ready));
        assert_eq!(graph.state_of("b"), Some(TaskState::Pending));
    }

    #[test]
    fn completing_a_task_promotes_its_dependent() {
        let mut graph = linear_graph();
        graph.next_ready(); // a
        graph.complete_task("a", "done".to_string(), vec![]);
        assert_eq!(graph.state_of("b"), Some(TaskState::Ready));
    }

    #[test]
    fn context_carries_predecessor_results() {
        let mut graph = linear_graph();
        graph.next_ready();
        graph.complete_task("a", "output-a".to_string(), vec!["artifact.txt".to_string()]);
        let ctx = graph.build_context("b", "run-1", "overall goal");
        let pred = &ctx.predecessor_results["a"];
        assert_eq!(pred.output, "output-a");
        assert_eq!(pred.artifacts, vec!["artifact.txt".to_string()]);
    }

    #[test]
    fn failing_a_task_blocks_transitive_dependents() {
        let mut graph = linear_graph();
        graph.fail_task("a");
        assert_eq!(graph.state_of("b"), Some(TaskState::Blocked));
        assert_eq!(graph.state_of("c"), Some(TaskState::Blocked));
    }

    #[test]
    fn added_task_with_no_deps_is_ready_immediately() {
        let mut graph = linear_graph();
        graph.add_task("d".to_string(), "do d".to_string(), vec![]);
        assert_eq!(graph.state_of("d"), Some(TaskState::Ready));
    }

    #[test]
    fn added_task_depending_on_completed_work_is_ready_immediately() {
        let mut graph = linear_graph();
        graph.next_ready(); // a
        graph.complete_task("a", "done".to_string(), vec![]);
        graph.add_task("d".to_string(), "do d".to_string(), vec!["a".to_string()]);
        assert_eq!(graph.state_of("d"), Some(TaskState::Ready));
    }

    #[test]
    fn added_task_depending_on_incomplete_work_is_pending() {
        let mut graph = linear_graph();
        graph.add_task("d".to_string(), "do d".to_string(), vec!["a".to_string()]);
        assert_eq!(graph.state_of("d"), Some(TaskState::Pending));
    }

    #[test]
    fn graph_with_multiple_deps_waits_for_all() {
        let mut graph = TaskGraph::new(vec![
            ("a".to_string(), "a".to_string(), vec![]),
            ("b".to_string(), "b".to_string(), vec![]),
            ("c".to_string(), "c".to_string(), vec!["a".to_string(), "b".to_string()]),
        ]);
        graph.complete_task("a", "oa".to_string(), vec![]);
        assert_eq!(graph.state_of("c"), Some(TaskState::Pending));
        graph.complete_task("b", "ob".to_string(), vec![]);
        assert_eq!(graph.state_of("c"), Some(TaskState::Ready));
    }
}
