//! Inter-colony messenger (spec.md §4.9(i)): a priority mailbox per
//! Colony plus a dead-simple resource lock table with a cycle-based
//! deadlock detector.

use hf_core::EventId;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone)]
pub struct MailboxMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub priority: Priority,
    pub correlation_id: Option<String>,
    pub payload: Value,
}

#[derive(Default)]
pub struct InterColonyMessenger {
    mailboxes: Mutex<HashMap<String, Vec<MailboxMessage>>>,
}

impl InterColonyMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn send(&self, from: &str, to: &str, priority: Priority, payload: Value) -> String {
        let id = EventId::new().to_string();
        let message = MailboxMessage {
            id: id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            priority,
            correlation_id: None,
            payload,
        };
        self.mailboxes.lock().await.entry(to.to_string()).or_default().push(message);
        id
    }

    pub async fn broadcast(&self, from: &str, targets: &[String], priority: Priority, payload: Value) -> Vec<String> {
        let mut ids = Vec::with_capacity(targets.len());
        for target in targets {
            ids.push(self.send(from, target, priority, payload.clone()).await);
        }
        ids
    }

    /// Pops the highest-priority message for `colony_id`, breaking ties
    /// in FIFO order.
    pub async fn receive(&self, colony_id: &str) -> Option<MailboxMessage> {
        let mut mailboxes = self.mailboxes.lock().await;
        let mailbox = mailboxes.get_mut(colony_id)?;
        let best_index = mailbox
            .iter()
            .enumerate()
            .max_by_key(|(i, m)| (m.priority, std::cmp::Reverse(*i)))
            .map(|(i, _)| i)?;
        Some(mailbox.remove(best_index))
    }

    pub async fn peek(&self, colony_id: &str) -> Option<MailboxMessage> {
        let mailboxes = self.mailboxes.lock().await;
        let mailbox = mailboxes.get(colony_id)?;
        mailbox
            .iter()
            .enumerate()
            .max_by_key(|(i, m)| (m.priority, std::cmp::Reverse(*i)))
            .map(|(_, m)| m.clone())
    }

    pub async fn respond(&self, original: &MailboxMessage, from: &str, payload: Value) -> String {
        let id = EventId::new().to_string();
        let message = MailboxMessage {
            id: id.clone(),
            from: from.to_string(),
            to: original.from.clone(),
            priority: original.priority,
            correlation_id: Some(original.id.clone()),
            payload,
        };
        self.mailboxes
            .lock()
            .await
            .entry(original.from.clone())
            .or_default()
            .push(message);
        id
    }
}

/// A dead-simple lock table: one holder per resource, tracking the
/// single resource each colony is currently waiting on.
#[derive(Default)]
pub struct ResourceLockTable {
    holders: Mutex<HashMap<String, String>>,
    waiting: Mutex<HashMap<String, String>>,
}

impl ResourceLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn try_acquire(&self, colony_id: &str, resource_id: &str) -> bool {
        let mut holders = self.holders.lock().await;
        match holders.get(resource_id) {
            None => {
                holders.insert(resource_id.to_string(), colony_id.to_string());
                self.waiting.lock().await.remove(colony_id);
                true
            }
            Some(holder) if holder == colony_id => true,
            Some(_) => {
                self.waiting.lock().await.insert(colony_id.to_string(), resource_id.to_string());
                false
            }
        }
    }

    pub async fn release(&self, colony_id: &str, resource_id: &str) {
        let mut holders = self.holders.lock().await;
        if holders.get(resource_id).map(String::as_str) == Some(colony_id) {
            holders.remove(resource_id);
        }
    }

    /// Walks the wait-for graph (colony -> holder of the resource it
    /// wants) looking for a cycle. Returns the cycle's colony ids if
    /// found.
    pub async fn detect_deadlock(&self) -> Option<Vec<String>> {
        let holders = self.holders.lock().await.clone();
        let waiting = self.waiting.lock().await.clone();

        let mut graph: HashMap<String, String> = HashMap::new();
        for (colony, resource) in &waiting {
            if let Some(holder) = holders.get(resource) {
                graph.insert(colony.clone(), holder.clone());
            }
        }

        for start in graph.keys() {
            let mut path = vec![start.clone()];
            let mut current = start.clone();
            loop {
                match graph.get(&current) {
                    Some(next) if next == start => return Some(path),
                    Some(next) if !path.contains(next) => {
                        path.push(next.clone());
                        current = next.clone();
                    }
                    _ => break,
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn higher_priority_is_received_first() {
        let messenger = InterColonyMessenger::new();
        messenger.send("c1", "c2", Priority::Low, json!("low")).await;
        messenger.send("c1", "c2", Priority::Urgent, json!("urgent")).await;
        messenger.send("c1", "c2", Priority::Normal, json!("normal")).await;

        let first = messenger.receive("c2").await.unwrap();
        assert_eq!(first.payload, json!("urgent"));
    }

    #[tokio::test]
    async fn ties_are_received_fifo() {
        let messenger = InterColonyMessenger::new();
        messenger.send("c1", "c2", Priority::Normal, json!("first")).await;
        messenger.send("c1", "c2", Priority::Normal, json!("second")).await;
        let first = messenger.receive("c2").await.unwrap();
        assert_eq!(first.payload, json!("first"));
    }

    #[tokio::test]
    async fn broadcast_delivers_to_all_targets() {
        let messenger = InterColonyMessenger::new();
        messenger
            .broadcast("c1", &["c2".to_string(), "c3".to_string()], Priority::High, json!("go"))
            .await;
        assert!(messenger.peek("c2").await.is_some());
        assert!(messenger.peek("c3").await.is_some());
    }

    #[tokio::test]
    async fn respond_carries_correlation_id() {
        let messenger = InterColonyMessenger::new();
        messenger.send("c1", "c2", Priority::Normal, json!("question")).await;
        let original = messenger.receive("c2").await.unwrap();
        messenger.respond(&original, "c2", json!("answer")).await;
        let reply = messenger.receive("c1").await.unwrap();
        assert_eq!(reply.correlation_id.as_deref(), Some(original.id.as_str()));
    }

    #[tokio::test]
    async fn two_colony_cycle_is_detected() {
        let table = ResourceLockTable::new();
        assert!(table.try_acquire("c1", "res-a").await);
        assert!(table.try_acquire("c2", "res-b").await);
        assert!(!table.try_acquire("c2", "res-a").await); // c2 waits on c1
        assert!(!table.try_acquire("c1", "res-b").await); // c1 waits on c2: cycle

        let cycle = table.detect_deadlock().await;
        assert!(cycle.is_some());
    }

    #[tokio::test]
    async fn no_cycle_when_waits_do_not_loop_back() {
        let table = ResourceLockTable::new();
        table.try_acquire("c1", "res-a").await;
        table.try_acquire("c2", "res-a").await; // c2 waits on c1, no cycle
        assert!(table.detect_deadlock().await.is_none());
    }

    #[tokio::test]
    async fn releasing_breaks_the_wait() {
        let table = ResourceLockTable::new();
        table.try_acquire("c1", "res-a").await;
        assert!(!table.try_acquire("c2", "res-a").await);
        table.release("c1", "res-a").await;
        assert!(table.try_acquire("c2", "res-a").await);
    }
}
