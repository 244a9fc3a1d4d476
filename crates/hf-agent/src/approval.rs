//! Parks a turn awaiting a human decision on a `REQUIRE_APPROVAL` tool
//! call. The turn resumes only when the matching approval event arrives
//! (spec.md §4.8 step 4b).

use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};

#[derive(Default)]
pub struct ApprovalGate {
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wait for `tool_call_id` and returns the receiver the
    /// turn loop awaits.
    pub async fn request(&self, tool_call_id: String) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(tool_call_id, tx);
        rx
    }

    /// Delivers an approval decision. Returns `true` if a waiter was
    /// found and notified, `false` if the call id was unknown (already
    /// resolved, or never requested).
    pub async fn resolve(&self, tool_call_id: &str, approved: bool) -> bool {
        if let Some(tx) = self.pending.lock().await.remove(tool_call_id) {
            tx.send(approved).is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_wakes_the_waiter() {
        let gate = ApprovalGate::new();
        let rx = gate.request("call-1".to_string()).await;
        assert!(gate.resolve("call-1", true).await);
        assert_eq!(rx.await, Ok(true));
    }

    #[tokio::test]
    async fn resolving_unknown_id_is_a_no_op() {
        let gate = ApprovalGate::new();
        assert!(!gate.resolve("missing", true).await);
    }
}
