//! Projection Sinks (spec.md §4.10): idempotent consumers of the Akashic
//! Record tail. Each sink holds its own `last_applied_event_id` and
//! `synced_event_ids`; re-applying an already-synced event id is a no-op.
//! Sinks never write back into the Akashic Record.

pub mod activity_log;
pub mod webhook;

pub use activity_log::ActivityLogSink;
pub use webhook::WebhookSink;

use async_trait::async_trait;
use hf_core::SealedEvent;
use hf_error::HiveForgeError;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Applies one event. Implementations must be idempotent: re-applying
    /// an event id already recorded as synced is a no-op.
    async fn apply(&mut self, event: &SealedEvent) -> Result<(), HiveForgeError>;

    fn last_applied_event_id(&self) -> Option<String>;
}
