//! Event model for the HiveForge orchestration nucleus: typed events,
//! canonical serialisation, SHA-256 content hashing, and the prev-hash
//! chain primitive every other crate builds on.

pub mod canon;
pub mod event;
pub mod event_type;
pub mod id;
pub mod stream;

pub use event::{new_event, Event, SealedEvent};
pub use event_type::EventType;
pub use id::EventId;
pub use stream::StreamId;
