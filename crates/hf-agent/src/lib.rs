pub mod approval;
pub mod cancel;
pub mod llm;
pub mod tool;
pub mod turn;

pub use approval::ApprovalGate;
pub use cancel::CancellationToken;
pub use llm::{LlmClient, LlmResponse, Message, Role, ToolCall, ToolSpec};
pub use tool::{Tool, ToolRegistry};
pub use turn::{run_turn, AgentTurnEvent, TurnConfig, TurnOutcome};
