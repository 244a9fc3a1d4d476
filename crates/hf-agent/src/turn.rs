//! The per-turn conversation loop (spec.md §4.8).

use crate::approval::ApprovalGate;
use crate::cancel::CancellationToken;
use crate::llm::{LlmClient, Message, ToolCall};
use crate::tool::ToolRegistry;
use hf_policy::{decide, Decision, PolicyGate, TrustLevel};

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Success(String),
    MaxIterationsExceeded,
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum AgentTurnEvent {
    ApprovalRequested { tool_call_id: String, tool_name: String },
    OperationTimeout { tool_call_id: String, tool_name: String },
    OperationFailed { tool_call_id: String, tool_name: String, failure_reason: String },
}

pub struct TurnConfig {
    pub system_prompt: String,
    pub max_iterations: u32,
    pub trust_level: TrustLevel,
}

/// Drives one agent turn to completion: assembles history, calls the LLM,
/// dispatches tool calls through the policy gate, and loops until the
/// model stops calling tools, the iteration budget is spent, or the
/// caller cancels.
pub async fn run_turn(
    llm: &dyn LlmClient,
    registry: &ToolRegistry,
    policy: &PolicyGate,
    approvals: &ApprovalGate,
    cancellation: &CancellationToken,
    config: &TurnConfig,
    mut history: Vec<Message>,
    user_input: &str,
    mut on_event: impl FnMut(AgentTurnEvent),
) -> Result<(TurnOutcome, Vec<Message>), String> {
    let mut messages = vec![Message::system(&config.system_prompt)];
    messages.append(&mut history);
    messages.push(Message::user(user_input));

    let mut iteration = 0u32;
    loop {
        if cancellation.is_cancelled() {
            return Ok((TurnOutcome::Cancelled, messages));
        }
        if iteration >= config.max_iterations {
            return Ok((TurnOutcome::MaxIterationsExceeded, messages));
        }
        iteration += 1;

        let tools = registry.specs();
        let response = tokio::select! {
            r = llm.chat(&messages, &tools) => r?,
            _ = cancellation.cancelled() => return Ok((TurnOutcome::Cancelled, messages)),
        };

        if response.tool_calls.is_empty() {
            let text = response.content.unwrap_or_default();
            messages.push(Message::assistant(text.clone(), Vec::new()));
            return Ok((TurnOutcome::Success(text), messages));
        }

        messages.push(Message::assistant(
            response.content.clone().unwrap_or_default(),
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            if cancellation.is_cancelled() {
                return Ok((TurnOutcome::Cancelled, messages));
            }
            if let Some(outcome) = dispatch_tool_call(
                registry,
                policy,
                approvals,
                cancellation,
                config.trust_level,
                call,
                &mut messages,
                &mut on_event,
            )
            .await?
            {
                return Ok((outcome, messages));
            }
        }
    }
}

/// Handles a single tool call. Returns `Some(outcome)` only when
/// cancellation interrupted the wait for approval, which ends the turn
/// immediately; otherwise appends a tool-result message and returns
/// `None` so the loop continues.
#[allow(clippy::too_many_arguments)]
async fn dispatch_tool_call(
    registry: &ToolRegistry,
    policy: &PolicyGate,
    approvals: &ApprovalGate,
    cancellation: &CancellationToken,
    trust_level: TrustLevel,
    call: &ToolCall,
    messages: &mut Vec<Message>,
    on_event: &mut impl FnMut(AgentTurnEvent),
) -> Result<Option<TurnOutcome>, String> {
    let Some(tool) = registry.get(&call.name) else {
        messages.push(Message::tool_result(&call.id, format!("unknown tool: {}", call.name)));
        return Ok(None);
    };

    let command_arg = call.arguments.get("command").and_then(|v| v.as_str());
    let action_class = policy.classifier.classify(&call.name, command_arg);
    match decide(action_class, trust_level, policy.strict_irreversible) {
        Decision::Deny => {
            messages.push(Message::tool_result(&call.id, "denied by policy"));
            return Ok(None);
        }
        Decision::RequireApproval => {
            on_event(AgentTurnEvent::ApprovalRequested {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
            });
            let receiver = approvals.request(call.id.clone()).await;
            let approved = tokio::select! {
                r = receiver => r.unwrap_or(false),
                _ = cancellation.cancelled() => return Ok(Some(TurnOutcome::Cancelled)),
            };
            if !approved {
                messages.push(Message::tool_result(&call.id, "approval denied"));
                return Ok(None);
            }
        }
        Decision::Allow => {}
    }

    match tokio::time::timeout(tool.timeout(), tool.execute(call.arguments.clone())).await {
        Err(_) => {
            on_event(AgentTurnEvent::OperationTimeout {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
            });
            messages.push(Message::tool_result(&call.id, "tool timed out"));
        }
        Ok(Err(reason)) => {
            on_event(AgentTurnEvent::OperationFailed {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                failure_reason: reason.clone(),
            });
            messages.push(Message::tool_result(&call.id, format!("tool failed: {reason}")));
        }
        Ok(Ok(value)) => {
            messages.push(Message::tool_result(&call.id, value.to_string()));
        }
    }
    Ok(None)
}
