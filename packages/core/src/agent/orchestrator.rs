//! Bounded tool loop
//!
//! Each step sends the conversation and the tool specs to the text provider.
//! Requested tool calls run in order against the registry and their results
//! are appended to the conversation. The loop ends when a step requests no
//! tools or the step limit is reached.
//!
//! The first step uses the caller's tool choice; later steps switch to
//! `Auto` so the model can finish.

use super::tools::ToolRegistry;
use super::trace::ToolTrace;
use crate::services::error::Result;
use pagetree_ai::{GenerationProvider, Message, TextRequest, ToolChoice};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    /// Text of the final step
    pub text: String,
    pub trace: ToolTrace,
    pub steps: usize,
}

pub async fn run_agent(
    provider: &dyn GenerationProvider,
    mut request: TextRequest,
    tools: &mut dyn ToolRegistry,
    max_steps: usize,
) -> Result<AgentRun> {
    request.tools = tools.specs();

    let mut trace = ToolTrace::new();
    let mut text = String::new();
    let mut steps = 0;

    while steps < max_steps {
        steps += 1;

        let started = Instant::now();
        let response = provider.generate_text(&request).await?;
        tracing::debug!(
            "Agent step {}/{} on {} ({}) took {:?}, {} tool call(s)",
            steps,
            max_steps,
            provider.name(),
            request.model,
            started.elapsed(),
            response.tool_calls.len()
        );

        text = response.text.clone();
        if response.tool_calls.is_empty() {
            break;
        }

        request.messages.push(Message::Assistant {
            text: response.text,
            tool_calls: response.tool_calls.clone(),
        });

        for call in &response.tool_calls {
            trace.record(call);
            let content = tools.call(call).await?;
            request.messages.push(Message::Tool {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content,
            });
        }

        request.tool_choice = ToolChoice::Auto;
    }

    if steps == max_steps {
        tracing::info!("Agent run stopped at the step limit of {}", max_steps);
    }

    Ok(AgentRun { text, trace, steps })
}
