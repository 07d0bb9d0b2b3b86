//! Model invocation step: render the preamble, call the model, normalise its reply into an
//! assistant message.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashSet;

use crate::llm::{ChatModel, ModelReply, ModelRequest};
use crate::messages::{ConversationState, Message, ToolCallRequest, FINAL_ANSWER_MARKER};
use crate::tools::ToolDef;

/// System preamble sent ahead of the history on every model call. Deterministic for a given
/// tool list, system message and timestamp.
pub fn render_system_prompt(
    tool_names: &[String],
    system_message: &str,
    now: DateTime<Utc>,
) -> String {
    format!(
        "You are a helpful AI assistant, collaborating with other assistants. \
         Use the provided tools to progress towards answering the question. \
         If you are unable to fully answer, that's OK, another assistant with different tools \
         will help where you left off. Execute what you can to make progress. \
         If you or any of the other assistants have the final answer or deliverable, \
         prefix your response with {marker} so the team knows to stop. \
         You have access to the following tools: {tools}.\n{system_message}\nCurrent time: {time}.",
        marker = FINAL_ANSWER_MARKER,
        tools = tool_names.join(", "),
        system_message = system_message,
        time = now.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Run one model call over the full history and return the assistant message to append.
pub(crate) async fn invoke_model(
    model: &dyn ChatModel,
    system_prompt: &str,
    history: &ConversationState,
    tools: &[ToolDef],
) -> Result<Message> {
    let reply = model
        .invoke(ModelRequest {
            system_prompt,
            messages: history.messages(),
            tools,
        })
        .await
        .with_context(|| format!("model '{}' invocation failed", model.name()))?;

    assistant_from_reply(reply)
}

/// Give every tool call a unique id and parsed arguments.
///
/// Missing ids are generated. A reply that reuses an id is a protocol error. Arguments that
/// are not valid JSON are kept as a raw string so dispatch reports them as invalid.
pub(crate) fn assistant_from_reply(reply: ModelReply) -> Result<Message> {
    let mut seen = HashSet::new();
    let mut tool_calls = Vec::with_capacity(reply.tool_calls.len());

    for raw in reply.tool_calls {
        let id = raw
            .id
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
        if !seen.insert(id.clone()) {
            anyhow::bail!("model returned duplicate tool call id '{}'", id);
        }

        let arguments = if raw.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(&raw.arguments) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse arguments for tool '{}' ({}): {}",
                        raw.name,
                        id,
                        e
                    );
                    Value::String(raw.arguments)
                }
            }
        };

        tool_calls.push(ToolCallRequest {
            id,
            name: raw.name,
            arguments,
        });
    }

    Ok(Message::assistant_with_calls(
        reply.content.unwrap_or_default(),
        tool_calls,
    ))
}
