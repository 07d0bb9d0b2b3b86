//! Conversation history model.
//!
//! A [`ConversationState`] is an append-only log of [`Message`]s. Tool messages may only be
//! appended while the call id they answer is still pending, which keeps every tool result
//! paired with exactly one request from an assistant turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Prefix the system preamble asks the model to use once it considers the answer complete.
/// Advisory only: termination is decided by the absence of tool calls.
pub const FINAL_ANSWER_MARKER: &str = "FINAL ANSWER";

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments. Arguments that were not valid JSON are kept as a raw string.
    pub arguments: Value,
}

/// One conversation turn, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        #[serde(default)]
        name: String,
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Tool call requests carried by an assistant message; empty for other roles.
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("tool message answers call '{call_id}' which is not pending")]
    OrphanToolMessage { call_id: String },
}

/// Ordered, append-only conversation history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from stored messages, re-checking the tool pairing invariant.
    pub fn try_from_messages(messages: Vec<Message>) -> Result<Self, HistoryError> {
        let mut state = Self::new();
        for message in messages {
            state.push(message)?;
        }
        Ok(state)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message. Tool messages must answer a pending call.
    pub fn push(&mut self, message: Message) -> Result<(), HistoryError> {
        if let Message::Tool { tool_call_id, .. } = &message {
            let pending = self
                .pending_tool_calls()
                .iter()
                .any(|call| &call.id == tool_call_id);
            if !pending {
                return Err(HistoryError::OrphanToolMessage {
                    call_id: tool_call_id.clone(),
                });
            }
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn extend<I>(&mut self, messages: I) -> Result<(), HistoryError>
    where
        I: IntoIterator<Item = Message>,
    {
        for message in messages {
            self.push(message)?;
        }
        Ok(())
    }

    /// Requests emitted by assistant messages that no tool message has answered yet,
    /// in the order they were requested.
    pub fn pending_tool_calls(&self) -> Vec<&ToolCallRequest> {
        let mut pending: Vec<&ToolCallRequest> = Vec::new();
        for message in &self.messages {
            match message {
                Message::Assistant { tool_calls, .. } => pending.extend(tool_calls.iter()),
                Message::Tool { tool_call_id, .. } => {
                    pending.retain(|call| &call.id != tool_call_id);
                }
                Message::User { .. } => {}
            }
        }
        pending
    }

    /// True when `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &ConversationState) -> bool {
        other.messages.starts_with(&self.messages)
    }
}

/// Whether a model reply carries the advisory completion marker.
pub fn has_final_answer_marker(content: &str) -> bool {
    content.trim_start().starts_with(FINAL_ANSWER_MARKER)
}
