//! Language-model capability boundary.
//!
//! The agent loop only sees [`ChatModel`]; the concrete OpenAI-compatible HTTP client lives
//! in [`openai`].

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::messages::Message;
use crate::tools::ToolDef;

pub use openai::OpenAiChatModel;

/// Everything one model call needs: the rendered system preamble, the ordered history and
/// the tools the model may request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDef],
}

/// A tool call exactly as the provider returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    pub id: Option<String>,
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// The assistant turn produced by a model call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<RawToolCall>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, used for logging.
    fn name(&self) -> &str;

    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply>;
}
