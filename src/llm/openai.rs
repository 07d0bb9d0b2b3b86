//! OpenAI-compatible chat completions client with function calling.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatModel, ModelReply, ModelRequest, RawToolCall};
use crate::config::AgentConfig;
use crate::messages::Message;

/// Chat message in the provider's wire format.
#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

/// Tool call as returned by the provider. Some servers omit the id or send arguments as an
/// object instead of a JSON string.
#[derive(Debug, Deserialize)]
struct IncomingToolCall {
    #[serde(default)]
    id: Option<String>,
    function: IncomingFunctionCall,
}

#[derive(Debug, Deserialize)]
struct IncomingFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Clone)]
pub struct OpenAiChatModel {
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(
        api_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for chat model")?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 2048,
            client,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let mut model = Self::new(
            config.llm_api_url.clone(),
            config.llm_model.clone(),
            config.llm_api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        model.temperature = config.temperature;
        model.max_tokens = config.max_tokens;
        Ok(model)
    }

    fn wire_messages(system_prompt: &str, history: &[Message]) -> Vec<WireMessage> {
        let mut wire = Vec::with_capacity(history.len() + 1);
        wire.push(WireMessage {
            role: "system",
            content: Some(system_prompt.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });

        for message in history {
            let entry = match message {
                Message::User { content } => WireMessage {
                    role: "user",
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Message::Assistant {
                    content,
                    tool_calls,
                } => WireMessage {
                    role: "assistant",
                    content: if content.is_empty() && !tool_calls.is_empty() {
                        None
                    } else {
                        Some(content.clone())
                    },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            tool_calls
                                .iter()
                                .map(|call| WireToolCall {
                                    id: call.id.clone(),
                                    call_type: "function",
                                    function: WireFunctionCall {
                                        name: call.name.clone(),
                                        arguments: match &call.arguments {
                                            Value::String(raw) => raw.clone(),
                                            other => other.to_string(),
                                        },
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: None,
                },
                Message::Tool {
                    tool_call_id,
                    content,
                    ..
                } => WireMessage {
                    role: "tool",
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                },
            };
            wire.push(entry);
        }

        wire
    }

    fn parse_reply(response_json: &Value) -> Result<ModelReply> {
        let choice = response_json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("Empty choices in LLM response")?;

        let message = &choice["message"];
        let content = message["content"].as_str().map(String::from);

        let tool_calls = match message.get("tool_calls") {
            Some(Value::Null) | None => Vec::new(),
            Some(raw) => serde_json::from_value::<Vec<IncomingToolCall>>(raw.clone())
                .context("Malformed tool_calls in LLM response")?
                .into_iter()
                .map(|call| RawToolCall {
                    id: call.id.filter(|id| !id.trim().is_empty()),
                    name: call.function.name,
                    arguments: match call.function.arguments {
                        Value::String(raw) => raw,
                        Value::Null => "{}".to_string(),
                        other => other.to_string(),
                    },
                })
                .collect(),
        };

        Ok(ModelReply {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        let url = format!("{}/chat/completions", self.api_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::wire_messages(request.system_prompt, request.messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        // Only include tools if we have any
        if !request.tools.is_empty() {
            body["tools"] = serde_json::to_value(request.tools)?;
        }

        let mut req = self.client.post(&url).json(&body);

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await.context("Failed to send LLM request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, body);
        }

        let response_json: Value = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        Self::parse_reply(&response_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolCallRequest;
    use crate::tools::{FunctionDef, ToolDef};
    use httpmock::prelude::*;
    use serde_json::json;

    fn lookup_def() -> ToolDef {
        ToolDef {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: "employee_lookup".to_string(),
                description: "Gathers employee details from the HR database".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
        }
    }

    fn model_for(server: &MockServer) -> OpenAiChatModel {
        OpenAiChatModel::new(
            server.base_url(),
            "test-model",
            Some("sk-test".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn wire_format_puts_system_first_and_keeps_tool_pairing() {
        let history = vec![
            Message::user("Where does Jane work?"),
            Message::assistant_with_calls(
                "",
                vec![ToolCallRequest {
                    id: "call_1".to_string(),
                    name: "employee_lookup".to_string(),
                    arguments: json!({ "query": "Jane" }),
                }],
            ),
            Message::tool("call_1", "employee_lookup", "[]"),
        ];

        let wire = serde_json::to_value(OpenAiChatModel::wire_messages("sys", &history)).unwrap();
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "sys");
        assert_eq!(wire[1]["role"], "user");
        assert!(wire[2].get("content").is_none());
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            wire[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"Jane"}"#
        );
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn parse_reply_accepts_object_arguments_and_missing_ids() {
        let reply = OpenAiChatModel::parse_reply(&json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "type": "function",
                        "function": { "name": "employee_lookup", "arguments": { "query": "Jane" } }
                    }]
                }
            }]
        }))
        .unwrap();

        assert_eq!(reply.content, None);
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, None);
        assert_eq!(reply.tool_calls[0].arguments, r#"{"query":"Jane"}"#);
    }

    #[test]
    fn parse_reply_rejects_empty_choices() {
        assert!(OpenAiChatModel::parse_reply(&json!({ "choices": [] })).is_err());
    }

    #[tokio::test]
    async fn invoke_sends_tools_and_parses_tool_calls() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("Authorization", "Bearer sk-test")
                    .body_contains("employee_lookup")
                    .body_contains("\"role\":\"system\"");
                then.status(200).json_body(json!({
                    "id": "resp1",
                    "choices": [{
                        "index": 0,
                        "message": {
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "id": "call_abc",
                                "type": "function",
                                "function": {
                                    "name": "employee_lookup",
                                    "arguments": "{\"query\":\"Jane Doe department\"}"
                                }
                            }]
                        },
                        "finish_reason": "tool_calls"
                    }]
                }));
            })
            .await;

        let model = model_for(&server);
        let history = vec![Message::user("What is Jane Doe's department?")];
        let tools = vec![lookup_def()];
        let reply = model
            .invoke(ModelRequest {
                system_prompt: "You are a helpful AI assistant",
                messages: &history,
                tools: &tools,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id.as_deref(), Some("call_abc"));
        assert_eq!(reply.tool_calls[0].name, "employee_lookup");
    }

    #[tokio::test]
    async fn invoke_surfaces_http_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let model = model_for(&server);
        let history = vec![Message::user("hi")];
        let err = model
            .invoke(ModelRequest {
                system_prompt: "sys",
                messages: &history,
                tools: &[],
            })
            .await
            .unwrap_err();
        let text = format!("{:#}", err);
        assert!(text.contains("503"), "unexpected error: {}", text);
        assert!(text.contains("overloaded"));
    }
}
