//! Tools the agent can invoke while answering a question.
//!
//! Each tool declares a JSON Schema for its parameters, enabling LLM function-calling.
//! Tools are registered in a [`ToolRegistry`] that generates OpenAI-format function
//! definitions and dispatches calls by name. Dispatch never fails: unknown tools, bad
//! arguments and capability failures all come back as an error payload the model can read.

pub mod employee_lookup;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::messages::{Message, ToolCallRequest};

pub use employee_lookup::EmployeeLookupTool;

/// Failure raised at the tool boundary. Converted into an error payload before it reaches
/// the conversation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The run stopped before this call was answered.
    #[error("tool call was not executed because the previous run stopped first")]
    Interrupted,
    #[error("{message}")]
    Capability { kind: &'static str, message: String },
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::Interrupted => "interrupted",
            ToolError::Capability { kind, .. } => *kind,
        }
    }
}

/// The result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolOutput {
    /// Successful structured output
    Json(Value),
    /// Tool execution failed
    Error { kind: String, message: String },
}

impl ToolOutput {
    /// Serialized payload stored as the tool message content.
    ///
    /// Errors use `{"error":{"kind":..,"message":..}}` so they can never be mistaken for a
    /// result array.
    pub fn to_payload(&self) -> String {
        match self {
            ToolOutput::Json(v) => v.to_string(),
            ToolOutput::Error { kind, message } => json!({
                "error": { "kind": kind, "message": message }
            })
            .to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutput::Json(_))
    }
}

impl From<ToolError> for ToolOutput {
    fn from(err: ToolError) -> Self {
        ToolOutput::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used in function-calling (e.g., "employee_lookup")
    fn name(&self) -> &str;

    /// Human-readable description shown to the LLM
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    ///
    /// This is used directly in OpenAI-format function definitions.
    fn parameters_schema(&self) -> Value;

    /// Validate `params` against the declared schema and run the tool.
    async fn execute(&self, params: Value) -> Result<Value, ToolError>;
}

/// OpenAI-format function definition for LLM function-calling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// OpenAI-format tool definition (wraps FunctionDef)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

/// Result of a tool call, ready to feed back to the LLM
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub name: String,
    pub output: ToolOutput,
}

impl ToolCallResult {
    /// Close a call that a stopped run left unanswered.
    pub fn interrupted(call: &ToolCallRequest) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: ToolError::Interrupted.into(),
        }
    }

    pub fn into_message(self) -> Message {
        Message::tool(self.call_id, self.name, self.output.to_payload())
    }
}

/// Thread-safe registry of tools available to the agent, keyed by name.
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::info!("Registered tool: {}", name);
        self.tools.write().await.insert(name, tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub async fn list_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Generate OpenAI-format tool definitions for all registered tools, sorted by name.
    pub async fn tool_definitions(&self) -> Vec<ToolDef> {
        let tools = self.tools.read().await;
        tools
            .values()
            .map(|tool| ToolDef {
                tool_type: "function".to_string(),
                function: FunctionDef {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                },
            })
            .collect()
    }

    /// Execute one tool call. Every failure is folded into the returned output.
    pub async fn execute_call(&self, call: &ToolCallRequest) -> ToolCallResult {
        let output = match self.get(&call.name).await {
            None => {
                tracing::warn!("Model requested unknown tool '{}'", call.name);
                ToolError::UnknownTool(call.name.clone()).into()
            }
            Some(tool) => match tool.execute(call.arguments.clone()).await {
                Ok(value) => ToolOutput::Json(value),
                Err(e) => {
                    tracing::warn!("Tool '{}' ({}) failed: {}", call.name, call.id, e);
                    e.into()
                }
            },
        };

        ToolCallResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output,
        }
    }

    /// Execute tool calls concurrently. Results come back in request order.
    pub async fn execute_calls(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        join_all(calls.iter().map(|call| self.execute_call(call))).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the input message"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "The message to echo" },
                    "delay_ms": { "type": "integer" }
                },
                "required": ["message"]
            })
        }

        async fn execute(&self, params: Value) -> Result<Value, ToolError> {
            let message = params["message"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("'message' is required".into()))?;
            if let Some(delay) = params["delay_ms"].as_u64() {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Ok(json!([message]))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _params: Value) -> Result<Value, ToolError> {
            Err(ToolError::Capability {
                kind: "retrieval_error",
                message: "connection refused".to_string(),
            })
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    async fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).await;
        registry.register(Arc::new(BrokenTool)).await;
        registry
    }

    #[tokio::test]
    async fn test_tool_definitions_are_sorted_openai_format() {
        let registry = registry().await;

        let defs = registry.tool_definitions().await;
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].function.name, "broken");
        assert_eq!(defs[1].function.name, "echo");

        let encoded = serde_json::to_value(&defs).unwrap();
        assert_eq!(encoded[1]["type"], "function");
        assert_eq!(encoded[1]["function"]["parameters"]["required"][0], "message");
    }

    #[tokio::test]
    async fn test_execute_echo_tool() {
        let registry = registry().await;

        let result = registry
            .execute_call(&call("c1", "echo", json!({ "message": "hello" })))
            .await;
        assert_eq!(result.call_id, "c1");
        assert!(result.output.is_success());
        assert_eq!(result.output.to_payload(), r#"["hello"]"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error_payload() {
        let registry = registry().await;

        let result = registry
            .execute_call(&call("c1", "nonexistent", json!({})))
            .await;
        assert!(!result.output.is_success());

        let payload: Value = serde_json::from_str(&result.output.to_payload()).unwrap();
        assert_eq!(payload["error"]["kind"], "unknown_tool");
        assert!(payload["error"]["message"]
            .as_str()
            .unwrap()
            .contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_and_capability_errors_are_absorbed() {
        let registry = registry().await;

        let invalid = registry.execute_call(&call("c1", "echo", json!({}))).await;
        assert_eq!(
            invalid.output,
            ToolOutput::Error {
                kind: "invalid_arguments".to_string(),
                message: "invalid arguments: 'message' is required".to_string(),
            }
        );

        let broken = registry.execute_call(&call("c2", "broken", json!({}))).await;
        let message = broken.into_message();
        assert_eq!(message.role(), "tool");
        let payload: Value = serde_json::from_str(message.content()).unwrap();
        assert_eq!(payload["error"]["kind"], "retrieval_error");
        assert_eq!(payload["error"]["message"], "connection refused");
    }

    #[test]
    fn test_interrupted_call_closes_with_error_payload() {
        let message =
            ToolCallResult::interrupted(&call("c9", "echo", json!({ "message": "hi" })))
                .into_message();

        assert_eq!(message.role(), "tool");
        let payload: Value = serde_json::from_str(message.content()).unwrap();
        assert_eq!(payload["error"]["kind"], "interrupted");
        assert_eq!(
            message,
            Message::tool("c9", "echo", ToolOutput::from(ToolError::Interrupted).to_payload())
        );
    }

    #[tokio::test]
    async fn test_concurrent_calls_keep_request_order() {
        let registry = registry().await;

        let calls = vec![
            call("slow", "echo", json!({ "message": "first", "delay_ms": 50 })),
            call("fast", "echo", json!({ "message": "second" })),
            call("missing", "nope", json!({})),
        ];
        let results = registry.execute_calls(&calls).await;

        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast", "missing"]);
        assert_eq!(results[0].output.to_payload(), r#"["first"]"#);
        assert!(!results[2].output.is_success());
    }
}
