//! Agent loop driver.
//!
//! A run walks an explicit state machine:
//! 1. `Start`: load the thread checkpoint, close any tool calls an earlier run left
//!    unanswered, and append the user query
//! 2. `Agent`: call the model over the full history
//! 3. `Tools`: execute every tool call of the latest assistant message, then back to `Agent`
//! 4. `End`: return the final assistant text
//!
//! The full history is checkpointed after every transition, so a run that is dropped between
//! steps can be resumed from the last completed one.

pub mod error;
pub mod locks;
pub mod routing;
pub mod step;


use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::checkpoint::CheckpointStore;
use crate::llm::ChatModel;
use crate::messages::{ConversationState, HistoryError, Message, ToolCallRequest};
use crate::tools::{ToolCallResult, ToolRegistry};

pub use error::RunError;
use locks::ThreadLocks;
use routing::Decision;

#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Maximum number of `Agent` + `Tools` steps in one run.
    pub recursion_limit: usize,
    /// Appended to the system preamble.
    pub system_message: String,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            recursion_limit: 15,
            system_message: "You are helpful HR Chatbot Agent.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    Start,
    Agent,
    Tools,
    End,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    options: AgentOptions,
    locks: ThreadLocks,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
        options: AgentOptions,
    ) -> Self {
        Self {
            model,
            tools,
            checkpoints,
            options,
            locks: ThreadLocks::new(),
        }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Answer `query` within the conversation named by `thread_id`.
    pub async fn run(&self, query: &str, thread_id: &str) -> Result<String, RunError> {
        self.run_at(query, thread_id, Utc::now()).await
    }

    /// Like [`Agent::run`], with the preamble timestamp supplied by the caller.
    pub async fn run_at(
        &self,
        query: &str,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, RunError> {
        if query.trim().is_empty() {
            return Err(RunError::InvalidInput("query must not be empty".to_string()));
        }
        if thread_id.trim().is_empty() {
            return Err(RunError::InvalidInput(
                "thread_id must not be empty".to_string(),
            ));
        }

        let _guard = self.locks.acquire(thread_id).await;
        tracing::info!(thread_id, "Agent run started");

        let result = self.drive(query, thread_id, now).await;
        match &result {
            Ok(answer) => tracing::info!(thread_id, chars = answer.len(), "Agent run finished"),
            Err(e) => tracing::error!(thread_id, kind = e.kind(), "Agent run failed: {}", e),
        }
        result
    }

    /// The latest checkpointed history for a thread.
    pub async fn history(&self, thread_id: &str) -> Result<ConversationState, RunError> {
        self.checkpoints
            .load(thread_id)
            .await
            .map_err(|source| RunError::Persistence {
                thread_id: thread_id.to_string(),
                step: 0,
                source,
            })
    }

    async fn drive(
        &self,
        query: &str,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, RunError> {
        let tool_defs = self.tools.tool_definitions().await;
        let tool_names: Vec<String> = tool_defs
            .iter()
            .map(|def| def.function.name.clone())
            .collect();
        let system_prompt =
            step::render_system_prompt(&tool_names, &self.options.system_message, now);
        let limit = self.options.recursion_limit.max(1);

        let mut history = ConversationState::new();
        let mut steps = 0usize;
        let mut state = AgentState::Start;

        loop {
            state = match state {
                AgentState::Start => {
                    history = self.history(thread_id).await?;
                    tracing::debug!(thread_id, prior = history.len(), "Loaded checkpoint");

                    // A run that stopped between AGENT and TOOLS leaves calls unanswered.
                    let unanswered: Vec<ToolCallRequest> =
                        history.pending_tool_calls().into_iter().cloned().collect();
                    if !unanswered.is_empty() {
                        tracing::warn!(
                            thread_id,
                            calls = unanswered.len(),
                            "Closing tool calls left unanswered by an earlier run"
                        );
                    }
                    for call in &unanswered {
                        history
                            .push(ToolCallResult::interrupted(call).into_message())
                            .map_err(|e| violation(thread_id, steps, e))?;
                    }

                    history
                        .push(Message::user(query))
                        .map_err(|e| violation(thread_id, steps, e))?;
                    self.checkpoint(thread_id, &history, steps).await?;
                    AgentState::Agent
                }
                AgentState::Agent => {
                    steps = next_step(thread_id, steps, limit)?;
                    tracing::debug!(thread_id, step = steps, "Calling model");

                    let reply = step::invoke_model(
                        self.model.as_ref(),
                        &system_prompt,
                        &history,
                        &tool_defs,
                    )
                    .await
                    .map_err(|source| RunError::Model {
                        thread_id: thread_id.to_string(),
                        step: steps,
                        source,
                    })?;
                    history
                        .push(reply)
                        .map_err(|e| violation(thread_id, steps, e))?;
                    self.checkpoint(thread_id, &history, steps).await?;

                    match routing::decide(history.last()) {
                        Decision::InvokeTools => AgentState::Tools,
                        Decision::Terminate => AgentState::End,
                        Decision::Violation(reason) => {
                            return Err(RunError::InvariantViolation {
                                thread_id: thread_id.to_string(),
                                step: steps,
                                reason,
                            });
                        }
                    }
                }
                AgentState::Tools => {
                    steps = next_step(thread_id, steps, limit)?;
                    let calls = history
                        .last()
                        .map(|message| message.tool_calls().to_vec())
                        .unwrap_or_default();
                    tracing::debug!(thread_id, step = steps, calls = calls.len(), "Running tools");

                    for result in self.tools.execute_calls(&calls).await {
                        history
                            .push(result.into_message())
                            .map_err(|e| violation(thread_id, steps, e))?;
                    }
                    self.checkpoint(thread_id, &history, steps).await?;
                    AgentState::Agent
                }
                AgentState::End => {
                    return match history.last() {
                        Some(Message::Assistant { content, .. }) => Ok(content.clone()),
                        _ => Err(RunError::InvariantViolation {
                            thread_id: thread_id.to_string(),
                            step: steps,
                            reason: "run ended without an assistant message".to_string(),
                        }),
                    };
                }
            };
        }
    }

    async fn checkpoint(
        &self,
        thread_id: &str,
        history: &ConversationState,
        step: usize,
    ) -> Result<(), RunError> {
        self.checkpoints
            .save(thread_id, history)
            .await
            .map_err(|source| RunError::Persistence {
                thread_id: thread_id.to_string(),
                step,
                source,
            })
    }
}

fn next_step(thread_id: &str, steps: usize, limit: usize) -> Result<usize, RunError> {
    if steps >= limit {
        tracing::warn!(thread_id, limit, "Agent loop hit recursion limit");
        return Err(RunError::DidNotConverge {
            thread_id: thread_id.to_string(),
            limit,
        });
    }
    Ok(steps + 1)
}

fn violation(thread_id: &str, step: usize, err: HistoryError) -> RunError {
    RunError::InvariantViolation {
        thread_id: thread_id.to_string(),
        step,
        reason: err.to_string(),
    }
}
