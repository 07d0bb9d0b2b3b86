//! HR question-answering agent.
//!
//! The crate is organised around a single control loop ([`agent::Agent`]) that alternates
//! between a model call and the `employee_lookup` retrieval tool, checkpointing the
//! conversation after every step so a thread can be resumed later.

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod llm;
pub mod messages;
pub mod retrieval;
pub mod runtime;
pub mod server;
pub mod tools;

pub use agent::{Agent, AgentOptions, RunError};
pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use config::AgentConfig;
pub use messages::{ConversationState, Message, ToolCallRequest};
