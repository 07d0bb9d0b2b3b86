use std::sync::Arc;

use anyhow::{Context, Result};

use crate::agent::{Agent, AgentOptions};
use crate::checkpoint::{CheckpointStore, SqliteCheckpointStore};
use crate::config::AgentConfig;
use crate::llm::{ChatModel, OpenAiChatModel};
use crate::retrieval::{EmbeddingClient, EmbeddingVectorStore, SqliteVectorIndex, VectorSearch};
use crate::tools::{EmployeeLookupTool, ToolRegistry};

/// Process-wide handles, acquired once at startup and shared by every run.
pub struct AgentRuntime {
    pub config: AgentConfig,
    pub agent: Arc<Agent>,
    pub tool_registry: Arc<ToolRegistry>,
}

impl AgentRuntime {
    /// Build every client from `config` with the default backends.
    pub async fn bootstrap(config: AgentConfig) -> Result<Self> {
        AgentRuntimeBuilder::new(config).build().await
    }
}

/// Assembles an [`AgentRuntime`]. Any backend not supplied is built from the config.
pub struct AgentRuntimeBuilder {
    config: AgentConfig,
    model: Option<Arc<dyn ChatModel>>,
    search: Option<Arc<dyn VectorSearch>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl AgentRuntimeBuilder {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            model: None,
            search: None,
            checkpoints: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn VectorSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub async fn build(self) -> Result<AgentRuntime> {
        let config = self.config;

        let model: Arc<dyn ChatModel> = match self.model {
            Some(model) => model,
            None => Arc::new(
                OpenAiChatModel::from_config(&config).context("Failed to build chat model")?,
            ),
        };

        let search: Arc<dyn VectorSearch> = match self.search {
            Some(search) => search,
            None => {
                let index = SqliteVectorIndex::new(&config.database_path).with_context(|| {
                    format!("Failed to open employee index at {}", config.database_path)
                })?;
                let embedder = EmbeddingClient::from_config(&config)?;
                Arc::new(EmbeddingVectorStore::new(embedder, Arc::new(index)))
            }
        };

        let checkpoints: Arc<dyn CheckpointStore> = match self.checkpoints {
            Some(checkpoints) => checkpoints,
            None => Arc::new(
                SqliteCheckpointStore::new(&config.database_path)
                    .with_context(|| {
                        format!("Failed to open checkpoint store at {}", config.database_path)
                    })?
                    .with_retention(config.checkpoint_retention),
            ),
        };

        let tool_registry = Arc::new(ToolRegistry::new());
        tool_registry
            .register(Arc::new(EmployeeLookupTool::new(
                search,
                config.default_lookup_results,
            )))
            .await;

        let agent = Arc::new(Agent::new(
            model.clone(),
            tool_registry.clone(),
            checkpoints,
            AgentOptions {
                recursion_limit: config.recursion_limit,
                system_message: config.system_message.clone(),
            },
        ));

        tracing::info!(
            "Agent runtime ready (model: {}, database: {}, recursion limit: {})",
            model.name(),
            config.database_path,
            config.recursion_limit
        );

        Ok(AgentRuntime {
            config,
            agent,
            tool_registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelReply, ModelRequest};
    use async_trait::async_trait;

    struct FixedModel;

    #[async_trait]
    impl ChatModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, request: ModelRequest<'_>) -> anyhow::Result<ModelReply> {
            Ok(ModelReply::text(format!("{} messages", request.messages.len())))
        }
    }

    #[tokio::test]
    async fn bootstrap_wires_sqlite_backends_and_lookup_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig {
            database_path: dir.path().join("hr.db").to_string_lossy().into_owned(),
            recursion_limit: 3,
            checkpoint_retention: 1,
            ..AgentConfig::default()
        };

        let runtime = AgentRuntimeBuilder::new(config)
            .with_model(Arc::new(FixedModel))
            .build()
            .await
            .expect("runtime");

        assert_eq!(
            runtime.tool_registry.list_names().await,
            vec!["employee_lookup".to_string()]
        );
        assert_eq!(runtime.agent.options().recursion_limit, 3);

        let answer = runtime.agent.run("hello", "t1").await.expect("run");
        assert_eq!(answer, "1 messages");

        // Checkpoints went to the SQLite file and survive a rebuild.
        let reopened = SqliteCheckpointStore::new(dir.path().join("hr.db")).expect("reopen");
        assert_eq!(reopened.load("t1").await.expect("load").len(), 2);
        assert_eq!(reopened.list_checkpoints("t1").expect("list").len(), 1);
    }
}
