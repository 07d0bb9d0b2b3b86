//! `employee_lookup`: semantic search over the employee records.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{Tool, ToolError};
use crate::retrieval::VectorSearch;

pub const EMPLOYEE_LOOKUP_TOOL: &str = "employee_lookup";

#[derive(Debug, Deserialize)]
struct LookupArgs {
    query: String,
    #[serde(default)]
    n: Option<i64>,
}

pub struct EmployeeLookupTool {
    search: Arc<dyn VectorSearch>,
    default_n: usize,
}

impl EmployeeLookupTool {
    pub fn new(search: Arc<dyn VectorSearch>, default_n: usize) -> Self {
        Self {
            search,
            default_n: default_n.max(1),
        }
    }

    fn parse_args(&self, params: Value) -> Result<(String, usize), ToolError> {
        if let Value::String(raw) = &params {
            return Err(ToolError::InvalidArguments(format!(
                "arguments are not a JSON object: {}",
                raw
            )));
        }

        let args: LookupArgs = serde_json::from_value(params)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments(
                "'query' must be non-empty text".to_string(),
            ));
        }

        let n = match args.n {
            None => self.default_n,
            Some(n) if n >= 1 => n as usize,
            Some(n) => {
                return Err(ToolError::InvalidArguments(format!(
                    "'n' must be a positive integer, got {}",
                    n
                )))
            }
        };

        Ok((query.to_string(), n))
    }
}

#[async_trait]
impl Tool for EmployeeLookupTool {
    fn name(&self) -> &str {
        EMPLOYEE_LOOKUP_TOOL
    }

    fn description(&self) -> &str {
        "Gathers employee details from the HR database"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "n": {
                    "type": "integer",
                    "minimum": 1,
                    "default": self.default_n,
                    "description": "Number of results to return"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        let (query, n) = self.parse_args(params)?;

        tracing::info!(query = %query, n, "employee_lookup: querying vector index");
        let results = self
            .search
            .similarity_search(&query, n)
            .await
            .map_err(|e| ToolError::Capability {
                kind: "retrieval_error",
                message: format!("{:#}", e),
            })?;
        tracing::debug!(hits = results.len(), "employee_lookup: search completed");

        serde_json::to_value(results).map_err(|e| ToolError::Capability {
            kind: "retrieval_error",
            message: format!("Failed to encode search results: {}", e),
        })
    }
}
