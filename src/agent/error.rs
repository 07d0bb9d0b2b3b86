use thiserror::Error;

/// Failure of a whole run, returned to the caller of [`super::Agent::run`].
///
/// Tool-scoped failures never show up here; they are folded into the conversation as error
/// payloads the model can react to.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model step failed for thread '{thread_id}' at step {step}: {source:#}")]
    Model {
        thread_id: String,
        step: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("checkpoint persistence failed for thread '{thread_id}' at step {step}: {source:#}")]
    Persistence {
        thread_id: String,
        step: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("agent did not converge within {limit} steps for thread '{thread_id}'")]
    DidNotConverge { thread_id: String, limit: usize },

    #[error("invariant violation for thread '{thread_id}' at step {step}: {reason}")]
    InvariantViolation {
        thread_id: String,
        step: usize,
        reason: String,
    },
}

impl RunError {
    /// Stable machine-readable name for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::InvalidInput(_) => "invalid_input",
            RunError::Model { .. } => "model_error",
            RunError::Persistence { .. } => "persistence_error",
            RunError::DidNotConverge { .. } => "did_not_converge",
            RunError::InvariantViolation { .. } => "invariant_violation",
        }
    }
}
