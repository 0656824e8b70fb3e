use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },

    #[error("tool `{name}` failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid tool input: {0}")]
    InvalidInput(String),

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("language model returned an empty response")]
    EmptyModelResponse,

    #[error("task processing reached the maximum of {turns} turns")]
    TurnLimitExceeded { turns: usize },

    #[error("task was cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Errors that end a task run. Everything else is reported back to the
    /// model as an observation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskError::EmptyModelResponse
                | TaskError::TurnLimitExceeded { .. }
                | TaskError::Cancelled
                | TaskError::LanguageModel(_)
                | TaskError::Config(_)
        )
    }

    pub(crate) fn tool_failure(name: &str, message: impl Into<String>) -> Self {
        TaskError::ToolExecution {
            name: name.to_string(),
            source: message.into().into(),
        }
    }
}
