//! An autonomous task loop between a chat-completion model and side-effecting tools.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an OpenAI-compatible client.
//! - A tool interface (`Tool` and `ToolRegistry`) plus bundled web, terminal and report tools.
//! - An `Agent` that loops plan → action → observation using structured JSON replies.
//! - An optional axum front door (`server` feature).

mod agent;
mod config;
mod error;
mod llm;
mod memory;
mod message;
mod parser;
mod prompt;
#[cfg(feature = "server")]
mod server;
mod telemetry;
mod tool;
pub mod tools;

pub use agent::{Agent, TaskReport, DEFAULT_MAX_TURNS};
pub use config::{
    AgentConfig, AppConfig, LogFormat, LoggingConfig, ModelConfig, ServerConfig, ToolsConfig,
};
pub use error::{Result, TaskError};
pub use llm::{CompletionRequest, LanguageModel, OpenAiClient, StubModel};
pub use memory::Conversation;
pub use message::{Envelope, Message, Role};
pub use parser::{extract_payload, parse_decision, parse_payload, Decision, ParseError};
pub use prompt::system_prompt;
#[cfg(feature = "server")]
pub use server::{TaskServer, LIVENESS};
pub use telemetry::{env_filter, init_tracing};
pub use tool::{Tool, ToolDescription, ToolRegistry};
