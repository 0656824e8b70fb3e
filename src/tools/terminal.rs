//! Terminal command tool.
//!
//! Commands run inside a throwaway container (`docker run --rm alpine ...` by
//! default) after a denylist check on the command and its arguments.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::{Result, TaskError};
use crate::tool::{Tool, ToolRegistry};

pub const TERMINAL_TOOL: &str = "terminalService";

pub const BLOCKED_COMMANDS: [&str; 5] = ["rm", "shutdown", "reboot", "halt", "poweroff"];

/// Configuration for the terminal tool
#[derive(Clone, Debug)]
pub struct TerminalConfig {
    /// Program that executes the command, e.g. `docker`.
    pub program: String,
    /// Arguments placed before the user command, e.g. `run --rm alpine`.
    pub prefix_args: Vec<String>,
    pub timeout_secs: u64,
    pub blocked_commands: Vec<String>,
}

impl TerminalConfig {
    pub fn container(runtime: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            program: runtime.into(),
            prefix_args: vec!["run".into(), "--rm".into(), image.into()],
            ..Self::default()
        }
    }

    /// Runs commands directly on the host. Only meant for tests and trusted
    /// local setups.
    pub fn host() -> Self {
        Self {
            program: String::new(),
            prefix_args: Vec::new(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            program: "docker".into(),
            prefix_args: vec!["run".into(), "--rm".into(), "alpine".into()],
            timeout_secs: 30,
            blocked_commands: BLOCKED_COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

pub fn terminal_toolkit(config: TerminalConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(TerminalTool { config });
    registry
}

pub struct TerminalTool {
    config: TerminalConfig,
}

impl TerminalTool {
    pub fn new(config: TerminalConfig) -> Self {
        Self { config }
    }

    fn check_blocked(&self, command: &str, args: &[String]) -> Result<()> {
        let blocked = &self.config.blocked_commands;
        if blocked
            .iter()
            .any(|b| command == b || command.starts_with(&format!("{b} ")))
        {
            return Err(TaskError::tool_failure(
                TERMINAL_TOOL,
                format!("Blocked command detected: '{command}'. Execution denied."),
            ));
        }
        if args.iter().any(|arg| blocked.iter().any(|b| arg == b)) {
            return Err(TaskError::tool_failure(
                TERMINAL_TOOL,
                "Blocked command detected within arguments. Execution denied.",
            ));
        }
        Ok(())
    }

    fn build_command(&self, command: &str, args: &[String]) -> Command {
        let mut cmd = if self.config.program.is_empty() {
            let mut cmd = Command::new(command);
            cmd.args(args);
            cmd
        } else {
            let mut cmd = Command::new(&self.config.program);
            cmd.args(&self.config.prefix_args).arg(command).args(args);
            cmd
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[derive(Debug, Deserialize)]
struct TerminalInput {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &str {
        TERMINAL_TOOL
    }

    fn description(&self) -> &str {
        "Run a shell/linux command in an isolated container and return its standard output. Never use commands that can harm the system."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Program to run, e.g. `ls`"},
                "args": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["command"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let TerminalInput { command, args } = serde_json::from_value(input)
            .map_err(|err| TaskError::InvalidInput(format!("Failed to parse task instruction: {err}")))?;
        if command.trim().is_empty() {
            return Err(TaskError::InvalidInput(
                "Invalid 'command' property in instruction".into(),
            ));
        }
        self.check_blocked(&command, &args)?;

        tracing::info!(command = %command, args = ?args, "executing terminal command");
        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.build_command(&command, &args).output(),
        )
        .await
        .map_err(|_| {
            TaskError::tool_failure(
                TERMINAL_TOOL,
                format!("Command timed out after {} seconds", self.config.timeout_secs),
            )
        })?
        .map_err(|err| TaskError::tool_failure(TERMINAL_TOOL, format!("Spawn error: {err}")))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Ok(Value::String(stdout.trim().to_string()));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() {
            match output.status.code() {
                Some(code) => format!("Command failed with exit code {code}"),
                None => "Command terminated by signal".to_string(),
            }
        } else {
            stderr.trim().to_string()
        };
        Err(TaskError::tool_failure(TERMINAL_TOOL, message))
    }
}
