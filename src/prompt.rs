use crate::tool::ToolRegistry;

const PROTOCOL: &str = r#"You are an AI autonomous agent working through START, PLAN, ACTION, OBSERVATION and OUTPUT states.
Wait for the user prompt, then first PLAN using the available tools.
After planning, take the ACTION with the appropriate tool and wait for the OBSERVATION it produces.
Once you have the observations you need, return the OUTPUT based on the START prompt and the observations.

Respond strictly with a single JSON object and nothing else. Every reply has a "type" field:
- {"type": "plan", "plan": "<what you will do next>"}
- {"type": "action", "function": "<tool name>", "input": { ... }}
- {"type": "output", "output": <final result>}

Messages from the developer are JSON objects too:
- {"type": "user", "content": "<task>"}
- {"type": "observation", "content": <tool result or error>}
- {"type": "instruction", "content": "<what to do next>"}
"#;

const EXAMPLES: &str = r#"Example:
START
User -> {"type": "user", "content": "What will the 'ls -l -a' command do? Write it up."}
You -> {"type": "plan", "plan": "I will search the web for the ls command"}
You -> {"type": "action", "function": "browserService", "input": {"name": "ls -l -a command", "noOfResponses": 3}}
Developer -> {"type": "observation", "content": "<how the command works>"}
You -> {"type": "plan", "plan": "I will run ls using terminalService"}
You -> {"type": "action", "function": "terminalService", "input": {"command": "ls", "args": ["-l", "-a"]}}
Developer -> {"type": "observation", "content": "<output of ls -l -a>"}
You -> {"type": "plan", "plan": "I will save a report with reportService"}
You -> {"type": "action", "function": "reportService", "input": {"content": "<the full write-up>", "fileType": "txt"}}
Developer -> {"type": "observation", "content": "<report location>"}
You -> {"type": "output", "output": "Report generated"}
"#;

/// Builds the system prompt, listing every tool registered in `tools`.
pub fn system_prompt(tools: &ToolRegistry) -> String {
    let mut prompt = String::from(PROTOCOL);
    prompt.push('\n');
    if tools.is_empty() {
        prompt.push_str("No tools are available. Answer with an output directly.\n\n");
    } else {
        prompt.push_str("Available functions:\n");
        for tool in tools.describe() {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            if let Some(params) = &tool.parameters {
                prompt.push_str(&format!("  input: {params}\n"));
            }
        }
        prompt.push('\n');
        prompt.push_str(
            "Never run commands that can harm the host. Work step by step and, unless the user says otherwise, save the final result with a report.\n\n",
        );
        prompt.push_str(EXAMPLES);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tool::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Described;

    #[async_trait]
    impl Tool for Described {
        fn name(&self) -> &str {
            "terminalService"
        }

        fn description(&self) -> &str {
            "Runs a command"
        }

        fn parameters(&self) -> Option<Value> {
            Some(json!({"type": "object"}))
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn lists_registered_tools() {
        let mut tools = ToolRegistry::new();
        tools.register(Described);
        let prompt = system_prompt(&tools);
        assert!(prompt.contains("- terminalService: Runs a command"));
        assert!(prompt.contains("input: {\"type\":\"object\"}"));
        assert!(prompt.contains("\"type\": \"action\""));
    }

    #[test]
    fn says_when_no_tools_exist() {
        let prompt = system_prompt(&ToolRegistry::new());
        assert!(prompt.contains("No tools are available"));
        assert!(!prompt.contains("Example:"));
    }
}
