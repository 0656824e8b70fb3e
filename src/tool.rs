use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, TaskError};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, input: Value) -> Result<Value>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Name-keyed set of tools the loop may dispatch to.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers `tool`, replacing any tool already registered under its name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "replaced registered tool");
        } else {
            tracing::debug!(tool = %name, "registered tool");
        }
    }

    pub fn merge(&mut self, other: ToolRegistry) {
        for (_, tool) in other.tools {
            self.register_arc(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        let mut described: Vec<ToolDescription> = self
            .tools
            .values()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        described.sort_by(|a, b| a.name.cmp(&b.name));
        described
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| TaskError::UnknownTool {
            name: name.to_string(),
        })?;
        tool.call(input).await.map_err(|err| match err {
            TaskError::ToolExecution { .. } => err,
            other => TaskError::ToolExecution {
                name: name.to_string(),
                source: Box::new(other),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed {
        name: &'static str,
        reply: Value,
    }

    #[async_trait]
    impl Tool for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Returns a fixed value"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Ok(self.reply.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(TaskError::InvalidInput("missing `command`".into()))
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, TaskError::UnknownTool { name } if name == "nope"));
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(Fixed {
            name: "browserService",
            reply: json!("first"),
        });
        registry.register(Fixed {
            name: "browserService",
            reply: json!("second"),
        });

        assert_eq!(registry.len(), 1);
        let out = registry.invoke("browserService", json!({})).await.unwrap();
        assert_eq!(out, json!("second"));
    }

    #[tokio::test]
    async fn names_are_case_sensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(Fixed {
            name: "reportService",
            reply: json!(null),
        });
        assert!(matches!(
            registry.invoke("reportservice", json!({})).await,
            Err(TaskError::UnknownTool { .. })
        ));
    }

    #[tokio::test]
    async fn failures_are_wrapped_with_tool_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Failing);
        let err = registry.invoke("failing", json!({})).await.unwrap_err();
        match err {
            TaskError::ToolExecution { name, source } => {
                assert_eq!(name, "failing");
                assert!(source.to_string().contains("missing `command`"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn names_and_descriptions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Fixed {
            name: "terminalService",
            reply: json!(null),
        });
        registry.register(Fixed {
            name: "browserService",
            reply: json!(null),
        });
        assert_eq!(registry.names(), vec!["browserService", "terminalService"]);
        assert_eq!(registry.describe()[0].name, "browserService");
    }
}
