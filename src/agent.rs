use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::memory::Conversation;
use crate::message::{Envelope, Message};
use crate::parser::{parse_decision, Decision};
use crate::prompt;
use crate::tool::ToolRegistry;

pub const DEFAULT_MAX_TURNS: usize = 10;

const EXECUTE_PLAN: &str = "Now execute the action for the plan you just provided.";

/// Everything a finished task run leaves behind.
#[derive(Debug)]
pub struct TaskReport {
    pub id: Uuid,
    pub conversation: Conversation,
    pub turns: usize,
    pub outcome: Result<Value>,
}

impl TaskReport {
    pub fn into_result(self) -> Result<Value> {
        self.outcome
    }
}

enum Step {
    Continue,
    Finished(Value),
}

/// Drives the plan → action → observation loop between a model and tools.
///
/// An `Agent` holds no per-task state: every run builds its own
/// [`Conversation`], so one agent can serve concurrent tasks.
pub struct Agent<M: LanguageModel> {
    model: Arc<M>,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    model_name: String,
    max_turns: usize,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            tools: ToolRegistry::new(),
            system_prompt: None,
            model_name: "default".into(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Overrides the prompt otherwise generated from the registered tools.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| prompt::system_prompt(&self.tools))
    }

    /// Runs `task` to completion and returns the model's final output.
    pub async fn respond(&self, task: impl Into<String>) -> Result<Value> {
        self.run_task(task, &CancellationToken::new())
            .await
            .into_result()
    }

    pub async fn run_task(&self, task: impl Into<String>, cancel: &CancellationToken) -> TaskReport {
        let task = task.into();
        let id = Uuid::new_v4();
        let span = tracing::info_span!("task", %id, model = %self.model_name);
        async move {
            tracing::info!(task = %task, "starting task");
            let mut conversation = Conversation::new(self.system_prompt());
            conversation.push(Message::envelope(&Envelope::user(task)));

            let mut turns = 0;
            let outcome = loop {
                if turns >= self.max_turns {
                    tracing::warn!(turns, "reached maximum turns limit");
                    break Err(TaskError::TurnLimitExceeded { turns });
                }
                turns += 1;
                match self.turn(&mut conversation, turns, cancel).await {
                    Ok(Step::Continue) => continue,
                    Ok(Step::Finished(result)) => {
                        tracing::info!(turns, "task completed");
                        break Ok(result);
                    }
                    Err(err) => {
                        tracing::error!(turns, error = %err, "task aborted");
                        break Err(err);
                    }
                }
            };

            TaskReport {
                id,
                conversation,
                turns,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    async fn turn(
        &self,
        conversation: &mut Conversation,
        turn: usize,
        cancel: &CancellationToken,
    ) -> Result<Step> {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        tracing::info!(turn, messages = conversation.len(), "sending conversation to model");

        let request = CompletionRequest::json(&self.model_name);
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            reply = self.model.complete(conversation.snapshot(), &request) => reply?,
        };
        let raw = match reply {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Err(TaskError::EmptyModelResponse),
        };
        tracing::debug!(turn, raw = %raw, "model replied");
        conversation.push(Message::assistant(raw.as_str()));

        let decision = match parse_decision(&raw) {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(turn, error = %err, "unusable model reply");
                conversation.push(Message::envelope(&Envelope::error(&err)));
                return Ok(Step::Continue);
            }
        };

        match decision {
            Decision::Plan { description } => {
                tracing::info!(turn, plan = %description, "model provided a plan");
                conversation.push(Message::envelope(&Envelope::instruction(EXECUTE_PLAN)));
                Ok(Step::Continue)
            }
            Decision::Action { tool, input } => {
                let observation = self.dispatch(&tool, input, cancel).await?;
                conversation.push(Message::envelope(&observation));
                Ok(Step::Continue)
            }
            Decision::Output { result } => Ok(Step::Finished(result)),
        }
    }

    /// Runs one tool call and turns the outcome into an observation. Only
    /// cancellation escapes as an error.
    async fn dispatch(
        &self,
        tool: &str,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<Envelope> {
        tracing::info!(tool, input = %input, "executing action");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            result = self.tools.invoke(tool, input) => result,
        };

        Ok(match result {
            Ok(output) => Envelope::observation(output),
            Err(TaskError::UnknownTool { name }) => {
                tracing::warn!(tool = %name, "unknown function requested");
                Envelope::error(format!(
                    "Unknown function requested: {name}. Available functions are: {}",
                    self.tools.names().join(", ")
                ))
            }
            Err(TaskError::ToolExecution { name, source }) => {
                tracing::warn!(tool = %name, error = %source, "tool execution failed");
                Envelope::error(format!("Error executing function {name}: {source}"))
            }
            Err(other) => {
                tracing::warn!(tool, error = %other, "tool execution failed");
                Envelope::error(format!("Error executing function {tool}: {other}"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::message::Role;
    use crate::tool::Tool;
    use crate::StubModel;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the input back"
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(TaskError::tool_failure("broken", "exit code 2"))
        }
    }

    fn observation(message: &Message) -> Value {
        let value: Value = serde_json::from_str(&message.content).unwrap();
        assert_eq!(value["type"], "observation", "not an observation: {value}");
        value["content"].clone()
    }

    #[tokio::test]
    async fn first_output_ends_the_task() {
        let model = StubModel::new(vec![r#"{"type":"output","output":"X"}"#.into()]);
        let agent = Agent::new(model.clone());

        let report = agent.run_task("say X", &CancellationToken::new()).await;

        assert_eq!(report.turns, 1);
        assert_eq!(report.outcome.unwrap(), json!("X"));
        assert_eq!(
            report.conversation.roles(),
            vec![Role::System, Role::User, Role::Assistant]
        );
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn runs_tool_and_feeds_back_observation() {
        let model = StubModel::new(vec![
            r#"{"type":"action","function":"echo","input":{"text":"ping"}}"#.into(),
            r#"{"type":"output","output":"pong"}"#.into(),
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        let agent = Agent::new(model.clone()).with_tools(tools);

        let report = agent.run_task("echo ping", &CancellationToken::new()).await;

        assert_eq!(report.outcome.unwrap(), json!("pong"));
        let messages = report.conversation.snapshot();
        assert_eq!(messages.len(), 5);
        assert_eq!(observation(&messages[3]), json!({"text": "ping"}));
        // The second call saw the observation.
        assert_eq!(model.requests()[1].len(), 4);
    }

    #[tokio::test]
    async fn plan_is_followed_by_instruction() {
        let model = StubModel::new(vec![
            r#"{"type":"plan","plan":"search first"}"#.into(),
            r#"{"type":"output","output":"done"}"#.into(),
        ]);
        let agent = Agent::new(model);

        let report = agent.run_task("task", &CancellationToken::new()).await;

        let instruction: Value =
            serde_json::from_str(&report.conversation.snapshot()[3].content).unwrap();
        assert_eq!(instruction["type"], "instruction");
        assert_eq!(instruction["content"], EXECUTE_PLAN);
        assert_eq!(report.turns, 2);
    }

    #[tokio::test]
    async fn malformed_reply_consumes_a_turn_and_is_reported() {
        let model = StubModel::new(vec![
            "not json".into(),
            r#"{"type":"output","output":"ok"}"#.into(),
        ]);
        let agent = Agent::new(model);

        let report = agent.run_task("task", &CancellationToken::new()).await;

        assert_eq!(report.turns, 2);
        let messages = report.conversation.snapshot();
        assert_eq!(messages[2], Message::assistant("not json"));
        let content = observation(&messages[3]);
        assert!(content.as_str().unwrap().starts_with("Error: Could not parse"));
        assert_eq!(report.outcome.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn unknown_tool_lists_known_names() {
        let model = StubModel::new(vec![
            r#"{"type":"action","function":"doesNotExist","input":{}}"#.into(),
            r#"{"type":"output","output":"gave up"}"#.into(),
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools.register(BrokenTool);
        let agent = Agent::new(model).with_tools(tools);

        let report = agent.run_task("task", &CancellationToken::new()).await;

        let content = observation(&report.conversation.snapshot()[3]);
        let text = content.as_str().unwrap();
        assert!(text.contains("doesNotExist"));
        assert!(text.contains("Available functions are: broken, echo"));
        assert!(report.outcome.is_ok());
    }

    #[tokio::test]
    async fn tool_failure_does_not_abort() {
        let model = StubModel::new(vec![
            r#"{"type":"action","function":"broken","input":{}}"#.into(),
            r#"{"type":"output","output":"recovered"}"#.into(),
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(BrokenTool);
        let agent = Agent::new(model).with_tools(tools);

        let report = agent.run_task("task", &CancellationToken::new()).await;

        let content = observation(&report.conversation.snapshot()[3]);
        assert_eq!(
            content,
            json!("Error: Error executing function broken: exit code 2")
        );
        assert_eq!(report.outcome.unwrap(), json!("recovered"));
    }

    #[tokio::test]
    async fn endless_planning_hits_turn_limit_exactly() {
        let model = StubModel::repeating(r#"{"type":"plan","plan":"thinking"}"#);
        let agent = Agent::new(model.clone()).with_max_turns(3);

        let report = agent.run_task("task", &CancellationToken::new()).await;

        assert!(matches!(
            report.outcome,
            Err(TaskError::TurnLimitExceeded { turns: 3 })
        ));
        assert_eq!(report.turns, 3);
        assert_eq!(model.calls(), 3);
        assert_eq!(report.conversation.len(), 2 + 2 * 3);
    }

    #[tokio::test]
    async fn empty_reply_is_fatal() {
        let model = StubModel::new(vec!["   ".into(), r#"{"type":"output","output":1}"#.into()]);
        let agent = Agent::new(model.clone());

        let report = agent.run_task("task", &CancellationToken::new()).await;

        assert!(matches!(report.outcome, Err(TaskError::EmptyModelResponse)));
        assert_eq!(model.calls(), 1);
        assert_eq!(report.conversation.len(), 2);
    }

    #[tokio::test]
    async fn absent_or_blank_reply_is_fatal() {
        for reply in [None, Some(String::new())] {
            let model = StubModel::scripted(vec![
                reply.clone(),
                Some(r#"{"type":"output","output":1}"#.into()),
            ]);
            let agent = Agent::new(model.clone());

            let report = agent.run_task("task", &CancellationToken::new()).await;

            assert!(
                matches!(report.outcome, Err(TaskError::EmptyModelResponse)),
                "reply {reply:?} gave {:?}",
                report.outcome
            );
            assert_eq!(report.turns, 1);
            assert_eq!(report.conversation.len(), 2);
            assert_eq!(model.calls(), 1);
        }
    }

    #[tokio::test]
    async fn invalid_decisions_are_reported_and_loop_continues() {
        let model = StubModel::new(vec![
            r#"{"type":"Output","output":"wrong case"}"#.into(),
            r#"{"type":"action","input":{}}"#.into(),
            r#"{"type":"output"}"#.into(),
            r#"{"type":"output","output":"recovered"}"#.into(),
        ]);
        let agent = Agent::new(model);

        let report = agent.run_task("task", &CancellationToken::new()).await;

        assert_eq!(report.turns, 4);
        assert_eq!(report.outcome.unwrap(), json!("recovered"));
        let messages = report.conversation.snapshot();
        assert_eq!(messages.len(), 9);
        let errors: Vec<String> = [3, 5, 7]
            .iter()
            .map(|&i| observation(&messages[i]).as_str().unwrap().to_string())
            .collect();
        assert!(errors[0].starts_with("Error: unexpected type `Output`"));
        assert!(errors[1].contains("missing the `function` field"));
        assert!(errors[2].contains("`output` response is missing the `output` field"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_model_call() {
        let model = StubModel::repeating(r#"{"type":"plan","plan":"x"}"#);
        let agent = Agent::new(model.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = agent.run_task("task", &cancel).await;

        assert!(matches!(report.outcome, Err(TaskError::Cancelled)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_tasks_do_not_share_conversations() {
        let model = StubModel::repeating(r#"{"type":"output","output":"ok"}"#);
        let agent = Agent::new(model);

        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(agent.run_task("first", &cancel), agent.run_task("second", &cancel));

        assert_ne!(a.id, b.id);
        assert!(a.conversation.snapshot()[1].content.contains("first"));
        assert!(!a.conversation.iter().any(|m| m.content.contains("second")));
        assert!(b.conversation.snapshot()[1].content.contains("second"));
        assert_eq!(a.conversation.len(), 3);
        assert_eq!(b.conversation.len(), 3);
    }

    #[test]
    fn max_turns_is_at_least_one() {
        let agent = Agent::new(StubModel::new(vec![])).with_max_turns(0);
        assert_eq!(agent.max_turns(), 1);
    }
}
