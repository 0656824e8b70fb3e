//! Runs one task against a scripted model so the loop can be watched offline.

use async_trait::async_trait;
use serde_json::{json, Value};
use taskloop::{Agent, Result, StubModel, TaskError, Tool, ToolRegistry};
use tokio_util::sync::CancellationToken;

struct WordCount;

#[async_trait]
impl Tool for WordCount {
    fn name(&self) -> &str {
        "wordCount"
    }

    fn description(&self) -> &str {
        "Counts the words in `text`."
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| TaskError::InvalidInput("missing `text`".into()))?;
        Ok(json!({ "words": text.split_whitespace().count() }))
    }
}

#[tokio::main]
async fn main() {
    let model = StubModel::new(vec![
        r#"{"type":"plan","plan":"Count the words with wordCount"}"#.into(),
        "```json\n{\"type\":\"action\",\"function\":\"wordCount\",\"input\":{\"text\":\"the quick brown fox\"}}\n```".into(),
        r#"{"type":"output","output":"The sentence has 4 words."}"#.into(),
    ]);
    let mut tools = ToolRegistry::new();
    tools.register(WordCount);
    let agent = Agent::new(model).with_tools(tools).with_max_turns(5);

    let report = agent
        .run_task("How many words are in 'the quick brown fox'?", &CancellationToken::new())
        .await;

    for message in report.conversation.iter().skip(1) {
        println!("[{}] {}", message.role.as_str(), message.content);
    }
    match report.outcome {
        Ok(result) => println!("result after {} turns: {result}", report.turns),
        Err(err) => eprintln!("task failed after {} turns: {err}", report.turns),
    }
}
