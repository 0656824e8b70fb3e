//! Language model boundary: the trait the loop talks to, an OpenAI-compatible
//! HTTP client and a scripted stub.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ModelConfig;
use crate::error::{Result, TaskError};
use crate::message::Message;

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    /// Ask the provider to constrain the reply to a JSON object.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn json(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            json_mode: true,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the text of the first choice, `None` when the provider sent no
    /// content.
    async fn complete(
        &self,
        messages: &[Message],
        request: &CompletionRequest,
    ) -> Result<Option<String>>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str) -> TaskError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return TaskError::LanguageModel(format!("rate limit exceeded: {body}"));
    }
    TaskError::LanguageModel(format!("request failed with {status}: {body}"))
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, OpenRouter, local gateways).
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| TaskError::Config("missing LLM API key in model config".into()))?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .map_err(|err| TaskError::LanguageModel(format!("http client error: {err}")))?,
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(
        &self,
        messages: &[Message],
        request: &CompletionRequest,
    ) -> Result<Option<String>> {
        let mut payload = json!({
            "model": request.model,
            "messages": messages
                .iter()
                .map(|m| ChatMessage { role: m.role.as_str(), content: &m.content })
                .collect::<Vec<_>>(),
        });
        if request.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| TaskError::LanguageModel(format!("request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|err| TaskError::LanguageModel(format!("response parse error: {err}")))?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Replays scripted replies in order and records what it was sent.
pub struct StubModel {
    responses: Mutex<VecDeque<Option<String>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Self::scripted(responses.into_iter().map(Some).collect())
    }

    /// Like [`StubModel::new`], but `None` entries reply with no content.
    pub fn scripted(responses: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A model that answers every call with `reply`.
    pub fn repeating(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(reply.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Conversation snapshots received so far, one per call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().expect("stub model poisoned").clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("stub model poisoned").len()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(
        &self,
        messages: &[Message],
        _request: &CompletionRequest,
    ) -> Result<Option<String>> {
        self.requests
            .lock()
            .expect("stub model poisoned")
            .push(messages.to_vec());
        let next = self.responses.lock().expect("stub model poisoned").pop_front();
        match next.or_else(|| self.fallback.clone().map(Some)) {
            Some(reply) => Ok(reply),
            None => Err(TaskError::LanguageModel(
                "StubModel ran out of scripted responses".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_replays_in_order_then_errors() {
        let model = StubModel::new(vec!["one".into(), "two".into()]);
        let req = CompletionRequest::json("stub");
        let msgs = [Message::system("sys")];

        assert_eq!(model.complete(&msgs, &req).await.unwrap().as_deref(), Some("one"));
        assert_eq!(model.complete(&msgs, &req).await.unwrap().as_deref(), Some("two"));
        assert!(model.complete(&msgs, &req).await.is_err());
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn scripted_stub_can_reply_without_content() {
        let model = StubModel::scripted(vec![None, Some("two".into())]);
        let req = CompletionRequest::json("stub");

        assert_eq!(model.complete(&[], &req).await.unwrap(), None);
        assert_eq!(model.complete(&[], &req).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn repeating_stub_never_runs_out() {
        let model = StubModel::repeating("{}");
        let req = CompletionRequest::json("stub");
        for _ in 0..5 {
            assert_eq!(model.complete(&[], &req).await.unwrap().as_deref(), Some("{}"));
        }
    }

    #[test]
    fn client_requires_api_key() {
        let cfg = ModelConfig::default();
        assert!(matches!(
            OpenAiClient::from_config(&cfg),
            Err(TaskError::Config(_))
        ));
    }

    #[test]
    fn rate_limit_is_called_out() {
        let err = coalesce_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.to_string().contains("rate limit"));
    }
}
