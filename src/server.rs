use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::error::{Result, TaskError};
use crate::llm::LanguageModel;

pub const LIVENESS: &str = "LLM Agent Server is running. Use POST /task to submit tasks.";

/// HTTP front door: one task per `POST /task`, each with its own conversation.
pub struct TaskServer<M: LanguageModel + 'static> {
    agent: Arc<Agent<M>>,
    shutdown: CancellationToken,
}

impl<M: LanguageModel + 'static> Clone for TaskServer<M> {
    fn clone(&self) -> Self {
        Self {
            agent: Arc::clone(&self.agent),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<M: LanguageModel + 'static> TaskServer<M> {
    pub fn new(agent: Agent<M>) -> Self {
        Self {
            agent: Arc::new(agent),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling this token aborts every in-flight task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root))
            .route("/health", get(|| async { "ok" }))
            .route("/task", post(create_task::<M>))
            .with_state(self.clone())
    }

    /// Serves until Ctrl-C, then cancels running tasks and drains.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "server listening");
        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown requested, cancelling running tasks");
                shutdown.cancel();
            })
            .await
            .map_err(|err| TaskError::Protocol(format!("server error: {err}")))?;
        Ok(())
    }
}

async fn root() -> &'static str {
    LIVENESS
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": error.into() }))).into_response()
}

async fn create_task<M: LanguageModel + 'static>(
    State(state): State<TaskServer<M>>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "rejected malformed task request");
            return failure(rejection.status(), rejection.body_text());
        }
    };
    let task = match body.get("task").and_then(Value::as_str) {
        Some(task) if !task.trim().is_empty() => task.to_string(),
        _ => {
            tracing::warn!("task content missing or not a string");
            return failure(
                StatusCode::BAD_REQUEST,
                "Invalid request body. Please provide a \"task\" property with a string value.",
            );
        }
    };

    tracing::info!(task = %task, "received task");
    let cancel = state.shutdown.child_token();
    let report = state.agent.run_task(task, &cancel).await;
    match report.outcome {
        Ok(result) => Json(json!({ "success": true, "result": result })).into_response(),
        Err(TaskError::Cancelled) => failure(StatusCode::SERVICE_UNAVAILABLE, "task was cancelled"),
        Err(err) => failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
