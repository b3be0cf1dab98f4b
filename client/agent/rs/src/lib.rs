//! Client for the agent process running inside every project
//! container.
//!
//! The agent is a black box to the control plane: a plain HTTP / SSE
//! server on the shared container network. This crate types the
//! endpoints the control plane calls and leaves everything else
//! opaque, in particular the payloads of the log event stream.

use std::{sync::OnceLock, time::Duration};

use anyhow::{Context, anyhow};
use bytes::Bytes;
use futures::Stream;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub mod sse;

/// Timeout for every non-stream call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn http() -> &'static reqwest::Client {
  static HTTP: OnceLock<reqwest::Client> = OnceLock::new();
  HTTP.get_or_init(|| {
    reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .expect("failed to build agent http client")
  })
}

/// No total timeout. Streams live until either side closes.
fn streaming_http() -> &'static reqwest::Client {
  static HTTP: OnceLock<reqwest::Client> = OnceLock::new();
  HTTP.get_or_init(reqwest::Client::new)
}

#[derive(Debug, Clone)]
pub struct AgentClient {
  address: String,
}

impl AgentClient {
  /// `address` is the full base url,
  /// eg. `http://refactor-project-<id>:8000`.
  pub fn new(address: impl Into<String>) -> AgentClient {
    AgentClient {
      address: address.into(),
    }
  }

  pub fn address(&self) -> &str {
    &self.address
  }

  /// 200 from `GET /health` means the agent is up and accepting
  /// runs.
  pub async fn health(&self) -> anyhow::Result<()> {
    let res = http()
      .get(format!("{}/health", self.address))
      .send()
      .await
      .with_context(|| {
        format!("agent unreachable at {}", self.address)
      })?;
    match res.status() {
      StatusCode::OK => Ok(()),
      status => Err(anyhow!("agent health check returned {status}")),
    }
  }

  pub async fn start_run(
    &self,
    run: &StartRun,
  ) -> anyhow::Result<RunStarted> {
    self.post_json("/run", run).await
  }

  pub async fn stop_task(&self, task_id: &str) -> anyhow::Result<()> {
    let res = http()
      .post(format!("{}/tasks/{task_id}/stop", self.address))
      .send()
      .await
      .with_context(|| {
        format!("agent unreachable at {}", self.address)
      })?;
    check_status(res.status())
  }

  pub async fn task(
    &self,
    task_id: &str,
  ) -> anyhow::Result<TaskDetail> {
    self.get_json(&format!("/tasks/{task_id}")).await
  }

  /// Most recent first.
  pub async fn tasks(&self) -> anyhow::Result<Vec<TaskDetail>> {
    self.get_json("/tasks").await
  }

  /// Opens the SSE log stream for a task. The returned byte stream
  /// carries raw `text/event-stream` frames and follows the task
  /// until it finishes or the stream is dropped.
  pub async fn stream_task(
    &self,
    task_id: &str,
  ) -> anyhow::Result<
    impl Stream<Item = reqwest::Result<Bytes>> + use<>,
  > {
    let res = streaming_http()
      .get(format!("{}/tasks/{task_id}/stream", self.address))
      .send()
      .await
      .with_context(|| {
        format!("agent unreachable at {}", self.address)
      })?;
    check_status(res.status())?;
    Ok(res.bytes_stream())
  }

  async fn get_json<Res: DeserializeOwned>(
    &self,
    path: &str,
  ) -> anyhow::Result<Res> {
    let res = http()
      .get(format!("{}{path}", self.address))
      .send()
      .await
      .with_context(|| {
        format!("agent unreachable at {}", self.address)
      })?;
    check_status(res.status())?;
    res
      .json()
      .await
      .with_context(|| format!("invalid agent response on {path}"))
  }

  async fn post_json<Req: Serialize, Res: DeserializeOwned>(
    &self,
    path: &str,
    body: &Req,
  ) -> anyhow::Result<Res> {
    let res = http()
      .post(format!("{}{path}", self.address))
      .json(body)
      .send()
      .await
      .with_context(|| {
        format!("agent unreachable at {}", self.address)
      })?;
    check_status(res.status())?;
    res
      .json()
      .await
      .with_context(|| format!("invalid agent response on {path}"))
  }
}

fn check_status(status: StatusCode) -> anyhow::Result<()> {
  if status.is_success() {
    Ok(())
  } else {
    Err(anyhow!("agent returned {status}"))
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StartRun {
  pub spec: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thread_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStarted {
  pub task_id: String,
  pub thread_id: String,
}

/// Task state vocabulary of the agent. The control plane maps this
/// to its own client-facing vocabulary and stores none of it.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Pending,
  Running,
  Success,
  Failed,
  Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
  #[serde(alias = "task_id")]
  pub id: String,
  pub status: TaskStatus,
  #[serde(default)]
  pub phase: Option<String>,
  /// Timestamp formats are owned by the agent, forwarded verbatim.
  #[serde(default)]
  pub created_at: Option<serde_json::Value>,
  #[serde(default)]
  pub updated_at: Option<serde_json::Value>,
  #[serde(default)]
  pub finished_at: Option<serde_json::Value>,
  #[serde(default)]
  pub error_message: Option<String>,
}

