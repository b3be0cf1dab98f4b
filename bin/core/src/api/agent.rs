//! Relay between web clients and the in-container agent.
//!
//! The control plane stores no run state: the agent owns it, these
//! handlers forward calls and translate the status vocabulary. The
//! SSE stream is relayed frame for frame, in upstream order, with
//! nothing synthesized except keep-alive comments and a terminal
//! `error` frame when the upstream connection dies mid-stream.

use std::{convert::Infallible, time::Duration};

use agent_client::{
  StartRun, TaskDetail, TaskStatus, sse::SseParser,
};
use axum::{
  Extension,
  extract::Path,
  response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use refactor_client::{
  api::{RunDetail, RunStartResponse, RunStatus, StartRunBody},
  entities::{
    project::{Project, ProjectStatus},
    refactor_timestamp,
    user::User,
  },
};
use reqwest::StatusCode;
use serror::AddStatusCode;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
  helpers::{self, query::get_check_ownership},
  project,
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Run start requires a settled, healthy container.
const RUN_FROM: &[ProjectStatus] = &[ProjectStatus::Ready];
/// Reads on existing runs also work while a run is active.
const READ_FROM: &[ProjectStatus] =
  &[ProjectStatus::Ready, ProjectStatus::Running];

#[instrument(name = "StartAgentRun", skip_all)]
pub async fn start_run(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  body: Option<axum::Json<StartRunBody>>,
) -> serror::Result<axum::Json<RunStartResponse>> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(&project, RUN_FROM)?;

  let body =
    body.map(|axum::Json(body)| body).unwrap_or_default();
  let started = helpers::agent(&project.id)
    .start_run(&StartRun {
      spec: body.spec.unwrap_or_else(|| project.spec.clone()),
      thread_id: project.refactor_thread_id.clone(),
      model: body.model,
    })
    .await
    .status_code(StatusCode::BAD_GATEWAY)?;

  // First run fixes the conversation the agent opened for this
  // project. Later runs keep resuming it until a session reset.
  if project.refactor_thread_id.is_none() {
    if let Err(e) =
      project::set_thread_id(&project.id, &started.thread_id).await
    {
      warn!(
        "failed to persist thread id for project {} | {e:#}",
        project.id
      );
    }
  }

  info!(
    "started agent run {} on project {}",
    started.task_id, project.id
  );
  Ok(axum::Json(RunStartResponse {
    run_id: started.task_id,
    project_id: project.id,
    status: RunStatus::Running,
    phase: String::from("plan"),
    created_at: refactor_timestamp(),
    message: String::from("Refactor run started"),
  }))
}

#[instrument(name = "ListAgentRuns", skip_all)]
pub async fn list_runs(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> serror::Result<axum::Json<Vec<RunDetail>>> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(&project, READ_FROM)?;
  let tasks = helpers::agent(&project.id)
    .tasks()
    .await
    .status_code(StatusCode::BAD_GATEWAY)?;
  let runs = tasks
    .into_iter()
    .map(|task| to_run_detail(&project.id, task))
    .collect();
  Ok(axum::Json(runs))
}

#[instrument(name = "GetAgentRun", skip_all)]
pub async fn run_detail(
  Extension(user): Extension<User>,
  Path((id, run_id)): Path<(String, String)>,
) -> serror::Result<axum::Json<RunDetail>> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(&project, READ_FROM)?;
  let task = helpers::agent(&project.id)
    .task(&run_id)
    .await
    .status_code(StatusCode::BAD_GATEWAY)?;
  Ok(axum::Json(to_run_detail(&project.id, task)))
}

#[instrument(name = "StopAgentRun", skip_all)]
pub async fn stop_run(
  Extension(user): Extension<User>,
  Path((id, run_id)): Path<(String, String)>,
) -> serror::Result<axum::Json<RunDetail>> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(&project, READ_FROM)?;
  let agent = helpers::agent(&project.id);
  agent
    .stop_task(&run_id)
    .await
    .status_code(StatusCode::BAD_GATEWAY)?;
  let task = agent
    .task(&run_id)
    .await
    .status_code(StatusCode::BAD_GATEWAY)?;
  Ok(axum::Json(to_run_detail(&project.id, task)))
}

#[instrument(name = "StreamAgentRun", skip_all)]
pub async fn stream_run(
  Extension(user): Extension<User>,
  Path((id, run_id)): Path<(String, String)>,
) -> serror::Result<
  Sse<impl Stream<Item = Result<Event, Infallible>>>,
> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(&project, READ_FROM)?;
  let upstream = helpers::agent(&project.id)
    .stream_task(&run_id)
    .await
    .status_code(StatusCode::BAD_GATEWAY)?;

  let (tx, rx) = mpsc::channel::<Event>(64);
  tokio::spawn(relay(upstream, tx));

  Ok(
    Sse::new(ReceiverStream::new(rx).map(Ok)).keep_alive(
      KeepAlive::new()
        .interval(KEEP_ALIVE_INTERVAL)
        .text("keep-alive"),
    ),
  )
}

#[instrument(name = "ResetAgentSession", skip_all)]
pub async fn reset_session(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> serror::Result<axum::Json<Project>> {
  let project = get_check_ownership(&id, &user).await?;
  project::clear_thread_id(&project.id).await?;
  let project =
    crate::helpers::query::get_project(&project.id).await?;
  Ok(axum::Json(project))
}

/// Forwards upstream frames to the downstream channel in arrival
/// order. When the downstream side closes, the select drops out
/// immediately and the upstream read is released with it.
async fn relay(
  upstream: impl Stream<Item = reqwest::Result<bytes::Bytes>>,
  tx: mpsc::Sender<Event>,
) {
  tokio::pin!(upstream);
  let mut parser = SseParser::new();
  loop {
    let chunk = tokio::select! {
      chunk = upstream.next() => chunk,
      _ = tx.closed() => {
        trace!("client disconnected, dropping agent stream");
        return;
      }
    };
    let chunk = match chunk {
      Some(Ok(chunk)) => chunk,
      Some(Err(e)) => {
        debug!("agent stream failed mid-read | {e:#}");
        let payload = serde_json::json!({
          "message": format!("agent stream failed: {e}"),
        });
        let _ = tx
          .send(
            Event::default()
              .event("error")
              .data(payload.to_string()),
          )
          .await;
        return;
      }
      // Upstream closed cleanly, the run is over.
      None => return,
    };
    for frame in parser.push(&chunk) {
      let mut event = Event::default();
      if let Some(name) = frame.event {
        event = event.event(name);
      }
      if !frame.data.is_empty() {
        event = event.data(frame.data);
      }
      if tx.send(event).await.is_err() {
        return;
      }
    }
  }
}

fn to_run_detail(project_id: &str, task: TaskDetail) -> RunDetail {
  RunDetail {
    id: task.id,
    project_id: project_id.to_string(),
    status: map_status(task.status),
    phase: task.phase,
    created_at: task.created_at,
    updated_at: task.updated_at,
    finished_at: task.finished_at,
    error_message: task.error_message,
  }
}

fn map_status(status: TaskStatus) -> RunStatus {
  match status {
    TaskStatus::Pending | TaskStatus::Running => RunStatus::Running,
    TaskStatus::Success => RunStatus::Done,
    TaskStatus::Failed => RunStatus::Failed,
    TaskStatus::Stopped => RunStatus::Stopped,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn agent_statuses_map_to_client_vocabulary() {
    assert_eq!(map_status(TaskStatus::Pending), RunStatus::Running);
    assert_eq!(map_status(TaskStatus::Running), RunStatus::Running);
    assert_eq!(map_status(TaskStatus::Success), RunStatus::Done);
    assert_eq!(map_status(TaskStatus::Failed), RunStatus::Failed);
    assert_eq!(map_status(TaskStatus::Stopped), RunStatus::Stopped);
  }
}
