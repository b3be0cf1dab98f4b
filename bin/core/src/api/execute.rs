use std::time::Duration;

use anyhow::anyhow;
use axum::{Extension, extract::Path};
use refactor_client::{
  api::{ExecBody, ExecResponse, ProvisionBody},
  entities::{
    container_name,
    project::{Project, ProjectStatus},
    user::User,
  },
};
use reqwest::StatusCode;
use serror::{AddStatusCodeError, Json};

use crate::{
  docker, helpers::query::get_check_ownership, project, provision,
};

const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(300);

#[instrument(name = "ProvisionProject", skip_all)]
pub async fn provision(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  body: Option<axum::Json<ProvisionBody>>,
) -> serror::Result<axum::Json<Project>> {
  let project = get_check_ownership(&id, &user).await?;
  let dev_mode =
    body.and_then(|axum::Json(body)| body.dev_mode);
  let project = provision::provision(project, dev_mode).await?;
  Ok(axum::Json(project))
}

#[instrument(name = "ReprovisionProject", skip_all)]
pub async fn reprovision(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  body: Option<axum::Json<ProvisionBody>>,
) -> serror::Result<axum::Json<Project>> {
  let project = get_check_ownership(&id, &user).await?;
  let dev_mode =
    body.and_then(|axum::Json(body)| body.dev_mode);
  let project = provision::reprovision(project, dev_mode).await?;
  Ok(axum::Json(project))
}

#[instrument(name = "StopProject", skip_all)]
pub async fn stop(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> serror::Result<axum::Json<Project>> {
  let project = get_check_ownership(&id, &user).await?;
  let project = provision::stop(project).await?;
  Ok(axum::Json(project))
}

/// Admin / debug passthrough into the project container.
#[instrument(name = "ExecInProject", skip_all)]
pub async fn exec(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  Json(body): Json<ExecBody>,
) -> serror::Result<axum::Json<ExecResponse>> {
  let project = get_check_ownership(&id, &user).await?;
  project::require_status(
    &project,
    &[ProjectStatus::Ready, ProjectStatus::Running],
  )?;
  if body.argv.is_empty() {
    return Err(
      anyhow!("argv must not be empty")
        .status_code(StatusCode::BAD_REQUEST),
    );
  }
  let timeout = body
    .timeout_secs
    .map(Duration::from_secs)
    .unwrap_or(DEFAULT_EXEC_TIMEOUT);
  let output = docker::exec(
    &container_name(&project.id),
    &body.argv,
    body.workdir.as_deref(),
    timeout,
  )
  .await
  .map_err(anyhow::Error::from)?;
  Ok(axum::Json(ExecResponse {
    exit_code: output.exit_code,
    stdout: output.stdout,
    stderr: output.stderr,
  }))
}
