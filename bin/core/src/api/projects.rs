use axum::{
  Extension,
  extract::{Path, Query},
};
use refactor_client::{
  api::{
    CreateProjectBody, GetProjectQuery, ProjectResponse,
    UpdateProjectBody,
  },
  entities::{project::Project, user::User},
};
use reqwest::StatusCode;
use serror::Json;

use crate::{
  helpers::query::{get_check_ownership, list_projects_for_user},
  project,
};

#[instrument(name = "CreateProject", skip_all)]
pub async fn create(
  Extension(user): Extension<User>,
  Json(body): Json<CreateProjectBody>,
) -> serror::Result<(StatusCode, axum::Json<Project>)> {
  let project = project::create_project(&user, body).await?;
  info!("user {} created project {}", user.id, project.id);
  Ok((StatusCode::CREATED, axum::Json(project)))
}

#[instrument(name = "ListProjects", skip_all)]
pub async fn list(
  Extension(user): Extension<User>,
) -> serror::Result<axum::Json<Vec<Project>>> {
  let projects = list_projects_for_user(&user).await?;
  Ok(axum::Json(projects))
}

#[instrument(name = "ReadProject", skip_all)]
pub async fn read(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  Query(query): Query<GetProjectQuery>,
) -> serror::Result<axum::Json<ProjectResponse>> {
  let project = get_check_ownership(&id, &user).await?;
  let docker_status = if query.docker {
    Some(project::docker_status(&project).await)
  } else {
    None
  };
  Ok(axum::Json(ProjectResponse {
    project,
    docker_status,
  }))
}

#[instrument(name = "UpdateProject", skip_all)]
pub async fn update(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  Json(body): Json<UpdateProjectBody>,
) -> serror::Result<axum::Json<Project>> {
  let project = get_check_ownership(&id, &user).await?;
  let project = project::update_project(&project, body).await?;
  Ok(axum::Json(project))
}

#[instrument(name = "DeleteProject", skip_all)]
pub async fn delete(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> serror::Result<StatusCode> {
  let project = get_check_ownership(&id, &user).await?;
  project::delete_project(&project).await?;
  info!("user {} deleted project {}", user.id, project.id);
  Ok(StatusCode::NO_CONTENT)
}
