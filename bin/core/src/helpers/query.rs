use std::str::FromStr;

use anyhow::{Context, anyhow};
use database::mungos::{
  find::find_collect,
  mongodb::{
    bson::{doc, oid::ObjectId},
    options::FindOptions,
  },
};
use refactor_client::entities::{project::Project, user::User};
use reqwest::StatusCode;
use serror::AddStatusCodeError;

use crate::state::db_client;

#[instrument(level = "debug")]
pub async fn get_user(user_id: &str) -> anyhow::Result<User> {
  let id = ObjectId::from_str(user_id)
    .context("user id is not a valid ObjectId")?;
  db_client()
    .users
    .find_one(doc! { "_id": id })
    .await
    .context("failed to query mongo for user")?
    .with_context(|| format!("no user found with id {user_id}"))
}

#[instrument(level = "debug")]
pub async fn get_project(
  project_id: &str,
) -> serror::Result<Project> {
  let not_found = || {
    anyhow!("no project found with id {project_id}")
      .status_code(StatusCode::NOT_FOUND)
  };
  let Ok(id) = ObjectId::from_str(project_id) else {
    return Err(not_found());
  };
  db_client()
    .projects
    .find_one(doc! { "_id": id })
    .await
    .context("failed to query mongo for project")?
    .ok_or_else(not_found)
}

/// Loads the project and enforces ownership.
#[instrument(level = "debug", skip(user))]
pub async fn get_check_ownership(
  project_id: &str,
  user: &User,
) -> serror::Result<Project> {
  let project = get_project(project_id).await?;
  if project.owner != user.id {
    return Err(
      anyhow!("user does not own this project")
        .status_code(StatusCode::FORBIDDEN),
    );
  }
  Ok(project)
}

#[instrument(level = "debug", skip(user))]
pub async fn list_projects_for_user(
  user: &User,
) -> anyhow::Result<Vec<Project>> {
  find_collect(
    &db_client().projects,
    doc! { "owner": &user.id },
    FindOptions::builder()
      .sort(doc! { "created_at": -1 })
      .build(),
  )
  .await
  .context("failed to pull projects from mongo")
}
