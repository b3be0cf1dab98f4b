use std::str::FromStr;

use anyhow::{Context, anyhow};
use database::mungos::mongodb::bson::{
  Document, doc, oid::ObjectId,
};
use refactor_client::{
  api::{CreateProjectBody, UpdateProjectBody},
  entities::{
    container_name,
    project::{
      DockerStatus, Project, ProjectKind, ProjectStatus,
    },
    refactor_timestamp,
    user::User,
  },
};
use reqwest::StatusCode;
use serror::AddStatusCodeError;

use crate::{
  config::core_config,
  docker::{self, ContainerState},
  helpers::{query::get_project, workspace},
  state::db_client,
};

pub mod transition;

pub const DEFAULT_BRANCH: &str = "main";

pub async fn create_project(
  user: &User,
  body: CreateProjectBody,
) -> serror::Result<Project> {
  let (repo_url, branch) = match body.project_type {
    ProjectKind::Refactor => {
      let repo_url = body
        .repo_url
        .as_deref()
        .context("repo_url is required for REFACTOR projects")
        .map_err(bad_request)?;
      sanitize::git_url(repo_url)
        .map_err(|e| bad_request(e.into()))?;
      let branch = body
        .branch
        .clone()
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
      sanitize::branch(&branch)
        .map_err(|e| bad_request(e.into()))?;
      (Some(repo_url.to_string()), Some(branch))
    }
    // Sandboxes have no repository to clone.
    ProjectKind::Sandbox => (None, None),
  };

  let ts = refactor_timestamp();
  let project = Project {
    id: Default::default(),
    owner: user.id.clone(),
    title: body.title.unwrap_or_default(),
    description: body.description.unwrap_or_default(),
    kind: body.project_type,
    repo_url,
    branch,
    spec: body.spec,
    status: ProjectStatus::Created,
    container_id: None,
    last_error: None,
    refactor_thread_id: None,
    created_at: ts,
    updated_at: ts,
  };

  let id = db_client()
    .projects
    .insert_one(&project)
    .await
    .context("failed to insert project")?
    .inserted_id
    .as_object_id()
    .context("inserted_id is not ObjectId")?
    .to_string();

  get_project(&id).await
}

pub async fn update_project(
  project: &Project,
  body: UpdateProjectBody,
) -> serror::Result<Project> {
  let mut set = Document::new();
  if let Some(title) = body.title {
    set.insert("title", title);
  }
  if let Some(description) = body.description {
    set.insert("description", description);
  }
  if let Some(spec) = body.spec {
    set.insert("spec", spec);
  }
  if let Some(repo_url) = body.repo_url {
    if project.kind != ProjectKind::Refactor {
      return Err(bad_request(anyhow!(
        "SANDBOX projects have no repository"
      )));
    }
    if project.status != ProjectStatus::Created
      && project.repo_url.as_deref() != Some(repo_url.as_str())
    {
      return Err(bad_request(anyhow!(
        "repo_url is immutable once the project has been provisioned"
      )));
    }
    sanitize::git_url(&repo_url)
      .map_err(|e| bad_request(e.into()))?;
    set.insert("repo_url", repo_url);
  }
  if let Some(branch) = body.branch {
    if project.kind != ProjectKind::Refactor {
      return Err(bad_request(anyhow!(
        "SANDBOX projects have no repository"
      )));
    }
    sanitize::branch(&branch)
      .map_err(|e| bad_request(e.into()))?;
    set.insert("branch", branch);
  }
  if set.is_empty() {
    return Ok(project.clone());
  }
  set.insert("updated_at", refactor_timestamp());

  let id = ObjectId::from_str(&project.id)
    .context("project id is not a valid ObjectId")?;
  db_client()
    .projects
    .update_one(doc! { "_id": id }, doc! { "$set": set })
    .await
    .context("failed to update project")?;

  get_project(&project.id).await
}

/// Removes container, workspace and record, in that order. Container
/// and workspace removal are best effort: failures are logged and
/// the record is deleted regardless.
pub async fn delete_project(
  project: &Project,
) -> serror::Result<()> {
  if !transition::delete_allowed(project.status) {
    return Err(
      anyhow!(
        "project is currently provisioning, wait for it to settle"
      )
      .status_code(StatusCode::CONFLICT),
    );
  }

  if project.status != ProjectStatus::Created {
    let name = container_name(&project.id);
    if let Err(e) = docker::stop(&name, 10).await {
      debug!("delete stop of {name}: {e:#}");
    }
    if let Err(e) = docker::remove(&name, true).await {
      warn!(
        "failed to remove container {name} while deleting project {} | {e:#}",
        project.id
      );
    }
  }
  if let Err(e) = workspace::remove(
    &core_config().workspace_root,
    &project.id,
  )
  .await
  {
    warn!(
      "failed to remove workspace of project {} | {e:#}",
      project.id
    );
  }

  let id = ObjectId::from_str(&project.id)
    .context("project id is not a valid ObjectId")?;
  db_client()
    .projects
    .delete_one(doc! { "_id": id })
    .await
    .context("failed to delete project from database")?;
  Ok(())
}

/// Live container state for project reads. The persisted record is
/// never mutated here: a stale `container_id` only gets flagged, the
/// next provision / stop / delete heals it.
pub async fn docker_status(project: &Project) -> DockerStatus {
  let name = container_name(&project.id);
  match docker::inspect(&name).await {
    Ok(inspect) => {
      let inconsistent = project.container_id.is_some()
        && inspect.state == ContainerState::Missing;
      if inconsistent {
        warn!(
          "project {} holds container_id {:?} but {name} is gone",
          project.id, project.container_id
        );
      }
      DockerStatus {
        state: inspect.state.as_str().to_string(),
        name: inspect.name,
        image: inspect.image,
        inconsistent,
      }
    }
    Err(e) => {
      warn!("failed to inspect container {name} | {e:#}");
      DockerStatus {
        state: String::from("unknown"),
        ..Default::default()
      }
    }
  }
}

pub fn require_status(
  project: &Project,
  allowed: &[ProjectStatus],
) -> serror::Result<()> {
  if allowed.contains(&project.status) {
    return Ok(());
  }
  Err(
    anyhow!(
      "project is {}, operation requires {}",
      project.status,
      transition::status_list(allowed)
    )
    .status_code(StatusCode::CONFLICT),
  )
}

/// Persists the thread id handed out by the agent on the first run.
/// Conditioned on the field being absent so later runs never clobber
/// an existing conversation.
pub async fn set_thread_id(
  project_id: &str,
  thread_id: &str,
) -> anyhow::Result<()> {
  let id = ObjectId::from_str(project_id)
    .context("project id is not a valid ObjectId")?;
  db_client()
    .projects
    .update_one(
      doc! {
        "_id": id,
        "refactor_thread_id": { "$exists": false },
      },
      doc! { "$set": {
        "refactor_thread_id": thread_id,
        "updated_at": refactor_timestamp(),
      } },
    )
    .await
    .context("failed to persist agent thread id")?;
  Ok(())
}

pub async fn clear_thread_id(
  project_id: &str,
) -> anyhow::Result<()> {
  let id = ObjectId::from_str(project_id)
    .context("project id is not a valid ObjectId")?;
  db_client()
    .projects
    .update_one(
      doc! { "_id": id },
      doc! {
        "$unset": { "refactor_thread_id": "" },
        "$set": { "updated_at": refactor_timestamp() },
      },
    )
    .await
    .context("failed to clear agent thread id")?;
  Ok(())
}

fn bad_request(e: anyhow::Error) -> serror::Error {
  e.status_code(StatusCode::BAD_REQUEST)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn require_status_accepts_listed_states() {
    let project = Project {
      status: ProjectStatus::Ready,
      ..Default::default()
    };
    assert!(
      require_status(
        &project,
        &[ProjectStatus::Ready, ProjectStatus::Running]
      )
      .is_ok()
    );
    assert!(
      require_status(&project, &[ProjectStatus::Created]).is_err()
    );
  }
}
