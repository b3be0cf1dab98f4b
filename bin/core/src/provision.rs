//! Provisioning: create the project container, clone the repository
//! into it, and wait for the in-container agent to come up. Every
//! failure path runs compensating teardown so no record is ever left
//! pointing at a container that is not known-good.

use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use refactor_client::entities::{
  container_name,
  project::{Project, ProjectKind, ProjectStatus},
};
use reqwest::StatusCode;
use serror::AddStatusCodeError;

use crate::{
  config::core_config,
  docker::{self, ContainerSpec, Mount},
  helpers::{self, workspace},
  project::{
    DEFAULT_BRANCH,
    transition::{
      self, Field, PROVISION_FROM, REPROVISION_FROM, STOP_FROM,
    },
  },
};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STOP_TIMEOUT_SECS: u64 = 10;
/// Cap on persisted `last_error`, keeps records readable.
const MAX_ERROR_LEN: usize = 4096;

#[instrument(skip(project), fields(project_id = %project.id))]
pub async fn provision(
  project: Project,
  dev_mode_override: Option<bool>,
) -> serror::Result<Project> {
  let project = transition::transition(
    &project.id,
    PROVISION_FROM,
    ProjectStatus::Provisioning,
    Field::Keep,
    Field::Clear,
  )
  .await?;
  run_to_ready(project, dev_mode_override).await
}

/// Teardown-then-provision, for projects that already went through a
/// provision once.
#[instrument(skip(project), fields(project_id = %project.id))]
pub async fn reprovision(
  project: Project,
  dev_mode_override: Option<bool>,
) -> serror::Result<Project> {
  let project = transition::transition(
    &project.id,
    REPROVISION_FROM,
    ProjectStatus::Provisioning,
    Field::Clear,
    Field::Clear,
  )
  .await?;
  // Whatever the previous provision left behind goes away first.
  teardown(&container_name(&project.id)).await;
  run_to_ready(project, dev_mode_override).await
}

/// Stops the project container. Unlike provisioning, failures here
/// leave the record in its prior state and surface to the caller.
#[instrument(skip(project), fields(project_id = %project.id))]
pub async fn stop(project: Project) -> serror::Result<Project> {
  if project.status == ProjectStatus::Stopped {
    // Stopping twice is a no-op.
    return Ok(project);
  }
  crate::project::require_status(&project, STOP_FROM)?;
  if project.container_id.is_none() {
    return Err(
      anyhow!("project has no container to stop")
        .status_code(StatusCode::CONFLICT),
    );
  }
  docker::stop(&container_name(&project.id), STOP_TIMEOUT_SECS)
    .await
    .context("failed to stop project container")?;
  transition::transition(
    &project.id,
    STOP_FROM,
    ProjectStatus::Stopped,
    Field::Keep,
    Field::Keep,
  )
  .await
}

async fn run_to_ready(
  project: Project,
  dev_mode_override: Option<bool>,
) -> serror::Result<Project> {
  let dev_mode =
    dev_mode_override.unwrap_or(core_config().dev_mode);
  let name = container_name(&project.id);
  match build_and_start(&project, &name, dev_mode).await {
    Ok(container_id) => {
      let project = transition::transition(
        &project.id,
        &[ProjectStatus::Provisioning],
        ProjectStatus::Ready,
        Field::Set(container_id),
        Field::Keep,
      )
      .await?;
      info!(
        "project {} provisioned, container {name} ready",
        project.id
      );
      Ok(project)
    }
    Err(e) => {
      warn!("provision of project {} failed | {e:#}", project.id);
      teardown(&name).await;
      let message = truncate_error(&format!("{e:#}"));
      // Compensation must not raise.
      if let Err(te) = transition::transition(
        &project.id,
        &[ProjectStatus::Provisioning],
        ProjectStatus::Failed,
        Field::Clear,
        Field::Set(message),
      )
      .await
      {
        error!(
          "failed to mark project {} FAILED | {:#}",
          project.id, te.error
        );
      }
      Err(e.into())
    }
  }
}

async fn build_and_start(
  project: &Project,
  name: &str,
  dev_mode: bool,
) -> anyhow::Result<String> {
  let config = core_config();
  let paths =
    workspace::ensure(&config.workspace_root, &project.id)
      .await
      .context("failed to prepare project workspace")?;

  let mut env = vec![
    (String::from("PROJECT_ID"), project.id.clone()),
    (String::from("AI_PROVIDER"), config.ai_provider.clone()),
  ];
  if !config.agent_database_url.is_empty() {
    env.push((
      String::from("DATABASE_URL"),
      config.agent_database_url.clone(),
    ));
  }

  let mut mounts = vec![
    Mount {
      host: paths.repo.display().to_string(),
      container: workspace::CONTAINER_REPO.to_string(),
      read_only: false,
    },
    Mount {
      host: paths.artifacts.display().to_string(),
      container: workspace::CONTAINER_ARTIFACTS.to_string(),
      read_only: false,
    },
  ];
  if let Some(credentials) = &config.ai_credentials_path {
    env.push((
      String::from("AI_CREDENTIALS_PATH"),
      workspace::CONTAINER_CREDENTIALS.to_string(),
    ));
    mounts.push(Mount {
      host: credentials.display().to_string(),
      container: workspace::CONTAINER_CREDENTIALS.to_string(),
      read_only: true,
    });
  }
  if dev_mode {
    let source = config.dev_agent_source.as_ref().context(
      "dev mode is active but dev_agent_source is not configured",
    )?;
    mounts.push(Mount {
      host: source.display().to_string(),
      container: workspace::CONTAINER_AGENT_SOURCE.to_string(),
      read_only: false,
    });
  }

  let container_id = docker::create(&ContainerSpec {
    name: name.to_string(),
    image: config.container_image.clone(),
    network: config.container_network.clone(),
    env,
    mounts,
    cpus: config.container_cpus,
    memory: config.container_memory.clone(),
  })
  .await
  .context("failed to create project container")?;

  docker::start(name)
    .await
    .context("failed to start project container")?;

  if project.kind == ProjectKind::Refactor {
    clone_repo(project, name).await?;
  }

  wait_for_agent(&project.id).await?;

  Ok(container_id)
}

async fn clone_repo(
  project: &Project,
  name: &str,
) -> anyhow::Result<()> {
  let config = core_config();
  // Re-validated right before the exec, so the driver only ever
  // sees clean strings no matter who wrote the record.
  let repo_url = sanitize::git_url(
    project
      .repo_url
      .as_deref()
      .context("REFACTOR project has no repo_url")?,
  )
  .map_err(anyhow::Error::from)?;
  let branch = sanitize::branch(
    project.branch.as_deref().unwrap_or(DEFAULT_BRANCH),
  )
  .map_err(anyhow::Error::from)?;

  let argv = vec![
    String::from("git"),
    String::from("clone"),
    String::from("--depth"),
    config.clone_depth.to_string(),
    String::from("--branch"),
    branch.to_string(),
    repo_url.to_string(),
    workspace::CONTAINER_REPO.to_string(),
  ];
  let output = docker::exec(
    name,
    &argv,
    None,
    Duration::from_secs(config.clone_timeout_secs),
  )
  .await
  .map_err(|e| {
    if e.is_timeout() {
      anyhow!(
        "git clone timed out after {}s",
        config.clone_timeout_secs
      )
    } else {
      anyhow::Error::from(e).context("failed to exec git clone")
    }
  })?;
  if !output.success() {
    return Err(anyhow!(
      "git clone exited with code {:?}: {}",
      output.exit_code,
      output.stderr.trim()
    ));
  }
  Ok(())
}

async fn wait_for_agent(project_id: &str) -> anyhow::Result<()> {
  let agent = helpers::agent(project_id);
  let deadline = Instant::now() + HEALTH_TIMEOUT;
  loop {
    match agent.health().await {
      Ok(()) => return Ok(()),
      Err(e) => {
        if Instant::now() >= deadline {
          return Err(e.context(format!(
            "agent did not become healthy within {}s",
            HEALTH_TIMEOUT.as_secs()
          )));
        }
      }
    }
    tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
  }
}

/// Best effort stop + force remove of a partially provisioned
/// container. Never raises.
async fn teardown(name: &str) {
  if let Err(e) = docker::stop(name, STOP_TIMEOUT_SECS).await {
    debug!("teardown stop of {name}: {e:#}");
  }
  if let Err(e) = docker::remove(name, true).await {
    debug!("teardown remove of {name}: {e:#}");
  }
}

fn truncate_error(message: &str) -> String {
  if message.len() <= MAX_ERROR_LEN {
    return message.to_string();
  }
  let mut end = MAX_ERROR_LEN;
  while !message.is_char_boundary(end) {
    end -= 1;
  }
  format!("{} [truncated]", &message[..end])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_errors_pass_through() {
    assert_eq!(truncate_error("clone failed"), "clone failed");
  }

  #[test]
  fn long_errors_are_truncated_on_char_boundaries() {
    let message = "é".repeat(MAX_ERROR_LEN);
    let truncated = truncate_error(&message);
    assert!(truncated.ends_with(" [truncated]"));
    assert!(truncated.len() <= MAX_ERROR_LEN + " [truncated]".len());
  }
}
