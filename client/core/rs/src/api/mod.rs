//! Request / response bodies of the public HTTP surface.

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::entities::{
  I64,
  project::{DockerStatus, Project, ProjectKind},
};

// == PROJECTS ==

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectBody {
  pub project_type: ProjectKind,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  /// Required for REFACTOR projects.
  #[serde(default)]
  pub repo_url: Option<String>,
  /// Defaults to `main` for REFACTOR projects.
  #[serde(default)]
  pub branch: Option<String>,
  pub spec: String,
}

/// Partial update. `repo_url` and `branch` are only writable while
/// the project is still CREATED.
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectBody {
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub spec: Option<String>,
  #[serde(default)]
  pub repo_url: Option<String>,
  #[serde(default)]
  pub branch: Option<String>,
}

#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetProjectQuery {
  /// Also inspect the live container and attach `docker_status`.
  #[serde(default)]
  pub docker: bool,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
  #[serde(flatten)]
  pub project: Project,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub docker_status: Option<DockerStatus>,
}

// == EXECUTE ==

#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionBody {
  /// Per-call dev mode override. Only affects container creation
  /// args, never persisted.
  #[serde(default)]
  pub dev_mode: Option<bool>,
}

/// Arbitrary command run inside the project container
/// (admin / debug). The argument vector is passed through verbatim,
/// never a shell.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecBody {
  pub argv: Vec<String>,
  #[serde(default)]
  pub workdir: Option<String>,
  /// Seconds. Default: 300
  #[serde(default)]
  pub timeout_secs: Option<u64>,
}

#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResponse {
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

// == AGENT RUNS ==

#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRunBody {
  /// Override the stored project spec for this run only.
  #[serde(default)]
  pub spec: Option<String>,
  /// Model override passed through to the agent.
  #[serde(default)]
  pub model: Option<String>,
}

/// Client-visible vocabulary for agent task state.
#[typeshare]
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
  Running,
  Done,
  Failed,
  Stopped,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStartResponse {
  /// The agent's task id, passed through.
  pub run_id: String,
  pub project_id: String,
  pub status: RunStatus,
  pub phase: String,
  pub created_at: I64,
  pub message: String,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
  pub id: String,
  pub project_id: String,
  pub status: RunStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phase: Option<String>,
  /// Timestamps are forwarded from the agent verbatim.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub finished_at: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
}

// == LOGS ==

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStreamQuery {
  /// Keep following after the tail is drained. Default: true
  #[serde(default = "default_follow")]
  pub follow: bool,
  /// Lines of history to start with. Default: 100
  #[serde(default = "default_tail")]
  pub tail: u64,
}

fn default_follow() -> bool {
  true
}

fn default_tail() -> u64 {
  100
}

impl Default for LogStreamQuery {
  fn default() -> Self {
    Self {
      follow: default_follow(),
      tail: default_tail(),
    }
  }
}

// == FILES ==

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContentQuery {
  /// Path relative to the container workspace root.
  pub path: String,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContentResponse {
  pub content: String,
  #[serde(default, skip_serializing_if = "is_false")]
  pub truncated: bool,
}

#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsNode {
  #[serde(rename = "type")]
  pub kind: FsNodeType,
  pub name: String,
  /// Path relative to the workspace root.
  pub path: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub children: Option<Vec<FsNode>>,
}

#[typeshare]
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FsNodeType {
  File,
  Directory,
}

fn is_false(b: &bool) -> bool {
  !b
}
