use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use typeshare::typeshare;

use super::{I64, MongoId};

/// A user's intent to refactor a repository (or run an empty
/// sandbox), binding metadata, a host workspace and a container.
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(
  feature = "mongo",
  derive(mongo_indexed::derive::MongoIndexed)
)]
pub struct Project {
  /// The Mongo ID of the project.
  /// This field is de/serialized from/to JSON as
  /// `{ "_id": { "$oid": "..." }, ...(rest of serialized Project) }`
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty",
    with = "bson::serde_helpers::hex_string_as_object_id"
  )]
  pub id: MongoId,

  /// Id of the owning user.
  #[cfg_attr(feature = "mongo", index)]
  pub owner: String,

  #[serde(default)]
  pub title: String,

  #[serde(default)]
  pub description: String,

  /// REFACTOR projects carry a repository to clone, SANDBOX
  /// projects start from an empty workspace.
  #[serde(default, rename = "project_type")]
  pub kind: ProjectKind,

  /// Git remote cloned into the container. None for SANDBOX.
  /// Immutable once the project has left [ProjectStatus::Created].
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub repo_url: Option<String>,

  /// Git ref to clone. Defaults to `main` for REFACTOR projects.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,

  /// Natural language refactoring instruction handed to the agent.
  #[serde(default)]
  pub spec: String,

  /// Lifecycle status. Written only by the transition layer.
  #[serde(default)]
  #[cfg_attr(feature = "mongo", index)]
  pub status: ProjectStatus,

  /// Container runtime id, set when the project is provisioned.
  /// May be stale relative to the live runtime, see
  /// [DockerStatus::inconsistent].
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub container_id: Option<String>,

  /// Diagnostic from the most recent failed transition.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_error: Option<String>,

  /// Conversation id held by the in-container agent across runs.
  /// Cleared by the reset-session operation.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub refactor_thread_id: Option<String>,

  #[serde(default)]
  pub created_at: I64,

  #[serde(default)]
  pub updated_at: I64,
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ProjectKind {
  #[default]
  Refactor,
  Sandbox,
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ProjectStatus {
  /// Record exists, no container yet.
  #[default]
  Created,
  /// Transient while the provisioner is working.
  Provisioning,
  /// Container up, agent endpoint healthy.
  Ready,
  /// An agent run is active. The agent is the source of truth for
  /// run state, the control plane never persists this value itself.
  Running,
  /// Container stopped by the operator.
  Stopped,
  /// The last transition failed, `last_error` holds the diagnostic.
  Failed,
}

/// Live container state attached to project reads on request.
/// Never persisted.
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerStatus {
  /// State reported by the container runtime
  /// (`running`, `exited`, ...), or `not_found`.
  pub state: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,

  /// Set when the record holds a `container_id` but the runtime no
  /// longer knows the container. Not healed automatically, the next
  /// provision / stop / delete resolves it.
  #[serde(default, skip_serializing_if = "is_false")]
  pub inconsistent: bool,
}

fn is_false(b: &bool) -> bool {
  !b
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_serializes_screaming() {
    let s = serde_json::to_string(&ProjectStatus::Provisioning)
      .unwrap();
    assert_eq!(s, "\"PROVISIONING\"");
    assert_eq!(ProjectStatus::Ready.as_ref(), "READY");
  }

  #[test]
  fn kind_round_trip() {
    let kind: ProjectKind =
      serde_json::from_str("\"SANDBOX\"").unwrap();
    assert_eq!(kind, ProjectKind::Sandbox);
    assert_eq!(kind.to_string(), "SANDBOX");
  }

  #[test]
  fn project_serializes_kind_as_project_type() {
    let project = Project {
      kind: ProjectKind::Refactor,
      ..Default::default()
    };
    let json = serde_json::to_value(&project).unwrap();
    assert_eq!(json["project_type"], "REFACTOR");
  }
}
