//! The project state machine.
//!
//! Single writer of `status`, `container_id` and `last_error`. Every
//! write conditions on the pre-transition status, so state-changing
//! operations on one project serialize here and the loser of a race
//! surfaces a conflict instead of double-writing.

use std::str::FromStr;

use anyhow::{Context, anyhow};
use database::mungos::mongodb::{
  bson::{Bson, Document, doc, oid::ObjectId},
  options::ReturnDocument,
};
use refactor_client::entities::{
  project::{Project, ProjectStatus},
  refactor_timestamp,
};
use reqwest::StatusCode;
use serror::AddStatusCodeError;

use crate::state::db_client;

/// Legal source states per operation.
pub const PROVISION_FROM: &[ProjectStatus] =
  &[ProjectStatus::Created];
pub const REPROVISION_FROM: &[ProjectStatus] = &[
  ProjectStatus::Ready,
  ProjectStatus::Stopped,
  ProjectStatus::Failed,
];
pub const STOP_FROM: &[ProjectStatus] =
  &[ProjectStatus::Ready, ProjectStatus::Running];

/// Delete is legal from every state except a provision in flight.
pub fn delete_allowed(status: ProjectStatus) -> bool {
  status != ProjectStatus::Provisioning
}

/// Optional field write within a transition.
#[derive(Debug, Clone, Default)]
pub enum Field<T> {
  #[default]
  Keep,
  Clear,
  Set(T),
}

/// Performs one status transition, conditioned on the project still
/// being in one of `from`. Returns the post-transition record, or a
/// 409 when another writer got there first.
pub async fn transition(
  project_id: &str,
  from: &[ProjectStatus],
  to: ProjectStatus,
  container_id: Field<String>,
  last_error: Field<String>,
) -> serror::Result<Project> {
  let id = ObjectId::from_str(project_id)
    .context("project id is not a valid ObjectId")?;
  let project = db_client()
    .projects
    .find_one_and_update(
      cas_filter(id, from),
      build_update(to, container_id, last_error),
    )
    .return_document(ReturnDocument::After)
    .await
    .context("failed to write project status transition")?;
  match project {
    Some(project) => Ok(project),
    None => Err(
      anyhow!(
        "conflicting state: project is no longer in {}",
        status_list(from)
      )
      .status_code(StatusCode::CONFLICT),
    ),
  }
}

pub fn status_list(statuses: &[ProjectStatus]) -> String {
  statuses
    .iter()
    .map(|status| status.as_ref())
    .collect::<Vec<&str>>()
    .join(" | ")
}

fn cas_filter(id: ObjectId, from: &[ProjectStatus]) -> Document {
  let from = from
    .iter()
    .map(|status| Bson::String(status.as_ref().to_string()))
    .collect::<Vec<_>>();
  doc! { "_id": id, "status": { "$in": from } }
}

fn build_update(
  to: ProjectStatus,
  container_id: Field<String>,
  last_error: Field<String>,
) -> Document {
  let mut set = doc! {
    "status": to.as_ref(),
    "updated_at": refactor_timestamp(),
  };
  let mut unset = Document::new();
  match container_id {
    Field::Keep => {}
    Field::Clear => {
      unset.insert("container_id", "");
    }
    Field::Set(id) => {
      set.insert("container_id", id);
    }
  }
  match last_error {
    Field::Keep => {}
    Field::Clear => {
      unset.insert("last_error", "");
    }
    Field::Set(error) => {
      set.insert("last_error", error);
    }
  }
  let mut update = doc! { "$set": set };
  if !unset.is_empty() {
    update.insert("$unset", unset);
  }
  update
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn provision_only_from_created() {
    assert_eq!(PROVISION_FROM, &[ProjectStatus::Created]);
    assert!(!PROVISION_FROM.contains(&ProjectStatus::Provisioning));
  }

  #[test]
  fn reprovision_from_settled_states_only() {
    for status in
      [ProjectStatus::Ready, ProjectStatus::Stopped, ProjectStatus::Failed]
    {
      assert!(REPROVISION_FROM.contains(&status));
    }
    assert!(
      !REPROVISION_FROM.contains(&ProjectStatus::Provisioning)
    );
    assert!(!REPROVISION_FROM.contains(&ProjectStatus::Created));
  }

  #[test]
  fn delete_blocked_only_while_provisioning() {
    assert!(!delete_allowed(ProjectStatus::Provisioning));
    for status in [
      ProjectStatus::Created,
      ProjectStatus::Ready,
      ProjectStatus::Running,
      ProjectStatus::Stopped,
      ProjectStatus::Failed,
    ] {
      assert!(delete_allowed(status));
    }
  }

  #[test]
  fn cas_filter_conditions_on_source_states() {
    let id = ObjectId::new();
    let filter = cas_filter(id, STOP_FROM);
    assert_eq!(filter.get_object_id("_id").unwrap(), id);
    let states = filter
      .get_document("status")
      .unwrap()
      .get_array("$in")
      .unwrap();
    assert_eq!(
      states,
      &vec![
        Bson::String(String::from("READY")),
        Bson::String(String::from("RUNNING")),
      ]
    );
  }

  #[test]
  fn update_sets_status_and_handles_field_writes() {
    let update = build_update(
      ProjectStatus::Ready,
      Field::Set(String::from("c0ffee")),
      Field::Clear,
    );
    let set = update.get_document("$set").unwrap();
    assert_eq!(set.get_str("status").unwrap(), "READY");
    assert_eq!(set.get_str("container_id").unwrap(), "c0ffee");
    assert!(set.get("updated_at").is_some());
    let unset = update.get_document("$unset").unwrap();
    assert!(unset.get("last_error").is_some());
    assert!(unset.get("container_id").is_none());
  }

  #[test]
  fn update_without_field_writes_has_no_unset() {
    let update = build_update(
      ProjectStatus::Stopped,
      Field::Keep,
      Field::Keep,
    );
    assert!(update.get_document("$unset").is_err());
    let set = update.get_document("$set").unwrap();
    assert_eq!(set.get_str("status").unwrap(), "STOPPED");
    assert!(set.get("container_id").is_none());
  }
}
