use serde::{Deserialize, Serialize};
use typeshare::typeshare;

pub mod config;
pub mod logger;
pub mod project;
pub mod user;

#[typeshare]
pub type I64 = i64;

#[typeshare(serialized_as = "MongoIdObj")]
pub type MongoId = String;

/// JSON representation of a bson ObjectId.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoIdObj {
  #[serde(rename = "$oid")]
  pub oid: String,
}

/// Unix timestamp in milliseconds.
pub fn refactor_timestamp() -> i64 {
  async_timing_util::unix_timestamp_ms() as i64
}

/// Canonical container name for a project.
///
/// Containers are always addressed by this derivation rather than the
/// persisted `container_id`, so a missing or renamed container can
/// still be reached for teardown. The id field exists for display and
/// drift detection only.
pub fn container_name(project_id: &str) -> String {
  format!("refactor-project-{project_id}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn container_name_derivation() {
    assert_eq!(
      container_name("68a1f0"),
      "refactor-project-68a1f0"
    );
  }
}
