use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use super::MongoId;

/// Account record. Issued and managed by the auth service, the
/// control plane only reads it for ownership checks.
#[typeshare]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(
  feature = "mongo",
  derive(mongo_indexed::derive::MongoIndexed)
)]
pub struct User {
  /// The Mongo ID of the user.
  /// This field is de/serialized from/to JSON as
  /// `{ "_id": { "$oid": "..." }, ...(rest of serialized User) }`
  #[serde(
    default,
    rename = "_id",
    skip_serializing_if = "String::is_empty",
    with = "bson::serde_helpers::hex_string_as_object_id"
  )]
  pub id: MongoId,

  #[cfg_attr(feature = "mongo", unique_index)]
  pub username: String,

  #[serde(default)]
  #[cfg_attr(feature = "mongo", index)]
  pub email: String,

  /// Disabled users fail authentication at the edge.
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

fn default_enabled() -> bool {
  true
}
