use database::mungos::mongodb::bson::doc;
use refactor_client::entities::{
  project::ProjectStatus, refactor_timestamp,
};

use crate::state::db_client;

/// Runs once after the db connection is up, before serving.
pub async fn on_startup() {
  fail_interrupted_provisions().await;
}

/// A project left in PROVISIONING by a crash can never settle on its
/// own, the in-flight provision died with the process. Move such
/// records to FAILED so reprovision becomes available.
async fn fail_interrupted_provisions() {
  let res = db_client()
    .projects
    .update_many(
      doc! { "status": ProjectStatus::Provisioning.as_ref() },
      doc! {
        "$set": {
          "status": ProjectStatus::Failed.as_ref(),
          "last_error":
            "control plane restarted during provisioning",
          "updated_at": refactor_timestamp(),
        },
        "$unset": { "container_id": "" },
      },
    )
    .await;
  match res {
    Ok(res) if res.modified_count > 0 => {
      warn!(
        "moved {} project(s) from PROVISIONING to FAILED after restart",
        res.modified_count
      );
    }
    Ok(_) => {}
    Err(e) => {
      error!("failed to sweep PROVISIONING projects | {e:?}");
    }
  }
}
