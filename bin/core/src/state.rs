use std::sync::OnceLock;

use crate::{auth::jwt::JwtClient, config::core_config};

static DB_CLIENT: OnceLock<database::Client> = OnceLock::new();

pub fn db_client() -> &'static database::Client {
  DB_CLIENT
    .get()
    .expect("db client accessed before initialization")
}

pub async fn init_db_client() {
  let client = database::Client::new(&core_config().database)
    .await
    .expect("failed to initialize database client");
  if DB_CLIENT.set(client).is_err() {
    panic!("db client initialized twice");
  }
}

pub fn jwt_client() -> &'static JwtClient {
  static JWT_CLIENT: OnceLock<JwtClient> = OnceLock::new();
  JWT_CLIENT.get_or_init(|| JwtClient::new(core_config()))
}
