use anyhow::{Context, anyhow};
use mungos::{
  init::MongoBuilder,
  mongodb::{
    Collection, Database, IndexModel, bson::doc,
    options::IndexOptions,
  },
};
use refactor_client::entities::{
  config::DatabaseConfig, project::Project, user::User,
};

pub use mongo_indexed;
pub use mungos;

#[derive(Debug)]
pub struct Client {
  /// Owned by the auth service. Read-only here.
  pub users: Collection<User>,
  pub projects: Collection<Project>,
  pub db: Database,
}

impl Client {
  pub async fn new(
    config: &DatabaseConfig,
  ) -> anyhow::Result<Client> {
    let db = init(config).await?;
    let client = Client {
      users: mongo_indexed::collection(&db, true).await?,
      projects: mongo_indexed::collection(&db, true).await?,
      db,
    };

    // A container backs at most one project record. Sparse, so any
    // number of unprovisioned records may have no container at all.
    client
      .projects
      .create_index(
        IndexModel::builder()
          .keys(doc! { "container_id": 1 })
          .options(
            IndexOptions::builder()
              .unique(true)
              .sparse(true)
              .build(),
          )
          .build(),
      )
      .await
      .context("failed to create unique container_id index")?;

    Ok(client)
  }
}

/// Initializes unindexed database handle.
pub async fn init(
  DatabaseConfig {
    uri,
    address,
    username,
    password,
    app_name,
    db_name,
  }: &DatabaseConfig,
) -> anyhow::Result<Database> {
  let mut client = MongoBuilder::default().app_name(app_name);

  match (
    !uri.is_empty(),
    !address.is_empty(),
    !username.is_empty(),
    !password.is_empty(),
  ) {
    (true, _, _, _) => {
      client = client.uri(uri);
    }
    (_, true, true, true) => {
      client = client
        .address(address)
        .username(username)
        .password(password);
    }
    (_, true, _, _) => {
      client = client.address(address);
    }
    _ => {
      return Err(anyhow!(
        "'config.database' not configured correctly. must pass either 'config.database.uri', or 'config.database.address' + 'config.database.username' + 'config.database.password'"
      ));
    }
  }

  let client = client
    .build()
    .await
    .context("failed to initialize database connection")?;

  Ok(client.database(db_name))
}
