use axum::{
  Router, middleware,
  routing::{get, post},
};

use crate::auth::auth_request;

mod agent;
mod execute;
mod files;
mod logs;
mod projects;

pub fn router() -> Router {
  Router::new()
    .route("/health", get(|| async { "OK" }))
    .nest("/projects", projects_router())
}

fn projects_router() -> Router {
  Router::new()
    .route("/", post(projects::create).get(projects::list))
    .route(
      "/{id}",
      get(projects::read)
        .put(projects::update)
        .delete(projects::delete),
    )
    .route("/{id}/provision", post(execute::provision))
    .route("/{id}/reprovision", post(execute::reprovision))
    .route("/{id}/stop", post(execute::stop))
    .route("/{id}/exec", post(execute::exec))
    .route("/{id}/logs/stream", get(logs::stream))
    .route("/{id}/files/tree", get(files::tree))
    .route("/{id}/files/content", get(files::content))
    .route("/{id}/agent/run", post(agent::start_run))
    .route("/{id}/agent/runs", get(agent::list_runs))
    .route("/{id}/agent/runs/{run_id}", get(agent::run_detail))
    .route(
      "/{id}/agent/runs/{run_id}/stop",
      post(agent::stop_run),
    )
    .route(
      "/{id}/agent/runs/{run_id}/stream",
      get(agent::stream_run),
    )
    .route("/{id}/agent/reset-session", post(agent::reset_session))
    .layer(middleware::from_fn(auth_request))
}
