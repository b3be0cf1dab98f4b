//! Container stdout / stderr tail as SSE.

use std::{convert::Infallible, time::Duration};

use anyhow::anyhow;
use axum::{
  Extension,
  extract::{Path, Query},
  response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};
use refactor_client::{
  api::LogStreamQuery,
  entities::{container_name, user::User},
};
use reqwest::StatusCode;
use serror::AddStatusCodeError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{docker, helpers::query::get_check_ownership};

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[instrument(name = "StreamContainerLogs", skip_all)]
pub async fn stream(
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  Query(query): Query<LogStreamQuery>,
) -> serror::Result<
  Sse<impl Stream<Item = Result<Event, Infallible>>>,
> {
  let project = get_check_ownership(&id, &user).await?;
  if project.container_id.is_none() {
    return Err(
      anyhow!("project has no container")
        .status_code(StatusCode::CONFLICT),
    );
  }
  let lines = docker::logs(
    &container_name(&project.id),
    query.tail,
    query.follow,
  )?;

  let (tx, rx) = mpsc::channel::<Event>(64);
  tokio::spawn(pump(lines, tx));

  // Keep-alive is carried in-band as `ping` events, no comment
  // frames on top.
  Ok(Sse::new(ReceiverStream::new(rx).map(Ok)))
}

/// One `log` event per line, a `ping` after every 30s without one.
/// Ends when the container exits (line stream closes) or the client
/// disconnects.
async fn pump(mut lines: docker::LogStream, tx: mpsc::Sender<Event>) {
  loop {
    let next = tokio::select! {
      next = lines.next() => next,
      _ = tx.closed() => return,
      _ = tokio::time::sleep(PING_INTERVAL) => {
        let ping =
          Event::default().event("ping").data("keep-alive");
        if tx.send(ping).await.is_err() {
          return;
        }
        continue;
      }
    };
    match next {
      Some(line) => {
        let event = Event::default().event("log").data(line);
        if tx.send(event).await.is_err() {
          return;
        }
      }
      None => return,
    }
  }
}
