use anyhow::{Context, anyhow};
use axum::{
  extract::Request, http::HeaderMap, middleware::Next,
  response::Response,
};
use refactor_client::entities::user::User;
use reqwest::StatusCode;
use serror::AddStatusCode;

use crate::{helpers::query::get_user, state::jwt_client};

pub mod jwt;

/// Authenticates the request against the bearer token and attaches
/// the resolved [User] as a request extension. Layered onto every
/// route except the health check.
pub async fn auth_request(
  mut req: Request,
  next: Next,
) -> serror::Result<Response> {
  let user = authenticate_headers(req.headers())
    .await
    .status_code(StatusCode::UNAUTHORIZED)?;
  req.extensions_mut().insert(user);
  Ok(next.run(req).await)
}

async fn authenticate_headers(
  headers: &HeaderMap,
) -> anyhow::Result<User> {
  let token = bearer_token(headers)?;
  let claims = jwt_client().decode(token)?;
  let user = get_user(&claims.id).await?;
  if !user.enabled {
    return Err(anyhow!("user not enabled"));
  }
  Ok(user)
}

fn bearer_token(headers: &HeaderMap) -> anyhow::Result<&str> {
  headers
    .get("authorization")
    .context("no authorization header")?
    .to_str()
    .context("authorization header is not valid utf-8")?
    .strip_prefix("Bearer ")
    .context("authorization header must be 'Bearer <token>'")
}
