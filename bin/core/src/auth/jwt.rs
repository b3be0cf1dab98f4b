use anyhow::Context;
use jsonwebtoken::{DecodingKey, Validation, decode};
use refactor_client::entities::config::CoreConfig;
use serde::{Deserialize, Serialize};

use crate::helpers::random_string;

#[derive(Serialize, Deserialize)]
pub struct JwtClaims {
  pub id: String,
  pub iat: u128,
  pub exp: u128,
}

/// Validates the bearer tokens minted by the auth service.
/// The control plane never issues tokens itself.
pub struct JwtClient {
  validation: Validation,
  decoding_key: DecodingKey,
}

impl JwtClient {
  pub fn new(config: &CoreConfig) -> JwtClient {
    let secret = if config.jwt_secret.is_empty() {
      warn!(
        "REFACTOR_JWT_SECRET is empty, using a random secret. Tokens issued by the auth service will not validate."
      );
      random_string(40)
    } else {
      config.jwt_secret.clone()
    };
    JwtClient {
      validation: Validation::new(Default::default()),
      decoding_key: DecodingKey::from_secret(secret.as_bytes()),
    }
  }

  pub fn decode(&self, jwt: &str) -> anyhow::Result<JwtClaims> {
    decode::<JwtClaims>(jwt, &self.decoding_key, &self.validation)
      .map(|res| res.claims)
      .context("failed to decode token claims")
  }
}
