//! Bearer service-token check, as a middleware and a standalone verifier.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::{HeaderMap, header},
  middleware::Next,
  response::Response,
};

use crate::error::Error;

/// The accepted service token, kept only as its argon2 hash.
#[derive(Debug, Clone)]
pub struct TokenAuth {
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  token_hash: String,
}

impl TokenAuth {
  /// Fails when `token_hash` is not a PHC string.
  pub fn new(token_hash: impl Into<String>) -> Result<Self, Error> {
    let token_hash = token_hash.into();
    PasswordHash::new(&token_hash)
      .map_err(|e| Error::Config(format!("service_token_hash is not an argon2 hash: {e}")))?;
    Ok(Self { token_hash })
  }
}

/// Verify the `Authorization: Bearer` header against `auth`.
pub fn verify_bearer(headers: &HeaderMap, auth: &TokenAuth) -> Result<(), Error> {
  let token = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or(Error::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&auth.token_hash).map_err(|_| Error::Unauthorized)?;
  Argon2::default()
    .verify_password(token.as_bytes(), &parsed_hash)
    .map_err(|_| Error::Unauthorized)
}

/// Middleware rejecting requests without a valid service token.
pub async fn require_token(
  State(auth): State<Arc<TokenAuth>>,
  request: Request,
  next: Next,
) -> Result<Response, Error> {
  verify_bearer(request.headers(), &auth)?;
  Ok(next.run(request).await)
}
