//! HTTP Basic authentication against the people table, plus `/login`.
//!
//! Credentials are `email:password`. The e-mail is normalised before lookup
//! and the password is checked against the person's argon2 PHC string.

use std::sync::Arc;

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::{self, SaltString},
};
use axum::{
  Json,
  extract::{FromRequestParts, State},
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tesis_core::{
  person::{Person, Role},
  store::ThesisStore,
};

use crate::{error::ApiError, extract::JsonBody};

/// The authenticated caller. Present in a handler means the request carried
/// valid credentials.
#[derive(Debug, Clone)]
pub struct Actor(pub Person);

impl Actor {
  /// Reject callers that do not hold `role`.
  pub fn require(&self, role: Role, what: &str) -> Result<(), ApiError> {
    if self.0.is(role) {
      Ok(())
    } else {
      Err(tesis_core::Error::Eligibility(format!("solo un {role} puede {what}")).into())
    }
  }
}

/// Produce a PHC string for `password` with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Extract `(email, password)` from an `Authorization: Basic` header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let encoded = value.strip_prefix("Basic ")?;
  let decoded = B64.decode(encoded).ok()?;
  let creds = String::from_utf8(decoded).ok()?;
  let (email, password) = creds.split_once(':')?;
  Some((email.to_owned(), password.to_owned()))
}

/// Look `email` up and verify `password` against the stored hash.
pub async fn authenticate<S: ThesisStore>(
  store: &S,
  email: &str,
  password: &str,
) -> Result<Person, ApiError> {
  let Some((person, hash)) =
    store.credentials(email.to_owned()).await.map_err(ApiError::store)?
  else {
    tracing::debug!(email, "login for unknown e-mail");
    return Err(tesis_core::Error::Auth.into());
  };

  let parsed = PasswordHash::new(&hash).map_err(|_| tesis_core::Error::Auth)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .map_err(|_| tesis_core::Error::Auth)?;

  Ok(person)
}

impl<S> FromRequestParts<Arc<S>> for Actor
where
  S: ThesisStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    store: &Arc<S>,
  ) -> Result<Self, Self::Rejection> {
    let (email, password) =
      basic_credentials(&parts.headers).ok_or(tesis_core::Error::Auth)?;
    let person = authenticate(store.as_ref(), &email, &password).await?;
    Ok(Actor(person))
  }
}

// ─── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
  pub role:   Role,
  /// Landing page for the role in the web client.
  pub url:    &'static str,
  pub person: Person,
}

/// `POST /login`, body: `{"email":"…","password":"…"}`
pub async fn login<S: ThesisStore>(
  State(store): State<Arc<S>>,
  JsonBody(body): JsonBody<LoginBody>,
) -> Result<Json<LoginResponse>, ApiError> {
  let person = authenticate(store.as_ref(), &body.email, &body.password).await?;
  tracing::info!(person_id = %person.person_id, role = %person.role, "login");
  Ok(Json(LoginResponse {
    role:   person.role,
    url:    person.role.landing_path(),
    person,
  }))
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  fn basic(user: &str, pass: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = format!("Basic {}", B64.encode(format!("{user}:{pass}")));
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
    headers
  }

  #[test]
  fn parses_basic_header() {
    let creds = basic_credentials(&basic("ana@uni.cl", "se:creto"));
    assert_eq!(creds, Some(("ana@uni.cl".into(), "se:creto".into())));
  }

  #[test]
  fn rejects_malformed_headers() {
    assert_eq!(basic_credentials(&HeaderMap::new()), None);

    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
    assert_eq!(basic_credentials(&headers), None);

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
    assert_eq!(basic_credentials(&headers), None);
  }

  #[test]
  fn hashes_verify() {
    let hash = hash_password("secreto").unwrap();
    let parsed = PasswordHash::new(&hash).unwrap();
    assert!(Argon2::default().verify_password(b"secreto", &parsed).is_ok());
    assert!(Argon2::default().verify_password(b"otro", &parsed).is_err());
  }
}
