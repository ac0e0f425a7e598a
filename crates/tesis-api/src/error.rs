//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! | Rejection | Status |
//! |-----------|--------|
//! | validation, malformed body, query or path | 400 |
//! | auth | 401 |
//! | eligibility | 403 |
//! | not found | 404 |
//! | capacity, conflict, state | 409 |
//! | anything else | 500 |

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use tesis_core::store::StoreError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Rejected(#[from] tesis_core::Error),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Split a backend error into a domain rejection or an internal failure.
  pub fn store<E: StoreError>(err: E) -> Self {
    match err.into_rejection() {
      Ok(rejection) => Self::Rejected(rejection),
      Err(other) => Self::Store(Box::new(other)),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

fn status_of(rejection: &tesis_core::Error) -> StatusCode {
  use tesis_core::Error as E;
  match rejection {
    E::Validation(_) => StatusCode::BAD_REQUEST,
    E::Auth => StatusCode::UNAUTHORIZED,
    E::Eligibility(_) => StatusCode::FORBIDDEN,
    E::NotFound { .. } => StatusCode::NOT_FOUND,
    E::Capacity(_) | E::Conflict(_) | E::State(_) => StatusCode::CONFLICT,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Rejected(tesis_core::Error::Validation(fields)) => (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "validation", "fields": fields })),
      )
        .into_response(),
      ApiError::Rejected(tesis_core::Error::Auth) => (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"tesis\"")],
        Json(json!({ "error": "auth", "detail": "credenciales inválidas" })),
      )
        .into_response(),
      ApiError::Rejected(rejection) => {
        let detail = match &rejection {
          tesis_core::Error::Eligibility(m)
          | tesis_core::Error::Capacity(m)
          | tesis_core::Error::Conflict(m)
          | tesis_core::Error::State(m) => m.clone(),
          other => other.to_string(),
        };
        (status_of(&rejection), Json(json!({ "error": rejection.kind(), "detail": detail })))
          .into_response()
      }
      ApiError::BadRequest(detail) => (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "bad_request", "detail": detail })),
      )
        .into_response(),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "error": "internal", "detail": e.to_string() })),
        )
          .into_response()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn rejection_statuses() {
    let cases = [
      (tesis_core::Error::invalid("title", "x"), StatusCode::BAD_REQUEST),
      (tesis_core::Error::Auth, StatusCode::UNAUTHORIZED),
      (tesis_core::Error::Eligibility("x".into()), StatusCode::FORBIDDEN),
      (tesis_core::Error::not_found("topic", Uuid::nil()), StatusCode::NOT_FOUND),
      (tesis_core::Error::Capacity("x".into()), StatusCode::CONFLICT),
      (tesis_core::Error::State("x".into()), StatusCode::CONFLICT),
    ];
    for (rejection, status) in cases {
      assert_eq!(ApiError::from(rejection).into_response().status(), status);
    }
  }
}
