//! Handlers for `/people` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/people` | Optional `?rol=alumno\|docente\|coordinador` |
//! | `GET`  | `/people/me` | The authenticated caller |
//! | `GET`  | `/people/{id}` | 404 if not found |
//! | `POST` | `/people` | Coordinators only |

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tesis_core::{
  person::{NewPerson, Person, Role},
  store::ThesisStore,
};
use uuid::Uuid;

use crate::{
  auth::{Actor, hash_password},
  error::ApiError,
  extract::{JsonBody, PathParam, QueryParams},
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub rol: Option<Role>,
}

/// `GET /people[?rol=<role>]`
pub async fn list<S: ThesisStore>(
  State(store): State<Arc<S>>,
  _actor: Actor,
  QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Person>>, ApiError> {
  let people = store.list_people(params.rol).await.map_err(ApiError::store)?;
  Ok(Json(people))
}

/// `GET /people/me`
pub async fn me(Actor(person): Actor) -> Json<Person> { Json(person) }

/// `GET /people/{id}`
pub async fn get_one<S: ThesisStore>(
  State(store): State<Arc<S>>,
  _actor: Actor,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Person>, ApiError> {
  store
    .get_person(id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| tesis_core::Error::not_found("person", id).into())
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub full_name:  String,
  pub email:      String,
  #[serde(default)]
  pub career:     String,
  pub role:       Role,
  #[serde(default)]
  pub advisor_id: Option<Uuid>,
  pub password:   String,
}

/// `POST /people`: coordinators register students, advisors and peers.
pub async fn create<S: ThesisStore>(
  State(store): State<Arc<S>>,
  actor: Actor,
  JsonBody(body): JsonBody<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  actor.require(Role::Coordinator, "registrar personas")?;
  if body.password.is_empty() {
    return Err(tesis_core::Error::invalid("password", "la contraseña es obligatoria").into());
  }
  let password_hash =
    hash_password(&body.password).map_err(|e| ApiError::Store(e.to_string().into()))?;

  let person = store
    .add_person(NewPerson {
      full_name: body.full_name,
      email: body.email,
      career: body.career,
      role: body.role,
      advisor_id: body.advisor_id,
      password_hash,
    })
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(person)))
}
