//! Handlers for `/topics` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/topics` | Optional `?carrera=&alumno=&usuario=&cerrados=` |
//! | `POST`   | `/topics` | Advisors, coordinators and students with an advisor |
//! | `GET`    | `/topics/{id}` | 404 if not found |
//! | `DELETE` | `/topics/{id}` | Closes the topic and releases every seat |
//! | `GET`    | `/topics/{id}/inscripciones` | Optional `?historial=true` |
//! | `POST`   | `/topics/{id}/reservar` | The caller takes a seat |
//! | `POST`   | `/topics/{id}/companeros` | Body: `{"correos":[…]}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tesis_core::{
  store::{CompanionOutcome, ThesisStore, TopicQuery},
  topic::{Enrollment, NewTopic, Topic, TopicView},
};
use uuid::Uuid;

use crate::{
  auth::Actor,
  error::ApiError,
  extract::{JsonBody, PathParam, QueryParams},
};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Career filter.
  pub carrera:  Option<String>,
  /// Only topics this student may see.
  pub alumno:   Option<Uuid>,
  /// Only topics created by or assigned to this person.
  pub usuario:  Option<Uuid>,
  #[serde(default)]
  pub cerrados: bool,
}

/// `GET /topics`
pub async fn list<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(viewer): Actor,
  QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<TopicView>>, ApiError> {
  let query = TopicQuery {
    career:         params.carrera.filter(|c| !c.trim().is_empty()),
    student_id:     params.alumno,
    owner_id:       params.usuario,
    viewer:         Some(viewer.person_id),
    include_closed: params.cerrados,
  };
  let topics = store.list_topics(query).await.map_err(ApiError::store)?;
  Ok(Json(topics))
}

// ─── Create / get / close ─────────────────────────────────────────────────────

/// `POST /topics`
pub async fn create<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(creator): Actor,
  JsonBody(body): JsonBody<NewTopic>,
) -> Result<impl IntoResponse, ApiError> {
  let topic = store
    .create_topic(creator.person_id, body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(topic)))
}

/// `GET /topics/{id}`
pub async fn get_one<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(viewer): Actor,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<TopicView>, ApiError> {
  store
    .get_topic(id, Some(viewer.person_id))
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| tesis_core::Error::not_found("topic", id).into())
}

/// `DELETE /topics/{id}`
pub async fn close<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(actor): Actor,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Topic>, ApiError> {
  let topic = store.close_topic(id, actor.person_id).await.map_err(ApiError::store)?;
  Ok(Json(topic))
}

// ─── Seats ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct EnrollmentParams {
  #[serde(default)]
  pub historial: bool,
}

/// `GET /topics/{id}/inscripciones[?historial=true]`
pub async fn enrollments<S: ThesisStore>(
  State(store): State<Arc<S>>,
  _actor: Actor,
  PathParam(id): PathParam<Uuid>,
  QueryParams(params): QueryParams<EnrollmentParams>,
) -> Result<Json<Vec<Enrollment>>, ApiError> {
  let rows = store
    .list_enrollments(id, params.historial)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(rows))
}

/// `POST /topics/{id}/reservar`
pub async fn reserve<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(student): Actor,
  PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let outcome = store
    .reserve_seat(id, student.person_id)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct CompanionBody {
  #[serde(default)]
  pub correos: Vec<String>,
}

/// `POST /topics/{id}/companeros`
pub async fn companions<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(student): Actor,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<CompanionBody>,
) -> Result<Json<CompanionOutcome>, ApiError> {
  let outcome = store
    .assign_companions(id, student.person_id, body.correos)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}
