//! Handlers for `/proposals` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/proposals` | Students and advisors submit |
//! | `GET`   | `/proposals` | Optional `?alumno=&docente=&estado=` |
//! | `GET`   | `/proposals/{id}` | 404 if not found |
//! | `PATCH` | `/proposals/{id}` | Body tagged by `accion` |

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tesis_core::{
  proposal::{NewProposal, Proposal, ProposalQuery, ProposalState},
  store::{ProposalOutcome, ThesisStore},
  workflow::ProposalAction,
};
use uuid::Uuid;

use crate::{
  auth::Actor,
  error::ApiError,
  extract::{JsonBody, PathParam, QueryParams},
};

/// `POST /proposals`
pub async fn create<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(author): Actor,
  JsonBody(body): JsonBody<NewProposal>,
) -> Result<impl IntoResponse, ApiError> {
  let proposal = store
    .submit_proposal(author.person_id, body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(proposal)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub alumno:  Option<Uuid>,
  pub docente: Option<Uuid>,
  pub estado:  Option<ProposalState>,
}

/// `GET /proposals[?alumno=&docente=&estado=]`
pub async fn list<S: ThesisStore>(
  State(store): State<Arc<S>>,
  _actor: Actor,
  QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Proposal>>, ApiError> {
  let query = ProposalQuery {
    student_id: params.alumno,
    advisor_id: params.docente,
    state:      params.estado,
  };
  let proposals = store.list_proposals(query).await.map_err(ApiError::store)?;
  Ok(Json(proposals))
}

/// `GET /proposals/{id}`
pub async fn get_one<S: ThesisStore>(
  State(store): State<Arc<S>>,
  _actor: Actor,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Proposal>, ApiError> {
  store
    .get_proposal(id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| tesis_core::Error::not_found("proposal", id).into())
}

/// `PATCH /proposals/{id}`, e.g. `{"accion":"autorizar","cupos_autorizados":2}`
pub async fn act<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(actor): Actor,
  PathParam(id): PathParam<Uuid>,
  JsonBody(action): JsonBody<ProposalAction>,
) -> Result<Json<ProposalOutcome>, ApiError> {
  let outcome = store
    .apply_proposal_action(id, actor.person_id, action)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(outcome))
}
