//! Handlers for `/notifications`. Callers only ever see their own inbox.

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
};
use serde::Deserialize;
use tesis_core::{notify::Notification, store::ThesisStore};
use uuid::Uuid;

use crate::{
  auth::Actor,
  error::ApiError,
  extract::{PathParam, QueryParams},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub unread: bool,
}

/// `GET /notifications[?unread=true]`
pub async fn list<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(me): Actor,
  QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Vec<Notification>>, ApiError> {
  let inbox = store
    .list_notifications(me.person_id, params.unread)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(inbox))
}

/// `POST /notifications/{id}/read`
pub async fn mark_read<S: ThesisStore>(
  State(store): State<Arc<S>>,
  Actor(me): Actor,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Notification>, ApiError> {
  let n = store
    .mark_notification_read(me.person_id, id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(n))
}
