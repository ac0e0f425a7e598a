//! JSON REST API for the thesis-topic workflow.
//!
//! Exposes an axum [`Router`] backed by any [`tesis_core::store::ThesisStore`].
//! Every route except `/login` requires HTTP Basic credentials
//! (`email:password`). TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tesis_api::api_router(store.clone()))
//! ```

pub mod auth;
pub mod error;
pub mod extract;
pub mod notifications;
pub mod people;
pub mod proposals;
pub mod topics;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tesis_core::store::ThesisStore;

pub use auth::{Actor, hash_password};
pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: ThesisStore + 'static,
{
  Router::new()
    .route("/login", post(auth::login::<S>))
    // People
    .route("/people", get(people::list::<S>).post(people::create::<S>))
    .route("/people/me", get(people::me))
    .route("/people/{id}", get(people::get_one::<S>))
    // Proposals
    .route("/proposals", get(proposals::list::<S>).post(proposals::create::<S>))
    .route("/proposals/{id}", get(proposals::get_one::<S>).patch(proposals::act::<S>))
    // Topics and seats
    .route("/topics", get(topics::list::<S>).post(topics::create::<S>))
    .route("/topics/{id}", get(topics::get_one::<S>).delete(topics::close::<S>))
    .route("/topics/{id}/inscripciones", get(topics::enrollments::<S>))
    .route("/topics/{id}/reservar", post(topics::reserve::<S>))
    .route("/topics/{id}/companeros", post(topics::companions::<S>))
    // Notifications
    .route("/notifications", get(notifications::list::<S>))
    .route("/notifications/{id}/read", post(notifications::mark_read::<S>))
    .with_state(store)
}

#[cfg(test)]
mod tests {
  use argon2::{
    Algorithm, Argon2, Params, PasswordHasher, Version, password_hash::SaltString,
  };
  use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tesis_core::person::{NewPerson, Person, Role};
  use tesis_store_sqlite::SqliteStore;
  use tower::ServiceExt;
  use uuid::Uuid;

  use super::*;

  const PASSWORD: &str = "clave-segura";

  /// A valid argon2id hash with minimal cost so tests stay fast. Verification
  /// reads the parameters back from the PHC string.
  fn cheap_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon.hash_password(password.as_bytes(), &salt).unwrap().to_string()
  }

  async fn setup() -> (Arc<SqliteStore>, Router) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let app = api_router(store.clone());
    (store, app)
  }

  async fn person(store: &SqliteStore, role: Role, career: &str, advisor_id: Option<Uuid>) -> Person {
    let id = Uuid::new_v4().simple().to_string();
    store
      .add_person(NewPerson {
        full_name: format!("{role} {}", &id[..6]),
        email: format!("{id}@uni.cl"),
        career: career.into(),
        role,
        advisor_id,
        password_hash: cheap_hash(PASSWORD),
      })
      .await
      .unwrap()
  }

  fn basic(email: &str, password: &str) -> String {
    format!("Basic {}", B64.encode(format!("{email}:{password}")))
  }

  async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    who: Option<&Person>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(p) = who {
      req = req.header(header::AUTHORIZATION, basic(&p.email, PASSWORD));
    }
    let req = match body {
      Some(v) => req
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string()))
        .unwrap(),
      None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  // ─── Auth ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn login_reports_role_and_landing_page() {
    let (store, app) = setup().await;
    let advisor = person(&store, Role::Advisor, "", None).await;

    let body = json!({ "email": advisor.email.to_uppercase(), "password": PASSWORD });
    let (status, v) = call(&app, Method::POST, "/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["role"], "docente");
    assert_eq!(v["url"], "/docente");
    assert_eq!(v["person"]["person_id"], advisor.person_id.to_string());

    let body = json!({ "email": advisor.email, "password": "otra" });
    let (status, v) = call(&app, Method::POST, "/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"], "auth");
  }

  #[tokio::test]
  async fn routes_require_credentials() {
    let (store, app) = setup().await;
    let student = person(&store, Role::Student, "", None).await;

    let req = Request::builder().uri("/topics").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

    let (status, v) = call(&app, Method::GET, "/people/me", Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["email"], student.email);
  }

  // ─── People ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn only_coordinators_register_people() {
    let (store, app) = setup().await;
    let coordinator = person(&store, Role::Coordinator, "", None).await;
    let student = person(&store, Role::Student, "", None).await;
    let body = json!({
      "full_name": "Bea",
      "email": "Bea@Uni.cl",
      "career": "Informática",
      "role": "alumno",
      "password": "secreto",
    });

    let (status, v) = call(&app, Method::POST, "/people", Some(&student), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(v["error"], "eligibility");

    let (status, v) = call(&app, Method::POST, "/people", Some(&coordinator), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(v["email"], "bea@uni.cl");

    let (status, v) = call(&app, Method::POST, "/people", Some(&coordinator), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["error"], "conflict");

    let (status, v) = call(&app, Method::GET, "/people?rol=alumno", Some(&coordinator), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().unwrap().len(), 2);
  }

  // ─── Topics and seats ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn last_seat_goes_to_one_student() {
    let (store, app) = setup().await;
    let advisor = person(&store, Role::Advisor, "Informática", None).await;
    let x = person(&store, Role::Student, "Informática", None).await;
    let y = person(&store, Role::Student, "Informática", None).await;

    let body = json!({ "title": "Visión por computador", "seats": 1 });
    let (status, t) = call(&app, Method::POST, "/topics", Some(&advisor), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(t["seats_available"], 1);
    let id = t["topic_id"].as_str().unwrap().to_owned();

    let uri = format!("/topics/{id}/reservar");
    let (status, r) = call(&app, Method::POST, &uri, Some(&x), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(r["topic"]["seats_available"], 0);
    assert_eq!(r["enrollment"]["responsible"], true);

    let (status, v) = call(&app, Method::POST, &uri, Some(&y), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["error"], "capacity");

    let (_, rows) =
      call(&app, Method::GET, &format!("/topics/{id}/inscripciones"), Some(&advisor), None).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);

    let (_, view) = call(&app, Method::GET, &format!("/topics/{id}"), Some(&x), None).await;
    assert_eq!(view["holds_seat"], true);
  }

  #[tokio::test]
  async fn closing_a_topic_releases_its_seats() {
    let (store, app) = setup().await;
    let advisor = person(&store, Role::Advisor, "", None).await;
    let x = person(&store, Role::Student, "", None).await;

    let body = json!({ "title": "Compiladores", "seats": 2 });
    let (_, t) = call(&app, Method::POST, "/topics", Some(&advisor), Some(body)).await;
    let id = t["topic_id"].as_str().unwrap().to_owned();
    call(&app, Method::POST, &format!("/topics/{id}/reservar"), Some(&x), None).await;

    let (status, _) = call(&app, Method::DELETE, &format!("/topics/{id}"), Some(&x), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, closed) = call(&app, Method::DELETE, &format!("/topics/{id}"), Some(&advisor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!closed["closed_at"].is_null());

    let (_, listed) = call(&app, Method::GET, "/topics", Some(&x), None).await;
    assert!(listed.as_array().unwrap().is_empty());

    let (_, inbox) = call(&app, Method::GET, "/notifications", Some(&x), None).await;
    assert!(
      inbox.as_array().unwrap().iter().any(|n| n["metadata"]["evento"] == "tema_finalizado"),
      "{inbox}"
    );
  }

  #[tokio::test]
  async fn unknown_topic_is_not_found() {
    let (store, app) = setup().await;
    let student = person(&store, Role::Student, "", None).await;
    let uri = format!("/topics/{}", Uuid::new_v4());
    let (status, v) = call(&app, Method::GET, &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"], "not_found");
  }

  // ─── Proposals ────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn invalid_proposal_reports_fields() {
    let (store, app) = setup().await;
    let student = person(&store, Role::Student, "", None).await;
    let body = json!({ "title": " ", "seats_requested": 0 });
    let (status, v) = call(&app, Method::POST, "/proposals", Some(&student), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "validation");
    assert!(v["fields"]["title"].is_array());
    assert!(v["fields"]["seats_requested"].is_array());
  }

  #[tokio::test]
  async fn unknown_action_is_a_bad_request() {
    let (store, app) = setup().await;
    let advisor = person(&store, Role::Advisor, "", None).await;
    let uri = format!("/proposals/{}", Uuid::new_v4());
    let body = json!({ "accion": "archivar" });
    let (status, v) = call(&app, Method::PATCH, &uri, Some(&advisor), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "bad_request");
  }

  #[tokio::test]
  async fn malformed_input_gets_a_json_error_body() {
    let (store, app) = setup().await;
    let student = person(&store, Role::Student, "", None).await;

    let body = json!({ "title": "T", "description": "D" });
    let (status, v) = call(&app, Method::POST, "/proposals", Some(&student), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "bad_request");
    assert!(v["detail"].as_str().unwrap().contains("seats_requested"), "{v}");

    let body = json!({ "title": "T", "seats": "dos" });
    let (status, v) = call(&app, Method::POST, "/topics", Some(&student), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "bad_request");

    let (status, v) = call(&app, Method::GET, "/proposals?alumno=nadie", Some(&student), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "bad_request");

    let (status, v) = call(&app, Method::GET, "/topics/no-es-uuid", Some(&student), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "bad_request");

    let (status, v) = call(&app, Method::POST, "/login", None, Some(json!({ "email": "a@uni.cl" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"], "bad_request");
  }

  #[tokio::test]
  async fn rejection_reaches_the_student_inbox() {
    let (store, app) = setup().await;
    let advisor = person(&store, Role::Advisor, "", None).await;
    let student = person(&store, Role::Student, "", None).await;

    let body = json!({
      "title": "Sistemas de recomendación",
      "description": "Filtrado colaborativo",
      "seats_requested": 1,
      "preferred_advisors": [advisor.person_id],
    });
    let (status, p) = call(&app, Method::POST, "/proposals", Some(&student), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(p["state"], "pendiente");
    let uri = format!("/proposals/{}", p["proposal_id"].as_str().unwrap());

    let (_, inbox) = call(&app, Method::GET, "/notifications", Some(&advisor), None).await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    let (status, _) = call(&app, Method::PATCH, &uri, Some(&student), Some(json!({ "accion": "rechazar" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let body = json!({ "accion": "rechazar", "comentario": "fuera de alcance" });
    let (status, out) = call(&app, Method::PATCH, &uri, Some(&advisor), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["from"], "pendiente");
    assert_eq!(out["to"], "rechazada");

    let (_, inbox) = call(&app, Method::GET, "/notifications?unread=true", Some(&student), None).await;
    let notes = inbox.as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["metadata"]["comentario"], "fuera de alcance");

    let read_uri = format!("/notifications/{}/read", notes[0]["notification_id"].as_str().unwrap());
    let (status, n) = call(&app, Method::POST, &read_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(n["read"], true);

    let (status, _) = call(&app, Method::POST, &read_uri, Some(&advisor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, inbox) = call(&app, Method::GET, "/notifications?unread=true", Some(&student), None).await;
    assert!(inbox.as_array().unwrap().is_empty());
  }
}
