//! [`SqliteStore`]: the SQLite implementation of [`ThesisStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tesis_core::{
  Error as Rejection, FieldErrors,
  career::CareerMatcher,
  error::push_field,
  notify::Notification,
  person::{NewPerson, Person, Role, looks_like_email, normalize_email},
  proposal::{NewProposal, Proposal, ProposalQuery},
  store::{
    CompanionOutcome, ProposalOutcome, ReservationOutcome, SyncReport, ThesisStore, TopicQuery,
  },
  topic::{Enrollment, NewTopic, Topic, TopicView},
  workflow::ProposalAction,
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{encode_dt, encode_enum, encode_uuid},
  notify, proposals, query,
  schema::SCHEMA,
  seats, sync,
};

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A thesis-workflow store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection and matcher are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  matcher: Arc<CareerMatcher>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, matcher: Arc::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, matcher: Arc::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the career-compatibility rules used by every eligibility check.
  pub fn with_career_matcher(mut self, matcher: CareerMatcher) -> Self {
    self.matcher = Arc::new(matcher);
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` against the connection outside any explicit transaction.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection, &CareerMatcher) -> Result<T> + Send + 'static,
  {
    let matcher = Arc::clone(&self.matcher);
    self.conn.call(move |conn| Ok(f(conn, &matcher))).await?
  }

  /// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on success.
  ///
  /// Taking the write lock up front means every check `f` makes sees the
  /// latest committed state and cannot be invalidated before commit.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>, &CareerMatcher) -> Result<T> + Send + 'static,
  {
    let matcher = Arc::clone(&self.matcher);
    self
      .conn
      .call(move |conn| {
        Ok((|| -> Result<T> {
          let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
          let out = f(&tx, &matcher)?;
          tx.commit()?;
          Ok(out)
        })())
      })
      .await?
  }

  /// Run ProposalSync only when there is something to materialise, so that
  /// plain listings do not take the write lock.
  async fn sync_if_needed(&self) -> Result<()> {
    let pending = self.read(|conn, _| Ok(!query::unmaterialized_proposals(conn)?.is_empty())).await?;
    if pending {
      self.sync_accepted_proposals().await?;
    }
    Ok(())
  }
}

fn insert_person(conn: &Connection, input: NewPerson) -> Result<Person> {
  let email = normalize_email(&input.email);
  let mut fields = FieldErrors::new();
  if input.full_name.trim().is_empty() {
    push_field(&mut fields, "full_name", "el nombre es obligatorio");
  }
  if !looks_like_email(&email) {
    push_field(&mut fields, "email", "correo inválido");
  }
  if input.password_hash.is_empty() {
    push_field(&mut fields, "password", "la contraseña es obligatoria");
  }
  if let Some(id) = input.advisor_id
    && !query::is_advisor(conn, id)?
  {
    push_field(&mut fields, "advisor_id", "no corresponde a un docente");
  }
  if !fields.is_empty() {
    return Err(Rejection::Validation(fields).into());
  }

  let person = Person {
    person_id: Uuid::new_v4(),
    full_name: input.full_name.trim().to_owned(),
    email,
    career: input.career.trim().to_owned(),
    role: input.role,
    advisor_id: input.advisor_id,
    created_at: Utc::now(),
  };
  conn.execute(
    "INSERT INTO people (
       person_id, full_name, email, career, role, advisor_id, password_hash, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(person.person_id),
      person.full_name,
      person.email,
      person.career,
      encode_enum(person.role),
      person.advisor_id.map(encode_uuid),
      input.password_hash,
      encode_dt(person.created_at),
    ],
  )?;
  tracing::info!(person = %person.person_id, role = %person.role, "person added");
  Ok(person)
}

/// Whether `topic` passes every filter of `q`.
fn topic_matches(
  conn: &Connection,
  matcher: &CareerMatcher,
  topic: &Topic,
  q: &TopicQuery,
  student: Option<&Person>,
) -> Result<bool> {
  if let Some(career) = &q.career
    && !matcher.admits(&topic.career, career)
  {
    return Ok(false);
  }
  if let Some(owner) = q.owner_id
    && !topic.is_owned_by(owner)
  {
    return Ok(false);
  }
  if let Some(student) = student {
    let holds = query::active_seat(conn, student.person_id)? == Some(topic.topic_id);
    if !holds && !matcher.admits(&topic.career, &student.career) {
      return Ok(false);
    }
  }
  Ok(true)
}

// ─── ThesisStore impl ────────────────────────────────────────────────────────

impl ThesisStore for SqliteStore {
  type Error = crate::Error;

  // ── People ────────────────────────────────────────────────────────────────

  async fn add_person(&self, input: NewPerson) -> Result<Person> {
    self.write(move |tx, _| insert_person(tx, input)).await
  }

  async fn get_person(&self, id: Uuid) -> Result<Option<Person>> {
    self.read(move |conn, _| query::person(conn, id)).await
  }

  async fn credentials(&self, email: String) -> Result<Option<(Person, String)>> {
    let email = normalize_email(&email);
    self.read(move |conn, _| query::credentials(conn, &email)).await
  }

  async fn list_people(&self, role: Option<Role>) -> Result<Vec<Person>> {
    self.read(move |conn, _| query::people(conn, role)).await
  }

  // ── Proposals ─────────────────────────────────────────────────────────────

  async fn submit_proposal(&self, author_id: Uuid, input: NewProposal) -> Result<Proposal> {
    self.write(move |tx, _| proposals::submit(tx, author_id, input, Utc::now())).await
  }

  async fn get_proposal(&self, id: Uuid) -> Result<Option<Proposal>> {
    self.read(move |conn, _| query::proposal(conn, id)).await
  }

  async fn list_proposals(&self, q: ProposalQuery) -> Result<Vec<Proposal>> {
    self.read(move |conn, _| proposals::list(conn, &q)).await
  }

  async fn apply_proposal_action(
    &self,
    id: Uuid,
    actor_id: Uuid,
    action: ProposalAction,
  ) -> Result<ProposalOutcome> {
    self
      .write(move |tx, matcher| proposals::apply_action(tx, matcher, id, actor_id, action, Utc::now()))
      .await
  }

  // ── Topics ────────────────────────────────────────────────────────────────

  async fn create_topic(&self, creator_id: Uuid, input: NewTopic) -> Result<TopicView> {
    self.write(move |tx, _| seats::create_topic(tx, creator_id, input, Utc::now())).await
  }

  async fn get_topic(&self, id: Uuid, viewer: Option<Uuid>) -> Result<Option<TopicView>> {
    self
      .read(move |conn, _| match query::topic(conn, id)? {
        Some((topic, enrolled)) => Ok(Some(query::view(conn, topic, enrolled, viewer)?)),
        None => Ok(None),
      })
      .await
  }

  async fn list_topics(&self, q: TopicQuery) -> Result<Vec<TopicView>> {
    self.sync_if_needed().await?;
    self
      .read(move |conn, matcher| {
        let student = q.student_id.map(|id| query::require_person(conn, id)).transpose()?;
        let mut views = Vec::new();
        for (topic, enrolled) in query::topics(conn, q.include_closed)? {
          if topic_matches(conn, matcher, &topic, &q, student.as_ref())? {
            views.push(query::view(conn, topic, enrolled, q.viewer)?);
          }
        }
        Ok(views)
      })
      .await
  }

  async fn sync_accepted_proposals(&self) -> Result<SyncReport> {
    self.write(|tx, _| sync::run(tx, Utc::now())).await
  }

  // ── Seats ─────────────────────────────────────────────────────────────────

  async fn reserve_seat(&self, topic_id: Uuid, student_id: Uuid) -> Result<ReservationOutcome> {
    self
      .write(move |tx, matcher| seats::reserve(tx, matcher, topic_id, student_id, Utc::now()))
      .await
  }

  async fn assign_companions(
    &self,
    topic_id: Uuid,
    student_id: Uuid,
    emails: Vec<String>,
  ) -> Result<CompanionOutcome> {
    self
      .write(move |tx, matcher| {
        seats::assign_companions(tx, matcher, topic_id, student_id, emails, Utc::now())
      })
      .await
  }

  async fn close_topic(&self, topic_id: Uuid, actor_id: Uuid) -> Result<Topic> {
    self.write(move |tx, _| seats::close_topic(tx, topic_id, actor_id, Utc::now())).await
  }

  async fn list_enrollments(&self, topic_id: Uuid, include_inactive: bool) -> Result<Vec<Enrollment>> {
    self
      .read(move |conn, _| {
        query::require_topic(conn, topic_id)?;
        query::roster(conn, topic_id, include_inactive)
      })
      .await
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  async fn list_notifications(&self, recipient_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
    self.read(move |conn, _| query::notifications(conn, recipient_id, unread_only)).await
  }

  async fn mark_notification_read(&self, recipient_id: Uuid, id: Uuid) -> Result<Notification> {
    self.write(move |tx, _| notify::mark_read(tx, recipient_id, id)).await
  }
}
