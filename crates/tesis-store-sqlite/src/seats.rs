//! Seat writes: reservation, companion assignment, topic creation and
//! closing. Every function runs inside the caller's write transaction.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tesis_core::{
  Error as Rejection, FieldErrors,
  career::CareerMatcher,
  error::push_field,
  ledger::{self, CompanionCandidate},
  notify::{self as policy, dispatch},
  person::Role,
  proposal::normalize_companions,
  store::{CompanionOutcome, ReservationOutcome},
  topic::{Enrollment, EnrollmentStatus, NewTopic, Topic, TopicView, seats_available},
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{encode_dt, encode_uuid},
  notify::TxSink,
  query,
};

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Insert `topic`. Returns `false` when a topic already exists for its
/// proposal.
pub fn insert_topic(conn: &Connection, topic: &Topic) -> Result<bool> {
  let inserted = conn.execute(
    "INSERT INTO topics (
       topic_id, title, career, area, description, requirements, seats,
       created_by, advisor_id, proposal_id, created_at, closed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL)
     ON CONFLICT (proposal_id) DO NOTHING",
    params![
      encode_uuid(topic.topic_id),
      topic.title,
      topic.career,
      topic.area,
      topic.description,
      serde_json::to_string(&topic.requirements)?,
      topic.seats,
      topic.created_by.map(encode_uuid),
      topic.advisor_id.map(encode_uuid),
      topic.proposal_id.map(encode_uuid),
      encode_dt(topic.created_at),
    ],
  )?;
  Ok(inserted == 1)
}

/// Activate the (topic, student) seat, reusing an earlier row when one
/// exists. Returns the seat and whether an inactive row was reactivated.
pub fn upsert_enrollment(
  conn: &Connection,
  topic_id: Uuid,
  student_id: Uuid,
  responsible: bool,
  now: DateTime<Utc>,
) -> Result<(Enrollment, bool)> {
  let at = encode_dt(now);
  match query::enrollment(conn, topic_id, student_id)? {
    Some(mut existing) => {
      let reactivated = !existing.is_active();
      conn.execute(
        "UPDATE enrollments SET active = 1, responsible = ?3, updated_at = ?4
         WHERE topic_id = ?1 AND student_id = ?2",
        params![encode_uuid(topic_id), encode_uuid(student_id), responsible, at],
      )?;
      existing.status = EnrollmentStatus::Active;
      existing.responsible = responsible;
      existing.updated_at = now;
      Ok((existing, reactivated))
    }
    None => {
      let enrollment = Enrollment {
        enrollment_id: Uuid::new_v4(),
        topic_id,
        student_id,
        status: EnrollmentStatus::Active,
        responsible,
        created_at: now,
        updated_at: now,
      };
      conn.execute(
        "INSERT INTO enrollments (
           enrollment_id, topic_id, student_id, active, responsible, created_at, updated_at
         ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5)",
        params![
          encode_uuid(enrollment.enrollment_id),
          encode_uuid(topic_id),
          encode_uuid(student_id),
          responsible,
          at,
        ],
      )?;
      Ok((enrollment, false))
    }
  }
}

fn release(conn: &Connection, topic_id: Uuid, student_id: Uuid, now: DateTime<Utc>) -> Result<()> {
  conn.execute(
    "UPDATE enrollments SET active = 0, responsible = 0, updated_at = ?3
     WHERE topic_id = ?1 AND student_id = ?2",
    params![encode_uuid(topic_id), encode_uuid(student_id), encode_dt(now)],
  )?;
  Ok(())
}

/// Resolve a normalised companion e-mail against the registry.
pub fn candidate(conn: &Connection, topic_id: Uuid, email: String) -> Result<CompanionCandidate> {
  let person = query::person_by_email(conn, &email)?;
  let seated_elsewhere = match &person {
    Some(p) => query::seated_elsewhere(conn, p.person_id, topic_id)?,
    None => false,
  };
  Ok(CompanionCandidate { email, person, seated_elsewhere })
}

fn active_students(roster: &[Enrollment]) -> Vec<Uuid> {
  roster.iter().filter(|e| e.is_active()).map(|e| e.student_id).collect()
}

// ─── Operations ──────────────────────────────────────────────────────────────

pub fn reserve(
  conn: &Connection,
  matcher: &CareerMatcher,
  topic_id: Uuid,
  student_id: Uuid,
  now: DateTime<Utc>,
) -> Result<ReservationOutcome> {
  let (topic, _) = query::require_topic(conn, topic_id)?;
  let student = query::require_person(conn, student_id)?;
  let roster = query::roster(conn, topic_id, false)?;
  let elsewhere = query::seated_elsewhere(conn, student_id, topic_id)?;

  let plan = ledger::plan_reservation(matcher, &topic, &student, &roster, elsewhere)?;
  let (enrollment, reactivated) = upsert_enrollment(conn, topic_id, student_id, plan.responsible, now)?;

  let roster = query::roster(conn, topic_id, false)?;
  let view = TopicView::new(topic, roster.len() as u32, true);

  let mut batch = policy::seat_reserved(
    &view.topic,
    &student,
    view.seats_available,
    reactivated,
    enrollment.enrollment_id,
  );
  if view.seats_available == 0 {
    batch.extend(policy::seats_full(&view.topic, &active_students(&roster)));
  }
  dispatch(&mut TxSink::new(conn, now), batch)?;

  tracing::info!(
    topic = %topic_id,
    student = %student_id,
    reactivated,
    seats_available = view.seats_available,
    "seat reserved"
  );
  Ok(ReservationOutcome { topic: view, enrollment, reactivated, seats_before: plan.seats_before })
}

pub fn assign_companions(
  conn: &Connection,
  matcher: &CareerMatcher,
  topic_id: Uuid,
  caller_id: Uuid,
  emails: Vec<String>,
  now: DateTime<Utc>,
) -> Result<CompanionOutcome> {
  let (topic, _) = query::require_topic(conn, topic_id)?;
  let caller = query::require_person(conn, caller_id)?;
  let roster = query::roster(conn, topic_id, false)?;
  let caller_elsewhere = query::seated_elsewhere(conn, caller_id, topic_id)?;

  let candidates = normalize_companions(&emails, &caller.email)
    .into_iter()
    .map(|email| candidate(conn, topic_id, email))
    .collect::<Result<Vec<_>>>()?;
  let plan = ledger::plan_companions(matcher, &topic, &caller, caller_elsewhere, &roster, &candidates)?;

  // Release first so the capacity trigger sees the shrunken roster.
  for &student in &plan.released {
    release(conn, topic_id, student, now)?;
  }
  let mut added = Vec::new();
  for &(student, responsible) in &plan.participants {
    upsert_enrollment(conn, topic_id, student, responsible, now)?;
    if student != caller_id && !roster.iter().any(|e| e.student_id == student) {
      added.push(student);
    }
  }

  let enrollments = query::roster(conn, topic_id, false)?;
  let seats_before = seats_available(topic.seats, roster.len() as u32);
  let view = TopicView::new(topic, enrollments.len() as u32, true);

  let mut batch = policy::roster_changed(&view.topic, &caller, &added, &plan.released);
  if seats_before > 0 && view.seats_available == 0 {
    batch.extend(policy::seats_full(&view.topic, &active_students(&enrollments)));
  }
  dispatch(&mut TxSink::new(conn, now), batch)?;

  tracing::info!(
    topic = %topic_id,
    added = added.len(),
    released = plan.released.len(),
    "companions assigned"
  );
  Ok(CompanionOutcome { topic: view, enrollments, released: plan.released })
}

pub fn create_topic(
  conn: &Connection,
  creator_id: Uuid,
  input: NewTopic,
  now: DateTime<Utc>,
) -> Result<TopicView> {
  let creator = query::require_person(conn, creator_id)?;
  input.validate()?;

  let advisor_id = match creator.role {
    Role::Advisor => Some(creator.person_id),
    Role::Student => Some(creator.advisor_id.ok_or_else(|| {
      Rejection::Eligibility("necesitas un docente asignado para publicar un tema".into())
    })?),
    Role::Coordinator => input.advisor_id,
  };
  if let Some(id) = advisor_id
    && !query::is_advisor(conn, id)?
  {
    let mut fields = FieldErrors::new();
    push_field(&mut fields, "advisor_id", "no corresponde a un docente");
    return Err(Rejection::Validation(fields).into());
  }

  let career = if input.career.trim().is_empty() { creator.career.clone() } else { input.career };
  let topic = Topic {
    topic_id: Uuid::new_v4(),
    title: input.title.trim().to_owned(),
    career,
    area: input.area,
    description: input.description,
    requirements: input.requirements.into_iter().map(|r| r.trim().to_owned()).collect(),
    seats: input.seats,
    created_by: Some(creator.person_id),
    advisor_id,
    proposal_id: None,
    created_at: now,
    closed_at: None,
  };
  insert_topic(conn, &topic)?;
  tracing::info!(topic = %topic.topic_id, seats = topic.seats, "topic created");
  Ok(TopicView::new(topic, 0, false))
}

pub fn close_topic(conn: &Connection, topic_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<Topic> {
  let (mut topic, _) = query::require_topic(conn, topic_id)?;
  let actor = query::require_person(conn, actor_id)?;

  let allowed = match actor.role {
    Role::Coordinator => true,
    Role::Advisor => topic.is_owned_by(actor.person_id),
    Role::Student => false,
  };
  if !allowed {
    return Err(Rejection::Eligibility("solo coordinación o el docente del tema pueden cerrarlo".into()).into());
  }
  if !topic.is_open() {
    return Err(Rejection::State(format!("el tema \"{}\" ya está cerrado", topic.title)).into());
  }

  let roster = query::roster(conn, topic_id, false)?;
  dispatch(&mut TxSink::new(conn, now), policy::topic_closed(&topic, &active_students(&roster)))?;

  let at = encode_dt(now);
  conn.execute(
    "UPDATE enrollments SET active = 0, responsible = 0, updated_at = ?2
     WHERE topic_id = ?1 AND active = 1",
    params![encode_uuid(topic_id), at],
  )?;
  conn.execute(
    "UPDATE topics SET closed_at = ?2 WHERE topic_id = ?1",
    params![encode_uuid(topic_id), at],
  )?;
  topic.closed_at = Some(now);

  tracing::info!(topic = %topic_id, released = roster.len(), "topic closed");
  Ok(topic)
}
