//! Read helpers shared by every operation.
//!
//! All functions take a plain `&Connection` so they can run either on their
//! own or inside a write transaction (a `Transaction` derefs to one).

use rusqlite::{Connection, OptionalExtension as _, params};
use tesis_core::{
  Error as Rejection,
  notify::Notification,
  person::{Person, Role},
  proposal::{Proposal, ProposalState},
  topic::{Enrollment, Topic, TopicView},
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    ENROLLMENT_COLUMNS, NOTIFICATION_COLUMNS, PERSON_COLUMNS, PROPOSAL_COLUMNS, RawEnrollment,
    RawNotification, RawPerson, RawProposal, RawTopic, TOPIC_COLUMNS, decode_uuid, encode_enum,
    encode_uuid,
  },
};

// ─── People ──────────────────────────────────────────────────────────────────

pub fn person(conn: &Connection, id: Uuid) -> Result<Option<Person>> {
  let raw = conn
    .query_row(
      &format!("SELECT {PERSON_COLUMNS} FROM people WHERE person_id = ?1"),
      params![encode_uuid(id)],
      RawPerson::from_row,
    )
    .optional()?;
  raw.map(RawPerson::into_person).transpose()
}

pub fn require_person(conn: &Connection, id: Uuid) -> Result<Person> {
  person(conn, id)?.ok_or_else(|| Rejection::not_found("person", id).into())
}

/// Look a person up by an already-normalised e-mail.
pub fn person_by_email(conn: &Connection, email: &str) -> Result<Option<Person>> {
  let raw = conn
    .query_row(
      &format!("SELECT {PERSON_COLUMNS} FROM people WHERE email = ?1"),
      params![email],
      RawPerson::from_row,
    )
    .optional()?;
  raw.map(RawPerson::into_person).transpose()
}

pub fn credentials(conn: &Connection, email: &str) -> Result<Option<(Person, String)>> {
  let raw = conn
    .query_row(
      &format!("SELECT {PERSON_COLUMNS}, password_hash FROM people WHERE email = ?1"),
      params![email],
      |row| Ok((RawPerson::from_row(row)?, row.get::<_, String>(7)?)),
    )
    .optional()?;
  raw.map(|(p, hash)| Ok((p.into_person()?, hash))).transpose()
}

pub fn is_advisor(conn: &Connection, id: Uuid) -> Result<bool> {
  Ok(person(conn, id)?.is_some_and(|p| p.is(Role::Advisor)))
}

pub fn people(conn: &Connection, role: Option<Role>) -> Result<Vec<Person>> {
  let role = role.map(encode_enum);
  let mut stmt = conn.prepare(&format!(
    "SELECT {PERSON_COLUMNS} FROM people
     WHERE (?1 IS NULL OR role = ?1)
     ORDER BY full_name, email"
  ))?;
  let raws = stmt
    .query_map(params![role], RawPerson::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawPerson::into_person).collect()
}

// ─── Proposals ───────────────────────────────────────────────────────────────

pub fn proposal(conn: &Connection, id: Uuid) -> Result<Option<Proposal>> {
  let raw = conn
    .query_row(
      &format!("SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE proposal_id = ?1"),
      params![encode_uuid(id)],
      RawProposal::from_row,
    )
    .optional()?;
  raw.map(RawProposal::into_proposal).transpose()
}

pub fn require_proposal(conn: &Connection, id: Uuid) -> Result<Proposal> {
  proposal(conn, id)?.ok_or_else(|| Rejection::not_found("proposal", id).into())
}

/// Newest first.
pub fn proposals(
  conn: &Connection,
  student_id: Option<Uuid>,
  state: Option<ProposalState>,
) -> Result<Vec<Proposal>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PROPOSAL_COLUMNS} FROM proposals
     WHERE (?1 IS NULL OR student_id = ?1)
       AND (?2 IS NULL OR state = ?2)
     ORDER BY created_at DESC"
  ))?;
  let raws = stmt
    .query_map(
      params![student_id.map(encode_uuid), state.map(encode_enum)],
      RawProposal::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawProposal::into_proposal).collect()
}

/// Advisor-authored accepted proposals without a topic.
pub fn unmaterialized_proposals(conn: &Connection) -> Result<Vec<Proposal>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PROPOSAL_COLUMNS} FROM proposals p
     WHERE p.state = ?1
       AND p.student_id IS NULL
       AND NOT EXISTS (SELECT 1 FROM topics t WHERE t.proposal_id = p.proposal_id)
     ORDER BY p.created_at"
  ))?;
  let raws = stmt
    .query_map(params![encode_enum(ProposalState::Accepted)], RawProposal::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawProposal::into_proposal).collect()
}

// ─── Topics ──────────────────────────────────────────────────────────────────

/// A topic and its active-seat count.
pub fn topic(conn: &Connection, id: Uuid) -> Result<Option<(Topic, u32)>> {
  let raw = conn
    .query_row(
      &format!("SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.topic_id = ?1"),
      params![encode_uuid(id)],
      RawTopic::from_row,
    )
    .optional()?;
  raw.map(RawTopic::into_topic).transpose()
}

pub fn require_topic(conn: &Connection, id: Uuid) -> Result<(Topic, u32)> {
  topic(conn, id)?.ok_or_else(|| Rejection::not_found("topic", id).into())
}

/// Newest first.
pub fn topics(conn: &Connection, include_closed: bool) -> Result<Vec<(Topic, u32)>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {TOPIC_COLUMNS} FROM topics t
     WHERE ?1 OR t.closed_at IS NULL
     ORDER BY t.created_at DESC"
  ))?;
  let raws = stmt
    .query_map(params![include_closed], RawTopic::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawTopic::into_topic).collect()
}

/// Assemble the read model for `viewer`.
pub fn view(conn: &Connection, topic: Topic, enrolled: u32, viewer: Option<Uuid>) -> Result<TopicView> {
  let holds_seat = match viewer {
    Some(id) => active_seat(conn, id)? == Some(topic.topic_id),
    None => false,
  };
  Ok(TopicView::new(topic, enrolled, holds_seat))
}

// ─── Enrollments ─────────────────────────────────────────────────────────────

/// Every enrollment of a topic, in creation order.
pub fn roster(conn: &Connection, topic_id: Uuid, include_inactive: bool) -> Result<Vec<Enrollment>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {ENROLLMENT_COLUMNS} FROM enrollments
     WHERE topic_id = ?1 AND (?2 OR active = 1)
     ORDER BY created_at, enrollment_id"
  ))?;
  let raws = stmt
    .query_map(params![encode_uuid(topic_id), include_inactive], RawEnrollment::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEnrollment::into_enrollment).collect()
}

pub fn enrollment(conn: &Connection, topic_id: Uuid, student_id: Uuid) -> Result<Option<Enrollment>> {
  let raw = conn
    .query_row(
      &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE topic_id = ?1 AND student_id = ?2"),
      params![encode_uuid(topic_id), encode_uuid(student_id)],
      RawEnrollment::from_row,
    )
    .optional()?;
  raw.map(RawEnrollment::into_enrollment).transpose()
}

/// The topic where `student_id` holds their single active seat, if any.
pub fn active_seat(conn: &Connection, student_id: Uuid) -> Result<Option<Uuid>> {
  let topic: Option<String> = conn
    .query_row(
      "SELECT topic_id FROM enrollments WHERE student_id = ?1 AND active = 1 LIMIT 1",
      params![encode_uuid(student_id)],
      |row| row.get(0),
    )
    .optional()?;
  topic.as_deref().map(decode_uuid).transpose()
}

/// Whether the student holds an active seat in a topic other than `topic_id`.
pub fn seated_elsewhere(conn: &Connection, student_id: Uuid, topic_id: Uuid) -> Result<bool> {
  Ok(active_seat(conn, student_id)?.is_some_and(|t| t != topic_id))
}

// ─── Notifications ───────────────────────────────────────────────────────────

pub fn notification(conn: &Connection, id: Uuid) -> Result<Option<Notification>> {
  let raw = conn
    .query_row(
      &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE notification_id = ?1"),
      params![encode_uuid(id)],
      RawNotification::from_row,
    )
    .optional()?;
  raw.map(RawNotification::into_notification).transpose()
}

/// Newest first.
pub fn notifications(conn: &Connection, recipient_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
     WHERE recipient_id = ?1 AND (NOT ?2 OR read = 0)
     ORDER BY created_at DESC, rowid DESC"
  ))?;
  let raws = stmt
    .query_map(params![encode_uuid(recipient_id), unread_only], RawNotification::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawNotification::into_notification).collect()
}
