//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, and
//! list-valued fields compact JSON. Closed enums use their wire names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use tesis_core::{
  notify::{Notification, NotificationKind},
  person::{Person, Role},
  proposal::{Proposal, ProposalState},
  topic::{Enrollment, EnrollmentStatus, Topic},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

/// Fixed-width so that text order matches time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Wire name of a strum-backed enum.
pub fn encode_enum<T: Into<&'static str>>(value: T) -> &'static str { value.into() }

/// Parse a strum-backed enum from its stored wire name.
fn decode_enum<T: FromStr>(column: &'static str, s: String) -> Result<T> {
  T::from_str(&s).map_err(|_| Error::Decode { column, value: s })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PERSON_COLUMNS: &str =
  "person_id, full_name, email, career, role, advisor_id, created_at";

/// Raw strings read directly from a `people` row.
pub struct RawPerson {
  pub person_id:  String,
  pub full_name:  String,
  pub email:      String,
  pub career:     String,
  pub role:       String,
  pub advisor_id: Option<String>,
  pub created_at: String,
}

impl RawPerson {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:  row.get(0)?,
      full_name:  row.get(1)?,
      email:      row.get(2)?,
      career:     row.get(3)?,
      role:       row.get(4)?,
      advisor_id: row.get(5)?,
      created_at: row.get(6)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      person_id:  decode_uuid(&self.person_id)?,
      full_name:  self.full_name,
      email:      self.email,
      career:     self.career,
      role:       decode_enum::<Role>("people.role", self.role)?,
      advisor_id: decode_opt_uuid(self.advisor_id)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const PROPOSAL_COLUMNS: &str = "proposal_id, title, objective, description, area, career, \
   seats_requested, companion_emails, preferred_advisors, seats_authorized, decision_comment, \
   state, student_id, advisor_id, created_at, updated_at";

/// Raw strings read directly from a `proposals` row.
pub struct RawProposal {
  pub proposal_id:        String,
  pub title:              String,
  pub objective:          String,
  pub description:        String,
  pub area:               String,
  pub career:             String,
  pub seats_requested:    u32,
  pub companion_emails:   String,
  pub preferred_advisors: String,
  pub seats_authorized:   Option<u32>,
  pub decision_comment:   Option<String>,
  pub state:              String,
  pub student_id:         Option<String>,
  pub advisor_id:         Option<String>,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawProposal {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      proposal_id:        row.get(0)?,
      title:              row.get(1)?,
      objective:          row.get(2)?,
      description:        row.get(3)?,
      area:               row.get(4)?,
      career:             row.get(5)?,
      seats_requested:    row.get(6)?,
      companion_emails:   row.get(7)?,
      preferred_advisors: row.get(8)?,
      seats_authorized:   row.get(9)?,
      decision_comment:   row.get(10)?,
      state:              row.get(11)?,
      student_id:         row.get(12)?,
      advisor_id:         row.get(13)?,
      created_at:         row.get(14)?,
      updated_at:         row.get(15)?,
    })
  }

  pub fn into_proposal(self) -> Result<Proposal> {
    Ok(Proposal {
      proposal_id:        decode_uuid(&self.proposal_id)?,
      title:              self.title,
      objective:          self.objective,
      description:        self.description,
      area:               self.area,
      career:             self.career,
      seats_requested:    self.seats_requested,
      companion_emails:   serde_json::from_str(&self.companion_emails)?,
      preferred_advisors: serde_json::from_str(&self.preferred_advisors)?,
      seats_authorized:   self.seats_authorized,
      decision_comment:   self.decision_comment,
      state:              decode_enum::<ProposalState>("proposals.state", self.state)?,
      student_id:         decode_opt_uuid(self.student_id)?,
      advisor_id:         decode_opt_uuid(self.advisor_id)?,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

/// Topic columns followed by the live active-seat count.
pub const TOPIC_COLUMNS: &str = "t.topic_id, t.title, t.career, t.area, t.description, \
   t.requirements, t.seats, t.created_by, t.advisor_id, t.proposal_id, t.created_at, t.closed_at, \
   (SELECT COUNT(*) FROM enrollments e WHERE e.topic_id = t.topic_id AND e.active = 1)";

/// Raw strings read directly from a `topics` row plus its active count.
pub struct RawTopic {
  pub topic_id:     String,
  pub title:        String,
  pub career:       String,
  pub area:         String,
  pub description:  String,
  pub requirements: String,
  pub seats:        u32,
  pub created_by:   Option<String>,
  pub advisor_id:   Option<String>,
  pub proposal_id:  Option<String>,
  pub created_at:   String,
  pub closed_at:    Option<String>,
  pub enrolled:     u32,
}

impl RawTopic {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      topic_id:     row.get(0)?,
      title:        row.get(1)?,
      career:       row.get(2)?,
      area:         row.get(3)?,
      description:  row.get(4)?,
      requirements: row.get(5)?,
      seats:        row.get(6)?,
      created_by:   row.get(7)?,
      advisor_id:   row.get(8)?,
      proposal_id:  row.get(9)?,
      created_at:   row.get(10)?,
      closed_at:    row.get(11)?,
      enrolled:     row.get(12)?,
    })
  }

  /// The decoded topic and its active-seat count.
  pub fn into_topic(self) -> Result<(Topic, u32)> {
    let topic = Topic {
      topic_id:     decode_uuid(&self.topic_id)?,
      title:        self.title,
      career:       self.career,
      area:         self.area,
      description:  self.description,
      requirements: serde_json::from_str(&self.requirements)?,
      seats:        self.seats,
      created_by:   decode_opt_uuid(self.created_by)?,
      advisor_id:   decode_opt_uuid(self.advisor_id)?,
      proposal_id:  decode_opt_uuid(self.proposal_id)?,
      created_at:   decode_dt(&self.created_at)?,
      closed_at:    self.closed_at.as_deref().map(decode_dt).transpose()?,
    };
    Ok((topic, self.enrolled))
  }
}

pub const ENROLLMENT_COLUMNS: &str =
  "enrollment_id, topic_id, student_id, active, responsible, created_at, updated_at";

/// Raw strings read directly from an `enrollments` row.
pub struct RawEnrollment {
  pub enrollment_id: String,
  pub topic_id:      String,
  pub student_id:    String,
  pub active:        bool,
  pub responsible:   bool,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawEnrollment {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      enrollment_id: row.get(0)?,
      topic_id:      row.get(1)?,
      student_id:    row.get(2)?,
      active:        row.get(3)?,
      responsible:   row.get(4)?,
      created_at:    row.get(5)?,
      updated_at:    row.get(6)?,
    })
  }

  pub fn into_enrollment(self) -> Result<Enrollment> {
    Ok(Enrollment {
      enrollment_id: decode_uuid(&self.enrollment_id)?,
      topic_id:      decode_uuid(&self.topic_id)?,
      student_id:    decode_uuid(&self.student_id)?,
      status:        if self.active { EnrollmentStatus::Active } else { EnrollmentStatus::Inactive },
      responsible:   self.responsible,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub const NOTIFICATION_COLUMNS: &str =
  "notification_id, recipient_id, title, message, kind, metadata, read, created_at";

/// Raw strings read directly from a `notifications` row.
pub struct RawNotification {
  pub notification_id: String,
  pub recipient_id:    String,
  pub title:           String,
  pub message:         String,
  pub kind:            String,
  pub metadata:        String,
  pub read:            bool,
  pub created_at:      String,
}

impl RawNotification {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      notification_id: row.get(0)?,
      recipient_id:    row.get(1)?,
      title:           row.get(2)?,
      message:         row.get(3)?,
      kind:            row.get(4)?,
      metadata:        row.get(5)?,
      read:            row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      notification_id: decode_uuid(&self.notification_id)?,
      recipient_id:    decode_uuid(&self.recipient_id)?,
      title:           self.title,
      message:         self.message,
      kind:            decode_enum::<NotificationKind>("notifications.kind", self.kind)?,
      metadata:        serde_json::from_str(&self.metadata)?,
      read:            self.read,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn enums_are_stored_by_wire_name() {
    assert_eq!(encode_enum(Role::Coordinator), "coordinador");
    assert_eq!(encode_enum(ProposalState::AwaitingApproval), "pendiente_aprobacion");
    assert_eq!(encode_enum(NotificationKind::Enrollment), "inscripcion");

    let state: ProposalState = decode_enum("state", encode_enum(ProposalState::Accepted).into()).unwrap();
    assert_eq!(state, ProposalState::Accepted);
    assert!(decode_enum::<Role>("role", "student".into()).is_err());
  }
}
