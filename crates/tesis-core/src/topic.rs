//! Topics (capacity-bounded enrollable slots) and enrollments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::{FieldErrors, push_field},
  proposal::Proposal,
  Error, Result,
};

// ─── Topic ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
  pub topic_id:     Uuid,
  pub title:        String,
  pub career:       String,
  /// Subject-area tag ("rama").
  pub area:         String,
  pub description:  String,
  pub requirements: Vec<String>,
  /// Total seat count; always at least 1.
  pub seats:        u32,
  pub created_by:   Option<Uuid>,
  /// The advisor answerable for the topic. May differ from `created_by` when a
  /// student authors the topic under their assigned advisor.
  pub advisor_id:   Option<Uuid>,
  /// The proposal this topic was materialised from, if any. At most one topic
  /// exists per proposal.
  pub proposal_id:  Option<Uuid>,
  pub created_at:   DateTime<Utc>,
  /// Set when the topic is closed; closed topics keep their history.
  pub closed_at:    Option<DateTime<Utc>>,
}

impl Topic {
  pub fn is_open(&self) -> bool { self.closed_at.is_none() }

  /// The person notified on the advisor side: the responsible advisor, or the
  /// creator when none is set.
  pub fn steward(&self) -> Option<Uuid> { self.advisor_id.or(self.created_by) }

  /// Whether `person_id` may close or administer this topic as its owner.
  pub fn is_owned_by(&self, person_id: Uuid) -> bool {
    self.created_by == Some(person_id) || self.advisor_id == Some(person_id)
  }

  /// Build the topic an accepted proposal turns into.
  ///
  /// `career` is the already-resolved career (the proposal's own tag or its
  /// author's career when the tag is blank).
  pub fn from_proposal(
    proposal: &Proposal,
    career: String,
    created_by: Option<Uuid>,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      topic_id: Uuid::new_v4(),
      title: proposal.title.clone(),
      career,
      area: proposal.area.clone(),
      description: proposal.description.clone(),
      requirements: Vec::new(),
      seats: proposal.materialized_seats(),
      created_by,
      advisor_id: proposal.advisor_id,
      proposal_id: Some(proposal.proposal_id),
      created_at: now,
      closed_at: None,
    }
  }
}

/// Seats left once `active` enrollments are subtracted; never negative.
pub fn seats_available(seats: u32, active: u32) -> u32 { seats.saturating_sub(active) }

/// The read model returned to clients: a topic plus its live seat ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicView {
  #[serde(flatten)]
  pub topic:           Topic,
  /// Active enrollment count.
  pub enrolled:        u32,
  pub seats_available: u32,
  /// Whether the viewing student currently holds a seat in this topic.
  pub holds_seat:      bool,
}

impl TopicView {
  pub fn new(topic: Topic, enrolled: u32, holds_seat: bool) -> Self {
    let seats_available = seats_available(topic.seats, enrolled);
    Self { topic, enrolled, seats_available, holds_seat }
  }
}

/// Input to [`crate::store::ThesisStore::create_topic`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTopic {
  pub title:        String,
  #[serde(default)]
  pub career:       String,
  #[serde(default)]
  pub area:         String,
  #[serde(default)]
  pub description:  String,
  #[serde(default)]
  pub requirements: Vec<String>,
  pub seats:        u32,
  /// Responsible advisor, when a coordinator creates the topic on someone's
  /// behalf.
  #[serde(default)]
  pub advisor_id:   Option<Uuid>,
}

impl NewTopic {
  pub fn validate(&self) -> Result<()> {
    let mut fields = FieldErrors::new();
    if self.title.trim().is_empty() {
      push_field(&mut fields, "title", "el título es obligatorio");
    }
    if self.seats < 1 {
      push_field(&mut fields, "seats", "debe existir al menos un cupo");
    }
    if self.requirements.iter().any(|r| r.trim().is_empty()) {
      push_field(&mut fields, "requirements", "los requisitos no pueden estar vacíos");
    }
    if fields.is_empty() { Ok(()) } else { Err(Error::Validation(fields)) }
  }
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

/// Lifecycle of a seat. Enrollments are never deleted; leaving a group or a
/// topic closure moves them to `Inactive` so past seat-holders stay on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
  Active,
  Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
  pub enrollment_id: Uuid,
  pub topic_id:      Uuid,
  pub student_id:    Uuid,
  pub status:        EnrollmentStatus,
  /// The single student allowed to manage the topic's companion roster.
  pub responsible:   bool,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl Enrollment {
  pub fn is_active(&self) -> bool { self.status == EnrollmentStatus::Active }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn seats_available_saturates() {
    assert_eq!(seats_available(3, 1), 2);
    assert_eq!(seats_available(2, 2), 0);
    assert_eq!(seats_available(2, 5), 0);
  }

  #[test]
  fn new_topic_validation_reports_fields() {
    let input = NewTopic { title: "  ".into(), seats: 0, ..Default::default() };
    match input.validate() {
      Err(Error::Validation(fields)) => {
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("seats"));
      }
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn view_serialises_flat() {
    let topic = Topic {
      topic_id:     Uuid::new_v4(),
      title:        "Visión".into(),
      career:       String::new(),
      area:         String::new(),
      description:  String::new(),
      requirements: vec![],
      seats:        2,
      created_by:   None,
      advisor_id:   None,
      proposal_id:  None,
      created_at:   Utc::now(),
      closed_at:    None,
    };
    let json = serde_json::to_value(TopicView::new(topic, 1, true)).unwrap();
    assert_eq!(json["title"], "Visión");
    assert_eq!(json["seats_available"], 1);
    assert_eq!(json["holds_seat"], true);
  }
}
