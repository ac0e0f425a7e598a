//! Proposals: candidate topics awaiting advisor review.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  error::{FieldErrors, push_field},
  person::{looks_like_email, normalize_email},
  Error, Result,
};

pub const TITLE_MAX: usize = 160;
pub const OBJECTIVE_MAX: usize = 300;
pub const AREA_MAX: usize = 120;

/// Lifecycle states. `Accepted` and `Rejected` are terminal.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
pub enum ProposalState {
  /// Submitted, awaiting the advisor's first look.
  #[serde(rename = "pendiente")]
  #[strum(serialize = "pendiente")]
  Pending,
  /// The advisor asked for a smaller seat count.
  #[serde(rename = "pendiente_ajuste")]
  #[strum(serialize = "pendiente_ajuste")]
  AwaitingAdjustment,
  /// Seats authorised (or a reduced count confirmed); awaiting sign-off.
  #[serde(rename = "pendiente_aprobacion")]
  #[strum(serialize = "pendiente_aprobacion")]
  AwaitingApproval,
  #[serde(rename = "aceptada")]
  #[strum(serialize = "aceptada")]
  Accepted,
  #[serde(rename = "rechazada")]
  #[strum(serialize = "rechazada")]
  Rejected,
}

impl ProposalState {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Accepted | Self::Rejected) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
  pub proposal_id:        Uuid,
  pub title:              String,
  pub objective:          String,
  pub description:        String,
  /// Subject-area tag ("rama").
  pub area:               String,
  pub career:             String,
  pub seats_requested:    u32,
  /// Co-authors invited by the submitting student, normalised.
  pub companion_emails:   Vec<String>,
  pub preferred_advisors: Vec<Uuid>,
  /// Upper bound set by the advisor during negotiation.
  pub seats_authorized:   Option<u32>,
  pub decision_comment:   Option<String>,
  pub state:              ProposalState,
  pub student_id:         Option<Uuid>,
  pub advisor_id:         Option<Uuid>,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

impl Proposal {
  /// Seat count of the topic this proposal becomes:
  /// `min(requested, authorised)`, never below one.
  pub fn materialized_seats(&self) -> u32 {
    let authorized = self.seats_authorized.unwrap_or(self.seats_requested);
    self.seats_requested.min(authorized).max(1)
  }

  /// Advisors who should hear about this proposal before anyone has claimed
  /// it.
  pub fn reviewers(&self) -> Vec<Uuid> {
    match self.advisor_id {
      Some(id) => vec![id],
      None => self.preferred_advisors.clone(),
    }
  }
}

/// Input to [`crate::store::ThesisStore::submit_proposal`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProposal {
  pub title:              String,
  #[serde(default)]
  pub objective:          String,
  #[serde(default)]
  pub description:        String,
  #[serde(default)]
  pub area:               String,
  #[serde(default)]
  pub career:             String,
  pub seats_requested:    u32,
  #[serde(default)]
  pub companion_emails:   Vec<String>,
  #[serde(default)]
  pub preferred_advisors: Vec<Uuid>,
  /// Advisor named directly by the student, if any.
  #[serde(default)]
  pub advisor_id:         Option<Uuid>,
}

impl NewProposal {
  /// Check the free-standing fields. Cross-entity checks (advisor ids, author
  /// role) belong to the store, which can see the other rows.
  ///
  /// `author_email` is dropped from the companion list before counting.
  pub fn validate(&self, author_email: &str) -> Result<Vec<String>> {
    let mut fields = FieldErrors::new();

    if self.title.trim().is_empty() {
      push_field(&mut fields, "title", "el título es obligatorio");
    } else if self.title.chars().count() > TITLE_MAX {
      push_field(&mut fields, "title", format!("máximo {TITLE_MAX} caracteres"));
    }
    if self.objective.chars().count() > OBJECTIVE_MAX {
      push_field(&mut fields, "objective", format!("máximo {OBJECTIVE_MAX} caracteres"));
    }
    if self.description.trim().is_empty() {
      push_field(&mut fields, "description", "la descripción es obligatoria");
    }
    if self.area.chars().count() > AREA_MAX {
      push_field(&mut fields, "area", format!("máximo {AREA_MAX} caracteres"));
    }

    let companions = companion_roster(
      &self.companion_emails,
      author_email,
      self.seats_requested,
      &mut fields,
      "companion_emails",
    );
    if self.seats_requested < 1 {
      push_field(&mut fields, "seats_requested", "debe solicitar al menos un cupo");
    }

    if fields.is_empty() { Ok(companions) } else { Err(Error::Validation(fields)) }
  }
}

/// Normalise a companion e-mail list: trim, lowercase, drop blanks and
/// duplicates (keeping first-seen order) and remove `own_email`.
pub fn normalize_companions(emails: &[String], own_email: &str) -> Vec<String> {
  let own = normalize_email(own_email);
  let mut seen = BTreeSet::new();
  emails
    .iter()
    .map(|e| normalize_email(e))
    .filter(|e| !e.is_empty() && *e != own)
    .filter(|e| seen.insert(e.clone()))
    .collect()
}

/// Normalise `emails` and check them against a group of `seats` participants
/// (the author included). Problems are recorded under `field`.
pub fn companion_roster(
  emails: &[String],
  own_email: &str,
  seats: u32,
  fields: &mut FieldErrors,
  field: &str,
) -> Vec<String> {
  let companions = normalize_companions(emails, own_email);
  for email in &companions {
    if !looks_like_email(email) {
      push_field(fields, field, format!("{email}: correo inválido"));
    }
  }
  let max = seats.saturating_sub(1) as usize;
  if seats >= 1 && companions.len() > max {
    push_field(
      fields,
      field,
      format!("con {seats} cupos se admiten como máximo {max} compañeros"),
    );
  }
  companions
}

/// Filter for [`crate::store::ThesisStore::list_proposals`].
#[derive(Debug, Clone, Default)]
pub struct ProposalQuery {
  pub student_id: Option<Uuid>,
  pub advisor_id: Option<Uuid>,
  pub state:      Option<ProposalState>,
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn sample() -> Proposal {
    Proposal {
      proposal_id:        Uuid::new_v4(),
      title:              "Detección de fallas".into(),
      objective:          "Detectar".into(),
      description:        "Largo".into(),
      area:               "IA".into(),
      career:             "Informática".into(),
      seats_requested:    3,
      companion_emails:   vec![],
      preferred_advisors: vec![],
      seats_authorized:   None,
      decision_comment:   None,
      state:              ProposalState::Pending,
      student_id:         Some(Uuid::new_v4()),
      advisor_id:         None,
      created_at:         Utc::now(),
      updated_at:         Utc::now(),
    }
  }

  #[test]
  fn materialized_seats_takes_minimum_and_clamps() {
    let mut p = sample();
    assert_eq!(p.materialized_seats(), 3);
    p.seats_authorized = Some(2);
    assert_eq!(p.materialized_seats(), 2);
    p.seats_authorized = Some(5);
    assert_eq!(p.materialized_seats(), 3);
    p.seats_requested = 0;
    p.seats_authorized = Some(0);
    assert_eq!(p.materialized_seats(), 1);
  }

  #[test]
  fn companions_are_normalised_and_exclude_author() {
    let emails = vec![
      " B@uni.cl".to_string(),
      "a@uni.cl".to_string(),
      "b@uni.cl".to_string(),
      "".to_string(),
      "C@Uni.cl".to_string(),
    ];
    assert_eq!(normalize_companions(&emails, "A@uni.cl"), ["b@uni.cl", "c@uni.cl"]);
  }

  #[test]
  fn validate_rejects_too_many_companions() {
    let input = NewProposal {
      title: "T".into(),
      description: "D".into(),
      seats_requested: 2,
      companion_emails: vec!["x@uni.cl".into(), "y@uni.cl".into()],
      ..Default::default()
    };
    match input.validate("me@uni.cl") {
      Err(Error::Validation(fields)) => assert!(fields.contains_key("companion_emails")),
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn validate_returns_normalised_companions() {
    let input = NewProposal {
      title: "T".into(),
      description: "D".into(),
      seats_requested: 2,
      companion_emails: vec!["X@uni.cl".into(), "me@uni.cl".into()],
      ..Default::default()
    };
    assert_eq!(input.validate("me@uni.cl").unwrap(), ["x@uni.cl"]);
  }

  #[test]
  fn validate_requires_title_description_and_seats() {
    let input = NewProposal::default();
    match input.validate("me@uni.cl") {
      Err(Error::Validation(fields)) => {
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("description"));
        assert!(fields.contains_key("seats_requested"));
      }
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn terminal_states() {
    assert!(ProposalState::Accepted.is_terminal());
    assert!(ProposalState::Rejected.is_terminal());
    assert!(!ProposalState::AwaitingAdjustment.is_terminal());
    assert_eq!(ProposalState::AwaitingApproval.to_string(), "pendiente_aprobacion");
  }
}
