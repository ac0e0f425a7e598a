//! The proposal state machine.
//!
//! ```text
//! pendiente ──autorizar──────────▶ pendiente_aprobacion ──aprobar_final──▶ aceptada
//!     │                                ▲        │
//!     └──solicitar_ajuste──▶ pendiente_ajuste ◀─┘ (solicitar_ajuste)
//!                                 │   ▲
//!                  confirmar_cupos└───┘autorizar
//! any non-terminal ──rechazar──▶ rechazada
//! ```
//!
//! [`apply`] is pure: it validates one action against a proposal and an actor
//! and returns the resulting [`Transition`]. Persisting it, materialising the
//! topic and dispatching notifications is the store's job, inside a single
//! transaction.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  error::FieldErrors,
  person::{Person, Role},
  proposal::{Proposal, ProposalState, companion_roster},
  Error, Result,
};

/// One state-machine action, as sent in the `accion` field of
/// `PATCH /proposals/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "accion")]
pub enum ProposalAction {
  #[serde(rename = "autorizar")]
  Authorize {
    #[serde(rename = "cupos_autorizados")]
    seats_authorized: Option<u32>,
    #[serde(rename = "comentario", default)]
    comment:          Option<String>,
  },
  #[serde(rename = "solicitar_ajuste")]
  RequestAdjustment {
    #[serde(rename = "cupos_autorizados")]
    seats_authorized: Option<u32>,
    #[serde(rename = "comentario", default)]
    comment:          Option<String>,
  },
  #[serde(rename = "rechazar")]
  Reject {
    #[serde(rename = "comentario", default)]
    comment: Option<String>,
  },
  #[serde(rename = "aprobar_final")]
  ApproveFinal {
    #[serde(rename = "comentario", default)]
    comment: Option<String>,
  },
  #[serde(rename = "confirmar_cupos")]
  ConfirmSeats {
    #[serde(rename = "cupos_requeridos")]
    seats_requested:  Option<u32>,
    #[serde(rename = "correos", default)]
    companion_emails: Vec<String>,
  },
}

/// The action discriminant, kept on the [`Transition`] for notification
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
  Authorize,
  RequestAdjustment,
  Reject,
  ApproveFinal,
  ConfirmSeats,
}

impl ActionKind {
  /// The role allowed to perform this action.
  pub fn performed_by(self) -> Role {
    match self {
      Self::Authorize | Self::RequestAdjustment | Self::Reject | Self::ApproveFinal => Role::Advisor,
      Self::ConfirmSeats => Role::Student,
    }
  }

  /// The `evento` tag attached to the notification this action produces.
  pub fn event(self) -> &'static str {
    match self {
      Self::Authorize => "propuesta_autorizada",
      Self::RequestAdjustment => "propuesta_ajuste_solicitado",
      Self::Reject => "propuesta_rechazada",
      Self::ApproveFinal => "propuesta_aceptada",
      Self::ConfirmSeats => "propuesta_cupos_confirmados",
    }
  }
}

impl ProposalAction {
  pub fn kind(&self) -> ActionKind {
    match self {
      Self::Authorize { .. } => ActionKind::Authorize,
      Self::RequestAdjustment { .. } => ActionKind::RequestAdjustment,
      Self::Reject { .. } => ActionKind::Reject,
      Self::ApproveFinal { .. } => ActionKind::ApproveFinal,
      Self::ConfirmSeats { .. } => ActionKind::ConfirmSeats,
    }
  }
}

/// The outcome of a validated action.
#[derive(Debug, Clone)]
pub struct Transition {
  pub action:   ActionKind,
  pub from:     ProposalState,
  pub to:       ProposalState,
  /// The proposal as it must be persisted.
  pub proposal: Proposal,
  /// `false` for the idempotent re-rejection, which persists and notifies
  /// nothing.
  pub changed:  bool,
}

impl Transition {
  pub fn accepted(&self) -> bool { self.changed && self.to == ProposalState::Accepted }
}

/// Validate `action` performed by `actor` on `proposal`.
pub fn apply(
  proposal: &Proposal,
  actor: &Person,
  action: ProposalAction,
  now: DateTime<Utc>,
) -> Result<Transition> {
  let kind = action.kind();
  match kind.performed_by() {
    Role::Advisor => check_reviewer(proposal, actor)?,
    Role::Student => check_author(proposal, actor)?,
    Role::Coordinator => {
      return Err(Error::Eligibility("acción no disponible para coordinación".into()));
    }
  }

  let from = proposal.state;
  if kind == ActionKind::Reject && from == ProposalState::Rejected {
    return Ok(Transition { action: kind, from, to: from, proposal: proposal.clone(), changed: false });
  }
  if from.is_terminal() {
    return Err(Error::State(format!("la propuesta ya está {from}")));
  }

  let mut next = proposal.clone();
  match action {
    ProposalAction::Authorize { seats_authorized, comment } => {
      let seats = required_seats(seats_authorized, "cupos_autorizados")?;
      if seats < next.seats_requested {
        return Err(Error::invalid(
          "cupos_autorizados",
          format!(
            "autorizar requiere cubrir los {} cupos solicitados; use solicitar_ajuste",
            next.seats_requested
          ),
        ));
      }
      next.seats_authorized = Some(seats);
      next.state = ProposalState::AwaitingApproval;
      if let Some(c) = non_blank(comment) {
        next.decision_comment = Some(c);
      }
    }

    ProposalAction::RequestAdjustment { seats_authorized, comment } => {
      let seats = required_seats(seats_authorized, "cupos_autorizados")?;
      if seats >= next.seats_requested {
        return Err(Error::invalid(
          "cupos_autorizados",
          format!("debe ser menor que los {} cupos solicitados", next.seats_requested),
        ));
      }
      let comment = non_blank(comment)
        .ok_or_else(|| Error::invalid("comentario", "indique el motivo del ajuste"))?;
      next.seats_authorized = Some(seats);
      next.decision_comment = Some(comment);
      next.state = ProposalState::AwaitingAdjustment;
    }

    ProposalAction::Reject { comment } => {
      next.state = ProposalState::Rejected;
      if let Some(c) = non_blank(comment) {
        next.decision_comment = Some(c);
      }
    }

    ProposalAction::ApproveFinal { comment } => {
      if !matches!(from, ProposalState::Pending | ProposalState::AwaitingApproval) {
        return Err(Error::State(format!("no se puede aprobar una propuesta en estado {from}")));
      }
      if let Some(max) = next.seats_authorized
        && next.seats_requested > max
      {
        return Err(Error::Capacity(format!(
          "se solicitan {} cupos y el máximo autorizado es {max}",
          next.seats_requested
        )));
      }
      if next.seats_authorized.is_none() {
        next.seats_authorized = Some(next.seats_requested);
      }
      next.state = ProposalState::Accepted;
      if let Some(c) = non_blank(comment) {
        next.decision_comment = Some(c);
      }
    }

    ProposalAction::ConfirmSeats { seats_requested, companion_emails } => {
      if from != ProposalState::AwaitingAdjustment {
        return Err(Error::State(format!("no hay un ajuste pendiente (estado {from})")));
      }
      let seats = required_seats(seats_requested, "cupos_requeridos")?;
      if let Some(max) = next.seats_authorized
        && seats > max
      {
        return Err(Error::Capacity(format!("el máximo autorizado es {max} cupos")));
      }
      let mut fields = FieldErrors::new();
      let companions = companion_roster(&companion_emails, &actor.email, seats, &mut fields, "correos");
      if !fields.is_empty() {
        return Err(Error::Validation(fields));
      }
      next.seats_requested = seats;
      next.companion_emails = companions;
      next.state = ProposalState::AwaitingApproval;
    }
  }

  if kind.performed_by() == Role::Advisor {
    next.advisor_id = Some(actor.person_id);
  }
  next.updated_at = now;

  Ok(Transition { action: kind, from, to: next.state, proposal: next, changed: true })
}

/// Advisor actions: the proposal's advisor, or, while unclaimed, one of its
/// preferred advisors (any advisor when none are listed).
fn check_reviewer(proposal: &Proposal, actor: &Person) -> Result<()> {
  match actor.role {
    Role::Advisor => {}
    Role::Student | Role::Coordinator => {
      return Err(Error::Eligibility("solo un docente puede revisar propuestas".into()));
    }
  }
  let allowed = match proposal.advisor_id {
    Some(id) => id == actor.person_id,
    None if !proposal.preferred_advisors.is_empty() => {
      proposal.preferred_advisors.contains(&actor.person_id)
    }
    None => true,
  };
  if allowed {
    Ok(())
  } else {
    Err(Error::Eligibility("la propuesta está asignada a otro docente".into()))
  }
}

fn check_author(proposal: &Proposal, actor: &Person) -> Result<()> {
  let is_author = matches!(actor.role, Role::Student) && proposal.student_id == Some(actor.person_id);
  if is_author {
    Ok(())
  } else {
    Err(Error::Eligibility("solo el alumno autor puede confirmar cupos".into()))
  }
}

fn required_seats(value: Option<u32>, field: &str) -> Result<u32> {
  match value {
    Some(n) if n >= 1 => Ok(n),
    Some(_) => Err(Error::invalid(field, "debe ser al menos 1")),
    None => Err(Error::invalid(field, "campo obligatorio")),
  }
}

fn non_blank(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

/// Convenience used by callers that only know the reviewer's id.
pub fn is_reviewer(proposal: &Proposal, advisor_id: Uuid) -> bool {
  proposal.advisor_id == Some(advisor_id) || proposal.preferred_advisors.contains(&advisor_id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::proposal::tests::sample;

  fn person(role: Role) -> Person {
    Person {
      person_id:  Uuid::new_v4(),
      full_name:  "P".into(),
      email:      format!("{}@uni.cl", Uuid::new_v4().simple()),
      career:     "Informática".into(),
      role,
      advisor_id: None,
      created_at: Utc::now(),
    }
  }

  fn with_student(student: &Person) -> Proposal {
    let mut p = sample();
    p.student_id = Some(student.person_id);
    p
  }

  fn run(p: &Proposal, actor: &Person, action: ProposalAction) -> Result<Transition> {
    apply(p, actor, action, Utc::now())
  }

  #[test]
  fn authorize_moves_to_awaiting_approval_and_claims() {
    let advisor = person(Role::Advisor);
    let p = sample();
    let t = run(&p, &advisor, ProposalAction::Authorize { seats_authorized: Some(3), comment: None }).unwrap();
    assert_eq!(t.to, ProposalState::AwaitingApproval);
    assert_eq!(t.proposal.seats_authorized, Some(3));
    assert_eq!(t.proposal.advisor_id, Some(advisor.person_id));
  }

  #[test]
  fn authorize_below_request_is_rejected() {
    let advisor = person(Role::Advisor);
    let err = run(&sample(), &advisor, ProposalAction::Authorize { seats_authorized: Some(2), comment: None })
      .unwrap_err();
    assert!(matches!(err, Error::Validation(ref f) if f.contains_key("cupos_autorizados")));
  }

  #[test]
  fn request_adjustment_needs_smaller_count_and_comment() {
    let advisor = person(Role::Advisor);
    let p = sample();

    let err = run(&p, &advisor, ProposalAction::RequestAdjustment { seats_authorized: Some(3), comment: Some("x".into()) })
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = run(&p, &advisor, ProposalAction::RequestAdjustment { seats_authorized: Some(2), comment: Some("  ".into()) })
      .unwrap_err();
    assert!(matches!(err, Error::Validation(ref f) if f.contains_key("comentario")));

    let t = run(&p, &advisor, ProposalAction::RequestAdjustment { seats_authorized: Some(2), comment: Some("muy grande".into()) })
      .unwrap();
    assert_eq!(t.to, ProposalState::AwaitingAdjustment);
    assert_eq!(t.proposal.seats_authorized, Some(2));
    assert_eq!(t.proposal.decision_comment.as_deref(), Some("muy grande"));
  }

  #[test]
  fn confirm_seats_only_by_author_from_adjustment() {
    let student = person(Role::Student);
    let other = person(Role::Student);
    let mut p = with_student(&student);
    p.state = ProposalState::AwaitingAdjustment;
    p.seats_authorized = Some(2);

    let action = || ProposalAction::ConfirmSeats {
      seats_requested:  Some(2),
      companion_emails: vec!["amiga@uni.cl".into()],
    };

    assert!(matches!(run(&p, &other, action()), Err(Error::Eligibility(_))));

    let t = run(&p, &student, action()).unwrap();
    assert_eq!(t.to, ProposalState::AwaitingApproval);
    assert_eq!(t.proposal.seats_requested, 2);
    assert_eq!(t.proposal.companion_emails, ["amiga@uni.cl"]);
    assert_eq!(t.proposal.advisor_id, p.advisor_id);

    p.state = ProposalState::Pending;
    assert!(matches!(run(&p, &student, action()), Err(Error::State(_))));
  }

  #[test]
  fn confirm_seats_bounded_by_authorised_maximum() {
    let student = person(Role::Student);
    let mut p = with_student(&student);
    p.state = ProposalState::AwaitingAdjustment;
    p.seats_authorized = Some(2);

    let err = run(&p, &student, ProposalAction::ConfirmSeats { seats_requested: Some(3), companion_emails: vec![] })
      .unwrap_err();
    assert!(matches!(err, Error::Capacity(_)));

    let err = run(&p, &student, ProposalAction::ConfirmSeats {
      seats_requested:  Some(2),
      companion_emails: vec!["a@uni.cl".into(), "b@uni.cl".into()],
    })
    .unwrap_err();
    assert!(matches!(err, Error::Validation(ref f) if f.contains_key("correos")));
  }

  #[test]
  fn approve_final_defaults_authorised_seats() {
    let advisor = person(Role::Advisor);
    let t = run(&sample(), &advisor, ProposalAction::ApproveFinal { comment: None }).unwrap();
    assert!(t.accepted());
    assert_eq!(t.proposal.seats_authorized, Some(3));
  }

  #[test]
  fn approve_final_checks_state_and_capacity() {
    let advisor = person(Role::Advisor);
    let mut p = sample();
    p.state = ProposalState::AwaitingAdjustment;
    assert!(matches!(run(&p, &advisor, ProposalAction::ApproveFinal { comment: None }), Err(Error::State(_))));

    p.state = ProposalState::AwaitingApproval;
    p.seats_authorized = Some(2);
    assert!(matches!(run(&p, &advisor, ProposalAction::ApproveFinal { comment: None }), Err(Error::Capacity(_))));
  }

  #[test]
  fn reject_is_idempotent_and_terminal_states_are_closed() {
    let advisor = person(Role::Advisor);
    let mut p = sample();
    let t = run(&p, &advisor, ProposalAction::Reject { comment: Some("no".into()) }).unwrap();
    assert!(t.changed);
    assert_eq!(t.to, ProposalState::Rejected);

    p = t.proposal;
    let again = run(&p, &advisor, ProposalAction::Reject { comment: None }).unwrap();
    assert!(!again.changed);

    let err = run(&p, &advisor, ProposalAction::Authorize { seats_authorized: Some(3), comment: None }).unwrap_err();
    assert!(matches!(err, Error::State(_)));

    p.state = ProposalState::Accepted;
    let err = run(&p, &advisor, ProposalAction::Reject { comment: None }).unwrap_err();
    assert!(matches!(err, Error::State(_)));
  }

  #[test]
  fn reviewer_gate() {
    let advisor = person(Role::Advisor);
    let stranger = person(Role::Advisor);
    let coordinator = person(Role::Coordinator);
    let mut p = sample();
    p.preferred_advisors = vec![advisor.person_id];

    let reject = || ProposalAction::Reject { comment: None };
    assert!(matches!(run(&p, &stranger, reject()), Err(Error::Eligibility(_))));
    assert!(matches!(run(&p, &coordinator, reject()), Err(Error::Eligibility(_))));
    assert!(run(&p, &advisor, reject()).is_ok());

    p.preferred_advisors.clear();
    p.advisor_id = Some(stranger.person_id);
    assert!(matches!(run(&p, &advisor, reject()), Err(Error::Eligibility(_))));
    assert!(is_reviewer(&p, stranger.person_id));
  }

  #[test]
  fn action_deserialises_from_accion_tag() {
    let action: ProposalAction = serde_json::from_value(serde_json::json!({
      "accion": "solicitar_ajuste",
      "cupos_autorizados": 2,
      "comentario": "reducir",
    }))
    .unwrap();
    assert_eq!(action.kind(), ActionKind::RequestAdjustment);

    let action: ProposalAction = serde_json::from_value(serde_json::json!({
      "accion": "confirmar_cupos",
      "cupos_requeridos": 2,
      "correos": ["a@uni.cl"],
    }))
    .unwrap();
    assert_eq!(action.kind(), ActionKind::ConfirmSeats);
  }
}
