//! Seat planning for a topic.
//!
//! The functions here decide *whether* a seat mutation is allowed and *what*
//! it must change, given a snapshot of the topic's roster. Storage backends
//! take the snapshot and apply the plan inside one write transaction, so the
//! checks are always re-validated against the committed state.

use uuid::Uuid;

use crate::{
  career::CareerMatcher,
  error::{FieldErrors, push_field},
  person::{Person, Role},
  topic::{Enrollment, Topic, seats_available},
  Error, Result,
};

/// Active seats and the responsible holder, derived from a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ledger {
  pub seats:       u32,
  pub active:      u32,
  pub responsible: Option<Uuid>,
}

impl Ledger {
  pub fn of(topic: &Topic, roster: &[Enrollment]) -> Self {
    let active = roster.iter().filter(|e| e.is_active()).count() as u32;
    let responsible = roster
      .iter()
      .find(|e| e.is_active() && e.responsible)
      .map(|e| e.student_id);
    Self { seats: topic.seats, active, responsible }
  }

  pub fn available(&self) -> u32 { seats_available(self.seats, self.active) }
}

/// What a reservation must write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationPlan {
  /// Whether the new seat becomes the responsible one.
  pub responsible:  bool,
  pub seats_before: u32,
}

/// A student resolved from a companion e-mail.
#[derive(Debug, Clone)]
pub struct CompanionCandidate {
  pub email:            String,
  pub person:           Option<Person>,
  /// The student already holds an active seat in a different topic.
  pub seated_elsewhere: bool,
}

/// What a companion assignment must write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionPlan {
  /// Every participant of the new roster; the responsible one is flagged.
  pub participants: Vec<(Uuid, bool)>,
  /// Students whose active seat must be released.
  pub released:     Vec<Uuid>,
}

fn require_student(person: &Person) -> Result<()> {
  match person.role {
    Role::Student => Ok(()),
    Role::Advisor | Role::Coordinator => {
      Err(Error::Eligibility("solo los alumnos pueden ocupar cupos".into()))
    }
  }
}

fn require_open(topic: &Topic) -> Result<()> {
  if topic.is_open() {
    Ok(())
  } else {
    Err(Error::State(format!("el tema \"{}\" está cerrado", topic.title)))
  }
}

/// Decide a reservation of one seat in `topic` for `student`.
///
/// `seated_elsewhere` is true when the student already holds an active seat
/// in another topic; a student holds at most one active seat system-wide.
pub fn plan_reservation(
  matcher: &CareerMatcher,
  topic: &Topic,
  student: &Person,
  roster: &[Enrollment],
  seated_elsewhere: bool,
) -> Result<ReservationPlan> {
  require_student(student)?;
  require_open(topic)?;

  if roster.iter().any(|e| e.is_active() && e.student_id == student.person_id) {
    return Err(Error::Conflict("ya tienes un cupo en este tema".into()));
  }
  if seated_elsewhere {
    return Err(Error::Conflict("ya tienes un cupo activo en otro tema".into()));
  }
  if !matcher.admits(&topic.career, &student.career) {
    return Err(Error::Eligibility(format!(
      "tu carrera ({}) no es compatible con la del tema ({})",
      student.career, topic.career
    )));
  }

  let ledger = Ledger::of(topic, roster);
  if ledger.available() == 0 {
    return Err(Error::Capacity(format!("el tema \"{}\" no tiene cupos disponibles", topic.title)));
  }

  Ok(ReservationPlan { responsible: ledger.responsible.is_none(), seats_before: ledger.available() })
}

/// Decide a companion assignment made by `caller` for `topic`.
///
/// `candidates` must already be normalised, de-duplicated and exclude the
/// caller (see [`crate::proposal::normalize_companions`]). Every candidate
/// problem is reported at once, keyed by e-mail.
pub fn plan_companions(
  matcher: &CareerMatcher,
  topic: &Topic,
  caller: &Person,
  caller_seated_elsewhere: bool,
  roster: &[Enrollment],
  candidates: &[CompanionCandidate],
) -> Result<CompanionPlan> {
  require_student(caller)?;
  require_open(topic)?;

  let ledger = Ledger::of(topic, roster);
  if let Some(holder) = ledger.responsible
    && holder != caller.person_id
  {
    return Err(Error::Eligibility("solo el responsable del tema puede gestionar compañeros".into()));
  }

  let caller_active = roster.iter().any(|e| e.is_active() && e.student_id == caller.person_id);
  if !caller_active {
    if caller_seated_elsewhere {
      return Err(Error::Conflict("ya tienes un cupo activo en otro tema".into()));
    }
    if !matcher.admits(&topic.career, &caller.career) {
      return Err(Error::Eligibility("tu carrera no es compatible con la del tema".into()));
    }
  }

  let participants = 1 + candidates.len();
  if participants > topic.seats as usize {
    return Err(Error::invalid(
      "correos",
      format!("el tema admite {} participantes y se indicaron {participants}", topic.seats),
    ));
  }

  let mut fields = FieldErrors::new();
  for candidate in candidates {
    if let Err(problem) = check_candidate(matcher, topic, candidate) {
      push_field(&mut fields, &candidate.email, problem);
    }
  }
  if !fields.is_empty() {
    return Err(Error::Validation(fields));
  }

  let mut plan = vec![(caller.person_id, true)];
  plan.extend(candidates.iter().filter_map(|c| c.person.as_ref()).map(|p| (p.person_id, false)));

  let released = roster
    .iter()
    .filter(|e| e.is_active() && !plan.iter().any(|(id, _)| *id == e.student_id))
    .map(|e| e.student_id)
    .collect();

  Ok(CompanionPlan { participants: plan, released })
}

fn check_candidate(
  matcher: &CareerMatcher,
  topic: &Topic,
  candidate: &CompanionCandidate,
) -> std::result::Result<(), String> {
  let person = candidate.person.as_ref().ok_or("no existe un usuario con este correo")?;
  if !person.is(Role::Student) {
    return Err("el usuario no es alumno".into());
  }
  if !matcher.admits(&topic.career, &person.career) {
    return Err(format!("la carrera {} no es compatible con el tema", person.career));
  }
  if candidate.seated_elsewhere {
    return Err("ya tiene un cupo activo en otro tema".into());
  }
  Ok(())
}

/// Which companions join when a proposal is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptanceRoster {
  pub companions: Vec<Uuid>,
  /// Human-readable reasons for every companion e-mail that was skipped.
  pub warnings:   Vec<String>,
}

/// Best-effort companion selection on acceptance: up to `seats - 1`
/// eligible companions are enrolled; everything else is skipped with a
/// warning instead of failing the acceptance.
pub fn plan_acceptance(
  matcher: &CareerMatcher,
  topic: &Topic,
  candidates: &[CompanionCandidate],
) -> AcceptanceRoster {
  let room = topic.seats.saturating_sub(1) as usize;
  let mut roster = AcceptanceRoster::default();
  for candidate in candidates {
    match check_candidate(matcher, topic, candidate) {
      Err(problem) => roster.warnings.push(format!("{}: {problem}", candidate.email)),
      Ok(()) if roster.companions.len() >= room => {
        roster.warnings.push(format!("{}: no quedan cupos en el tema", candidate.email));
      }
      Ok(()) => {
        if let Some(person) = &candidate.person {
          roster.companions.push(person.person_id);
        }
      }
    }
  }
  roster
}
