//! Notification policy.
//!
//! The builders below decide who hears about each domain event and what the
//! structured `metadata` carries. They are pure; delivery goes through a
//! [`NotificationSink`], which storage backends implement over their own
//! write transaction so a notification is committed together with the change
//! that caused it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  person::Person,
  proposal::Proposal,
  topic::Topic,
  workflow::{ActionKind, Transition},
};

/// Coarse routing tag shown by clients.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
pub enum NotificationKind {
  #[serde(rename = "tema")]
  #[strum(serialize = "tema")]
  Topic,
  #[serde(rename = "propuesta")]
  #[strum(serialize = "propuesta")]
  Proposal,
  #[serde(rename = "inscripcion")]
  #[strum(serialize = "inscripcion")]
  Enrollment,
  #[serde(rename = "reunion")]
  #[strum(serialize = "reunion")]
  Meeting,
  #[serde(rename = "general")]
  #[strum(serialize = "general")]
  General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub notification_id: Uuid,
  pub recipient_id:    Uuid,
  pub title:           String,
  pub message:         String,
  pub kind:            NotificationKind,
  pub metadata:        Value,
  pub read:            bool,
  pub created_at:      DateTime<Utc>,
}

/// A notification that has been decided on but not yet delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
  pub recipient_id: Uuid,
  pub title:        String,
  pub message:      String,
  pub kind:         NotificationKind,
  pub metadata:     Value,
}

impl NewNotification {
  /// The `evento` tag of the metadata, if any.
  pub fn event(&self) -> Option<&str> { self.metadata.get("evento").and_then(Value::as_str) }
}

/// Where decided notifications go.
pub trait NotificationSink {
  type Error;

  fn deliver(&mut self, notification: NewNotification) -> Result<Notification, Self::Error>;
}

/// Deliver every notification in `batch`, stopping at the first failure.
pub fn dispatch<S: NotificationSink>(
  sink: &mut S,
  batch: Vec<NewNotification>,
) -> Result<Vec<Notification>, S::Error> {
  batch.into_iter().map(|n| sink.deliver(n)).collect()
}

fn note(
  recipient_id: Uuid,
  kind: NotificationKind,
  title: String,
  message: String,
  metadata: Value,
) -> NewNotification {
  NewNotification { recipient_id, title, message, kind, metadata }
}

/// `base` with extra keys merged in.
fn with(base: &Value, extra: Value) -> Value {
  let mut out = base.clone();
  if let (Some(out), Value::Object(extra)) = (out.as_object_mut(), extra) {
    out.extend(extra);
  }
  out
}

fn topic_meta(event: &str, topic: &Topic) -> Value {
  json!({
    "evento":        event,
    "tema_id":       topic.topic_id,
    "tema_titulo":   topic.title,
    "cupos_totales": topic.seats,
  })
}

// ─── Topic events ────────────────────────────────────────────────────────────

/// A seat was reserved (or a past seat reactivated).
pub fn seat_reserved(
  topic: &Topic,
  student: &Person,
  seats_available: u32,
  reactivated: bool,
  enrollment_id: Uuid,
) -> Vec<NewNotification> {
  let base = with(
    &topic_meta("reserva_tema", topic),
    json!({
      "alumno_id":         student.person_id,
      "cupos_disponibles": seats_available,
      "reactivada":        reactivated,
      "inscripcion_id":    enrollment_id,
    }),
  );

  let mut out = Vec::with_capacity(2);
  if let Some(steward) = topic.steward() {
    let action = if reactivated { "reactivó su participación en" } else { "reservó" };
    out.push(note(
      steward,
      NotificationKind::Topic,
      format!("{} reservó el tema \"{}\"", student.full_name, topic.title),
      format!("El alumno {} ({}) {action} el tema \"{}\".", student.full_name, student.email, topic.title),
      with(&base, json!({ "destinatario": "docente", "docente_id": steward })),
    ));
  }

  let (title, message) = if reactivated {
    (
      format!("Reserva reactivada para \"{}\"", topic.title),
      format!("Reactivamos tu participación en el tema \"{}\". El docente fue notificado.", topic.title),
    )
  } else {
    (
      format!("Reserva del tema \"{}\" registrada", topic.title),
      format!(
        "Tu reserva en el tema \"{}\" fue registrada. El docente será notificado para continuar el proceso.",
        topic.title
      ),
    )
  };
  out.push(note(
    student.person_id,
    NotificationKind::Enrollment,
    title,
    message,
    with(&base, json!({ "destinatario": "alumno" })),
  ));
  out
}

/// The last seat was taken.
pub fn seats_full(topic: &Topic, students: &[Uuid]) -> Vec<NewNotification> {
  let base = topic_meta("cupos_completados", topic);
  let mut out = Vec::with_capacity(students.len() + 1);
  if let Some(steward) = topic.steward() {
    out.push(note(
      steward,
      NotificationKind::Topic,
      format!("El tema \"{}\" completó sus cupos", topic.title),
      format!(
        "El tema \"{}\" alcanzó su máximo de {} cupos y no admite más alumnos.",
        topic.title, topic.seats
      ),
      with(&base, json!({ "destinatario": "docente", "docente_id": steward })),
    ));
  }
  out.extend(students.iter().map(|&student| {
    note(
      student,
      NotificationKind::Enrollment,
      format!("Cupos completos en \"{}\"", topic.title),
      format!("El tema \"{}\" alcanzó su límite de participantes.", topic.title),
      with(&base, json!({ "destinatario": "alumno", "alumno_id": student })),
    )
  }));
  out
}

/// The topic is being closed; `students` are the active seat holders.
pub fn topic_closed(topic: &Topic, students: &[Uuid]) -> Vec<NewNotification> {
  let base = topic_meta("tema_finalizado", topic);
  let mut out = Vec::with_capacity(students.len() + 1);
  if let Some(steward) = topic.steward() {
    out.push(note(
      steward,
      NotificationKind::Topic,
      format!("Se cerró el tema \"{}\"", topic.title),
      format!(
        "El tema \"{}\" fue marcado como finalizado. Se notificó a los alumnos asociados.",
        topic.title
      ),
      with(&base, json!({ "destinatario": "docente", "docente_id": steward })),
    ));
  }
  out.extend(students.iter().map(|&student| {
    note(
      student,
      NotificationKind::Enrollment,
      format!("Estado final del tema \"{}\"", topic.title),
      format!(
        "El proceso asociado al tema \"{}\" finalizó. Conserva este mensaje como confirmación.",
        topic.title
      ),
      with(&base, json!({ "destinatario": "alumno", "alumno_id": student })),
    )
  }));
  out
}

/// Companions were added to or removed from a topic's group by `by`.
pub fn roster_changed(topic: &Topic, by: &Person, added: &[Uuid], removed: &[Uuid]) -> Vec<NewNotification> {
  let added_notes = added.iter().map(|&student| {
    note(
      student,
      NotificationKind::Enrollment,
      format!("Fuiste agregado al tema \"{}\"", topic.title),
      format!("{} te agregó como compañero en el tema \"{}\".", by.full_name, topic.title),
      with(
        &topic_meta("companero_asignado", topic),
        json!({ "alumno_id": student, "responsable_id": by.person_id }),
      ),
    )
  });
  let removed_notes = removed.iter().map(|&student| {
    note(
      student,
      NotificationKind::Enrollment,
      format!("Ya no participas en el tema \"{}\"", topic.title),
      format!("{} actualizó el grupo del tema \"{}\" y liberó tu cupo.", by.full_name, topic.title),
      with(
        &topic_meta("companero_removido", topic),
        json!({ "alumno_id": student, "responsable_id": by.person_id }),
      ),
    )
  });
  added_notes.chain(removed_notes).collect()
}

// ─── Proposal events ─────────────────────────────────────────────────────────

/// A student submitted a proposal; every reviewer hears about it.
pub fn proposal_submitted(proposal: &Proposal, author: &Person) -> Vec<NewNotification> {
  let meta = json!({
    "evento":           "propuesta_creada",
    "propuesta_id":     proposal.proposal_id,
    "alumno_id":        author.person_id,
    "cupos_requeridos": proposal.seats_requested,
  });
  proposal
    .reviewers()
    .into_iter()
    .map(|advisor| {
      note(
        advisor,
        NotificationKind::Proposal,
        format!("Nueva propuesta: \"{}\"", proposal.title),
        format!(
          "{} ({}) envió la propuesta \"{}\" solicitando {} cupos.",
          author.full_name, author.email, proposal.title, proposal.seats_requested
        ),
        meta.clone(),
      )
    })
    .collect()
}

/// The notification produced by a state-machine transition.
///
/// Advisor actions notify the proposing student; a seat confirmation
/// notifies the advisor. An unchanged transition (re-rejection) notifies no
/// one. `topic_id` and `warnings` are only reported on acceptance.
pub fn proposal_transition(
  transition: &Transition,
  topic_id: Option<Uuid>,
  warnings: &[String],
) -> Vec<NewNotification> {
  if !transition.changed {
    return Vec::new();
  }
  let p = &transition.proposal;
  let mut meta = json!({
    "evento":                  transition.action.event(),
    "propuesta_id":            p.proposal_id,
    "estado_anterior":         transition.from,
    "estado_nuevo":            transition.to,
    "cupos_requeridos":        p.seats_requested,
    "cupos_maximo_autorizado": p.seats_authorized,
    "comentario":              p.decision_comment,
  });
  if transition.accepted() {
    meta = with(&meta, json!({ "tema_id": topic_id, "advertencias": warnings }));
  }

  let (recipient, title, message) = match transition.action {
    ActionKind::Authorize => (
      p.student_id,
      format!("Propuesta \"{}\" autorizada", p.title),
      format!(
        "El docente autorizó {} cupos para tu propuesta. Queda pendiente la aprobación final.",
        p.seats_authorized.unwrap_or(p.seats_requested)
      ),
    ),
    ActionKind::RequestAdjustment => (
      p.student_id,
      format!("Ajuste solicitado en \"{}\"", p.title),
      format!(
        "El docente autoriza como máximo {} cupos. Confirma los cupos y compañeros para continuar.",
        p.seats_authorized.unwrap_or(p.seats_requested)
      ),
    ),
    ActionKind::Reject => (
      p.student_id,
      format!("Propuesta \"{}\" rechazada", p.title),
      match &p.decision_comment {
        Some(c) => format!("Tu propuesta fue rechazada: {c}"),
        None => "Tu propuesta fue rechazada.".to_owned(),
      },
    ),
    ActionKind::ApproveFinal => (
      p.student_id,
      format!("Propuesta \"{}\" aceptada", p.title),
      format!("Tu propuesta fue aceptada y ya está disponible como tema con {} cupos.", p.materialized_seats()),
    ),
    ActionKind::ConfirmSeats => (
      p.advisor_id,
      format!("Cupos confirmados en \"{}\"", p.title),
      format!(
        "El alumno confirmó {} cupos para la propuesta \"{}\". Queda pendiente tu aprobación final.",
        p.seats_requested, p.title
      ),
    ),
  };

  recipient
    .map(|r| note(r, NotificationKind::Proposal, title, message, meta))
    .into_iter()
    .collect()
}

/// Companions enrolled automatically when a proposal was accepted.
pub fn added_on_acceptance(topic: &Topic, proposal: &Proposal, companions: &[Uuid]) -> Vec<NewNotification> {
  companions
    .iter()
    .map(|&student| {
      note(
        student,
        NotificationKind::Enrollment,
        format!("Fuiste agregado al tema \"{}\"", topic.title),
        format!("La propuesta \"{}\" fue aceptada y te incluye como compañero.", proposal.title),
        with(
          &topic_meta("companero_asignado", topic),
          json!({ "alumno_id": student, "propuesta_id": proposal.proposal_id }),
        ),
      )
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    person::Role,
    proposal::{ProposalState, tests::sample},
    workflow::{ProposalAction, apply},
  };

  struct VecSink(Vec<Notification>);

  impl NotificationSink for VecSink {
    type Error = std::convert::Infallible;

    fn deliver(&mut self, n: NewNotification) -> Result<Notification, Self::Error> {
      let delivered = Notification {
        notification_id: Uuid::new_v4(),
        recipient_id:    n.recipient_id,
        title:           n.title,
        message:         n.message,
        kind:            n.kind,
        metadata:        n.metadata,
        read:            false,
        created_at:      Utc::now(),
      };
      self.0.push(delivered.clone());
      Ok(delivered)
    }
  }

  fn advisor() -> Person {
    Person {
      person_id:  Uuid::new_v4(),
      full_name:  "Docente".into(),
      email:      "docente@uni.cl".into(),
      career:     String::new(),
      role:       Role::Advisor,
      advisor_id: None,
      created_at: Utc::now(),
    }
  }

  fn topic(advisor: Option<Uuid>) -> Topic {
    Topic {
      topic_id: Uuid::new_v4(),
      title: "Visión".into(),
      career: String::new(),
      area: String::new(),
      description: String::new(),
      requirements: vec![],
      seats: 2,
      created_by: None,
      advisor_id: advisor,
      proposal_id: None,
      created_at: Utc::now(),
      closed_at: None,
    }
  }

  #[test]
  fn adjustment_notifies_student_with_authorized_max() {
    let p = sample();
    let t = apply(
      &p,
      &advisor(),
      ProposalAction::RequestAdjustment { seats_authorized: Some(2), comment: Some("menos".into()) },
      Utc::now(),
    )
    .unwrap();
    let out = proposal_transition(&t, None, &[]);
    assert_eq!(out.len(), 1);
    let n = &out[0];
    assert_eq!(Some(n.recipient_id), p.student_id);
    assert_eq!(n.event(), Some("propuesta_ajuste_solicitado"));
    assert_eq!(n.metadata["cupos_maximo_autorizado"], 2);
    assert_eq!(n.metadata["estado_anterior"], "pendiente");
    assert_eq!(n.metadata["estado_nuevo"], "pendiente_ajuste");
    assert_eq!(n.metadata["comentario"], "menos");
    assert!(n.metadata.get("tema_id").is_none());
  }

  #[test]
  fn unchanged_transition_is_silent() {
    let mut p = sample();
    p.state = ProposalState::Rejected;
    let t = apply(&p, &advisor(), ProposalAction::Reject { comment: None }, Utc::now()).unwrap();
    assert!(proposal_transition(&t, None, &[]).is_empty());
  }

  #[test]
  fn acceptance_reports_topic_and_warnings() {
    let p = sample();
    let t = apply(&p, &advisor(), ProposalAction::ApproveFinal { comment: None }, Utc::now()).unwrap();
    let topic_id = Uuid::new_v4();
    let out = proposal_transition(&t, Some(topic_id), &["x@uni.cl: no existe".to_owned()]);
    assert_eq!(out[0].metadata["tema_id"], json!(topic_id));
    assert_eq!(out[0].metadata["advertencias"][0], "x@uni.cl: no existe");
  }

  #[test]
  fn reservation_without_steward_only_notifies_student() {
    let student = Person { role: Role::Student, ..advisor() };
    let out = seat_reserved(&topic(None), &student, 1, false, Uuid::new_v4());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, NotificationKind::Enrollment);
    assert_eq!(out[0].metadata["reactivada"], false);
  }

  #[test]
  fn closing_reaches_steward_and_students() {
    let steward = Uuid::new_v4();
    let students = [Uuid::new_v4(), Uuid::new_v4()];
    let mut sink = VecSink(Vec::new());
    let delivered = dispatch(&mut sink, topic_closed(&topic(Some(steward)), &students)).unwrap();
    assert_eq!(delivered.len(), 3);
    assert_eq!(delivered[0].recipient_id, steward);
    assert!(delivered.iter().all(|n| n.metadata["evento"] == "tema_finalizado"));
    assert_eq!(sink.0.len(), 3);
  }

  #[test]
  fn submission_fans_out_to_preferred_advisors() {
    let mut p = sample();
    p.preferred_advisors = vec![Uuid::new_v4(), Uuid::new_v4()];
    let author = Person { role: Role::Student, ..advisor() };
    let out = proposal_submitted(&p, &author);
    assert_eq!(out.len(), 2);
    assert_eq!(out[1].recipient_id, p.preferred_advisors[1]);
  }

  #[test]
  fn kind_text_forms() {
    assert_eq!(NotificationKind::Enrollment.to_string(), "inscripcion");
    assert_eq!(serde_json::to_value(NotificationKind::Topic).unwrap(), "tema");
  }
}
