//! Proposal submission and the state-machine write path.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tesis_core::{
  Error as Rejection, FieldErrors,
  career::CareerMatcher,
  error::push_field,
  ledger,
  notify::{self as policy, dispatch},
  person::{Person, Role},
  proposal::{NewProposal, Proposal, ProposalQuery, ProposalState},
  store::ProposalOutcome,
  topic::{Topic, TopicView},
  workflow::{self, ProposalAction},
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{encode_dt, encode_enum, encode_uuid},
  notify::TxSink,
  query, seats,
};

fn insert_proposal(conn: &Connection, p: &Proposal) -> Result<()> {
  conn.execute(
    "INSERT INTO proposals (
       proposal_id, title, objective, description, area, career, seats_requested,
       companion_emails, preferred_advisors, seats_authorized, decision_comment,
       state, student_id, advisor_id, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    params![
      encode_uuid(p.proposal_id),
      p.title,
      p.objective,
      p.description,
      p.area,
      p.career,
      p.seats_requested,
      serde_json::to_string(&p.companion_emails)?,
      serde_json::to_string(&p.preferred_advisors)?,
      p.seats_authorized,
      p.decision_comment,
      encode_enum(p.state),
      p.student_id.map(encode_uuid),
      p.advisor_id.map(encode_uuid),
      encode_dt(p.created_at),
      encode_dt(p.updated_at),
    ],
  )?;
  Ok(())
}

/// Persist the fields the state machine may change.
fn update_proposal(conn: &Connection, p: &Proposal) -> Result<()> {
  conn.execute(
    "UPDATE proposals SET
       seats_requested = ?2, companion_emails = ?3, seats_authorized = ?4,
       decision_comment = ?5, state = ?6, advisor_id = ?7, updated_at = ?8
     WHERE proposal_id = ?1",
    params![
      encode_uuid(p.proposal_id),
      p.seats_requested,
      serde_json::to_string(&p.companion_emails)?,
      p.seats_authorized,
      p.decision_comment,
      encode_enum(p.state),
      p.advisor_id.map(encode_uuid),
      encode_dt(p.updated_at),
    ],
  )?;
  Ok(())
}

// ─── Submission ──────────────────────────────────────────────────────────────

pub fn submit(conn: &Connection, author_id: Uuid, input: NewProposal, now: DateTime<Utc>) -> Result<Proposal> {
  let author = query::require_person(conn, author_id)?;
  match author.role {
    Role::Student => submit_as_student(conn, &author, input, now),
    Role::Advisor => publish_as_advisor(conn, &author, input, now),
    Role::Coordinator => {
      Err(Rejection::Eligibility("coordinación no puede proponer temas".into()).into())
    }
  }
}

fn submit_as_student(
  conn: &Connection,
  author: &Person,
  input: NewProposal,
  now: DateTime<Utc>,
) -> Result<Proposal> {
  let (companions, mut fields) = match input.validate(&author.email) {
    Ok(companions) => (companions, FieldErrors::new()),
    Err(Rejection::Validation(fields)) => (Vec::new(), fields),
    Err(other) => return Err(other.into()),
  };

  let mut preferred: Vec<Uuid> = Vec::with_capacity(input.preferred_advisors.len());
  for &id in &input.preferred_advisors {
    if !query::is_advisor(conn, id)? {
      push_field(&mut fields, "preferred_advisors", format!("{id}: no corresponde a un docente"));
    } else if !preferred.contains(&id) {
      preferred.push(id);
    }
  }
  if let Some(id) = input.advisor_id
    && !query::is_advisor(conn, id)?
  {
    push_field(&mut fields, "advisor_id", "no corresponde a un docente");
  }
  if !fields.is_empty() {
    return Err(Rejection::Validation(fields).into());
  }

  let career = if input.career.trim().is_empty() { author.career.clone() } else { input.career };
  let proposal = Proposal {
    proposal_id: Uuid::new_v4(),
    title: input.title.trim().to_owned(),
    objective: input.objective,
    description: input.description,
    area: input.area,
    career,
    seats_requested: input.seats_requested,
    companion_emails: companions,
    preferred_advisors: preferred,
    seats_authorized: None,
    decision_comment: None,
    state: ProposalState::Pending,
    student_id: Some(author.person_id),
    advisor_id: input.advisor_id,
    created_at: now,
    updated_at: now,
  };
  insert_proposal(conn, &proposal)?;
  dispatch(&mut TxSink::new(conn, now), policy::proposal_submitted(&proposal, author))?;

  tracing::info!(proposal = %proposal.proposal_id, student = %author.person_id, "proposal submitted");
  Ok(proposal)
}

/// Advisor proposals skip negotiation; their topic is created by the next
/// sync pass.
fn publish_as_advisor(
  conn: &Connection,
  author: &Person,
  input: NewProposal,
  now: DateTime<Utc>,
) -> Result<Proposal> {
  let input = NewProposal { companion_emails: Vec::new(), ..input };
  input.validate(&author.email)?;

  let proposal = Proposal {
    proposal_id: Uuid::new_v4(),
    title: input.title.trim().to_owned(),
    objective: input.objective,
    description: input.description,
    area: input.area,
    career: input.career,
    seats_requested: input.seats_requested,
    companion_emails: Vec::new(),
    preferred_advisors: Vec::new(),
    seats_authorized: Some(input.seats_requested),
    decision_comment: None,
    state: ProposalState::Accepted,
    student_id: None,
    advisor_id: Some(author.person_id),
    created_at: now,
    updated_at: now,
  };
  insert_proposal(conn, &proposal)?;

  tracing::info!(proposal = %proposal.proposal_id, advisor = %author.person_id, "advisor proposal published");
  Ok(proposal)
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn list(conn: &Connection, q: &ProposalQuery) -> Result<Vec<Proposal>> {
  let mut proposals = query::proposals(conn, q.student_id, q.state)?;
  if let Some(advisor) = q.advisor_id {
    proposals.retain(|p| workflow::is_reviewer(p, advisor));
  }
  Ok(proposals)
}

// ─── State machine ───────────────────────────────────────────────────────────

pub fn apply_action(
  conn: &Connection,
  matcher: &CareerMatcher,
  id: Uuid,
  actor_id: Uuid,
  action: ProposalAction,
  now: DateTime<Utc>,
) -> Result<ProposalOutcome> {
  let proposal = query::require_proposal(conn, id)?;
  let actor = query::require_person(conn, actor_id)?;
  let transition = workflow::apply(&proposal, &actor, action, now)?;

  let mut topic = None;
  let mut warnings = Vec::new();
  if transition.changed {
    update_proposal(conn, &transition.proposal)?;
    if transition.accepted()
      && let Some(student_id) = transition.proposal.student_id
    {
      let (view, skipped) = materialize(conn, matcher, &transition.proposal, student_id, now)?;
      topic = Some(view);
      warnings = skipped;
    }
    let batch = policy::proposal_transition(
      &transition,
      topic.as_ref().map(|t: &TopicView| t.topic.topic_id),
      &warnings,
    );
    dispatch(&mut TxSink::new(conn, now), batch)?;
    tracing::info!(
      proposal = %id,
      from = %transition.from,
      to = %transition.to,
      "proposal transition"
    );
  }

  Ok(ProposalOutcome {
    proposal: transition.proposal,
    from: transition.from,
    to: transition.to,
    changed: transition.changed,
    topic,
    warnings,
  })
}

/// Turn an accepted student proposal into a topic with the student as the
/// responsible seat and, best effort, the invited companions.
fn materialize(
  conn: &Connection,
  matcher: &CareerMatcher,
  proposal: &Proposal,
  student_id: Uuid,
  now: DateTime<Utc>,
) -> Result<(TopicView, Vec<String>)> {
  let student = query::require_person(conn, student_id)?;
  if query::active_seat(conn, student_id)?.is_some() {
    return Err(Rejection::Conflict("el alumno ya tiene un cupo activo en otro tema".into()).into());
  }

  let career = if proposal.career.trim().is_empty() { student.career.clone() } else { proposal.career.clone() };
  let topic = Topic::from_proposal(proposal, career, Some(student_id), now);
  if !seats::insert_topic(conn, &topic)? {
    return Err(Rejection::Conflict("la propuesta ya tiene un tema".into()).into());
  }
  seats::upsert_enrollment(conn, topic.topic_id, student_id, true, now)?;

  let candidates = proposal
    .companion_emails
    .iter()
    .map(|email| seats::candidate(conn, topic.topic_id, email.clone()))
    .collect::<Result<Vec<_>>>()?;
  let roster = ledger::plan_acceptance(matcher, &topic, &candidates);
  for &companion in &roster.companions {
    seats::upsert_enrollment(conn, topic.topic_id, companion, false, now)?;
  }
  dispatch(
    &mut TxSink::new(conn, now),
    policy::added_on_acceptance(&topic, proposal, &roster.companions),
  )?;

  for warning in &roster.warnings {
    tracing::warn!(proposal = %proposal.proposal_id, "companion skipped: {warning}");
  }
  tracing::info!(
    proposal = %proposal.proposal_id,
    topic = %topic.topic_id,
    seats = topic.seats,
    "proposal materialised"
  );

  let enrolled = 1 + roster.companions.len() as u32;
  Ok((TopicView::new(topic, enrolled, false), roster.warnings))
}
