//! The `ThesisStore` trait and supporting query/outcome types.
//!
//! The trait is implemented by storage backends (e.g. `tesis-store-sqlite`).
//! Higher layers (`tesis-api`, `tesis-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use serde::Serialize;
use uuid::Uuid;

use crate::{
  notify::Notification,
  person::{NewPerson, Person, Role},
  proposal::{NewProposal, Proposal, ProposalQuery, ProposalState},
  topic::{Enrollment, NewTopic, Topic, TopicView},
  workflow::ProposalAction,
};

// ─── Query and outcome types ─────────────────────────────────────────────────

/// Parameters for [`ThesisStore::list_topics`].
#[derive(Debug, Clone, Default)]
pub struct TopicQuery {
  /// Keep topics whose career admits this one.
  pub career:         Option<String>,
  /// Keep topics open to this student: career-compatible or already holding
  /// the student's seat.
  pub student_id:     Option<Uuid>,
  /// Keep topics created by or assigned to this person.
  pub owner_id:       Option<Uuid>,
  /// Person whose seat drives [`TopicView::holds_seat`].
  pub viewer:         Option<Uuid>,
  pub include_closed: bool,
}

/// Result of [`ThesisStore::apply_proposal_action`].
#[derive(Debug, Clone, Serialize)]
pub struct ProposalOutcome {
  pub proposal: Proposal,
  pub from:     ProposalState,
  pub to:       ProposalState,
  pub changed:  bool,
  /// The topic materialised on acceptance.
  pub topic:    Option<TopicView>,
  /// Companion e-mails skipped on acceptance, with the reason.
  pub warnings: Vec<String>,
}

/// Result of [`ThesisStore::sync_accepted_proposals`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// Topics created by this pass.
  pub created: Vec<Uuid>,
  /// Proposals another writer materialised first.
  pub skipped: usize,
}

/// Result of [`ThesisStore::reserve_seat`].
#[derive(Debug, Clone, Serialize)]
pub struct ReservationOutcome {
  pub topic:        TopicView,
  pub enrollment:   Enrollment,
  /// An earlier, inactive seat was reused instead of inserting a new one.
  pub reactivated:  bool,
  pub seats_before: u32,
}

impl ReservationOutcome {
  /// This reservation took the last seat.
  pub fn filled(&self) -> bool { self.seats_before > 0 && self.topic.seats_available == 0 }
}

/// Result of [`ThesisStore::assign_companions`].
#[derive(Debug, Clone, Serialize)]
pub struct CompanionOutcome {
  pub topic:       TopicView,
  /// The active roster after the assignment.
  pub enrollments: Vec<Enrollment>,
  /// Students whose seat was released.
  pub released:    Vec<Uuid>,
}

/// Backend errors that may carry a domain rejection.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The domain rejection this error carries, or the error itself when it is
  /// an infrastructure failure.
  fn into_rejection(self) -> Result<crate::Error, Self>
  where
    Self: Sized;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a thesis-workflow store backend.
///
/// Every mutation is atomic: the decision, the row changes and the
/// notifications it produces commit together or not at all. Seat invariants
/// are re-checked against committed state inside the write transaction.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ThesisStore: Send + Sync {
  type Error: StoreError;

  // ── People ────────────────────────────────────────────────────────────

  /// Register a person. E-mails are unique after normalisation.
  fn add_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  fn get_person(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  /// The person registered under `email` together with their password hash.
  fn credentials(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<(Person, String)>, Self::Error>> + Send + '_;

  fn list_people(
    &self,
    role: Option<Role>,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + '_;

  // ── Proposals ─────────────────────────────────────────────────────────

  /// Submit a proposal authored by `author_id`.
  ///
  /// Student proposals start `pendiente` and notify their reviewers.
  /// Advisor proposals are published directly as `aceptada`; their topic
  /// appears on the next [`sync_accepted_proposals`](Self::sync_accepted_proposals).
  fn submit_proposal(
    &self,
    author_id: Uuid,
    input: NewProposal,
  ) -> impl Future<Output = Result<Proposal, Self::Error>> + Send + '_;

  fn get_proposal(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Proposal>, Self::Error>> + Send + '_;

  fn list_proposals(
    &self,
    query: ProposalQuery,
  ) -> impl Future<Output = Result<Vec<Proposal>, Self::Error>> + Send + '_;

  /// Run one state-machine action. Acceptance of a student proposal
  /// materialises its topic and group in the same transaction.
  fn apply_proposal_action(
    &self,
    id: Uuid,
    actor_id: Uuid,
    action: ProposalAction,
  ) -> impl Future<Output = Result<ProposalOutcome, Self::Error>> + Send + '_;

  // ── Topics ────────────────────────────────────────────────────────────

  fn create_topic(
    &self,
    creator_id: Uuid,
    input: NewTopic,
  ) -> impl Future<Output = Result<TopicView, Self::Error>> + Send + '_;

  /// Returns `None` if the topic does not exist. Closed topics are returned.
  fn get_topic(
    &self,
    id: Uuid,
    viewer: Option<Uuid>,
  ) -> impl Future<Output = Result<Option<TopicView>, Self::Error>> + Send + '_;

  /// List topics. Runs [`sync_accepted_proposals`](Self::sync_accepted_proposals)
  /// first.
  fn list_topics(
    &self,
    query: TopicQuery,
  ) -> impl Future<Output = Result<Vec<TopicView>, Self::Error>> + Send + '_;

  /// Materialise advisor-authored accepted proposals that have no topic yet.
  /// Safe to run concurrently; duplicate creation is skipped.
  fn sync_accepted_proposals(
    &self,
  ) -> impl Future<Output = Result<SyncReport, Self::Error>> + Send + '_;

  // ── Seats ─────────────────────────────────────────────────────────────

  fn reserve_seat(
    &self,
    topic_id: Uuid,
    student_id: Uuid,
  ) -> impl Future<Output = Result<ReservationOutcome, Self::Error>> + Send + '_;

  /// Replace the topic's group with the caller plus `emails`.
  fn assign_companions(
    &self,
    topic_id: Uuid,
    student_id: Uuid,
    emails: Vec<String>,
  ) -> impl Future<Output = Result<CompanionOutcome, Self::Error>> + Send + '_;

  /// Notify the steward and every active enrollee, then release every seat
  /// and mark the topic closed.
  fn close_topic(
    &self,
    topic_id: Uuid,
    actor_id: Uuid,
  ) -> impl Future<Output = Result<Topic, Self::Error>> + Send + '_;

  fn list_enrollments(
    &self,
    topic_id: Uuid,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<Enrollment>, Self::Error>> + Send + '_;

  // ── Notifications ─────────────────────────────────────────────────────

  fn list_notifications(
    &self,
    recipient_id: Uuid,
    unread_only: bool,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Flag a notification as read. Only its recipient may do so.
  fn mark_notification_read(
    &self,
    recipient_id: Uuid,
    id: Uuid,
  ) -> impl Future<Output = Result<Notification, Self::Error>> + Send + '_;
}
