//! Error types for `tesis-core`.
//!
//! Every variant is a rejection of one request; none of them is fatal.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

/// Validation messages keyed by the wire name of the offending field.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or missing input, reported per field.
  #[error("validation failed: {}", summarize(.0))]
  Validation(FieldErrors),

  /// Role or career mismatch.
  #[error("not eligible: {0}")]
  Eligibility(String),

  /// Seat-count violation.
  #[error("capacity exceeded: {0}")]
  Capacity(String),

  /// Duplicate or overlapping state.
  #[error("conflict: {0}")]
  Conflict(String),

  /// Action invalid for the current proposal or topic state.
  #[error("invalid state: {0}")]
  State(String),

  #[error("invalid credentials")]
  Auth,

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: Uuid },
}

impl Error {
  /// A validation error carrying a single message for `field`.
  pub fn invalid(field: &str, message: impl Into<String>) -> Self {
    let mut fields = FieldErrors::new();
    fields.insert(field.to_owned(), vec![message.into()]);
    Self::Validation(fields)
  }

  pub fn not_found(entity: &'static str, id: Uuid) -> Self {
    Self::NotFound { entity, id }
  }

  /// Short machine-readable tag used in response bodies.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation",
      Self::Eligibility(_) => "eligibility",
      Self::Capacity(_) => "capacity",
      Self::Conflict(_) => "conflict",
      Self::State(_) => "state",
      Self::Auth => "auth",
      Self::NotFound { .. } => "not_found",
    }
  }
}

/// Append `message` to the list kept for `field`.
pub fn push_field(fields: &mut FieldErrors, field: &str, message: impl Into<String>) {
  fields.entry(field.to_owned()).or_default().push(message.into());
}

fn summarize(fields: &FieldErrors) -> String {
  fields
    .iter()
    .map(|(field, messages)| format!("{field}: {}", messages.join("; ")))
    .collect::<Vec<_>>()
    .join(", ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
