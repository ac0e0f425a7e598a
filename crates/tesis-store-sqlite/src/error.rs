//! Error type for `tesis-store-sqlite`.

use rusqlite::ErrorCode;
use tesis_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The request was refused by a domain rule.
  #[error(transparent)]
  Rejected(#[from] tesis_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column holds a value the domain type does not know.
  #[error("cannot decode {column}: {value:?}")]
  Decode { column: &'static str, value: String },
}

/// Constraint failures are the database restating a domain rule; surface
/// them as the matching rejection instead of an internal error.
impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    let Some(message) = constraint_message(&err) else {
      return Self::Sqlite(err);
    };
    let rejection = if message.contains("seat capacity exceeded") {
      tesis_core::Error::Capacity("no quedan cupos disponibles".into())
    } else if message.ends_with("enrollments.student_id") && !message.contains("topic_id") {
      tesis_core::Error::Conflict("el alumno ya tiene un cupo activo en otro tema".into())
    } else if message.contains("people.email") {
      tesis_core::Error::Conflict("ya existe una persona con ese correo".into())
    } else if message.contains("topics.proposal_id") {
      tesis_core::Error::Conflict("la propuesta ya tiene un tema".into())
    } else {
      return Self::Sqlite(err);
    };
    Self::Rejected(rejection)
  }
}

impl StoreError for Error {
  fn into_rejection(self) -> Result<tesis_core::Error, Self> {
    match self {
      Self::Rejected(e) => Ok(e),
      other => Err(other),
    }
  }
}

/// The message of a constraint violation, if `err` is one.
pub(crate) fn constraint_message(err: &rusqlite::Error) -> Option<&str> {
  match err {
    rusqlite::Error::SqliteFailure(e, Some(msg)) if e.code == ErrorCode::ConstraintViolation => {
      Some(msg.as_str())
    }
    _ => None,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
