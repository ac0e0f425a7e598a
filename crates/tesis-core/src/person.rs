//! People: students, advisors and coordinators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

/// The closed set of roles a person can hold.
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
pub enum Role {
  #[serde(rename = "alumno")]
  #[strum(serialize = "alumno")]
  Student,
  #[serde(rename = "docente")]
  #[strum(serialize = "docente")]
  Advisor,
  #[serde(rename = "coordinador")]
  #[strum(serialize = "coordinador")]
  Coordinator,
}

impl Role {
  /// Where a freshly logged-in person of this role lands in the web client.
  pub fn landing_path(self) -> &'static str {
    match self {
      Self::Student => "/alumno",
      Self::Advisor => "/docente",
      Self::Coordinator => "/coordinacion/inicio",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
  pub person_id:  Uuid,
  pub full_name:  String,
  /// Always stored trimmed and lowercased; see [`normalize_email`].
  pub email:      String,
  /// Free-text career affiliation; may be blank.
  pub career:     String,
  pub role:       Role,
  /// Designated advisor. Only meaningful for students.
  pub advisor_id: Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

impl Person {
  pub fn is(&self, role: Role) -> bool { self.role == role }
}

/// Input to [`crate::store::ThesisStore::add_person`].
#[derive(Debug, Clone)]
pub struct NewPerson {
  pub full_name:     String,
  pub email:         String,
  pub career:        String,
  pub role:          Role,
  pub advisor_id:    Option<Uuid>,
  /// PHC string produced by the password hasher; never the raw password.
  pub password_hash: String,
}

/// Canonical form used for storage and comparison of e-mail addresses.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// A deliberately loose shape check: something before and after a single `@`.
pub fn looks_like_email(email: &str) -> bool {
  match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace)
    }
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn role_text_forms_agree() {
    for role in [Role::Student, Role::Advisor, Role::Coordinator] {
      let text = role.to_string();
      assert_eq!(Role::from_str(&text).unwrap(), role);
      let json = serde_json::to_string(&role).unwrap();
      assert_eq!(json, format!("\"{text}\""));
    }
  }

  #[test]
  fn landing_paths() {
    assert_eq!(Role::Student.landing_path(), "/alumno");
    assert_eq!(Role::Coordinator.landing_path(), "/coordinacion/inicio");
  }

  #[test]
  fn email_helpers() {
    assert_eq!(normalize_email("  Ana@Uni.CL "), "ana@uni.cl");
    assert!(looks_like_email("ana@uni.cl"));
    assert!(!looks_like_email("ana.uni.cl"));
    assert!(!looks_like_email("@uni.cl"));
    assert!(!looks_like_email("ana@@uni.cl"));
    assert!(!looks_like_email("ana maria@uni.cl"));
  }
}
