//! The notification sink: notifications are rows written in the same
//! transaction as the change that caused them.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tesis_core::{
  Error as Rejection,
  notify::{NewNotification, Notification, NotificationSink},
};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{encode_dt, encode_enum, encode_uuid},
  query,
};

/// Persists notifications through a borrowed connection (usually an open
/// transaction).
pub struct TxSink<'c> {
  conn: &'c Connection,
  now:  DateTime<Utc>,
}

impl<'c> TxSink<'c> {
  pub fn new(conn: &'c Connection, now: DateTime<Utc>) -> Self { Self { conn, now } }
}

impl NotificationSink for TxSink<'_> {
  type Error = Error;

  fn deliver(&mut self, n: NewNotification) -> Result<Notification> {
    let notification = Notification {
      notification_id: Uuid::new_v4(),
      recipient_id:    n.recipient_id,
      title:           n.title,
      message:         n.message,
      kind:            n.kind,
      metadata:        n.metadata,
      read:            false,
      created_at:      self.now,
    };
    self.conn.execute(
      "INSERT INTO notifications (
         notification_id, recipient_id, title, message, kind, metadata, read, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
      params![
        encode_uuid(notification.notification_id),
        encode_uuid(notification.recipient_id),
        notification.title,
        notification.message,
        encode_enum(notification.kind),
        serde_json::to_string(&notification.metadata)?,
        encode_dt(notification.created_at),
      ],
    )?;
    tracing::debug!(
      recipient = %notification.recipient_id,
      event = notification.metadata.get("evento").and_then(|v| v.as_str()).unwrap_or("-"),
      "notification recorded"
    );
    Ok(notification)
  }
}

/// Flag a notification as read on behalf of its recipient.
pub fn mark_read(conn: &Connection, recipient_id: Uuid, id: Uuid) -> Result<Notification> {
  let updated = conn.execute(
    "UPDATE notifications SET read = 1 WHERE notification_id = ?1 AND recipient_id = ?2",
    params![encode_uuid(id), encode_uuid(recipient_id)],
  )?;
  if updated == 0 {
    return Err(Rejection::not_found("notification", id).into());
  }
  query::notification(conn, id)?.ok_or_else(|| Rejection::not_found("notification", id).into())
}
