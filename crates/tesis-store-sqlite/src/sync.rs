//! ProposalSync: materialise advisor-authored accepted proposals.
//!
//! Runs before every topic listing. The `UNIQUE(proposal_id)` column on
//! `topics` decides which writer wins when two passes race; the loser skips.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tesis_core::{store::SyncReport, topic::Topic};

use crate::{Result, query, seats};

pub fn run(conn: &Connection, now: DateTime<Utc>) -> Result<SyncReport> {
  let mut report = SyncReport::default();
  for proposal in query::unmaterialized_proposals(conn)? {
    let career = if proposal.career.trim().is_empty() {
      match proposal.advisor_id {
        Some(id) => query::person(conn, id)?.map(|p| p.career).unwrap_or_default(),
        None => String::new(),
      }
    } else {
      proposal.career.clone()
    };

    let topic = Topic::from_proposal(&proposal, career, proposal.advisor_id, now);
    if seats::insert_topic(conn, &topic)? {
      tracing::info!(proposal = %proposal.proposal_id, topic = %topic.topic_id, "proposal materialised");
      report.created.push(topic.topic_id);
    } else {
      tracing::debug!(proposal = %proposal.proposal_id, "proposal already materialised; skipping");
      report.skipped += 1;
    }
  }
  Ok(report)
}
