//! Core types and trait definitions for the thesis topic workflow.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the decision logic (career matching, seat planning, the proposal state
//! machine and notification policy); storage backends apply those decisions
//! atomically.

pub mod career;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod person;
pub mod proposal;
pub mod store;
pub mod topic;
pub mod workflow;

pub use error::{Error, FieldErrors, Result};
