//! SQLite backend for the thesis-workflow store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every mutation runs in one
//! `BEGIN IMMEDIATE` transaction together with the notifications it causes.

mod encode;
mod notify;
mod proposals;
mod query;
mod schema;
mod seats;
mod store;
mod sync;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
