//! SQLite backend for the Amend pattern store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Pattern writes are version-checked,
//! which is what makes the engine's optimistic upserts safe under
//! concurrent writers.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
