//! Database queries
//!
//! Import queries take `&mut PgConnection` so they run inside the per-batch
//! transaction, and return `sqlx::Error` directly so unique violations stay
//! distinguishable from other failures.

pub mod blacklist;
pub mod field;
pub mod list;
pub mod subscriber;
