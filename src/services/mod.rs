//! Business logic services

pub mod import;
pub mod import_history;
pub mod iplocation;
