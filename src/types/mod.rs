//! Type definitions

pub mod import;
pub mod list;
pub mod messages;
pub mod subscriber;

pub use import::*;
pub use list::*;
pub use messages::*;
pub use subscriber::*;
