//! Data models shared across storage and API handlers.

pub mod session;

pub use session::*;
