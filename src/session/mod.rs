//! Login sessions for the interactive (cookie-based) flow.
//!
//! Kept in memory only, with background cleanup of expired entries.

pub mod cleanup;
pub mod store;
pub mod types;

pub use cleanup::{spawn_cleanup_task, DEFAULT_CLEANUP_INTERVAL_SECS};
pub use store::SessionStore;
pub use types::{Profile, Session, SessionId};
