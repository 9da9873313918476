//! Per-user conversation sessions.
//!
//! A session tracks where a user is inside a multi-step flow and holds the
//! input collected so far. Sessions are ephemeral and in-memory only.

pub mod model;
pub mod store;

pub use model::{ConversationState, Session, Tier, UserId, field_keys};
pub use store::{SessionGuard, SessionStore, spawn_prune_task};
