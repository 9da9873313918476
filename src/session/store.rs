//! Session store — one record per user, with per-user serialization.
//!
//! Each user owns a slot guarded by a FIFO mutex. The slot outlives the
//! record: `clear` empties it so the next lookup sees a fresh session, while
//! the mutex itself stays the single serialization point for that user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::gateway::AuthContext;

use super::model::{ConversationState, Session, UserId};

type Slot = Arc<Mutex<Option<Session>>>;

/// Concurrency-safe map of user identity → session.
#[derive(Default)]
pub struct SessionStore {
    slots: RwLock<HashMap<UserId, Slot>>,
    credentials: RwLock<HashMap<UserId, Arc<AuthContext>>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn slot(&self, user: &UserId) -> Slot {
        if let Some(slot) = self.slots.read().await.get(user) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(user.clone()).or_default())
    }

    /// Acquire exclusive access to a user's session.
    ///
    /// Waiters are served in the order they called `lock`.
    pub async fn lock(&self, user: &UserId) -> SessionGuard {
        let guard = self.slot(user).await.lock_owned().await;
        SessionGuard {
            user: user.clone(),
            guard,
        }
    }

    /// Snapshot of a user's session, or a fresh one if none exists.
    pub async fn get(&self, user: &UserId) -> Session {
        self.lock(user).await.session().cloned().unwrap_or_default()
    }

    pub async fn set_state(&self, user: &UserId, state: ConversationState) {
        self.lock(user).await.session_mut().set_state(state);
    }

    pub async fn merge_fields<I, K, V>(&self, user: &UserId, partial: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.lock(user).await.session_mut().merge_fields(partial);
    }

    /// Remove a user's session record entirely.
    pub async fn clear(&self, user: &UserId) {
        self.lock(user).await.clear();
    }

    /// The user's bearer credential holder. Survives `clear`.
    pub async fn auth(&self, user: &UserId) -> Arc<AuthContext> {
        if let Some(auth) = self.credentials.read().await.get(user) {
            return Arc::clone(auth);
        }
        let mut credentials = self.credentials.write().await;
        Arc::clone(credentials.entry(user.clone()).or_default())
    }

    /// Number of users with a live session record.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop sessions idle for longer than `idle`, and empty slots nobody holds.
    /// Returns the number of sessions removed.
    pub async fn prune_idle(&self, idle: Duration) -> usize {
        let mut slots = self.slots.write().await;
        let mut pruned = 0;

        slots.retain(|user, slot| {
            // Someone is waiting on or holding this slot.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(guard) = slot.try_lock() else {
                return true;
            };
            match (*guard).as_ref() {
                None => false,
                Some(session) if session.is_idle_for(idle) => {
                    debug!(user = %user, state = %session.state, "Pruning idle session");
                    pruned += 1;
                    false
                }
                Some(_) => true,
            }
        });

        if pruned > 0 {
            info!(count = pruned, "Pruned idle sessions");
        }
        pruned
    }
}

/// Exclusive handle on one user's session.
pub struct SessionGuard {
    user: UserId,
    guard: OwnedMutexGuard<Option<Session>>,
}

impl SessionGuard {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn session(&self) -> Option<&Session> {
        (*self.guard).as_ref()
    }

    /// The session, created on first access. Marks activity.
    pub fn session_mut(&mut self) -> &mut Session {
        let session = self.guard.get_or_insert_with(Session::new);
        session.touch();
        session
    }

    pub fn state(&self) -> ConversationState {
        self.session().map(|s| s.state).unwrap_or_default()
    }

    pub fn pending(&self) -> Option<Uuid> {
        self.session().and_then(|s| s.pending)
    }

    pub fn field(&self, key: &str) -> Option<String> {
        self.session().and_then(|s| s.field(key)).map(String::from)
    }

    /// Remove the record; the next access starts from a fresh session.
    pub fn clear(&mut self) {
        *self.guard = None;
    }

    /// Mark a backend call as outstanding and return its ticket.
    pub fn begin_submission(&mut self) -> Uuid {
        let ticket = Uuid::new_v4();
        self.session_mut().pending = Some(ticket);
        ticket
    }

    /// Settle the outstanding call. Returns `false` when the session moved on
    /// (cancelled, cleared, or superseded) and the result must be dropped.
    pub fn finish_submission(&mut self, ticket: Uuid) -> bool {
        match (*self.guard).as_mut() {
            Some(session) if session.pending == Some(ticket) => {
                session.pending = None;
                session.touch();
                true
            }
            _ => false,
        }
    }
}

/// Spawn a background task that periodically prunes idle sessions.
pub fn spawn_prune_task(store: Arc<SessionStore>, idle: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600)); // Every 10 min
        interval.tick().await; // Skip immediate first tick
        loop {
            interval.tick().await;
            store.prune_idle(idle).await;
        }
    })
}
