//! Conversation dispatcher.
//!
//! Routes each inbound event through the transition table to a handler,
//! drives session state, and calls the backend on terminal steps.
//!
//! Session access is serialized per user by the store's lock. Handlers hold
//! that lock only around reads and writes of session state: before a backend
//! call they stamp the session with a ticket and release it, and afterwards
//! they re-acquire it and apply the result only if the ticket is still
//! current. A cancel in between clears the ticket, so the late result is
//! dropped.

mod commands;
pub mod event;
mod handlers;
pub mod transition;
pub mod validate;

pub use event::{Action, Command, Event, EventKind, NoopNotifier, Notifier, OutgoingContent};
pub use transition::{Route, route};

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::gateway::{AuthContext, Backend};
use crate::prompts;
use crate::session::{SessionGuard, SessionStore, UserId};

/// Event router and flow driver. One instance serves all users.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    sessions: Arc<SessionStore>,
    admins: HashSet<UserId>,
}

/// An outstanding backend call. The session lock is not held.
struct Ticket {
    user: UserId,
    id: Uuid,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        sessions: Arc<SessionStore>,
        admins: HashSet<UserId>,
    ) -> Self {
        Self {
            backend,
            sessions,
            admins,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user)
    }

    /// Handle one event for `user`.
    ///
    /// Returns `None` when the event produced a result that is no longer
    /// wanted (the session moved on while the backend was working).
    pub async fn dispatch(
        &self,
        user: &UserId,
        event: Event,
        notifier: &dyn Notifier,
    ) -> Option<OutgoingContent> {
        let guard = self.sessions.lock(user).await;
        self.dispatch_locked(guard, event, notifier).await
    }

    /// Like [`dispatch`](Self::dispatch), for callers that already acquired
    /// the user's session lock to fix arrival order.
    pub async fn dispatch_locked(
        &self,
        mut guard: SessionGuard,
        event: Event,
        notifier: &dyn Notifier,
    ) -> Option<OutgoingContent> {
        let state = guard.state();
        let kind = event.kind();

        if guard.pending().is_some() && !event.allowed_while_pending() {
            debug!(user = %guard.user(), %state, ?kind, "Request in flight; deferring");
            return Some(prompts::still_working());
        }

        let Some(route) = transition::route(state, kind) else {
            warn!(user = %guard.user(), %state, ?kind, "No route for event");
            return Some(prompts::idle_hint());
        };
        debug!(user = %guard.user(), %state, ?kind, ?route, "Dispatching");

        match (route, event) {
            (Route::Cancel, _) => {
                guard.clear();
                Some(prompts::cancelled())
            }
            (Route::Command, Event::Command(command)) => {
                self.run_command(guard, command).await
            }
            (Route::CollectEmail, Event::Text(text)) => {
                Some(handlers::collect_email(&mut guard, &text))
            }
            (Route::CollectPassword, Event::Text(text)) => {
                Some(handlers::collect_password(&mut guard, &text))
            }
            (Route::ConfirmPassword, Event::Text(text)) => {
                Some(handlers::confirm_password(&mut guard, &text))
            }
            (Route::SubmitRegistration, Event::Text(text)) => {
                self.submit_registration(guard, &text).await
            }
            (Route::CollectLoginEmail, Event::Text(text)) => {
                Some(handlers::collect_login_email(&mut guard, &text))
            }
            (Route::SubmitLogin, Event::Text(text)) => self.submit_login(guard, &text).await,
            (Route::CollectAddress, Event::Text(text)) => {
                Some(handlers::collect_address(&mut guard, &text))
            }
            (Route::SubmitScan, Event::TierSelected(tier)) => {
                self.submit_scan(guard, tier, notifier).await
            }
            (Route::RepromptTier, _) => Some(prompts::choose_tier_reminder()),
            (Route::IdleText, _) => Some(prompts::idle_hint()),
            (Route::StaleTier, _) => Some(prompts::stale_tier()),
            (route, _) => {
                warn!(?route, ?kind, "Route does not fit event");
                Some(prompts::idle_hint())
            }
        }
    }

    /// Stamp the session and release the lock ahead of a backend call.
    fn release(mut guard: SessionGuard) -> Ticket {
        let id = guard.begin_submission();
        Ticket {
            user: guard.user().clone(),
            id,
        }
    }

    /// Re-lock after a backend call. `None` if the session moved on.
    async fn reacquire(&self, ticket: Ticket) -> Option<SessionGuard> {
        let mut guard = self.sessions.lock(&ticket.user).await;
        if guard.finish_submission(ticket.id) {
            Some(guard)
        } else {
            debug!(user = %ticket.user, "Discarding result of superseded request");
            None
        }
    }

    /// Release for a call that needs a credential, or explain why not.
    async fn release_authenticated(
        &self,
        guard: SessionGuard,
    ) -> Result<(Ticket, Arc<AuthContext>), OutgoingContent> {
        let auth = self.sessions.auth(guard.user()).await;
        if !auth.is_authenticated().await {
            debug!(user = %guard.user(), "Not logged in");
            return Err(prompts::not_logged_in());
        }
        Ok((Self::release(guard), auth))
    }

    /// Apply a backend result to a session that is still waiting for it.
    /// Failures clear the session.
    async fn settle<T>(
        &self,
        ticket: Ticket,
        result: Result<T, GatewayError>,
        render: impl FnOnce(&T) -> OutgoingContent,
    ) -> Option<OutgoingContent> {
        let mut guard = self.reacquire(ticket).await?;
        match result {
            Ok(value) => Some(render(&value)),
            Err(error) => {
                warn!(user = %guard.user(), %error, "Backend request failed");
                guard.clear();
                Some(prompts::gateway_error(&error))
            }
        }
    }
}
