//! Flow step handlers.
//!
//! Collection steps run entirely under the session lock. Submission steps
//! validate, then release the lock for the backend call.

use tracing::{info, warn};

use crate::gateway::NewAccount;
use crate::prompts;
use crate::session::{ConversationState, SessionGuard, Tier, field_keys};

use super::event::{Notifier, OutgoingContent};
use super::{Dispatcher, validate};

// ── Registration ────────────────────────────────────────────────────

pub(super) fn collect_email(guard: &mut SessionGuard, input: &str) -> OutgoingContent {
    match validate::email(input) {
        Ok(email) => {
            let session = guard.session_mut();
            session.merge_fields([(field_keys::EMAIL, email)]);
            session.set_state(ConversationState::AwaitingPassword);
            prompts::ask_password()
        }
        Err(e) => prompts::invalid_input(e, prompts::ASK_EMAIL),
    }
}

pub(super) fn collect_password(guard: &mut SessionGuard, input: &str) -> OutgoingContent {
    match validate::password(input) {
        Ok(password) => {
            let session = guard.session_mut();
            session.merge_fields([(field_keys::PASSWORD, password)]);
            session.set_state(ConversationState::AwaitingConfirmPassword);
            prompts::ask_confirm_password()
        }
        Err(e) => prompts::invalid_input(e, prompts::ASK_PASSWORD),
    }
}

/// A mismatch sends the user back to choose the password again.
pub(super) fn confirm_password(guard: &mut SessionGuard, input: &str) -> OutgoingContent {
    let Some(stored) = guard.field(field_keys::PASSWORD) else {
        guard.session_mut().set_state(ConversationState::AwaitingPassword);
        return prompts::ask_password();
    };

    let session = guard.session_mut();
    match validate::confirm_password(input, &stored) {
        Ok(()) => {
            session.merge_fields([(field_keys::CONFIRM_PASSWORD, stored)]);
            session.set_state(ConversationState::AwaitingUsername);
            prompts::ask_username()
        }
        Err(_) => {
            session.fields.remove(field_keys::PASSWORD);
            session.set_state(ConversationState::AwaitingPassword);
            prompts::password_mismatch()
        }
    }
}

// ── Login ───────────────────────────────────────────────────────────

pub(super) fn collect_login_email(guard: &mut SessionGuard, input: &str) -> OutgoingContent {
    match validate::non_empty(input) {
        Ok(email) => {
            let session = guard.session_mut();
            session.merge_fields([(field_keys::EMAIL, email.trim())]);
            session.set_state(ConversationState::AwaitingPasswordLogin);
            prompts::ask_login_password()
        }
        Err(e) => prompts::invalid_input(e, prompts::ASK_EMAIL),
    }
}

// ── Scan ────────────────────────────────────────────────────────────

pub(super) fn collect_address(guard: &mut SessionGuard, input: &str) -> OutgoingContent {
    match validate::address(input) {
        Ok(address) => {
            let reply = prompts::choose_tier(&address);
            let session = guard.session_mut();
            session.merge_fields([(field_keys::ADDRESS, address)]);
            session.set_state(ConversationState::AwaitingTierSelection);
            reply
        }
        Err(e) => prompts::invalid_input(e, prompts::ASK_ADDRESS),
    }
}

impl Dispatcher {
    /// Final registration step. On a backend failure the collected email and
    /// password are kept so only the username has to be re-entered, unless
    /// the failure was an authorization one.
    pub(super) async fn submit_registration(
        &self,
        mut guard: SessionGuard,
        input: &str,
    ) -> Option<OutgoingContent> {
        let username = match validate::username(input) {
            Ok(username) => username,
            Err(e) => return Some(prompts::invalid_input(e, prompts::ASK_USERNAME)),
        };
        let (Some(email), Some(password)) = (
            guard.field(field_keys::EMAIL),
            guard.field(field_keys::PASSWORD),
        ) else {
            guard.session_mut().begin_flow(ConversationState::AwaitingEmail);
            return Some(prompts::register_prompt());
        };
        let confirm = guard
            .field(field_keys::CONFIRM_PASSWORD)
            .unwrap_or_else(|| password.clone());

        let ticket = Self::release(guard);
        let auth = self.sessions.auth(&ticket.user).await;
        let result = self
            .backend
            .register(
                &auth,
                NewAccount {
                    email: &email,
                    password: &password,
                    confirm_password: &confirm,
                    username: &username,
                },
            )
            .await;

        let mut guard = self.reacquire(ticket).await?;
        match result {
            Ok(registration) => {
                guard.clear();
                Some(prompts::registration_success(
                    &username,
                    &email,
                    &registration.message,
                ))
            }
            Err(error) if error.is_auth() => {
                warn!(user = %guard.user(), %error, "Registration rejected");
                guard.clear();
                Some(prompts::gateway_error(&error))
            }
            Err(error) => {
                warn!(user = %guard.user(), %error, "Registration failed; awaiting new username");
                Some(prompts::registration_retry(&error))
            }
        }
    }

    /// Final login step. Credentials are judged by the backend only.
    pub(super) async fn submit_login(
        &self,
        mut guard: SessionGuard,
        input: &str,
    ) -> Option<OutgoingContent> {
        let password = match validate::non_empty(input) {
            Ok(password) => password,
            Err(e) => return Some(prompts::invalid_input(e, "Please enter your password.")),
        };
        let Some(email) = guard.field(field_keys::EMAIL) else {
            guard.session_mut().begin_flow(ConversationState::AwaitingEmailLogin);
            return Some(prompts::login_prompt());
        };

        let ticket = Self::release(guard);
        let auth = self.sessions.auth(&ticket.user).await;
        let result = self.backend.login(&auth, &email, &password).await;

        let mut guard = self.reacquire(ticket).await?;
        match result {
            Ok(outcome) => {
                info!(user = %guard.user(), tier = %outcome.user.tier, "User logged in");
                guard.clear();
                Some(prompts::login_success(&outcome.user))
            }
            Err(error) if error.is_auth() => {
                warn!(user = %guard.user(), %error, "Login rejected");
                guard.clear();
                Some(prompts::login_failed(&error))
            }
            Err(error) => {
                warn!(user = %guard.user(), %error, "Login failed; awaiting password again");
                Some(prompts::login_retry(&error))
            }
        }
    }

    /// Run the scan for the stored address. A processing notice goes out
    /// through `notifier` before the backend is called.
    pub(super) async fn submit_scan(
        &self,
        mut guard: SessionGuard,
        tier: Tier,
        notifier: &dyn Notifier,
    ) -> Option<OutgoingContent> {
        let Some(address) = guard.field(field_keys::ADDRESS) else {
            guard.session_mut().begin_flow(ConversationState::AwaitingAddress);
            return Some(prompts::scan_prompt());
        };

        let ticket = Self::release(guard);
        notifier.notify(prompts::scan_processing(&address, tier)).await;
        let auth = self.sessions.auth(&ticket.user).await;
        let result = self.backend.scan_address(&auth, &address, tier).await;

        let mut guard = self.reacquire(ticket).await?;
        guard.clear();
        match result {
            Ok(record) => Some(prompts::scan_result(&address, &record)),
            Err(error) => {
                warn!(user = %guard.user(), %tier, %error, "Scan failed");
                Some(prompts::gateway_error(&error))
            }
        }
    }
}
