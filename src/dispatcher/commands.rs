//! Slash command handlers.

use tracing::info;

use crate::error::GatewayError;
use crate::gateway::fields::Object;
use crate::prompts;
use crate::session::{ConversationState, SessionGuard, Tier};

use super::event::{Command, OutgoingContent};
use super::{Dispatcher, handlers};

/// Recent scans shown by `/history`.
pub const HISTORY_LIMIT: usize = 10;

impl Dispatcher {
    pub(super) async fn run_command(
        &self,
        mut guard: SessionGuard,
        command: Command,
    ) -> Option<OutgoingContent> {
        if command.is_admin() && !self.is_admin(guard.user()) {
            info!(user = %guard.user(), ?command, "Admin command refused");
            return Some(prompts::admins_only());
        }

        match command {
            Command::Start => Some(prompts::welcome()),
            Command::Help => Some(prompts::help()),
            Command::Pricing => Some(prompts::pricing()),
            Command::Upgrade => Some(prompts::upgrade()),
            Command::BuyCredits => Some(prompts::buy_credits()),
            Command::Unknown(name) => Some(prompts::unknown_command(&name)),

            Command::Register => {
                guard.session_mut().begin_flow(ConversationState::AwaitingEmail);
                Some(prompts::register_prompt())
            }
            Command::Login => {
                guard.session_mut().begin_flow(ConversationState::AwaitingEmailLogin);
                Some(prompts::login_prompt())
            }
            Command::Scan(address) => {
                guard.session_mut().begin_flow(ConversationState::AwaitingAddress);
                Some(match address {
                    Some(address) => handlers::collect_address(&mut guard, &address),
                    None => prompts::scan_prompt(),
                })
            }
            Command::Logout => {
                let auth = self.sessions.auth(guard.user()).await;
                self.backend.logout(&auth).await;
                info!(user = %guard.user(), "User logged out");
                guard.clear();
                Some(prompts::logged_out())
            }

            Command::Dashboard => {
                let (ticket, auth) = match self.release_authenticated(guard).await {
                    Ok(released) => released,
                    Err(reply) => return Some(reply),
                };
                let result = self.backend.get_user_profile(&auth).await;
                self.settle(ticket, result, prompts::dashboard).await
            }
            Command::Balance => {
                let (ticket, auth) = match self.release_authenticated(guard).await {
                    Ok(released) => released,
                    Err(reply) => return Some(reply),
                };
                let result = self.backend.get_credits(&auth).await;
                self.settle(ticket, result, prompts::balance).await
            }
            Command::History => {
                let (ticket, auth) = match self.release_authenticated(guard).await {
                    Ok(released) => released,
                    Err(reply) => return Some(reply),
                };
                let result = self.backend.scan_history(&auth, HISTORY_LIMIT).await;
                self.settle(ticket, result, |entries: &Vec<_>| prompts::history(entries))
                    .await
            }
            Command::VerifyPayment { tx_signature, tier } => {
                let Some(tx_signature) = tx_signature else {
                    return Some(prompts::payment_usage());
                };
                let tier = match tier.as_deref().map(Tier::parse) {
                    None => Tier::Premium,
                    Some(Some(tier @ (Tier::Premium | Tier::Mvp))) => tier,
                    Some(_) => return Some(prompts::payment_usage()),
                };
                let (ticket, auth) = match self.release_authenticated(guard).await {
                    Ok(released) => released,
                    Err(reply) => return Some(reply),
                };
                let result = self.backend.verify_payment(&auth, &tx_signature, tier).await;
                self.settle(ticket, result, |message: &String| prompts::payment_success(message))
                    .await
            }

            Command::Admin => self.admin_stats(guard, prompts::admin_overview).await,
            Command::Stats => self.admin_stats(guard, prompts::detailed_stats).await,
            Command::Users => {
                let (ticket, auth) = match self.release_authenticated(guard).await {
                    Ok(released) => released,
                    Err(reply) => return Some(reply),
                };
                let users = self.backend.get_users(&auth).await;
                self.settle(ticket, Ok::<_, GatewayError>(users), |u: &Vec<Object>| {
                    prompts::users(u)
                })
                .await
            }
            Command::Transactions => {
                let (ticket, auth) = match self.release_authenticated(guard).await {
                    Ok(released) => released,
                    Err(reply) => return Some(reply),
                };
                let transactions = self.backend.get_transactions(&auth).await;
                self.settle(ticket, Ok::<_, GatewayError>(transactions), |t: &Vec<Object>| {
                    prompts::transactions(t)
                })
                .await
            }
        }
    }

    async fn admin_stats(
        &self,
        guard: SessionGuard,
        render: fn(&Object) -> OutgoingContent,
    ) -> Option<OutgoingContent> {
        let (ticket, auth) = match self.release_authenticated(guard).await {
            Ok(released) => released,
            Err(reply) => return Some(reply),
        };
        let stats = self.backend.get_stats(&auth).await;
        self.settle(ticket, Ok::<_, GatewayError>(stats), render).await
    }
}
