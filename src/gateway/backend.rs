//! The operations the conversation layer needs from the backend.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::session::Tier;

use super::auth::AuthContext;
use super::fields::Object;
use super::normalize::ScanRecord;
use super::types::{
    AccountOverview, CreditBalances, LoginOutcome, Registration, ScanHistoryEntry, UserProfile,
};

/// Input for account creation.
#[derive(Clone, Copy)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
    pub username: &'a str,
}

impl std::fmt::Debug for NewAccount<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Backend contract.
///
/// Every call takes the acting user's credential explicitly; implementations
/// hold no per-user state of their own.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn register(
        &self,
        auth: &AuthContext,
        account: NewAccount<'_>,
    ) -> Result<Registration, GatewayError>;

    /// Authenticate, capture the bearer token into `auth`, then load the
    /// account overview so credit fields are available immediately.
    async fn login(
        &self,
        auth: &AuthContext,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, GatewayError>;

    /// Profile and credits; each half degrades to empty on failure.
    async fn fetch_account_overview(&self, auth: &AuthContext) -> AccountOverview;

    /// Local only. Always succeeds.
    async fn logout(&self, auth: &AuthContext);

    async fn get_user_profile(&self, auth: &AuthContext) -> Result<UserProfile, GatewayError>;

    async fn get_credits(&self, auth: &AuthContext) -> Result<CreditBalances, GatewayError>;

    async fn scan_address(
        &self,
        auth: &AuthContext,
        address: &str,
        tier: Tier,
    ) -> Result<ScanRecord, GatewayError>;

    async fn scan_history(
        &self,
        auth: &AuthContext,
        limit: usize,
    ) -> Result<Vec<ScanHistoryEntry>, GatewayError>;

    /// Returns the backend's confirmation message.
    async fn verify_payment(
        &self,
        auth: &AuthContext,
        tx_signature: &str,
        tier: Tier,
    ) -> Result<String, GatewayError>;

    // Admin reads never fail; partial or missing data reads as empty.

    async fn get_stats(&self, auth: &AuthContext) -> Object;

    async fn get_users(&self, auth: &AuthContext) -> Vec<Object>;

    async fn get_transactions(&self, auth: &AuthContext) -> Vec<Object>;
}
