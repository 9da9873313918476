//! Canonical result shapes returned by the gateway.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;
use crate::session::Tier;

use super::fields::{self, Object};

/// The one shape every backend call is reduced to.
///
/// Call sites reason only about this, never about the raw backend body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub ok: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    /// HTTP status, or 0 for network/timeout failures.
    pub status_code: u16,
}

impl NormalizedResult {
    pub fn success(status_code: u16, data: Option<Value>) -> Self {
        Self {
            ok: true,
            data,
            error: None,
            status_code,
        }
    }

    pub fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
            status_code,
        }
    }

    /// Body as an object; non-object bodies read as empty.
    pub fn object(&self) -> Object {
        self.data
            .as_ref()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    pub fn into_result(self) -> Result<Value, GatewayError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(GatewayError::from_result(&self))
        }
    }
}

/// Successful account registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub message: String,
    pub user_id: Option<String>,
}

impl Registration {
    pub(crate) fn from_body(body: &Object) -> Self {
        let user_id = fields::first_str(body, &["user_id", "id"]).or_else(|| {
            body.get("user")
                .and_then(Value::as_object)
                .and_then(|u| fields::first_str(u, &["id", "user_id"]))
        });
        Self {
            message: fields::first_str(body, &["message", "detail"])
                .unwrap_or_else(|| "Registration successful".to_string()),
            user_id,
        }
    }
}

/// Per-tier scan credits plus the TDL token balance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreditBalances {
    pub free: u64,
    pub premium: u64,
    pub mvp: u64,
    pub tdl_balance: Decimal,
}

impl CreditBalances {
    /// Read balances from a credits payload, flat or nested under `credits`.
    pub fn from_object(map: &Object) -> Self {
        let nested = map.get("credits").and_then(Value::as_object);
        let read = |flat: &[&str], short: &str| {
            fields::first_u64(map, flat)
                .or_else(|| nested.and_then(|n| fields::first_u64(n, &[short, flat[0]])))
                .unwrap_or(0)
        };
        Self {
            free: read(&["free_credits", "credits_free"], "free"),
            premium: read(&["premium_credits", "credits_premium"], "premium"),
            mvp: read(&["mvp_credits", "credits_mvp"], "mvp"),
            tdl_balance: fields::first_decimal(map, &["tdl_balance", "balance"])
                .unwrap_or_default(),
        }
    }

    /// Tier implied by held credits: any MVP credit wins, then premium.
    pub fn derived_tier(&self) -> Tier {
        if self.mvp > 0 {
            Tier::Mvp
        } else if self.premium > 0 {
            Tier::Premium
        } else {
            Tier::Free
        }
    }
}

/// Account profile as shown on the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub username: String,
    pub email: Option<String>,
    pub tier: Tier,
    pub created_at: Option<String>,
    pub scans_today: u64,
    pub daily_limit: u64,
    pub total_scans: u64,
    pub credits: CreditBalances,
}

impl UserProfile {
    /// Build a profile from merged profile/credit fields.
    ///
    /// When the backend omits an explicit tier, it is derived from credits.
    pub fn from_parts(profile: &Object, credits: CreditBalances) -> Self {
        let tier = fields::first_str(profile, &["tier", "subscription_tier"])
            .and_then(|t| Tier::parse(&t))
            .unwrap_or_else(|| credits.derived_tier());
        Self {
            username: fields::first_str(profile, &["username", "name"])
                .unwrap_or_else(|| "User".to_string()),
            email: fields::first_str(profile, &["email"]),
            tier,
            created_at: fields::first_str(profile, &["created_at", "member_since"]),
            scans_today: fields::first_u64(profile, &["scans_today", "scans_remaining"])
                .unwrap_or(0),
            daily_limit: fields::first_u64(profile, &["daily_limit", "daily_scan_limit"])
                .unwrap_or(5),
            total_scans: fields::first_u64(profile, &["total_scans"]).unwrap_or(0),
            credits,
        }
    }
}

/// Profile and credits fetched together. A failed half is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountOverview {
    pub profile: Object,
    pub credits: Object,
}

impl AccountOverview {
    /// Profile fields with credit fields layered on top.
    pub fn merged(&self) -> Object {
        let mut merged = self.profile.clone();
        merged.extend(self.credits.clone());
        merged
    }

    pub fn credit_balances(&self) -> CreditBalances {
        CreditBalances::from_object(&self.credits)
    }

    pub fn user_profile(&self) -> UserProfile {
        UserProfile::from_parts(&self.merged(), self.credit_balances())
    }
}

/// Successful login: the user object merged with the account overview.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub token_received: bool,
}

/// One row of scan history.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanHistoryEntry {
    pub address: String,
    pub tier: String,
    pub risk_score: Option<f64>,
    pub risk_level: String,
    pub created_at: Option<String>,
}

impl ScanHistoryEntry {
    pub fn from_object(map: &Object) -> Self {
        Self {
            address: fields::first_str(map, &["address", "token_address", "wallet_address"])
                .unwrap_or_else(|| "N/A".to_string()),
            tier: fields::first_str(map, &["tier", "tier_used"])
                .unwrap_or_else(|| Tier::Free.to_string()),
            risk_score: fields::first_f64(map, &["risk_score"]),
            risk_level: fields::first_str(map, &["risk_level"])
                .map(|l| l.to_uppercase())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            created_at: fields::first_str(map, &["created_at", "timestamp"]),
        }
    }
}
