//! HTTP client for the SPL Shield backend.
//!
//! One shared instance serves every user. The underlying connection pool is
//! created on first use and released by [`ApiGateway::close`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::session::Tier;

use super::auth::AuthContext;
use super::backend::{Backend, NewAccount};
use super::fields::{self, LIST_KEYS, OBJECT_KEYS, Object};
use super::normalize::{ScanRecord, normalize_scan};
use super::types::{
    AccountOverview, CreditBalances, LoginOutcome, NormalizedResult, Registration,
    ScanHistoryEntry, UserProfile,
};

/// Request body encodings the backend expects, per endpoint.
#[derive(Debug)]
pub enum Body {
    Empty,
    Form(Vec<(&'static str, String)>),
    Json(Value),
}

/// Backend gateway over HTTP.
pub struct ApiGateway {
    base_url: String,
    timeout: Duration,
    http: RwLock<Option<reqwest::Client>>,
}

impl ApiGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            http: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn http(&self) -> Result<reqwest::Client, reqwest::Error> {
        if let Some(client) = self.http.read().await.as_ref() {
            return Ok(client.clone());
        }
        let mut slot = self.http.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        debug!(base_url = %self.base_url, "Created backend HTTP client");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Release the connection pool. A later call creates a new one.
    pub async fn close(&self) {
        if self.http.write().await.take().is_some() {
            info!("Backend HTTP client closed");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.http.read().await.is_some()
    }

    /// Issue one call and reduce the outcome to a [`NormalizedResult`].
    ///
    /// Never fails: transport errors come back with status code 0. A 401
    /// clears `auth` before returning.
    pub async fn request(
        &self,
        auth: &AuthContext,
        method: Method,
        path: &str,
        body: Body,
    ) -> NormalizedResult {
        let http = match self.http().await {
            Ok(http) => http,
            Err(e) => return NormalizedResult::failure(0, describe(&e, self.timeout)),
        };

        let url = format!("{}{}", self.base_url, path);
        let mut request = http.request(method.clone(), &url);
        if let Some(bearer) = auth.authorization().await {
            request = request.header(AUTHORIZATION, bearer);
        }
        request = match body {
            Body::Empty => request,
            Body::Form(form) => request.form(&form),
            Body::Json(value) => request.json(&value),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%method, path, error = %e, "Backend request failed");
                return NormalizedResult::failure(0, describe(&e, self.timeout));
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(%method, path, error = %e, "Failed to read backend response");
                return NormalizedResult::failure(0, describe(&e, self.timeout));
            }
        };

        if status == 401 && auth.is_authenticated().await {
            auth.clear().await;
            info!(path, "Backend rejected credential; cleared");
        }

        let result = classify(status, &text);
        if result.ok {
            debug!(%method, path, status, "Backend call succeeded");
        } else {
            debug!(%method, path, status, error = ?result.error, "Backend call failed");
        }
        result
    }

    async fn get(&self, auth: &AuthContext, path: &str) -> NormalizedResult {
        self.request(auth, Method::GET, path, Body::Empty).await
    }

    async fn object_or_empty(&self, auth: &AuthContext, path: &str, keys: &[&str]) -> Object {
        let result = self.get(auth, path).await;
        match result.data.as_ref() {
            Some(data) if result.ok => fields::unwrap_object(data, keys),
            _ => {
                debug!(path, status = result.status_code, "Degrading to empty object");
                Object::new()
            }
        }
    }

    async fn list_or_empty(&self, auth: &AuthContext, path: &str) -> Vec<Object> {
        let result = self.get(auth, path).await;
        match result.data.as_ref() {
            Some(data) if result.ok => fields::unwrap_object_list(data, LIST_KEYS),
            _ => {
                debug!(path, status = result.status_code, "Degrading to empty list");
                Vec::new()
            }
        }
    }
}

/// Turn an HTTP status and raw body into a [`NormalizedResult`].
pub fn classify(status: u16, text: &str) -> NormalizedResult {
    if (200..300).contains(&status) {
        let trimmed = text.trim();
        let data = if trimmed.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(trimmed)
                    .unwrap_or_else(|_| Value::String(trimmed.to_string())),
            )
        };
        return NormalizedResult::success(status, data);
    }

    let message = extract_error(text).unwrap_or_else(|| match status {
        401 => "Unauthorized".to_string(),
        402 => "Insufficient balance".to_string(),
        429 => "Rate limit exceeded".to_string(),
        _ => format!("HTTP {status}"),
    });
    NormalizedResult::failure(status, message)
}

/// Error text from `detail`, `error` or `message`, else the raw body.
pub fn extract_error(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for key in ["detail", "error", "message"] {
            let found = match map.get(key) {
                Some(Value::Array(items)) => {
                    // Validation errors arrive as a list of `{msg, ...}`.
                    let msgs: Vec<String> = items
                        .iter()
                        .filter_map(|item| match item {
                            Value::Object(obj) => fields::first_str(obj, &["msg", "message"]),
                            other => fields::value_to_string(other),
                        })
                        .collect();
                    (!msgs.is_empty()).then(|| msgs.join("; "))
                }
                Some(Value::Object(obj)) => fields::first_str(obj, &["message", "detail"]),
                Some(other) => fields::value_to_string(other),
                None => None,
            };
            if found.is_some() {
                return found;
            }
        }
    }
    Some(trimmed.to_string())
}

fn describe(error: &reqwest::Error, timeout: Duration) -> String {
    if error.is_timeout() {
        format!("Request timed out after {}s", timeout.as_secs())
    } else if error.is_connect() {
        format!("Could not connect to the backend: {error}")
    } else {
        error.to_string()
    }
}

/// The object under `data`, if any, else the body itself.
fn body_object(value: &Value) -> Object {
    fields::unwrap_object(value, &["data"])
}

#[async_trait]
impl Backend for ApiGateway {
    async fn register(
        &self,
        auth: &AuthContext,
        account: NewAccount<'_>,
    ) -> Result<Registration, GatewayError> {
        let form = vec![
            ("email", account.email.to_string()),
            ("password", account.password.to_string()),
            ("confirm_password", account.confirm_password.to_string()),
            ("username", account.username.to_string()),
        ];
        let value = self
            .request(auth, Method::POST, "/api/auth/register", Body::Form(form))
            .await
            .into_result()?;

        let mut body = value.as_object().cloned().unwrap_or_default();
        body.extend(body_object(&value));
        let registration = Registration::from_body(&body);
        info!(username = account.username, user_id = ?registration.user_id, "Account registered");
        Ok(registration)
    }

    async fn login(
        &self,
        auth: &AuthContext,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, GatewayError> {
        let form = vec![
            ("username", email.to_string()),
            ("email", email.to_string()),
            ("password", password.to_string()),
        ];
        let value = self
            .request(auth, Method::POST, "/api/auth/login", Body::Form(form))
            .await
            .into_result()?;

        let root = value.as_object().cloned().unwrap_or_default();
        let data = body_object(&value);
        let token = fields::first_str(&root, &["access_token", "token"])
            .or_else(|| fields::first_str(&data, &["access_token", "token"]));
        let token_received = token.is_some();
        match token {
            Some(token) => auth.set(token.into()).await,
            None => warn!("Login succeeded without a bearer token"),
        }

        let mut user = root
            .get("user")
            .or_else(|| data.get("user"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let overview = self.fetch_account_overview(auth).await;
        user.extend(overview.merged());

        let credits = CreditBalances::from_object(&user);
        let profile = UserProfile::from_parts(&user, credits);
        info!(username = %profile.username, tier = %profile.tier, "Logged in");
        Ok(LoginOutcome {
            user: profile,
            token_received,
        })
    }

    async fn fetch_account_overview(&self, auth: &AuthContext) -> AccountOverview {
        let (profile, credits) = tokio::join!(
            self.object_or_empty(auth, "/api/users/me", &["data", "user"]),
            self.object_or_empty(auth, "/api/payment/credits", &["data"]),
        );
        AccountOverview { profile, credits }
    }

    async fn logout(&self, auth: &AuthContext) {
        auth.clear().await;
        debug!("Credential cleared on logout");
    }

    async fn get_user_profile(&self, auth: &AuthContext) -> Result<UserProfile, GatewayError> {
        let value = self.get(auth, "/api/users/me").await.into_result()?;
        let mut merged = fields::unwrap_object(&value, &["data", "user"]);
        merged.extend(
            self.object_or_empty(auth, "/api/payment/credits", &["data"])
                .await,
        );
        let credits = CreditBalances::from_object(&merged);
        Ok(UserProfile::from_parts(&merged, credits))
    }

    async fn get_credits(&self, auth: &AuthContext) -> Result<CreditBalances, GatewayError> {
        let value = self.get(auth, "/api/payment/credits").await.into_result()?;
        Ok(CreditBalances::from_object(&body_object(&value)))
    }

    async fn scan_address(
        &self,
        auth: &AuthContext,
        address: &str,
        tier: Tier,
    ) -> Result<ScanRecord, GatewayError> {
        let body = Body::Json(json!({ "address": address, "tier": tier }));
        let result = self.request(auth, Method::POST, "/api/scan", body).await;

        if !result.ok {
            return Err(match result.status_code {
                402 => GatewayError::InsufficientBalance(format!(
                    "insufficient credits for a {tier} scan"
                )),
                429 => GatewayError::RateLimited("daily limit reached".to_string()),
                _ => GatewayError::from_result(&result),
            });
        }

        let Some(payload) = result.data else {
            warn!(%tier, "Scan succeeded with an empty body");
            return Err(GatewayError::UnexpectedFormat);
        };
        let record = normalize_scan(&payload, tier)?;
        info!(%tier, risk_score = record.risk_score, level = %record.risk_level, "Scan complete");
        Ok(record)
    }

    async fn scan_history(
        &self,
        auth: &AuthContext,
        limit: usize,
    ) -> Result<Vec<ScanHistoryEntry>, GatewayError> {
        let path = format!("/api/scan/history?limit={limit}");
        let value = self.get(auth, &path).await.into_result()?;
        Ok(fields::unwrap_object_list(&value, LIST_KEYS)
            .iter()
            .take(limit)
            .map(ScanHistoryEntry::from_object)
            .collect())
    }

    async fn verify_payment(
        &self,
        auth: &AuthContext,
        tx_signature: &str,
        tier: Tier,
    ) -> Result<String, GatewayError> {
        let form = vec![
            ("tier", tier.to_string()),
            ("transaction_signature", tx_signature.to_string()),
        ];
        let value = self
            .request(auth, Method::POST, "/api/payment/purchase", Body::Form(form))
            .await
            .into_result()?;

        let body = body_object(&value);
        let root = value.as_object().cloned().unwrap_or_default();
        info!(%tier, "Payment verified");
        Ok(fields::first_str(&root, &["message"])
            .or_else(|| fields::first_str(&body, &["message"]))
            .unwrap_or_else(|| format!("Payment verified. {tier} credits added.")))
    }

    async fn get_stats(&self, auth: &AuthContext) -> Object {
        self.object_or_empty(auth, "/api/admin/dashboard/dashboard-overview", OBJECT_KEYS)
            .await
    }

    async fn get_users(&self, auth: &AuthContext) -> Vec<Object> {
        self.list_or_empty(auth, "/api/admin/dashboard/users").await
    }

    async fn get_transactions(&self, auth: &AuthContext) -> Vec<Object> {
        self.list_or_empty(auth, "/api/admin/dashboard/transactions")
            .await
    }
}
