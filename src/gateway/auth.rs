//! Per-user bearer credential.

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

/// Holds the bearer token obtained from a successful login.
///
/// Absent until login succeeds; cleared on logout or on a 401 response.
/// One instance per user, passed explicitly into every gateway call.
#[derive(Default)]
pub struct AuthContext {
    token: RwLock<Option<SecretString>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that already carries a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(SecretString::from(token.into()))),
        }
    }

    pub async fn set(&self, token: SecretString) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// `Authorization` header value, if a token is held.
    pub async fn authorization(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| format!("Bearer {}", t.expose_secret()))
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext").finish_non_exhaustive()
    }
}
