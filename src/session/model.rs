//! Session record and the conversation state machine's states.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a remote user (numeric chat id or a string handle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service level governing scan depth and cost.
///
/// Ordered by capability: `Free < Premium < Mvp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Mvp,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Mvp => "mvp",
        }
    }

    /// Case-insensitive parse of a tier name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "premium" => Some(Self::Premium),
            "mvp" => Some(Self::Mvp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a user inside a conversation.
///
/// Registration: Idle → AwaitingEmail → AwaitingPassword →
/// AwaitingConfirmPassword → AwaitingUsername → Idle.
/// Login: Idle → AwaitingEmailLogin → AwaitingPasswordLogin → Idle.
/// Scan: Idle → AwaitingAddress → AwaitingTierSelection → Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingEmail,
    AwaitingPassword,
    AwaitingConfirmPassword,
    AwaitingUsername,
    AwaitingEmailLogin,
    AwaitingPasswordLogin,
    AwaitingAddress,
    AwaitingTierSelection,
}

impl ConversationState {
    pub const ALL: [ConversationState; 9] = [
        Self::Idle,
        Self::AwaitingEmail,
        Self::AwaitingPassword,
        Self::AwaitingConfirmPassword,
        Self::AwaitingUsername,
        Self::AwaitingEmailLogin,
        Self::AwaitingPasswordLogin,
        Self::AwaitingAddress,
        Self::AwaitingTierSelection,
    ];
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingEmail => "awaiting_email",
            Self::AwaitingPassword => "awaiting_password",
            Self::AwaitingConfirmPassword => "awaiting_confirm_password",
            Self::AwaitingUsername => "awaiting_username",
            Self::AwaitingEmailLogin => "awaiting_email_login",
            Self::AwaitingPasswordLogin => "awaiting_password_login",
            Self::AwaitingAddress => "awaiting_address",
            Self::AwaitingTierSelection => "awaiting_tier_selection",
        };
        write!(f, "{s}")
    }
}

/// Keys used in [`Session::fields`].
pub mod field_keys {
    pub const EMAIL: &str = "email";
    pub const PASSWORD: &str = "password";
    pub const CONFIRM_PASSWORD: &str = "confirm_password";
    pub const ADDRESS: &str = "address";
}

/// Per-user ephemeral record of conversation position and collected input.
#[derive(Clone)]
pub struct Session {
    pub state: ConversationState,
    /// Partially collected input, cleared when a new flow starts.
    pub fields: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Set while a submission for this session is awaiting the backend.
    pub pending: Option<Uuid>,
}

impl Default for Session {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            state: ConversationState::Idle,
            fields: HashMap::new(),
            created_at: now,
            last_activity_at: now,
            pending: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a flow's first state with an empty field set.
    pub fn begin_flow(&mut self, state: ConversationState) {
        self.state = state;
        self.fields.clear();
        self.pending = None;
        self.touch();
    }

    pub fn set_state(&mut self, state: ConversationState) {
        self.state = state;
        self.touch();
    }

    pub fn merge_fields<I, K, V>(&mut self, partial: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.fields
            .extend(partial.into_iter().map(|(k, v)| (k.into(), v.into())));
        self.touch();
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Whether the session has seen no activity for longer than `idle`.
    pub fn is_idle_for(&self, idle: Duration) -> bool {
        match chrono::Duration::from_std(idle) {
            Ok(idle) => Utc::now() - self.last_activity_at > idle,
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Field values hold passwords.
        let mut keys: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("fields", &keys)
            .field("created_at", &self.created_at)
            .field("last_activity_at", &self.last_activity_at)
            .field("pending", &self.pending)
            .finish()
    }
}
