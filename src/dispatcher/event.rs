//! Inbound events and outbound content.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::session::Tier;

/// `/name@botname args`
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^/([A-Za-z_]+)(?:@\w+)?(?:\s+(.*))?$").expect("command pattern is valid")
});

/// A slash command, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Register,
    Login,
    Logout,
    /// Optional address given inline.
    Scan(Option<String>),
    Dashboard,
    Balance,
    History,
    Pricing,
    Upgrade,
    BuyCredits,
    VerifyPayment {
        tx_signature: Option<String>,
        tier: Option<String>,
    },
    Admin,
    Stats,
    Users,
    Transactions,
    Unknown(String),
}

impl Command {
    /// Commands that neither touch the session nor call the backend.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            Self::Start | Self::Help | Self::Pricing | Self::Upgrade | Self::BuyCredits
        )
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::Stats | Self::Users | Self::Transactions)
    }

    fn from_parts(name: &str, args: &str) -> Self {
        let mut words = args.split_whitespace();
        match name.to_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "register" => Self::Register,
            "login" => Self::Login,
            "logout" => Self::Logout,
            "scan" => Self::Scan(words.next().map(String::from)),
            "dashboard" => Self::Dashboard,
            "balance" => Self::Balance,
            "history" => Self::History,
            "pricing" => Self::Pricing,
            "upgrade" => Self::Upgrade,
            "buy_credits" => Self::BuyCredits,
            "verify_payment" => Self::VerifyPayment {
                tx_signature: words.next().map(String::from),
                tier: words.next().map(String::from),
            },
            "admin" => Self::Admin,
            "stats" => Self::Stats,
            "users" => Self::Users,
            "transactions" => Self::Transactions,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Coarse event category used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Command,
    FreeText,
    TierSelection,
    Cancel,
}

/// One inbound user event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(Command),
    Text(String),
    TierSelected(Tier),
    Cancel,
}

impl Event {
    /// Classify a typed message. `/cancel` is the cancel event, not a command.
    ///
    /// Free text is kept as typed; each flow step decides whether surrounding
    /// whitespace matters.
    pub fn from_text(text: &str) -> Self {
        let Some(caps) = COMMAND_RE.captures(text.trim()) else {
            return Self::Text(text.to_string());
        };
        let name = caps.get(1).map_or("", |m| m.as_str());
        if name.eq_ignore_ascii_case("cancel") {
            return Self::Cancel;
        }
        let args = caps.get(2).map_or("", |m| m.as_str());
        Self::Command(Command::from_parts(name, args))
    }

    /// Map button callback data onto an event. Unknown data yields `None`.
    pub fn from_action(data: &str) -> Option<Self> {
        let data = data.trim();
        if let Some(tier) = data
            .strip_prefix("scan_tier:")
            .or_else(|| data.strip_prefix("tier:"))
        {
            return Tier::parse(tier).map(Self::TierSelected);
        }
        let command = match data {
            "cancel" => return Some(Self::Cancel),
            "scan" => Command::Scan(None),
            "dashboard" => Command::Dashboard,
            "balance" => Command::Balance,
            "history" => Command::History,
            "upgrade" => Command::Upgrade,
            "pricing" => Command::Pricing,
            "buy_credits" => Command::BuyCredits,
            "help" | "show_help" => Command::Help,
            "register" => Command::Register,
            "login" => Command::Login,
            _ => return None,
        };
        Some(Self::Command(command))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Command(_) => EventKind::Command,
            Self::Text(_) => EventKind::FreeText,
            Self::TierSelected(_) => EventKind::TierSelection,
            Self::Cancel => EventKind::Cancel,
        }
    }

    /// Whether the event may run while a backend call is outstanding.
    pub fn allowed_while_pending(&self) -> bool {
        match self {
            Self::Cancel => true,
            Self::Command(command) => command.is_informational(),
            _ => false,
        }
    }
}

/// A selectable action rendered by the transport as a button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub data: String,
}

impl Action {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Reply content: HTML-formatted text plus optional actions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingContent {
    pub text: String,
    pub actions: Vec<Action>,
}

impl OutgoingContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}

/// Side channel for interim output sent before the final reply.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, content: OutgoingContent);
}

/// Drops every notification.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _content: OutgoingContent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_free_text() {
        assert_eq!(Event::from_text("  hello  "), Event::Text("  hello  ".into()));
        assert_eq!(Event::from_text("  /help "), Event::Command(Command::Help));
        assert_eq!(Event::from_text("a/b"), Event::Text("a/b".into()));
    }

    #[test]
    fn cancel_command_is_cancel_event() {
        assert_eq!(Event::from_text("/cancel"), Event::Cancel);
        assert_eq!(Event::from_text("/CANCEL@spl_shield_bot"), Event::Cancel);
        assert_eq!(Event::from_text("/cancel").kind(), EventKind::Cancel);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(
            Event::from_text("/verify_payment 5xSig mvp"),
            Event::Command(Command::VerifyPayment {
                tx_signature: Some("5xSig".into()),
                tier: Some("mvp".into()),
            })
        );
        assert_eq!(
            Event::from_text("/scan@bot  ABC"),
            Event::Command(Command::Scan(Some("ABC".into())))
        );
        assert_eq!(
            Event::from_text("/frobnicate"),
            Event::Command(Command::Unknown("frobnicate".into()))
        );
    }

    #[test]
    fn actions_map_to_events() {
        assert_eq!(
            Event::from_action("scan_tier:premium"),
            Some(Event::TierSelected(Tier::Premium))
        );
        assert_eq!(Event::from_action("tier:MVP"), Some(Event::TierSelected(Tier::Mvp)));
        assert_eq!(Event::from_action("tier:gold"), None);
        assert_eq!(Event::from_action("show_help"), Some(Event::Command(Command::Help)));
        assert_eq!(Event::from_action("cancel"), Some(Event::Cancel));
        assert_eq!(Event::from_action("buy:10"), None);
    }

    #[test]
    fn pending_allows_cancel_and_informational_only() {
        assert!(Event::Cancel.allowed_while_pending());
        assert!(Event::Command(Command::Help).allowed_while_pending());
        assert!(!Event::Command(Command::Dashboard).allowed_while_pending());
        assert!(!Event::Text("x".into()).allowed_while_pending());
        assert!(!Event::TierSelected(Tier::Free).allowed_while_pending());
    }
}
