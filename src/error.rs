//! Error types for SPL Shield Bot.

use crate::gateway::NormalizedResult;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Backend-facing failures, one variant per actionable category.
///
/// Every variant carries the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// 401. The caller's credential has already been invalidated.
    #[error("{0}")]
    Unauthorized(String),

    /// 402.
    #[error("{0}")]
    InsufficientBalance(String),

    /// 429.
    #[error("{0}")]
    RateLimited(String),

    /// Timeout or connection failure (status code 0).
    #[error("{0}")]
    Network(String),

    /// The backend answered 2xx but no recognizable payload was found.
    #[error("Unexpected response format")]
    UnexpectedFormat,

    /// Any other non-2xx status.
    #[error("{message}")]
    Http { status: u16, message: String },
}

impl GatewayError {
    /// Map a failed [`NormalizedResult`] onto the taxonomy by status code.
    pub fn from_result(result: &NormalizedResult) -> Self {
        let message = result
            .error
            .clone()
            .unwrap_or_else(|| format!("HTTP {}", result.status_code));
        match result.status_code {
            0 => Self::Network(message),
            401 => Self::Unauthorized(message),
            402 => Self::InsufficientBalance(message),
            429 => Self::RateLimited(message),
            status => Self::Http { status, message },
        }
    }

    /// Whether the failure means the user must log in again.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Local input rule violations. Never reach the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Passwords don't match")]
    PasswordMismatch,

    #[error("Username must be at least {min} characters")]
    UsernameTooShort { min: usize },

    #[error("Address must be {min}-{max} characters")]
    InvalidAddress { min: usize, max: usize },

    #[error("Input must not be empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(status_code: u16, error: Option<&str>) -> NormalizedResult {
        NormalizedResult {
            ok: false,
            data: None,
            error: error.map(String::from),
            status_code,
        }
    }

    #[test]
    fn classifies_by_status_code() {
        assert!(matches!(
            GatewayError::from_result(&failed(0, Some("connection refused"))),
            GatewayError::Network(m) if m == "connection refused"
        ));
        assert!(GatewayError::from_result(&failed(401, Some("nope"))).is_auth());
        assert!(matches!(
            GatewayError::from_result(&failed(402, Some("x"))),
            GatewayError::InsufficientBalance(_)
        ));
        assert!(matches!(
            GatewayError::from_result(&failed(429, Some("x"))),
            GatewayError::RateLimited(_)
        ));
        assert_eq!(
            GatewayError::from_result(&failed(503, None)),
            GatewayError::Http {
                status: 503,
                message: "HTTP 503".into()
            }
        );
    }

    #[test]
    fn validation_messages() {
        assert_eq!(
            ValidationError::PasswordTooShort { min: 6 }.to_string(),
            "Password must be at least 6 characters"
        );
        assert_eq!(
            ValidationError::InvalidAddress { min: 32, max: 44 }.to_string(),
            "Address must be 32-44 characters"
        );
    }
}
