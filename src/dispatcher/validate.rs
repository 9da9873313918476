//! Per-step input rules. Violations are answered with a re-prompt and never
//! reach the backend.

use std::ops::RangeInclusive;

use crate::error::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_USERNAME_LEN: usize = 3;
/// Length of a base58 Solana address. A shape check only.
pub const ADDRESS_LEN: RangeInclusive<usize> = 32..=44;

pub fn email(input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    if input.contains('@') && input.contains('.') {
        Ok(input.to_string())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

/// Passwords are taken verbatim, surrounding spaces included. Only a line
/// ending left by the transport is dropped.
pub fn password(input: &str) -> Result<String, ValidationError> {
    let input = verbatim(input);
    if input.chars().count() >= MIN_PASSWORD_LEN {
        Ok(input.to_string())
    } else {
        Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        })
    }
}

pub fn confirm_password(input: &str, stored: &str) -> Result<(), ValidationError> {
    if verbatim(input) == stored {
        Ok(())
    } else {
        Err(ValidationError::PasswordMismatch)
    }
}

pub fn username(input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    if input.chars().count() >= MIN_USERNAME_LEN {
        Ok(input.to_string())
    } else {
        Err(ValidationError::UsernameTooShort {
            min: MIN_USERNAME_LEN,
        })
    }
}

pub fn address(input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    if ADDRESS_LEN.contains(&input.chars().count()) {
        Ok(input.to_string())
    } else {
        Err(ValidationError::InvalidAddress {
            min: *ADDRESS_LEN.start(),
            max: *ADDRESS_LEN.end(),
        })
    }
}

/// Login input is checked only for presence; the backend judges the rest.
/// The value is returned as typed.
pub fn non_empty(input: &str) -> Result<String, ValidationError> {
    if input.trim().is_empty() {
        Err(ValidationError::Empty)
    } else {
        Ok(verbatim(input).to_string())
    }
}

fn verbatim(input: &str) -> &str {
    input.trim_end_matches(['\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_needs_at_and_dot() {
        assert_eq!(email(" a@b.co ").as_deref(), Ok("a@b.co"));
        assert_eq!(email("ab.co"), Err(ValidationError::InvalidEmail));
        assert_eq!(email("a@bco"), Err(ValidationError::InvalidEmail));
    }

    #[test]
    fn password_length_boundary() {
        for short in ["", "a", "12345"] {
            assert_eq!(
                password(short),
                Err(ValidationError::PasswordTooShort { min: 6 })
            );
        }
        assert!(password("123456").is_ok());
        assert!(password("пароль").is_ok());
    }

    #[test]
    fn password_keeps_surrounding_spaces() {
        assert_eq!(password("  abc  ").as_deref(), Ok("  abc  "));
        assert_eq!(password(" pass1 \r\n").as_deref(), Ok(" pass1 "));
        assert!(confirm_password(" pass1 \n", " pass1 ").is_ok());
        assert_eq!(non_empty(" hunter2 ").as_deref(), Ok(" hunter2 "));
    }

    #[test]
    fn confirm_is_exact() {
        assert!(confirm_password("secret1", "secret1").is_ok());
        assert_eq!(
            confirm_password("secret1 ", "secret1"),
            Err(ValidationError::PasswordMismatch)
        );
    }

    #[test]
    fn username_min_length() {
        assert!(username("neo").is_ok());
        assert!(username("  ab  ").is_err());
    }

    #[test]
    fn address_length_window() {
        let usdc = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        assert_eq!(usdc.len(), 44);
        assert_eq!(address(usdc).as_deref(), Ok(usdc));
        assert_eq!(address(&format!("  {usdc}\n")).as_deref(), Ok(usdc));
        assert!(address(&"1".repeat(32)).is_ok());
        assert!(address(&"1".repeat(31)).is_err());
        assert!(address(&"1".repeat(45)).is_err());
        assert_eq!(
            address("0123456789"),
            Err(ValidationError::InvalidAddress { min: 32, max: 44 })
        );
    }

    #[test]
    fn non_empty_rejects_blank() {
        assert_eq!(non_empty("   "), Err(ValidationError::Empty));
        assert!(non_empty("x").is_ok());
    }
}
