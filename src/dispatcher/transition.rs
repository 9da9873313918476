//! The conversation transition table.
//!
//! Routing is data: rows of `(state pattern, event kind, route)` scanned in
//! order, first match wins. The cancel row comes first so it overrides every
//! state-specific handler.

use crate::session::ConversationState;
use crate::session::ConversationState as S;

use super::event::EventKind;
use super::event::EventKind as K;

/// Which states a row applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMatch {
    Any,
    Is(ConversationState),
}

impl StateMatch {
    fn matches(&self, state: ConversationState) -> bool {
        match self {
            Self::Any => true,
            Self::Is(expected) => *expected == state,
        }
    }
}

/// Handler selected for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Cancel,
    Command,
    CollectEmail,
    CollectPassword,
    ConfirmPassword,
    SubmitRegistration,
    CollectLoginEmail,
    SubmitLogin,
    CollectAddress,
    SubmitScan,
    /// Text typed while tier buttons are expected.
    RepromptTier,
    /// Text outside any flow.
    IdleText,
    /// A tier button pressed outside the scan flow.
    StaleTier,
}

pub const TABLE: &[(StateMatch, EventKind, Route)] = &[
    (StateMatch::Any, K::Cancel, Route::Cancel),
    (StateMatch::Any, K::Command, Route::Command),
    (StateMatch::Is(S::AwaitingEmail), K::FreeText, Route::CollectEmail),
    (StateMatch::Is(S::AwaitingPassword), K::FreeText, Route::CollectPassword),
    (StateMatch::Is(S::AwaitingConfirmPassword), K::FreeText, Route::ConfirmPassword),
    (StateMatch::Is(S::AwaitingUsername), K::FreeText, Route::SubmitRegistration),
    (StateMatch::Is(S::AwaitingEmailLogin), K::FreeText, Route::CollectLoginEmail),
    (StateMatch::Is(S::AwaitingPasswordLogin), K::FreeText, Route::SubmitLogin),
    (StateMatch::Is(S::AwaitingAddress), K::FreeText, Route::CollectAddress),
    (StateMatch::Is(S::AwaitingTierSelection), K::TierSelection, Route::SubmitScan),
    (StateMatch::Is(S::AwaitingTierSelection), K::FreeText, Route::RepromptTier),
    (StateMatch::Is(S::Idle), K::FreeText, Route::IdleText),
    (StateMatch::Any, K::TierSelection, Route::StaleTier),
];

/// First matching route for `(state, kind)`.
pub fn route(state: ConversationState, kind: EventKind) -> Option<Route> {
    TABLE
        .iter()
        .find(|(pattern, k, _)| *k == kind && pattern.matches(state))
        .map(|(_, _, route)| *route)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [EventKind; 4] = [K::Command, K::FreeText, K::TierSelection, K::Cancel];

    #[test]
    fn every_state_and_kind_is_routed() {
        for state in ConversationState::ALL {
            for kind in KINDS {
                assert!(route(state, kind).is_some(), "{state} / {kind:?} unrouted");
            }
        }
    }

    #[test]
    fn cancel_wins_in_every_state() {
        for state in ConversationState::ALL {
            assert_eq!(route(state, K::Cancel), Some(Route::Cancel));
        }
    }

    #[test]
    fn flow_steps() {
        assert_eq!(route(S::AwaitingEmail, K::FreeText), Some(Route::CollectEmail));
        assert_eq!(route(S::AwaitingUsername, K::FreeText), Some(Route::SubmitRegistration));
        assert_eq!(route(S::AwaitingPasswordLogin, K::FreeText), Some(Route::SubmitLogin));
        assert_eq!(route(S::AwaitingTierSelection, K::TierSelection), Some(Route::SubmitScan));
        assert_eq!(route(S::AwaitingTierSelection, K::FreeText), Some(Route::RepromptTier));
    }

    #[test]
    fn tier_outside_scan_flow_is_stale() {
        assert_eq!(route(S::Idle, K::TierSelection), Some(Route::StaleTier));
        assert_eq!(route(S::AwaitingEmail, K::TierSelection), Some(Route::StaleTier));
    }
}
