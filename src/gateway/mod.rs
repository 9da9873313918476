//! Backend gateway.
//!
//! Owns all outbound backend communication: bearer credentials, status
//! classification, and reshaping of inconsistent response bodies into the
//! typed results the conversation layer consumes.

pub mod auth;
pub mod backend;
pub mod client;
pub mod fields;
pub mod normalize;
pub mod types;

pub use auth::AuthContext;
pub use backend::{Backend, NewAccount};
pub use client::{ApiGateway, Body};
pub use normalize::{RiskBand, ScanRecord, normalize_scan};
pub use types::{
    AccountOverview, CreditBalances, LoginOutcome, NormalizedResult, Registration,
    ScanHistoryEntry, UserProfile,
};
