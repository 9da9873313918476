//! Scan result normalization.
//!
//! The scan endpoint has returned the analysis at several depths over time:
//! at the root, under `analysis`, under `data.analysis`, or under a `token`
//! or `wallet` object. Extraction runs an ordered list of attempts; the first
//! one that recognizes the payload wins. If none does, the payload is
//! rejected instead of being rendered with made-up values.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::GatewayError;
use crate::session::Tier;

use super::fields::{self, Object};

pub const NO_RISKS: &str = "No significant risks detected.";
pub const NO_SIGNALS: &str = "Limited safe indicators available.";
pub const DEFAULT_RECOMMENDATION: &str = "Proceed with caution.";
pub const DEFAULT_SUMMARY: &str = "No AI summary available.";
pub const UNKNOWN_LEVEL: &str = "UNKNOWN";
pub const DEFAULT_ASSET_TYPE: &str = "token";

/// Canonical scan result. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub asset_type: String,
    /// Clamped to `[0, 1]`.
    pub risk_score: f64,
    pub risk_level: String,
    pub risk_factors: Vec<String>,
    pub positive_signals: Vec<String>,
    pub ai_summary: String,
    pub recommendation: String,
    pub tier_used: Tier,
    pub scan_id: Option<String>,
    pub message: Option<String>,
}

impl ScanRecord {
    pub fn band(&self) -> RiskBand {
        RiskBand::from_score(self.risk_score)
    }
}

/// Display bucket for a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        if score < 0.25 {
            Self::Low
        } else if score < 0.5 {
            Self::Medium
        } else if score < 0.75 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            Self::Low => "🟢",
            Self::Medium => "🟡",
            Self::High => "🟠",
            Self::Critical => "🔴",
        }
    }
}

/// Where an attempt found the analysis.
#[derive(Debug)]
struct Located<'a> {
    analysis: &'a Object,
    /// Object that carried the analysis; holds scan metadata.
    envelope: &'a Object,
    asset_type: Option<&'static str>,
}

type Attempt = for<'a> fn(&'a Object) -> Option<Located<'a>>;

const ATTEMPTS: &[Attempt] = &[from_envelope, from_token_or_wallet];

/// The `data` layer first when present, then the root.
fn layers(root: &Object) -> impl Iterator<Item = &Object> {
    root.get("data")
        .and_then(Value::as_object)
        .into_iter()
        .chain(std::iter::once(root))
}

/// An `analysis` object, or the layer itself when it carries `risk_score`.
fn analysis_in(layer: &Object) -> Option<&Object> {
    if let Some(analysis) = layer.get("analysis").and_then(Value::as_object) {
        return Some(analysis);
    }
    layer.contains_key("risk_score").then_some(layer)
}

fn from_envelope(root: &Object) -> Option<Located<'_>> {
    layers(root).find_map(|layer| {
        analysis_in(layer).map(|analysis| Located {
            analysis,
            envelope: layer,
            asset_type: None,
        })
    })
}

fn from_token_or_wallet(root: &Object) -> Option<Located<'_>> {
    layers(root).find_map(|layer| {
        ["token", "wallet"].into_iter().find_map(|key| {
            let inner = layer.get(key).and_then(Value::as_object)?;
            analysis_in(inner).map(|analysis| Located {
                analysis,
                envelope: layer,
                asset_type: Some(key),
            })
        })
    })
}

/// Map an arbitrary scan payload onto a [`ScanRecord`].
///
/// `requested` fills `tier_used` when the backend does not echo it.
pub fn normalize_scan(payload: &Value, requested: Tier) -> Result<ScanRecord, GatewayError> {
    let Some(root) = payload.as_object() else {
        warn!(kind = json_kind(payload), "Scan payload is not an object");
        return Err(GatewayError::UnexpectedFormat);
    };

    let Some(located) = ATTEMPTS.iter().find_map(|attempt| attempt(root)) else {
        let keys: Vec<&str> = root.keys().map(String::as_str).collect();
        warn!(?keys, "Unrecognized scan payload shape");
        return Err(GatewayError::UnexpectedFormat);
    };

    Ok(build_record(&located, root, requested))
}

fn build_record(located: &Located<'_>, root: &Object, requested: Tier) -> ScanRecord {
    let analysis = located.analysis;
    // Metadata may sit beside the analysis or at the top level.
    let meta = |keys: &[&str]| {
        fields::first_str(located.envelope, keys)
            .or_else(|| fields::first_str(root, keys))
            .or_else(|| fields::first_str(analysis, keys))
    };

    let risk_factors = collapse_list(analysis, &["risk_factors", "risks"]);
    let positive_signals = collapse_list(analysis, &["positive_signals", "strengths", "safe_indicators"]);

    ScanRecord {
        asset_type: fields::first_str(analysis, &["asset_type", "type"])
            .or_else(|| meta(&["asset_type"]))
            .or_else(|| located.asset_type.map(String::from))
            .unwrap_or_else(|| DEFAULT_ASSET_TYPE.to_string()),
        risk_score: fields::first_f64(analysis, &["risk_score"])
            .filter(|s| s.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0),
        risk_level: fields::first_str(analysis, &["risk_level"])
            .map(|l| l.to_uppercase())
            .unwrap_or_else(|| UNKNOWN_LEVEL.to_string()),
        risk_factors: or_default(risk_factors, NO_RISKS),
        positive_signals: or_default(positive_signals, NO_SIGNALS),
        ai_summary: fields::first_str(analysis, &["ai_summary", "summary", "explanation"])
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        recommendation: recommendation(analysis),
        tier_used: meta(&["tier_used", "tier"])
            .and_then(|t| Tier::parse(&t))
            .unwrap_or(requested),
        scan_id: meta(&["scan_id", "id"]),
        message: meta(&["message"]),
    }
}

/// Strings pass through; objects contribute `description`, else `name`.
fn collapse_list(map: &Object, keys: &[&str]) -> Vec<String> {
    let Some(Value::Array(items)) = fields::first(map, keys) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => fields::first_str(obj, &["description", "name"]),
            other => fields::value_to_string(other),
        })
        .collect()
}

fn or_default(list: Vec<String>, default: &str) -> Vec<String> {
    if list.is_empty() {
        vec![default.to_string()]
    } else {
        list
    }
}

fn recommendation(analysis: &Object) -> String {
    let from_list = analysis
        .get("recommendations")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|first| match first {
            Value::Object(obj) => fields::first_str(obj, &["description", "text", "name"]),
            other => fields::value_to_string(other),
        });
    from_list
        .or_else(|| fields::first_str(analysis, &["recommendation"]))
        .unwrap_or_else(|| DEFAULT_RECOMMENDATION.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_lists_get_defaults() {
        let payload = json!({
            "analysis": { "risk_score": 0.8, "risk_factors": [], "strengths": [] }
        });
        let record = normalize_scan(&payload, Tier::Free).unwrap();
        assert_eq!(record.risk_factors, vec![NO_RISKS.to_string()]);
        assert_eq!(record.positive_signals, vec![NO_SIGNALS.to_string()]);
        assert_eq!(record.risk_score, 0.8);
        assert_eq!(record.risk_level, UNKNOWN_LEVEL);
        assert_eq!(record.recommendation, DEFAULT_RECOMMENDATION);
        assert_eq!(record.tier_used, Tier::Free);
    }

    #[test]
    fn data_envelope_with_nested_analysis() {
        let payload = json!({
            "success": true,
            "data": {
                "scan_id": 42,
                "tier_used": "premium",
                "message": "Premium scan complete",
                "analysis": {
                    "risk_score": "0.3",
                    "risk_level": "medium",
                    "risk_factors": [{"description": "Mint authority enabled"}, {"name": "Low liquidity"}],
                    "positive_signals": ["Verified metadata"],
                    "recommendations": ["Limit position size", "Watch holders"],
                    "ai_summary": "Moderate risk token."
                }
            }
        });
        let record = normalize_scan(&payload, Tier::Free).unwrap();
        assert_eq!(record.risk_score, 0.3);
        assert_eq!(record.risk_level, "MEDIUM");
        assert_eq!(record.risk_factors, vec!["Mint authority enabled", "Low liquidity"]);
        assert_eq!(record.positive_signals, vec!["Verified metadata"]);
        assert_eq!(record.recommendation, "Limit position size");
        assert_eq!(record.ai_summary, "Moderate risk token.");
        assert_eq!(record.tier_used, Tier::Premium);
        assert_eq!(record.scan_id.as_deref(), Some("42"));
        assert_eq!(record.message.as_deref(), Some("Premium scan complete"));
    }

    #[test]
    fn flat_payload_with_sibling_risk_score() {
        let payload = json!({"risk_score": 0.1, "risk_level": "low"});
        let record = normalize_scan(&payload, Tier::Mvp).unwrap();
        assert_eq!(record.risk_level, "LOW");
        assert_eq!(record.tier_used, Tier::Mvp);
        assert_eq!(record.asset_type, DEFAULT_ASSET_TYPE);
    }

    #[test]
    fn wallet_wrapper_is_unwrapped() {
        let payload = json!({
            "data": { "wallet": { "analysis": { "risk_score": 0.9 } } }
        });
        let record = normalize_scan(&payload, Tier::Free).unwrap();
        assert_eq!(record.asset_type, "wallet");
        assert_eq!(record.band(), RiskBand::Critical);
    }

    #[test]
    fn unrecognized_shape_is_rejected() {
        for payload in [json!({"status": "ok"}), json!([1, 2]), json!("done"), json!({"data": {}})] {
            assert_eq!(
                normalize_scan(&payload, Tier::Free),
                Err(GatewayError::UnexpectedFormat)
            );
        }
    }

    #[test]
    fn score_is_clamped_and_defaults_to_zero() {
        let high = normalize_scan(&json!({"risk_score": 7}), Tier::Free).unwrap();
        assert_eq!(high.risk_score, 1.0);

        let missing = normalize_scan(&json!({"analysis": {}}), Tier::Free).unwrap();
        assert_eq!(missing.risk_score, 0.0);
        assert_eq!(missing.ai_summary, DEFAULT_SUMMARY);
    }

    #[test]
    fn bands() {
        assert_eq!(RiskBand::from_score(0.0), RiskBand::Low);
        assert_eq!(RiskBand::from_score(0.25), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(0.5), RiskBand::High);
        assert_eq!(RiskBand::from_score(0.75), RiskBand::Critical);
        assert_eq!(RiskBand::High.label(), "HIGH");
    }
}
