//! Profile extraction from free-form model replies.
//!
//! The model is asked to finish with a JSON object, but replies are prose
//! with the object somewhere inside (often in a code fence). The candidate
//! span runs from the first `{` to the last `}`. A stray brace in the
//! surrounding prose spoils the span and the reply reads as "no payload";
//! the conversation then carries on and the model can emit it again.
//!
//! Outcomes:
//! - no parseable object, or the object isn't flagged complete: [`Extraction::NotFound`]
//! - flagged complete with every required field valid: [`Extraction::Complete`]
//! - flagged complete but a required field missing or invalid: [`Extraction::Malformed`]

use riskprofiler_core::error::ProfileError;
use riskprofiler_core::profile::{Allocation, ClientProfile, InvestmentGoal, RiskCategory};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// What a reply contained.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// A valid, completed profile.
    Complete(ClientProfile),
    /// No completed profile in this reply.
    NotFound,
    /// The reply claimed completion but the payload is unusable.
    Malformed(ProfileError),
}

/// Find and validate a completed profile in `reply`.
pub fn extract_profile(reply: &str) -> Extraction {
    let Some(span) = payload_span(reply) else {
        return Extraction::NotFound;
    };

    let value: Value = match serde_json::from_str(span) {
        Ok(value) => value,
        Err(e) => {
            debug!("Reply contains braces but no parseable payload: {e}");
            return Extraction::NotFound;
        }
    };
    let Some(object) = value.as_object() else {
        return Extraction::NotFound;
    };

    if !completion_flag(object) {
        return Extraction::NotFound;
    }

    match build_profile(object) {
        Ok(profile) => {
            for warning in advisories(&profile) {
                warn!(risk_score = profile.risk_score, "{warning}");
            }
            Extraction::Complete(profile)
        }
        Err(e) => Extraction::Malformed(e),
    }
}

/// Non-fatal inconsistencies in an otherwise valid profile.
pub fn advisories(profile: &ClientProfile) -> Vec<String> {
    let mut warnings = Vec::new();
    if !profile.category_matches_score() {
        warnings.push(format!(
            "risk_category '{}' does not match the band for score {} ('{}')",
            profile.risk_category,
            profile.risk_score,
            RiskCategory::for_score(profile.risk_score)
        ));
    }
    if !profile.allocation.is_balanced() {
        warnings.push(format!(
            "allocation sums to {:.1}%, expected 100%",
            profile.allocation.total()
        ));
    }
    warnings
}

/// First `{` through last `}`, inclusive.
fn payload_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn completion_flag(object: &Map<String, Value>) -> bool {
    match object.get("profile_complete") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn build_profile(object: &Map<String, Value>) -> Result<ClientProfile, ProfileError> {
    let risk_score = risk_score(object)?;
    let risk_category = required_category(object, "risk_category")?;
    let allocation = allocation(object)?;

    Ok(ClientProfile {
        profile_complete: true,
        age: optional_whole(object, "age"),
        investment_horizon_years: optional_whole(object, "investment_horizon_years"),
        risk_tolerance: object
            .get("risk_tolerance")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<RiskCategory>().ok()),
        investment_goal: object
            .get("investment_goal")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<InvestmentGoal>().ok()),
        annual_income: object.get("annual_income").and_then(number),
        existing_investments: object.get("existing_investments").and_then(number),
        risk_score,
        risk_category,
        allocation,
        insights: string_list(object.get("insights")),
        next_steps: string_list(object.get("next_steps")),
    })
}

fn risk_score(object: &Map<String, Value>) -> Result<u8, ProfileError> {
    let value = object
        .get("risk_score")
        .filter(|v| !v.is_null())
        .ok_or(ProfileError::MissingField("risk_score"))?;
    let score = number(value).ok_or_else(|| ProfileError::InvalidField {
        field: "risk_score",
        reason: format!("expected a number, got {value}"),
    })?;
    let rounded = score.round();
    if !(1.0..=100.0).contains(&rounded) {
        return Err(ProfileError::InvalidField {
            field: "risk_score",
            reason: format!("{score} is outside 1-100"),
        });
    }
    Ok(rounded as u8)
}

fn required_category(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<RiskCategory, ProfileError> {
    let value = object
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or(ProfileError::MissingField(field))?;
    let text = value.as_str().ok_or_else(|| ProfileError::InvalidField {
        field,
        reason: format!("expected a string, got {value}"),
    })?;
    text.parse::<RiskCategory>()
        .map_err(|reason| ProfileError::InvalidField { field, reason })
}

fn allocation(object: &Map<String, Value>) -> Result<Allocation, ProfileError> {
    let value = object
        .get("allocation")
        .filter(|v| !v.is_null())
        .ok_or(ProfileError::MissingField("allocation"))?;
    let shares = value.as_object().ok_or_else(|| ProfileError::InvalidField {
        field: "allocation",
        reason: "expected an object of percentages".into(),
    })?;

    let share = |key: &'static str| -> Result<f64, ProfileError> {
        let v = shares.get(key).ok_or(ProfileError::InvalidField {
            field: "allocation",
            reason: format!("missing '{key}'"),
        })?;
        number(v)
            .filter(|pct| *pct >= 0.0)
            .ok_or_else(|| ProfileError::InvalidField {
                field: "allocation",
                reason: format!("'{key}' is not a non-negative percentage: {v}"),
            })
    };

    Ok(Allocation::new(
        share("stocks")?,
        share("bonds")?,
        share("cash")?,
        share("alternatives")?,
    ))
}

/// A number, or a string holding one ("75", "75%", "$120,000").
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '%' | '$' | ',' | ' '))
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn optional_whole(object: &Map<String, Value>, field: &str) -> Option<u32> {
    object
        .get(field)
        .and_then(number)
        .filter(|n| *n >= 0.0 && *n <= u32::MAX as f64)
        .map(|n| n.round() as u32)
}

/// A list of strings; a lone string becomes a one-item list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
