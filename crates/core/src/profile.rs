//! Client risk profile types.
//!
//! A [`ClientProfile`] only exists once the model has concluded the
//! interview: it is produced atomically from a single validated payload and
//! is never built up field by field.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Risk category, used both for the client's stated tolerance and for the
/// category the model assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskCategory {
    /// Scoring bands: 1-35 conservative, 36-65 moderate, 66-100 aggressive.
    pub fn for_score(score: u8) -> Self {
        match score {
            0..=35 => RiskCategory::Conservative,
            36..=65 => RiskCategory::Moderate,
            _ => RiskCategory::Aggressive,
        }
    }

    /// The model portfolio for this category.
    pub fn model_allocation(&self) -> Allocation {
        match self {
            RiskCategory::Conservative => Allocation::new(30.0, 50.0, 15.0, 5.0),
            RiskCategory::Moderate => Allocation::new(60.0, 30.0, 5.0, 5.0),
            RiskCategory::Aggressive => Allocation::new(80.0, 10.0, 5.0, 5.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Conservative => "conservative",
            RiskCategory::Moderate => "moderate",
            RiskCategory::Aggressive => "aggressive",
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskCategory {
    type Err = String;

    /// Case-insensitive; also accepts the common "aggresive" misspelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" | "low" => Ok(RiskCategory::Conservative),
            "moderate" | "balanced" | "medium" => Ok(RiskCategory::Moderate),
            "aggressive" | "aggresive" | "high" => Ok(RiskCategory::Aggressive),
            other => Err(format!("unknown risk category '{other}'")),
        }
    }
}

/// The client's primary investment goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentGoal {
    Retirement,
    WealthBuilding,
    IncomeGeneration,
    CapitalPreservation,
}

impl FromStr for InvestmentGoal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "retirement" => Ok(InvestmentGoal::Retirement),
            "wealth_building" | "wealth" | "growth" => Ok(InvestmentGoal::WealthBuilding),
            "income_generation" | "income" => Ok(InvestmentGoal::IncomeGeneration),
            "capital_preservation" | "preservation" => Ok(InvestmentGoal::CapitalPreservation),
            other => Err(format!("unknown investment goal '{other}'")),
        }
    }
}

/// Recommended allocation in percent across the four asset classes.
///
/// Totals are expected to be 100 but this is advisory; see [`Allocation::is_balanced`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub stocks: f64,
    pub bonds: f64,
    pub cash: f64,
    pub alternatives: f64,
}

impl Allocation {
    pub fn new(stocks: f64, bonds: f64, cash: f64, alternatives: f64) -> Self {
        Self {
            stocks,
            bonds,
            cash,
            alternatives,
        }
    }

    pub fn total(&self) -> f64 {
        self.stocks + self.bonds + self.cash + self.alternatives
    }

    /// Whether the percentages add up to 100 (within rounding).
    pub fn is_balanced(&self) -> bool {
        (self.total() - 100.0).abs() < 0.5
    }
}

/// The completed risk profile of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    /// Completion flag as reported by the model. Always `true` on a stored profile.
    pub profile_complete: bool,

    // Elicited attributes. The model may or may not echo them back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_horizon_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_tolerance: Option<RiskCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_goal: Option<InvestmentGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_income: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_investments: Option<f64>,

    /// Risk score in 1..=100
    pub risk_score: u8,
    pub risk_category: RiskCategory,
    pub allocation: Allocation,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl ClientProfile {
    /// Whether the assigned category matches the documented band for the score.
    pub fn category_matches_score(&self) -> bool {
        RiskCategory::for_score(self.risk_score) == self.risk_category
    }
}
