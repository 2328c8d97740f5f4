//! Prompt composition: the elicitation policy plus the conversation so far.
//!
//! Every call resends the full history. The model is stateless, and whether
//! the profile is complete depends on everything the client has said.

use riskprofiler_config::ProfilerConfig;
use riskprofiler_core::message::ChatTurn;

/// Built-in system instruction: what to ask, how to conclude, and how to score.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a professional wealth management advisor specializing in client onboarding and risk profiling.

Your goal is to gather the following information through natural conversation:
1. Age and investment timeline (investment horizon in years)
2. Risk tolerance (conservative, moderate, aggressive)
3. Primary investment goal (retirement, wealth building, income generation, capital preservation)
4. Annual income range
5. Existing investment portfolio value

Guidelines:
- Ask ONE question at a time
- Be conversational and empathetic
- Provide brief educational context when needed
- Do not output any JSON until you have all five pieces of information

When you have all the information, give a short summary in prose and then respond with JSON in exactly this format:
{
  "profile_complete": true,
  "age": <years>,
  "investment_horizon_years": <years>,
  "risk_tolerance": "<conservative|moderate|aggressive>",
  "investment_goal": "<retirement|wealth_building|income_generation|capital_preservation>",
  "annual_income": <amount>,
  "existing_investments": <amount>,
  "risk_score": <1-100>,
  "risk_category": "<conservative|moderate|aggressive>",
  "allocation": {
    "stocks": <percentage>,
    "bonds": <percentage>,
    "cash": <percentage>,
    "alternatives": <percentage>
  },
  "insights": ["insight1", "insight2", "insight3"],
  "next_steps": ["step1", "step2", "step3"]
}

Risk scoring logic:
- Conservative: 1-35 (age 50+, short horizon, low risk tolerance)
- Moderate: 36-65 (age 30-50, medium horizon, balanced approach)
- Aggressive: 66-100 (age under 30, long horizon, high risk tolerance)

Portfolio allocation rules (percentages must add up to 100):
- Conservative: 30% stocks, 50% bonds, 15% cash, 5% alternatives
- Moderate: 60% stocks, 30% bonds, 5% cash, 5% alternatives
- Aggressive: 80% stocks, 10% bonds, 5% cash, 5% alternatives"#;

/// Built-in instruction that makes the model open the conversation.
pub const DEFAULT_KICKOFF: &str = "Start a conversation to gather client risk profile information. \
Greet the client warmly and ask the first question.";

/// The fixed instructions sent ahead of every conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePolicy {
    system_prompt: String,
    kickoff: String,
}

impl Default for ProfilePolicy {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            kickoff: DEFAULT_KICKOFF.to_string(),
        }
    }
}

impl ProfilePolicy {
    pub fn new(system_prompt: impl Into<String>, kickoff: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            kickoff: kickoff.into(),
        }
    }

    /// Built-in policy with any configured overrides applied.
    pub fn from_config(config: &ProfilerConfig) -> Self {
        let defaults = Self::default();
        Self {
            system_prompt: config
                .system_prompt_override
                .clone()
                .unwrap_or(defaults.system_prompt),
            kickoff: config.kickoff_override.clone().unwrap_or(defaults.kickoff),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Messages for a turn: system instruction, all prior turns in order,
    /// then the new user turn.
    pub fn compose(&self, history: &[ChatTurn], user_turn: &ChatTurn) -> Vec<ChatTurn> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatTurn::system(&self.system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(user_turn.clone());
        messages
    }

    /// Messages that ask the model to greet and open the interview.
    ///
    /// The kickoff goes in as a system turn: the client hasn't said anything
    /// yet, and it is never stored in the session history.
    pub fn compose_kickoff(&self) -> Vec<ChatTurn> {
        vec![
            ChatTurn::system(&self.system_prompt),
            ChatTurn::system(&self.kickoff),
        ]
    }
}
