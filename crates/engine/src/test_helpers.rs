//! Shared test helpers for engine tests.

use riskprofiler_core::error::ProviderError;
use riskprofiler_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;
use std::time::Duration;

/// A mock provider that plays back a script of outcomes.
///
/// Each call to `complete` takes the next entry in the script.
/// Panics if more calls are made than entries provided.
pub struct ScriptedProvider {
    script: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|entry| entry.map(|text| make_text_response(&text)))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A provider that succeeds with each reply in turn.
    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Wait this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            panic!("ScriptedProvider: no more responses (call #{call})");
        }
        script.remove(0)
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        model: "mock-model".into(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
    }
}

/// A reply that concludes the interview with a valid payload.
pub fn completion_reply(score: u8, category: &str) -> String {
    let allocation = match category {
        "conservative" => (30, 50, 15, 5),
        "moderate" => (60, 30, 5, 5),
        _ => (80, 10, 5, 5),
    };
    format!(
        "Thank you! Here is your profile.\n```json\n{{\"profile_complete\": true, \"risk_score\": {score}, \
         \"risk_category\": \"{category}\", \"allocation\": {{\"stocks\": {}, \"bonds\": {}, \"cash\": {}, \
         \"alternatives\": {}}}, \"insights\": [\"Long horizon\"], \"next_steps\": [\"Open an account\"]}}\n```",
        allocation.0, allocation.1, allocation.2, allocation.3
    )
}
