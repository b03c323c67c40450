//! Best-effort access to the generation service.
//!
//! Every call ends with usable reply text: a model completion when one
//! arrives in time, otherwise a fixed fallback picked by risk tier.

use super::chat::ChatClient;
use super::GenerationParams;
use crate::config::prompt::{ PromptConfig, RiskThresholds };
use log::{ debug, warn };
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Fallback(String),
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub text: String,
    pub source: ReplySource,
}

impl GenerationOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ReplySource::Fallback(_))
    }
}

#[derive(Clone)]
pub struct GenerationGateway {
    client: Arc<dyn ChatClient>,
    params: GenerationParams,
    timeout: Duration,
    max_attempts: u32,
    prompts: Arc<PromptConfig>,
    thresholds: RiskThresholds,
}

impl GenerationGateway {
    pub fn new(
        client: Arc<dyn ChatClient>,
        params: GenerationParams,
        timeout: Duration,
        max_attempts: u32,
        prompts: Arc<PromptConfig>,
        thresholds: RiskThresholds
    ) -> Self {
        Self {
            client,
            params,
            timeout,
            max_attempts: max_attempts.max(1),
            prompts,
            thresholds,
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<String, String> {
        let call = self.client.complete(prompt, &self.params);
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok(resp)) => {
                let text = resp.response.trim();
                if text.is_empty() {
                    Err("empty completion".to_string())
                } else {
                    Ok(text.to_string())
                }
            }
        }
    }

    pub fn fallback_for(&self, risk_level: u8) -> &str {
        if risk_level >= self.thresholds.resource_mention {
            &self.prompts.fallback_crisis
        } else {
            &self.prompts.fallback_generic
        }
    }

    /// Never fails: errors from the service are folded into a fallback reply.
    pub async fn generate(&self, prompt: &str, risk_level: u8) -> GenerationOutcome {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.attempt(prompt).await {
                Ok(text) => {
                    debug!(
                        "Generation succeeded on attempt {} (model={}, {} chars)",
                        attempt,
                        self.client.get_model(),
                        text.len()
                    );
                    return GenerationOutcome { text, source: ReplySource::Model };
                }
                Err(reason) => {
                    warn!(
                        "Generation attempt {}/{} failed (model={}): {}",
                        attempt,
                        self.max_attempts,
                        self.client.get_model(),
                        reason
                    );
                    last_error = reason;
                }
            }
        }

        GenerationOutcome {
            text: self.fallback_for(risk_level).to_string(),
            source: ReplySource::Fallback(last_error),
        }
    }
}
