use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Nerva AI, an empathetic mental health companion. Your role is to:
- Provide supportive, non-judgmental responses
- Use evidence-based therapeutic techniques (CBT, mindfulness, etc.)
- Maintain professional boundaries
- Prioritize user safety and well-being
- Be warm, understanding, and encouraging

Always respond with empathy and validate the user's feelings.";

pub const DEFAULT_CRISIS_DIRECTIVE: &str = "The user may be at risk. Gently mention that immediate help is available, such as calling or texting 988 (Suicide & Crisis Lifeline) or contacting local emergency services, without being alarmist.";

pub const DEFAULT_FALLBACK_GENERIC: &str = "I'm currently experiencing high traffic, but I'm here to listen. Please tell me more about how you're feeling, and I'll do my best to support you.";

pub const DEFAULT_FALLBACK_CRISIS: &str = "I'm having trouble responding right now, but I want you to know that you're not alone and your safety matters. If you're thinking about ending your life or are in immediate danger, please call or text the 988 Suicide & Crisis Lifeline (call or text 988 in the US), text HOME to 741741 to reach the Crisis Text Line, or contact your local emergency services right away.";

#[derive(Debug)]
pub enum PromptError {
    EmptyField(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyField(key) => write!(f, "Prompt field '{}' must not be empty", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// Prompt text and fallback replies, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub crisis_resources_directive: String,
    pub fallback_generic: String,
    pub fallback_crisis: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            crisis_resources_directive: DEFAULT_CRISIS_DIRECTIVE.to_string(),
            fallback_generic: DEFAULT_FALLBACK_GENERIC.to_string(),
            fallback_crisis: DEFAULT_FALLBACK_CRISIS.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct PromptOverrides {
    system_prompt: Option<String>,
    crisis_resources_directive: Option<String>,
    fallback_generic: Option<String>,
    fallback_crisis: Option<String>,
}

impl PromptConfig {
    fn apply(mut self, overrides: PromptOverrides) -> Self {
        if let Some(v) = overrides.system_prompt {
            self.system_prompt = v;
        }
        if let Some(v) = overrides.crisis_resources_directive {
            self.crisis_resources_directive = v;
        }
        if let Some(v) = overrides.fallback_generic {
            self.fallback_generic = v;
        }
        if let Some(v) = overrides.fallback_crisis {
            self.fallback_crisis = v;
        }
        self
    }

    // Fallbacks are the reply of last resort and must never be blank.
    fn validate(&self) -> Result<(), PromptError> {
        let fields = [
            ("system_prompt", &self.system_prompt),
            ("fallback_generic", &self.fallback_generic),
            ("fallback_crisis", &self.fallback_crisis),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(PromptError::EmptyField(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, PromptError> {
        let overrides: PromptOverrides = serde_json::from_str(text)?;
        let config = PromptConfig::default().apply(overrides);
        config.validate()?;
        Ok(config)
    }
}

/// Risk levels at which the pipeline changes behaviour. These are heuristic
/// product settings, not clinical cut-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskThresholds {
    /// At or above: prompt asks for crisis resources, fallback names hotlines.
    pub resource_mention: u8,
    /// At or above: technique is forced to Crisis Support.
    pub crisis_technique: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            resource_mention: 6,
            crisis_technique: 8,
        }
    }
}

pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, Box<dyn Error + Send + Sync>> {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        info!("No prompts file configured, using built-in prompts");
        return Ok(Arc::new(PromptConfig::default()));
    };
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read prompts file '{}': {}", path, e))?;
    let config = PromptConfig::from_json(&file_content)
        .map_err(|e| format!("Failed to parse prompts file '{}': {}", path, e))?;
    info!("Loaded prompts from {}", path);
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_defaults() {
        let config = PromptConfig::from_json(r#"{"fallback_generic": "Still here."}"#).unwrap();
        assert_eq!(config.fallback_generic, "Still here.");
        assert_eq!(config.fallback_crisis, DEFAULT_FALLBACK_CRISIS);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn blank_fallback_is_rejected() {
        let err = PromptConfig::from_json(r#"{"fallback_crisis": "  "}"#).unwrap_err();
        assert!(matches!(err, PromptError::EmptyField(ref f) if f == "fallback_crisis"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(PromptConfig::from_json("{"), Err(PromptError::JsonError(_))));
    }

    #[test]
    fn missing_path_uses_defaults() {
        let config = load_prompts(None).unwrap();
        assert_eq!(*config, PromptConfig::default());
        assert!(config.fallback_crisis.contains("988"));
    }
}
