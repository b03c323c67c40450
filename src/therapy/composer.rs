use super::classifier::Classification;
use super::technique::TechniqueChoice;
use crate::config::prompt::{ PromptConfig, RiskThresholds };
use crate::models::chat::{ ChatMessage, Role };

pub const HISTORY_WINDOW: usize = 10;

fn render_transcript(history: &[ChatMessage], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    let mut result = String::new();
    for msg in &history[start..] {
        let role_display = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        result.push_str(&format!("{}: {}\n", role_display, msg.content));
    }
    result
}

/// Builds the single text prompt sent to the generation service.
///
/// `history` must be chronological; only its last `window` turns are kept.
pub fn compose(
    config: &PromptConfig,
    thresholds: &RiskThresholds,
    history: &[ChatMessage],
    window: usize,
    current_message: &str,
    classification: &Classification,
    technique: &TechniqueChoice
) -> String {
    let mut prompt = String::new();
    prompt.push_str(config.system_prompt.trim_end());
    prompt.push_str("\n\n");

    let transcript = render_transcript(history, window);
    if !transcript.is_empty() {
        prompt.push_str("Previous conversation:\n");
        prompt.push_str(&transcript);
        prompt.push('\n');
    }

    prompt.push_str(&format!("User message: \"{}\"\n\n", current_message));

    let themes = if classification.themes.is_empty() {
        "none".to_string()
    } else {
        classification.themes.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    prompt.push_str(&format!("Detected emotional state: {}\n", classification.emotional_state));
    prompt.push_str(&format!("Detected themes: {}\n\n", themes));

    prompt.push_str(
        &format!(
            "Respond using the {} technique. Therapeutic goal: {}.\n",
            technique.technique,
            technique.goal
        )
    );

    if classification.risk_level >= thresholds.resource_mention {
        prompt.push_str(config.crisis_resources_directive.trim_end());
        prompt.push('\n');
    }

    prompt.push_str(
        "\nProvide a therapeutic response that is empathetic, supportive, and helpful. Keep it conversational and warm."
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::therapy::{ classify, select_technique };
    use chrono::{ Duration, Utc };

    fn turn(role: Role, content: &str, offset: i64) -> ChatMessage {
        ChatMessage {
            session_id: "s".into(),
            user_id: "u".into(),
            role,
            content: content.into(),
            metadata: None,
            timestamp: Utc::now() + Duration::seconds(offset),
        }
    }

    fn build(history: &[ChatMessage], text: &str) -> String {
        let c = classify(text);
        let t = select_technique(&c.themes, c.risk_level);
        compose(
            &PromptConfig::default(),
            &RiskThresholds::default(),
            history,
            HISTORY_WINDOW,
            text,
            &c,
            &t
        )
    }

    #[test]
    fn contains_all_sections() {
        let history = vec![turn(Role::User, "hi", 0), turn(Role::Assistant, "hello there", 1)];
        let prompt = build(&history, "I feel anxious about my exam");
        assert!(prompt.starts_with("You are Nerva AI"));
        assert!(prompt.contains("User: hi\nAssistant: hello there\n"));
        assert!(prompt.contains("User message: \"I feel anxious about my exam\""));
        assert!(prompt.contains("Detected emotional state: anxious"));
        assert!(prompt.contains("Detected themes: anxiety"));
        assert!(prompt.contains("Grounding & Mindfulness"));
        assert!(prompt.contains("Reduce anxiety and promote calm"));
        assert!(!prompt.contains("988"));
    }

    #[test]
    fn keeps_only_last_window_in_order() {
        let history: Vec<_> = (0..14)
            .map(|i| turn(Role::User, &format!("msg-{:02}", i), i))
            .collect();
        let prompt = build(&history, "ok");
        assert!(!prompt.contains("msg-03"));
        let first = prompt.find("msg-04").unwrap();
        let last = prompt.find("msg-13").unwrap();
        assert!(first < last);
    }

    #[test]
    fn resource_directive_at_threshold() {
        let prompt = build(&[], "I feel worthless");
        assert!(prompt.contains(DEFAULT_CRISIS_MARKER));
        let calm = build(&[], "I feel hopeless");
        assert!(!calm.contains(DEFAULT_CRISIS_MARKER));
    }

    #[test]
    fn empty_history_has_no_transcript() {
        let prompt = build(&[], "hello");
        assert!(!prompt.contains("Previous conversation"));
        assert!(prompt.contains("Detected themes: none"));
        assert!(prompt.contains("Empathetic Listening"));
    }

    const DEFAULT_CRISIS_MARKER: &str = "Suicide & Crisis Lifeline";
}
