use crate::config::prompt::RiskThresholds;
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Technique {
    CrisisSupport,
    GroundingMindfulness,
    CognitiveBehavioral,
    EmotionalRegulation,
    Interpersonal,
    ProblemSolving,
    EmpatheticListening,
}

impl Technique {
    pub fn name(&self) -> &'static str {
        match self {
            Technique::CrisisSupport => "Crisis Support",
            Technique::GroundingMindfulness => "Grounding & Mindfulness",
            Technique::CognitiveBehavioral => "Cognitive Behavioral",
            Technique::EmotionalRegulation => "Emotional Regulation",
            Technique::Interpersonal => "Interpersonal",
            Technique::ProblemSolving => "Problem Solving",
            Technique::EmpatheticListening => "Empathetic Listening",
        }
    }

    pub fn goal(&self) -> &'static str {
        match self {
            Technique::CrisisSupport => "Safety and immediate support",
            Technique::GroundingMindfulness => "Reduce anxiety and promote calm",
            Technique::CognitiveBehavioral => "Identify and challenge negative thoughts",
            Technique::EmotionalRegulation => "Process and manage strong emotions",
            Technique::Interpersonal => "Explore relationship dynamics",
            Technique::ProblemSolving => "Break down challenges into manageable steps",
            Technique::EmpatheticListening => "Provide support and understanding",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TechniqueChoice {
    pub technique: String,
    pub goal: String,
}

impl From<Technique> for TechniqueChoice {
    fn from(t: Technique) -> Self {
        Self {
            technique: t.name().to_string(),
            goal: t.goal().to_string(),
        }
    }
}

const THEME_ORDER: [(&str, Technique); 5] = [
    ("anxiety", Technique::GroundingMindfulness),
    ("depression", Technique::CognitiveBehavioral),
    ("anger", Technique::EmotionalRegulation),
    ("relationships", Technique::Interpersonal),
    ("overwhelm", Technique::ProblemSolving),
];

/// First matching rule wins; crisis risk always takes precedence over themes.
pub fn pick(themes: &BTreeSet<String>, risk_level: u8, thresholds: &RiskThresholds) -> Technique {
    if risk_level >= thresholds.crisis_technique {
        return Technique::CrisisSupport;
    }
    THEME_ORDER.iter()
        .find(|(theme, _)| themes.contains(*theme))
        .map(|(_, technique)| *technique)
        .unwrap_or(Technique::EmpatheticListening)
}

pub fn select_technique(themes: &BTreeSet<String>, risk_level: u8) -> TechniqueChoice {
    pick(themes, risk_level, &RiskThresholds::default()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn crisis_wins_regardless_of_themes() {
        let all = set(&["anxiety", "depression", "anger", "relationships", "overwhelm"]);
        for risk in 8..=10 {
            let choice = select_technique(&all, risk);
            assert_eq!(choice.technique, "Crisis Support");
            assert_eq!(choice.goal, "Safety and immediate support");
        }
        assert_eq!(select_technique(&BTreeSet::new(), 8).technique, "Crisis Support");
    }

    #[test]
    fn theme_priority_order() {
        assert_eq!(
            select_technique(&set(&["overwhelm", "anxiety"]), 2).technique,
            "Grounding & Mindfulness"
        );
        assert_eq!(
            select_technique(&set(&["anger", "depression"]), 1).technique,
            "Cognitive Behavioral"
        );
        assert_eq!(
            select_technique(&set(&["relationships", "anger"]), 0).technique,
            "Emotional Regulation"
        );
        assert_eq!(
            select_technique(&set(&["relationships", "overwhelm"]), 0).technique,
            "Interpersonal"
        );
        assert_eq!(
            select_technique(&set(&["overwhelm", "sleep"]), 7).goal,
            "Break down challenges into manageable steps"
        );
    }

    #[test]
    fn default_is_empathetic_listening() {
        for themes in [set(&[]), set(&["sleep", "positive", "work-stress"])] {
            let choice = select_technique(&themes, 6);
            assert_eq!(choice.technique, "Empathetic Listening");
            assert_eq!(choice.goal, "Provide support and understanding");
        }
    }

    #[test]
    fn crisis_threshold_is_configurable() {
        let thresholds = RiskThresholds { crisis_technique: 6, ..RiskThresholds::default() };
        assert_eq!(pick(&set(&["anxiety"]), 6, &thresholds), Technique::CrisisSupport);
        assert_eq!(pick(&set(&["anxiety"]), 5, &thresholds), Technique::GroundingMindfulness);
    }
}
