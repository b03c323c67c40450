use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

pub const MAX_RISK_LEVEL: u8 = 10;
pub const CRISIS_RISK_LEVEL: u8 = 10;
pub const SELF_HARM_RISK_FLOOR: u8 = 8;
pub const WORTHLESSNESS_RISK_FLOOR: u8 = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub emotional_state: String,
    pub risk_level: u8,
    pub themes: BTreeSet<String>,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            emotional_state: "neutral".to_string(),
            risk_level: 0,
            themes: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum RiskEffect {
    Unchanged,
    Add(u8),
    Set(u8),
    AtLeast(u8),
}

struct Rule {
    pattern: Regex,
    theme: Option<&'static str>,
    state: Option<&'static str>,
    risk: RiskEffect,
}

impl Rule {
    fn new(
        pattern: &str,
        theme: Option<&'static str>,
        state: Option<&'static str>,
        risk: RiskEffect
    ) -> Self {
        let pattern = Regex::new(pattern).expect("classifier rule pattern");
        Self { pattern, theme, state, risk }
    }
}

lazy_static! {
    // Evaluation order matters: later matches overwrite the emotional state.
    static ref RULES: Vec<Rule> = vec![
        Rule::new(
            r"\b(anxi(ous|ety)|worr(y|ied|ying|ies)|panic\w*|fear(s|ful)?|scared|afraid|nervous)\b",
            Some("anxiety"),
            Some("anxious"),
            RiskEffect::Unchanged,
        ),
        Rule::new(
            r"\b(sad(ness)?|depress(ed|ion|ing)?|hopeless(ness)?|lonely|loneliness|miserable)\b",
            Some("depression"),
            Some("sad"),
            RiskEffect::Add(1),
        ),
        Rule::new(
            r"\b(angry|anger|frustrat(ed|ing|ion)|upset|furious|irritated)\b",
            Some("anger"),
            Some("frustrated"),
            RiskEffect::Unchanged,
        ),
        Rule::new(
            r"\b(happy|glad|great|better|grateful|thankful|excited|hopeful|relieved|proud)\b",
            Some("positive"),
            Some("positive"),
            RiskEffect::Unchanged,
        ),
        Rule::new(
            r"\b(sleep(ing|less)?|insomnia|nightmares?|can'?t fall asleep)\b",
            Some("sleep"),
            None,
            RiskEffect::Unchanged,
        ),
        Rule::new(
            r"\b(work(ing|place)?|job|boss|deadlines?|career|office|co-?workers?|colleagues?)\b",
            Some("work-stress"),
            None,
            RiskEffect::Unchanged,
        ),
        Rule::new(
            r"\b(relationships?|partner|boyfriend|girlfriend|husband|wife|friends?|family|parents?|breakup|broke up|divorce)\b",
            Some("relationships"),
            None,
            RiskEffect::Unchanged,
        ),
        Rule::new(
            r"\b(overwhelm(ed|ing)?|(can'?t|cannot) (cope|handle (it|this|anything))|too much to handle|falling apart)\b",
            Some("overwhelm"),
            None,
            RiskEffect::Add(1),
        ),
        Rule::new(
            r"\b(kill(ing)? myself|suicid(e|al)|end(ing)? (my|it all|my own) life|end it all|take my (own )?life|want(ed)? to die|wanna die|better off dead|no reason to (live|go on)|don'?t want to (live|be alive))\b",
            Some("crisis"),
            Some("crisis"),
            RiskEffect::Set(CRISIS_RISK_LEVEL),
        ),
        Rule::new(
            r"\b(self[- ]?harm(ing)?|hurt(ing)? myself|cut(ting)? myself|harm(ing)? myself|burn(ing)? myself)\b",
            Some("self-harm"),
            None,
            RiskEffect::AtLeast(SELF_HARM_RISK_FLOOR),
        ),
        Rule::new(
            r"\b(worthless|useless|i hate myself|(i'?m|i am) a burden|burden (to|on) (everyone|others|my family|people)|no ?one (would )?cares?|nobody (would )?cares?)\b",
            None,
            None,
            RiskEffect::AtLeast(WORTHLESSNESS_RISK_FLOOR),
        )
    ];
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// Heuristic emotional-signal classification of one user message.
///
/// Total and pure: the same text always yields the same result, and the
/// risk level stays within `0..=MAX_RISK_LEVEL`.
pub fn classify(text: &str) -> Classification {
    let normalized = normalize(text);
    let mut result = Classification::default();

    for rule in RULES.iter() {
        if !rule.pattern.is_match(&normalized) {
            continue;
        }
        if let Some(theme) = rule.theme {
            result.themes.insert(theme.to_string());
        }
        if let Some(state) = rule.state {
            result.emotional_state = state.to_string();
        }
        result.risk_level = match rule.risk {
            RiskEffect::Unchanged => result.risk_level,
            RiskEffect::Add(delta) => result.risk_level.saturating_add(delta),
            RiskEffect::Set(level) => level,
            RiskEffect::AtLeast(floor) => result.risk_level.max(floor),
        };
    }

    result.risk_level = result.risk_level.min(MAX_RISK_LEVEL);
    result
}
