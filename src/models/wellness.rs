use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub id: String,
    pub user_id: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Meditation,
    Exercise,
    Walking,
    Reading,
    Journaling,
    Therapy,
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "meditation" => Ok(ActivityKind::Meditation),
            "exercise" => Ok(ActivityKind::Exercise),
            "walking" => Ok(ActivityKind::Walking),
            "reading" => Ok(ActivityKind::Reading),
            "journaling" => Ok(ActivityKind::Journaling),
            "therapy" => Ok(ActivityKind::Therapy),
            other => Err(format!("Unsupported activity type: {}", other)),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::Meditation => "meditation",
            ActivityKind::Exercise => "exercise",
            ActivityKind::Walking => "walking",
            ActivityKind::Reading => "reading",
            ActivityKind::Journaling => "journaling",
            ActivityKind::Therapy => "therapy",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Minutes.
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MoodRequest {
    pub score: Option<i64>,
    pub note: Option<String>,
    pub context: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i64>,
    pub difficulty: Option<i64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub activity: ActivityEntry,
}
