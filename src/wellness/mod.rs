mod memory;
mod redis;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

use crate::cli::Args;
use crate::error::StoreResult;
use crate::models::wellness::{ ActivityEntry, ActivityKind, ActivityRequest, MoodEntry, MoodRequest };

pub use self::memory::MemoryWellnessStore;
pub use self::redis::RedisWellnessStore;

#[async_trait]
pub trait WellnessStore: Send + Sync {
    async fn add_mood(&self, entry: MoodEntry) -> StoreResult<()>;
    async fn add_activity(&self, entry: ActivityEntry) -> StoreResult<()>;
    /// Newest first.
    async fn activities_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>
    ) -> StoreResult<Vec<ActivityEntry>>;
}

pub fn create_wellness_store(
    args: &Args
) -> Result<Arc<dyn WellnessStore>, Box<dyn Error + Send + Sync>> {
    match args.store_type.to_lowercase().as_str() {
        "redis" => Ok(Arc::new(RedisWellnessStore::new(&args.store_host, &args.store_prefix)?)),
        "memory" => Ok(Arc::new(MemoryWellnessStore::new())),
        other => Err(format!("Unsupported store type: {}", other).into()),
    }
}

pub fn build_mood(user_id: &str, req: MoodRequest) -> Result<MoodEntry, String> {
    let score = req.score.ok_or("Mood score is required")?;
    if !(0..=100).contains(&score) {
        return Err("Mood score must be between 0 and 100".to_string());
    }
    Ok(MoodEntry {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        score: score as u8,
        note: req.note.filter(|n| !n.trim().is_empty()),
        context: req.context.filter(|c| !c.trim().is_empty()),
        activities: req.activities,
        timestamp: Utc::now(),
    })
}

pub fn build_activity(user_id: &str, req: ActivityRequest) -> Result<ActivityEntry, String> {
    let kind: ActivityKind = req.kind.ok_or("Activity type is required")?.parse()?;
    let name = req.name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or("Activity name is required")?;
    let duration = req.duration.ok_or("Activity duration is required")?;
    if duration < 0 || duration > i64::from(u32::MAX) {
        return Err("Activity duration must be a non-negative number of minutes".to_string());
    }
    let difficulty = match req.difficulty {
        Some(d) if !(0..=10).contains(&d) => {
            return Err("Activity difficulty must be between 0 and 10".to_string());
        }
        Some(d) => Some(d as u8),
        None => None,
    };
    Ok(ActivityEntry {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind,
        name,
        description: req.description,
        duration: duration as u32,
        difficulty,
        feedback: req.feedback,
        timestamp: Utc::now(),
    })
}

pub fn start_of_today() -> DateTime<Utc> {
    let now = Utc::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[derive(Clone)]
pub struct WellnessService {
    store: Arc<dyn WellnessStore>,
}

impl WellnessService {
    pub fn new(store: Arc<dyn WellnessStore>) -> Self {
        Self { store }
    }

    pub async fn record_mood(&self, entry: MoodEntry) -> StoreResult<MoodEntry> {
        self.store.add_mood(entry.clone()).await?;
        info!("Mood created for user {} with score {}", entry.user_id, entry.score);
        Ok(entry)
    }

    pub async fn log_activity(&self, entry: ActivityEntry) -> StoreResult<ActivityEntry> {
        self.store.add_activity(entry.clone()).await?;
        info!("Activity logged for user {}: {} - {}", entry.user_id, entry.kind, entry.name);
        Ok(entry)
    }

    pub async fn today_activities(&self, user_id: &str) -> StoreResult<Vec<ActivityEntry>> {
        self.store.activities_since(user_id, start_of_today()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_score_bounds() {
        let ok = build_mood("u", MoodRequest { score: Some(70), ..Default::default() }).unwrap();
        assert_eq!(ok.score, 70);
        assert!(build_mood("u", MoodRequest { score: Some(101), ..Default::default() }).is_err());
        assert!(build_mood("u", MoodRequest { score: Some(-1), ..Default::default() }).is_err());
        assert!(build_mood("u", MoodRequest::default()).is_err());
    }

    #[test]
    fn activity_validation() {
        let req = ActivityRequest {
            kind: Some("Meditation".into()),
            name: Some("Morning sit".into()),
            duration: Some(15),
            ..Default::default()
        };
        let entry = build_activity("u", req).unwrap();
        assert_eq!(entry.kind, ActivityKind::Meditation);
        assert_eq!(entry.duration, 15);

        let bad_kind = ActivityRequest {
            kind: Some("gaming".into()),
            name: Some("x".into()),
            duration: Some(5),
            ..Default::default()
        };
        assert!(build_activity("u", bad_kind).is_err());

        let negative = ActivityRequest {
            kind: Some("walking".into()),
            name: Some("x".into()),
            duration: Some(-5),
            ..Default::default()
        };
        assert!(build_activity("u", negative).is_err());
    }

    #[tokio::test]
    async fn today_lists_only_callers_recent_entries() {
        let service = WellnessService::new(Arc::new(MemoryWellnessStore::new()));
        let mut old = build_activity("u", ActivityRequest {
            kind: Some("reading".into()),
            name: Some("Old book".into()),
            duration: Some(30),
            ..Default::default()
        }).unwrap();
        old.timestamp = start_of_today() - chrono::Duration::hours(2);
        service.log_activity(old).await.unwrap();

        for (user, name) in [("u", "first"), ("other", "theirs"), ("u", "second")] {
            let entry = build_activity(user, ActivityRequest {
                kind: Some("walking".into()),
                name: Some(name.into()),
                duration: Some(10),
                ..Default::default()
            }).unwrap();
            service.log_activity(entry).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let today = service.today_activities("u").await.unwrap();
        let names: Vec<_> = today.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }
}
