use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use tokio::sync::RwLock;

use super::WellnessStore;
use crate::error::StoreResult;
use crate::models::wellness::{ ActivityEntry, MoodEntry };

#[derive(Default)]
pub struct MemoryWellnessStore {
    moods: RwLock<Vec<MoodEntry>>,
    activities: RwLock<Vec<ActivityEntry>>,
}

impl MemoryWellnessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WellnessStore for MemoryWellnessStore {
    async fn add_mood(&self, entry: MoodEntry) -> StoreResult<()> {
        self.moods.write().await.push(entry);
        Ok(())
    }

    async fn add_activity(&self, entry: ActivityEntry) -> StoreResult<()> {
        self.activities.write().await.push(entry);
        Ok(())
    }

    async fn activities_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>
    ) -> StoreResult<Vec<ActivityEntry>> {
        let activities = self.activities.read().await;
        let mut result: Vec<ActivityEntry> = activities
            .iter()
            .filter(|a| a.user_id == user_id && a.timestamp >= since)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(result)
    }
}
