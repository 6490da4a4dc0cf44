//! File-backed data store.
//!
//! Serves the three tables from a JSON export, which is how offline runs and
//! tests feed the pipeline.

use crate::error::StoreError;
use crate::models::{ConsentRecord, InteractionRecord, Period, ProfileRecord};
use crate::store::DataStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Table contents as exported from the relational store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub consents: Vec<ConsentRecord>,
    #[serde(default)]
    pub profiles: Vec<ProfileRecord>,
    #[serde(default)]
    pub interactions: Vec<InteractionRecord>,
}

pub struct SnapshotStore {
    snapshot: Snapshot,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Load a snapshot from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        info!(
            "Loaded snapshot {}: {} consents, {} profiles, {} interactions",
            path.display(),
            snapshot.consents.len(),
            snapshot.profiles.len(),
            snapshot.interactions.len()
        );
        Ok(Self::new(snapshot))
    }
}

#[async_trait]
impl DataStore for SnapshotStore {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn consents(&self) -> Result<Vec<ConsentRecord>, StoreError> {
        Ok(self.snapshot.consents.clone())
    }

    async fn completed_profiles(&self, period: &Period) -> Result<Vec<ProfileRecord>, StoreError> {
        let profiles: Vec<ProfileRecord> = self
            .snapshot
            .profiles
            .iter()
            .filter(|p| p.is_completed() && period.contains(p.created_at))
            .cloned()
            .collect();
        debug!("Snapshot matched {} completed profiles", profiles.len());
        Ok(profiles)
    }

    async fn interactions(
        &self,
        subjects: &[String],
        period: &Period,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let wanted: HashSet<&str> = subjects.iter().map(String::as_str).collect();
        Ok(self
            .snapshot
            .interactions
            .iter()
            .filter(|i| wanted.contains(i.subject_id.as_str()) && period.contains(i.created_at))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn period() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
        .unwrap()
    }

    fn profile(id: &str, user_type: Option<&str>, day: u32) -> ProfileRecord {
        ProfileRecord {
            subject_id: id.to_string(),
            user_type: user_type.map(String::from),
            birth_date: None,
            gender: None,
            country: None,
            state: None,
            city: None,
            travel_motives: vec![],
            created_at: Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_completed_profiles_filters_registration_marker() {
        let store = SnapshotStore::new(Snapshot {
            profiles: vec![
                profile("a", Some("tourist"), 3),
                profile("b", None, 4),
                profile("c", Some("resident"), 5),
            ],
            ..Snapshot::default()
        });

        let ids: Vec<String> = store
            .completed_profiles(&period())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.subject_id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_interactions_scoped_to_subjects_and_period() {
        let inside = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2025, 2, 10, 8, 0, 0).unwrap();
        let record = |id: &str, at| InteractionRecord {
            subject_id: id.to_string(),
            interaction_type: "page_view".to_string(),
            page_url: Some("/eventos".to_string()),
            metadata: None,
            created_at: at,
        };
        let store = SnapshotStore::new(Snapshot {
            interactions: vec![record("a", inside), record("a", outside), record("b", inside)],
            ..Snapshot::default()
        });

        let found = store
            .interactions(&["a".to_string()], &period())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].created_at, inside);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{"consents":[{"subject_id":"a","given":true,"revoked_at":null}]}"#,
        )
        .unwrap();

        let store = SnapshotStore::load(&path).await.unwrap();
        assert_eq!(store.consents().await.unwrap().len(), 1);
    }
}
