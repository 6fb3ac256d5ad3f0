//! Best-effort download accounting persisted as a single JSON record.

use std::{
    collections::BTreeSet,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ApiError;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub counter: u64,
    #[serde(default)]
    pub unique_users: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total_downloads: u64,
    pub unique_users: usize,
}

impl From<&UsageStats> for UsageSummary {
    fn from(stats: &UsageStats) -> Self {
        Self {
            total_downloads: stats.counter,
            unique_users: stats.unique_users.len(),
        }
    }
}

#[derive(Debug)]
pub struct UsageCounter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UsageCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    fn path(&self) -> &Path {
        &self.path
    }

    /// Records one successful download for `requester_id`.
    ///
    /// An unreadable record is left in place and reported; it is never
    /// replaced by a fresh one, so the counter cannot go backwards.
    pub async fn update(&self, requester_id: &str) -> Result<UsageSummary, ApiError> {
        let _guard = self.write_lock.lock().await;

        let mut stats = load_stats(&self.path).await.inspect_err(|error| {
            warn!("Usage record unreadable, not updating: {}", error.message);
        })?;
        stats.counter = stats.counter.saturating_add(1);
        stats.unique_users.insert(requester_id.to_string());

        persist_stats(&self.path, &stats).await?;
        Ok(UsageSummary::from(&stats))
    }

    pub async fn read(&self) -> Result<UsageSummary, ApiError> {
        let stats = load_stats(&self.path).await?;
        Ok(UsageSummary::from(&stats))
    }
}

async fn load_stats(path: &Path) -> Result<UsageStats, ApiError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|error| ApiError::internal(format!("Could not parse usage record: {error}"))),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(UsageStats::default()),
        Err(error) => Err(ApiError::internal(format!(
            "Could not open usage record: {error}"
        ))),
    }
}

/// Writes the record to a sibling temp file and renames it over `path`, so
/// readers see either the old or the new record, never a partial one.
async fn persist_stats(path: &Path, stats: &UsageStats) -> Result<(), ApiError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    tokio::fs::create_dir_all(&parent).await.map_err(|error| {
        ApiError::internal(format!("Could not create usage record directory: {error}"))
    })?;

    let payload = serde_json::to_string_pretty(stats)
        .map_err(|error| ApiError::internal(format!("Could not serialize usage record: {error}")))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut staged = tempfile::NamedTempFile::new_in(&parent)?;
        staged.write_all(payload.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&target).map_err(|error| error.error)?;
        Ok(())
    })
    .await
    .map_err(|error| ApiError::internal(format!("Usage record writer panicked: {error}")))?
    .map_err(|error| ApiError::internal(format!("Could not save usage record: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_downloads_and_distinct_requesters() {
        let dir = tempfile::tempdir().unwrap();
        let counter = UsageCounter::new(dir.path().join("data").join("stats.json"));

        for id in ["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.3", "10.0.0.2"] {
            counter.update(id).await.unwrap();
        }

        let summary = counter.read().await.unwrap();
        assert_eq!(summary.total_downloads, 5);
        assert_eq!(summary.unique_users, 3);
    }

    #[tokio::test]
    async fn read_on_missing_record_is_zero_and_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let counter = UsageCounter::new(dir.path().join("stats.json"));

        let summary = counter.read().await.unwrap();
        assert_eq!(
            summary,
            UsageSummary {
                total_downloads: 0,
                unique_users: 0
            }
        );
        assert!(!counter.path().exists());
    }

    #[tokio::test]
    async fn state_survives_a_new_counter_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");

        UsageCounter::new(&path).update("a").await.unwrap();
        let summary = UsageCounter::new(&path).update("b").await.unwrap();

        assert_eq!(summary.total_downloads, 2);
        assert_eq!(summary.unique_users, 2);
    }

    #[tokio::test]
    async fn truncated_record_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let counter = UsageCounter::new(&path);
        for id in ["a", "b", "c", "d", "e"] {
            counter.update(id).await.unwrap();
        }

        let full = tokio::fs::read(&path).await.unwrap();
        let torn = full[..full.len() / 2].to_vec();
        tokio::fs::write(&path, &torn).await.unwrap();

        assert!(counter.read().await.is_err());
        assert!(counter.update("x").await.is_err());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), torn);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reads_never_observe_a_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::Arc::new(UsageCounter::new(dir.path().join("stats.json")));

        let writer = {
            let counter = counter.clone();
            tokio::spawn(async move {
                for index in 0..200 {
                    counter.update(&format!("user-{}", index % 7)).await.unwrap();
                }
            })
        };

        let mut last_seen = 0;
        while !writer.is_finished() {
            let summary = counter.read().await.unwrap();
            assert!(summary.total_downloads >= last_seen);
            last_seen = summary.total_downloads;
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        let summary = counter.read().await.unwrap();
        assert_eq!(summary.total_downloads, 200);
        assert_eq!(summary.unique_users, 7);
    }

    #[tokio::test]
    async fn record_is_written_next_to_target_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let counter = UsageCounter::new(dir.path().join("stats.json"));
        counter.update("a").await.unwrap();
        counter.update("b").await.unwrap();

        let names = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["stats.json"]);
    }

    #[tokio::test]
    async fn concurrent_updates_in_one_process_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::Arc::new(UsageCounter::new(dir.path().join("stats.json")));

        let tasks = (0..20)
            .map(|index| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.update(&format!("user-{}", index % 4)).await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let summary = counter.read().await.unwrap();
        assert_eq!(summary.total_downloads, 20);
        assert_eq!(summary.unique_users, 4);
    }

    #[test]
    fn summary_serializes_with_camel_case_keys() {
        let json = serde_json::to_value(UsageSummary {
            total_downloads: 3,
            unique_users: 2,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"totalDownloads": 3, "uniqueUsers": 2}));
    }
}
