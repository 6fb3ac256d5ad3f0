use std::{io::ErrorKind, path::Path, time::SystemTime};

use axum::{
    Json,
    extract::{Path as UrlPath, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::attachment_response;
use crate::{context::AppContext, error::ApiError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FileEntry {
    pub name: String,
    pub size_mb: f64,
    pub modified: String,
    #[serde(skip)]
    modified_at: SystemTime,
}

pub(super) async fn list_files(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    Ok(Json(read_entries(&ctx.config.downloads_dir).await?))
}

pub(super) async fn fetch_file(
    State(ctx): State<AppContext>,
    UrlPath(name): UrlPath<String>,
) -> Result<Response, ApiError> {
    if !is_plain_file_name(&name) {
        return Err(ApiError::not_found("File not found."));
    }

    let path = ctx.config.downloads_dir.join(&name);
    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => attachment_response(&path, &name).await,
        _ => Err(ApiError::not_found("File not found.")),
    }
}

async fn read_entries(dir: &Path) -> Result<Vec<FileEntry>, ApiError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(ApiError::internal(format!(
                "Could not open the downloads folder: {error}"
            )));
        }
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|error| {
        ApiError::internal(format!("Could not list the downloads folder: {error}"))
    })? {
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", entry.path());
                continue;
            }
        };
        let modified_at = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size_mb: round_mb(metadata.len()),
            modified: DateTime::<Utc>::from(modified_at)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            modified_at,
        });
    }

    files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| a.name.cmp(&b.name)));
    Ok(files)
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / 1_048_576.0 * 100.0).round() / 100.0
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn sizes_are_rounded_to_two_decimals() {
        assert_eq!(round_mb(0), 0.0);
        assert_eq!(round_mb(1_048_576), 1.0);
        assert_eq!(round_mb(1_572_864), 1.5);
        assert_eq!(round_mb(1_234_567), 1.18);
    }

    #[test]
    fn rejects_traversal_names() {
        assert!(is_plain_file_name("20250101_abc.mp4"));
        assert!(!is_plain_file_name("../secret"));
        assert!(!is_plain_file_name("a/b.mp4"));
        assert!(!is_plain_file_name("a\\b.mp4"));
        assert!(!is_plain_file_name(""));
    }

    #[tokio::test]
    async fn entries_are_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        for (name, age_secs) in [("old.mp4", 300), ("new.mp4", 10), ("mid.mp4", 100)] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"x").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(now - Duration::from_secs(age_secs)).unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names = read_entries(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["new.mp4", "mid.mp4", "old.mp4"]);
    }

    #[tokio::test]
    async fn missing_folder_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let entries = read_entries(&dir.path().join("missing")).await.unwrap();
        assert!(entries.is_empty());
    }
}
