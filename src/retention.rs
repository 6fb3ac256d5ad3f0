//! Periodic removal of stale files from the output directory.

use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: usize,
    pub failed: usize,
    pub bytes_freed: u64,
}

/// One sweep pass: deletes every regular file in `dir` whose age at `now`
/// is strictly greater than `max_age`.
pub async fn sweep_once(dir: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    sweep_with(dir, max_age, now, |path| async move {
        tokio::fs::remove_file(path).await
    })
    .await
}

pub(crate) async fn sweep_with<F, Fut>(
    dir: &Path,
    max_age: Duration,
    now: SystemTime,
    remove: F,
) -> SweepReport
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open {:?} for cleanup: {error}", dir);
            }
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not iterate {:?} for cleanup: {error}", dir);
                break;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                report.failed += 1;
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }
        report.examined += 1;

        let modified_at = match metadata.modified() {
            Ok(value) => value,
            Err(error) => {
                warn!("Could not read modification time of {:?}: {error}", path);
                report.failed += 1;
                continue;
            }
        };

        let age = now.duration_since(modified_at).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match remove(path.clone()).await {
            Ok(()) => {
                report.deleted += 1;
                report.bytes_freed += metadata.len();
                debug!(
                    "Deleted {:?} (age {:.1} days)",
                    path,
                    age.as_secs_f64() / 86_400.0
                );
            }
            Err(error) => {
                warn!("Could not delete {:?}: {error}", path);
                report.failed += 1;
            }
        }
    }

    report
}

/// Sweeps `dir` immediately and then every `period` until `cancel` fires.
pub fn spawn_sweeper(
    dir: PathBuf,
    max_age: Duration,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Retention sweep started for {:?} (every {:.1} h, max age {:.1} days)",
            dir,
            period.as_secs_f64() / 3_600.0,
            max_age.as_secs_f64() / 86_400.0
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = sweep_once(&dir, max_age, SystemTime::now()).await;
                    if report.deleted > 0 || report.failed > 0 {
                        info!(
                            "Retention sweep removed {} of {} file(s), {} failure(s), {:.2} MB freed",
                            report.deleted,
                            report.examined,
                            report.failed,
                            report.bytes_freed as f64 / 1_048_576.0
                        );
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Retention sweep stopped");
                    break;
                }
            }
        }
    })
}
