//! Housekeeping sweep: removes abandoned run directories and old failure logs.
//!
//! Runs independently of compilation; a compile never waits on it.

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{info, warn};

use crate::compile::workspace::RUN_DIR_PREFIX;

/// Subdirectory of the temp root holding logs of exhausted compilations.
pub const LOG_DIR: &str = "logs";

/// Default retention window for run directories and logs.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Removes `run-*` directories under `root`, and logs under `root/logs`, older than
/// `retention`.
pub async fn sweep_stale_runs(root: &Path, retention: Duration) -> std::io::Result<SweepReport> {
    sweep_stale_runs_at(root, retention, SystemTime::now()).await
}

/// Same as `sweep_stale_runs`, measuring age against `now`.
pub async fn sweep_stale_runs_at(
    root: &Path,
    retention: Duration,
    now: SystemTime,
) -> std::io::Result<SweepReport> {
    let mut report = SweepReport::default();
    if tokio::fs::metadata(root).await.is_err() {
        return Ok(report);
    }

    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(RUN_DIR_PREFIX) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_dir() || !is_stale(&meta, retention, now) {
            continue;
        }
        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => {
                info!("Removed old temp directory: {name}");
                report.removed.push(name);
            }
            Err(e) => {
                warn!("Could not remove old temp directory {name}: {e}");
                report.failed.push(name);
            }
        }
    }

    let log_dir = root.join(LOG_DIR);
    if let Ok(mut logs) = tokio::fs::read_dir(&log_dir).await {
        while let Some(entry) = logs.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() || !is_stale(&meta, retention, now) {
                continue;
            }
            let name = format!("{LOG_DIR}/{}", entry.file_name().to_string_lossy());
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => report.removed.push(name),
                Err(e) => {
                    warn!("Could not delete {name}: {e}");
                    report.failed.push(name);
                }
            }
        }
    }

    Ok(report)
}

fn is_stale(meta: &std::fs::Metadata, retention: Duration, now: SystemTime) -> bool {
    meta.modified()
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age > retention)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_removes_only_stale_run_dirs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("run-default_resume-abc")).unwrap();
        std::fs::create_dir(root.path().join("keep-me")).unwrap();
        std::fs::write(root.path().join("run-file-not-dir"), "x").unwrap();
        std::fs::create_dir(root.path().join(LOG_DIR)).unwrap();
        std::fs::write(root.path().join(LOG_DIR).join("a.log"), "log").unwrap();

        let later = SystemTime::now() + Duration::from_secs(25 * 60 * 60);
        let report = sweep_stale_runs_at(root.path(), DEFAULT_RETENTION, later)
            .await
            .unwrap();

        assert!(!root.path().join("run-default_resume-abc").exists());
        assert!(root.path().join("keep-me").exists());
        assert!(root.path().join("run-file-not-dir").exists());
        assert!(!root.path().join(LOG_DIR).join("a.log").exists());
        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_run_dirs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("run-x-1")).unwrap();
        let report = sweep_stale_runs(root.path(), DEFAULT_RETENTION).await.unwrap();
        assert!(report.removed.is_empty());
        assert!(root.path().join("run-x-1").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_root_is_noop() {
        let report = sweep_stale_runs(Path::new("/no/such/temp/root"), DEFAULT_RETENTION)
            .await
            .unwrap();
        assert!(report.removed.is_empty());
    }
}
