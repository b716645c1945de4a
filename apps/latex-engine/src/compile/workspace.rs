//! Per-run scratch directory.
//!
//! Every compilation run gets its own `run-<id>-<random>` directory, so two runs for
//! the same template never share a file name. The directory is removed when the
//! workspace is dropped, on every exit path.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix shared by all run directories; the housekeeping sweep only touches these.
pub const RUN_DIR_PREFIX: &str = "run-";

const SOURCE_FILE: &str = "preview.tex";

#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
    token: String,
}

impl RunWorkspace {
    /// Creates a fresh run directory under `root` for the template `normalized_id`.
    pub fn create(root: &Path, normalized_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{RUN_DIR_PREFIX}{normalized_id}-"))
            .tempdir_in(root)?;
        let token = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4().simple()
        );
        debug!("Created run workspace {}", dir.path().display());
        Ok(Self { dir, token })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Unique token for this run (timestamp + random id).
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn source_path(&self) -> PathBuf {
        self.dir.path().join(SOURCE_FILE)
    }

    /// Path for a file inside the run directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Removes the directory now, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Could not remove run workspace {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_runs_for_same_template_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let a = RunWorkspace::create(root.path(), "default_resume").unwrap();
        let b = RunWorkspace::create(root.path(), "default_resume").unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.token(), b.token());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("run-default_resume-"));
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = RunWorkspace::create(root.path(), "x").unwrap();
            std::fs::write(ws.source_path(), "\\documentclass{article}").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_close_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = RunWorkspace::create(root.path(), "x").unwrap();
        let path = ws.path().to_path_buf();
        ws.close();
        assert!(!path.exists());
    }
}
