//! Toolchain Adapter: the only place validation shells out.
//!
//! ARCHITECTURAL RULE: the validator never runs processes itself. It asks a
//! `Toolchain` (held as `Arc<dyn Toolchain>`) so tests can substitute a fake.
//!
//! Availability is fail-closed: a check that could not run answers "not available".
//! `Availability::Unchecked` keeps the reason so it can be logged.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

pub mod probe;

/// Font catalog lister; prints one font per line.
pub const FONT_LISTER: &str = "fc-list";
/// Package path resolver; exits non-zero when the file is unknown.
pub const PACKAGE_RESOLVER: &str = "kpsewhich";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a single availability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Present,
    Absent,
    /// The check itself could not run (missing binary, timeout).
    Unchecked(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Present)
    }
}

#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn probe_font(&self, name: &str) -> Availability;

    async fn probe_package(&self, name: &str) -> Availability;

    async fn font_is_available(&self, name: &str) -> bool {
        self.probe_font(name).await.is_available()
    }

    async fn package_is_available(&self, name: &str) -> bool {
        self.probe_package(name).await.is_available()
    }
}

/// Runs `program args..` with a timeout and captures its output.
///
/// The child is killed if the timeout fires (the future is dropped with `kill_on_drop`).
pub async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<ToolOutput, ToolchainError> {
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| ToolchainError::TimedOut {
            program: program.to_string(),
            timeout,
        })?
        .map_err(|source| ToolchainError::Spawn {
            program: program.to_string(),
            source,
        })?;

    Ok(ToolOutput {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Production adapter backed by `fc-list` and `kpsewhich`.
#[derive(Debug, Clone)]
pub struct SystemToolchain {
    pub font_lister: String,
    pub package_resolver: String,
    pub timeout: Duration,
}

impl SystemToolchain {
    pub fn new(timeout: Duration) -> Self {
        Self {
            font_lister: FONT_LISTER.to_string(),
            package_resolver: PACKAGE_RESOLVER.to_string(),
            timeout,
        }
    }
}

/// Case-insensitive substring match against the whole catalog listing.
pub fn catalog_contains(catalog: &str, font: &str) -> bool {
    catalog.to_lowercase().contains(&font.to_lowercase())
}

#[async_trait]
impl Toolchain for SystemToolchain {
    async fn probe_font(&self, name: &str) -> Availability {
        match run_command(&self.font_lister, &[], self.timeout).await {
            Ok(out) if out.success => {
                if catalog_contains(&out.stdout, name) {
                    Availability::Present
                } else {
                    debug!("Font '{name}' not in catalog");
                    Availability::Absent
                }
            }
            Ok(out) => {
                let reason = format!(
                    "{} exited with {:?}: {}",
                    self.font_lister,
                    out.exit_code,
                    out.stderr.trim()
                );
                warn!("Error checking font availability for '{name}': {reason}");
                Availability::Unchecked(reason)
            }
            Err(e) => {
                warn!("Error checking font availability for '{name}': {e}");
                Availability::Unchecked(e.to_string())
            }
        }
    }

    async fn probe_package(&self, name: &str) -> Availability {
        let file = format!("{name}.sty");
        match run_command(&self.package_resolver, &[&file], self.timeout).await {
            Ok(out) if out.success => Availability::Present,
            Ok(_) => {
                debug!("Package '{name}' not found by {}", self.package_resolver);
                Availability::Absent
            }
            Err(e) => {
                warn!("Error checking package availability for '{name}': {e}");
                Availability::Unchecked(e.to_string())
            }
        }
    }
}
