//! Prerequisite probe: confirms the external binaries are installed before a batch run.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::toolchain::run_command;

#[derive(Debug, Clone, Serialize)]
pub struct PrerequisiteCheck {
    pub name: String,
    pub program: String,
    pub passed: bool,
    /// Required checks abort the batch when they fail.
    pub required: bool,
    pub detail: Option<String>,
}

/// Runs `program version_flag` for each entry and records whether it answered.
pub async fn check_prerequisites(
    binaries: &[(&str, &str, &str, bool)],
    timeout: Duration,
) -> Vec<PrerequisiteCheck> {
    let mut checks = Vec::with_capacity(binaries.len());
    for &(name, program, version_flag, required) in binaries {
        info!("Checking {name}...");
        let (passed, detail) = match run_command(program, &[version_flag], timeout).await {
            Ok(out) if out.success => (true, out.stdout.lines().next().map(str::to_string)),
            Ok(out) => (false, Some(format!("exited with {:?}", out.exit_code))),
            Err(e) => (false, Some(e.to_string())),
        };
        if !passed {
            warn!(
                "Prerequisite check failed: {name} ({program}) is not installed or not in PATH: {}",
                detail.as_deref().unwrap_or("unknown")
            );
        }
        checks.push(PrerequisiteCheck {
            name: name.to_string(),
            program: program.to_string(),
            passed,
            required,
            detail,
        });
    }
    checks
}

/// True when every required check passed.
pub fn all_required_passed(checks: &[PrerequisiteCheck]) -> bool {
    checks.iter().filter(|c| c.required).all(|c| c.passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_fails_check() {
        let checks = check_prerequisites(
            &[("Nothing", "no-such-binary-xyz", "--version", true)],
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].passed);
        assert!(!all_required_passed(&checks));
    }

    #[test]
    fn test_optional_failures_do_not_block() {
        let checks = vec![
            PrerequisiteCheck {
                name: "XeLaTeX".into(),
                program: "xelatex".into(),
                passed: true,
                required: true,
                detail: None,
            },
            PrerequisiteCheck {
                name: "Converter".into(),
                program: "pdftoppm".into(),
                passed: false,
                required: false,
                detail: None,
            },
        ];
        assert!(all_required_passed(&checks));
    }
}
