use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Engine configuration loaded from environment variables.
/// Every field has a default; only malformed numbers fail.
#[derive(Debug, Clone)]
pub struct Config {
    pub templates_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
    /// Root for run directories and the `logs/` folder.
    pub temp_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub toolchain_timeout: Duration,
    pub compile_timeout: Duration,
    pub retry_base_delay: Duration,
    pub cache_ttl: Duration,
    pub run_retention: Duration,
    pub preview_workers: usize,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            templates_dir: env_or("TEMPLATES_DIR", "templates/latex").into(),
            thumbnails_dir: env_or("THUMBNAILS_DIR", "public/templates/thumbnails").into(),
            temp_dir: env_or("TEMP_DIR", "temp").into(),
            cache_dir: env_or("CACHE_DIR", ".cache/latex-previews").into(),
            toolchain_timeout: Duration::from_secs(parse_env("TOOLCHAIN_TIMEOUT_SECS", 10)?),
            compile_timeout: Duration::from_secs(parse_env("COMPILE_TIMEOUT_SECS", 120)?),
            retry_base_delay: Duration::from_millis(parse_env("RETRY_BASE_DELAY_MS", 1000)?),
            cache_ttl: Duration::from_secs(parse_env("CACHE_TTL_SECS", 3600)?),
            run_retention: hours_env("RUN_RETENTION_HOURS", 24)?,
            preview_workers: parse_env::<usize>("PREVIEW_WORKERS", 1)?.max(1),
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    /// Default layout with every directory under `base`.
    pub fn rooted_at(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Config {
            templates_dir: base.join("templates/latex"),
            thumbnails_dir: base.join("public/templates/thumbnails"),
            temp_dir: base.join("temp"),
            cache_dir: base.join(".cache/latex-previews"),
            toolchain_timeout: Duration::from_secs(10),
            compile_timeout: Duration::from_secs(120),
            retry_base_delay: Duration::from_millis(1000),
            cache_ttl: Duration::from_secs(3600),
            run_retention: Duration::from_secs(24 * 3600),
            preview_workers: 1,
            rust_log: "info".to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn hours_env(key: &str, default: u64) -> Result<Duration> {
    let hours = parse_env::<u64>(key, default)?;
    let secs = hours
        .checked_mul(3600)
        .with_context(|| format!("{key} is too large: {hours} hours"))?;
    Ok(Duration::from_secs(secs))
}
