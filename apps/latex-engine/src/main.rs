use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use latex_engine::templates::{ProfileTable, TemplateError, BUILTIN_CATALOG};
use latex_engine::toolchain::probe::{all_required_passed, check_prerequisites, PrerequisiteCheck};
use latex_engine::{Config, Engine, TemplateRegistry};

const REPORT_FILE: &str = "previews.json";

/// (display name, program, version flag, required)
const PREREQUISITES: &[(&str, &str, &str, bool)] = &[
    ("XeLaTeX", "xelatex", "--version", true),
    ("PdfLaTeX", "pdflatex", "--version", true),
    ("Poppler", "pdftoppm", "-v", false),
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "status")]
enum Outcome {
    Generated {
        standard: String,
        double_density: String,
        engine: String,
        attempts: usize,
        validation_errors: Vec<String>,
    },
    UpToDate,
    Failed {
        code: String,
        message: String,
        log_file: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
    generated_at: String,
    prerequisites: Vec<PrerequisiteCheck>,
    templates: BTreeMap<String, Outcome>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails only on malformed numbers)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("latex_engine={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting template preview generation v{}", env!("CARGO_PKG_VERSION"));

    // Check external binaries before touching any template
    let prerequisites = check_prerequisites(PREREQUISITES, config.toolchain_timeout).await;
    if !all_required_passed(&prerequisites) {
        bail!("Missing required LaTeX tooling; install a TeX distribution and retry");
    }

    let registry = load_registry(&config)?;
    info!("Found {} templates", registry.len());

    let engine = Arc::new(Engine::new(config.clone(), registry));
    engine.sweep().await;

    let templates = generate_all(Arc::clone(&engine), config.preview_workers).await;

    let failed = templates
        .values()
        .filter(|o| matches!(o, Outcome::Failed { .. }))
        .count();
    let report = RunReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        prerequisites,
        templates,
    };
    write_report(&config, &report).await?;

    info!(
        "Preview generation finished: {} templates, {failed} failed",
        report.templates.len()
    );
    Ok(())
}

/// Templates from `TEMPLATES_DIR`, or the embedded catalog when that directory is absent.
fn load_registry(config: &Config) -> Result<TemplateRegistry> {
    match TemplateRegistry::load_dir(&config.templates_dir, BUILTIN_CATALOG, ProfileTable::builtin()) {
        Ok(registry) => Ok(registry),
        Err(TemplateError::DirectoryNotFound { path }) => {
            warn!(
                "Templates directory {} not found, using built-in templates",
                path.display()
            );
            Ok(TemplateRegistry::builtin())
        }
        Err(e) => Err(e).context("Failed to load templates"),
    }
}

async fn generate_all(engine: Arc<Engine>, workers: usize) -> BTreeMap<String, Outcome> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();

    for template in engine.list_templates() {
        let id = template.id.clone();
        let engine = Arc::clone(&engine);
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let outcome = generate_one(&engine, &id).await;
            (id, outcome)
        });
    }

    let mut outcomes = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((id, outcome)) => {
                outcomes.insert(id, outcome);
            }
            Err(e) => error!("Preview task panicked: {e}"),
        }
    }
    outcomes
}

async fn generate_one(engine: &Engine, id: &str) -> Outcome {
    let template = match engine.get_template(id) {
        Ok(t) => t,
        Err(e) => return failed(&e),
    };

    let validation = engine.validate_template(template).await;
    for err in &validation.errors {
        warn!("[{id}] {err}");
    }
    for warning in &validation.warnings {
        info!("[{id}] {warning}");
    }

    if !engine.needs_refresh(template).await {
        info!("[{id}] Thumbnails are up to date, skipping");
        return Outcome::UpToDate;
    }

    match engine.compile_preview(template).await {
        Ok(artifacts) => {
            info!("[{id}] Generated {}", artifacts.standard.display());
            Outcome::Generated {
                standard: artifacts.standard.display().to_string(),
                double_density: artifacts.double_density.display().to_string(),
                engine: artifacts.engine.to_string(),
                attempts: artifacts.attempts,
                validation_errors: validation.errors,
            }
        }
        Err(e) => {
            error!("[{id}] Preview failed: {e}");
            failed(&e)
        }
    }
}

fn failed(e: &latex_engine::EngineError) -> Outcome {
    let body = e.to_json();
    Outcome::Failed {
        code: e.code().to_string(),
        message: e.to_string(),
        log_file: body["error"]["logFile"].as_str().map(str::to_string),
    }
}

async fn write_report(config: &Config, report: &RunReport) -> Result<()> {
    tokio::fs::create_dir_all(&config.thumbnails_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.thumbnails_dir.display()))?;
    let path = config.thumbnails_dir.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote run report to {}", path.display());
    Ok(())
}
