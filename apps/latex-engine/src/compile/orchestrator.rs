//! Compilation Orchestrator: bounded retry with engine fallback and linear backoff.
//!
//! # State machine
//! ```text
//! Attempting(1, XeLaTeX)
//!   ├─ ok ───────────────────────────────→ Success
//!   └─ fail, n < max ─→ Retrying(n+1, alternate engine, wait n × base) ─→ Attempting
//!   └─ fail, n = max (or time budget spent) ─→ Exhausted
//! ```
//! The wait between attempts is the only point a run can be stopped; a compiler
//! invocation itself is one blocking external process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::compile::compiler::{CompileFailure, DocumentCompiler};
use crate::compile::{classify_log, CompileErrorKind, TexEngine};
use crate::errors::EngineError;

pub const MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
const LOG_UNAVAILABLE: &str = "Error log not available";
/// Lines of a failed log echoed into the tracing output.
const LOG_EXCERPT_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` failing waits `n × base_delay` before the next one.
    pub base_delay: Duration,
    /// Optional wall-clock budget checked before each wait.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_elapsed: None,
        }
    }
}

/// Record of one attempt. `classified_kind` is `None` for the successful one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationAttempt {
    pub attempt_number: u32,
    pub engine: TexEngine,
    pub error_log: String,
    pub classified_kind: Option<CompileErrorKind>,
}

#[derive(Debug, Clone)]
pub struct CompiledDocument {
    pub bytes: Vec<u8>,
    pub path: PathBuf,
    pub engine: TexEngine,
    pub attempts: Vec<CompilationAttempt>,
}

enum RunState {
    Attempting {
        attempt: u32,
        engine: TexEngine,
    },
    Retrying {
        attempt: u32,
        engine: TexEngine,
        delay: Duration,
    },
    Success(CompiledDocument),
    Exhausted,
}

pub struct CompilationOrchestrator {
    compiler: Arc<dyn DocumentCompiler>,
    policy: RetryPolicy,
    log_dir: PathBuf,
}

impl CompilationOrchestrator {
    /// `log_dir` receives the log of an exhausted run; it must outlive run directories.
    pub fn new(compiler: Arc<dyn DocumentCompiler>, policy: RetryPolicy, log_dir: PathBuf) -> Self {
        Self {
            compiler,
            policy,
            log_dir,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Compiles `source` into `output_dir`, retrying per the policy.
    ///
    /// `tag` names this run in logs and in the persisted failure log.
    pub async fn compile(
        &self,
        source: &Path,
        output_dir: &Path,
        tag: &str,
    ) -> Result<CompiledDocument, EngineError> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut history: Vec<CompilationAttempt> = Vec::new();
        let mut state = RunState::Attempting {
            attempt: 1,
            engine: TexEngine::primary(),
        };

        loop {
            state = match state {
                RunState::Attempting { attempt, engine } => {
                    info!("[{tag}] Attempt {attempt}/{max_attempts}: compiling with {engine}");
                    match self.compiler.compile(engine, source, output_dir).await {
                        Ok(path) => match tokio::fs::read(&path).await {
                            Ok(bytes) => {
                                history.push(CompilationAttempt {
                                    attempt_number: attempt,
                                    engine,
                                    error_log: String::new(),
                                    classified_kind: None,
                                });
                                RunState::Success(CompiledDocument {
                                    bytes,
                                    path,
                                    engine,
                                    attempts: std::mem::take(&mut history),
                                })
                            }
                            Err(e) => {
                                let failure = CompileFailure {
                                    engine,
                                    message: format!("document unreadable: {e}"),
                                    log_path: None,
                                };
                                self.on_failure(tag, attempt, failure, started, &mut history)
                                    .await
                            }
                        },
                        Err(failure) => {
                            self.on_failure(tag, attempt, failure, started, &mut history)
                                .await
                        }
                    }
                }
                RunState::Retrying {
                    attempt,
                    engine,
                    delay,
                } => {
                    info!("[{tag}] Waiting {}ms before retry...", delay.as_millis());
                    tokio::time::sleep(delay).await;
                    RunState::Attempting { attempt, engine }
                }
                RunState::Success(document) => {
                    info!(
                        "[{tag}] Compiled with {} after {} attempt(s)",
                        document.engine,
                        document.attempts.len()
                    );
                    return Ok(document);
                }
                RunState::Exhausted => {
                    return Err(self.exhausted(tag, &history).await);
                }
            };
        }
    }

    async fn on_failure(
        &self,
        tag: &str,
        attempt: u32,
        failure: CompileFailure,
        started: Instant,
        history: &mut Vec<CompilationAttempt>,
    ) -> RunState {
        let error_log = read_log(&failure).await;
        let kind = classify_log(&error_log);
        let max_attempts = self.policy.max_attempts.max(1);

        warn!(
            "[{tag}] LaTeX error (attempt {attempt}/{max_attempts}, {kind}): {failure}\n{}",
            error_log
                .lines()
                .take(LOG_EXCERPT_LINES)
                .collect::<Vec<_>>()
                .join("\n")
        );

        history.push(CompilationAttempt {
            attempt_number: attempt,
            engine: failure.engine,
            error_log,
            classified_kind: Some(kind),
        });

        if attempt >= max_attempts {
            return RunState::Exhausted;
        }

        let delay = self.policy.base_delay * attempt;
        if let Some(budget) = self.policy.max_elapsed {
            if started.elapsed() + delay > budget {
                warn!("[{tag}] Time budget of {budget:?} spent; not retrying");
                return RunState::Exhausted;
            }
        }

        if kind.is_actionable() {
            info!("[{tag}] Detected {kind}, trying alternate engine");
        }

        RunState::Retrying {
            attempt: attempt + 1,
            engine: failure.engine.alternate(),
            delay,
        }
    }

    /// Builds the terminal error and copies the last log somewhere that survives cleanup.
    async fn exhausted(&self, tag: &str, history: &[CompilationAttempt]) -> EngineError {
        let Some(last) = history.last() else {
            return EngineError::Internal(anyhow::anyhow!("compilation exhausted with no attempts"));
        };
        let kind = last.classified_kind.unwrap_or(CompileErrorKind::CompilationError);

        let log_path = self.log_dir.join(format!("{tag}.log"));
        let persisted = match tokio::fs::create_dir_all(&self.log_dir).await {
            Ok(()) => tokio::fs::write(&log_path, &last.error_log).await,
            Err(e) => Err(e),
        };
        let log_path = match persisted {
            Ok(()) => Some(log_path),
            Err(e) => {
                warn!("[{tag}] Could not persist compile log: {e}");
                None
            }
        };

        EngineError::CompilationExhausted {
            kind,
            attempts: history.len() as u32,
            log_path,
        }
    }
}

async fn read_log(failure: &CompileFailure) -> String {
    let from_file = match &failure.log_path {
        Some(path) => tokio::fs::read_to_string(path).await.ok(),
        None => None,
    };
    from_file.unwrap_or_else(|| LOG_UNAVAILABLE.to_string())
}
