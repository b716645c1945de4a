//! Document compiler seam and the `xelatex`/`pdflatex` implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::compile::TexEngine;
use crate::toolchain::run_command;

/// One failed compiler invocation.
#[derive(Debug, Clone, Error)]
#[error("{engine} failed: {message}")]
pub struct CompileFailure {
    pub engine: TexEngine,
    pub message: String,
    /// Where the engine wrote its log, if it got that far.
    pub log_path: Option<PathBuf>,
}

#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    /// Compiles `source` into `output_dir`, returning the path of the produced document.
    async fn compile(
        &self,
        engine: TexEngine,
        source: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, CompileFailure>;
}

/// Runs the real TeX engines. Each compile runs the engine `passes` times so
/// cross-references settle.
#[derive(Debug, Clone)]
pub struct LatexCompiler {
    pub timeout: Duration,
    pub passes: u8,
    pub xelatex: String,
    pub pdflatex: String,
}

impl LatexCompiler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            passes: 2,
            xelatex: TexEngine::XeLaTeX.program().to_string(),
            pdflatex: TexEngine::PdfLaTeX.program().to_string(),
        }
    }

    fn program(&self, engine: TexEngine) -> &str {
        match engine {
            TexEngine::XeLaTeX => &self.xelatex,
            TexEngine::PdfLaTeX => &self.pdflatex,
        }
    }
}

/// `<output_dir>/<source stem>.<ext>`
fn sibling_output(source: &Path, output_dir: &Path, ext: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    output_dir.join(format!("{stem}.{ext}"))
}

#[async_trait]
impl DocumentCompiler for LatexCompiler {
    async fn compile(
        &self,
        engine: TexEngine,
        source: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, CompileFailure> {
        let log_path = sibling_output(source, output_dir, "log");
        let pdf_path = sibling_output(source, output_dir, "pdf");
        let output_dir_str = output_dir.to_string_lossy();
        let source_str = source.to_string_lossy();
        // A log left by an earlier attempt must not be read as this engine's.
        if let Err(e) = tokio::fs::remove_file(&log_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not clear stale log {}: {e}", log_path.display());
            }
        }

        let args = [
            "-interaction=nonstopmode",
            "-halt-on-error",
            "-output-directory",
            &*output_dir_str,
            &*source_str,
        ];

        for pass in 1..=self.passes.max(1) {
            debug!("{engine} pass {pass} on {}", source.display());
            // The engine never ran, so there is no log of its own to read.
            let out = run_command(self.program(engine), &args, self.timeout)
                .await
                .map_err(|e| CompileFailure {
                    engine,
                    message: e.to_string(),
                    log_path: None,
                })?;

            if !out.success {
                return Err(CompileFailure {
                    engine,
                    message: format!("exited with {:?}", out.exit_code),
                    log_path: Some(log_path),
                });
            }
        }

        if tokio::fs::metadata(&pdf_path).await.is_err() {
            return Err(CompileFailure {
                engine,
                message: format!("no document produced at {}", pdf_path.display()),
                log_path: Some(log_path),
            });
        }

        Ok(pdf_path)
    }
}
