//! Compilation: LaTeX → PDF (with engine fallback and retry) → PNG previews.
//!
//! The orchestrator owns every temporary file of a run through `RunWorkspace`.
//! Compilers and rasterizers are `async_trait` seams so tests can inject doubles.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod compiler;
pub mod housekeeping;
pub mod orchestrator;
pub mod raster;
pub mod workspace;

pub use compiler::{CompileFailure, DocumentCompiler, LatexCompiler};
pub use housekeeping::{sweep_stale_runs, SweepReport};
pub use orchestrator::{
    CompilationAttempt, CompilationOrchestrator, CompiledDocument, RetryPolicy, MAX_RETRIES,
};
pub use raster::{PdftoppmRasterizer, RasterError, RasterSpec, Rasterizer, DOUBLE_DENSITY, STANDARD};
pub use workspace::RunWorkspace;

/// The two interchangeable document compilers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TexEngine {
    /// Primary engine; handles system fonts via fontspec.
    XeLaTeX,
    /// Fallback engine.
    PdfLaTeX,
}

impl TexEngine {
    pub fn primary() -> Self {
        TexEngine::XeLaTeX
    }

    pub fn alternate(self) -> Self {
        match self {
            TexEngine::XeLaTeX => TexEngine::PdfLaTeX,
            TexEngine::PdfLaTeX => TexEngine::XeLaTeX,
        }
    }

    /// Binary name on PATH.
    pub fn program(self) -> &'static str {
        match self {
            TexEngine::XeLaTeX => "xelatex",
            TexEngine::PdfLaTeX => "pdflatex",
        }
    }
}

impl fmt::Display for TexEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Classification of a failed compile attempt, read off its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompileErrorKind {
    PackageError,
    FontError,
    CompilationError,
}

impl CompileErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            CompileErrorKind::PackageError => "PACKAGE_ERROR",
            CompileErrorKind::FontError => "FONT_ERROR",
            CompileErrorKind::CompilationError => "COMPILATION_ERROR",
        }
    }

    /// Package and font errors are fixed by installing something; generic ones
    /// usually mean a broken template.
    pub fn is_actionable(self) -> bool {
        !matches!(self, CompileErrorKind::CompilationError)
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Classifies an engine log. Package errors win over font errors.
pub fn classify_log(log: &str) -> CompileErrorKind {
    let not_found = log.contains("not found");
    if not_found && log.contains("Package") {
        CompileErrorKind::PackageError
    } else if not_found && log.contains("Font") {
        CompileErrorKind::FontError
    } else {
        CompileErrorKind::CompilationError
    }
}
