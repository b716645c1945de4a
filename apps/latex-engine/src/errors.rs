use std::path::PathBuf;

use serde_json::{json, Value};
use thiserror::Error;

use crate::compile::{CompileErrorKind, RasterError};
use crate::templates::TemplateError;

/// Engine-level error type.
///
/// Validation and transformation never produce one; they report problems in their
/// return values. Only lookups, template loading, and compilation fail this way.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// All compile attempts failed. `log_path` points at the last attempt's log.
    #[error("Compilation failed after {attempts} attempts ({kind})")]
    CompilationExhausted {
        kind: CompileErrorKind,
        attempts: u32,
        log_path: Option<PathBuf>,
    },

    #[error("Rasterization failed: {0}")]
    Raster(#[from] RasterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Template(_) => "TEMPLATE_ERROR",
            EngineError::CompilationExhausted { kind, .. } => kind.code(),
            EngineError::Raster(_) => "RASTER_ERROR",
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a human can fix this by installing something.
    pub fn is_actionable(&self) -> bool {
        matches!(self, EngineError::CompilationExhausted { kind, .. } if kind.is_actionable())
    }

    /// JSON body in the shape the surrounding API layer returns.
    pub fn to_json(&self) -> Value {
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let EngineError::CompilationExhausted {
            log_path: Some(path),
            ..
        } = self
        {
            error["logFile"] = json!(path.display().to_string());
        }
        json!({ "error": error })
    }
}
