//! Document → PNG conversion at fixed resolutions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::toolchain::{run_command, ToolchainError};

pub const CONVERTER: &str = "pdftoppm";

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("converter could not run: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("converter exited with {exit_code:?}: {stderr}")]
    Failed { exit_code: Option<i32>, stderr: String },

    #[error("converter produced no image at {0}")]
    MissingOutput(PathBuf),
}

/// One output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSpec {
    pub label: &'static str,
    pub dpi: u32,
    pub width: u32,
    pub height: u32,
    /// Appended to the artifact stem (`<id><suffix>.png`).
    pub suffix: &'static str,
}

pub const STANDARD: RasterSpec = RasterSpec {
    label: "standard",
    dpi: 150,
    width: 600,
    height: 850,
    suffix: "",
};

pub const DOUBLE_DENSITY: RasterSpec = RasterSpec {
    label: "double-density",
    dpi: 300,
    width: 1200,
    height: 1700,
    suffix: "@2x",
};

impl RasterSpec {
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}{}.png", self.suffix)
    }
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Renders the first page of `document` to `<output_stem>.png`.
    async fn rasterize(
        &self,
        document: &Path,
        spec: &RasterSpec,
        output_stem: &Path,
    ) -> Result<PathBuf, RasterError>;
}

#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    pub program: String,
    pub timeout: Duration,
}

impl PdftoppmRasterizer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: CONVERTER.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(
        &self,
        document: &Path,
        spec: &RasterSpec,
        output_stem: &Path,
    ) -> Result<PathBuf, RasterError> {
        let dpi = spec.dpi.to_string();
        let width = spec.width.to_string();
        let height = spec.height.to_string();
        let document_str = document.to_string_lossy();
        let stem_str = output_stem.to_string_lossy();

        let out = run_command(
            &self.program,
            &[
                "-png",
                "-r",
                dpi.as_str(),
                "-scale-to-x",
                width.as_str(),
                "-scale-to-y",
                height.as_str(),
                "-f",
                "1",
                "-l",
                "1",
                "-singlefile",
                &*document_str,
                &*stem_str,
            ],
            self.timeout,
        )
        .await?;

        if !out.success {
            return Err(RasterError::Failed {
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }

        let image = output_stem.with_extension("png");
        if tokio::fs::metadata(&image).await.is_err() {
            return Err(RasterError::MissingOutput(image));
        }
        Ok(image)
    }
}
