//! Engine facade: the caller-facing seam over registry, validator, transformer and
//! compilation.
//!
//! Built once at startup and shared behind `Arc`. The registry is read-only after
//! construction, so concurrent callers need no locking; the only shared mutable
//! resource is the temp directory, which is partitioned per run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{cache_key, DocumentCache};
use crate::compile::housekeeping::LOG_DIR;
use crate::compile::{
    sweep_stale_runs, CompilationOrchestrator, CompiledDocument, DocumentCompiler, LatexCompiler,
    PdftoppmRasterizer, RasterSpec, Rasterizer, RetryPolicy, RunWorkspace, SweepReport,
    TexEngine, DOUBLE_DENSITY, STANDARD,
};
use crate::config::Config;
use crate::errors::EngineError;
use crate::templates::{
    build_preview_source, normalized_id, render_document, transform, PreviewOptions, Template,
    TemplateRegistry,
};
use crate::toolchain::{SystemToolchain, Toolchain};
use crate::validation::{validate_template, ValidationResult};

/// Both preview images of one template, at their final location.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewArtifacts {
    pub template_id: String,
    pub standard: PathBuf,
    pub double_density: PathBuf,
    pub engine: TexEngine,
    pub attempts: usize,
}

pub struct Engine {
    registry: Arc<TemplateRegistry>,
    toolchain: Arc<dyn Toolchain>,
    orchestrator: CompilationOrchestrator,
    rasterizer: Arc<dyn Rasterizer>,
    cache: DocumentCache,
    config: Config,
}

impl Engine {
    /// Production wiring: real toolchain, TeX engines and `pdftoppm`.
    pub fn new(config: Config, registry: TemplateRegistry) -> Self {
        let toolchain = Arc::new(SystemToolchain::new(config.toolchain_timeout));
        let compiler = Arc::new(LatexCompiler::new(config.compile_timeout));
        let rasterizer = Arc::new(PdftoppmRasterizer::new(config.compile_timeout));
        Self::with_parts(config, registry, toolchain, compiler, rasterizer)
    }

    pub fn with_parts(
        config: Config,
        registry: TemplateRegistry,
        toolchain: Arc<dyn Toolchain>,
        compiler: Arc<dyn DocumentCompiler>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        let policy = RetryPolicy {
            base_delay: config.retry_base_delay,
            ..RetryPolicy::default()
        };
        let orchestrator =
            CompilationOrchestrator::new(compiler, policy, config.temp_dir.join(LOG_DIR));
        let cache = DocumentCache::new(config.cache_dir.clone(), config.cache_ttl);
        Self {
            registry: Arc::new(registry),
            toolchain,
            orchestrator,
            rasterizer,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    // ────────────────────────────────────────────────────────────────────────
    // Templates
    // ────────────────────────────────────────────────────────────────────────

    pub fn list_templates(&self) -> Vec<&Template> {
        self.registry.list()
    }

    pub fn get_template(&self, id: &str) -> Result<&Template, EngineError> {
        self.registry
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("template '{id}'")))
    }

    pub async fn validate_template(&self, template: &Template) -> ValidationResult {
        validate_template(template, Arc::clone(&self.toolchain)).await
    }

    /// Best-effort; never fails.
    pub fn transform_content(&self, template: &Template, content: &str) -> String {
        transform(template, self.registry.profile(&template.id), content)
    }

    pub fn render_document(&self, template: &Template, content: &str) -> String {
        render_document(template, self.registry.profile(&template.id), content)
    }

    /// CSS snippet the UI uses to mimic the template's look.
    pub fn preview_styles(&self, template: &Template) -> Option<&str> {
        self.registry
            .profile(&template.id)
            .preview_styles
            .as_deref()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Compilation
    // ────────────────────────────────────────────────────────────────────────

    /// Compiles the template's preview document and writes `<id>.png` and
    /// `<id>@2x.png` into the thumbnails directory.
    ///
    /// The run directory is removed on every exit path. Thumbnails are only
    /// replaced when both renderings succeed.
    pub async fn compile_preview(&self, template: &Template) -> Result<PreviewArtifacts, EngineError> {
        let id = normalized_id(&template.id);
        let workspace = RunWorkspace::create(&self.config.temp_dir, &id)?;
        let result = self.preview_in(&workspace, template, &id).await;
        workspace.close();
        result
    }

    async fn preview_in(
        &self,
        workspace: &RunWorkspace,
        template: &Template,
        id: &str,
    ) -> Result<PreviewArtifacts, EngineError> {
        let profile = self.registry.profile(&template.id);
        let options = PreviewOptions {
            title: Some(preview_title(&template.id)),
            ..PreviewOptions::default()
        };
        let source = build_preview_source(template, profile, &options);
        let source_path = workspace.source_path();
        tokio::fs::write(&source_path, source).await?;

        let tag = format!("{id}-{}", workspace.token());
        let document = self
            .orchestrator
            .compile(&source_path, workspace.path(), &tag)
            .await?;

        let mut rendered = Vec::with_capacity(2);
        for spec in [STANDARD, DOUBLE_DENSITY] {
            let stem = workspace.file(&format!("{id}{}", spec.suffix));
            let image = self.rasterizer.rasterize(&document.path, &spec, &stem).await?;
            info!("[{id}] Rendered {} preview", spec.label);
            rendered.push((spec, image));
        }

        tokio::fs::create_dir_all(&self.config.thumbnails_dir).await?;
        let placements: Vec<(PathBuf, PathBuf)> = rendered
            .into_iter()
            .map(|(spec, image)| (image, self.thumbnail_path(id, &spec)))
            .collect();
        publish_all(&placements, workspace.token()).await?;

        let standard = self.thumbnail_path(id, &STANDARD);
        let double_density = self.thumbnail_path(id, &DOUBLE_DENSITY);
        Ok(PreviewArtifacts {
            template_id: template.id.clone(),
            standard,
            double_density,
            engine: document.engine,
            attempts: document.attempts.len(),
        })
    }

    /// Renders `content` into the template and compiles it, serving repeats from
    /// the document cache.
    pub async fn compile_document(
        &self,
        template: &Template,
        content: &str,
    ) -> Result<Vec<u8>, EngineError> {
        let key = cache_key(&template.id, &template.latex_source, content);
        if let Some(bytes) = self.cache.get(&key).await {
            info!("Serving cached document for {}", template.id);
            return Ok(bytes);
        }

        let id = normalized_id(&template.id);
        let workspace = RunWorkspace::create(&self.config.temp_dir, &id)?;
        let result = self.document_in(&workspace, template, content, &id).await;
        workspace.close();

        let document = result?;
        self.cache.put(&key, &document.bytes).await;
        Ok(document.bytes)
    }

    async fn document_in(
        &self,
        workspace: &RunWorkspace,
        template: &Template,
        content: &str,
        id: &str,
    ) -> Result<CompiledDocument, EngineError> {
        let source_path = workspace.source_path();
        tokio::fs::write(&source_path, self.render_document(template, content)).await?;
        let tag = format!("{id}-{}", workspace.token());
        self.orchestrator
            .compile(&source_path, workspace.path(), &tag)
            .await
    }

    pub fn thumbnail_path(&self, normalized_id: &str, spec: &RasterSpec) -> PathBuf {
        self.config.thumbnails_dir.join(spec.file_name(normalized_id))
    }

    /// True unless both thumbnails exist and are at least as new as the source file.
    pub async fn needs_refresh(&self, template: &Template) -> bool {
        let id = normalized_id(&template.id);
        let Some(source_modified) = modified(&template.source_path).await else {
            // No source file on disk (embedded template): only missing images count.
            for spec in [STANDARD, DOUBLE_DENSITY] {
                if modified(&self.thumbnail_path(&id, &spec)).await.is_none() {
                    return true;
                }
            }
            return false;
        };
        for spec in [STANDARD, DOUBLE_DENSITY] {
            match modified(&self.thumbnail_path(&id, &spec)).await {
                Some(image_modified) if image_modified >= source_modified => {}
                _ => return true,
            }
        }
        false
    }

    /// Removes stale run directories and logs, then expired cache entries.
    pub async fn sweep(&self) -> SweepReport {
        let report = match sweep_stale_runs(&self.config.temp_dir, self.config.run_retention).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Housekeeping sweep of {} failed: {e}", self.config.temp_dir.display());
                SweepReport::default()
            }
        };
        let evicted = self.cache.evict_expired().await;
        info!(
            "Sweep removed {} entries ({} failed), evicted {evicted} cached documents",
            report.removed.len(),
            report.failed.len()
        );
        report
    }
}

/// `Default_Resume` → `Default Resume`.
fn preview_title(template_id: &str) -> String {
    template_id.replace('_', " ")
}

/// Copies every `(image, target)` pair next to its target first, then renames them
/// into place. Nothing is renamed unless every copy succeeded.
async fn publish_all(placements: &[(PathBuf, PathBuf)], token: &str) -> std::io::Result<()> {
    let mut staged = Vec::with_capacity(placements.len());
    for (image, target) in placements {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{token}.tmp"));
        let staging = target.with_file_name(name);
        if let Err(e) = tokio::fs::copy(image, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            for (staging, _) in &staged {
                let _ = tokio::fs::remove_file(staging).await;
            }
            return Err(e);
        }
        staged.push((staging, target));
    }
    for (staging, target) in &staged {
        tokio::fs::rename(staging, target).await?;
    }
    Ok(())
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::compile::{CompileErrorKind, CompileFailure, RasterError};
    use crate::toolchain::Availability;

    struct AllPresent;

    #[async_trait]
    impl Toolchain for AllPresent {
        async fn probe_font(&self, _name: &str) -> Availability {
            Availability::Present
        }

        async fn probe_package(&self, _name: &str) -> Availability {
            Availability::Present
        }
    }

    struct FakeCompiler {
        fail: bool,
        calls: AtomicUsize,
        last_source: Mutex<String>,
    }

    impl FakeCompiler {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
                last_source: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl DocumentCompiler for FakeCompiler {
        async fn compile(
            &self,
            engine: TexEngine,
            source: &Path,
            output_dir: &Path,
        ) -> Result<PathBuf, CompileFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_source.lock().unwrap() = std::fs::read_to_string(source).unwrap();
            if self.fail {
                let log = output_dir.join("preview.log");
                std::fs::write(&log, "! LaTeX Error: File `x.sty' not found. Package").unwrap();
                return Err(CompileFailure {
                    engine,
                    message: "exited with Some(1)".into(),
                    log_path: Some(log),
                });
            }
            let pdf = output_dir.join("preview.pdf");
            std::fs::write(&pdf, b"%PDF-1.5").unwrap();
            Ok(pdf)
        }
    }

    /// Writes a dummy PNG, or fails for the resolution labelled `fail_on`.
    struct FakeRasterizer {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn rasterize(
            &self,
            _document: &Path,
            spec: &RasterSpec,
            output_stem: &Path,
        ) -> Result<PathBuf, RasterError> {
            if self.fail_on == Some(spec.label) {
                return Err(RasterError::Failed {
                    exit_code: Some(1),
                    stderr: "boom".into(),
                });
            }
            let png = output_stem.with_extension("png");
            std::fs::write(&png, spec.label).unwrap();
            Ok(png)
        }
    }

    fn engine(
        root: &Path,
        compiler: Arc<FakeCompiler>,
        fail_on: Option<&'static str>,
    ) -> Engine {
        Engine::with_parts(
            Config::rooted_at(root),
            TemplateRegistry::builtin(),
            Arc::new(AllPresent),
            compiler,
            Arc::new(FakeRasterizer { fail_on }),
        )
    }

    fn run_dirs(temp: &Path) -> usize {
        std::fs::read_dir(temp)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().starts_with("run-"))
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_get_template_unknown_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path(), FakeCompiler::new(false), None);
        let err = engine.get_template("Nope").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(engine.list_templates().len(), 3);
        assert!(engine.get_template("Default_Resume").is_ok());
    }

    #[tokio::test]
    async fn test_validate_builtin_default_with_fonts_present() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path(), FakeCompiler::new(false), None);
        let template = engine.get_template("Default_Resume").unwrap();
        let result = engine.validate_template(template).await;
        assert!(result.is_valid, "{result:?}");
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_preview_styles_come_from_profile() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path(), FakeCompiler::new(false), None);
        let default = engine.get_template("Default_Resume").unwrap();
        assert!(engine.preview_styles(default).is_some());
        let modular = engine.get_template("Modular_professional_CV").unwrap();
        assert!(engine.preview_styles(modular).is_none());
    }

    #[tokio::test]
    async fn test_compile_preview_publishes_both_images_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path(), FakeCompiler::new(false), None);
        let template = engine.get_template("Default_Resume").unwrap().clone();

        let artifacts = engine.compile_preview(&template).await.unwrap();

        let thumbs = &engine.config().thumbnails_dir;
        assert_eq!(artifacts.standard, thumbs.join("default_resume.png"));
        assert_eq!(artifacts.double_density, thumbs.join("default_resume@2x.png"));
        assert!(artifacts.standard.exists());
        assert!(artifacts.double_density.exists());
        assert_eq!(artifacts.engine, TexEngine::XeLaTeX);
        assert_eq!(artifacts.attempts, 1);
        assert_eq!(run_dirs(&engine.config().temp_dir), 0);
    }

    #[tokio::test]
    async fn test_preview_source_carries_template_title() {
        let root = tempfile::tempdir().unwrap();
        let compiler = FakeCompiler::new(false);
        let engine = engine(root.path(), Arc::clone(&compiler), None);
        let template = engine.get_template("John_Miller_CV").unwrap().clone();

        engine.compile_preview(&template).await.unwrap();

        let source = compiler.last_source.lock().unwrap().clone();
        assert!(source.contains("\\title{John Miller CV}"), "{source}");
        assert!(source.contains("\\maketitle"));
    }

    #[tokio::test]
    async fn test_failed_copy_publishes_neither_image() {
        let root = tempfile::tempdir().unwrap();
        let standard_image = root.path().join("x.png");
        std::fs::write(&standard_image, "new").unwrap();
        let standard_target = root.path().join("x_thumb.png");
        let dense_target = root.path().join("x_thumb@2x.png");
        std::fs::write(&dense_target, "old").unwrap();

        let placements = vec![
            (standard_image, standard_target.clone()),
            (root.path().join("missing@2x.png"), dense_target.clone()),
        ];
        assert!(publish_all(&placements, "tok").await.is_err());

        assert!(!standard_target.exists());
        assert_eq!(std::fs::read_to_string(&dense_target).unwrap(), "old");
        let leftovers = std::fs::read_dir(root.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_compile_keeps_log_and_removes_run_dir() {
        let root = tempfile::tempdir().unwrap();
        let compiler = FakeCompiler::new(true);
        let engine = engine(root.path(), Arc::clone(&compiler), None);
        let template = engine.get_template("John_Miller_CV").unwrap().clone();

        let err = engine.compile_preview(&template).await.unwrap_err();

        assert_eq!(compiler.calls.load(Ordering::SeqCst), 3);
        match err {
            EngineError::CompilationExhausted { kind, log_path, .. } => {
                assert_eq!(kind, CompileErrorKind::PackageError);
                let log_path = log_path.unwrap();
                assert!(log_path.exists());
                assert!(log_path.starts_with(engine.config().temp_dir.join(LOG_DIR)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(run_dirs(&engine.config().temp_dir), 0);
        assert!(!engine.thumbnail_path("john_miller_cv", &STANDARD).exists());
    }

    #[tokio::test]
    async fn test_raster_failure_publishes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path(), FakeCompiler::new(false), Some("double-density"));
        let template = engine.get_template("Default_Resume").unwrap().clone();

        let err = engine.compile_preview(&template).await.unwrap_err();

        assert_eq!(err.code(), "RASTER_ERROR");
        assert!(!engine.thumbnail_path("default_resume", &STANDARD).exists());
        assert_eq!(run_dirs(&engine.config().temp_dir), 0);
    }

    #[tokio::test]
    async fn test_compile_document_is_cached() {
        let root = tempfile::tempdir().unwrap();
        let compiler = FakeCompiler::new(false);
        let engine = engine(root.path(), Arc::clone(&compiler), None);
        let template = engine.get_template("Default_Resume").unwrap().clone();

        let first = engine.compile_document(&template, "Hello").await.unwrap();
        let second = engine.compile_document(&template, "Hello").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);

        engine.compile_document(&template, "Other").await.unwrap();
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_needs_refresh_tracks_thumbnails() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path(), FakeCompiler::new(false), None);
        let mut template = engine.get_template("Default_Resume").unwrap().clone();
        let source = root.path().join("Default_Resume.tex");
        std::fs::write(&source, &template.latex_source).unwrap();
        template.source_path = source;

        assert!(engine.needs_refresh(&template).await);
        engine.compile_preview(&template).await.unwrap();
        assert!(!engine.needs_refresh(&template).await);
    }

    #[tokio::test]
    async fn test_sweep_on_empty_root() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path(), FakeCompiler::new(false), None);
        let report = engine.sweep().await;
        assert!(report.removed.is_empty());
    }
}
